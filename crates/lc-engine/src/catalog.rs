//! Endpoint catalog: the immutable set of endpoints intents are matched against.

use std::collections::BTreeMap;
use std::sync::Arc;

use lc_protocol::EndpointSpec;
use serde::Deserialize;

use crate::error::{CatalogError, CatalogResult};

/// Read access to a loaded endpoint catalog.
pub trait SpecCatalog: Send + Sync {
    fn get_by_id(&self, id: &str) -> Option<Arc<EndpointSpec>>;

    /// All endpoint ids in ascending order.
    fn list_ids(&self) -> Vec<String>;

    /// Current content hash of an endpoint, for cache invalidation.
    fn content_hash(&self, id: &str) -> Option<String>;

    /// Server base URL declared by the catalog, if any.
    fn base_url(&self) -> Option<&str> {
        None
    }
}

/// On-disk catalog document.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    base_url: Option<String>,
    endpoints: Vec<EndpointSpec>,
}

struct CatalogEntry {
    spec: Arc<EndpointSpec>,
    hash: String,
}

/// Catalog held entirely in memory.
pub struct InMemoryCatalog {
    entries: BTreeMap<String, CatalogEntry>,
    base_url: Option<String>,
}

impl InMemoryCatalog {
    /// Build a catalog, deriving missing ids.
    ///
    /// Identical duplicates collapse into one entry; duplicates whose content
    /// differs are rejected.
    pub fn new(endpoints: Vec<EndpointSpec>) -> CatalogResult<Self> {
        let mut entries: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        for mut spec in endpoints {
            if spec.id.trim().is_empty() {
                spec.id = EndpointSpec::derive_id(spec.method, &spec.path_template);
            }
            let hash = spec.content_hash();
            match entries.get(&spec.id) {
                Some(existing) if existing.hash == hash => {
                    tracing::debug!(endpoint = %spec.id, "Collapsing identical duplicate endpoint");
                }
                Some(_) => return Err(CatalogError::Conflict { id: spec.id }),
                None => {
                    entries.insert(
                        spec.id.clone(),
                        CatalogEntry {
                            spec: Arc::new(spec),
                            hash,
                        },
                    );
                }
            }
        }
        Ok(Self {
            entries,
            base_url: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Parse a `{ "base_url": ..., "endpoints": [...] }` document.
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        let catalog = Self::new(doc.endpoints)?;
        Ok(match doc.base_url {
            Some(base) => catalog.with_base_url(base),
            None => catalog,
        })
    }

    /// Load a catalog document from a file path.
    pub fn from_file(path: &str) -> CatalogResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::Io(format!("{path}: {e}")))?;
        let catalog = Self::from_json_str(&contents)?;
        tracing::info!(path, endpoints = catalog.len(), "Loaded endpoint catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Endpoints in id order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<EndpointSpec>> {
        self.entries.values().map(|e| &e.spec)
    }
}

impl SpecCatalog for InMemoryCatalog {
    fn get_by_id(&self, id: &str) -> Option<Arc<EndpointSpec>> {
        self.entries.get(id).map(|e| Arc::clone(&e.spec))
    }

    fn list_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn content_hash(&self, id: &str) -> Option<String> {
        self.entries.get(id).map(|e| e.hash.clone())
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_protocol::HttpMethod;

    #[test]
    fn ids_are_derived_and_sorted() {
        let catalog = InMemoryCatalog::new(vec![
            EndpointSpec::new(HttpMethod::Post, "/users"),
            EndpointSpec::new(HttpMethod::Get, "/users/{id}"),
        ])
        .unwrap();
        assert_eq!(catalog.list_ids(), vec!["get_users_id", "post_users"]);
        assert!(catalog.get_by_id("get_users_id").is_some());
        assert_eq!(catalog.content_hash("post_users").map(|h| h.len()), Some(64));
    }

    #[test]
    fn identical_duplicates_collapse() {
        let spec = EndpointSpec::new(HttpMethod::Get, "/users");
        let catalog = InMemoryCatalog::new(vec![spec.clone(), spec]).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn conflicting_duplicates_are_rejected() {
        let a = EndpointSpec::new(HttpMethod::Get, "/users");
        let b = EndpointSpec::new(HttpMethod::Get, "/users").with_summary("List users");
        let err = InMemoryCatalog::new(vec![a, b]).err().unwrap();
        assert!(matches!(err, CatalogError::Conflict { id } if id == "get_users"));
    }

    #[test]
    fn json_document_with_missing_ids() {
        let json = r#"{
            "base_url": "https://api.example.com",
            "endpoints": [
                {"method": "GET", "path_template": "/users",
                 "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer"}}]},
                {"id": "create_user", "method": "POST", "path_template": "/users"}
            ]
        }"#;
        let catalog = InMemoryCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.base_url(), Some("https://api.example.com"));
        assert_eq!(catalog.list_ids(), vec!["create_user", "get_users"]);
        let users = catalog.get_by_id("get_users").unwrap();
        assert_eq!(users.parameters[0].name, "limit");
    }

    #[test]
    fn malformed_document_is_parse_error() {
        assert!(matches!(
            InMemoryCatalog::from_json_str("{\"endpoints\": 3}"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            InMemoryCatalog::from_file("/no/such/catalog.json"),
            Err(CatalogError::Io(_))
        ));
    }
}
