//! Shared application state for the Axum server.

use std::sync::Arc;

use lc_engine::judge::HeuristicJudge;
use lc_engine::{CatalogError, EngineConfig, InMemoryCatalog, Pipeline};
use lc_protocol::{EndpointSpec, HttpMethod, ParamLocation, Parameter, RequestBodySpec, Schema, SchemaType};

use crate::error::StateError;

/// Shared application state; the pipeline is an `Arc` handle, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Lexical retrieval and heuristic judgment over the sample catalog
    /// (development and tests).
    pub fn with_sample_catalog() -> Result<Self, StateError> {
        let pipeline = Pipeline::new(
            Arc::new(sample_catalog()?),
            None,
            Some(Arc::new(HeuristicJudge::new())),
            EngineConfig::default(),
        )?;
        Ok(Self::new(pipeline))
    }
}

/// A small user/order API.
pub fn sample_catalog() -> Result<InMemoryCatalog, CatalogError> {
    let auth = || {
        Parameter::new("Authorization", ParamLocation::Header, true, Schema::string())
    };
    let user_id = || {
        Parameter::new("id", ParamLocation::Path, true, Schema::integer().with_range(Some(1.0), None))
    };

    let endpoints = vec![
        EndpointSpec::new(HttpMethod::Get, "/users")
            .with_summary("List users")
            .with_tags(&["users"])
            .with_param(Parameter::new(
                "limit",
                ParamLocation::Query,
                false,
                Schema::integer().with_range(Some(1.0), Some(100.0)),
            )),
        EndpointSpec::new(HttpMethod::Get, "/users/{id}")
            .with_summary("Fetch one user")
            .with_tags(&["users"])
            .with_param(user_id()),
        EndpointSpec::new(HttpMethod::Post, "/users")
            .with_summary("Create a user")
            .with_tags(&["users"])
            .with_param(auth())
            .with_body(RequestBodySpec::json(
                Schema::of(SchemaType::Object)
                    .with_property("name", Schema::string(), true)
                    .with_property("email", Schema::string().with_format("email"), true),
                true,
            )),
        EndpointSpec::new(HttpMethod::Delete, "/users/{id}")
            .with_summary("Delete a user")
            .with_tags(&["users", "admin"])
            .with_param(user_id())
            .with_param(auth()),
        EndpointSpec::new(HttpMethod::Get, "/orders")
            .with_summary("List orders")
            .with_tags(&["orders"])
            .with_param(Parameter::new(
                "status",
                ParamLocation::Query,
                false,
                Schema::string().with_enum(vec!["open".into(), "shipped".into()]),
            )),
    ];

    Ok(InMemoryCatalog::new(endpoints)?.with_base_url("https://api.example.com"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_engine::SpecCatalog;

    #[test]
    fn sample_catalog_loads() {
        let catalog = sample_catalog().unwrap();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.get_by_id("delete_users_id").is_some());
        assert_eq!(catalog.base_url(), Some("https://api.example.com"));
    }
}
