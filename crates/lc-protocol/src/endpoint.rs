use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::intent::HttpMethod;

/// Where a declared parameter lives in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
    Body,
}

impl ParamLocation {
    /// Prefix used in validation field paths (`query.limit`, `headers.Authorization`).
    pub fn field_prefix(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "headers",
            Self::Body => "body",
        }
    }
}

/// JSON-Schema primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// The JSON-Schema subset the validator understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Schema {
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_enum(mut self, values: Vec<serde_json::Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: Schema, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    pub fn with_items(mut self, items: Schema) -> Self {
        self.items = Some(Box::new(items));
        self
    }
}

/// A declared endpoint parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, location: ParamLocation, required: bool, schema: Schema) -> Self {
        Self {
            name: name.into(),
            location,
            required,
            schema,
            description: None,
        }
    }

    /// Field path used in validation reports.
    pub fn field_path(&self) -> String {
        format!("{}.{}", self.location.field_prefix(), self.name)
    }
}

/// Declared request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBodySpec {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

fn default_content_type() -> String {
    "application/json".into()
}

impl RequestBodySpec {
    pub fn json(schema: Schema, required: bool) -> Self {
        Self {
            content_type: default_content_type(),
            required,
            schema: Some(schema),
        }
    }

    pub fn is_json(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("json")
    }

    pub fn is_form(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("x-www-form-urlencoded")
    }
}

/// One endpoint of the loaded catalog. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Derived from method + path when absent in the source catalog.
    #[serde(default)]
    pub id: String,
    pub method: HttpMethod,
    pub path_template: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl EndpointSpec {
    pub fn new(method: HttpMethod, path_template: impl Into<String>) -> Self {
        let path_template = path_template.into();
        Self {
            id: Self::derive_id(method, &path_template),
            method,
            path_template,
            parameters: Vec::new(),
            request_body: None,
            tags: Vec::new(),
            summary: String::new(),
        }
    }

    /// `GET /users/{id}` → `get_users_id`.
    pub fn derive_id(method: HttpMethod, path_template: &str) -> String {
        let clean = path_template.replace('/', "_").replace(['{', '}'], "");
        format!("{}{}", method.as_str().to_ascii_lowercase(), clean)
    }

    pub fn with_param(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn with_body(mut self, body: RequestBodySpec) -> Self {
        self.request_body = Some(body);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Template segments, e.g. `["users", "{id}"]`.
    pub fn path_segments(&self) -> Vec<&str> {
        self.path_template
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn params_in(&self, location: ParamLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    /// SHA-256 over the canonical JSON form, for cache invalidation.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Text representation used by retrieval backends.
    pub fn search_text(&self) -> String {
        let mut parts = vec![format!("{} {}", self.method, self.path_template)];
        if !self.summary.is_empty() {
            parts.push(format!("Summary: {}", self.summary));
        }
        if !self.tags.is_empty() {
            parts.push(format!("Tags: {}", self.tags.join(", ")));
        }
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|p| {
                    let mut s = format!("{} ({})", p.name, p.location.field_prefix());
                    if p.required {
                        s.push_str(" [required]");
                    }
                    s
                })
                .collect();
            parts.push(format!("Parameters: {}", params.join("; ")));
        }
        parts.join("\n")
    }
}
