use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// HTTP verb of an extracted call.
///
/// `Unknown` is the default: extraction never guesses a verb the log
/// didn't carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    #[default]
    Unknown,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Case-insensitive parse. Anything outside the fixed verb set is `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Headers ───────────────────────────────────────────────────

/// Header map with case-insensitive lookup.
///
/// Keys are matched on their lower-cased form; the casing first seen is kept
/// for rendering. Iteration order is by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Headers {
    entries: BTreeMap<String, (String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header. Replacing keeps the original name casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.get_mut(&key) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key, (name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// `(original_name, value)` pairs ordered by lower-cased name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map {
            headers.insert(name, value);
        }
        headers
    }
}

impl From<Headers> for BTreeMap<String, String> {
    fn from(headers: Headers) -> Self {
        headers.entries.into_values().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// ── Body ──────────────────────────────────────────────────────

/// Request body as found in the log: structured JSON or opaque text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IntentBody {
    Json(serde_json::Value),
    Text(String),
}

impl IntentBody {
    /// Wrap raw text, promoting it to JSON when it parses as an object or array.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str(trimmed) {
                return Self::Json(value);
            }
        }
        Self::Text(text.to_string())
    }

    fn canonical(&self) -> serde_json::Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Text(t) => serde_json::Value::String(t.trim().to_string()),
        }
    }
}

// ── CallIntent ────────────────────────────────────────────────

/// An intent that cannot enter the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("intent has neither a path hint nor raw text")]
    Empty,
}

/// Canonical API call extracted from a log record or free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallIntent {
    #[serde(default)]
    pub method: HttpMethod,
    /// Path as seen in the log, possibly partial (`/users/42`, `users`).
    #[serde(default)]
    pub path_template_hint: String,
    /// Scheme and host, when the source carried an absolute URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<IntentBody>,
    /// Original source fragment, kept for audit.
    #[serde(default)]
    pub raw_text: String,
}

impl CallIntent {
    pub fn new(method: HttpMethod, path_hint: impl Into<String>) -> Self {
        Self {
            method,
            path_template_hint: path_hint.into(),
            ..Self::default()
        }
    }

    /// Free-text intent with no structured call information.
    pub fn from_text(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: IntentBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_text = raw.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Reject intents that carry nothing to match on.
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.path_template_hint.trim().is_empty() && self.raw_text.trim().is_empty() {
            return Err(IntentError::Empty);
        }
        Ok(())
    }

    /// Path hint with surrounding whitespace and a trailing `/` removed.
    pub fn normalized_path(&self) -> &str {
        let trimmed = self.path_template_hint.trim();
        if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        }
    }

    /// Non-empty `/`-separated segments of the path hint.
    pub fn path_tokens(&self) -> Vec<&str> {
        self.normalized_path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Text handed to the vector-search capability.
    pub fn query_text(&self) -> String {
        let mut parts = Vec::new();
        if self.method.is_known() {
            parts.push(self.method.as_str().to_string());
        }
        if !self.normalized_path().is_empty() {
            parts.push(self.normalized_path().to_string());
        }
        if !self.raw_text.trim().is_empty() {
            parts.push(self.raw_text.trim().to_string());
        }
        parts.join(" ")
    }

    /// Stable SHA-256 digest of the normalized intent.
    ///
    /// `raw_text` only participates when there is no path hint, so the same
    /// call logged at different times maps to the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let headers: BTreeMap<String, &str> = self
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        let path = self.normalized_path();
        let raw = if path.is_empty() {
            self.raw_text.trim()
        } else {
            ""
        };
        let canonical = json!({
            "method": self.method.as_str(),
            "path": path,
            "base_url": self.base_url.as_deref().map(|b| b.trim_end_matches('/')),
            "headers": headers,
            "query": self.query_params,
            "body": self.body.as_ref().map(IntentBody::canonical),
            "raw": raw,
        });

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
