//! Shared normalization helpers: URL splitting, bodies, timestamps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lc_protocol::IntentBody;
use url::Url;

/// Split a logged URL or path into `(base_url, path, query)`.
///
/// Absolute URLs yield a base (`https://api.example.com`); relative paths
/// get a leading `/`. Fragments are dropped. Query keys without a value map
/// to an empty string.
pub fn split_url(raw: &str) -> (Option<String>, String, BTreeMap<String, String>) {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        if let Ok(url) = Url::parse(raw) {
            return (
                Some(url.origin().ascii_serialization()),
                decoded_path(&url),
                query_of(&url),
            );
        }
    }

    let relative = format!("/{}", raw.trim_start_matches('/'));
    match Url::parse(RELATIVE_BASE).and_then(|base| base.join(&relative)) {
        Ok(url) => (None, decoded_path(&url), query_of(&url)),
        Err(e) => {
            tracing::debug!(url = raw, error = %e, "Unparseable URL");
            (None, "/".to_string(), BTreeMap::new())
        }
    }
}

const RELATIVE_BASE: &str = "http://relative.invalid/";

/// The URL path with template braces restored (`/users/{id}`).
fn decoded_path(url: &Url) -> String {
    url.path().replace("%7B", "{").replace("%7D", "}")
}

fn query_of(url: &Url) -> BTreeMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Decode an `a=1&b=two` query string.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Build a body from logged text, honouring the declared content type.
///
/// Form-encoded bodies become a JSON object of strings; JSON-looking text is
/// parsed; anything else stays opaque text.
pub fn body_from_text(text: &str, content_type: Option<&str>) -> Option<IntentBody> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("x-www-form-urlencoded") {
        let object: serde_json::Map<String, serde_json::Value> = parse_query(trimmed)
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        return Some(IntentBody::Json(serde_json::Value::Object(object)));
    }
    Some(IntentBody::from_text(trimmed))
}

/// Parse the timestamp shapes commonly found in API logs.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // RFC 3339 first
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // Without timezone (assume UTC)
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .or_else(|| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
                .map(|ndt| ndt.and_utc())
        })
        .or_else(|| {
            // Epoch seconds
            s.parse::<f64>().ok().and_then(|secs| {
                DateTime::from_timestamp(secs as i64, ((secs.fract()) * 1e9) as u32)
            })
        })
}
