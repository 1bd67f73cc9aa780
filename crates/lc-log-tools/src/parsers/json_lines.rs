//! Newline-delimited JSON request log parser.
//!
//! Also accepts a single JSON document (object or array of objects) spread
//! over several lines, as exported by most API gateways.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lc_protocol::{CallIntent, HttpMethod, IntentBody};
use serde_json::{Map, Value};

use crate::normalize::{body_from_text, parse_query, parse_timestamp, split_url};

const METHOD_FIELDS: &[&str] = &["method", "http_method", "request_method", "verb"];
const PATH_FIELDS: &[&str] = &["path", "url", "endpoint", "uri", "request_path", "request_url"];
const HEADER_FIELDS: &[&str] = &["headers", "request_headers", "http_headers"];
const BODY_FIELDS: &[&str] = &["body", "request_body", "data", "payload"];
const QUERY_FIELDS: &[&str] = &["query", "query_params", "query_string", "params"];
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "time", "ts", "@timestamp", "datetime", "created_at"];
const MESSAGE_FIELDS: &[&str] = &["message", "msg", "text", "description"];

/// Parse one JSON line into an intent and its timestamp.
///
/// Returns `None` for lines that are not JSON objects or carry neither a
/// path nor a message.
pub fn parse_line(line: &str) -> Option<(CallIntent, Option<DateTime<Utc>>)> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let map = value.as_object()?;
    parse_object(map, line.trim())
}

/// Parse a whole multi-line JSON document.
///
/// Arrays yield one intent per object element; every intent gets line 1.
pub fn parse_document(text: &str) -> Vec<(CallIntent, Option<DateTime<Utc>>)> {
    let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
        return Vec::new();
    };
    match &value {
        Value::Object(map) => parse_object(map, &value.to_string()).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let map = item.as_object()?;
                parse_object(map, &item.to_string())
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Check if a line looks like a JSON object.
pub fn looks_like_json(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

/// Whether the whole input is one JSON document rather than one object per line.
pub fn looks_like_document(lines: &[String]) -> bool {
    let text = lines.join("\n");
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }
    serde_json::from_str::<Value>(&text).is_ok()
}

fn parse_object(map: &Map<String, Value>, raw: &str) -> Option<(CallIntent, Option<DateTime<Utc>>)> {
    // Gateways often nest the request; fall back to the top level.
    let request = match find_field(map, &["request"]) {
        Some(Value::Object(inner)) => inner,
        _ => map,
    };

    let timestamp = find_field(map, TIMESTAMP_FIELDS)
        .or_else(|| find_field(request, TIMESTAMP_FIELDS))
        .and_then(|v| parse_timestamp(&value_to_string(v)));

    let Some(path_value) = find_field(request, PATH_FIELDS).and_then(Value::as_str) else {
        let message = find_field(map, MESSAGE_FIELDS).and_then(Value::as_str)?;
        return Some((CallIntent::from_text(message), timestamp));
    };

    let method = find_field(request, METHOD_FIELDS)
        .and_then(Value::as_str)
        .map(HttpMethod::from_token)
        .unwrap_or_default();

    let (base_url, path, mut query) = split_url(path_value);
    if query.is_empty() {
        query = find_field(request, QUERY_FIELDS)
            .map(query_from_value)
            .unwrap_or_default();
    }

    let mut intent = CallIntent::new(method, path).with_raw_text(raw);
    intent.base_url = base_url;
    intent.query_params = query;

    if let Some(Value::Object(headers)) = find_field(request, HEADER_FIELDS) {
        for (name, value) in headers {
            intent.headers.insert(name.clone(), value_to_string(value));
        }
    }

    intent.body = find_field(request, BODY_FIELDS).and_then(|body| match body {
        Value::Null => None,
        Value::String(s) => body_from_text(s, intent.headers.get("content-type")),
        other => Some(IntentBody::Json(other.clone())),
    });

    Some((intent, timestamp))
}

/// Case-insensitive field lookup following a priority list.
fn find_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn query_from_value(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
        Value::String(s) => parse_query(s.trim_start_matches('?')),
        _ => BTreeMap::new(),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
