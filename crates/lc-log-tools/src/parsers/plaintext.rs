//! Plaintext log parser with heuristic call detection.
//!
//! Recognizes `METHOD /path` fragments inside access-log style lines and
//! curl invocations; lines with no recognizable call are left to the caller
//! to treat as free text.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use lc_protocol::{CallIntent, HttpMethod, IntentBody};
use regex::Regex;

use crate::normalize::{parse_timestamp, split_url};
use crate::parsers::curl;

// `GET /users`, `method: POST /orders`, quoted access-log request fields
static RE_METHOD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS|TRACE)\s+((?:https?://[^\s"']+)|(?:/[^\s"']*))"#,
    )
    .unwrap()
});

static RE_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:with\s+)?(?:body|data|payload)[\s:=]+['"]?(\{[^}]+\}|\[[^\]]+\])"#)
        .unwrap()
});

static RE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)")
        .unwrap()
});

/// Parse a plaintext line into a structured intent, if it contains a call.
pub fn parse_line(line: &str, line_number: usize) -> Option<CallIntent> {
    if curl::looks_like_curl(line) {
        if let Ok(parsed) = curl::parse_command(line, line_number) {
            return Some(parsed.into_intent(line.trim()));
        }
    }

    let caps = RE_METHOD_PATH.captures(line)?;
    let method = HttpMethod::from_token(&caps[1]);
    let (base_url, path, query) = split_url(&caps[2]);

    let mut intent = CallIntent::new(method, path).with_raw_text(line.trim());
    intent.base_url = base_url;
    intent.query_params = query;
    intent.body = RE_BODY
        .captures(line)
        .map(|b| IntentBody::from_text(&b[1]));
    Some(intent)
}

/// Try to extract a timestamp from a plaintext log line.
pub fn detect_timestamp(line: &str) -> Option<DateTime<Utc>> {
    RE_TIMESTAMP
        .captures(line)
        .and_then(|caps| parse_timestamp(&caps[1]))
}

/// Whether a line contains a `METHOD /path` fragment.
pub fn has_method_path(line: &str) -> bool {
    RE_METHOD_PATH.is_match(line)
}
