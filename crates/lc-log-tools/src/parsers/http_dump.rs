//! Raw HTTP request dump parser.
//!
//! A dump is a request line (`POST /users HTTP/1.1`), header lines, a blank
//! line and an optional body. Several dumps may follow each other; a new
//! request line starts the next record.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use lc_protocol::{CallIntent, HttpMethod};
use regex::Regex;

use crate::normalize::{body_from_text, split_url};

static RE_REQUEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS|TRACE)\s+(\S+)\s+HTTP/\d(?:\.\d)?\s*$")
        .unwrap()
});

static RE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][A-Za-z0-9\-_]*):\s*(.*)$").unwrap());

/// Check if a line is an HTTP/1.x request line.
pub fn is_request_line(line: &str) -> bool {
    RE_REQUEST_LINE.is_match(line.trim())
}

/// Split lines into dumps and parse each one.
///
/// Returns `(intent, line_number)` pairs where the line number is that of the
/// request line.
pub fn parse_dumps(lines: &[String]) -> Vec<(CallIntent, usize)> {
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_request_line(l))
        .map(|(i, _)| i)
        .collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(lines.len());
            parse_dump(&lines[start..end]).map(|intent| (intent, start + 1))
        })
        .collect()
}

/// Parse one dump whose first line is the request line.
pub fn parse_dump(lines: &[String]) -> Option<CallIntent> {
    let first = lines.first()?;
    let caps = RE_REQUEST_LINE.captures(first.trim())?;
    let method = HttpMethod::from_token(&caps[1]);
    let target = caps[2].to_string();

    let mut intent = CallIntent::new(method, "");
    let mut body_lines = Vec::new();
    let mut in_body = false;

    for line in &lines[1..] {
        if in_body {
            body_lines.push(line.as_str());
            continue;
        }
        if line.trim().is_empty() {
            in_body = true;
            continue;
        }
        if let Some(h) = RE_HEADER.captures(line.trim_end()) {
            intent.headers.insert(&h[1], h[2].trim());
        }
    }

    let (mut base_url, path, query) = split_url(&target);
    if base_url.is_none() {
        base_url = intent.headers.get("host").map(|host| {
            let scheme = match intent.headers.get("x-forwarded-proto") {
                Some(proto) if proto.eq_ignore_ascii_case("http") => "http",
                _ => "https",
            };
            format!("{scheme}://{host}")
        });
    }

    intent.path_template_hint = path;
    intent.base_url = base_url;
    intent.query_params = query;
    intent.body = body_from_text(&body_lines.join("\n"), intent.headers.get("content-type"));
    intent.raw_text = lines
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string();

    Some(intent)
}

/// Request time from the dump's `Date` header (RFC 2822).
pub fn date_header(intent: &CallIntent) -> Option<DateTime<Utc>> {
    let date = intent.headers.get("date")?;
    DateTime::parse_from_rfc2822(date)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
