//! Multi-format request log parsers with auto-detection.
//!
//! Supports newline-delimited JSON (and single JSON documents), raw HTTP
//! request dumps, logged curl commands, and plaintext lines with heuristic
//! `METHOD /path` detection.

pub mod curl;
pub mod http_dump;
pub mod json_lines;
pub mod plaintext;

use crate::types::{ExtractedIntent, LogFormat};

/// Number of non-empty lines sampled for format detection.
const DETECT_SAMPLE: usize = 10;

/// Auto-detect the log format from a sample of lines.
pub fn detect_format(lines: &[String]) -> LogFormat {
    if lines.is_empty() {
        return LogFormat::Plaintext;
    }

    // HTTP dumps are multi-line; a single request line is enough
    if lines.iter().take(DETECT_SAMPLE * 4).any(|l| http_dump::is_request_line(l)) {
        return LogFormat::HttpDump;
    }

    let sample: Vec<&str> = lines
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .take(DETECT_SAMPLE)
        .collect();

    if sample.is_empty() {
        return LogFormat::Plaintext;
    }

    let mut json_count = 0;
    let mut curl_count = 0;

    for line in &sample {
        if json_lines::looks_like_json(line) {
            json_count += 1;
        } else if curl::looks_like_curl(line) {
            curl_count += 1;
        }
    }

    // Majority vote
    if json_count > sample.len() / 2 {
        return LogFormat::JsonLines;
    }
    if curl_count > sample.len() / 2 {
        return LogFormat::Curl;
    }
    if json_lines::looks_like_document(lines) {
        return LogFormat::JsonLines;
    }

    LogFormat::Plaintext
}

/// Extract intents with auto-format detection.
pub fn extract_intents(lines: &[String]) -> Vec<ExtractedIntent> {
    let format = detect_format(lines);
    tracing::debug!(format = %format, lines = lines.len(), "Detected log format");
    extract_with_format(lines, format)
}

/// Extract intents using the specified format.
///
/// Malformed records are skipped. When no structured call is found anywhere
/// in the input, each non-empty line becomes a free-text intent so the
/// pipeline can still match on its wording.
pub fn extract_with_format(lines: &[String], format: LogFormat) -> Vec<ExtractedIntent> {
    let extracted = match format {
        LogFormat::JsonLines => extract_json(lines),
        LogFormat::HttpDump => http_dump::parse_dumps(lines)
            .into_iter()
            .map(|(intent, line_number)| ExtractedIntent {
                timestamp: http_dump::date_header(&intent),
                intent,
                line_number,
                format,
            })
            .collect(),
        LogFormat::Curl => extract_curl(lines),
        LogFormat::Plaintext => extract_plaintext(lines),
    };

    // JSON records without a path already fall back to their message field
    if extracted.is_empty() && format != LogFormat::JsonLines {
        return free_text_intents(lines);
    }
    extracted
}

fn extract_json(lines: &[String]) -> Vec<ExtractedIntent> {
    let per_line: Vec<ExtractedIntent> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .filter_map(|(i, line)| {
            let (intent, timestamp) = json_lines::parse_line(line)?;
            Some(ExtractedIntent {
                intent,
                line_number: i + 1,
                format: LogFormat::JsonLines,
                timestamp,
            })
        })
        .collect();

    if !per_line.is_empty() {
        return per_line;
    }

    json_lines::parse_document(&lines.join("\n"))
        .into_iter()
        .map(|(intent, timestamp)| ExtractedIntent {
            intent,
            line_number: 1,
            format: LogFormat::JsonLines,
            timestamp,
        })
        .collect()
}

/// Curl commands may span lines with trailing `\` continuations.
fn extract_curl(lines: &[String]) -> Vec<ExtractedIntent> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let start = i;
        let mut command = lines[i].trim_end().to_string();
        while command.ends_with('\\') && i + 1 < lines.len() {
            command.pop();
            i += 1;
            command.push(' ');
            command.push_str(lines[i].trim());
        }
        i += 1;

        if !curl::looks_like_curl(&command) {
            continue;
        }
        match curl::parse_command(&command, start + 1) {
            Ok(parsed) => out.push(ExtractedIntent {
                intent: parsed.into_intent(command.trim()),
                line_number: start + 1,
                format: LogFormat::Curl,
                timestamp: plaintext::detect_timestamp(&command),
            }),
            Err(e) => tracing::debug!(error = %e, "Skipping malformed curl line"),
        }
    }
    out
}

fn extract_plaintext(lines: &[String]) -> Vec<ExtractedIntent> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .filter_map(|(i, line)| {
            let intent = plaintext::parse_line(line, i + 1)?;
            Some(ExtractedIntent {
                intent,
                line_number: i + 1,
                format: LogFormat::Plaintext,
                timestamp: plaintext::detect_timestamp(line),
            })
        })
        .collect()
}

fn free_text_intents(lines: &[String]) -> Vec<ExtractedIntent> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, line)| ExtractedIntent {
            intent: lc_protocol::CallIntent::from_text(line.trim()),
            line_number: i + 1,
            format: LogFormat::Plaintext,
            timestamp: plaintext::detect_timestamp(line),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_protocol::HttpMethod;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detect_json_format() {
        let l = lines(&[
            r#"{"method":"GET","path":"/users"}"#,
            r#"{"method":"POST","path":"/users"}"#,
        ]);
        assert_eq!(detect_format(&l), LogFormat::JsonLines);
    }

    #[test]
    fn detect_pretty_json_document() {
        let l = lines(&["[", r#"  {"method":"GET","path":"/users"}"#, "]"]);
        assert_eq!(detect_format(&l), LogFormat::JsonLines);
    }

    #[test]
    fn detect_http_dump_format() {
        let l = lines(&["GET /users HTTP/1.1", "Host: a.example", "Accept: */*", ""]);
        assert_eq!(detect_format(&l), LogFormat::HttpDump);
    }

    #[test]
    fn detect_curl_format() {
        let l = lines(&["curl http://h/a", "curl -X POST http://h/b -d x=1"]);
        assert_eq!(detect_format(&l), LogFormat::Curl);
    }

    #[test]
    fn detect_plaintext_format() {
        let l = lines(&["2024-01-15 INFO GET /users 200", "2024-01-15 INFO started"]);
        assert_eq!(detect_format(&l), LogFormat::Plaintext);
    }

    #[test]
    fn detect_empty_is_plaintext() {
        assert_eq!(detect_format(&[]), LogFormat::Plaintext);
    }

    #[test]
    fn extract_json_lines_keeps_line_numbers() {
        let l = lines(&[
            r#"{"method":"GET","path":"/users"}"#,
            "",
            r#"{"method":"DELETE","path":"/users/3"}"#,
        ]);
        let out = extract_intents(&l);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].line_number, 3);
        assert_eq!(out[1].intent.method, HttpMethod::Delete);
    }

    #[test]
    fn extract_multiline_curl() {
        let l = lines(&[
            "curl -X POST http://h/orders \\",
            "  -H 'Content-Type: application/json' \\",
            r#"  -d '{"sku":"A1"}'"#,
            "curl http://h/orders/1",
        ]);
        let out = extract_with_format(&l, LogFormat::Curl);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].intent.method, HttpMethod::Post);
        assert!(out[0].intent.body.is_some());
        assert_eq!(out[1].line_number, 4);
    }

    #[test]
    fn plaintext_without_calls_becomes_free_text() {
        let l = lines(&["create a new user named ann", "", "then list all orders"]);
        let out = extract_intents(&l);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].intent.method, HttpMethod::Unknown);
        assert!(out[0].intent.path_template_hint.is_empty());
        assert_eq!(out[1].intent.raw_text, "then list all orders");
        assert_eq!(out[1].line_number, 3);
    }

    #[test]
    fn plaintext_with_calls_drops_noise_lines() {
        let l = lines(&["booting", "2024-01-15 12:00:00 GET /users?limit=5", "done"]);
        let out = extract_intents(&l);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line_number, 2);
        assert!(out[0].timestamp.is_some());
    }

    #[test]
    fn http_dump_extraction() {
        let l = lines(&[
            "POST /users HTTP/1.1",
            "Host: api.example.com",
            "Content-Type: application/json",
            "",
            r#"{"name":"ann"}"#,
        ]);
        let out = extract_intents(&l);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].format, LogFormat::HttpDump);
        assert_eq!(out[0].intent.base_url.as_deref(), Some("https://api.example.com"));
    }
}
