//! Logged curl command parser.
//!
//! Tokenizes with `shell-words` so quoting matches what a shell would do,
//! then walks the flags curl users actually log.

use lc_protocol::{CallIntent, HttpMethod};

use crate::error::{LogError, LogResult};
use crate::normalize::{body_from_text, split_url};

/// Flags that consume the following token and are irrelevant to the call.
const SKIPPED_ARG_FLAGS: &[&str] = &[
    "-o",
    "--output",
    "-u",
    "--user",
    "-A",
    "--user-agent",
    "-e",
    "--referer",
    "-m",
    "--max-time",
    "--connect-timeout",
    "-w",
    "--write-out",
    "--retry",
    "-x",
    "--proxy",
    "--cacert",
    "--cert",
    "--key",
    "-c",
    "--cookie-jar",
    "-T",
    "--upload-file",
];

/// A curl invocation decomposed into its request parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCurl {
    pub method: HttpMethod,
    pub url: String,
    /// Headers in command-line order.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ParsedCurl {
    /// Convert into a `CallIntent`, splitting the URL and parsing the body.
    pub fn into_intent(self, raw_text: &str) -> CallIntent {
        let (base_url, path, query) = split_url(&self.url);
        let content_type = self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone());

        let mut intent = CallIntent::new(self.method, path).with_raw_text(raw_text);
        intent.base_url = base_url;
        intent.query_params = query;
        for (name, value) in self.headers {
            intent.headers.insert(name, value);
        }
        intent.body = self
            .body
            .as_deref()
            .and_then(|b| body_from_text(b, content_type.as_deref()));
        intent
    }
}

/// Whether a line contains a curl invocation.
pub fn looks_like_curl(line: &str) -> bool {
    line.split_whitespace()
        .any(|token| token == "curl" || token.ends_with("/curl"))
}

/// Parse a single curl command line.
///
/// Text before the `curl` token (timestamps, prompts) is ignored. The method
/// defaults to POST when a body is present and GET otherwise, which is what
/// curl itself sends.
pub fn parse_curl_command(command: &str) -> LogResult<ParsedCurl> {
    parse_command(command, 1)
}

pub(crate) fn parse_command(command: &str, line_number: usize) -> LogResult<ParsedCurl> {
    let start = command
        .find("curl ")
        .or_else(|| command.trim_end().ends_with("curl").then_some(0))
        .ok_or_else(|| LogError::Parse {
            line: line_number,
            message: "no curl invocation found".into(),
        })?;

    // Line continuations are collapsed before tokenizing
    let joined = command[start..].replace("\\\n", " ");
    let tokens = shell_words::split(&joined).map_err(|e| LogError::Parse {
        line: line_number,
        message: format!("unbalanced quoting: {e}"),
    })?;

    let mut method = None;
    let mut url = None;
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut body: Option<String> = None;

    let mut iter = tokens.into_iter().skip(1);
    while let Some(token) = iter.next() {
        let (flag, inline) = split_flag(&token);
        match flag {
            "-X" | "--request" => {
                if let Some(v) = inline.or_else(|| iter.next()) {
                    method = Some(HttpMethod::from_token(&v));
                }
            }
            "-H" | "--header" => {
                let header = inline.or_else(|| iter.next());
                if let Some(pair) = header.as_deref().and_then(split_header) {
                    headers.push(pair);
                }
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-ascii"
            | "--data-urlencode" => {
                if let Some(v) = inline.or_else(|| iter.next()) {
                    body = Some(match body {
                        Some(prev) => format!("{prev}&{v}"),
                        None => v,
                    });
                }
            }
            "--json" => {
                if let Some(v) = inline.or_else(|| iter.next()) {
                    body = Some(v);
                    if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-type")) {
                        headers.push(("Content-Type".into(), "application/json".into()));
                    }
                }
            }
            "-b" | "--cookie" => {
                if let Some(v) = inline.or_else(|| iter.next()) {
                    headers.push(("Cookie".into(), v));
                }
            }
            "--url" => {
                url = inline.or_else(|| iter.next());
            }
            "-I" | "--head" => method = Some(HttpMethod::Head),
            f if SKIPPED_ARG_FLAGS.contains(&f) => {
                if inline.is_none() {
                    iter.next();
                }
            }
            f if f.starts_with('-') => {}
            _ => {
                if url.is_none() {
                    url = Some(token.clone());
                }
            }
        }
    }

    let url = url.ok_or_else(|| LogError::Parse {
        line: line_number,
        message: "curl command has no URL".into(),
    })?;

    let method = method.unwrap_or(if body.is_some() {
        HttpMethod::Post
    } else {
        HttpMethod::Get
    });

    Ok(ParsedCurl {
        method,
        url,
        headers,
        body,
    })
}

/// Short flags that take a value, which may also be attached (`-XDELETE`).
const SHORT_VALUE_FLAGS: &[&str] = &[
    "-X", "-H", "-d", "-b", "-u", "-o", "-A", "-e", "-m", "-w", "-x", "-c", "-T",
];

/// Split `--flag=value` or `-Fvalue` into its parts.
fn split_flag(token: &str) -> (&str, Option<String>) {
    if token.starts_with("--") {
        if let Some((flag, value)) = token.split_once('=') {
            return (flag, Some(value.to_string()));
        }
    } else if token.len() > 2 && token.is_char_boundary(2) {
        let (flag, value) = token.split_at(2);
        if SHORT_VALUE_FLAGS.contains(&flag) {
            return (flag, Some(value.to_string()));
        }
    }
    (token, None)
}

fn split_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_protocol::IntentBody;
    use serde_json::json;

    #[test]
    fn parse_full_command() {
        let cmd = r#"curl -X POST 'https://api.example.com/users?notify=true' -H 'Content-Type: application/json' -H "Authorization: Bearer t0k" --data '{"name":"ann"}'"#;
        let parsed = parse_curl_command(cmd).unwrap();
        assert_eq!(parsed.method, HttpMethod::Post);
        assert_eq!(parsed.url, "https://api.example.com/users?notify=true");
        assert_eq!(parsed.headers.len(), 2);
        assert_eq!(parsed.headers[1].1, "Bearer t0k");
        assert_eq!(parsed.body.as_deref(), Some(r#"{"name":"ann"}"#));
    }

    #[test]
    fn method_defaults_follow_body() {
        assert_eq!(
            parse_curl_command("curl http://h/users").unwrap().method,
            HttpMethod::Get
        );
        assert_eq!(
            parse_curl_command("curl http://h/users -d a=1").unwrap().method,
            HttpMethod::Post
        );
    }

    #[test]
    fn prefix_text_is_ignored() {
        let parsed =
            parse_curl_command("2024-01-15 12:00:00 DEBUG replay: curl -s -o /dev/null http://h/ping")
                .unwrap();
        assert_eq!(parsed.url, "http://h/ping");
        assert!(parsed.headers.is_empty());
    }

    #[test]
    fn long_flags_with_inline_values() {
        let parsed =
            parse_curl_command("curl --request=DELETE --url=http://h/users/7 --header='X-Trace: 1'")
                .unwrap();
        assert_eq!(parsed.method, HttpMethod::Delete);
        assert_eq!(parsed.url, "http://h/users/7");
        assert_eq!(parsed.headers, vec![("X-Trace".into(), "1".into())]);
    }

    #[test]
    fn short_flags_with_attached_values() {
        let parsed = parse_curl_command("curl -XDELETE https://api.example.com/users/1").unwrap();
        assert_eq!(parsed.method, HttpMethod::Delete);
        assert_eq!(parsed.url, "https://api.example.com/users/1");

        let parsed =
            parse_curl_command("curl -H'Accept: text/plain' -dname=bob -uadmin:pw -sS http://h/users")
                .unwrap();
        assert_eq!(parsed.method, HttpMethod::Post);
        assert_eq!(parsed.url, "http://h/users");
        assert_eq!(parsed.headers, vec![("Accept".into(), "text/plain".into())]);
        assert_eq!(parsed.body.as_deref(), Some("name=bob"));
    }

    #[test]
    fn json_flag_sets_content_type() {
        let parsed = parse_curl_command(r#"curl --json '{"a":1}' http://h/items"#).unwrap();
        assert_eq!(parsed.method, HttpMethod::Post);
        assert!(parsed.headers.iter().any(|(n, v)| n == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn cookie_becomes_header() {
        let parsed = parse_curl_command("curl -b 'sid=abc' http://h/me").unwrap();
        assert_eq!(parsed.headers, vec![("Cookie".into(), "sid=abc".into())]);
    }

    #[test]
    fn missing_url_is_parse_error() {
        let err = parse_curl_command("curl -X GET").unwrap_err();
        assert!(matches!(err, LogError::Parse { line: 1, .. }));
    }

    #[test]
    fn unbalanced_quote_is_parse_error() {
        assert!(parse_curl_command("curl 'http://h/users").is_err());
        assert!(parse_curl_command("wget http://h/users").is_err());
    }

    #[test]
    fn into_intent_splits_url_and_body() {
        let cmd = r#"curl -X PUT 'https://api.example.com/users/42?dry=1' -H 'Content-Type: application/json' -d '{"name":"bo"}'"#;
        let intent = parse_curl_command(cmd).unwrap().into_intent(cmd);
        assert_eq!(intent.method, HttpMethod::Put);
        assert_eq!(intent.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(intent.path_template_hint, "/users/42");
        assert_eq!(intent.query_params["dry"], "1");
        assert_eq!(intent.body, Some(IntentBody::Json(json!({"name": "bo"}))));
        assert_eq!(intent.raw_text, cmd);
    }

    #[test]
    fn form_data_is_decoded() {
        let cmd = "curl -H 'Content-Type: application/x-www-form-urlencoded' -d 'a=1' -d 'b=two' http://h/forms";
        let intent = parse_curl_command(cmd).unwrap().into_intent(cmd);
        assert_eq!(intent.body, Some(IntentBody::Json(json!({"a": "1", "b": "two"}))));
    }

    #[test]
    fn detects_curl_lines() {
        assert!(looks_like_curl("curl http://h"));
        assert!(looks_like_curl("$ /usr/bin/curl -s http://h"));
        assert!(!looks_like_curl("curling results"));
    }
}
