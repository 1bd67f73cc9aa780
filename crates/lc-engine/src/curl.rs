//! Deterministic curl rendering of a matched intent.
//!
//! Output shape: `curl -X METHOD URL -H 'Name: value' ... --data BODY`.
//! Missing required values render as `{name}` placeholders and are listed
//! so the caller knows the command is not executable as-is.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use lc_protocol::{CallIntent, EndpointSpec, IntentBody, ParamLocation};
use serde_json::Value;
use url::Url;

use crate::lexical::is_placeholder_segment;
use crate::validator::{align_path_params, is_placeholder_value};

const MASK: &str = "****";

static FALLBACK_BASE: LazyLock<Url> = LazyLock::new(|| Url::parse("http://localhost").unwrap());

/// Names whose values are masked unless unmasked output is requested.
const SENSITIVE_NAMES: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
    "apikey",
    "x-auth-token",
    "token",
    "access_token",
    "refresh_token",
    "password",
    "secret",
    "client_secret",
];

/// Headers curl computes itself.
const SKIPPED_HEADERS: &[&str] = &["host", "content-length"];

pub fn is_sensitive(name: &str) -> bool {
    SENSITIVE_NAMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emit sensitive values verbatim.
    pub unmasked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCurl {
    pub command: String,
    /// Placeholder tokens in the order they were rendered.
    pub placeholders: Vec<String>,
}

pub struct CurlGenerator {
    default_base_url: String,
}

impl CurlGenerator {
    pub fn new(default_base_url: impl Into<String>) -> Self {
        Self {
            default_base_url: default_base_url.into(),
        }
    }

    /// Render `intent` as a call to `endpoint`.
    ///
    /// The base URL is the intent's, then the catalog's, then the configured
    /// default.
    pub fn render(
        &self,
        endpoint: &EndpointSpec,
        intent: &CallIntent,
        catalog_base: Option<&str>,
        options: &RenderOptions,
    ) -> RenderedCurl {
        let mut placeholders = Vec::new();
        let url = self.render_url(endpoint, intent, catalog_base, options, &mut placeholders);

        let mut args: Vec<String> = vec![
            "curl".into(),
            "-X".into(),
            endpoint.method.as_str().into(),
            url,
        ];

        let mut body_placeholders = Vec::new();
        let body = render_body(endpoint, intent, options, &mut body_placeholders);
        for (name, value) in render_headers(endpoint, intent, body.as_ref(), options, &mut placeholders) {
            args.push("-H".into());
            args.push(format!("{name}: {value}"));
        }
        placeholders.extend(body_placeholders);
        if let Some(body) = body {
            args.push("--data".into());
            args.push(body.text);
        }

        let command = args
            .iter()
            .map(|a| shell_words::quote(a).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        RenderedCurl {
            command,
            placeholders,
        }
    }

    fn base_url(&self, intent: &CallIntent, catalog_base: Option<&str>) -> Url {
        [intent.base_url.as_deref(), catalog_base, Some(self.default_base_url.as_str())]
            .into_iter()
            .flatten()
            .filter_map(|candidate| match Url::parse(candidate) {
                Ok(url) if !url.cannot_be_a_base() => Some(url),
                Ok(_) | Err(_) => {
                    tracing::debug!(base_url = candidate, "Skipping unusable base URL");
                    None
                }
            })
            .next()
            .unwrap_or_else(|| FALLBACK_BASE.clone())
    }

    fn render_url(
        &self,
        endpoint: &EndpointSpec,
        intent: &CallIntent,
        catalog_base: Option<&str>,
        options: &RenderOptions,
        placeholders: &mut Vec<String>,
    ) -> String {
        let mut url = self.base_url(intent, catalog_base);
        url.set_query(None);
        url.set_fragment(None);

        let template = endpoint.path_segments();
        let values = align_path_params(&template, &intent.path_tokens());
        // Encoded forms of rendered placeholders, restored after serialization
        let mut restore: BTreeSet<String> = BTreeSet::new();

        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for segment in &template {
                if is_placeholder_segment(segment) {
                    let name = segment
                        .trim_start_matches(':')
                        .trim_start_matches('{')
                        .trim_end_matches('}');
                    match values.get(name) {
                        Some(value) => {
                            segments.push(value);
                        }
                        None => {
                            let token = format!("{{{name}}}");
                            restore.insert(token.clone());
                            placeholders.push(token.clone());
                            segments.push(&token);
                        }
                    }
                } else {
                    segments.push(segment);
                }
            }
        }

        let query = render_query(endpoint, intent, options, placeholders, &mut restore);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &query {
                pairs.append_pair(name, value);
            }
        }

        let mut rendered = url.to_string();
        for token in &restore {
            let encoded = token.replace('{', "%7B").replace('}', "%7D");
            rendered = rendered.replace(&encoded, token);
        }
        rendered
    }
}

/// Declared query params in declared order, then undeclared ones by key.
fn render_query(
    endpoint: &EndpointSpec,
    intent: &CallIntent,
    options: &RenderOptions,
    placeholders: &mut Vec<String>,
    restore: &mut BTreeSet<String>,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut declared = BTreeSet::new();

    for param in endpoint.params_in(ParamLocation::Query) {
        declared.insert(param.name.as_str());
        match intent
            .query_params
            .get(&param.name)
            .filter(|v| !is_placeholder_value(v))
        {
            Some(value) => pairs.push((param.name.clone(), mask(&param.name, value, options))),
            None if param.required => {
                let token = format!("{{{}}}", param.name);
                restore.insert(token.clone());
                placeholders.push(token.clone());
                pairs.push((param.name.clone(), token));
            }
            None => {}
        }
    }

    for (name, value) in &intent.query_params {
        if declared.contains(name.as_str()) {
            continue;
        }
        if is_placeholder_value(value) {
            let token = format!("{{{name}}}");
            restore.insert(token.clone());
            placeholders.push(token.clone());
            pairs.push((name.clone(), token));
        } else {
            pairs.push((name.clone(), mask(name, value, options)));
        }
    }
    pairs
}

/// Declared headers first, then the intent's remaining headers by name.
fn render_headers(
    endpoint: &EndpointSpec,
    intent: &CallIntent,
    body: Option<&RenderedBody>,
    options: &RenderOptions,
    placeholders: &mut Vec<String>,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for param in endpoint.params_in(ParamLocation::Header) {
        let key = param.name.to_ascii_lowercase();
        if SKIPPED_HEADERS.contains(&key.as_str()) || !seen.insert(key) {
            continue;
        }
        match intent
            .headers
            .get(&param.name)
            .filter(|v| !is_placeholder_value(v))
        {
            Some(value) => headers.push((param.name.clone(), mask(&param.name, value, options))),
            None if param.required => {
                let token = format!("{{{}}}", param.name);
                placeholders.push(token.clone());
                headers.push((param.name.clone(), token));
            }
            None => {}
        }
    }

    for (name, value) in intent.headers.iter() {
        let key = name.to_ascii_lowercase();
        if SKIPPED_HEADERS.contains(&key.as_str()) || !seen.insert(key) {
            continue;
        }
        headers.push((name.to_string(), mask(name, value, options)));
    }

    if let Some(body) = body {
        if !seen.contains("content-type") {
            headers.push(("Content-Type".into(), body.content_type.clone()));
        }
    }
    headers
}

struct RenderedBody {
    text: String,
    content_type: String,
}

/// Serialize the intent body per the endpoint's declared content type.
fn render_body(
    endpoint: &EndpointSpec,
    intent: &CallIntent,
    options: &RenderOptions,
    placeholders: &mut Vec<String>,
) -> Option<RenderedBody> {
    let declared = endpoint.request_body.as_ref();
    match &intent.body {
        Some(IntentBody::Json(value)) => {
            let value = mask_json(value, options);
            let is_form = declared.is_some_and(|b| b.is_form());
            let text = match (&value, is_form) {
                (Value::Object(map), true) => {
                    let mut form = url::form_urlencoded::Serializer::new(String::new());
                    for (k, v) in map {
                        match v {
                            Value::String(s) => form.append_pair(k, s),
                            other => form.append_pair(k, &other.to_string()),
                        };
                    }
                    form.finish()
                }
                _ => value.to_string(),
            };
            let content_type = declared
                .map(|b| b.content_type.clone())
                .unwrap_or_else(|| "application/json".into());
            Some(RenderedBody { text, content_type })
        }
        Some(IntentBody::Text(text)) => Some(RenderedBody {
            text: text.clone(),
            content_type: declared
                .map(|b| b.content_type.clone())
                .unwrap_or_else(|| "text/plain".into()),
        }),
        None => match declared {
            Some(spec) if spec.required => {
                let token = "{body}".to_string();
                placeholders.push(token.clone());
                Some(RenderedBody {
                    text: token,
                    content_type: spec.content_type.clone(),
                })
            }
            _ => None,
        },
    }
}

fn mask(name: &str, value: &str, options: &RenderOptions) -> String {
    if !options.unmasked && is_sensitive(name) {
        MASK.to_string()
    } else {
        value.to_string()
    }
}

fn mask_json(value: &Value, options: &RenderOptions) -> Value {
    if options.unmasked {
        return value.clone();
    }
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) && !v.is_object() && !v.is_array() {
                        Value::String(MASK.into())
                    } else {
                        mask_json(v, options)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| mask_json(v, options)).collect()),
        other => other.clone(),
    }
}
