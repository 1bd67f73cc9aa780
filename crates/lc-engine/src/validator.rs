//! Schema validation of a `CallIntent` against its matched endpoint.
//!
//! Validation never fails: every problem becomes a `FieldError` or a
//! `missing_required` entry in the report, and all violations are collected
//! rather than stopping at the first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use lc_protocol::{
    CallIntent, EndpointSpec, FieldError, IntentBody, ParamLocation, RequestBodySpec, Schema,
    SchemaType, ValidationReport,
};
use regex::Regex;
use serde_json::Value;

use crate::lexical::is_placeholder_segment;

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\{[^{}]+\}|:[A-Za-z_][A-Za-z0-9_]*)$").unwrap());

/// Whether `value` is an unfilled template token such as `{id}`.
pub fn is_placeholder_value(value: &str) -> bool {
    RE_PLACEHOLDER.is_match(value.trim())
}

/// Path parameter values found by aligning the hint with the template.
///
/// Equal lengths align position by position; a shorter hint aligns from the
/// left (trailing parameters missing) and a longer one from the right (a
/// mount prefix such as `/api/v1`). Alignment is rejected when a static
/// template segment disagrees with the hint.
pub fn align_path_params(template: &[&str], hint: &[&str]) -> BTreeMap<String, String> {
    let offset = hint.len().saturating_sub(template.len());

    let mut values = BTreeMap::new();
    for (segment, value) in template.iter().zip(&hint[offset..]) {
        if is_placeholder_segment(segment) {
            if !is_placeholder_value(value) {
                values.insert(param_name(segment).to_string(), value.to_string());
            }
        } else if !segment.eq_ignore_ascii_case(value) {
            return BTreeMap::new();
        }
    }
    values
}

fn param_name(segment: &str) -> &str {
    segment
        .trim_start_matches(':')
        .trim_start_matches('{')
        .trim_end_matches('}')
}

/// Validate `intent` against `endpoint`.
pub fn validate(endpoint: &EndpointSpec, intent: &CallIntent) -> ValidationReport {
    let mut findings = Findings::default();

    let path_values = align_path_params(&endpoint.path_segments(), &intent.path_tokens());
    let body_json = match &intent.body {
        Some(IntentBody::Json(v)) => Some(v),
        _ => None,
    };
    let body_schema = endpoint.request_body.as_ref().and_then(|b| b.schema.as_ref());
    let text_body = matches!(intent.body, Some(IntentBody::Text(_)));
    let parse_error_reported = text_body
        && endpoint
            .request_body
            .as_ref()
            .is_some_and(|spec| body_needs_structure(spec) && spec.schema.is_some());

    for param in &endpoint.parameters {
        let field = param.field_path();
        match param.location {
            ParamLocation::Path => check_text_param(
                &mut findings,
                &field,
                param.required,
                path_values.get(&param.name).map(String::as_str),
                &param.schema,
            ),
            ParamLocation::Query => check_text_param(
                &mut findings,
                &field,
                param.required,
                intent.query_params.get(&param.name).map(String::as_str),
                &param.schema,
            ),
            ParamLocation::Header => check_text_param(
                &mut findings,
                &field,
                param.required,
                intent.headers.get(&param.name),
                &param.schema,
            ),
            ParamLocation::Body => {
                let value = body_json
                    .and_then(Value::as_object)
                    .and_then(|o| o.get(&param.name));
                match value {
                    // The body schema walk checks its own properties
                    Some(_) if body_schema.is_some_and(|s| s.properties.contains_key(&param.name)) => {}
                    Some(v) => check_value(&mut findings, &field, v, &param.schema),
                    // Already reported once, under `body`
                    None if param.required && parse_error_reported => {}
                    None if param.required => {
                        findings.missing(field);
                        if text_body {
                            findings.unparseable = true;
                        }
                    }
                    None => {}
                }
            }
        }
    }

    if let Some(spec) = &endpoint.request_body {
        match &intent.body {
            None if spec.required => findings.missing("body".to_string()),
            None => {}
            Some(IntentBody::Json(value)) => {
                if let Some(schema) = &spec.schema {
                    check_value(&mut findings, "body", value, schema);
                }
            }
            Some(IntentBody::Text(_)) => {
                if body_needs_structure(spec) && spec.schema.is_some() {
                    findings.error("body", "parse", format!("body is not parseable as {}", spec.content_type));
                    findings.unparseable = true;
                }
            }
        }
    }

    let report = findings.into_report();
    tracing::debug!(
        endpoint = %endpoint.id,
        status = ?report.status,
        errors = report.field_errors.len(),
        missing = report.missing_required.len(),
        "Validated intent"
    );
    report
}

/// Whether a text body cannot be checked against `spec` without parsing.
fn body_needs_structure(spec: &RequestBodySpec) -> bool {
    spec.is_json()
        || spec.is_form()
        || spec.schema.as_ref().is_some_and(|s| {
            matches!(s.schema_type, Some(SchemaType::Object | SchemaType::Array))
                || !s.properties.is_empty()
        })
}

#[derive(Default)]
struct Findings {
    errors: Vec<FieldError>,
    missing: BTreeSet<String>,
    unparseable: bool,
}

impl Findings {
    fn error(&mut self, path: &str, rule: &str, message: String) {
        self.errors.push(FieldError {
            field_path: path.to_string(),
            rule: rule.to_string(),
            message,
        });
    }

    fn missing(&mut self, path: String) {
        self.missing.insert(path);
    }

    fn into_report(self) -> ValidationReport {
        ValidationReport::from_findings(self.errors, self.missing, self.unparseable)
    }
}

// ── Text-valued parameters ────────────────────────────────────

/// Path, query and header values arrive as text: coerce, then check.
fn check_text_param(
    findings: &mut Findings,
    path: &str,
    required: bool,
    raw: Option<&str>,
    schema: &Schema,
) {
    let raw = raw.filter(|v| !is_placeholder_value(v));
    let Some(raw) = raw else {
        if required {
            findings.missing(path.to_string());
        }
        return;
    };

    match coerce(raw, schema) {
        Ok(value) => check_value(findings, path, &value, schema),
        Err(expected) => findings.error(
            path,
            "type",
            format!("expected {expected}, got '{raw}'"),
        ),
    }
}

/// Convert text to the JSON value the schema expects.
fn coerce(raw: &str, schema: &Schema) -> Result<Value, &'static str> {
    let trimmed = raw.trim();
    match schema.schema_type {
        Some(SchemaType::Integer) => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| "integer"),
        Some(SchemaType::Number) => trimmed
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Value::from)
            .ok_or("number"),
        Some(SchemaType::Boolean) => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err("boolean"),
        },
        Some(SchemaType::Array) => {
            let items = schema.items.as_deref();
            trimmed
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|item| match items {
                    Some(item_schema) => coerce(item, item_schema),
                    None => Ok(Value::String(item.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
                .map_err(|_| "array")
        }
        Some(SchemaType::Object) => serde_json::from_str::<Value>(trimmed)
            .ok()
            .filter(Value::is_object)
            .ok_or("object"),
        Some(SchemaType::String) | None => Ok(Value::String(raw.to_string())),
    }
}

// ── Structured values ─────────────────────────────────────────

fn check_value(findings: &mut Findings, path: &str, value: &Value, schema: &Schema) {
    if let Some(expected) = schema.schema_type {
        if !type_matches(value, expected) {
            findings.error(
                path,
                "type",
                format!("expected {}, got {}", expected.as_str(), json_type_name(value)),
            );
            return;
        }
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.iter().any(|a| json_eq(a, value)) {
            findings.error(path, "enum", format!("{value} is not one of the allowed values"));
        }
    }

    match value {
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                if let Some(min) = schema.minimum.filter(|min| n < *min) {
                    findings.error(path, "minimum", format!("{n} is below the minimum {min}"));
                }
                if let Some(max) = schema.maximum.filter(|max| n > *max) {
                    findings.error(path, "maximum", format!("{n} is above the maximum {max}"));
                }
            }
        }
        Value::String(s) => check_string(findings, path, s, schema),
        Value::Array(items) => {
            if let Some(item_schema) = &schema.items {
                for (i, item) in items.iter().enumerate() {
                    check_value(findings, &format!("{path}[{i}]"), item, item_schema);
                }
            }
        }
        Value::Object(map) => {
            for name in &schema.required {
                if !map.contains_key(name) {
                    findings.missing(format!("{path}.{name}"));
                }
            }
            for (name, prop_schema) in &schema.properties {
                if let Some(v) = map.get(name) {
                    check_value(findings, &format!("{path}.{name}"), v, prop_schema);
                }
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

fn check_string(findings: &mut Findings, path: &str, s: &str, schema: &Schema) {
    let len = s.chars().count();
    if let Some(min) = schema.min_length.filter(|min| len < *min) {
        findings.error(path, "min_length", format!("length {len} is below {min}"));
    }
    if let Some(max) = schema.max_length.filter(|max| len > *max) {
        findings.error(path, "max_length", format!("length {len} exceeds {max}"));
    }
    if let Some(pattern) = &schema.pattern {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(s) => {
                findings.error(path, "pattern", format!("'{s}' does not match {pattern}"));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(field = path, pattern = %pattern, error = %e, "Schema pattern does not compile");
            }
        }
    }
    if let Some(format) = &schema.format {
        if !format_matches(format, s) {
            findings.error(path, "format", format!("'{s}' is not a valid {format}"));
        }
    }
}

/// Sanity checks for the common string formats. Unknown formats pass.
fn format_matches(format: &str, s: &str) -> bool {
    match format {
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        "date-time" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        "date" => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        "email" => RE_EMAIL.is_match(s),
        "uri" | "url" => url::Url::parse(s).is_ok(),
        _ => true,
    }
}

fn type_matches(value: &Value, expected: SchemaType) -> bool {
    match expected {
        SchemaType::String => value.is_string(),
        SchemaType::Integer => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        SchemaType::Number => value.is_number(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Array => value.is_array(),
        SchemaType::Object => value.is_object(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Equality that treats `20` and `20.0` as the same number.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
