//! Extraction types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use lc_protocol::CallIntent;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

// ── Log Format ────────────────────────────────────────────────

/// Supported log input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line, or a single JSON object / array document.
    JsonLines,
    /// Raw HTTP request dumps (`GET /path HTTP/1.1`, headers, blank line, body).
    HttpDump,
    /// Logged curl command lines.
    Curl,
    /// Unstructured text.
    Plaintext,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLines => "json_lines",
            Self::HttpDump => "http_dump",
            Self::Curl => "curl",
            Self::Plaintext => "plaintext",
        }
    }
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json_lines" | "json" | "jsonl" => Ok(Self::JsonLines),
            "http_dump" | "http" => Ok(Self::HttpDump),
            "curl" => Ok(Self::Curl),
            "plaintext" | "text" => Ok(Self::Plaintext),
            other => Err(LogError::Format(format!("unknown log format '{other}'"))),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Extracted Intent ──────────────────────────────────────────

/// A `CallIntent` together with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIntent {
    pub intent: CallIntent,
    /// 1-based line number of the record's first line.
    pub line_number: usize,
    /// Format the record was parsed from.
    pub format: LogFormat,
    /// Request timestamp, when the record carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}
