//! Mock log source for testing: serves pre-loaded log content.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{LogError, LogResult};
use crate::source::LogSource;

/// A mock log source that serves pre-loaded content by path.
pub struct MockLogSource {
    files: HashMap<String, Vec<String>>,
}

impl MockLogSource {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Add a file with the given lines.
    pub fn add_file(&mut self, path: impl Into<String>, lines: Vec<String>) {
        self.files.insert(path.into(), lines);
    }

    /// Create a mock with a sample JSON request log.
    pub fn with_json_sample() -> Self {
        let mut m = Self::new();
        m.add_file(
            "/var/log/api.json",
            vec![
                r#"{"timestamp":"2024-01-15T12:00:01Z","method":"GET","path":"/users?limit=20","headers":{"Authorization":"Bearer abc"}}"#.into(),
                r#"{"timestamp":"2024-01-15T12:00:05Z","method":"POST","path":"/users","headers":{"Content-Type":"application/json"},"body":{"name":"ann","email":"ann@example.com"}}"#.into(),
                r#"{"timestamp":"2024-01-15T12:00:10Z","method":"DELETE","url":"https://api.example.com/users/42"}"#.into(),
                r#"{"timestamp":"2024-01-15T12:00:15Z","level":"info","service":"gateway"}"#.into(),
                r#"{"timestamp":"2024-01-15T12:00:20Z","http_method":"PATCH","uri":"/orders/7","payload":{"status":"shipped"}}"#.into(),
            ],
        );
        m
    }

    /// Create a mock with two raw HTTP request dumps.
    pub fn with_http_dump_sample() -> Self {
        let mut m = Self::new();
        m.add_file(
            "/var/log/requests.dump",
            vec![
                "POST /orders HTTP/1.1".into(),
                "Host: api.example.com".into(),
                "Content-Type: application/json".into(),
                "Authorization: Bearer abc".into(),
                "".into(),
                r#"{"sku":"A1","qty":2}"#.into(),
                "GET /orders/17 HTTP/1.1".into(),
                "Host: api.example.com".into(),
                "".into(),
            ],
        );
        m
    }

    /// Create a mock with logged curl commands.
    pub fn with_curl_sample() -> Self {
        let mut m = Self::new();
        m.add_file(
            "/var/log/replay.sh",
            vec![
                "curl -X GET 'https://api.example.com/users?limit=20' -H 'Authorization: Bearer abc'".into(),
                "curl -X POST https://api.example.com/users \\".into(),
                "  -H 'Content-Type: application/json' \\".into(),
                r#"  -d '{"name":"ann"}'"#.into(),
                "curl https://api.example.com/users/42".into(),
            ],
        );
        m
    }

    /// Create a mock with a plaintext application log.
    pub fn with_plaintext_sample() -> Self {
        let mut m = Self::new();
        m.add_file(
            "/var/log/app.log",
            vec![
                "2024-01-15 12:00:01 INFO Starting application".into(),
                "2024-01-15 12:00:05 INFO API call: GET /users?limit=20".into(),
                "2024-01-15 12:00:10 WARNING Slow upstream".into(),
                r#"2024-01-15 12:00:15 INFO API call: POST /orders with body {"sku":"A1"}"#.into(),
                "2024-01-15 12:00:20 ERROR DELETE /users/42 returned 404".into(),
            ],
        );
        m
    }
}

impl Default for MockLogSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSource for MockLogSource {
    async fn read_lines(&self, path: &str) -> LogResult<Vec<String>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| LogError::NotFound(path.to_string()))
    }

    async fn tail_lines(&self, path: &str, count: usize) -> LogResult<Vec<String>> {
        let lines = self.read_lines(path).await?;
        let start = lines.len().saturating_sub(count);
        Ok(lines[start..].to_vec())
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}
