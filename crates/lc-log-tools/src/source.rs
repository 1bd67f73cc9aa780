//! Log source abstraction: read request logs from files, mocks, or other backends.

use async_trait::async_trait;

use crate::error::{LogError, LogResult};
use crate::parsers::extract_intents;
use crate::types::ExtractedIntent;

/// Abstraction for reading log data from various sources.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Read all lines from the given path/identifier.
    async fn read_lines(&self, path: &str) -> LogResult<Vec<String>>;

    /// Read the last `count` lines from the given path.
    async fn tail_lines(&self, path: &str, count: usize) -> LogResult<Vec<String>>;

    /// Check if a source path exists and is readable.
    async fn exists(&self, path: &str) -> bool;
}

/// Reads logs from the local filesystem.
pub struct FileLogSource;

#[async_trait]
impl LogSource for FileLogSource {
    async fn read_lines(&self, path: &str) -> LogResult<Vec<String>> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogError::NotFound(path.to_string())
            } else {
                LogError::Io(format!("{path}: {e}"))
            }
        })?;
        Ok(content.lines().map(String::from).collect())
    }

    async fn tail_lines(&self, path: &str, count: usize) -> LogResult<Vec<String>> {
        let all = self.read_lines(path).await?;
        let start = all.len().saturating_sub(count);
        Ok(all[start..].to_vec())
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// Read a source and extract every intent it contains.
pub async fn extract_from_source(
    source: &dyn LogSource,
    path: &str,
) -> LogResult<Vec<ExtractedIntent>> {
    let lines = source.read_lines(path).await?;
    let intents = extract_intents(&lines);
    tracing::info!(path, lines = lines.len(), intents = intents.len(), "Extracted intents");
    Ok(intents)
}
