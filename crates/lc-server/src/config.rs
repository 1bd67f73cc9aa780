//! Server configuration from the environment.

use serde::Deserialize;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// JSON endpoint catalog. The built-in sample catalog is served when unset.
    #[serde(default)]
    pub catalog_path: Option<String>,
    /// Engine TOML configuration. Defaults apply when unset.
    #[serde(default)]
    pub engine_config_path: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl ServerConfig {
    /// Load config from `LOGCURL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("LOGCURL_PORT").map(|p| p.parse::<u16>()) {
            Some(Ok(port)) => port,
            Some(Err(e)) => {
                tracing::warn!(error = %e, default = defaults.port, "Invalid LOGCURL_PORT, using default");
                defaults.port
            }
            None => defaults.port,
        };

        Self {
            host: non_empty("LOGCURL_HOST").unwrap_or(defaults.host),
            port,
            catalog_path: non_empty("LOGCURL_CATALOG"),
            engine_config_path: non_empty("LOGCURL_CONFIG"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            catalog_path: None,
            engine_config_path: None,
        }
    }
}
