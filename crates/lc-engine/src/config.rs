//! Engine configuration, loadable from TOML.
//!
//! Every field has a serde default so a partial (or empty) file is valid.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::judge::ollama::OllamaConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub render: RenderConfig,
    /// Local Ollama judgment settings. Disabled unless configured.
    #[serde(default)]
    pub ollama: OllamaConfig,
}

// ── Retrieval ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum candidates returned per run.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Added to ids proposed by both the vector and lexical signals.
    #[serde(default = "default_dual_signal_bonus")]
    pub dual_signal_bonus: f64,
    /// Upper bound on one vector-search call.
    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}
fn default_dual_signal_bonus() -> f64 {
    0.05
}
fn default_retrieval_timeout_ms() -> u64 {
    2000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            dual_signal_bonus: default_dual_signal_bonus(),
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

// ── Scoring ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_retrieval_weight")]
    pub retrieval_weight: f64,
    #[serde(default = "default_judgment_weight")]
    pub judgment_weight: f64,
    /// Multiplier applied to retrieval when no judgment is available.
    #[serde(default = "default_degradation_factor")]
    pub degradation_factor: f64,
    #[serde(default = "default_judgment_timeout_ms")]
    pub judgment_timeout_ms: u64,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Combined scores closer than this are ties.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,
}

fn default_retrieval_weight() -> f64 {
    0.4
}
fn default_judgment_weight() -> f64 {
    0.6
}
fn default_degradation_factor() -> f64 {
    0.5
}
fn default_judgment_timeout_ms() -> u64 {
    5000
}
fn default_max_rate_limit_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    200
}
fn default_tie_epsilon() -> f64 {
    1e-9
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            retrieval_weight: default_retrieval_weight(),
            judgment_weight: default_judgment_weight(),
            degradation_factor: default_degradation_factor(),
            judgment_timeout_ms: default_judgment_timeout_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            tie_epsilon: default_tie_epsilon(),
        }
    }
}

// ── Matching & feedback ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Initial threshold of every new session.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    0.5
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Rejections that trigger a retry before the session is exhausted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_threshold_step")]
    pub threshold_step: f64,
    #[serde(default = "default_threshold_floor")]
    pub threshold_floor: f64,
    /// Idle lifetime of a session; 0 keeps sessions until evicted for room.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Sessions held at once; 0 means unbounded.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_threshold_step() -> f64 {
    0.05
}
fn default_threshold_floor() -> f64 {
    0.3
}
fn default_session_ttl_secs() -> u64 {
    3600
}
fn default_max_sessions() -> usize {
    10_000
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            threshold_step: default_threshold_step(),
            threshold_floor: default_threshold_floor(),
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

// ── Cache, batch, render ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry lifetime; 0 disables expiry.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum stored results; the oldest is evicted first. 0 means unbounded.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_capacity() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Used when neither the intent nor the catalog carries a base URL.
    #[serde(default = "default_base_url")]
    pub default_base_url: String,
}

fn default_base_url() -> String {
    "http://localhost".into()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_base_url: default_base_url(),
        }
    }
}

// ── Loading & validation ──────────────────────────────────────

impl EngineConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{path}: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        let reals = [
            ("scoring.retrieval_weight", s.retrieval_weight),
            ("scoring.judgment_weight", s.judgment_weight),
            ("scoring.degradation_factor", s.degradation_factor),
            ("scoring.tie_epsilon", s.tie_epsilon),
            ("retrieval.dual_signal_bonus", self.retrieval.dual_signal_bonus),
            ("matching.similarity_threshold", self.matching.similarity_threshold),
            ("feedback.threshold_step", self.feedback.threshold_step),
            ("feedback.threshold_floor", self.feedback.threshold_floor),
        ];
        if let Some((name, _)) = reals.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be a finite number")));
        }

        if s.retrieval_weight < 0.0 || s.judgment_weight < 0.0 {
            return Err(ConfigError::Invalid("scoring weights must be non-negative".into()));
        }
        if ((s.retrieval_weight + s.judgment_weight) - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "scoring weights must sum to 1 (got {} + {})",
                s.retrieval_weight, s.judgment_weight
            )));
        }
        if !(0.0..1.0).contains(&s.degradation_factor) {
            return Err(ConfigError::Invalid(
                "degradation_factor must be in [0, 1)".into(),
            ));
        }

        let threshold = self.matching.similarity_threshold;
        let floor = self.feedback.threshold_floor;
        if !(0.0..=1.0).contains(&threshold) || !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::Invalid("thresholds must be in [0, 1]".into()));
        }
        if floor > threshold {
            return Err(ConfigError::Invalid(format!(
                "threshold_floor {floor} exceeds similarity_threshold {threshold}"
            )));
        }
        if self.feedback.threshold_step < 0.0 {
            return Err(ConfigError::Invalid("threshold_step must be non-negative".into()));
        }

        if !(0.0..1.0).contains(&s.tie_epsilon) {
            return Err(ConfigError::Invalid("tie_epsilon must be in [0, 1)".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.dual_signal_bonus) {
            return Err(ConfigError::Invalid(
                "dual_signal_bonus must be in [0, 1]".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be positive".into()));
        }
        if self.batch.workers == 0 {
            return Err(ConfigError::Invalid("batch.workers must be positive".into()));
        }
        if self.feedback.max_attempts == 0 {
            return Err(ConfigError::Invalid("feedback.max_attempts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.timeout_ms, 2000);
        assert!((config.scoring.judgment_weight - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.scoring.max_rate_limit_retries, 3);
        assert!((config.matching.similarity_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.feedback.max_attempts, 3);
        assert_eq!(config.cache.capacity, 1024);
        assert_eq!(config.batch.workers, 4);
        assert_eq!(config.render.default_base_url, "http://localhost");
        assert!(!config.ollama.enabled);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml = r#"
[retrieval]
top_k = 8

[cache]
enabled = false

[ollama]
enabled = true
model = "qwen2.5:7b"
"#;
        let config = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert!((config.retrieval.dual_signal_bonus - 0.05).abs() < f64::EPSILON);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert!(config.ollama.enabled);
        assert_eq!(config.ollama.model, "qwen2.5:7b");
        assert_eq!(config.ollama.host, "http://localhost:11434");
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = EngineConfig::from_toml("[scoring]\nretrieval_weight = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn degradation_factor_must_be_below_one() {
        let err = EngineConfig::from_toml("[scoring]\ndegradation_factor = 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn non_finite_values_are_invalid() {
        let mut config = EngineConfig::default();
        config.scoring.retrieval_weight = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("retrieval_weight")));

        let err = EngineConfig::from_toml("[scoring]\njudgment_weight = nan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = EngineConfig::default();
        config.matching.similarity_threshold = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tie_epsilon_and_bonus_are_range_checked() {
        assert!(EngineConfig::from_toml("[scoring]\ntie_epsilon = -0.1\n").is_err());
        assert!(EngineConfig::from_toml("[scoring]\ntie_epsilon = 0.0\n").is_ok());
        assert!(EngineConfig::from_toml("[retrieval]\ndual_signal_bonus = 2.0\n").is_err());
        assert!(EngineConfig::from_toml("[retrieval]\ndual_signal_bonus = -0.05\n").is_err());
    }

    #[test]
    fn floor_above_threshold_is_invalid() {
        let toml = "[matching]\nsimilarity_threshold = 0.2\n";
        assert!(EngineConfig::from_toml(toml).is_err());
    }

    #[test]
    fn zero_workers_is_invalid() {
        assert!(EngineConfig::from_toml("[batch]\nworkers = 0\n").is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml("[retrieval\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::from_file("/no/such/logcurl.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
