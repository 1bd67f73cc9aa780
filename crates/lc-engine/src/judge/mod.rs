//! Judgment backends for the confidence scorer.
//!
//! Three tiers:
//! - **Heuristic** (local): deterministic method / path-structure / token
//!   agreement. Free and always available.
//! - **Ollama** (local model server): generative `{score, rationale}` judgment.
//! - **Tiered**: model first, heuristic when the model is unavailable.

pub mod heuristic;
pub mod ollama;
pub mod tiered;

pub use heuristic::HeuristicJudge;
pub use ollama::{OllamaConfig, OllamaJudge};
pub use tiered::TieredJudge;

use std::sync::Arc;

use crate::capability::JudgmentEngine;

/// Build the judgment engine described by `config`.
///
/// With Ollama enabled the model is consulted first and the heuristic
/// judge answers whenever it is unavailable.
pub fn from_config(config: &OllamaConfig) -> Arc<dyn JudgmentEngine> {
    if !config.enabled {
        return Arc::new(HeuristicJudge::new());
    }
    match OllamaJudge::new(config.clone()) {
        Ok(ollama) => {
            tracing::info!(host = %config.host, model = %config.model, "Ollama judgment enabled");
            Arc::new(TieredJudge::new(
                Box::new(ollama),
                Box::new(HeuristicJudge::new()),
            ))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ollama judge unavailable, using heuristic judgment");
            Arc::new(HeuristicJudge::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_ollama_uses_heuristic() {
        let judge = from_config(&OllamaConfig::default());
        assert_eq!(judge.tier_name(), "heuristic");
    }

    #[test]
    fn enabled_ollama_is_tiered() {
        let config = OllamaConfig {
            enabled: true,
            ..OllamaConfig::default()
        };
        assert_eq!(from_config(&config).tier_name(), "tiered");
    }
}
