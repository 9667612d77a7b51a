//! Configuration management for Requel.
//!
//! The configuration document is read once at initialization; nothing here is
//! consulted on the per-query hot path. Strategy and generation settings are
//! plain data shared by the client and orchestrator crates.

use serde::{Deserialize, Serialize};

/// Global Requel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequelConfig {
    /// Master enable flag for the rewriter.
    pub enabled: bool,
    /// Trigger, candidate, and selection settings.
    pub strategy: OptimizationStrategy,
    /// Default LLM generation settings.
    pub generation: GenerationConfig,
    /// Maximum number of cached LLM responses.
    pub cache_size: usize,
    /// Provider registrations.
    pub providers: Vec<ProviderConfig>,
    /// Default optimization goal for prompt construction.
    pub goal: OptimizationGoal,
}

/// Trigger conditions, generation limits, and selection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationStrategy {
    /// Consider queries containing a subquery.
    pub enable_for_subqueries: bool,
    /// Consider queries joining three or more relations.
    pub enable_for_complex_joins: bool,
    /// Minimum estimated cost of the original plan before rewriting is worth it.
    pub min_estimated_cost: f64,
    /// Maximum number of candidates requested from the provider.
    pub max_candidates: usize,
    /// Per-candidate validation deadline in seconds.
    pub validation_timeout_sec: f64,
    /// How the winning candidate is chosen.
    pub selection_mode: SelectionMode,
    /// Minimum original/candidate cost ratio for a rewrite to be applied.
    pub min_improvement_ratio: f64,
}

impl Default for OptimizationStrategy {
    fn default() -> Self {
        Self {
            enable_for_subqueries: true,
            enable_for_complex_joins: true,
            min_estimated_cost: 1000.0,
            max_candidates: 5,
            validation_timeout_sec: 10.0,
            selection_mode: SelectionMode::BestCost,
            min_improvement_ratio: 1.2,
        }
    }
}

/// Candidate selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SelectionMode {
    /// Choose the validated candidate with the lowest estimated cost.
    #[default]
    BestCost,
    /// Choose the first candidate, in generation order, to pass validation.
    FirstValid,
    /// Choose the best-cost candidate only if it clears the improvement bar.
    Conservative,
}

/// LLM generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier passed to the provider.
    pub model_name: String,
    /// Sampling temperature; clamped to [0.0, 2.0] by the client.
    pub temperature: f64,
    /// Maximum tokens per candidate.
    pub max_tokens: u32,
    /// Number of candidates requested.
    pub num_candidates: u32,
    /// Include few-shot examples in the prompt.
    pub use_few_shot: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            num_candidates: 3,
            use_few_shot: true,
        }
    }
}

/// A provider registration entry.
///
/// Endpoint and credential fields are placeholders handed to the provider
/// implementation; the core never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry name, also the fingerprint component.
    pub name: String,
    /// Endpoint URL or socket address, provider-defined.
    pub endpoint: Option<String>,
    /// Environment variable holding the credential, provider-defined.
    pub credential_env: Option<String>,
}

/// Optimization goal, selecting a built-in system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OptimizationGoal {
    /// Lowest execution cost wins.
    #[default]
    Performance,
    /// Prefer simpler, clearer SQL when cost is comparable.
    Readability,
    /// Balance the two.
    Balanced,
}

impl RequelConfig {
    /// Configuration with the rewriter enabled and default settings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            cache_size: 1000,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_defaults() {
        let strategy = OptimizationStrategy::default();
        assert!(strategy.enable_for_subqueries);
        assert_eq!(strategy.max_candidates, 5);
        assert_eq!(strategy.selection_mode, SelectionMode::BestCost);
        assert!((strategy.min_improvement_ratio - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = RequelConfig {
            providers: vec![ProviderConfig {
                name: "local".to_string(),
                endpoint: Some("http://localhost:8000/generate".to_string()),
                credential_env: None,
            }],
            ..RequelConfig::enabled()
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: RequelConfig = serde_json::from_str(&json).unwrap();

        assert!(back.enabled);
        assert_eq!(back.cache_size, 1000);
        assert_eq!(back.providers.len(), 1);
        assert_eq!(back.goal, OptimizationGoal::Performance);
    }
}
