//! Optimization outcomes.

use std::time::Duration;

/// Per-stage accounting for one optimization call.
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    /// Candidates received from the provider.
    pub candidates_generated: usize,
    /// Candidates that passed validation.
    pub candidates_validated: usize,
    /// Time spent in LLM generation, milliseconds.
    pub llm_time_ms: f64,
    /// Time spent validating candidates, milliseconds.
    pub validation_time_ms: f64,
    /// Time spent estimating costs, milliseconds.
    pub cost_estimation_time_ms: f64,
    /// Whether the generation was answered from the cache.
    pub cache_hit: bool,
}

/// Outcome of one optimization call.
///
/// Never an error: a failed pipeline returns the original SQL with the
/// failure as the reason.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// True when a rewrite was chosen.
    pub optimized: bool,
    /// The query as submitted.
    pub original_sql: String,
    /// The chosen query; equals `original_sql` when not optimized.
    pub optimized_sql: String,
    /// Estimated cost of the original plan, when it was computed.
    pub original_cost: f64,
    /// Estimated cost of the chosen plan.
    pub optimized_cost: f64,
    /// original_cost / optimized_cost; 1.0 when no rewrite was chosen.
    pub improvement_ratio: f64,
    /// Wall time of the whole call.
    pub total_time: Duration,
    /// Per-stage accounting.
    pub stats: StageStats,
    /// Why this outcome was reached.
    pub reason: String,
}

impl OptimizationResult {
    /// Outcome keeping the original query.
    pub fn unchanged(
        sql: impl Into<String>,
        original_cost: f64,
        reason: impl Into<String>,
        stats: StageStats,
        total_time: Duration,
    ) -> Self {
        let sql = sql.into();
        Self {
            optimized: false,
            original_sql: sql.clone(),
            optimized_sql: sql,
            original_cost,
            optimized_cost: original_cost,
            improvement_ratio: 1.0,
            total_time,
            stats,
            reason: reason.into(),
        }
    }

    /// Outcome substituting a rewrite.
    pub fn rewritten(
        original_sql: impl Into<String>,
        optimized_sql: impl Into<String>,
        original_cost: f64,
        optimized_cost: f64,
        stats: StageStats,
        total_time: Duration,
    ) -> Self {
        let improvement_ratio = if optimized_cost > 0.0 {
            original_cost / optimized_cost
        } else {
            f64::INFINITY
        };
        Self {
            optimized: true,
            original_sql: original_sql.into(),
            optimized_sql: optimized_sql.into(),
            original_cost,
            optimized_cost,
            improvement_ratio,
            total_time,
            stats,
            reason: "optimized".to_string(),
        }
    }
}
