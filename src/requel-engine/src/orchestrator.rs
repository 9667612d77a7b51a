//! Optimization pipeline orchestration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use common_config::{GenerationConfig, OptimizationStrategy, RequelConfig, SelectionMode};
use common_error::RequelError;
use common_runtime::with_deadline;
use requel_host::{CostEstimator, PlanExtractor, SessionHandle};
use requel_llm::{LlmClient, PromptBuilder, TableSchema};
use requel_plan::{ExprNode, LogicalPlan, PlanNode};
use requel_verify::{SemanticValidator, ValidationMode};
use tracing::{debug, info, warn};

use crate::result::{OptimizationResult, StageStats};
use crate::stats::{EngineStats, StatsSnapshot};

/// The overall deadline is this multiple of the per-candidate validation
/// timeout.
const OVERALL_DEADLINE_FACTOR: f64 = 10.0;

/// Drives one query through gating, candidate generation, validation, cost
/// estimation, and selection.
///
/// Holds no per-query state; every shared field is either read-only after
/// construction or guarded for concurrent callers. `optimize` never fails:
/// the worst case is returning the original query with a reason.
pub struct Orchestrator {
    enabled: AtomicBool,
    strategy: RwLock<OptimizationStrategy>,
    generation: RwLock<GenerationConfig>,
    validation_mode: RwLock<ValidationMode>,
    prompt_builder: RwLock<PromptBuilder>,
    schemas: RwLock<Vec<TableSchema>>,
    client: Arc<LlmClient>,
    extractor: Arc<dyn PlanExtractor>,
    estimator: Arc<dyn CostEstimator>,
    stats: EngineStats,
}

impl Orchestrator {
    /// Build an orchestrator from configuration and host collaborators.
    ///
    /// Providers are registered separately through [`Orchestrator::client`];
    /// the configuration's provider entries carry connection details for the
    /// embedder that constructs them.
    pub fn new(
        config: RequelConfig,
        extractor: Arc<dyn PlanExtractor>,
        estimator: Arc<dyn CostEstimator>,
    ) -> Self {
        let mut prompt_builder = PromptBuilder::new();
        prompt_builder.set_goal(config.goal);
        if config.generation.use_few_shot {
            prompt_builder.load_builtin_examples();
        }

        Self {
            enabled: AtomicBool::new(config.enabled),
            strategy: RwLock::new(config.strategy),
            generation: RwLock::new(config.generation),
            validation_mode: RwLock::new(ValidationMode::Strict),
            prompt_builder: RwLock::new(prompt_builder),
            schemas: RwLock::new(Vec::new()),
            client: Arc::new(LlmClient::new(config.cache_size)),
            extractor,
            estimator,
            stats: EngineStats::new(),
        }
    }

    /// The LLM client, for provider registration.
    pub fn client(&self) -> &Arc<LlmClient> {
        &self.client
    }

    /// Enable or disable the rewriter at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether the rewriter is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Replace the strategy settings.
    pub fn set_strategy(&self, strategy: OptimizationStrategy) {
        *self.strategy.write().expect("strategy lock poisoned") = strategy;
    }

    /// Replace the validation mode used for candidates.
    pub fn set_validation_mode(&self, mode: ValidationMode) {
        *self
            .validation_mode
            .write()
            .expect("validation mode lock poisoned") = mode;
    }

    /// Replace the schema context rendered into prompts.
    pub fn set_schemas(&self, schemas: Vec<TableSchema>) {
        *self.schemas.write().expect("schema lock poisoned") = schemas;
    }

    /// Reconfigure prompt construction.
    pub fn configure_prompt<F: FnOnce(&mut PromptBuilder)>(&self, configure: F) {
        configure(&mut self.prompt_builder.write().expect("prompt lock poisoned"));
    }

    /// Current statistics, merged with the client's cache counters.
    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot(self.client.cache_stats())
    }

    /// Zero the orchestrator counters. Cache contents and counters are
    /// owned by the client and left alone.
    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    /// Optimize one query.
    ///
    /// Returns the chosen rewrite, or the original SQL with a reason when
    /// any stage declines. The call respects an overall deadline of
    /// 10x the per-candidate validation timeout.
    pub async fn optimize(&self, session: SessionHandle, sql: &str) -> OptimizationResult {
        let started = Instant::now();
        let result = self.run_pipeline(session, sql, started).await;

        self.stats
            .record_query(started.elapsed().as_secs_f64() * 1000.0);
        if result.optimized {
            self.stats.record_optimized(result.improvement_ratio);
            info!(
                reason = %result.reason,
                ratio = result.improvement_ratio,
                "query rewritten"
            );
        } else {
            debug!(reason = %result.reason, "query unchanged");
        }
        result
    }

    async fn run_pipeline(
        &self,
        session: SessionHandle,
        sql: &str,
        started: Instant,
    ) -> OptimizationResult {
        let mut stats = StageStats::default();

        if !self.is_enabled() {
            return OptimizationResult::unchanged(sql, 0.0, "disabled", stats, started.elapsed());
        }

        let strategy = self.strategy.read().expect("strategy lock poisoned").clone();
        let deadline = started
            + Duration::from_secs_f64(strategy.validation_timeout_sec * OVERALL_DEADLINE_FACTOR);

        // Stage 1: original plan and cost.
        let original_plan = match self.extractor.extract(session, sql) {
            Ok(plan) => plan,
            Err(error) => {
                debug!(%error, "plan extraction declined");
                return OptimizationResult::unchanged(
                    sql,
                    0.0,
                    "extraction_failed",
                    stats,
                    started.elapsed(),
                );
            }
        };
        let original_cost = match self.estimator.estimate(&original_plan, session) {
            Ok(cost) => cost,
            Err(error) => {
                debug!(%error, "original cost estimation failed");
                return OptimizationResult::unchanged(
                    sql,
                    0.0,
                    "cost_estimation_failed",
                    stats,
                    started.elapsed(),
                );
            }
        };

        if let Some(reason) = decline_reason(&strategy, &original_plan, original_cost) {
            return OptimizationResult::unchanged(
                sql,
                original_cost,
                reason,
                stats,
                started.elapsed(),
            );
        }

        // Stage 2: prompt and candidates.
        let generation = self
            .generation
            .read()
            .expect("generation lock poisoned")
            .clone();
        let prompt = {
            let builder = self.prompt_builder.read().expect("prompt lock poisoned");
            let schemas = self.schemas.read().expect("schema lock poisoned");
            builder.build_rewrite_prompt(sql, schemas.as_slice(), generation.use_few_shot)
        };

        let llm_started = Instant::now();
        let generated = with_deadline(
            "llm generation",
            remaining(deadline),
            self.client.generate(&prompt, &generation),
        )
        .await;
        stats.llm_time_ms = llm_started.elapsed().as_secs_f64() * 1000.0;

        let generated = match generated {
            Ok(generated) => generated,
            Err(error) => {
                let reason = match &error {
                    RequelError::ProviderUnavailable(_) => "provider_unavailable",
                    RequelError::Timeout(_) => "deadline_exceeded",
                    _ => "provider_error",
                };
                warn!(%error, "candidate generation failed");
                return OptimizationResult::unchanged(
                    sql,
                    original_cost,
                    reason,
                    stats,
                    started.elapsed(),
                );
            }
        };
        stats.cache_hit = generated.cache_hit;

        if !generated.response.success {
            warn!(
                error = %generated.response.error_message,
                "provider reported failure"
            );
            return OptimizationResult::unchanged(
                sql,
                original_cost,
                "provider_error",
                stats,
                started.elapsed(),
            );
        }

        let candidates: Vec<String> = generated
            .response
            .candidates
            .into_iter()
            .filter(|candidate| !candidate.trim().is_empty())
            .take(strategy.max_candidates)
            .collect();
        stats.candidates_generated = candidates.len();

        // Stage 3: sequential validation in generation order.
        let validation_started = Instant::now();
        let validated = self
            .validate_candidates(session, sql, candidates, &strategy, deadline)
            .await;
        stats.validation_time_ms = validation_started.elapsed().as_secs_f64() * 1000.0;
        stats.candidates_validated = validated.len();

        if validated.is_empty() {
            return OptimizationResult::unchanged(
                sql,
                original_cost,
                "no_valid_candidate",
                stats,
                started.elapsed(),
            );
        }

        // Stage 4: cost estimation, sequential so selection order is
        // deterministic.
        let cost_started = Instant::now();
        let costed: Vec<(String, f64)> = validated
            .into_iter()
            .map(|candidate| {
                let cost = self
                    .extractor
                    .extract(session, &candidate)
                    .and_then(|plan| self.estimator.estimate(&plan, session))
                    .unwrap_or(f64::INFINITY);
                (candidate, cost)
            })
            .collect();
        stats.cost_estimation_time_ms = cost_started.elapsed().as_secs_f64() * 1000.0;

        // Stage 5: selection.
        let chosen = match strategy.selection_mode {
            SelectionMode::FirstValid => costed.into_iter().next(),
            SelectionMode::BestCost | SelectionMode::Conservative => {
                costed.into_iter().reduce(|best, next| {
                    if next.1 < best.1 {
                        next
                    } else {
                        best
                    }
                })
            }
        };

        let Some((optimized_sql, optimized_cost)) = chosen else {
            return OptimizationResult::unchanged(
                sql,
                original_cost,
                "no_valid_candidate",
                stats,
                started.elapsed(),
            );
        };

        let improvement_ratio = if optimized_cost > 0.0 {
            original_cost / optimized_cost
        } else {
            f64::INFINITY
        };
        if improvement_ratio < strategy.min_improvement_ratio {
            debug!(
                improvement_ratio,
                bar = strategy.min_improvement_ratio,
                "best candidate below the improvement bar"
            );
            return OptimizationResult::unchanged(
                sql,
                original_cost,
                "no_improvement",
                stats,
                started.elapsed(),
            );
        }

        OptimizationResult::rewritten(
            sql,
            optimized_sql,
            original_cost,
            optimized_cost,
            stats,
            started.elapsed(),
        )
    }

    /// Validate candidates in generation order, each under its own deadline,
    /// all under the overall deadline. FirstValid stops at the first pass.
    async fn validate_candidates(
        &self,
        session: SessionHandle,
        original_sql: &str,
        candidates: Vec<String>,
        strategy: &OptimizationStrategy,
        deadline: Instant,
    ) -> Vec<String> {
        let mode = *self
            .validation_mode
            .read()
            .expect("validation mode lock poisoned");
        let mut validated = Vec::new();

        for candidate in candidates {
            let left = remaining(deadline);
            if left.is_zero() {
                warn!("overall deadline expired, abandoning remaining candidates");
                break;
            }
            let budget = Duration::from_secs_f64(strategy.validation_timeout_sec).min(left);

            let extractor = self.extractor.clone();
            let original = original_sql.to_string();
            let subject = candidate.clone();
            let verdict = with_deadline("candidate validation", budget, async {
                tokio::task::spawn_blocking(move || {
                    SemanticValidator::new().with_mode(mode).validate(
                        &*extractor,
                        session,
                        &original,
                        &subject,
                    )
                })
                .await
                .map_err(|error| RequelError::internal(format!("validation task: {error}")))
            })
            .await;

            match verdict {
                Ok(result) if result.is_equivalent => {
                    debug!(confidence = result.confidence, "candidate validated");
                    validated.push(candidate);
                    if strategy.selection_mode == SelectionMode::FirstValid {
                        break;
                    }
                }
                Ok(result) => {
                    self.stats.record_failed_validation();
                    debug!(
                        reason = %result.reason,
                        differences = result.differences.len(),
                        "candidate rejected"
                    );
                }
                Err(RequelError::Timeout(_)) => {
                    self.stats.record_failed_validation();
                    debug!("candidate discarded: validation_timeout");
                }
                Err(error) => {
                    self.stats.record_failed_validation();
                    warn!(%error, "candidate validation errored");
                }
            }
        }

        validated
    }
}

/// Why a query is not worth sending to the LLM, if any reason applies.
fn decline_reason(
    strategy: &OptimizationStrategy,
    plan: &LogicalPlan,
    cost: f64,
) -> Option<&'static str> {
    let joins = plan
        .root
        .count_matching(|node| matches!(node, PlanNode::Join { .. }));
    let has_subquery = plan
        .root
        .contains(|node| matches!(node, PlanNode::Subquery { .. }))
        || has_subquery_expr(&plan.root);

    let triggered = (strategy.enable_for_subqueries && has_subquery)
        || (strategy.enable_for_complex_joins && joins >= 3);
    if !triggered {
        return Some("not_eligible");
    }
    if cost < strategy.min_estimated_cost {
        return Some("below_cost_threshold");
    }
    None
}

fn has_subquery_expr(node: &PlanNode) -> bool {
    fn expr_has_subquery(expr: &ExprNode) -> bool {
        matches!(expr, ExprNode::Subquery { .. } | ExprNode::Exists { .. })
            || expr.children().iter().any(|child| expr_has_subquery(child))
    }

    node.condition().is_some_and(expr_has_subquery)
        || node.inputs().iter().any(|child| has_subquery_expr(child))
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::col;

    fn strategy() -> OptimizationStrategy {
        OptimizationStrategy::default()
    }

    fn plan_with_joins(joins: usize) -> LogicalPlan {
        let mut node = PlanNode::scan("t0");
        for i in 1..=joins {
            node = PlanNode::join(
                requel_plan::JoinType::Inner,
                Some(col(format!("t{}.k", i - 1)).eq(col(format!("t{i}.k")))),
                node,
                PlanNode::scan(format!("t{i}")),
            );
        }
        LogicalPlan::new(PlanNode::project(["*"], node), "generated")
    }

    #[test]
    fn test_simple_scan_is_not_eligible() {
        let plan = LogicalPlan::new(PlanNode::scan("t"), "SELECT * FROM t");
        assert_eq!(
            decline_reason(&strategy(), &plan, 1e6),
            Some("not_eligible")
        );
    }

    #[test]
    fn test_three_joins_trigger() {
        assert_eq!(decline_reason(&strategy(), &plan_with_joins(3), 1e6), None);
        assert_eq!(
            decline_reason(&strategy(), &plan_with_joins(2), 1e6),
            Some("not_eligible")
        );
    }

    #[test]
    fn test_cheap_queries_are_skipped() {
        assert_eq!(
            decline_reason(&strategy(), &plan_with_joins(3), 10.0),
            Some("below_cost_threshold")
        );
    }

    #[test]
    fn test_subquery_triggers() {
        let plan = LogicalPlan::new(
            PlanNode::Subquery {
                kind: requel_plan::SubqueryKind::In {
                    operand: col("t.x"),
                },
                input: Some(Box::new(PlanNode::scan("t"))),
                subplan: Box::new(PlanNode::project(["y"], PlanNode::scan("u"))),
            },
            "generated",
        );
        assert_eq!(decline_reason(&strategy(), &plan, 1e6), None);
    }

    #[test]
    fn test_disabled_trigger_flags() {
        let mut strategy = strategy();
        strategy.enable_for_complex_joins = false;
        assert_eq!(
            decline_reason(&strategy, &plan_with_joins(4), 1e6),
            Some("not_eligible")
        );
    }
}
