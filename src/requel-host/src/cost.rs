//! Cost estimation boundary.

use common_error::RequelResult;
use requel_plan::{JoinType, LogicalPlan, PlanNode, SubqueryKind};

use crate::session::SessionHandle;

/// Prices a logical plan for selection decisions.
///
/// Implementations call into the host cost model and must be deterministic
/// for a fixed plan and schema.
pub trait CostEstimator: Send + Sync {
    /// Estimate the execution cost of a plan. Non-negative.
    fn estimate(&self, plan: &LogicalPlan, session: SessionHandle) -> RequelResult<f64>;
}

/// Shape-based estimator used when no host cost model is wired in.
///
/// Absolute numbers are meaningless; only the ordering between a plan and
/// its rewrites matters. Correlated subquery predicates are priced as a
/// re-execution of the inner plan per outer row, which is what makes
/// unnested rewrites win.
#[derive(Debug, Default)]
pub struct HeuristicCostEstimator;

impl HeuristicCostEstimator {
    /// Create a new estimator.
    pub fn new() -> Self {
        Self
    }

    fn node_cost(node: &PlanNode) -> f64 {
        match node {
            PlanNode::Scan { .. } => 100.0,
            PlanNode::Filter { input, .. } => {
                let input_cost = Self::node_cost(input);
                input_cost * 1.1
            }
            PlanNode::Project { input, .. } => {
                let input_cost = Self::node_cost(input);
                input_cost * 1.05
            }
            PlanNode::Join {
                join_type,
                left,
                right,
                ..
            } => {
                let left_cost = Self::node_cost(left);
                let right_cost = Self::node_cost(right);
                match join_type {
                    // Semijoins stop probing at the first match.
                    JoinType::Semi => left_cost + right_cost * 0.5,
                    _ => left_cost + right_cost + left_cost.max(right_cost) * 0.2,
                }
            }
            PlanNode::Aggregate { input, .. } => Self::node_cost(input) * 1.3,
            PlanNode::Sort { input, .. } => Self::node_cost(input) * 1.2,
            PlanNode::Limit { input, .. } => Self::node_cost(input) + 1.0,
            PlanNode::Subquery {
                kind,
                input,
                subplan,
            } => {
                let subplan_cost = Self::node_cost(subplan);
                match (kind, input) {
                    // Predicate subqueries re-evaluate the inner plan per
                    // outer row.
                    (SubqueryKind::In { .. } | SubqueryKind::Exists, Some(outer)) => {
                        let outer_cost = Self::node_cost(outer);
                        outer_cost + outer_cost * subplan_cost * 0.1
                    }
                    _ => subplan_cost * 1.05,
                }
            }
            PlanNode::Union { inputs, .. } => {
                inputs.iter().map(Self::node_cost).sum::<f64>() * 1.1
            }
            PlanNode::Unknown(_) => 100.0,
        }
    }
}

impl CostEstimator for HeuristicCostEstimator {
    fn estimate(&self, plan: &LogicalPlan, _session: SessionHandle) -> RequelResult<f64> {
        Ok(Self::node_cost(&plan.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{PlanExtractor, SqlPlanExtractor};

    fn cost_of(sql: &str) -> f64 {
        let plan = SqlPlanExtractor::new()
            .extract(SessionHandle::new(0), sql)
            .unwrap();
        HeuristicCostEstimator::new()
            .estimate(&plan, SessionHandle::new(0))
            .unwrap()
    }

    #[test]
    fn test_scan_is_cheapest() {
        assert!(cost_of("SELECT * FROM t") < cost_of("SELECT * FROM t WHERE t.x > 1"));
    }

    #[test]
    fn test_subquery_costs_more_than_join() {
        let subquery = cost_of(
            "SELECT * FROM customer WHERE sk IN (SELECT customer_sk FROM sales WHERE price > 100)",
        );
        let join = cost_of(
            "SELECT * FROM customer c JOIN sales s ON c.sk = s.customer_sk WHERE s.price > 100",
        );
        assert!(subquery > join);
    }

    #[test]
    fn test_estimation_is_deterministic() {
        let sql = "SELECT * FROM a JOIN b ON a.x = b.y WHERE a.z > 5";
        assert_eq!(cost_of(sql), cost_of(sql));
    }
}
