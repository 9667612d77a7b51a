//! Expression normalization rule.
//!
//! Rewrite every condition an operator carries into its canonical expression
//! form: commutative operands ordered, double negation collapsed, boolean
//! identities removed, literals normalized.

use requel_plan::{PlanNode, SubqueryKind};

use super::rule::{CanonRule, Transformed};

/// Canonicalize the condition expressions attached to plan operators.
pub struct NormalizeExpressions;

impl CanonRule for NormalizeExpressions {
    fn name(&self) -> &'static str {
        "NormalizeExpressions"
    }

    fn apply(&self, node: PlanNode) -> Transformed {
        match node {
            PlanNode::Filter { condition, input } => {
                let canonical = condition.clone().canonicalize();
                let changed = canonical != condition;
                Transformed {
                    node: PlanNode::Filter {
                        condition: canonical,
                        input,
                    },
                    changed,
                }
            }
            PlanNode::Join {
                join_type,
                condition: Some(condition),
                left,
                right,
            } => {
                let canonical = condition.clone().canonicalize();
                let changed = canonical != condition;
                Transformed {
                    node: PlanNode::Join {
                        join_type,
                        condition: Some(canonical),
                        left,
                        right,
                    },
                    changed,
                }
            }
            PlanNode::Subquery {
                kind: SubqueryKind::In { operand },
                input,
                subplan,
            } => {
                let canonical = operand.clone().canonicalize();
                let changed = canonical != operand;
                Transformed {
                    node: PlanNode::Subquery {
                        kind: SubqueryKind::In { operand: canonical },
                        input,
                        subplan,
                    },
                    changed,
                }
            }
            other => Transformed::no(other),
        }
    }
}
