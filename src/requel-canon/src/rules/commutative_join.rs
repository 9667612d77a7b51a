//! Commutative join rule.
//!
//! Order the two children of an inner or full join by their canonical
//! rendering. Joins whose children are themselves inner joins belong to a
//! chain and are ordered by the associative rule instead.

use requel_plan::{JoinType, PlanNode};

use super::rule::{CanonRule, Transformed};

/// Order join children deterministically.
pub struct CommutativeJoin;

impl CanonRule for CommutativeJoin {
    fn name(&self) -> &'static str {
        "CommutativeJoin"
    }

    fn apply(&self, node: PlanNode) -> Transformed {
        let (join_type, condition, left, right) = match node {
            PlanNode::Join {
                join_type: join_type @ (JoinType::Inner | JoinType::Full),
                condition,
                left,
                right,
            } => (join_type, condition, left, right),
            other => return Transformed::no(other),
        };

        let is_inner_join =
            |n: &PlanNode| matches!(n, PlanNode::Join { join_type: JoinType::Inner, .. });
        if is_inner_join(&left) || is_inner_join(&right) {
            return Transformed::no(PlanNode::Join {
                join_type,
                condition,
                left,
                right,
            });
        }

        if right.to_json() < left.to_json() {
            Transformed::yes(PlanNode::Join {
                join_type,
                condition,
                left: right,
                right: left,
            })
        } else {
            Transformed::no(PlanNode::Join {
                join_type,
                condition,
                left,
                right,
            })
        }
    }
}
