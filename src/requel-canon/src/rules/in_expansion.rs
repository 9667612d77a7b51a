//! IN-list expansion rule.
//!
//! `x IN (c1, ..., ck)` with `k <= 8` and all-literal members expands to the
//! disjunction `x = c1 OR ... OR x = ck`. The resulting OR chain is then
//! ordered by expression normalization, so equivalent hand-written
//! disjunctions and IN lists meet in the same canonical form.

use requel_plan::{ExprNode, PlanNode};

use super::rule::{CanonRule, Transformed};

/// Longest IN list worth expanding; larger lists stay as sets.
const MAX_EXPANSION: usize = 8;

/// Expand short literal IN lists into equality disjunctions.
pub struct InExpansion;

impl CanonRule for InExpansion {
    fn name(&self) -> &'static str {
        "InExpansion"
    }

    fn apply(&self, node: PlanNode) -> Transformed {
        match node {
            PlanNode::Filter { condition, input } => {
                let (expanded, changed) = expand(condition);
                Transformed {
                    node: PlanNode::Filter {
                        condition: expanded,
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
                let (expanded, changed) = expand(condition);
                Transformed {
                    node: PlanNode::Join {
                        join_type,
                        condition: Some(expanded),
                        left,
                        right,
                    },
                    changed,
                }
            }
            other => Transformed::no(other),
        }
    }
}

/// Expand eligible IN lists anywhere in an expression.
fn expand(expr: ExprNode) -> (ExprNode, bool) {
    match expr {
        ExprNode::InList {
            expr: operand,
            list,
            negated: false,
        } if !list.is_empty()
            && list.len() <= MAX_EXPANSION
            && list.iter().all(|m| matches!(m, ExprNode::Literal(_))) =>
        {
            let mut members = list.into_iter();
            let first = (*operand)
                .clone()
                .eq(members.next().expect("list is non-empty"));
            let disjunction =
                members.fold(first, |acc, member| acc.or((*operand).clone().eq(member)));
            (disjunction, true)
        }
        ExprNode::Binary { op, left, right } => {
            let (left, left_changed) = expand(*left);
            let (right, right_changed) = expand(*right);
            (
                ExprNode::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                left_changed || right_changed,
            )
        }
        ExprNode::Unary { op, expr } => {
            let (inner, changed) = expand(*expr);
            (
                ExprNode::Unary {
                    op,
                    expr: Box::new(inner),
                },
                changed,
            )
        }
        other => (other, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::{col, lit, BinaryOp};

    #[test]
    fn test_small_literal_list_expands() {
        let node = PlanNode::filter(
            ExprNode::InList {
                expr: Box::new(col("x")),
                list: vec![lit(1i64), lit(2i64), lit(3i64)],
                negated: false,
            },
            PlanNode::scan("t"),
        );

        let result = InExpansion.apply(node);
        assert!(result.changed);

        if let PlanNode::Filter { condition, .. } = result.node {
            // x = 1 OR x = 2 OR x = 3
            assert!(matches!(
                condition,
                ExprNode::Binary {
                    op: BinaryOp::Or,
                    ..
                }
            ));
        } else {
            panic!("expected Filter");
        }
    }

    #[test]
    fn test_large_list_stays() {
        let list: Vec<ExprNode> = (0..9).map(|i| lit(i as i64)).collect();
        let node = PlanNode::filter(
            ExprNode::InList {
                expr: Box::new(col("x")),
                list,
                negated: false,
            },
            PlanNode::scan("t"),
        );

        let result = InExpansion.apply(node);
        assert!(!result.changed);
    }

    #[test]
    fn test_non_literal_member_stays() {
        let node = PlanNode::filter(
            ExprNode::InList {
                expr: Box::new(col("x")),
                list: vec![lit(1i64), col("y")],
                negated: false,
            },
            PlanNode::scan("t"),
        );

        let result = InExpansion.apply(node);
        assert!(!result.changed);
    }

    #[test]
    fn test_expansion_matches_handwritten_disjunction() {
        let in_list = PlanNode::filter(
            ExprNode::InList {
                expr: Box::new(col("x")),
                list: vec![lit(1i64), lit(2i64)],
                negated: false,
            },
            PlanNode::scan("t"),
        );
        let by_hand = PlanNode::filter(
            col("x").eq(lit(1i64)).or(col("x").eq(lit(2i64))),
            PlanNode::scan("t"),
        );

        let expanded = InExpansion.apply(in_list).node;
        // After normalization the expansion and the hand-written disjunction
        // are byte-identical.
        let canonical = |node: PlanNode| match node {
            PlanNode::Filter { condition, .. } => condition.canonicalize().to_json(),
            _ => panic!("expected Filter"),
        };
        assert_eq!(canonical(expanded), canonical(by_hand));
    }
}
