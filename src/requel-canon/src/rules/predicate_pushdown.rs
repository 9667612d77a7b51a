//! Predicate pushdown rule.
//!
//! Move a filter sitting directly above a join to the join side its
//! predicate constrains, and merge adjacent filters into one conjunction.

use std::collections::BTreeSet;

use requel_plan::{qualifier, ExprNode, JoinType, PlanNode};

use super::rule::{CanonRule, Transformed};

/// Push filters toward the relations they constrain.
pub struct PredicatePushdown;

impl CanonRule for PredicatePushdown {
    fn name(&self) -> &'static str {
        "PredicatePushdown"
    }

    fn apply(&self, node: PlanNode) -> Transformed {
        let (condition, input) = match node {
            PlanNode::Filter { condition, input } => (condition, input),
            other => return Transformed::no(other),
        };

        match *input {
            // Adjacent filters combine into one conjunction.
            PlanNode::Filter {
                condition: inner,
                input: deeper,
            } => Transformed::yes(PlanNode::Filter {
                condition: inner.and(condition),
                input: deeper,
            }),

            PlanNode::Join {
                join_type,
                condition: join_condition,
                left,
                right,
            } => match push_side(&condition, join_type, &left, &right) {
                Some(Side::Left) => Transformed::yes(PlanNode::Join {
                    join_type,
                    condition: join_condition,
                    left: Box::new(PlanNode::Filter {
                        condition,
                        input: left,
                    }),
                    right,
                }),
                Some(Side::Right) => Transformed::yes(PlanNode::Join {
                    join_type,
                    condition: join_condition,
                    left,
                    right: Box::new(PlanNode::Filter {
                        condition,
                        input: right,
                    }),
                }),
                None => Transformed::no(PlanNode::Filter {
                    condition,
                    input: Box::new(PlanNode::Join {
                        join_type,
                        condition: join_condition,
                        left,
                        right,
                    }),
                }),
            },

            other => Transformed::no(PlanNode::Filter {
                condition,
                input: Box::new(other),
            }),
        }
    }
}

enum Side {
    Left,
    Right,
}

/// Which join side a predicate may move to, if any.
///
/// Every column must be qualified and every qualifier owned by one side; an
/// unqualified column leaves ownership ambiguous and blocks the push. Outer
/// joins only accept pushes toward their row-preserving side.
fn push_side(condition: &ExprNode, join_type: JoinType, left: &PlanNode, right: &PlanNode) -> Option<Side> {
    let refs = condition.column_refs();
    if refs.is_empty() || condition.has_unknown() {
        return None;
    }

    let mut qualifiers = BTreeSet::new();
    for column in refs {
        qualifiers.insert(qualifier(column)?);
    }

    let left_tables = left.visible_tables();
    let right_tables = right.visible_tables();

    let all_left = qualifiers.iter().all(|q| left_tables.contains(*q));
    let all_right = qualifiers.iter().all(|q| right_tables.contains(*q));

    match join_type {
        JoinType::Inner => {
            if all_left {
                Some(Side::Left)
            } else if all_right {
                Some(Side::Right)
            } else {
                None
            }
        }
        JoinType::Left | JoinType::Semi if all_left => Some(Side::Left),
        JoinType::Right if all_right => Some(Side::Right),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::{col, lit, BinaryOp};

    fn join_of(left: PlanNode, right: PlanNode) -> PlanNode {
        PlanNode::join(
            JoinType::Inner,
            Some(col("a.id").eq(col("b.id"))),
            left,
            right,
        )
    }

    #[test]
    fn test_push_to_left_side() {
        let node = PlanNode::filter(
            col("a.x").gt(lit(5i64)),
            join_of(PlanNode::scan("a"), PlanNode::scan("b")),
        );

        let result = PredicatePushdown.apply(node);
        assert!(result.changed);

        if let PlanNode::Join { left, right, .. } = result.node {
            assert!(matches!(*left, PlanNode::Filter { .. }));
            assert!(matches!(*right, PlanNode::Scan { .. }));
        } else {
            panic!("expected Join at root");
        }
    }

    #[test]
    fn test_cross_side_predicate_stays() {
        let node = PlanNode::filter(
            col("a.x").eq(col("b.y")),
            join_of(PlanNode::scan("a"), PlanNode::scan("b")),
        );

        let result = PredicatePushdown.apply(node);
        assert!(!result.changed);
        assert!(matches!(result.node, PlanNode::Filter { .. }));
    }

    #[test]
    fn test_unqualified_column_stays() {
        let node = PlanNode::filter(
            col("x").gt(lit(5i64)),
            join_of(PlanNode::scan("a"), PlanNode::scan("b")),
        );

        let result = PredicatePushdown.apply(node);
        assert!(!result.changed);
    }

    #[test]
    fn test_adjacent_filters_merge() {
        let node = PlanNode::filter(
            col("t.a").gt(lit(1i64)),
            PlanNode::filter(col("t.b").lt(lit(2i64)), PlanNode::scan("t")),
        );

        let result = PredicatePushdown.apply(node);
        assert!(result.changed);

        if let PlanNode::Filter { condition, input } = result.node {
            assert!(matches!(condition, ExprNode::Binary { op: BinaryOp::And, .. }));
            assert!(matches!(*input, PlanNode::Scan { .. }));
        } else {
            panic!("expected merged Filter");
        }
    }

    #[test]
    fn test_no_push_into_right_of_left_join() {
        let node = PlanNode::filter(
            col("b.y").gt(lit(0i64)),
            PlanNode::join(
                JoinType::Left,
                Some(col("a.id").eq(col("b.id"))),
                PlanNode::scan("a"),
                PlanNode::scan("b"),
            ),
        );

        let result = PredicatePushdown.apply(node);
        assert!(!result.changed);
    }
}
