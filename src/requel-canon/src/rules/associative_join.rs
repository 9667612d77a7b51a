//! Associative join rule.
//!
//! A chain of inner joins flattens into a left-deep tree whose relations are
//! ordered by their canonical rendering and whose conditions are gathered on
//! the top join. The rebuilt condition is itself canonicalized so the result
//! is a fixpoint for expression normalization.

use requel_plan::{and_all, qualifier, split_conjuncts, ExprNode, JoinType, PlanNode};

use super::rule::{CanonRule, Transformed};

/// Flatten inner-join chains into ordered left-deep form.
pub struct AssociativeJoin;

impl CanonRule for AssociativeJoin {
    fn name(&self) -> &'static str {
        "AssociativeJoin"
    }

    fn apply(&self, node: PlanNode) -> Transformed {
        let chain_head = matches!(
            &node,
            PlanNode::Join {
                join_type: JoinType::Inner,
                left,
                ..
            } if matches!(left.as_ref(), PlanNode::Join { join_type: JoinType::Inner, .. })
        ) || matches!(
            &node,
            PlanNode::Join {
                join_type: JoinType::Inner,
                right,
                ..
            } if matches!(right.as_ref(), PlanNode::Join { join_type: JoinType::Inner, .. })
        );
        if !chain_head {
            return Transformed::no(node);
        }

        let original = node.to_json();

        let mut relations = Vec::new();
        let mut conjuncts = Vec::new();
        flatten(node.clone(), &mut relations, &mut conjuncts);

        if has_non_associative_filter(&relations) {
            return Transformed::no(node);
        }

        relations.sort_by_key(PlanNode::to_json);
        conjuncts.sort_by_key(ExprNode::to_json);

        let rebuilt = rebuild(relations, conjuncts);
        let changed = rebuilt.to_json() != original;
        Transformed {
            node: rebuilt,
            changed,
        }
    }
}

fn flatten(node: PlanNode, relations: &mut Vec<PlanNode>, conjuncts: &mut Vec<ExprNode>) {
    match node {
        PlanNode::Join {
            join_type: JoinType::Inner,
            condition,
            left,
            right,
        } => {
            flatten(*left, relations, conjuncts);
            flatten(*right, relations, conjuncts);
            if let Some(condition) = condition {
                conjuncts.extend(split_conjuncts(condition));
            }
        }
        other => relations.push(other),
    }
}

/// A relation that is a filter referencing columns outside its own subtree
/// makes the chain non-associative; reordering around it is not safe.
fn has_non_associative_filter(relations: &[PlanNode]) -> bool {
    relations.iter().any(|relation| {
        let PlanNode::Filter { condition, .. } = relation else {
            return false;
        };
        let own = relation.visible_tables();
        condition
            .column_refs()
            .iter()
            .any(|column| match qualifier(column) {
                Some(q) => !own.contains(q),
                None => false,
            })
    })
}

fn rebuild(relations: Vec<PlanNode>, conjuncts: Vec<ExprNode>) -> PlanNode {
    let mut iter = relations.into_iter();
    let first = iter.next().expect("join chain has at least two relations");
    let Some(second) = iter.next() else {
        return first;
    };

    let mut joined = PlanNode::join(JoinType::Inner, None, first, second);
    for relation in iter {
        joined = PlanNode::join(JoinType::Inner, None, joined, relation);
    }

    let condition = and_all(conjuncts).map(ExprNode::canonicalize);
    if let PlanNode::Join {
        condition: top, ..
    } = &mut joined
    {
        *top = condition;
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::{col, lit};

    fn scan(name: &str) -> PlanNode {
        PlanNode::scan(name)
    }

    fn chain_abc() -> PlanNode {
        PlanNode::join(
            JoinType::Inner,
            Some(col("b.k").eq(col("c.k"))),
            PlanNode::join(
                JoinType::Inner,
                Some(col("a.k").eq(col("b.k"))),
                scan("a"),
                scan("b"),
            ),
            scan("c"),
        )
    }

    fn chain_cba() -> PlanNode {
        PlanNode::join(
            JoinType::Inner,
            Some(col("a.k").eq(col("b.k"))),
            PlanNode::join(
                JoinType::Inner,
                Some(col("b.k").eq(col("c.k"))),
                scan("c"),
                scan("b"),
            ),
            scan("a"),
        )
    }

    #[test]
    fn test_chains_meet_in_same_form() {
        let first = AssociativeJoin.apply(chain_abc()).node;
        let second = AssociativeJoin.apply(chain_cba()).node;
        assert_eq!(first.to_json(), second.to_json());
    }

    #[test]
    fn test_result_is_fixpoint() {
        let once = AssociativeJoin.apply(chain_abc()).node;
        let twice = AssociativeJoin.apply(once.clone());
        assert!(!twice.changed);
        assert_eq!(twice.node.to_json(), once.to_json());
    }

    #[test]
    fn test_two_relation_join_untouched() {
        let node = PlanNode::join(
            JoinType::Inner,
            Some(col("a.k").eq(col("b.k"))),
            scan("a"),
            scan("b"),
        );
        let result = AssociativeJoin.apply(node);
        assert!(!result.changed);
    }

    #[test]
    fn test_outer_join_untouched() {
        let node = PlanNode::join(
            JoinType::Left,
            Some(col("a.k").eq(col("b.k"))),
            PlanNode::join(
                JoinType::Inner,
                Some(col("b.k").eq(col("c.k"))),
                scan("b"),
                scan("c"),
            ),
            scan("a"),
        );
        let result = AssociativeJoin.apply(node);
        assert!(!result.changed);
    }

    #[test]
    fn test_cross_relation_filter_blocks_reordering() {
        let filtered = PlanNode::filter(col("x.other").gt(lit(1i64)), scan("b"));
        let node = PlanNode::join(
            JoinType::Inner,
            None,
            PlanNode::join(JoinType::Inner, None, scan("a"), filtered),
            scan("c"),
        );
        let result = AssociativeJoin.apply(node);
        assert!(!result.changed);
    }
}
