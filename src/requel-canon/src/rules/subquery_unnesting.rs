//! Subquery unnesting rule.
//!
//! `x IN (SELECT y FROM ...)` and correlated `EXISTS (SELECT ...)`
//! predicates become semijoins against the inner relation. Correlated
//! conjuncts in the inner filter are hoisted into the join condition, so a
//! candidate that hand-writes the join meets the original in the same
//! canonical form.

use std::collections::BTreeSet;

use requel_plan::{
    and_all, col, qualifier, split_conjuncts, ExprNode, JoinType, PlanNode, SubqueryKind,
};

use super::rule::{CanonRule, Transformed};

/// Rewrite IN and EXISTS subquery predicates into semijoins.
pub struct SubqueryUnnesting;

impl CanonRule for SubqueryUnnesting {
    fn name(&self) -> &'static str {
        "SubqueryUnnesting"
    }

    fn apply(&self, node: PlanNode) -> Transformed {
        let (kind, outer, subplan) = match node {
            PlanNode::Subquery {
                kind,
                input: Some(outer),
                subplan,
            } => (kind, outer, subplan),
            other => return Transformed::no(other),
        };

        let outer_tables = outer.visible_tables();
        let correlation = classify_correlation(&subplan, &outer_tables);

        match (kind, correlation) {
            (SubqueryKind::In { operand }, Correlation::Within(count)) if count <= 1 => {
                match unnest_in(operand, *outer, *subplan, &outer_tables) {
                    Ok(join) => Transformed::yes(join),
                    Err(node) => Transformed::no(node),
                }
            }
            (SubqueryKind::Exists, Correlation::Within(1)) => {
                match unnest_exists(*outer, *subplan, &outer_tables) {
                    Ok(join) => Transformed::yes(join),
                    Err(node) => Transformed::no(node),
                }
            }
            (kind, _) => Transformed::no(PlanNode::Subquery {
                kind,
                input: Some(outer),
                subplan,
            }),
        }
    }
}

/// How an inner plan's free column references relate to the outer scope.
enum Correlation {
    /// All free references resolve to this many distinct outer relations.
    Within(usize),
    /// Some free reference resolves nowhere we can see.
    Alien,
}

fn classify_correlation(subplan: &PlanNode, outer_tables: &BTreeSet<String>) -> Correlation {
    let inner_tables = subplan.visible_tables();
    let mut correlated = BTreeSet::new();

    let mut alien = false;
    visit_conditions(subplan, &mut |condition| {
        for column in condition.column_refs() {
            if let Some(q) = qualifier(column) {
                if !inner_tables.contains(q) {
                    if outer_tables.contains(q) {
                        correlated.insert(q.to_string());
                    } else {
                        alien = true;
                    }
                }
            }
        }
    });

    if alien {
        Correlation::Alien
    } else {
        Correlation::Within(correlated.len())
    }
}

fn visit_conditions<F: FnMut(&ExprNode)>(node: &PlanNode, visit: &mut F) {
    if let Some(condition) = node.condition() {
        visit(condition);
    }
    for child in node.inputs() {
        visit_conditions(child, visit);
    }
}

/// `operand IN (SELECT target FROM body)` becomes
/// `outer SEMI JOIN body ON operand = target AND <hoisted correlation>`.
///
/// The error value carries the reassembled node when the inner shape does not
/// support unnesting.
fn unnest_in(
    operand: ExprNode,
    outer: PlanNode,
    subplan: PlanNode,
    outer_tables: &BTreeSet<String>,
) -> Result<PlanNode, PlanNode> {
    let (columns, input) = match subplan {
        PlanNode::Project { columns, input } => (columns, input),
        other => {
            return Err(PlanNode::Subquery {
                kind: SubqueryKind::In { operand },
                input: Some(Box::new(outer)),
                subplan: Box::new(other),
            })
        }
    };

    if columns.len() != 1 {
        return Err(PlanNode::Subquery {
            kind: SubqueryKind::In { operand },
            input: Some(Box::new(outer)),
            subplan: Box::new(PlanNode::Project { columns, input }),
        });
    }

    let target = columns[0].clone();
    let (body, hoisted) = hoist_correlated(*input, outer_tables);

    let mut conjuncts = vec![operand.eq(col(target))];
    conjuncts.extend(hoisted);
    let condition = and_all(conjuncts);

    Ok(PlanNode::Join {
        join_type: JoinType::Semi,
        condition,
        left: Box::new(outer),
        right: Box::new(body),
    })
}

/// `EXISTS (SELECT ... WHERE <correlated> AND <local>)` becomes
/// `outer SEMI JOIN inner ON <correlated>` with the local conjuncts kept as
/// an inner filter.
fn unnest_exists(
    outer: PlanNode,
    subplan: PlanNode,
    outer_tables: &BTreeSet<String>,
) -> Result<PlanNode, PlanNode> {
    let original = subplan.clone();

    // EXISTS ignores the inner projection.
    let body = match subplan {
        PlanNode::Project { input, .. } => *input,
        other => other,
    };

    let (body, hoisted) = hoist_correlated(body, outer_tables);
    if hoisted.is_empty() {
        return Err(PlanNode::Subquery {
            kind: SubqueryKind::Exists,
            input: Some(Box::new(outer)),
            subplan: Box::new(original),
        });
    }

    Ok(PlanNode::Join {
        join_type: JoinType::Semi,
        condition: and_all(hoisted),
        left: Box::new(outer),
        right: Box::new(body),
    })
}

/// Split a top-level inner filter into conjuncts referencing the outer scope
/// (returned for hoisting) and local conjuncts (kept in place).
fn hoist_correlated(
    body: PlanNode,
    outer_tables: &BTreeSet<String>,
) -> (PlanNode, Vec<ExprNode>) {
    let (condition, input) = match body {
        PlanNode::Filter { condition, input } => (condition, input),
        other => return (other, vec![]),
    };

    let (hoisted, local): (Vec<_>, Vec<_>) =
        split_conjuncts(condition).into_iter().partition(|conjunct| {
            conjunct
                .column_refs()
                .iter()
                .filter_map(|c| qualifier(c))
                .any(|q| outer_tables.contains(q))
        });

    let body = match and_all(local) {
        Some(remaining) => PlanNode::Filter {
            condition: remaining,
            input,
        },
        None => *input,
    };

    (body, hoisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::lit;

    /// customer WHERE c.sk IN (SELECT s.customer_sk FROM sales s WHERE s.price > 100)
    fn in_subquery() -> PlanNode {
        PlanNode::Subquery {
            kind: SubqueryKind::In {
                operand: col("c.sk"),
            },
            input: Some(Box::new(PlanNode::scan_as("customer", "c"))),
            subplan: Box::new(PlanNode::project(
                ["s.customer_sk"],
                PlanNode::filter(col("s.price").gt(lit(100i64)), PlanNode::scan_as("sales", "s")),
            )),
        }
    }

    #[test]
    fn test_in_subquery_becomes_semijoin() {
        let result = SubqueryUnnesting.apply(in_subquery());
        assert!(result.changed);

        let PlanNode::Join {
            join_type,
            condition,
            left,
            right,
        } = result.node
        else {
            panic!("expected semijoin");
        };

        assert_eq!(join_type, JoinType::Semi);
        assert_eq!(condition, Some(col("c.sk").eq(col("s.customer_sk"))));
        assert!(matches!(*left, PlanNode::Scan { .. }));
        // The uncorrelated price filter stays inside the right side.
        assert!(matches!(*right, PlanNode::Filter { .. }));
    }

    #[test]
    fn test_correlated_exists_becomes_semijoin() {
        // EXISTS (SELECT 1 FROM sales s WHERE s.customer_sk = c.sk AND s.price > 50)
        let node = PlanNode::Subquery {
            kind: SubqueryKind::Exists,
            input: Some(Box::new(PlanNode::scan_as("customer", "c"))),
            subplan: Box::new(PlanNode::project(
                ["1"],
                PlanNode::filter(
                    col("s.customer_sk")
                        .eq(col("c.sk"))
                        .and(col("s.price").gt(lit(50i64))),
                    PlanNode::scan_as("sales", "s"),
                ),
            )),
        };

        let result = SubqueryUnnesting.apply(node);
        assert!(result.changed);

        let PlanNode::Join {
            join_type,
            condition,
            right,
            ..
        } = result.node
        else {
            panic!("expected semijoin");
        };

        assert_eq!(join_type, JoinType::Semi);
        assert_eq!(condition, Some(col("s.customer_sk").eq(col("c.sk"))));
        // The local price predicate stays as an inner filter.
        assert!(matches!(*right, PlanNode::Filter { .. }));
    }

    #[test]
    fn test_uncorrelated_exists_stays() {
        let node = PlanNode::Subquery {
            kind: SubqueryKind::Exists,
            input: Some(Box::new(PlanNode::scan("customer"))),
            subplan: Box::new(PlanNode::project(["1"], PlanNode::scan("sales"))),
        };

        let result = SubqueryUnnesting.apply(node);
        assert!(!result.changed);
    }

    #[test]
    fn test_multi_column_projection_stays() {
        let node = PlanNode::Subquery {
            kind: SubqueryKind::In {
                operand: col("c.sk"),
            },
            input: Some(Box::new(PlanNode::scan_as("customer", "c"))),
            subplan: Box::new(PlanNode::project(
                ["s.a", "s.b"],
                PlanNode::scan_as("sales", "s"),
            )),
        };

        let result = SubqueryUnnesting.apply(node);
        assert!(!result.changed);
    }
}
