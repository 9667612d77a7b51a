//! Plan canonicalization for Requel.
//!
//! `requel-canon` normalizes syntactically different but equivalent plans
//! into one comparable form. A [`Canonicalizer`] holds a rule sequence and
//! applies it bottom-up, iterating passes to a fixpoint (detected by byte
//! equality of the canonical rendering) with a safety cap of
//! [`MAX_PASSES`] passes.
//!
//! # Rule order
//!
//! 1. [`NormalizeExpressions`] — canonical expression form for every condition
//! 2. [`InExpansion`] — short literal IN lists become equality disjunctions
//! 3. [`SubqueryUnnesting`] — IN/EXISTS subquery predicates become semijoins
//! 4. [`PredicatePushdown`] — filters move to the join side they constrain
//! 5. [`AssociativeJoin`] — inner-join chains flatten to ordered left-deep form
//! 6. [`CommutativeJoin`] — remaining join pairs are ordered
//!
//! IN expansion runs before operand ordering so the produced disjunction is
//! normalized like any hand-written one; the associative rule owns the
//! ordering of join chains, the commutative rule orders everything else.

pub mod rules;

pub use rules::{
    AssociativeJoin, CanonOutcome, CanonRule, Canonicalizer, CommutativeJoin, InExpansion,
    NormalizeExpressions, PredicatePushdown, SubqueryUnnesting, Transformed, MAX_PASSES,
};

use requel_plan::LogicalPlan;

/// The default rule sequence.
pub fn default_rules() -> Vec<Box<dyn CanonRule>> {
    vec![
        Box::new(NormalizeExpressions),
        Box::new(InExpansion),
        Box::new(SubqueryUnnesting),
        Box::new(PredicatePushdown),
        Box::new(AssociativeJoin),
        Box::new(CommutativeJoin),
    ]
}

/// Canonicalize a plan with the default rules.
pub fn canonicalize(plan: LogicalPlan) -> CanonOutcome {
    Canonicalizer::new(default_rules()).run(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::{col, lit, JoinType, PlanNode};

    #[test]
    fn test_commuted_joins_canonicalize_identically() {
        // SELECT * FROM a JOIN b ON a.x = b.y
        let forward = LogicalPlan::new(
            PlanNode::project(
                ["*"],
                PlanNode::join(
                    JoinType::Inner,
                    Some(col("a.x").eq(col("b.y"))),
                    PlanNode::scan("a"),
                    PlanNode::scan("b"),
                ),
            ),
            "SELECT * FROM a JOIN b ON a.x = b.y",
        );
        // SELECT * FROM b JOIN a ON b.y = a.x
        let reversed = LogicalPlan::new(
            PlanNode::project(
                ["*"],
                PlanNode::join(
                    JoinType::Inner,
                    Some(col("b.y").eq(col("a.x"))),
                    PlanNode::scan("b"),
                    PlanNode::scan("a"),
                ),
            ),
            "SELECT * FROM b JOIN a ON b.y = a.x",
        );

        let first = canonicalize(forward);
        let second = canonicalize(reversed);

        assert!(first.converged);
        assert!(second.converged);
        assert_eq!(first.plan.to_json(), second.plan.to_json());
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let plan = LogicalPlan::new(
            PlanNode::filter(
                lit(true).and(col("t.x").eq(col("t.y"))),
                PlanNode::join(
                    JoinType::Inner,
                    Some(col("b.k").eq(col("a.k"))),
                    PlanNode::scan("b"),
                    PlanNode::scan("a"),
                ),
            ),
            "SELECT ...",
        );

        let once = canonicalize(plan);
        let twice = canonicalize(once.plan.clone());

        assert!(once.converged);
        assert!(twice.converged);
        assert_eq!(once.plan.to_json(), twice.plan.to_json());
    }

    #[test]
    fn test_rule_firing_recorded_in_metadata() {
        let plan = LogicalPlan::new(
            PlanNode::join(
                JoinType::Inner,
                None,
                PlanNode::scan("b"),
                PlanNode::scan("a"),
            ),
            "SELECT ...",
        );

        let outcome = canonicalize(plan);
        assert_eq!(
            outcome.plan.metadata.get("canon.CommutativeJoin"),
            Some(&"applied".to_string())
        );
    }

    #[test]
    fn test_scalar_subquery_body_is_canonicalized() {
        // t.x = (SELECT MAX(u.v) FROM u JOIN w ...) with the join written in
        // either order.
        let scalar = |left: &str, right: &str, cond: requel_plan::ExprNode| {
            requel_plan::ExprNode::Subquery {
                plan: Box::new(PlanNode::project(
                    ["MAX(u.v)"],
                    PlanNode::join(
                        JoinType::Inner,
                        Some(cond),
                        PlanNode::scan(left),
                        PlanNode::scan(right),
                    ),
                )),
            }
        };
        let plan = |subquery: requel_plan::ExprNode| {
            LogicalPlan::new(
                PlanNode::filter(col("t.x").eq(subquery), PlanNode::scan("t")),
                "SELECT ...",
            )
        };

        let forward = canonicalize(plan(scalar("u", "w", col("u.k").eq(col("w.k")))));
        let reversed = canonicalize(plan(scalar("w", "u", col("w.k").eq(col("u.k")))));

        assert!(forward.converged);
        assert!(reversed.converged);
        assert_eq!(forward.plan.to_json(), reversed.plan.to_json());
    }

    #[test]
    fn test_not_exists_body_is_normalized() {
        let not_exists = |condition: requel_plan::ExprNode| {
            LogicalPlan::new(
                PlanNode::filter(
                    requel_plan::ExprNode::Exists {
                        plan: Box::new(PlanNode::project(
                            ["1"],
                            PlanNode::filter(condition, PlanNode::scan("u")),
                        )),
                        negated: true,
                    },
                    PlanNode::scan("t"),
                ),
                "SELECT ...",
            )
        };

        let noisy = canonicalize(not_exists(lit(true).and(col("u.x").gt(lit(5i64)))));
        let plain = canonicalize(not_exists(col("u.x").gt(lit(5i64))));

        assert!(noisy.converged);
        assert_eq!(noisy.plan.to_json(), plain.plan.to_json());
    }

    #[test]
    fn test_unknown_fragment_marks_plan() {
        let plan = LogicalPlan::new(
            PlanNode::filter(
                requel_plan::ExprNode::Unknown("window function".to_string()),
                PlanNode::scan("t"),
            ),
            "SELECT ...",
        );

        let outcome = canonicalize(plan);
        assert!(outcome.plan.is_unsupported());
    }
}
