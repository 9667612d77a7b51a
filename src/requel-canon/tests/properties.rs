//! Property tests for canonicalization invariants.

use proptest::prelude::*;

use requel_canon::canonicalize;
use requel_plan::{col, lit, ExprNode, JoinType, LogicalPlan, PlanNode};

fn arb_expr() -> impl Strategy<Value = ExprNode> {
    let leaf = prop_oneof![
        prop_oneof![Just("a.x"), Just("a.y"), Just("b.x"), Just("b.y")].prop_map(col),
        (-5i64..5).prop_map(lit),
        any::<bool>().prop_map(lit),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.eq(r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.and(r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.or(r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.gt(r)),
            inner.prop_map(ExprNode::not),
        ]
    })
}

fn arb_plan() -> impl Strategy<Value = PlanNode> {
    let leaf = prop_oneof![
        Just(PlanNode::scan("a")),
        Just(PlanNode::scan("b")),
        Just(PlanNode::scan("c")),
    ];
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (arb_expr(), inner.clone()).prop_map(|(e, p)| PlanNode::filter(e, p)),
            (proptest::option::of(arb_expr()), inner.clone(), inner.clone())
                .prop_map(|(c, l, r)| PlanNode::join(JoinType::Inner, c, l, r)),
            inner
                .clone()
                .prop_map(|p| PlanNode::project(["a.x", "b.y"], p)),
            (1u64..100, inner).prop_map(|(n, p)| PlanNode::limit(n, p)),
        ]
    })
}

proptest! {
    /// canonicalize(canonicalize(P)) == canonicalize(P)
    #[test]
    fn canonicalization_is_idempotent(root in arb_plan()) {
        let once = canonicalize(LogicalPlan::new(root, "generated"));
        prop_assert!(once.converged);

        let twice = canonicalize(once.plan.clone());
        prop_assert!(twice.converged);
        prop_assert_eq!(once.plan.to_json(), twice.plan.to_json());
    }

    /// Commutative combinations of the same operands in either order yield
    /// byte-identical canonical renderings.
    #[test]
    fn commutative_operands_have_unique_form(l in arb_expr(), r in arb_expr()) {
        let forward = l.clone().and(r.clone()).canonicalize();
        let reversed = r.clone().and(l.clone()).canonicalize();
        prop_assert_eq!(forward.to_json(), reversed.to_json());

        let forward = l.clone().or(r.clone()).canonicalize();
        let reversed = r.clone().or(l.clone()).canonicalize();
        prop_assert_eq!(forward.to_json(), reversed.to_json());

        let forward = l.clone().eq(r.clone()).canonicalize();
        let reversed = r.eq(l).canonicalize();
        prop_assert_eq!(forward.to_json(), reversed.to_json());
    }

    /// Expression canonicalization is itself idempotent.
    #[test]
    fn expression_canonicalization_is_idempotent(expr in arb_expr()) {
        let once = expr.canonicalize();
        let twice = once.clone().canonicalize();
        prop_assert_eq!(once.to_json(), twice.to_json());
    }
}
