//! Logical plan and expression IR for Requel.
//!
//! `requel-plan` provides the two trees every other crate works over:
//!
//! - **Expression tree** ([`ExprNode`]): SQL scalar expressions with
//!   structural equality and a local canonical form (commutative operand
//!   ordering, double-negation collapse, boolean identity removal, normalized
//!   literals).
//! - **Plan tree** ([`PlanNode`] under a [`LogicalPlan`] root): the
//!   relational-algebra operators the extractor produces and the
//!   canonicalization rules rewrite.
//!
//! Both trees serialize to a deterministic, whitespace-free JSON rendering
//! with fixed field order. Byte equality of two canonicalized renderings is
//! the workspace's definition of structural equality, so everything that
//! compares plans (fixpoint detection, validation, child ordering) reduces to
//! string comparison on `to_json()`.

pub mod expr;
mod node;
mod plan;

pub use node::{JoinType, PlanNode, SortKey, SubqueryKind};
pub use plan::{LogicalPlan, META_UNSUPPORTED};

pub use expr::{
    and_all, col, lit, qualifier, split_conjuncts, BinaryOp, ExprNode, LiteralValue, UnaryOp,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_plan() {
        let plan = LogicalPlan::new(
            PlanNode::project(
                ["name", "email"],
                PlanNode::filter(col("age").gte(lit(21i64)), PlanNode::scan("person")),
            ),
            "SELECT name, email FROM person WHERE age >= 21",
        );

        let rendered = plan.to_pretty_string();
        assert!(rendered.contains("Project"));
        assert!(rendered.contains("Filter"));
        assert!(rendered.contains("Scan"));
    }

    #[test]
    fn test_structural_equality_is_positional() {
        let ab = PlanNode::project(["a", "b"], PlanNode::scan("t"));
        let ba = PlanNode::project(["b", "a"], PlanNode::scan("t"));
        assert_ne!(ab, ba);
        assert_ne!(ab.to_json(), ba.to_json());
    }

    #[test]
    fn test_json_equality_tracks_structural_equality() {
        let make = || {
            PlanNode::join(
                JoinType::Inner,
                Some(col("a.x").eq(col("b.y"))),
                PlanNode::scan("a"),
                PlanNode::scan("b"),
            )
        };
        assert_eq!(make(), make());
        assert_eq!(make().to_json(), make().to_json());
    }
}
