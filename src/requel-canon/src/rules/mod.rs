//! Canonicalization rules for logical plans.

mod associative_join;
mod commutative_join;
mod in_expansion;
mod normalize_expressions;
mod predicate_pushdown;
mod rule;
mod subquery_unnesting;

pub use associative_join::AssociativeJoin;
pub use commutative_join::CommutativeJoin;
pub use in_expansion::InExpansion;
pub use normalize_expressions::NormalizeExpressions;
pub use predicate_pushdown::PredicatePushdown;
pub use rule::{CanonOutcome, CanonRule, Canonicalizer, Transformed, MAX_PASSES};
pub use subquery_unnesting::SubqueryUnnesting;
