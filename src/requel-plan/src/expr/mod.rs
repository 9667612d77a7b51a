//! Expression system for Requel logical plans.
//!
//! Expressions are the smallest comparable semantic units: filter predicates,
//! join conditions, and list members are all [`ExprNode`] trees. The
//! canonical JSON rendering defined here is the primitive every structural
//! comparison in the workspace reduces to.

mod binary;
mod expression;
mod literal;
mod unary;

pub use binary::BinaryOp;
pub use expression::ExprNode;
pub use literal::LiteralValue;
pub use unary::UnaryOp;

/// Create a column reference expression.
pub fn col(name: impl Into<String>) -> ExprNode {
    ExprNode::column(name)
}

/// Create a literal expression.
pub fn lit<V: Into<LiteralValue>>(value: V) -> ExprNode {
    ExprNode::literal(value)
}

/// Flatten an AND chain into its conjuncts, in source order.
pub fn split_conjuncts(expr: ExprNode) -> Vec<ExprNode> {
    match expr {
        ExprNode::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let mut conjuncts = split_conjuncts(*left);
            conjuncts.extend(split_conjuncts(*right));
            conjuncts
        }
        other => vec![other],
    }
}

/// Join conjuncts back into a left-associated AND chain.
pub fn and_all(conjuncts: Vec<ExprNode>) -> Option<ExprNode> {
    let mut iter = conjuncts.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| acc.and(next)))
}

/// Table qualifier of a column name (`"t.price"` yields `"t"`).
pub fn qualifier(column: &str) -> Option<&str> {
    column.rsplit_once('.').map(|(qualifier, _)| qualifier)
}
