//! SQL scalar expression tree.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::node::PlanNode;

use super::{BinaryOp, LiteralValue, UnaryOp};

/// A node in a SQL scalar expression tree.
///
/// Trees are immutable after construction; `canonicalize` returns a fresh
/// tree. Structural equality is positional over variant, operator, literal
/// value, and children.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// Column reference, possibly qualified (`t.price`).
    Column(String),
    /// Typed literal.
    Literal(LiteralValue),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<ExprNode>,
        /// Right operand.
        right: Box<ExprNode>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<ExprNode>,
    },
    /// Function call.
    Function {
        /// Uppercased function name.
        name: String,
        /// Arguments in call order.
        args: Vec<ExprNode>,
    },
    /// Scalar subquery embedded in an expression.
    Subquery {
        /// The subquery's plan.
        plan: Box<PlanNode>,
    },
    /// CASE expression.
    Case {
        /// Optional comparison operand (`CASE x WHEN ...`).
        operand: Option<Box<ExprNode>>,
        /// WHEN/THEN branches in source order.
        branches: Vec<(ExprNode, ExprNode)>,
        /// Optional ELSE result.
        else_expr: Option<Box<ExprNode>>,
    },
    /// IN over a literal or expression list.
    InList {
        /// Tested operand.
        expr: Box<ExprNode>,
        /// List members in source order.
        list: Vec<ExprNode>,
        /// NOT IN when true.
        negated: bool,
    },
    /// EXISTS predicate kept at expression level (the extractor lowers the
    /// affirmative form to a plan-level subquery node; only `NOT EXISTS`
    /// survives here).
    Exists {
        /// The subquery's plan.
        plan: Box<PlanNode>,
        /// NOT EXISTS when true.
        negated: bool,
    },
    /// Fragment the extractor recognized but cannot model.
    Unknown(String),
}

impl ExprNode {
    /// Create a column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    /// Create a literal.
    pub fn literal(value: impl Into<LiteralValue>) -> Self {
        Self::Literal(value.into())
    }

    /// Create a binary expression.
    pub fn binary(left: ExprNode, op: BinaryOp, right: ExprNode) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create a unary expression.
    pub fn unary(op: UnaryOp, expr: ExprNode) -> Self {
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    /// Equality comparison.
    pub fn eq(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Eq, other)
    }

    /// Inequality comparison.
    pub fn neq(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::NotEq, other)
    }

    /// Greater than comparison.
    pub fn gt(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Gt, other)
    }

    /// Greater than or equal comparison.
    pub fn gte(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::GtEq, other)
    }

    /// Less than comparison.
    pub fn lt(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Lt, other)
    }

    /// Less than or equal comparison.
    pub fn lte(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::LtEq, other)
    }

    /// Logical AND.
    pub fn and(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    /// Logical OR.
    pub fn or(self, other: ExprNode) -> Self {
        Self::binary(self, BinaryOp::Or, other)
    }

    /// Logical NOT.
    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    /// Variant tag name, as it appears in the canonical rendering.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Column(_) => "ColumnRef",
            Self::Literal(_) => "Literal",
            Self::Binary { .. } => "BinaryOp",
            Self::Unary { .. } => "UnaryOp",
            Self::Function { .. } => "Function",
            Self::Subquery { .. } => "SubqueryExpr",
            Self::Case { .. } => "CaseExpr",
            Self::InList { .. } => "InExpr",
            Self::Exists { .. } => "ExistsExpr",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// True when this subtree contains an `Unknown` fragment, descending
    /// into embedded subquery plans.
    pub fn has_unknown(&self) -> bool {
        match self {
            Self::Unknown(_) => true,
            Self::Subquery { plan } | Self::Exists { plan, .. } => plan.has_unknown(),
            _ => self.children().iter().any(|c| c.has_unknown()),
        }
    }

    /// All column names referenced by this expression.
    ///
    /// Does not descend into embedded subquery plans; those reference their
    /// own scope.
    pub fn column_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_column_refs(&mut refs);
        refs
    }

    fn collect_column_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        if let Self::Column(name) = self {
            refs.push(name);
        }
        for child in self.children() {
            child.collect_column_refs(refs);
        }
    }

    /// Child expressions in positional order.
    pub fn children(&self) -> Vec<&ExprNode> {
        match self {
            Self::Column(_) | Self::Literal(_) | Self::Subquery { .. } | Self::Unknown(_) => {
                vec![]
            }
            Self::Binary { left, right, .. } => vec![left, right],
            Self::Unary { expr, .. } => vec![expr],
            Self::Function { args, .. } => args.iter().collect(),
            Self::Case {
                operand,
                branches,
                else_expr,
            } => {
                let mut children = Vec::new();
                if let Some(op) = operand {
                    children.push(op.as_ref());
                }
                for (when, then) in branches {
                    children.push(when);
                    children.push(then);
                }
                if let Some(e) = else_expr {
                    children.push(e.as_ref());
                }
                children
            }
            Self::InList { expr, list, .. } => {
                let mut children = vec![expr.as_ref()];
                children.extend(list.iter());
                children
            }
            Self::Exists { .. } => vec![],
        }
    }

    /// Map over the plans embedded in subquery expressions, recursively.
    ///
    /// Canonicalization uses this to run the plan rules inside scalar
    /// subquery and `NOT EXISTS` bodies, which sit below the expression
    /// layer and are otherwise invisible to plan traversal.
    pub fn map_embedded_plans<F>(self, f: &mut F) -> ExprNode
    where
        F: FnMut(PlanNode) -> PlanNode,
    {
        match self {
            Self::Subquery { plan } => Self::Subquery {
                plan: Box::new(f(*plan)),
            },
            Self::Exists { plan, negated } => Self::Exists {
                plan: Box::new(f(*plan)),
                negated,
            },
            Self::Binary { op, left, right } => Self::Binary {
                op,
                left: Box::new(left.map_embedded_plans(f)),
                right: Box::new(right.map_embedded_plans(f)),
            },
            Self::Unary { op, expr } => Self::Unary {
                op,
                expr: Box::new(expr.map_embedded_plans(f)),
            },
            Self::Function { name, args } => Self::Function {
                name,
                args: args
                    .into_iter()
                    .map(|arg| arg.map_embedded_plans(f))
                    .collect(),
            },
            Self::Case {
                operand,
                branches,
                else_expr,
            } => Self::Case {
                operand: operand.map(|o| Box::new(o.map_embedded_plans(f))),
                branches: branches
                    .into_iter()
                    .map(|(when, then)| {
                        (when.map_embedded_plans(f), then.map_embedded_plans(f))
                    })
                    .collect(),
                else_expr: else_expr.map(|e| Box::new(e.map_embedded_plans(f))),
            },
            Self::InList {
                expr,
                list,
                negated,
            } => Self::InList {
                expr: Box::new(expr.map_embedded_plans(f)),
                list: list
                    .into_iter()
                    .map(|member| member.map_embedded_plans(f))
                    .collect(),
                negated,
            },
            other @ (Self::Column(_) | Self::Literal(_) | Self::Unknown(_)) => other,
        }
    }

    /// Return the canonical form of this expression.
    ///
    /// Commutative operands are ordered by their canonical rendering, double
    /// negation collapses, `NOT` over a boolean literal folds, and `AND`/`OR`
    /// identity operands (`TRUE`/`FALSE`) are removed.
    pub fn canonicalize(self) -> ExprNode {
        match self {
            Self::Binary { op, left, right } => {
                let left = left.canonicalize();
                let right = right.canonicalize();

                if op == BinaryOp::And {
                    if matches!(&left, Self::Literal(v) if v.is_true()) {
                        return right;
                    }
                    if matches!(&right, Self::Literal(v) if v.is_true()) {
                        return left;
                    }
                }
                if op == BinaryOp::Or {
                    if matches!(&left, Self::Literal(v) if v.is_false()) {
                        return right;
                    }
                    if matches!(&right, Self::Literal(v) if v.is_false()) {
                        return left;
                    }
                }

                let (left, right) = if op.is_commutative() && right.to_json() < left.to_json() {
                    (right, left)
                } else {
                    (left, right)
                };

                Self::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            Self::Unary {
                op: UnaryOp::Not,
                expr,
            } => match expr.canonicalize() {
                Self::Unary {
                    op: UnaryOp::Not,
                    expr: inner,
                } => *inner,
                Self::Literal(LiteralValue::Bool(b)) => Self::Literal(LiteralValue::Bool(!b)),
                other => Self::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(other),
                },
            },
            Self::Unary { op, expr } => Self::Unary {
                op,
                expr: Box::new(expr.canonicalize()),
            },
            Self::Function { name, args } => Self::Function {
                name,
                args: args.into_iter().map(ExprNode::canonicalize).collect(),
            },
            Self::Case {
                operand,
                branches,
                else_expr,
            } => Self::Case {
                operand: operand.map(|o| Box::new(o.canonicalize())),
                branches: branches
                    .into_iter()
                    .map(|(w, t)| (w.canonicalize(), t.canonicalize()))
                    .collect(),
                else_expr: else_expr.map(|e| Box::new(e.canonicalize())),
            },
            Self::InList {
                expr,
                list,
                negated,
            } => Self::InList {
                expr: Box::new(expr.canonicalize()),
                list: list.into_iter().map(ExprNode::canonicalize).collect(),
                negated,
            },
            other @ (Self::Column(_)
            | Self::Literal(_)
            | Self::Subquery { .. }
            | Self::Exists { .. }
            | Self::Unknown(_)) => other,
        }
    }

    /// Canonical rendering: `{"type","op","value","children"}`, fixed field
    /// order, no whitespace. Byte equality of two canonicalized trees'
    /// renderings implies structural equality.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("expression serialization is infallible")
    }

    fn op_text(&self) -> String {
        match self {
            Self::Binary { op, .. } => op.as_str().to_string(),
            Self::Unary { op, .. } => op.as_str().to_string(),
            Self::Function { name, .. } => name.clone(),
            Self::InList { negated, .. } => if *negated { "NOT IN" } else { "IN" }.to_string(),
            Self::Exists { negated, .. } => {
                if *negated { "NOT EXISTS" } else { "EXISTS" }.to_string()
            }
            Self::Case { .. } => "CASE".to_string(),
            _ => String::new(),
        }
    }

    fn value_text(&self) -> String {
        match self {
            Self::Column(name) => name.clone(),
            Self::Literal(value) => value.canonical_text(),
            Self::Subquery { plan } => plan.to_json(),
            Self::Exists { plan, .. } => plan.to_json(),
            Self::Unknown(detail) => detail.clone(),
            _ => String::new(),
        }
    }
}

impl Serialize for ExprNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExprNode", 4)?;
        state.serialize_field("type", self.type_name())?;
        state.serialize_field("op", &self.op_text())?;
        state.serialize_field("value", &self.value_text())?;
        state.serialize_field("children", &self.children())?;
        state.end()
    }
}

impl std::fmt::Display for ExprNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::Unary {
                op: UnaryOp::IsNull,
                expr,
            } => write!(f, "({expr} IS NULL)"),
            Self::Unary {
                op: UnaryOp::IsNotNull,
                expr,
            } => write!(f, "({expr} IS NOT NULL)"),
            Self::Unary { op, expr } => write!(f, "{op} {expr}"),
            Self::Function { name, args } => {
                let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{name}({})", rendered.join(", "))
            }
            Self::Subquery { .. } => write!(f, "(subquery)"),
            Self::Case { .. } => write!(f, "CASE ..."),
            Self::InList {
                expr,
                list,
                negated,
            } => {
                let rendered: Vec<String> = list.iter().map(ToString::to_string).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                write!(f, "({expr} {keyword} ({}))", rendered.join(", "))
            }
            Self::Exists { negated, .. } => {
                write!(f, "{}(subquery)", if *negated { "NOT EXISTS " } else { "EXISTS " })
            }
            Self::Unknown(detail) => write!(f, "<unknown: {detail}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};

    #[test]
    fn test_expression_building() {
        let expr = col("age").gte(lit(18i64));
        assert!(matches!(
            expr,
            ExprNode::Binary {
                op: BinaryOp::GtEq,
                ..
            }
        ));
    }

    #[test]
    fn test_commutative_ordering() {
        // b = a and a = b canonicalize to the same tree
        let forward = col("a").eq(col("b")).canonicalize();
        let reversed = col("b").eq(col("a")).canonicalize();
        assert_eq!(forward, reversed);
        assert_eq!(forward.to_json(), reversed.to_json());
    }

    #[test]
    fn test_non_commutative_preserved() {
        let expr = col("x").gt(lit(5i64)).canonicalize();
        if let ExprNode::Binary { left, .. } = &expr {
            assert_eq!(**left, col("x"));
        } else {
            panic!("expected binary expression");
        }
    }

    #[test]
    fn test_double_negation() {
        let expr = col("x").not().not().canonicalize();
        assert_eq!(expr, col("x"));
    }

    #[test]
    fn test_not_literal_folds() {
        let expr = lit(true).not().canonicalize();
        assert_eq!(expr, lit(false));
    }

    #[test]
    fn test_and_true_identity() {
        let expr = col("x").eq(lit(1i64)).and(lit(true)).canonicalize();
        assert!(matches!(expr, ExprNode::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_or_false_identity() {
        let expr = lit(false).or(col("active")).canonicalize();
        assert_eq!(expr, col("active"));
    }

    #[test]
    fn test_json_shape() {
        let json = col("x").eq(lit(1i64)).to_json();
        assert!(json.starts_with(r#"{"type":"BinaryOp","op":"=","value":"","children":["#));
        assert!(json.contains(r#"{"type":"ColumnRef","op":"","value":"x","children":[]}"#));
    }

    #[test]
    fn test_column_refs() {
        let expr = col("t.a").eq(col("u.b")).and(col("t.c").gt(lit(1i64)));
        let refs = expr.column_refs();
        assert_eq!(refs, vec!["t.a", "u.b", "t.c"]);
    }

    #[test]
    fn test_map_embedded_plans_reaches_subquery_bodies() {
        let expr = col("t.x")
            .eq(ExprNode::Subquery {
                plan: Box::new(PlanNode::scan("u")),
            })
            .and(ExprNode::Exists {
                plan: Box::new(PlanNode::scan("v")),
                negated: true,
            });

        let mut visited = Vec::new();
        let mapped = expr.map_embedded_plans(&mut |plan| {
            visited.push(plan.name());
            PlanNode::limit(1, plan)
        });

        assert_eq!(visited, vec!["Scan", "Scan"]);
        // Both embedded plans were rebuilt through the closure.
        assert_eq!(
            mapped.column_refs().len(),
            1,
            "expression shape is otherwise unchanged"
        );
        assert!(mapped
            .to_json()
            .contains(r#"\"type\":\"Limit\""#));
    }
}
