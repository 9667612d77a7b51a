//! SQL-text plan extraction.
//!
//! Lowers one `SELECT` statement into the logical plan. Statement shapes the
//! rewriter cannot reason about at all (DML, CTEs, window functions) fail
//! extraction; smaller unrecognized fragments become `Unknown` nodes and mark
//! the plan unsupported, which strict validation treats as non-equivalent.

use common_error::{RequelError, RequelResult};
use requel_plan::{
    and_all, BinaryOp, ExprNode, JoinType, LiteralValue, LogicalPlan, PlanNode, SortKey,
    SubqueryKind, UnaryOp,
};
use sqlparser::ast::{
    BinaryOperator, Expr as SqlExpr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr,
    Join, JoinConstraint, JoinOperator, ObjectName, Query, Select, SelectItem, SetExpr,
    SetOperator, SetQuantifier, Statement, TableFactor, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::session::SessionHandle;

/// Bridge from a host optimizer session to logical plans.
///
/// Implementations must be deterministic for a fixed SQL text and schema.
pub trait PlanExtractor: Send + Sync {
    /// Extract the logical plan for one query.
    fn extract(&self, session: SessionHandle, sql: &str) -> RequelResult<LogicalPlan>;
}

/// Extractor that parses the SQL text itself instead of walking host plan
/// structures. The session handle is unused but kept so the trait matches
/// host-backed implementations.
#[derive(Debug, Default)]
pub struct SqlPlanExtractor;

impl SqlPlanExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

impl PlanExtractor for SqlPlanExtractor {
    fn extract(&self, _session: SessionHandle, sql: &str) -> RequelResult<LogicalPlan> {
        let statements = Parser::parse_sql(&GenericDialect {}, sql)
            .map_err(|e| RequelError::extraction(format!("parse error: {e}")))?;

        if statements.len() != 1 {
            return Err(RequelError::unsupported(
                "exactly one statement is expected",
            ));
        }

        let Statement::Query(query) = &statements[0] else {
            return Err(RequelError::unsupported("only SELECT is supported"));
        };

        let mut lowering = Lowering::default();
        let root = lowering.lower_query(query)?;

        let mut plan = LogicalPlan::new(root, sql);
        if !lowering.unknown_fragments.is_empty() || plan.root.has_unknown() {
            plan.mark_unsupported();
        }
        Ok(plan)
    }
}

/// Per-extraction lowering state.
#[derive(Default)]
struct Lowering {
    /// Fragments mapped to `Unknown` nodes, for diagnostics.
    unknown_fragments: Vec<String>,
}

impl Lowering {
    fn lower_query(&mut self, query: &Query) -> RequelResult<PlanNode> {
        if query.with.is_some() {
            return Err(RequelError::unsupported("common table expressions"));
        }
        if query.offset.is_some() || query.fetch.is_some() {
            return Err(RequelError::unsupported("OFFSET / FETCH"));
        }

        let mut plan = self.lower_set_expr(&query.body)?;

        if let Some(order_by) = &query.order_by {
            let keys = order_by
                .exprs
                .iter()
                .map(|key| SortKey {
                    column: self.column_name(&key.expr),
                    ascending: key.asc.unwrap_or(true),
                })
                .collect();
            plan = PlanNode::sort(keys, plan);
        }

        if let Some(limit) = &query.limit {
            match limit_count(limit) {
                Some(count) => plan = PlanNode::limit(count, plan),
                None => return Err(RequelError::unsupported("non-literal LIMIT")),
            }
        }

        Ok(plan)
    }

    fn lower_set_expr(&mut self, body: &SetExpr) -> RequelResult<PlanNode> {
        match body {
            SetExpr::Select(select) => self.lower_select(select),
            SetExpr::Query(nested) => self.lower_query(nested),
            SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => {
                let all = matches!(set_quantifier, SetQuantifier::All);
                let mut inputs = Vec::new();
                self.flatten_union(left, all, &mut inputs)?;
                self.flatten_union(right, all, &mut inputs)?;
                Ok(PlanNode::Union { all, inputs })
            }
            SetExpr::SetOperation { op, .. } => {
                Err(RequelError::unsupported(format!("set operation {op}")))
            }
            other => Err(RequelError::unsupported(format!(
                "query body {}",
                compact(&other.to_string())
            ))),
        }
    }

    /// Collect same-quantifier UNION branches into one n-ary node.
    fn flatten_union(
        &mut self,
        body: &SetExpr,
        all: bool,
        inputs: &mut Vec<PlanNode>,
    ) -> RequelResult<()> {
        match body {
            SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier,
                left,
                right,
            } if matches!(set_quantifier, SetQuantifier::All) == all => {
                self.flatten_union(left, all, inputs)?;
                self.flatten_union(right, all, inputs)?;
                Ok(())
            }
            other => {
                inputs.push(self.lower_set_expr(other)?);
                Ok(())
            }
        }
    }

    fn lower_select(&mut self, select: &Select) -> RequelResult<PlanNode> {
        if select.from.is_empty() {
            return Err(RequelError::unsupported("SELECT without FROM"));
        }

        // FROM items: explicit joins within an item, comma cross joins between
        // items.
        let mut plan: Option<PlanNode> = None;
        for item in &select.from {
            let mut relation = self.lower_table_factor(&item.relation)?;
            for join in &item.joins {
                relation = self.lower_join(relation, join)?;
            }
            plan = Some(match plan {
                Some(existing) => PlanNode::join(JoinType::Inner, None, existing, relation),
                None => relation,
            });
        }
        let mut plan = plan.expect("FROM is non-empty");

        // WHERE: plain conjuncts become a filter; affirmative IN/EXISTS
        // subquery conjuncts become subquery nodes above it.
        if let Some(selection) = &select.selection {
            let (plain, subqueries) = self.partition_where(selection)?;
            if let Some(condition) = and_all(plain) {
                plan = PlanNode::filter(condition, plan);
            }
            for subquery in subqueries {
                plan = match subquery {
                    WherePredicate::In { operand, subplan } => PlanNode::Subquery {
                        kind: SubqueryKind::In { operand },
                        input: Some(Box::new(plan)),
                        subplan: Box::new(subplan),
                    },
                    WherePredicate::Exists { subplan } => PlanNode::Subquery {
                        kind: SubqueryKind::Exists,
                        input: Some(Box::new(plan)),
                        subplan: Box::new(subplan),
                    },
                };
            }
        }

        // GROUP BY.
        let group_columns = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) if !exprs.is_empty() => {
                exprs.iter().map(|e| self.column_name(e)).collect()
            }
            GroupByExpr::Expressions(_, _) => Vec::new(),
            GroupByExpr::All(_) => {
                return Err(RequelError::unsupported("GROUP BY ALL"));
            }
        };
        if !group_columns.is_empty() {
            plan = PlanNode::Aggregate {
                group_by: group_columns,
                input: Box::new(plan),
            };
        }

        if let Some(having) = &select.having {
            plan = PlanNode::filter(self.lower_expr(having)?, plan);
        }

        // Projection.
        let mut columns = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            columns.push(self.projection_name(item)?);
        }

        // DISTINCT is grouping over the projected columns.
        if select.distinct.is_some() {
            plan = PlanNode::Aggregate {
                group_by: columns.clone(),
                input: Box::new(plan),
            };
        }

        Ok(PlanNode::Project {
            columns,
            input: Box::new(plan),
        })
    }

    fn lower_table_factor(&mut self, factor: &TableFactor) -> RequelResult<PlanNode> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table = object_name(name);
                Ok(match alias {
                    Some(alias) => PlanNode::scan_as(table, alias.name.value.clone()),
                    None => PlanNode::scan(table),
                })
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let subplan = self.lower_query(subquery)?;
                Ok(PlanNode::Subquery {
                    kind: SubqueryKind::Derived {
                        alias: alias.as_ref().map(|a| a.name.value.clone()),
                    },
                    input: None,
                    subplan: Box::new(subplan),
                })
            }
            other => Ok(self.unknown_node(format!("table factor {}", compact(&other.to_string())))),
        }
    }

    fn lower_join(&mut self, left: PlanNode, join: &Join) -> RequelResult<PlanNode> {
        let right = self.lower_table_factor(&join.relation)?;

        let (join_type, constraint) = match &join.join_operator {
            JoinOperator::Inner(constraint) => (JoinType::Inner, Some(constraint)),
            JoinOperator::LeftOuter(constraint) => (JoinType::Left, Some(constraint)),
            JoinOperator::RightOuter(constraint) => (JoinType::Right, Some(constraint)),
            JoinOperator::FullOuter(constraint) => (JoinType::Full, Some(constraint)),
            JoinOperator::CrossJoin => (JoinType::Inner, None),
            other => {
                let node = self.unknown_node(format!("join operator {other:?}"));
                return Ok(PlanNode::join(JoinType::Inner, None, left, node));
            }
        };

        let condition = match constraint {
            Some(JoinConstraint::On(expr)) => Some(self.lower_expr(expr)?),
            Some(JoinConstraint::None) | None => None,
            Some(other) => Some(self.unknown_expr(format!("join constraint {other:?}"))),
        };

        Ok(PlanNode::join(join_type, condition, left, right))
    }

    /// Split a WHERE clause into plain conjuncts and affirmative subquery
    /// predicates (which become plan-level subquery nodes).
    fn partition_where(
        &mut self,
        selection: &SqlExpr,
    ) -> RequelResult<(Vec<ExprNode>, Vec<WherePredicate>)> {
        let mut plain = Vec::new();
        let mut subqueries = Vec::new();

        for conjunct in sql_conjuncts(selection) {
            match conjunct {
                SqlExpr::InSubquery {
                    expr,
                    subquery,
                    negated: false,
                } => subqueries.push(WherePredicate::In {
                    operand: self.lower_expr(expr)?,
                    subplan: self.lower_query(subquery)?,
                }),
                SqlExpr::Exists {
                    subquery,
                    negated: false,
                } => subqueries.push(WherePredicate::Exists {
                    subplan: self.lower_query(subquery)?,
                }),
                other => plain.push(self.lower_expr(other)?),
            }
        }

        Ok((plain, subqueries))
    }

    fn lower_expr(&mut self, expr: &SqlExpr) -> RequelResult<ExprNode> {
        match expr {
            SqlExpr::Identifier(ident) => Ok(ExprNode::column(ident.value.clone())),
            SqlExpr::CompoundIdentifier(idents) => {
                let name: Vec<&str> = idents.iter().map(|i| i.value.as_str()).collect();
                Ok(ExprNode::column(name.join(".")))
            }
            SqlExpr::Value(value) => Ok(self.lower_value(value)),
            SqlExpr::Nested(inner) => self.lower_expr(inner),
            SqlExpr::BinaryOp { left, op, right } => {
                let Some(op) = binary_op(op) else {
                    return Ok(self.unknown_expr(format!("operator {op}")));
                };
                Ok(ExprNode::binary(
                    self.lower_expr(left)?,
                    op,
                    self.lower_expr(right)?,
                ))
            }
            SqlExpr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => Ok(self.lower_expr(expr)?.not()),
                UnaryOperator::Minus => {
                    Ok(ExprNode::unary(UnaryOp::Neg, self.lower_expr(expr)?))
                }
                UnaryOperator::Plus => self.lower_expr(expr),
                other => Ok(self.unknown_expr(format!("unary operator {other}"))),
            },
            SqlExpr::IsNull(inner) => {
                Ok(ExprNode::unary(UnaryOp::IsNull, self.lower_expr(inner)?))
            }
            SqlExpr::IsNotNull(inner) => {
                Ok(ExprNode::unary(UnaryOp::IsNotNull, self.lower_expr(inner)?))
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let members = list
                    .iter()
                    .map(|member| self.lower_expr(member))
                    .collect::<RequelResult<Vec<_>>>()?;
                Ok(ExprNode::InList {
                    expr: Box::new(self.lower_expr(expr)?),
                    list: members,
                    negated: *negated,
                })
            }
            SqlExpr::Between {
                expr,
                negated: false,
                low,
                high,
            } => {
                let operand = self.lower_expr(expr)?;
                let low = self.lower_expr(low)?;
                let high = self.lower_expr(high)?;
                Ok(operand.clone().gte(low).and(operand.lte(high)))
            }
            SqlExpr::Exists { subquery, negated } => Ok(ExprNode::Exists {
                plan: Box::new(self.lower_query(subquery)?),
                negated: *negated,
            }),
            SqlExpr::Subquery(subquery) => Ok(ExprNode::Subquery {
                plan: Box::new(self.lower_query(subquery)?),
            }),
            SqlExpr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let operand = match operand {
                    Some(inner) => Some(Box::new(self.lower_expr(inner)?)),
                    None => None,
                };
                let branches = conditions
                    .iter()
                    .zip(results.iter())
                    .map(|(when, then)| Ok((self.lower_expr(when)?, self.lower_expr(then)?)))
                    .collect::<RequelResult<Vec<_>>>()?;
                let else_expr = match else_result {
                    Some(inner) => Some(Box::new(self.lower_expr(inner)?)),
                    None => None,
                };
                Ok(ExprNode::Case {
                    operand,
                    branches,
                    else_expr,
                })
            }
            SqlExpr::Function(func) => {
                if func.over.is_some() {
                    return Err(RequelError::extraction(format!(
                        "window function {} cannot be modeled",
                        object_name(&func.name)
                    )));
                }
                let name = object_name(&func.name).to_uppercase();
                let args = match &func.args {
                    FunctionArguments::None => Vec::new(),
                    FunctionArguments::List(list) => {
                        let mut lowered = Vec::with_capacity(list.args.len());
                        for arg in &list.args {
                            lowered.push(match arg {
                                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                                    self.lower_expr(e)?
                                }
                                FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                                    ExprNode::column("*")
                                }
                                other => {
                                    self.unknown_expr(format!("function argument {other}"))
                                }
                            });
                        }
                        lowered
                    }
                    FunctionArguments::Subquery(_) => {
                        vec![self.unknown_expr("function subquery argument")]
                    }
                };
                Ok(ExprNode::Function { name, args })
            }
            other => Ok(self.unknown_expr(format!("expression {}", compact(&other.to_string())))),
        }
    }

    fn lower_value(&mut self, value: &Value) -> ExprNode {
        match value {
            Value::Number(text, _) => {
                if let Ok(integer) = text.parse::<i64>() {
                    ExprNode::literal(integer)
                } else if let Ok(float) = text.parse::<f64>() {
                    ExprNode::literal(float)
                } else {
                    self.unknown_expr(format!("numeric literal {text}"))
                }
            }
            Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => {
                ExprNode::literal(text.as_str())
            }
            Value::Boolean(b) => ExprNode::literal(*b),
            Value::Null => ExprNode::Literal(LiteralValue::Null),
            other => self.unknown_expr(format!("literal {other}")),
        }
    }

    /// Output name of a projection item.
    fn projection_name(&mut self, item: &SelectItem) -> RequelResult<String> {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                // Lower for its side effects: window detection and unknown
                // fragment tracking.
                self.lower_expr(expr)?;
                Ok(self.column_name(expr))
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                self.lower_expr(expr)?;
                Ok(alias.value.clone())
            }
            SelectItem::Wildcard(_) => Ok("*".to_string()),
            SelectItem::QualifiedWildcard(name, _) => Ok(format!("{}.*", object_name(name))),
        }
    }

    /// Stable textual name for an expression used as a column.
    fn column_name(&mut self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Identifier(ident) => ident.value.clone(),
            SqlExpr::CompoundIdentifier(idents) => {
                let name: Vec<&str> = idents.iter().map(|i| i.value.as_str()).collect();
                name.join(".")
            }
            other => other.to_string(),
        }
    }

    fn unknown_node(&mut self, detail: String) -> PlanNode {
        self.unknown_fragments.push(detail.clone());
        PlanNode::Unknown(detail)
    }

    fn unknown_expr(&mut self, detail: impl Into<String>) -> ExprNode {
        let detail = detail.into();
        self.unknown_fragments.push(detail.clone());
        ExprNode::Unknown(detail)
    }
}

/// Affirmative subquery predicate peeled off a WHERE clause.
enum WherePredicate {
    In {
        operand: ExprNode,
        subplan: PlanNode,
    },
    Exists {
        subplan: PlanNode,
    },
}

/// Split an AND chain at the SQL level, preserving source order.
fn sql_conjuncts(expr: &SqlExpr) -> Vec<&SqlExpr> {
    match expr {
        SqlExpr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut conjuncts = sql_conjuncts(left);
            conjuncts.extend(sql_conjuncts(right));
            conjuncts
        }
        SqlExpr::Nested(inner) => sql_conjuncts(inner),
        other => vec![other],
    }
}

fn binary_op(op: &BinaryOperator) -> Option<BinaryOp> {
    match op {
        BinaryOperator::Eq => Some(BinaryOp::Eq),
        BinaryOperator::NotEq => Some(BinaryOp::NotEq),
        BinaryOperator::Lt => Some(BinaryOp::Lt),
        BinaryOperator::LtEq => Some(BinaryOp::LtEq),
        BinaryOperator::Gt => Some(BinaryOp::Gt),
        BinaryOperator::GtEq => Some(BinaryOp::GtEq),
        BinaryOperator::And => Some(BinaryOp::And),
        BinaryOperator::Or => Some(BinaryOp::Or),
        BinaryOperator::Plus => Some(BinaryOp::Add),
        BinaryOperator::Minus => Some(BinaryOp::Sub),
        BinaryOperator::Multiply => Some(BinaryOp::Mul),
        BinaryOperator::Divide => Some(BinaryOp::Div),
        BinaryOperator::Modulo => Some(BinaryOp::Mod),
        _ => None,
    }
}

fn limit_count(expr: &SqlExpr) -> Option<u64> {
    match expr {
        SqlExpr::Value(Value::Number(text, _)) => text.parse().ok(),
        _ => None,
    }
}

fn object_name(name: &ObjectName) -> String {
    let parts: Vec<&str> = name.0.iter().map(|i| i.value.as_str()).collect();
    parts.join(".")
}

fn compact(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(60)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::col;

    fn extract(sql: &str) -> LogicalPlan {
        SqlPlanExtractor::new()
            .extract(SessionHandle::new(0), sql)
            .unwrap()
    }

    #[test]
    fn test_simple_select() {
        let plan = extract("SELECT id, name FROM users WHERE id > 100");

        let PlanNode::Project { columns, input } = &plan.root else {
            panic!("expected Project at root");
        };
        assert_eq!(columns, &["id", "name"]);
        assert!(matches!(input.as_ref(), PlanNode::Filter { .. }));
        assert!(!plan.is_unsupported());
    }

    #[test]
    fn test_join_with_condition() {
        let plan = extract("SELECT * FROM a JOIN b ON a.x = b.y");

        let PlanNode::Project { input, .. } = &plan.root else {
            panic!("expected Project");
        };
        let PlanNode::Join {
            join_type,
            condition,
            ..
        } = input.as_ref()
        else {
            panic!("expected Join");
        };
        assert_eq!(*join_type, JoinType::Inner);
        assert_eq!(condition, &Some(col("a.x").eq(col("b.y"))));
    }

    #[test]
    fn test_in_subquery_becomes_plan_node() {
        let plan = extract(
            "SELECT * FROM customer WHERE customer_sk IN \
             (SELECT customer_sk FROM sales WHERE price > 100)",
        );

        let PlanNode::Project { input, .. } = &plan.root else {
            panic!("expected Project");
        };
        assert!(matches!(
            input.as_ref(),
            PlanNode::Subquery {
                kind: SubqueryKind::In { .. },
                input: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_group_by_and_order_by() {
        let plan = extract(
            "SELECT dept, COUNT(*) AS headcount FROM emp GROUP BY dept ORDER BY dept DESC LIMIT 5",
        );

        let PlanNode::Limit { count, input } = &plan.root else {
            panic!("expected Limit at root");
        };
        assert_eq!(*count, 5);
        let PlanNode::Sort { keys, input } = input.as_ref() else {
            panic!("expected Sort");
        };
        assert_eq!(keys.len(), 1);
        assert!(!keys[0].ascending);
        let PlanNode::Project { columns, input } = input.as_ref() else {
            panic!("expected Project");
        };
        assert_eq!(columns, &["dept", "headcount"]);
        assert!(matches!(input.as_ref(), PlanNode::Aggregate { .. }));
    }

    #[test]
    fn test_window_function_fails_extraction() {
        let err = SqlPlanExtractor::new()
            .extract(
                SessionHandle::new(0),
                "SELECT id, ROW_NUMBER() OVER (ORDER BY id) FROM t",
            )
            .unwrap_err();
        assert!(matches!(err, RequelError::Extraction(_)));
    }

    #[test]
    fn test_cte_fails_extraction() {
        let err = SqlPlanExtractor::new()
            .extract(
                SessionHandle::new(0),
                "WITH x AS (SELECT 1 AS one FROM t) SELECT * FROM x",
            )
            .unwrap_err();
        assert!(matches!(err, RequelError::Unsupported(_)));
    }

    #[test]
    fn test_unrecognized_fragment_marks_unsupported() {
        let plan = extract("SELECT * FROM t WHERE name LIKE 'a%'");
        assert!(plan.is_unsupported());
    }

    #[test]
    fn test_union_flattens() {
        let plan =
            extract("SELECT a FROM t UNION ALL SELECT a FROM u UNION ALL SELECT a FROM v");
        let PlanNode::Union { all, inputs } = &plan.root else {
            panic!("expected Union at root");
        };
        assert!(*all);
        assert_eq!(inputs.len(), 3);
    }

    #[test]
    fn test_between_expands() {
        let plan = extract("SELECT * FROM t WHERE t.x BETWEEN 1 AND 10");
        let PlanNode::Project { input, .. } = &plan.root else {
            panic!("expected Project");
        };
        let PlanNode::Filter { condition, .. } = input.as_ref() else {
            panic!("expected Filter");
        };
        assert_eq!(
            condition,
            &col("t.x")
                .gte(requel_plan::lit(1i64))
                .and(col("t.x").lte(requel_plan::lit(10i64)))
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let sql = "SELECT a, b FROM t JOIN u ON t.k = u.k WHERE t.a IN (1, 2, 3)";
        assert_eq!(extract(sql).to_json(), extract(sql).to_json());
    }
}
