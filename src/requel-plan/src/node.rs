//! Relational-algebra operator tree.

use std::collections::BTreeSet;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::expr::ExprNode;

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Inner join.
    Inner,
    /// Left outer join.
    Left,
    /// Right outer join.
    Right,
    /// Full outer join.
    Full,
    /// Semijoin: left rows with at least one right match, no right columns.
    /// Produced only by subquery unnesting, never by the extractor.
    Semi,
}

impl JoinType {
    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "Inner",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Full => "Full",
            Self::Semi => "Semi",
        }
    }
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What role a subquery node plays in its enclosing query.
#[derive(Debug, Clone, PartialEq)]
pub enum SubqueryKind {
    /// `operand IN (SELECT ...)` predicate over the outer input.
    In {
        /// The tested operand.
        operand: ExprNode,
    },
    /// `EXISTS (SELECT ...)` predicate over the outer input.
    Exists,
    /// Derived table in a FROM clause.
    Derived {
        /// The derived table's alias, when given.
        alias: Option<String>,
    },
}

impl SubqueryKind {
    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In { .. } => "In",
            Self::Exists => "Exists",
            Self::Derived { .. } => "Derived",
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Sorted column.
    pub column: String,
    /// Ascending order when true.
    pub ascending: bool,
}

impl SortKey {
    /// Ascending key on a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    /// Descending key on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    fn render(&self) -> String {
        format!(
            "{} {}",
            self.column,
            if self.ascending { "ASC" } else { "DESC" }
        )
    }
}

/// A node in a logical query plan.
///
/// Arity invariants: `Scan` and `Unknown` are leaves; `Join` has exactly two
/// children; `Filter`, `Project`, `Aggregate`, `Sort`, and `Limit` have
/// exactly one; `Union` has at least two; `Subquery` has one child in its
/// derived-table form and two (outer input, then inner plan) in its
/// predicate forms.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Base table scan.
    Scan {
        /// Table name.
        table: String,
        /// Table alias, when given.
        alias: Option<String>,
    },
    /// Join of two relations.
    Join {
        /// Join flavor.
        join_type: JoinType,
        /// Join condition; absent for a cross product.
        condition: Option<ExprNode>,
        /// Left input.
        left: Box<PlanNode>,
        /// Right input.
        right: Box<PlanNode>,
    },
    /// Row restriction.
    Filter {
        /// Filter predicate.
        condition: ExprNode,
        /// Input plan.
        input: Box<PlanNode>,
    },
    /// Column selection.
    Project {
        /// Projected column names in output order.
        columns: Vec<String>,
        /// Input plan.
        input: Box<PlanNode>,
    },
    /// Grouping.
    Aggregate {
        /// Group-by column names in source order.
        group_by: Vec<String>,
        /// Input plan.
        input: Box<PlanNode>,
    },
    /// Row ordering.
    Sort {
        /// Sort keys in significance order.
        keys: Vec<SortKey>,
        /// Input plan.
        input: Box<PlanNode>,
    },
    /// Subquery, either a predicate over an outer input or a derived table.
    Subquery {
        /// Role of the subquery.
        kind: SubqueryKind,
        /// Outer input for the predicate forms; absent for derived tables.
        input: Option<Box<PlanNode>>,
        /// The subquery's own plan.
        subplan: Box<PlanNode>,
    },
    /// Union of two or more inputs.
    Union {
        /// UNION ALL when true, otherwise distinct.
        all: bool,
        /// Input plans in source order.
        inputs: Vec<PlanNode>,
    },
    /// Row count restriction.
    Limit {
        /// Maximum row count.
        count: u64,
        /// Input plan.
        input: Box<PlanNode>,
    },
    /// Fragment the extractor recognized but cannot model.
    Unknown(String),
}

impl PlanNode {
    /// Create a scan.
    pub fn scan(table: impl Into<String>) -> Self {
        Self::Scan {
            table: table.into(),
            alias: None,
        }
    }

    /// Create an aliased scan.
    pub fn scan_as(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Scan {
            table: table.into(),
            alias: Some(alias.into()),
        }
    }

    /// Create a join.
    pub fn join(
        join_type: JoinType,
        condition: Option<ExprNode>,
        left: PlanNode,
        right: PlanNode,
    ) -> Self {
        Self::Join {
            join_type,
            condition,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create a filter.
    pub fn filter(condition: ExprNode, input: PlanNode) -> Self {
        Self::Filter {
            condition,
            input: Box::new(input),
        }
    }

    /// Create a projection.
    pub fn project<I, S>(columns: I, input: PlanNode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Project {
            columns: columns.into_iter().map(Into::into).collect(),
            input: Box::new(input),
        }
    }

    /// Create an aggregation.
    pub fn aggregate<I, S>(group_by: I, input: PlanNode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Aggregate {
            group_by: group_by.into_iter().map(Into::into).collect(),
            input: Box::new(input),
        }
    }

    /// Create a sort.
    pub fn sort(keys: Vec<SortKey>, input: PlanNode) -> Self {
        Self::Sort {
            keys,
            input: Box::new(input),
        }
    }

    /// Create a limit.
    pub fn limit(count: u64, input: PlanNode) -> Self {
        Self::Limit {
            count,
            input: Box::new(input),
        }
    }

    /// Operator name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "Scan",
            Self::Join { .. } => "Join",
            Self::Filter { .. } => "Filter",
            Self::Project { .. } => "Project",
            Self::Aggregate { .. } => "Aggregate",
            Self::Sort { .. } => "Sort",
            Self::Subquery { .. } => "Subquery",
            Self::Union { .. } => "Union",
            Self::Limit { .. } => "Limit",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Child plans in positional order.
    pub fn inputs(&self) -> Vec<&PlanNode> {
        match self {
            Self::Scan { .. } | Self::Unknown(_) => vec![],
            Self::Join { left, right, .. } => vec![left, right],
            Self::Filter { input, .. }
            | Self::Project { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Limit { input, .. } => vec![input],
            Self::Subquery { input, subplan, .. } => match input {
                Some(outer) => vec![outer, subplan],
                None => vec![subplan],
            },
            Self::Union { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Number of child plans.
    pub fn input_count(&self) -> usize {
        self.inputs().len()
    }

    /// True when the operator has no inputs.
    pub fn is_leaf(&self) -> bool {
        self.input_count() == 0
    }

    /// Condition expression carried by this operator, if any.
    pub fn condition(&self) -> Option<&ExprNode> {
        match self {
            Self::Join { condition, .. } => condition.as_ref(),
            Self::Filter { condition, .. } => Some(condition),
            Self::Subquery {
                kind: SubqueryKind::In { operand },
                ..
            } => Some(operand),
            _ => None,
        }
    }

    /// Map over the condition expression carried by this operator, if any.
    pub fn map_condition<F>(self, f: F) -> Self
    where
        F: FnOnce(ExprNode) -> ExprNode,
    {
        match self {
            Self::Filter { condition, input } => Self::Filter {
                condition: f(condition),
                input,
            },
            Self::Join {
                join_type,
                condition: Some(condition),
                left,
                right,
            } => Self::Join {
                join_type,
                condition: Some(f(condition)),
                left,
                right,
            },
            Self::Subquery {
                kind: SubqueryKind::In { operand },
                input,
                subplan,
            } => Self::Subquery {
                kind: SubqueryKind::In {
                    operand: f(operand),
                },
                input,
                subplan,
            },
            other => other,
        }
    }

    /// Map over children, replacing them with transformed versions.
    pub fn map_children<F>(self, mut f: F) -> Self
    where
        F: FnMut(PlanNode) -> PlanNode,
    {
        match self {
            Self::Scan { .. } | Self::Unknown(_) => self,
            Self::Join {
                join_type,
                condition,
                left,
                right,
            } => Self::Join {
                join_type,
                condition,
                left: Box::new(f(*left)),
                right: Box::new(f(*right)),
            },
            Self::Filter { condition, input } => Self::Filter {
                condition,
                input: Box::new(f(*input)),
            },
            Self::Project { columns, input } => Self::Project {
                columns,
                input: Box::new(f(*input)),
            },
            Self::Aggregate { group_by, input } => Self::Aggregate {
                group_by,
                input: Box::new(f(*input)),
            },
            Self::Sort { keys, input } => Self::Sort {
                keys,
                input: Box::new(f(*input)),
            },
            Self::Subquery {
                kind,
                input,
                subplan,
            } => Self::Subquery {
                kind,
                input: input.map(|outer| Box::new(f(*outer))),
                subplan: Box::new(f(*subplan)),
            },
            Self::Union { all, inputs } => Self::Union {
                all,
                inputs: inputs.into_iter().map(&mut f).collect(),
            },
            Self::Limit { count, input } => Self::Limit {
                count,
                input: Box::new(f(*input)),
            },
        }
    }

    /// Total node count, children included.
    pub fn node_count(&self) -> usize {
        1 + self.inputs().iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// True when any node in the subtree satisfies the predicate.
    pub fn contains<F>(&self, pred: F) -> bool
    where
        F: Fn(&PlanNode) -> bool + Copy,
    {
        pred(self) || self.inputs().iter().any(|c| c.contains(pred))
    }

    /// Count nodes in the subtree satisfying the predicate.
    pub fn count_matching<F>(&self, pred: F) -> usize
    where
        F: Fn(&PlanNode) -> bool + Copy,
    {
        usize::from(pred(self))
            + self
                .inputs()
                .iter()
                .map(|c| c.count_matching(pred))
                .sum::<usize>()
    }

    /// True when the subtree contains an unmodeled fragment, either a plan
    /// node or an expression.
    pub fn has_unknown(&self) -> bool {
        if matches!(self, Self::Unknown(_)) {
            return true;
        }
        if self.condition().is_some_and(ExprNode::has_unknown) {
            return true;
        }
        self.inputs().iter().any(|c| c.has_unknown())
    }

    /// Relation names visible to conditions above this node: aliases where
    /// given, table names otherwise. Predicate-form subqueries expose only
    /// their outer input's relations; derived tables expose their alias.
    pub fn visible_tables(&self) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        self.collect_visible_tables(&mut tables);
        tables
    }

    fn collect_visible_tables(&self, tables: &mut BTreeSet<String>) {
        match self {
            Self::Scan { table, alias } => {
                tables.insert(alias.clone().unwrap_or_else(|| table.clone()));
            }
            Self::Join { left, right, .. } => {
                left.collect_visible_tables(tables);
                right.collect_visible_tables(tables);
            }
            Self::Filter { input, .. }
            | Self::Project { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Limit { input, .. } => input.collect_visible_tables(tables),
            Self::Subquery {
                kind: SubqueryKind::Derived { alias },
                ..
            } => {
                if let Some(alias) = alias {
                    tables.insert(alias.clone());
                }
            }
            Self::Subquery { input, .. } => {
                if let Some(outer) = input {
                    outer.collect_visible_tables(tables);
                }
            }
            Self::Union { inputs, .. } => {
                if let Some(first) = inputs.first() {
                    first.collect_visible_tables(tables);
                }
            }
            Self::Unknown(_) => {}
        }
    }

    /// Canonical rendering: `{"type","op","value","cond","columns","group",
    /// "children"}`, fixed field order, no whitespace.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("plan serialization is infallible")
    }

    fn op_text(&self) -> String {
        match self {
            Self::Join { join_type, .. } => join_type.as_str().to_string(),
            Self::Subquery { kind, .. } => kind.as_str().to_string(),
            Self::Union { all, .. } => if *all { "All" } else { "Distinct" }.to_string(),
            _ => String::new(),
        }
    }

    fn value_text(&self) -> String {
        match self {
            Self::Scan { table, alias } => match alias {
                Some(alias) => format!("{table} AS {alias}"),
                None => table.clone(),
            },
            Self::Subquery {
                kind: SubqueryKind::Derived { alias: Some(alias) },
                ..
            } => alias.clone(),
            Self::Limit { count, .. } => count.to_string(),
            Self::Unknown(detail) => detail.clone(),
            _ => String::new(),
        }
    }

    fn column_list(&self) -> Vec<String> {
        match self {
            Self::Project { columns, .. } => columns.clone(),
            Self::Sort { keys, .. } => keys.iter().map(SortKey::render).collect(),
            _ => vec![],
        }
    }

    fn group_list(&self) -> Vec<String> {
        match self {
            Self::Aggregate { group_by, .. } => group_by.clone(),
            _ => vec![],
        }
    }

    /// Format as a tree string with indentation.
    pub fn explain(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let mut result = format!("{}{}\n", prefix, self);
        for input in self.inputs() {
            result.push_str(&input.explain(indent + 1));
        }
        result
    }
}

impl Serialize for PlanNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PlanNode", 7)?;
        state.serialize_field("type", self.name())?;
        state.serialize_field("op", &self.op_text())?;
        state.serialize_field("value", &self.value_text())?;
        state.serialize_field("cond", &self.condition())?;
        state.serialize_field("columns", &self.column_list())?;
        state.serialize_field("group", &self.group_list())?;
        state.serialize_field("children", &self.inputs())?;
        state.end()
    }
}

impl std::fmt::Display for PlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan { table, alias } => match alias {
                Some(alias) => write!(f, "Scan: {table} AS {alias}"),
                None => write!(f, "Scan: {table}"),
            },
            Self::Join {
                join_type,
                condition,
                ..
            } => match condition {
                Some(cond) => write!(f, "Join({join_type}): {cond}"),
                None => write!(f, "Join({join_type})"),
            },
            Self::Filter { condition, .. } => write!(f, "Filter: {condition}"),
            Self::Project { columns, .. } => write!(f, "Project: {}", columns.join(", ")),
            Self::Aggregate { group_by, .. } => {
                write!(f, "Aggregate: group by [{}]", group_by.join(", "))
            }
            Self::Sort { keys, .. } => {
                let rendered: Vec<String> = keys.iter().map(SortKey::render).collect();
                write!(f, "Sort: {}", rendered.join(", "))
            }
            Self::Subquery { kind, .. } => match kind {
                SubqueryKind::In { operand } => write!(f, "Subquery(In): {operand}"),
                SubqueryKind::Exists => write!(f, "Subquery(Exists)"),
                SubqueryKind::Derived { alias } => match alias {
                    Some(alias) => write!(f, "Subquery(Derived): {alias}"),
                    None => write!(f, "Subquery(Derived)"),
                },
            },
            Self::Union { all, .. } => {
                write!(f, "Union{}", if *all { " All" } else { "" })
            }
            Self::Limit { count, .. } => write!(f, "Limit: {count}"),
            Self::Unknown(detail) => write!(f, "Unknown: {detail}"),
        }
    }
}
