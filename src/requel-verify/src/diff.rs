//! Structural difference enumeration.

use serde::Serialize;

use requel_plan::PlanNode;

/// Category of a structural difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffKind {
    /// Operators (or their scalar payloads) differ.
    OperatorMismatch,
    /// Condition expressions differ.
    ConditionMismatch,
    /// Projected or grouped column lists differ.
    ProjectionMismatch,
    /// One plan has a subtree the other lacks.
    MissingSubtree,
}

/// One structural difference between two plans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDiff {
    /// Root-to-node path as child indices.
    pub path: Vec<usize>,
    /// Difference category.
    pub kind: DiffKind,
    /// Human-readable description.
    pub detail: String,
}

impl PlanDiff {
    fn new(path: &[usize], kind: DiffKind, detail: String) -> Self {
        Self {
            path: path.to_vec(),
            kind,
            detail,
        }
    }
}

impl std::fmt::Display for PlanDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        write!(f, "[{}] {:?}: {}", path.join("."), self.kind, self.detail)
    }
}

/// Enumerate the differences between two plans in lockstep.
///
/// With `relaxed` set, projected and grouped column lists compare as sets
/// unless an ancestor is order-sensitive (Sort or Limit), in which case they
/// compare positionally.
pub fn enumerate_differences(a: &PlanNode, b: &PlanNode, relaxed: bool) -> Vec<PlanDiff> {
    let mut diffs = Vec::new();
    collect(a, b, &mut Vec::new(), relaxed, false, &mut diffs);
    diffs
}

fn collect(
    a: &PlanNode,
    b: &PlanNode,
    path: &mut Vec<usize>,
    relaxed: bool,
    order_sensitive: bool,
    diffs: &mut Vec<PlanDiff>,
) {
    if a.name() != b.name() {
        diffs.push(PlanDiff::new(
            path,
            DiffKind::OperatorMismatch,
            format!("{} vs {}", a.name(), b.name()),
        ));
        return;
    }

    match (a, b) {
        (PlanNode::Scan { .. }, PlanNode::Scan { .. }) => {
            if a != b {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::OperatorMismatch,
                    format!("{a} vs {b}"),
                ));
            }
        }
        (
            PlanNode::Join {
                join_type: left_type,
                condition: left_cond,
                ..
            },
            PlanNode::Join {
                join_type: right_type,
                condition: right_cond,
                ..
            },
        ) => {
            if left_type != right_type {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::OperatorMismatch,
                    format!("join type {left_type} vs {right_type}"),
                ));
            }
            if left_cond != right_cond {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::ConditionMismatch,
                    render_conditions(left_cond.as_ref(), right_cond.as_ref()),
                ));
            }
        }
        (
            PlanNode::Filter {
                condition: left_cond,
                ..
            },
            PlanNode::Filter {
                condition: right_cond,
                ..
            },
        ) => {
            if left_cond != right_cond {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::ConditionMismatch,
                    format!("{left_cond} vs {right_cond}"),
                ));
            }
        }
        (
            PlanNode::Project { columns: left, .. },
            PlanNode::Project { columns: right, .. },
        ) => {
            if !columns_match(left, right, relaxed && !order_sensitive) {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::ProjectionMismatch,
                    format!("[{}] vs [{}]", left.join(", "), right.join(", ")),
                ));
            }
        }
        (
            PlanNode::Aggregate { group_by: left, .. },
            PlanNode::Aggregate { group_by: right, .. },
        ) => {
            if !columns_match(left, right, relaxed) {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::ProjectionMismatch,
                    format!("group by [{}] vs [{}]", left.join(", "), right.join(", ")),
                ));
            }
        }
        (PlanNode::Subquery { kind: left, .. }, PlanNode::Subquery { kind: right, .. }) => {
            if left.as_str() != right.as_str() {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::OperatorMismatch,
                    format!("subquery kind {} vs {}", left.as_str(), right.as_str()),
                ));
            } else if left != right {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::ConditionMismatch,
                    "subquery operands differ".to_string(),
                ));
            }
        }
        _ => {
            // Sort, Union, Limit, Unknown: any payload difference shows up in
            // the rendering.
            if a.to_string() != b.to_string() {
                diffs.push(PlanDiff::new(
                    path,
                    DiffKind::OperatorMismatch,
                    format!("{a} vs {b}"),
                ));
            }
        }
    }

    let left_children = a.inputs();
    let right_children = b.inputs();
    let order_sensitive =
        order_sensitive || matches!(a, PlanNode::Sort { .. } | PlanNode::Limit { .. });

    let common = left_children.len().min(right_children.len());
    for index in 0..common {
        path.push(index);
        collect(
            left_children[index],
            right_children[index],
            path,
            relaxed,
            order_sensitive,
            diffs,
        );
        path.pop();
    }
    for index in common..left_children.len().max(right_children.len()) {
        path.push(index);
        let side = if index < left_children.len() {
            format!("only the original has {}", left_children[index].name())
        } else {
            format!("only the rewrite has {}", right_children[index].name())
        };
        diffs.push(PlanDiff::new(path, DiffKind::MissingSubtree, side));
        path.pop();
    }
}

fn columns_match(left: &[String], right: &[String], as_sets: bool) -> bool {
    if as_sets {
        let mut left_sorted = left.to_vec();
        let mut right_sorted = right.to_vec();
        left_sorted.sort();
        right_sorted.sort();
        left_sorted == right_sorted
    } else {
        left == right
    }
}

fn render_conditions(
    left: Option<&requel_plan::ExprNode>,
    right: Option<&requel_plan::ExprNode>,
) -> String {
    let render = |cond: Option<&requel_plan::ExprNode>| match cond {
        Some(cond) => cond.to_string(),
        None => "<none>".to_string(),
    };
    format!("{} vs {}", render(left), render(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use requel_plan::{col, lit};

    #[test]
    fn test_identical_plans_have_no_differences() {
        let make = || PlanNode::filter(col("x").gt(lit(5i64)), PlanNode::scan("t"));
        assert!(enumerate_differences(&make(), &make(), false).is_empty());
    }

    #[test]
    fn test_condition_difference_names_path() {
        let a = PlanNode::project(["*"], PlanNode::filter(col("x").gt(lit(5i64)), PlanNode::scan("t")));
        let b = PlanNode::project(["*"], PlanNode::filter(col("x").gte(lit(5i64)), PlanNode::scan("t")));

        let diffs = enumerate_differences(&a, &b, false);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::ConditionMismatch);
        assert_eq!(diffs[0].path, vec![0]);
    }

    #[test]
    fn test_projection_sets_in_relaxed_mode() {
        let ab = PlanNode::project(["a", "b"], PlanNode::scan("t"));
        let ba = PlanNode::project(["b", "a"], PlanNode::scan("t"));

        assert!(!enumerate_differences(&ab, &ba, false).is_empty());
        assert!(enumerate_differences(&ab, &ba, true).is_empty());
    }

    #[test]
    fn test_projection_under_sort_is_positional() {
        let make = |cols: [&str; 2]| {
            PlanNode::sort(
                vec![requel_plan::SortKey::asc("a")],
                PlanNode::project(cols, PlanNode::scan("t")),
            )
        };

        let diffs = enumerate_differences(&make(["a", "b"]), &make(["b", "a"]), true);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::ProjectionMismatch);
    }

    #[test]
    fn test_missing_subtree_reported() {
        let two = PlanNode::Union {
            all: true,
            inputs: vec![PlanNode::scan("a"), PlanNode::scan("b")],
        };
        let three = PlanNode::Union {
            all: true,
            inputs: vec![PlanNode::scan("a"), PlanNode::scan("b"), PlanNode::scan("c")],
        };

        let diffs = enumerate_differences(&two, &three, false);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::MissingSubtree);
        assert_eq!(diffs[0].path, vec![2]);
    }
}
