//! Logical plan root structure.

use std::collections::BTreeMap;

use crate::node::PlanNode;

/// Metadata key set when a plan contains a fragment the extractor or the
/// canonicalization rules could not model.
pub const META_UNSUPPORTED: &str = "unsupported";

/// Root of a logical query plan.
///
/// The tree is immutable after construction; canonicalization builds a new
/// plan. Metadata is diagnostic only and never participates in the canonical
/// rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPlan {
    /// Root operator.
    pub root: PlanNode,
    /// The SQL text this plan was extracted from.
    pub sql: String,
    /// Free-form diagnostic annotations.
    pub metadata: BTreeMap<String, String>,
}

impl LogicalPlan {
    /// Create a new logical plan.
    pub fn new(root: PlanNode, sql: impl Into<String>) -> Self {
        Self {
            root,
            sql: sql.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Get the root operator.
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    /// Attach a metadata annotation.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record that the plan contains an unmodeled fragment.
    pub fn mark_unsupported(&mut self) {
        self.metadata
            .insert(META_UNSUPPORTED.to_string(), "true".to_string());
    }

    /// True when the plan was marked as containing an unmodeled fragment.
    pub fn is_unsupported(&self) -> bool {
        self.metadata.get(META_UNSUPPORTED).map(String::as_str) == Some("true")
            || self.root.has_unknown()
    }

    /// Canonical rendering of the plan tree. Metadata and SQL text are
    /// excluded: two plans are byte-identical here iff their trees are
    /// structurally identical.
    pub fn to_json(&self) -> String {
        self.root.to_json()
    }

    /// Human-readable tree rendering with stable per-plan node identifiers
    /// (pre-order position). Diagnostics only; no semantic contract.
    pub fn to_pretty_string(&self) -> String {
        let mut output = String::new();
        let mut next_id = 0usize;
        Self::render(&self.root, 0, &mut next_id, &mut output);
        output
    }

    fn render(node: &PlanNode, indent: usize, next_id: &mut usize, output: &mut String) {
        let id = *next_id;
        *next_id += 1;
        output.push_str(&"  ".repeat(indent));
        output.push_str(&format!("#{id} {node}\n"));
        for child in node.inputs() {
            Self::render(child, indent + 1, next_id, output);
        }
    }
}

impl std::fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_pretty_string())
    }
}
