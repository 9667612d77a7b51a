//! Canonicalization rule trait and fixpoint driver.

use std::collections::BTreeSet;

use requel_plan::{LogicalPlan, PlanNode};
use tracing::{debug, warn};

/// Passes after which a non-converging plan is returned as-is. The validator
/// treats a capped run as non-comparable.
pub const MAX_PASSES: usize = 32;

/// A single canonicalization rule.
///
/// Rules are pure: `apply` inspects one node (whose children have already
/// been rewritten this pass) and returns a replacement. A rule that does not
/// recognize the node returns it unchanged.
pub trait CanonRule: Send + Sync {
    /// Get the rule name.
    fn name(&self) -> &'static str;

    /// Apply the rule to a node, returning a potentially transformed node.
    fn apply(&self, node: PlanNode) -> Transformed;
}

/// The result of applying a canonicalization rule.
#[derive(Debug, Clone)]
pub struct Transformed {
    /// The (potentially transformed) node.
    pub node: PlanNode,
    /// Whether the node was actually changed.
    pub changed: bool,
}

impl Transformed {
    /// The rule rewrote the node.
    pub fn yes(node: PlanNode) -> Self {
        Self {
            node,
            changed: true,
        }
    }

    /// The rule left the node unchanged.
    pub fn no(node: PlanNode) -> Self {
        Self {
            node,
            changed: false,
        }
    }
}

/// The result of canonicalizing a plan.
#[derive(Debug, Clone)]
pub struct CanonOutcome {
    /// The canonicalized (or, on a capped run, best-effort) plan.
    pub plan: LogicalPlan,
    /// False when the pass cap was hit before reaching a fixpoint.
    pub converged: bool,
    /// Number of passes performed.
    pub passes: usize,
}

/// Canonicalizer that applies a rule sequence bottom-up to fixpoint.
pub struct Canonicalizer {
    rules: Vec<Box<dyn CanonRule>>,
    max_passes: usize,
}

impl Canonicalizer {
    /// Create a canonicalizer with the given rules.
    pub fn new(rules: Vec<Box<dyn CanonRule>>) -> Self {
        Self {
            rules,
            max_passes: MAX_PASSES,
        }
    }

    /// Override the pass cap.
    pub fn with_max_passes(mut self, max: usize) -> Self {
        self.max_passes = max;
        self
    }

    /// Get the rules.
    pub fn rules(&self) -> &[Box<dyn CanonRule>] {
        &self.rules
    }

    /// Canonicalize a plan.
    ///
    /// Each pass rewrites the tree bottom-up, applying every rule at every
    /// node. Passes repeat until the canonical rendering stops changing or
    /// the pass cap is hit. Rules that fired are recorded in plan metadata,
    /// as is the unsupported flag when the tree contains unmodeled fragments.
    pub fn run(&self, plan: LogicalPlan) -> CanonOutcome {
        let LogicalPlan {
            root,
            sql,
            metadata,
        } = plan;

        let mut root = root;
        let mut fired: BTreeSet<&'static str> = BTreeSet::new();
        let mut passes = 0;
        let mut converged = false;

        while passes < self.max_passes {
            passes += 1;
            let before = root.to_json();
            root = self.rewrite_pass(root, &mut fired);
            if root.to_json() == before {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(passes, sql = %sql, "canonicalization hit the pass cap");
        } else {
            debug!(passes, rules = fired.len(), "canonicalization converged");
        }

        let mut plan = LogicalPlan {
            root,
            sql,
            metadata,
        };
        for name in &fired {
            plan.metadata
                .insert(format!("canon.{name}"), "applied".to_string());
        }
        if plan.root.has_unknown() {
            plan.mark_unsupported();
        }

        CanonOutcome {
            plan,
            converged,
            passes,
        }
    }

    fn rewrite_pass(&self, node: PlanNode, fired: &mut BTreeSet<&'static str>) -> PlanNode {
        let node = node.map_children(|child| self.rewrite_pass(child, fired));
        // Scalar subquery and NOT EXISTS bodies live inside condition
        // expressions, below plan traversal; rewrite them too.
        let mut node = node.map_condition(|condition| {
            condition.map_embedded_plans(&mut |plan| self.rewrite_pass(plan, fired))
        });
        for rule in &self.rules {
            let transformed = rule.apply(node);
            if transformed.changed {
                fired.insert(rule.name());
            }
            node = transformed.node;
        }
        node
    }
}
