//! Structural similarity score for the heuristic mode.

use requel_plan::PlanNode;

/// Fraction of nodes that match in a positional alignment of the two trees,
/// over the larger tree's node count. 1.0 means structurally identical.
pub fn similarity(a: &PlanNode, b: &PlanNode) -> f64 {
    let max_nodes = a.node_count().max(b.node_count());
    if max_nodes == 0 {
        return 1.0;
    }
    matching_nodes(a, b) as f64 / max_nodes as f64
}

/// Nodes whose rendering (operator and payload, children excluded) agrees,
/// aligned positionally.
fn matching_nodes(a: &PlanNode, b: &PlanNode) -> usize {
    let here = usize::from(a.to_string() == b.to_string());
    here + a
        .inputs()
        .iter()
        .zip(b.inputs())
        .map(|(left, right)| matching_nodes(left, right))
        .sum::<usize>()
}
