use serde::Serialize;
use tracing::debug;

use crate::archive::GraphStore;
use crate::graph::SuggestedChanges;

/// Outcome of applying one suggestion batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub nodes_added: usize,
    pub nodes_skipped: usize,
    pub links_added: usize,
    pub links_skipped: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.nodes_added > 0 || self.links_added > 0
    }
}

/// Apply the safe, non-duplicate subset of `changes` to `graph`.
///
/// Nodes are applied before links, so a link may reference a node proposed
/// earlier in the same batch. Duplicate ids, duplicate endpoint pairs (in
/// either orientation) and dangling endpoints are skipped, never reported
/// as errors.
pub fn merge_suggestions(graph: &mut GraphStore, changes: &SuggestedChanges) -> MergeReport {
    let mut report = MergeReport::default();

    for node in &changes.nodes {
        if graph.add_node_if_absent(node.clone()) {
            report.nodes_added += 1;
        } else {
            debug!(node_id = %node.id, "skipping duplicate node");
            report.nodes_skipped += 1;
        }
    }

    for link in &changes.links {
        if graph.add_link_if_absent(link.clone()) {
            report.links_added += 1;
        } else {
            debug!(
                source = %link.source,
                target = %link.target,
                "skipping duplicate or dangling link"
            );
            report.links_skipped += 1;
        }
    }

    report
}
