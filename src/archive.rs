//! In-memory graph store for the archive.
//!
//! The store only grows: there is no update or delete path. Node ids and
//! unordered link endpoint pairs are indexed so both insert checks are O(1).

use std::collections::HashSet;

use crate::graph::{link_key, GraphData, Link, Node};

#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    links: Vec<Link>,
    node_ids: HashSet<String>,
    link_keys: HashSet<(String, String)>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, applying the same insert rules as merges.
    ///
    /// Duplicate ids, duplicate pairs and dangling links found in `data` are
    /// dropped so that a hand-edited or stale snapshot cannot break the
    /// store invariants.
    pub fn from_snapshot(data: GraphData) -> Self {
        let mut store = Self::new();
        for node in data.nodes {
            store.add_node_if_absent(node);
        }
        for link in data.links {
            store.add_link_if_absent(link);
        }
        store
    }

    /// Insert `node` unless a node with the same id exists. Returns whether it was inserted.
    pub fn add_node_if_absent(&mut self, node: Node) -> bool {
        if self.node_ids.contains(&node.id) {
            return false;
        }
        self.node_ids.insert(node.id.clone());
        self.nodes.push(node);
        true
    }

    /// Insert `link` when both endpoints exist and neither orientation is present.
    pub fn add_link_if_absent(&mut self, link: Link) -> bool {
        if !self.node_ids.contains(&link.source) || !self.node_ids.contains(&link.target) {
            return false;
        }
        let key = link.key();
        if self.link_keys.contains(&key) {
            return false;
        }
        self.link_keys.insert(key);
        self.links.push(link);
        true
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    pub fn contains_link(&self, a: &str, b: &str) -> bool {
        self.link_keys.contains(&link_key(a, b))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Owned copy of the current graph, for prompts, rendering and persistence
    pub fn snapshot(&self) -> GraphData {
        GraphData {
            nodes: self.nodes.clone(),
            links: self.links.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            group: "concept".to_string(),
            details: None,
        }
    }

    fn link(source: &str, target: &str, label: &str) -> Link {
        Link {
            source: source.to_string(),
            target: target.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_add_node_rejects_duplicate_id() {
        let mut store = GraphStore::new();
        assert!(store.add_node_if_absent(node("kain")));

        let mut renamed = node("kain");
        renamed.name = "Someone Else".to_string();
        assert!(!store.add_node_if_absent(renamed));

        assert_eq!(store.node_count(), 1);
        assert_eq!(store.nodes()[0].name, "kain");
    }

    #[test]
    fn test_add_link_requires_both_endpoints() {
        let mut store = GraphStore::new();
        store.add_node_if_absent(node("kain"));

        assert!(!store.add_link_if_absent(link("kain", "elysia", "Protects")));
        store.add_node_if_absent(node("elysia"));
        assert!(store.add_link_if_absent(link("kain", "elysia", "Protects")));
        assert_eq!(store.link_count(), 1);
    }

    #[test]
    fn test_add_link_is_orientation_independent() {
        let mut store = GraphStore::new();
        store.add_node_if_absent(node("kain"));
        store.add_node_if_absent(node("elysia"));
        store.add_link_if_absent(link("elysia", "kain", "Guarded By"));

        // Label does not matter either
        assert!(!store.add_link_if_absent(link("kain", "elysia", "Protects")));
        assert!(!store.add_link_if_absent(link("elysia", "kain", "Something New")));
        assert!(store.contains_link("kain", "elysia"));
        assert_eq!(store.link_count(), 1);
    }

    #[test]
    fn test_from_snapshot_drops_invalid_entries() {
        let data = GraphData {
            nodes: vec![node("a"), node("b"), node("a")],
            links: vec![link("a", "b", "x"), link("b", "a", "y"), link("a", "ghost", "z")],
        };

        let store = GraphStore::from_snapshot(data);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.link_count(), 1);
        assert_eq!(store.links()[0].label, "x");
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let mut store = GraphStore::new();
        for id in ["c", "a", "b"] {
            store.add_node_if_absent(node(id));
        }
        let ids: Vec<_> = store.snapshot().nodes.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
