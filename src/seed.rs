//! Built-in starting graph, used on first launch and when stored state is unreadable.

use crate::graph::{GraphData, Link, Node};

const SEED_NODES: &[(&str, &str, &str, &str)] = &[
    ("elysia", "Elysia", "location", "A utopian city-state floating among the clouds."),
    ("kain", "Kain", "character", "A stoic Guardian of Elysia, bound by an ancient oath."),
    ("lyra", "Lyra", "character", "A rebellious musician who channels forgotten magics through her songs."),
    ("the_aetherium", "The Aetherium", "concept", "The raw, chaotic energy that powers Elysia and its magic."),
    ("the_shattering", "The Shattering", "event", "A cataclysmic event that broke the old world, leading to Elysia's creation."),
    ("the_silent_ones", "The Silent Ones", "faction", "Ancient beings who existed before The Shattering, now dormant."),
    ("runesong", "Runesong", "concept", "The magical art Lyra uses, weaving Aetherium into reality via music."),
    ("oathstone", "Oathstone", "object", "The artifact that binds Kain to his duty as a Guardian."),
];

const SEED_LINKS: &[(&str, &str, &str)] = &[
    ("kain", "elysia", "Protects"),
    ("lyra", "elysia", "Resides In"),
    ("kain", "lyra", "Distrusts"),
    ("lyra", "runesong", "Wields"),
    ("runesong", "the_aetherium", "Manipulates"),
    ("elysia", "the_aetherium", "Powered By"),
    ("kain", "oathstone", "Bound To"),
    ("the_shattering", "elysia", "Led to creation of"),
    ("the_shattering", "the_silent_ones", "Caused dormancy of"),
    ("lyra", "the_silent_ones", "Investigates"),
];

pub fn seed_graph() -> GraphData {
    GraphData {
        nodes: SEED_NODES
            .iter()
            .map(|&(id, name, group, details)| Node {
                id: id.to_string(),
                name: name.to_string(),
                group: group.to_string(),
                details: Some(details.to_string()),
            })
            .collect(),
        links: SEED_LINKS
            .iter()
            .map(|&(source, target, label)| Link {
                source: source.to_string(),
                target: target.to_string(),
                label: label.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::GraphStore;

    #[test]
    fn test_seed_graph_is_consistent() {
        let seed = seed_graph();
        let store = GraphStore::from_snapshot(seed.clone());
        // Nothing in the seed is dropped by the store invariants
        assert_eq!(store.node_count(), 8);
        assert_eq!(store.link_count(), 10);
        assert_eq!(store.snapshot(), seed);
    }
}
