use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Node (narrative entity) in the archive
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Node {
    /// A unique, lowercase, snake_case identifier for the node.
    pub id: String,

    /// The display name of the node.
    pub name: String,

    /// The category of the node (e.g., 'character', 'location', 'concept', 'event', 'object', 'faction').
    pub group: String,

    /// A brief, one-sentence description of the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Known node categories. Unrecognized groups are kept verbatim and map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeGroup {
    Character,
    Location,
    Concept,
    Event,
    Faction,
    Object,
    Other,
}

impl NodeGroup {
    pub fn classify(group: &str) -> Self {
        match group {
            "character" => Self::Character,
            "location" => Self::Location,
            "concept" => Self::Concept,
            "event" => Self::Event,
            "faction" => Self::Faction,
            "object" => Self::Object,
            _ => Self::Other,
        }
    }
}

impl Node {
    pub fn group_kind(&self) -> NodeGroup {
        NodeGroup::classify(&self.group)
    }
}

/// Labeled relationship between two nodes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Link {
    /// The ID of the source node for the link.
    pub source: String,

    /// The ID of the target node for the link.
    pub target: String,

    /// A short, descriptive label for the relationship (e.g., 'Influences', 'Creates', 'Opposes').
    #[serde(default)]
    pub label: String,
}

impl Link {
    /// Orientation-independent key used for duplicate detection
    pub fn key(&self) -> (String, String) {
        link_key(&self.source, &self.target)
    }
}

pub(crate) fn link_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Complete graph snapshot
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

/// A set of suggested, non-destructive changes to the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct SuggestedChanges {
    /// New knowledge nodes to be added to the graph.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// New relationships to connect nodes in the graph.
    #[serde(default)]
    pub links: Vec<Link>,
}

impl SuggestedChanges {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// Structured response expected from the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ArchiveResponse {
    /// A detailed, synthesized response to the user's query, written from the perspective of the Swarm Consciousness.
    pub explanation: String,

    /// Suggested additions to the graph (the 'Temporal Context Layer'). Null if no changes are suggested.
    #[serde(default)]
    pub suggestions: Option<SuggestedChanges>,
}
