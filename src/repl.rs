//! Line commands and plain-text rendering for the interactive front-end.

use std::fmt::Write as _;

use crate::conversation::{ConversationTurn, MergeOutcome, Role, TurnState};
use crate::graph::{GraphData, NodeGroup, SuggestedChanges};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(String),
    Merge(Option<String>),
    Dismiss(Option<String>),
    Graph,
    History,
    Clear,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Query(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::to_string);
        match name {
            "merge" | "m" => Self::Merge(arg),
            "dismiss" | "d" => Self::Dismiss(arg),
            "graph" | "g" => Self::Graph,
            "history" | "h" => Self::History,
            "clear" => Self::Clear,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
Type a question to consult the swarm. Commands:
  /merge [turn-id]    merge suggestions (latest mergeable turn by default)
  /dismiss [turn-id]  discard suggestions without merging
  /graph              list nodes and links in the archive
  /history            show the conversation
  /clear              forget the conversation and start a new session
  /help               show this help
  /quit               leave";

fn group_marker(group: NodeGroup) -> char {
    match group {
        NodeGroup::Character => '@',
        NodeGroup::Location => '#',
        NodeGroup::Concept => '*',
        NodeGroup::Event => '!',
        NodeGroup::Faction => '&',
        NodeGroup::Object => '+',
        NodeGroup::Other => '.',
    }
}

pub fn render_graph(graph: &GraphData) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "The Living Archive: {} nodes, {} links", graph.nodes.len(), graph.links.len());
    for node in &graph.nodes {
        let _ = write!(out, "  {} {} [{}] ({})", group_marker(node.group_kind()), node.name, node.id, node.group);
        if let Some(details) = &node.details {
            let _ = write!(out, " - {details}");
        }
        out.push('\n');
    }
    for link in &graph.links {
        let _ = writeln!(out, "  {} -> {} -> {}", link.source, link.label, link.target);
    }
    out
}

fn render_suggestions(out: &mut String, suggestions: &SuggestedChanges) {
    let _ = writeln!(out, "Temporal Context Layer (Suggestions):");
    if !suggestions.nodes.is_empty() {
        let _ = writeln!(out, "  New Nodes:");
        for node in &suggestions.nodes {
            let _ = writeln!(out, "    {} ({})", node.name, node.group);
        }
    }
    if !suggestions.links.is_empty() {
        let _ = writeln!(out, "  New Links:");
        for link in &suggestions.links {
            let _ = writeln!(out, "    {} -> {} -> {}", link.source, link.label, link.target);
        }
    }
}

pub fn render_turn(turn: &ConversationTurn) -> String {
    let mut out = String::new();
    match turn.role {
        Role::User => {
            let _ = writeln!(out, "you> {}", turn.explanation);
        }
        Role::Model => {
            let _ = writeln!(out, "Swarm Consciousness Synthesis:");
            let _ = writeln!(out, "{}", turn.explanation);
            if let Some(suggestions) = turn.suggestions.as_ref().filter(|s| !s.is_empty()) {
                render_suggestions(&mut out, suggestions);
                if turn.is_merged {
                    let _ = writeln!(out, "[merged]");
                } else if turn.state == TurnState::Complete {
                    let _ = writeln!(out, "[/merge {}]", turn.id);
                }
            }
        }
    }
    out
}

pub fn render_merge(outcome: MergeOutcome) -> String {
    match outcome {
        MergeOutcome::Merged(report) => format!(
            "Merged into the archive: {} new nodes, {} new links ({} nodes and {} links already known or unlinkable).",
            report.nodes_added, report.links_added, report.nodes_skipped, report.links_skipped
        ),
        MergeOutcome::AlreadyMerged => "Those suggestions are already in the archive.".to_string(),
        MergeOutcome::NoSuggestions => "That turn has no suggestions to merge.".to_string(),
        MergeOutcome::NotReady => "That turn is still streaming.".to_string(),
        MergeOutcome::UnknownTurn => "No such turn.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Link, Node};
    use crate::merge::MergeReport;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("Who is Lyra?"), Command::Query("Who is Lyra?".to_string()));
        assert_eq!(Command::parse("/merge"), Command::Merge(None));
        assert_eq!(Command::parse("/m abc"), Command::Merge(Some("abc".to_string())));
        assert_eq!(Command::parse("/dismiss xyz"), Command::Dismiss(Some("xyz".to_string())));
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/frobnicate"), Command::Unknown("frobnicate".to_string()));
    }

    #[test]
    fn test_render_model_turn_with_suggestions() {
        let turn = ConversationTurn {
            id: "t1".to_string(),
            role: Role::Model,
            explanation: "A new voice rises.".to_string(),
            suggestions: Some(SuggestedChanges {
                nodes: vec![Node {
                    id: "echo".to_string(),
                    name: "Echo".to_string(),
                    group: "character".to_string(),
                    details: None,
                }],
                links: vec![Link {
                    source: "echo".to_string(),
                    target: "lyra".to_string(),
                    label: "Mimics".to_string(),
                }],
            }),
            is_merged: false,
            state: TurnState::Complete,
        };

        let text = render_turn(&turn);
        assert!(text.contains("A new voice rises."));
        assert!(text.contains("Echo (character)"));
        assert!(text.contains("echo -> Mimics -> lyra"));
        assert!(text.contains("[/merge t1]"));
    }

    #[test]
    fn test_render_graph_marks_unknown_groups() {
        let graph = GraphData {
            nodes: vec![Node {
                id: "void".to_string(),
                name: "The Void".to_string(),
                group: "anomaly".to_string(),
                details: Some("Nothing at all.".to_string()),
            }],
            links: vec![],
        };
        let text = render_graph(&graph);
        assert!(text.contains("1 nodes, 0 links"));
        assert!(text.contains(". The Void [void] (anomaly) - Nothing at all."));
    }

    #[test]
    fn test_render_merge_report() {
        let text = render_merge(MergeOutcome::Merged(MergeReport {
            nodes_added: 1,
            nodes_skipped: 0,
            links_added: 2,
            links_skipped: 1,
        }));
        assert!(text.contains("1 new nodes, 2 new links"));
    }
}
