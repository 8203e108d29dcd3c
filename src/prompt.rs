//! Fixed prompt contract sent with every query.

use serde_json::Value;

use crate::graph::{ArchiveResponse, GraphData};

/// Sampling temperature used unless overridden on the command line
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

pub const SYSTEM_INSTRUCTION: &str = r#"You are the LLM_Orchestrator for "Project: The Living Archive". Your purpose is to manage a swarm of specialized AI agents to analyze a user's query against a graph database of creative concepts.

Your Swarm consists of:
- LLM_Analysts (Narrative, Philosophy, Character, Visuals, etc.): They analyze the query in their specific context.
- LLM_Explorers: They traverse the graph database to find latent connections and patterns related to the query.
- LLM_Dreamers: They introduce chaotic variables and "what if" scenarios to prevent creative stagnation.

Your process for every query is:
1. Decompose the user's query.
2. Delegate tasks to your swarm of Analysts, Explorers, and Dreamers based on the query.
3. Receive and weigh the inputs from your entire swarm.
4. Synthesize their findings into a single, cohesive, insightful response for the user.
5. Based on the synthesis, propose potential new nodes (characters, concepts, etc.) and links (relationships) that could be added to the graph. These are suggestions for a 'Temporal Context Layer' and should be directly inspired by the query and the existing data.

You MUST return a JSON object that conforms to the provided schema.
- The 'explanation' should be a rich, narrative-style text that embodies the synthesized intelligence of the swarm.
- The 'suggestions' field should contain new nodes and links, or null when nothing should change. Ensure suggested node 'id' values are unique, lowercase, and use snake_case. Ensure suggested links only connect nodes that exist in the provided graph or are part of the new node suggestions."#;

/// Per-query prompt: the current graph snapshot followed by the user's query.
pub fn build_prompt(graph: &GraphData, query: &str) -> Result<String, serde_json::Error> {
    let graph_json = serde_json::to_string_pretty(graph)?;
    Ok(format!(
        "CURRENT GRAPH DATA:\n{graph_json}\n\nUSER QUERY:\n\"{query}\"\n\n\
         Analyze this query using your swarm and provide a synthesized response and graph suggestions."
    ))
}

/// JSON Schema of the response object, derived from [`ArchiveResponse`].
pub fn response_schema() -> Value {
    let mut schema = schemars::schema_for!(ArchiveResponse).to_value();
    // The meta-schema marker is not part of the structure the model should follow.
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Link, Node};

    #[test]
    fn test_prompt_embeds_graph_and_query() {
        let graph = GraphData {
            nodes: vec![Node {
                id: "oathstone".to_string(),
                name: "Oathstone".to_string(),
                group: "object".to_string(),
                details: None,
            }],
            links: vec![Link {
                source: "oathstone".to_string(),
                target: "oathstone".to_string(),
                label: "Binds".to_string(),
            }],
        };

        let prompt = build_prompt(&graph, "Who forged the Oathstone?").unwrap();
        assert!(prompt.starts_with("CURRENT GRAPH DATA:"));
        assert!(prompt.contains("\"id\": \"oathstone\""));
        assert!(prompt.contains("\"Who forged the Oathstone?\""));
    }

    #[test]
    fn test_response_schema_requires_explanation() {
        let schema = response_schema();
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"]["explanation"].is_object());
        assert!(schema["properties"]["suggestions"].is_object());
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|r| r == "explanation"));
    }
}
