//! Gemini `streamGenerateContent` client.
//!
//! Requests are sent with `alt=sse`; each `data:` line of the event stream is
//! a partial `GenerateContentResponse` whose candidate parts carry the next
//! slice of the reply text. Wire types stay private to this module.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace};

use super::{FragmentStream, LlmRequest, ProviderError};
use crate::conversation::Role;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base_url: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(
        api_base_url: String,
        model: String,
        api_key: String,
        timeout_seconds: u64,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("Gemini API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base_url, self.model
        )
    }

    pub async fn stream(&self, request: LlmRequest) -> Result<FragmentStream, ProviderError> {
        let payload = build_payload(request);

        debug!(
            model = %self.model,
            turns = payload.contents.len(),
            temperature = payload.generation_config.temperature,
            "sending streaming Gemini request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gemini request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            error!(status, "Gemini returned an error status");
            return Err(ProviderError::Api { status, message });
        }

        // Bytes are buffered until a full line is available, so neither an SSE
        // line nor a multi-byte character is ever split across chunks.
        // A trailing `None` marks the end of the body.
        let stream = response
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::once(futures::future::ready(None)))
            .scan(Vec::<u8>::new(), |buffer, chunk| {
                let fragments = match chunk {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        drain_sse_fragments(buffer)
                    }
                    Some(Err(e)) => vec![Err(ProviderError::Request(e.to_string()))],
                    None => flush_sse_fragments(buffer),
                };
                futures::future::ready(Some(fragments))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

fn build_payload(request: LlmRequest) -> GenerateContentRequest {
    let mut contents: Vec<WireContent> = request
        .history
        .into_iter()
        .map(|m| WireContent::text(wire_role(m.role), m.text))
        .collect();
    contents.push(WireContent::text("user", request.prompt));

    GenerateContentRequest {
        system_instruction: WireContent {
            role: None,
            parts: vec![WirePart { text: Some(request.system_instruction) }],
        },
        contents,
        generation_config: GenerationConfig {
            temperature: request.temperature,
            response_mime_type: "application/json".to_string(),
            response_json_schema: request.response_schema,
        },
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Consume every complete line in `buffer`, returning the text carried by its `data:` events.
fn drain_sse_fragments(buffer: &mut Vec<u8>) -> Vec<Result<String, ProviderError>> {
    let mut fragments = Vec::new();

    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\n', '\r']);

        // event:, id:, comments and blank separators carry no text
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim_start();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        match serde_json::from_str::<GenerateContentResponse>(data) {
            Ok(event) => {
                if let Some(text) = event.text() {
                    trace!(len = text.len(), "received fragment");
                    fragments.push(Ok(text));
                }
            }
            Err(e) => fragments.push(Err(ProviderError::Decode(format!("SSE event: {e}")))),
        }
    }

    fragments
}

/// Decode what is left once the body has ended. The last event may lack its
/// terminating newline.
fn flush_sse_fragments(buffer: &mut Vec<u8>) -> Vec<Result<String, ProviderError>> {
    if !buffer.is_empty() && buffer.last() != Some(&b'\n') {
        buffer.push(b'\n');
    }
    drain_sse_fragments(buffer)
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl WireContent {
    fn text(role: &str, text: String) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![WirePart { text: Some(text) }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
    response_json_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SessionMessage;
    use serde_json::json;

    fn event(text: &str) -> String {
        let body = json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] });
        format!("data: {body}\r\n\r\n")
    }

    #[test]
    fn test_drain_waits_for_complete_lines() {
        let full = event("{\"expla");
        let (head, tail) = full.split_at(10);

        let mut buffer = head.as_bytes().to_vec();
        assert!(drain_sse_fragments(&mut buffer).is_empty());

        buffer.extend_from_slice(tail.as_bytes());
        let fragments = drain_sse_fragments(&mut buffer);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "{\"expla");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_keeps_multibyte_characters_intact() {
        let full = event("Élysia → Kain");
        let bytes = full.as_bytes();
        // Split inside the two-byte 'É'
        let split = full.find('É').unwrap() + 1;

        let mut buffer = bytes[..split].to_vec();
        assert!(drain_sse_fragments(&mut buffer).is_empty());
        buffer.extend_from_slice(&bytes[split..]);

        let fragments = drain_sse_fragments(&mut buffer);
        assert_eq!(fragments[0].as_ref().unwrap(), "Élysia → Kain");
    }

    #[test]
    fn test_flush_decodes_unterminated_final_event() {
        let mut buffer = event("{\"explanation\":").into_bytes();
        let last = event("\"done\"}");
        buffer.extend_from_slice(last.trim_end().as_bytes());

        let fragments = drain_sse_fragments(&mut buffer);
        assert_eq!(fragments.len(), 1);
        assert!(!buffer.is_empty());

        let tail = flush_sse_fragments(&mut buffer);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].as_ref().unwrap(), "\"done\"}");
        assert!(buffer.is_empty());
        assert!(flush_sse_fragments(&mut buffer).is_empty());
    }

    #[test]
    fn test_drain_skips_metadata_and_empty_candidates() {
        let mut buffer = b": keep-alive\nevent: message\ndata: {\"candidates\":[]}\n\n".to_vec();
        assert!(drain_sse_fragments(&mut buffer).is_empty());
    }

    #[test]
    fn test_drain_reports_undecodable_event() {
        let mut buffer = b"data: {not json}\n".to_vec();
        let fragments = drain_sse_fragments(&mut buffer);
        assert!(matches!(fragments[0], Err(ProviderError::Decode(_))));
    }

    #[test]
    fn test_payload_places_history_before_prompt() {
        let payload = build_payload(LlmRequest {
            system_instruction: "persona".to_string(),
            history: vec![
                SessionMessage { role: Role::User, text: "first".to_string() },
                SessionMessage { role: Role::Model, text: "{}".to_string() },
            ],
            prompt: "second".to_string(),
            response_schema: json!({ "type": "object" }),
            temperature: 0.8,
        });

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "persona");
        assert_eq!(value["contents"][1]["role"], "model");
        assert_eq!(value["contents"][2]["parts"][0]["text"], "second");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["responseJsonSchema"]["type"], "object");
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let result = GeminiProvider::new(
            DEFAULT_API_BASE.to_string(),
            DEFAULT_MODEL.to_string(),
            "  ".to_string(),
            30,
        );
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }
}
