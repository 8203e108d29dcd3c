//! AI query capability.
//!
//! `LlmProvider` is an enum over concrete backends. A provider receives the
//! full prompt contract as an [`LlmRequest`] and answers with a stream of
//! text fragments whose concatenation is the model's JSON reply.
//!
//! Session continuity lives in [`ChatSession`], owned by the conversation
//! controller and handed to the provider as plain history on every call.

pub mod gemini;
pub mod scripted;

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::conversation::Role;

pub use gemini::GeminiProvider;
pub use scripted::{ScriptStep, ScriptedProvider};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode provider stream: {0}")]
    Decode(String),
}

/// Text fragments as they arrive from the model
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub role: Role,
    pub text: String,
}

/// Conversation handle with the model.
///
/// Only completed exchanges are recorded. A new session carries no history,
/// which is how `clear_conversation` drops hidden context.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    history: Vec<SessionMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[SessionMessage] {
        &self.history
    }

    pub fn record_exchange(&mut self, prompt: String, reply: String) {
        self.history.push(SessionMessage { role: Role::User, text: prompt });
        self.history.push(SessionMessage { role: Role::Model, text: reply });
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_instruction: String,
    pub history: Vec<SessionMessage>,
    pub prompt: String,
    pub response_schema: Value,
    pub temperature: f32,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum LlmProvider {
    Gemini(GeminiProvider),
    Scripted(ScriptedProvider),
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Gemini(_) => "gemini",
            LlmProvider::Scripted(_) => "scripted",
        }
    }

    /// Start a streamed completion for `request`.
    pub async fn stream(&self, request: LlmRequest) -> Result<FragmentStream, ProviderError> {
        match self {
            LlmProvider::Gemini(p) => p.stream(request).await,
            LlmProvider::Scripted(p) => p.stream(request).await,
        }
    }
}
