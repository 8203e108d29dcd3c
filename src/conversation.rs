//! Conversation controller.
//!
//! Owns the graph, the turn list and the AI session. Every mutation of the
//! graph or of the turns is written through to the key-value store before the
//! call returns. Domain state sits behind one mutex that is never held across
//! an await, and at most one query is in flight at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::GraphStore;
use crate::graph::{ArchiveResponse, GraphData, SuggestedChanges};
use crate::llm::{ChatSession, LlmProvider, LlmRequest, ProviderError, SessionMessage};
use crate::merge::{merge_suggestions, MergeReport};
use crate::prompt::{build_prompt, response_schema, SYSTEM_INSTRUCTION};
use crate::seed::seed_graph;
use crate::storage::KeyValueStore;
use crate::stream::{ParseError, StreamingParser};

pub const GRAPH_KEY: &str = "living_archive.graph";
pub const CONVERSATION_KEY: &str = "living_archive.conversation";

pub const PLACEHOLDER_EXPLANATION: &str = "The swarm is synthesizing a response...";
pub const FAILURE_EXPLANATION: &str =
    "An error occurred while processing your request. Please check the logs for details.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Lifecycle of a model turn. User turns are created `Complete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Submitted,
    Streaming,
    #[default]
    Complete,
}

/// One message of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: String,
    pub role: Role,
    pub explanation: String,
    #[serde(default)]
    pub suggestions: Option<SuggestedChanges>,
    #[serde(default)]
    pub is_merged: bool,
    #[serde(default)]
    pub state: TurnState,
}

impl ConversationTurn {
    fn user(text: &str) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role: Role::User,
            explanation: text.to_string(),
            suggestions: None,
            is_merged: false,
            state: TurnState::Complete,
        }
    }

    fn model_placeholder() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role: Role::Model,
            explanation: PLACEHOLDER_EXPLANATION.to_string(),
            suggestions: None,
            is_merged: false,
            state: TurnState::Submitted,
        }
    }

    /// True when the turn carries at least one proposed node or link
    pub fn has_suggestions(&self) -> bool {
        self.suggestions.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn is_merge_eligible(&self) -> bool {
        self.role == Role::Model
            && self.state == TurnState::Complete
            && !self.is_merged
            && self.has_suggestions()
    }

    fn fail(&mut self) {
        self.explanation = FAILURE_EXPLANATION.to_string();
        self.suggestions = None;
        self.state = TurnState::Complete;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyQuery,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rejected(RejectReason),
    /// The model turn holds a parsed response
    Completed { turn_id: String },
    /// The model turn holds the failure explanation
    Failed { turn_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(MergeReport),
    AlreadyMerged,
    NoSuggestions,
    NotReady,
    UnknownTurn,
}

#[derive(Debug, Error)]
enum QueryFailure {
    #[error("failed to build prompt: {0}")]
    Prompt(#[from] serde_json::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

struct Exchange {
    prompt: String,
    reply: String,
    response: ArchiveResponse,
}

struct ConversationState {
    graph: GraphStore,
    turns: Vec<ConversationTurn>,
    session: ChatSession,
    busy: bool,
    /// Bumped by `clear_conversation` so an in-flight query cannot leak into the new session
    epoch: u64,
}

impl ConversationState {
    fn turn_mut(&mut self, id: &str) -> Option<&mut ConversationTurn> {
        self.turns.iter_mut().find(|t| t.id == id)
    }
}

pub struct ConversationController {
    provider: LlmProvider,
    store: Arc<dyn KeyValueStore>,
    temperature: f32,
    state: Mutex<ConversationState>,
}

/// Clears the busy flag however the submit future ends, including when it is dropped.
struct BusyGuard<'a> {
    state: &'a Mutex<ConversationState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .busy = false;
    }
}

impl ConversationController {
    /// Restore graph and transcript from `store`, falling back to the seed
    /// graph and an empty conversation when nothing usable is stored.
    pub fn load(provider: LlmProvider, store: Arc<dyn KeyValueStore>, temperature: f32) -> Self {
        let graph = load_graph(store.as_ref());
        let turns = load_turns(store.as_ref());

        info!(
            provider = provider.name(),
            nodes = graph.node_count(),
            links = graph.link_count(),
            turns = turns.len(),
            "archive loaded"
        );

        let controller = Self {
            provider,
            store,
            temperature,
            state: Mutex::new(ConversationState {
                graph,
                turns,
                session: ChatSession::new(),
                busy: false,
                epoch: 0,
            }),
        };

        {
            let state = controller.lock();
            controller.persist_graph(&state);
            controller.persist_turns(&state);
        }
        controller
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> GraphData {
        self.lock().graph.snapshot()
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.lock().turns.clone()
    }

    pub fn turn(&self, id: &str) -> Option<ConversationTurn> {
        self.lock().turns.iter().find(|t| t.id == id).cloned()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Id of the newest turn that can still be merged
    pub fn latest_merge_candidate(&self) -> Option<String> {
        self.lock()
            .turns
            .iter()
            .rev()
            .find(|t| t.is_merge_eligible())
            .map(|t| t.id.clone())
    }

    /// Submit a user query and drive the model reply to completion.
    ///
    /// `on_update` sees the model turn each time it changes: when it is
    /// created, on every successful intermediate parse, and once complete.
    pub async fn submit_query<F>(&self, text: &str, mut on_update: F) -> SubmitOutcome
    where
        F: FnMut(&ConversationTurn),
    {
        let query = text.trim();
        if query.is_empty() {
            debug!("ignoring empty query");
            return SubmitOutcome::Rejected(RejectReason::EmptyQuery);
        }

        let (turn_id, epoch, snapshot, history, placeholder) = {
            let mut state = self.lock();
            if state.busy {
                warn!("query rejected: another query is in flight");
                return SubmitOutcome::Rejected(RejectReason::Busy);
            }
            state.busy = true;

            let user_turn = ConversationTurn::user(query);
            let model_turn = ConversationTurn::model_placeholder();
            let turn_id = model_turn.id.clone();
            info!(user_turn = %user_turn.id, model_turn = %turn_id, len = query.len(), "query submitted");

            state.turns.push(user_turn);
            state.turns.push(model_turn.clone());
            self.persist_turns(&state);

            (
                turn_id,
                state.epoch,
                state.graph.snapshot(),
                state.session.history().to_vec(),
                model_turn,
            )
        };
        let _busy = BusyGuard { state: &self.state };
        on_update(&placeholder);

        let result = self
            .run_query(query, &snapshot, history, &turn_id, &mut on_update)
            .await;

        let (outcome, finished) = {
            let mut state = self.lock();
            let same_session = state.epoch == epoch;

            let outcome = match result {
                Ok(exchange) => {
                    if same_session {
                        state.session.record_exchange(exchange.prompt, exchange.reply);
                    }
                    if let Some(turn) = state.turn_mut(&turn_id) {
                        turn.explanation = exchange.response.explanation;
                        turn.suggestions = exchange.response.suggestions;
                        turn.state = TurnState::Complete;
                    }
                    info!(turn = %turn_id, "model turn complete");
                    SubmitOutcome::Completed { turn_id: turn_id.clone() }
                }
                Err(failure) => {
                    error!(turn = %turn_id, error = %failure, "query failed");
                    if let Some(turn) = state.turn_mut(&turn_id) {
                        turn.fail();
                    }
                    SubmitOutcome::Failed { turn_id: turn_id.clone() }
                }
            };

            self.persist_turns(&state);
            let finished = state.turns.iter().find(|t| t.id == turn_id).cloned();
            (outcome, finished)
        };

        if let Some(turn) = finished {
            on_update(&turn);
        } else {
            debug!(turn = %turn_id, "conversation cleared while query was in flight");
        }
        outcome
    }

    async fn run_query<F>(
        &self,
        query: &str,
        snapshot: &GraphData,
        history: Vec<SessionMessage>,
        turn_id: &str,
        on_update: &mut F,
    ) -> Result<Exchange, QueryFailure>
    where
        F: FnMut(&ConversationTurn),
    {
        let prompt = build_prompt(snapshot, query)?;
        let request = LlmRequest {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history,
            prompt: prompt.clone(),
            response_schema: response_schema(),
            temperature: self.temperature,
        };

        let mut fragments = self.provider.stream(request).await?;
        self.update_turn(turn_id, on_update, |turn| turn.state = TurnState::Streaming);

        let mut parser = StreamingParser::new();
        while let Some(fragment) = fragments.next().await {
            parser.feed(&fragment?);
            if let Some(parsed) = parser.try_parse() {
                self.update_turn(turn_id, on_update, |turn| {
                    turn.explanation = parsed.explanation;
                    turn.suggestions = parsed.suggestions;
                });
            }
        }

        let reply = parser.buffer().to_string();
        let response = parser.finish()?;
        Ok(Exchange { prompt, reply, response })
    }

    fn update_turn<F, U>(&self, turn_id: &str, on_update: &mut F, apply: U)
    where
        F: FnMut(&ConversationTurn),
        U: FnOnce(&mut ConversationTurn),
    {
        let updated = {
            let mut state = self.lock();
            let Some(turn) = state.turn_mut(turn_id) else {
                return;
            };
            apply(turn);
            let updated = turn.clone();
            self.persist_turns(&state);
            updated
        };
        debug!(turn = %turn_id, state = ?updated.state, "model turn updated");
        on_update(&updated);
    }

    /// Apply a turn's suggestions to the graph. Re-merging a turn is a no-op.
    pub fn merge_turn(&self, turn_id: &str) -> MergeOutcome {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(turn) = state.turns.iter_mut().find(|t| t.id == turn_id) else {
            return MergeOutcome::UnknownTurn;
        };
        if turn.is_merged {
            return MergeOutcome::AlreadyMerged;
        }
        if turn.role != Role::Model || !turn.has_suggestions() {
            return MergeOutcome::NoSuggestions;
        }
        if turn.state != TurnState::Complete {
            return MergeOutcome::NotReady;
        }
        let Some(changes) = turn.suggestions.as_ref() else {
            return MergeOutcome::NoSuggestions;
        };

        let report = merge_suggestions(&mut state.graph, changes);
        turn.is_merged = true;

        info!(
            turn = %turn_id,
            nodes_added = report.nodes_added,
            links_added = report.links_added,
            nodes_skipped = report.nodes_skipped,
            links_skipped = report.links_skipped,
            "suggestions merged"
        );

        if report.changed() {
            self.persist_graph(state);
        }
        self.persist_turns(state);
        MergeOutcome::Merged(report)
    }

    /// Drop an unmerged turn's suggestions without touching the graph.
    pub fn dismiss_turn(&self, turn_id: &str) -> bool {
        let mut state = self.lock();
        let Some(turn) = state.turn_mut(turn_id) else {
            return false;
        };
        if !turn.is_merge_eligible() {
            return false;
        }
        turn.suggestions = None;
        info!(turn = %turn_id, "suggestions dismissed");
        self.persist_turns(&state);
        true
    }

    /// Discard every turn and start a fresh AI session.
    pub fn clear_conversation(&self) {
        let mut state = self.lock();
        let previous = state.session.id();
        state.turns.clear();
        state.session = ChatSession::new();
        state.epoch += 1;
        info!(previous_session = %previous, session = %state.session.id(), "conversation cleared");
        self.persist_turns(&state);
    }

    fn persist_graph(&self, state: &ConversationState) {
        match serde_json::to_string(&state.graph.snapshot()) {
            Ok(json) => {
                if let Err(e) = self.store.save(GRAPH_KEY, &json) {
                    warn!(error = %e, "failed to persist graph");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize graph"),
        }
    }

    fn persist_turns(&self, state: &ConversationState) {
        match serde_json::to_string(&state.turns) {
            Ok(json) => {
                if let Err(e) = self.store.save(CONVERSATION_KEY, &json) {
                    warn!(error = %e, "failed to persist conversation");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize conversation"),
        }
    }
}

fn load_graph(store: &dyn KeyValueStore) -> GraphStore {
    let raw = match store.load(GRAPH_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return GraphStore::from_snapshot(seed_graph()),
        Err(e) => {
            warn!(error = %e, "failed to read stored graph, using seed graph");
            return GraphStore::from_snapshot(seed_graph());
        }
    };
    match serde_json::from_str::<GraphData>(&raw) {
        Ok(data) => GraphStore::from_snapshot(data),
        Err(e) => {
            warn!(error = %e, "stored graph is malformed, using seed graph");
            GraphStore::from_snapshot(seed_graph())
        }
    }
}

fn load_turns(store: &dyn KeyValueStore) -> Vec<ConversationTurn> {
    let raw = match store.load(CONVERSATION_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "failed to read stored conversation, starting empty");
            return Vec::new();
        }
    };
    let mut turns = match serde_json::from_str::<Vec<ConversationTurn>>(&raw) {
        Ok(turns) => turns,
        Err(e) => {
            warn!(error = %e, "stored conversation is malformed, starting empty");
            return Vec::new();
        }
    };

    // A stream interrupted by a restart can never resume
    for turn in turns.iter_mut() {
        if turn.role == Role::Model && turn.state != TurnState::Complete {
            warn!(turn = %turn.id, "completing model turn interrupted by restart");
            turn.fail();
        }
    }
    turns
}
