//! Scripted provider: replays queued fragment scripts instead of calling a model.
//!
//! Each call to `stream` consumes the next queued script. Every request is
//! recorded so callers can inspect exactly what would have been sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use super::{FragmentStream, LlmRequest, ProviderError};

#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield this text fragment
    Fragment(String),
    /// Yield a transport error mid-stream
    Fail(String),
    /// Hold the stream open until the gate is notified
    Wait(Arc<Notify>),
}

#[derive(Debug, Clone)]
enum Script {
    Stream(Vec<ScriptStep>),
    Reject(String),
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply delivered as the given fragments.
    pub fn push_fragments<I, S>(&self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = fragments
            .into_iter()
            .map(|f| ScriptStep::Fragment(f.into()))
            .collect();
        self.push_steps(steps);
    }

    pub fn push_steps(&self, steps: Vec<ScriptStep>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Script::Stream(steps));
    }

    /// Queue a call that fails before any fragment is produced.
    pub fn push_reject(&self, message: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Script::Reject(message.into()));
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn stream(&self, request: LlmRequest) -> Result<FragmentStream, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let steps = match script {
            Some(Script::Stream(steps)) => steps,
            Some(Script::Reject(message)) => return Err(ProviderError::Request(message)),
            None => return Err(ProviderError::Request("no scripted reply queued".into())),
        };

        let stream = futures::stream::unfold(steps.into_iter(), |mut steps| async move {
            loop {
                match steps.next()? {
                    ScriptStep::Fragment(text) => return Some((Ok(text), steps)),
                    ScriptStep::Fail(message) => {
                        return Some((Err(ProviderError::Request(message)), steps))
                    }
                    ScriptStep::Wait(gate) => gate.notified().await,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn request(prompt: &str) -> LlmRequest {
        LlmRequest {
            system_instruction: String::new(),
            history: Vec::new(),
            prompt: prompt.to_string(),
            response_schema: json!({}),
            temperature: 0.8,
        }
    }

    #[tokio::test]
    async fn test_replays_scripts_in_order() {
        let provider = ScriptedProvider::new();
        provider.push_fragments(["a", "b"]);
        provider.push_reject("quota exceeded");

        let fragments: Vec<_> = provider
            .stream(request("one"))
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["a", "b"]);

        assert!(provider.stream(request("two")).await.is_err());
        assert!(provider.stream(request("three")).await.is_err());
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(provider.requests()[1].prompt, "two");
    }

    #[tokio::test]
    async fn test_wait_step_holds_stream_until_notified() {
        let gate = Arc::new(Notify::new());
        let provider = ScriptedProvider::new();
        provider.push_steps(vec![ScriptStep::Wait(gate.clone()), ScriptStep::Fragment("late".into())]);

        let mut stream = provider.stream(request("q")).await.unwrap();
        gate.notify_one();
        assert_eq!(stream.next().await.unwrap().unwrap(), "late");
        assert!(stream.next().await.is_none());
    }
}
