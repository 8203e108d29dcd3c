//! Incremental decoding of a streamed model response.
//!
//! The model emits one JSON object piece by piece. Until the object is
//! complete the accumulated text is not valid JSON, so decode failures while
//! streaming are expected and swallowed. The last successful decode is kept
//! as the best-known result; only the end of the stream can turn a failure
//! into an error.

use thiserror::Error;
use tracing::{trace, warn};

use crate::graph::ArchiveResponse;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model returned an empty response")]
    Empty,

    #[error("model response is not a valid archive response: {0}")]
    Malformed(String),
}

#[derive(Debug, Default)]
pub struct StreamingParser {
    buffer: String,
    latest: Option<ArchiveResponse>,
    successes: usize,
}

impl StreamingParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the accumulation buffer.
    pub fn feed(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Try to decode the whole buffer.
    ///
    /// Returns the freshly decoded response, or `None` while the buffer is
    /// not parseable yet. A `None` never discards the previous best result.
    pub fn try_parse(&mut self) -> Option<ArchiveResponse> {
        let candidate = strip_code_fence(&self.buffer);
        // A complete object always ends with a closing brace.
        if !candidate.ends_with('}') {
            return None;
        }
        match serde_json::from_str::<ArchiveResponse>(candidate) {
            Ok(response) => {
                self.successes += 1;
                self.latest = Some(response.clone());
                Some(response)
            }
            Err(err) => {
                trace!(error = %err, buffered = self.buffer.len(), "response not parseable yet");
                None
            }
        }
    }

    /// Most recent successful decode, if any
    pub fn latest(&self) -> Option<&ArchiveResponse> {
        self.latest.as_ref()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Close the stream and return the final result.
    ///
    /// The complete buffer gets one last decode attempt. If that fails but an
    /// earlier decode succeeded, the earlier result stands.
    pub fn finish(mut self) -> Result<ArchiveResponse, ParseError> {
        if let Some(response) = self.try_parse() {
            return Ok(response);
        }

        let candidate = strip_code_fence(&self.buffer);
        if let Some(latest) = self.latest.take() {
            warn!(
                buffered = self.buffer.len(),
                "final response buffer did not decode, keeping last good parse"
            );
            return Ok(latest);
        }

        if candidate.is_empty() {
            return Err(ParseError::Empty);
        }
        match serde_json::from_str::<ArchiveResponse>(candidate) {
            Ok(response) => Ok(response),
            Err(err) => Err(ParseError::Malformed(err.to_string())),
        }
    }
}

/// Strip an optional enclosing ``` fence (with or without a language tag) and trim.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // An optional language tag directly follows the fence. The body may
        // start on the same line; a bare tag means the body is still arriving.
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
            .unwrap_or(rest.len());
        body = rest[tag_len..].trim_start();
    }
    body = body.trim_end();
    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim_end();
    }
    body
}
