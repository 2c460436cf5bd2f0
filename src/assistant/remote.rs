//! Core `RemoteAssistant` trait and its error type.

use async_trait::async_trait;
use thiserror::Error;

use crate::assistant::prompt::{clean_single_line, TextTask};
use crate::assistant::types::{SearchResponse, SpeechAudio};

// ---------------------------------------------------------------------------
// RemoteCallError
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCallError {
    /// No API key in the settings file or the environment.
    #[error("no API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    /// HTTP transport or connection error.
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not the JSON we expected.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The backend answered without any usable text.
    #[error("backend returned an empty response")]
    EmptyResponse,

    /// The speech model answered without an audio payload.
    #[error("no audio data received")]
    MissingAudioData,
}

impl From<reqwest::Error> for RemoteCallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteCallError::Timeout
        } else {
            RemoteCallError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteAssistant trait
// ---------------------------------------------------------------------------

/// The generative backend behind the search flow.
///
/// Implementors provide three primitive calls.  The three query rewrites are
/// provided methods built on [`generate_text`](Self::generate_text); they
/// never fail and fall back to a fixed value instead.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn RemoteAssistant>`.
#[async_trait]
pub trait RemoteAssistant: Send + Sync {
    /// Ungrounded text generation.
    async fn generate_text(&self, prompt: &str, temperature: f32)
        -> Result<String, RemoteCallError>;

    /// Grounded web search, summarised.
    ///
    /// The summary has the `QUERY_USED:` line removed and the sources are
    /// unique by uri.
    async fn search_and_summarize(&self, query: &str) -> Result<SearchResponse, RemoteCallError>;

    /// Text-to-speech.  Fails with [`RemoteCallError::MissingAudioData`]
    /// when the backend returns no audio.
    async fn generate_speech(&self, text: &str) -> Result<SpeechAudio, RemoteCallError>;

    /// Run a [`TextTask`], returning its fallback on error or empty output.
    async fn rewrite(&self, task: TextTask<'_>) -> String {
        match self.generate_text(&task.prompt(), task.temperature()).await {
            Ok(raw) => {
                let text = clean_single_line(&raw);
                if text.is_empty() {
                    log::warn!("assistant: {} returned nothing, using fallback", task.label());
                    task.fallback()
                } else {
                    text
                }
            }
            Err(e) => {
                log::warn!("assistant: {} failed ({e}), using fallback", task.label());
                task.fallback()
            }
        }
    }

    /// A short topic to search for; `fallback` when the backend gives none.
    async fn generate_random_prompt(&self, fallback: &str) -> String {
        self.rewrite(TextTask::RandomTopic { fallback }).await
    }

    /// A more precise version of `query`, or `query` itself.
    async fn tweak_query(&self, query: &str) -> String {
        self.rewrite(TextTask::Tweak { query }).await
    }

    /// A deeper follow-up to `original`, or `"<original> in detail"`.
    async fn refine_query(&self, original: &str, summary: &str) -> String {
        self.rewrite(TextTask::Refine { original, summary }).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
