//! Scriptable `RemoteAssistant` for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::Notify;

use crate::assistant::remote::{RemoteAssistant, RemoteCallError};
use crate::assistant::types::{SearchResponse, SearchResult, SpeechAudio};

/// A test double that answers from pre-configured responses and records
/// every call it receives.
///
/// By default search returns `"Summary of <query>"` with two sources and
/// speech returns 20 ms of silent 24 kHz mono PCM.
pub struct MockAssistant {
    text: Result<String, RemoteCallError>,
    search_error: Option<RemoteCallError>,
    speech: Result<SpeechAudio, RemoteCallError>,
    speech_queue: Mutex<VecDeque<Result<SpeechAudio, RemoteCallError>>>,
    search_gate: Option<Arc<Notify>>,
    text_gate: Option<Arc<Notify>>,
    text_prompts: Mutex<Vec<String>>,
    search_calls: Mutex<Vec<String>>,
    speech_calls: Mutex<Vec<String>>,
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAssistant {
    pub fn new() -> Self {
        Self {
            text: Ok("tweaked query".into()),
            search_error: None,
            speech: Ok(Self::silent_speech()),
            speech_queue: Mutex::new(VecDeque::new()),
            search_gate: None,
            text_gate: None,
            text_prompts: Mutex::new(Vec::new()),
            search_calls: Mutex::new(Vec::new()),
            speech_calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every `generate_text` call with `response`.
    pub fn with_text(mut self, response: Result<String, RemoteCallError>) -> Self {
        self.text = response;
        self
    }

    /// Fail every search with `error`.
    pub fn with_search_error(mut self, error: RemoteCallError) -> Self {
        self.search_error = Some(error);
        self
    }

    /// Answer every `generate_speech` call with `response`.
    pub fn with_speech(mut self, response: Result<SpeechAudio, RemoteCallError>) -> Self {
        self.speech = response;
        self
    }

    /// Answer the next `generate_speech` call with `response`, ahead of the
    /// standing answer.  Calls queue up in order.
    pub fn with_speech_once(self, response: Result<SpeechAudio, RemoteCallError>) -> Self {
        self.speech_queue.lock().unwrap().push_back(response);
        self
    }

    /// Hold each `generate_text` call until `gate` is notified.
    pub fn with_text_gate(mut self, gate: Arc<Notify>) -> Self {
        self.text_gate = Some(gate);
        self
    }

    /// Hold each search until `gate` is notified.
    pub fn with_search_gate(mut self, gate: Arc<Notify>) -> Self {
        self.search_gate = Some(gate);
        self
    }

    pub fn text_prompts(&self) -> Vec<String> {
        self.text_prompts.lock().unwrap().clone()
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn speech_calls(&self) -> Vec<String> {
        self.speech_calls.lock().unwrap().clone()
    }

    /// 480 zero samples, base64 PCM16 little-endian.
    pub fn silent_speech() -> SpeechAudio {
        let bytes = vec![0u8; 480 * 2];
        SpeechAudio {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: Some("audio/L16;codec=pcm;rate=24000".into()),
        }
    }
}

#[async_trait]
impl RemoteAssistant for MockAssistant {
    async fn generate_text(
        &self,
        prompt: &str,
        _temperature: f32,
    ) -> Result<String, RemoteCallError> {
        self.text_prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = &self.text_gate {
            gate.notified().await;
        }
        self.text.clone()
    }

    async fn search_and_summarize(&self, query: &str) -> Result<SearchResponse, RemoteCallError> {
        self.search_calls.lock().unwrap().push(query.to_string());

        if let Some(gate) = &self.search_gate {
            gate.notified().await;
        }

        if let Some(err) = &self.search_error {
            return Err(err.clone());
        }

        Ok(SearchResponse {
            summary: format!("Summary of {query}"),
            sources: vec![
                SearchResult::new("Source A", "https://a.example"),
                SearchResult::new("Source B", "https://b.example"),
            ],
            actual_query: query.to_string(),
        })
    }

    async fn generate_speech(&self, text: &str) -> Result<SpeechAudio, RemoteCallError> {
        self.speech_calls.lock().unwrap().push(text.to_string());
        let queued = self.speech_queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.speech.clone())
    }
}
