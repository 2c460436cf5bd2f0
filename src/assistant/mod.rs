//! Remote generative assistant: grounded search, query rewrites and speech.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 RemoteAssistant (trait)                   │
//! │                                                           │
//! │  search_and_summarize ──▶ SearchResponse                  │
//! │      (google_search tool, QUERY_USED: marker, sources)    │
//! │                                                           │
//! │  generate_speech ───────▶ SpeechAudio (base64 PCM16)      │
//! │                                                           │
//! │  generate_text ─┬─▶ generate_random_prompt  ─┐            │
//! │                 ├─▶ tweak_query              ├─ fallback  │
//! │                 └─▶ refine_query            ─┘  on error  │
//! └───────────────────────────┬───────────────────────────────┘
//!                             │
//!                   GeminiAssistant (reqwest)
//! ```

pub mod gemini;
pub mod prompt;
pub mod remote;
pub mod response;
pub mod types;

#[cfg(test)]
mod mock;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use gemini::GeminiAssistant;
pub use prompt::{search_prompt, TextTask};
pub use remote::{RemoteAssistant, RemoteCallError};
pub use response::{dedup_sources, split_query_marker, QUERY_MARKER};
pub use types::{SearchResponse, SearchResult, SpeechAudio};

// test-only re-export so the pipeline tests can script the backend.
#[cfg(test)]
pub use mock::MockAssistant;
