//! Search flow orchestration and the session state observers read.
//!
//! # Architecture
//!
//! ```text
//! user action (search / workshop / lucky / more / replay / stop / back)
//!        │
//!        ▼
//! SearchFlowOrchestrator            ← one async fn per action, tokio task
//!        │
//!        ├─ RemoteAssistant          tweak / random / refine / search / speech
//!        ├─ decode_with_format       base64 PCM16 → AudioBuffer
//!        └─ PlaybackController       play → PlaybackCompletion (oneshot)
//!
//! SharedState (Arc<Mutex<SessionState>>) ←── snapshot() by the front end
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_search::assistant::GeminiAssistant;
//! use voice_search::audio::PlaybackController;
//! use voice_search::config::AppConfig;
//! use voice_search::pipeline::SearchFlowOrchestrator;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::load().unwrap_or_default();
//!     let assistant = Arc::new(GeminiAssistant::from_config(&config.assistant).unwrap());
//!     let playback = Arc::new(PlaybackController::with_default_output());
//!     let flows = Arc::new(SearchFlowOrchestrator::new(assistant, playback, &config));
//!
//!     let task = tokio::spawn({
//!         let flows = flows.clone();
//!         async move { flows.search("why is the sky blue").await }
//!     });
//!
//!     // flows.stop() / flows.go_back() from the input loop
//!     println!("{:?}", task.await.unwrap());
//!     for line in flows.snapshot().log {
//!         println!("{line}");
//!     }
//! }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{FlowError, FlowOutcome, SearchFlowOrchestrator};
pub use state::{new_shared_state, FlowPhase, LogEntry, SessionState, SharedState};
