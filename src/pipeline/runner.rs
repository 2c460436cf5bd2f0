//! Search flow orchestrator: analyze → search → synthesize → speak → play.
//!
//! [`SearchFlowOrchestrator`] owns the [`SharedState`] and exposes one async
//! entry point per user action.  Every entry point checks the phase guard,
//! takes a fresh generation number, and then runs the flow to completion.
//!
//! # Flow
//!
//! ```text
//! search(q)     ─────────────────────────────┐
//! workshop(q)   ─▶ Tweaking  (tweak_query)  ─┤
//! feeling_lucky ─▶ (generate_random_prompt) ─┤
//! find_more     ─▶ Analyzing (refine_query) ─┤
//!                                            ▼
//!   Analyzing ─▶ Searching ─▶ Synthesizing ─▶ GeneratingAudio ─▶ Playing ─▶ Idle
//!                 (search)    (history +1)     (speech+decode)   (await)
//!                                            ▲
//! replay ────────────────────────────────────┘
//!
//! any failure ─▶ Error        go_back ─▶ Idle (stale flows discarded)
//! ```
//!
//! The state lock is only taken inside short synchronous helpers, never across
//! an `.await`.  A flow whose generation is no longer current stops applying
//! updates and ends with [`FlowOutcome::Superseded`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use thiserror::Error;
use uuid::Uuid;

use crate::assistant::{RemoteAssistant, RemoteCallError, SearchResponse};
use crate::audio::{
    decode_with_format, AudioBuffer, DecodeError, PcmFormat, PlaybackCompletion,
    PlaybackController, PlaybackEnd, PlaybackError,
};
use crate::config::{AppConfig, AudioConfig, FlowConfig};
use crate::history::HistoryEntry;

use super::state::{new_shared_state, FlowPhase, SessionState, SharedState};

// ---------------------------------------------------------------------------
// FlowError / FlowOutcome
// ---------------------------------------------------------------------------

/// Anything that can end a flow in [`FlowPhase::Error`].
///
/// The `Display` text is what ends up in the session's error field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("{0}")]
    Remote(#[from] RemoteCallError),

    #[error("could not decode speech audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("could not play audio: {0}")]
    Playback(#[from] PlaybackError),
}

/// How an entry point ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The guard refused the action; nothing changed.
    Rejected,
    /// Playback reached its natural end.
    Finished,
    /// Playback was halted with [`SearchFlowOrchestrator::stop`].
    Stopped,
    /// The flow ended in [`FlowPhase::Error`].
    Failed,
    /// A newer flow or `go_back` took over; late results were dropped.
    Superseded,
}

// ---------------------------------------------------------------------------
// SearchFlowOrchestrator
// ---------------------------------------------------------------------------

/// Drives the search → speech flow for one session.
///
/// Share it as `Arc<SearchFlowOrchestrator>` and spawn entry points as tokio
/// tasks; observers poll [`snapshot`](Self::snapshot).
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_search::assistant::GeminiAssistant;
/// use voice_search::audio::PlaybackController;
/// use voice_search::config::AppConfig;
/// use voice_search::pipeline::{FlowOutcome, SearchFlowOrchestrator};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let assistant = Arc::new(GeminiAssistant::from_config(&config.assistant).unwrap());
/// let playback = Arc::new(PlaybackController::with_default_output());
/// let flows = Arc::new(SearchFlowOrchestrator::new(assistant, playback, &config));
///
/// assert_eq!(flows.search("history of tea").await, FlowOutcome::Finished);
/// println!("{}", flows.snapshot().active_result.unwrap().summary);
/// # }
/// ```
pub struct SearchFlowOrchestrator {
    state: SharedState,
    assistant: Arc<dyn RemoteAssistant>,
    playback: Arc<PlaybackController>,
    flow: FlowConfig,
    audio: AudioConfig,
    /// Only changed while the state lock is held.
    generation: AtomicU64,
}

impl SearchFlowOrchestrator {
    pub fn new(
        assistant: Arc<dyn RemoteAssistant>,
        playback: Arc<PlaybackController>,
        config: &AppConfig,
    ) -> Self {
        Self {
            state: new_shared_state(config.flow.history_capacity),
            assistant,
            playback,
            flow: config.flow.clone(),
            audio: config.audio.clone(),
            generation: AtomicU64::new(0),
        }
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// A consistent copy of the session.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Handle to the live state, for observers that want to lock it directly.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Completed searches, most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.entries()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Search for `query` and speak the summary.
    pub async fn search(&self, query: &str) -> FlowOutcome {
        let query = query.trim().to_string();
        if query.is_empty() {
            log::debug!("pipeline: empty query ignored");
            return FlowOutcome::Rejected;
        }

        let started = self.begin(
            "search",
            |_| Some(()),
            |st, _| {
                st.begin_flow();
                enter_analyzing(st, &query);
            },
        );
        let Some((gen, ())) = started else {
            return FlowOutcome::Rejected;
        };

        self.run_search(gen, query).await
    }

    /// Let the backend sharpen `query`, then search for the result.
    pub async fn workshop(&self, query: &str) -> FlowOutcome {
        let original = query.trim().to_string();
        if original.is_empty() {
            log::debug!("pipeline: empty query ignored");
            return FlowOutcome::Rejected;
        }

        let started = self.begin(
            "workshop",
            |_| Some(()),
            |st, _| {
                st.begin_flow();
                st.query = Some(original.clone());
                st.enter(FlowPhase::Tweaking, format!("Tweaking query \"{original}\""));
            },
        );
        let Some((gen, ())) = started else {
            return FlowOutcome::Rejected;
        };

        let tweaked = self.assistant.tweak_query(&original).await;
        if !self.apply(gen, |st| enter_analyzing(st, &tweaked)) {
            return FlowOutcome::Superseded;
        }

        self.run_search(gen, tweaked).await
    }

    /// Search for a topic the backend picks.
    ///
    /// Guarded by `lucky_loading` as well as the phase, so only one topic
    /// request is ever in flight.
    pub async fn feeling_lucky(&self) -> FlowOutcome {
        let started = self.begin(
            "feeling lucky",
            |st| (!st.lucky_loading).then_some(()),
            |st, _| {
                st.begin_flow();
                st.lucky_loading = true;
                // The error was just cleared, so leave the Error phase too.
                st.enter(FlowPhase::Idle, "Picking a random topic");
            },
        );
        let Some((gen, ())) = started else {
            return FlowOutcome::Rejected;
        };

        let topic = self
            .assistant
            .generate_random_prompt(&self.flow.random_fallback_query)
            .await;

        // The flag is cleared even when the flow went stale.
        let current = {
            let mut st = self.lock();
            st.lucky_loading = false;
            let current = self.is_current(gen);
            if current {
                enter_analyzing(&mut st, &topic);
            }
            current
        };
        if !current {
            return FlowOutcome::Superseded;
        }

        self.run_search(gen, topic).await
    }

    /// Search for a deeper follow-up to the active result.
    ///
    /// Without an active result this is a no-op.
    pub async fn find_more(&self) -> FlowOutcome {
        let started = self.begin(
            "find more",
            |st| {
                let result = st.active_result.as_ref()?;
                let original = st
                    .query
                    .clone()
                    .unwrap_or_else(|| result.actual_query.clone());
                Some((original, result.summary.clone()))
            },
            |st, (original, _)| {
                st.begin_flow();
                st.enter(
                    FlowPhase::Analyzing,
                    format!("Looking for more on \"{original}\""),
                );
            },
        );
        let Some((gen, (original, summary))) = started else {
            return FlowOutcome::Rejected;
        };

        let refined = self.assistant.refine_query(&original, &summary).await;
        if !self.apply(gen, |st| enter_analyzing(st, &refined)) {
            return FlowOutcome::Superseded;
        }

        self.run_search(gen, refined).await
    }

    /// Speak the active result again without searching.
    pub async fn replay(&self) -> FlowOutcome {
        let started = self.begin(
            "replay",
            |st| st.active_result.as_ref().map(|r| r.summary.clone()),
            |st, _| {
                st.error = None;
                st.playback_finished = false;
                st.enter(FlowPhase::GeneratingAudio, "Converting to speech");
            },
        );
        let Some((gen, summary)) = started else {
            return FlowOutcome::Rejected;
        };

        self.speak(gen, summary).await
    }

    /// Halt playback.  Only acts while `Playing`; returns whether it did.
    pub fn stop(&self) -> bool {
        let mut st = self.lock();
        if st.phase != FlowPhase::Playing {
            log::debug!("pipeline: stop ignored in {}", st.phase);
            return false;
        }
        // A clip that already ended on its own is left for its flow to report.
        if !self.playback.stop() {
            return false;
        }
        st.enter(FlowPhase::Idle, "Playback stopped");
        log::info!("pipeline: playback stopped");
        true
    }

    /// Abandon whatever is running and clear the session view.
    ///
    /// In-flight remote calls keep running; their results are discarded.
    pub fn go_back(&self) {
        let mut st = self.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.playback.stop();
        st.reset();
        log::info!("pipeline: back to idle");
    }

    /// Make a history entry the active result.
    ///
    /// Returns `false` while a flow is busy or when `id` is unknown.
    pub fn select_history(&self, id: Uuid) -> bool {
        let mut st = self.lock();
        if st.phase.is_busy() {
            log::debug!("pipeline: history selection ignored in {}", st.phase);
            return false;
        }
        let Some(entry) = st.history.get(id).cloned() else {
            log::debug!("pipeline: unknown history entry {id}");
            return false;
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.playback.stop();
        st.reset();
        st.query = Some(entry.query);
        st.active_result = Some(entry.results);
        true
    }

    // -----------------------------------------------------------------------
    // Core flow
    // -----------------------------------------------------------------------

    /// Analyzing (already entered) through to the end of playback.
    async fn run_search(&self, gen: u64, query: String) -> FlowOutcome {
        tokio::time::sleep(self.flow.analyze_delay()).await;

        if !self.apply(gen, |st| st.enter(FlowPhase::Searching, "Consulting search")) {
            return FlowOutcome::Superseded;
        }

        let response = match self.assistant.search_and_summarize(&query).await {
            Ok(response) => response,
            Err(e) => return self.fail(gen, e.into()),
        };

        let summary = response.summary.clone();
        let accepted = self.apply(gen, |st| {
            st.push_log(sources_message(&response));
            st.enter(FlowPhase::Synthesizing, "Synthesizing");
            st.history.record(query.clone(), response.clone());
            st.active_result = Some(response);
            st.enter(FlowPhase::GeneratingAudio, "Converting to speech");
        });
        if !accepted {
            return FlowOutcome::Superseded;
        }

        self.speak(gen, summary).await
    }

    /// GeneratingAudio (already entered) through to the end of playback.
    async fn speak(&self, gen: u64, summary: String) -> FlowOutcome {
        let speech = match self.assistant.generate_speech(&summary).await {
            Ok(speech) => speech,
            Err(e) => return self.fail(gen, e.into()),
        };

        let base = PcmFormat {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
        };
        let format = match speech.mime_type.as_deref() {
            Some(mime) => base.with_mime_type(mime),
            None => base,
        };
        let buffer = match decode_with_format(&speech.data, format) {
            Ok(buffer) => buffer,
            Err(e) => return self.fail(gen, e.into()),
        };

        let completion = match self.start_playback(gen, buffer) {
            Ok(Some(completion)) => completion,
            Ok(None) => return FlowOutcome::Superseded,
            Err(e) => return self.fail(gen, e.into()),
        };

        match completion.wait().await {
            PlaybackEnd::Finished => {
                let applied = self.apply(gen, |st| {
                    st.playback_finished = true;
                    st.enter(FlowPhase::Idle, "Playback finished");
                });
                if applied {
                    FlowOutcome::Finished
                } else {
                    FlowOutcome::Superseded
                }
            }
            // `stop` or `go_back` already moved the session on.
            PlaybackEnd::Stopped => {
                if self.lock_and_check(gen) {
                    FlowOutcome::Stopped
                } else {
                    FlowOutcome::Superseded
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, gen: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == gen
    }

    fn lock_and_check(&self, gen: u64) -> bool {
        let _st = self.lock();
        self.is_current(gen)
    }

    /// Guard check, generation bump and entry transition in one critical
    /// section.  `check` must not have side effects; `None` rejects.
    fn begin<T>(
        &self,
        action: &str,
        check: impl FnOnce(&SessionState) -> Option<T>,
        enter: impl FnOnce(&mut SessionState, &T),
    ) -> Option<(u64, T)> {
        let mut st = self.lock();
        if !st.phase.accepts_new_flow() {
            log::debug!("pipeline: {action} ignored in {}", st.phase);
            return None;
        }
        let Some(value) = check(&*st) else {
            log::debug!("pipeline: {action} not available");
            return None;
        };

        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        enter(&mut *st, &value);
        log::info!("pipeline: {action} started");
        Some((gen, value))
    }

    /// Apply `update` if `gen` is still the current flow.
    fn apply(&self, gen: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        let mut st = self.lock();
        if !self.is_current(gen) {
            log::debug!("pipeline: dropping update from stale flow {gen}");
            return false;
        }
        update(&mut *st);
        true
    }

    /// Start the clip under the state lock so `go_back` cannot slip in
    /// between the generation check and the device start.
    ///
    /// `AudioOutput::start` must return promptly; the cpal output gives up
    /// after `audio::output::START_TIMEOUT`.
    fn start_playback(
        &self,
        gen: u64,
        buffer: AudioBuffer,
    ) -> Result<Option<PlaybackCompletion>, PlaybackError> {
        let mut st = self.lock();
        if !self.is_current(gen) {
            return Ok(None);
        }
        let completion = self.playback.play(buffer)?;
        st.enter(FlowPhase::Playing, "Playing audio");
        Ok(Some(completion))
    }

    fn fail(&self, gen: u64, error: FlowError) -> FlowOutcome {
        let message = error.to_string();
        if self.apply(gen, |st| st.fail(message.clone())) {
            log::error!("pipeline error: {message}");
            FlowOutcome::Failed
        } else {
            log::debug!("pipeline: stale flow {gen} failed: {message}");
            FlowOutcome::Superseded
        }
    }
}

fn enter_analyzing(st: &mut SessionState, query: &str) {
    st.query = Some(query.to_string());
    st.enter(FlowPhase::Analyzing, "Analyzing request");
}

fn sources_message(response: &SearchResponse) -> String {
    let count = response.sources.len();
    let noun = if count == 1 { "source" } else { "sources" };
    format!(
        "Found {count} {noun} (searched for \"{}\")",
        response.actual_query
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
