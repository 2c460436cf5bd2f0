//! Flow state machine and shared session state.
//!
//! [`FlowPhase`] drives the orchestrator's state machine.  Observers read a
//! consistent copy of [`SessionState`] through [`SharedState`].
//!
//! [`SessionState`] is the single source of truth for everything a front end
//! needs: current phase, active query and result, the activity log, the
//! last error, and the session history.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::assistant::SearchResponse;
use crate::history::SessionStore;

// ---------------------------------------------------------------------------
// FlowPhase
// ---------------------------------------------------------------------------

/// States of the search flow.
///
/// ```text
/// Idle ──search──────────────────▶ Analyzing
///      ──workshop──▶ Tweaking ───▶ Analyzing
///      ──find_more─▶ Analyzing (refine) ─▶ Analyzing
/// Analyzing ─▶ Searching ─▶ Synthesizing ─▶ GeneratingAudio ─▶ Playing ─▶ Idle
/// Idle / Error ──replay──▶ GeneratingAudio
/// any phase ──failure──▶ Error
/// any phase ──go_back──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowPhase {
    /// Nothing running.
    #[default]
    Idle,

    /// The backend is rewriting the query before the search.
    Tweaking,

    /// The request is being prepared (refine, or the short analyze pause).
    Analyzing,

    /// Grounded search in flight.
    Searching,

    /// The result has been accepted and recorded.
    Synthesizing,

    /// Text-to-speech in flight.
    GeneratingAudio,

    /// Speech audio is playing.
    Playing,

    /// The last flow failed.  New flows are accepted.
    Error,
}

impl FlowPhase {
    /// Returns `true` while a flow owns the session.
    ///
    /// ```
    /// use voice_search::pipeline::FlowPhase;
    ///
    /// assert!(!FlowPhase::Idle.is_busy());
    /// assert!(FlowPhase::Searching.is_busy());
    /// assert!(FlowPhase::Playing.is_busy());
    /// assert!(!FlowPhase::Error.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !self.accepts_new_flow()
    }

    /// Only `Idle` and `Error` accept a new search, workshop, lucky, find-more
    /// or replay request.
    pub fn accepts_new_flow(&self) -> bool {
        matches!(self, FlowPhase::Idle | FlowPhase::Error)
    }

    /// A short human-readable label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            FlowPhase::Idle => "Idle",
            FlowPhase::Tweaking => "Tweaking",
            FlowPhase::Analyzing => "Analyzing",
            FlowPhase::Searching => "Searching",
            FlowPhase::Synthesizing => "Synthesizing",
            FlowPhase::GeneratingAudio => "Generating audio",
            FlowPhase::Playing => "Playing",
            FlowPhase::Error => "Error",
        }
    }
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Phase the flow was in when the line was written.
    pub phase: FlowPhase,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.phase, self.message)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Everything the orchestrator exposes to observers.
///
/// Held behind [`SharedState`].  Every transition changes several fields in
/// one critical section, so a snapshot never shows a half-applied update.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: FlowPhase,

    /// Query of the current or last flow, after any rewrite.
    pub query: Option<String>,

    /// The response being shown and spoken.  At most one is active.
    pub active_result: Option<SearchResponse>,

    /// Chronological activity log.  Append-only within a flow.
    pub log: Vec<LogEntry>,

    /// Bumped every time `log` is cleared.  Observers that print the log
    /// incrementally compare it to tell a fresh log from a grown one.
    pub log_epoch: u64,

    /// Message shown while `phase == FlowPhase::Error`.
    pub error: Option<String>,

    /// Set when the last clip played to its natural end.
    pub playback_finished: bool,

    /// `true` while a feeling-lucky topic request is in flight.
    pub lucky_loading: bool,

    /// Completed searches, most recent first.
    pub history: SessionStore,
}

impl SessionState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: SessionStore::with_capacity(history_capacity),
            ..Self::default()
        }
    }

    /// Append a log line tagged with the current phase.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            phase: self.phase,
            message: message.into(),
        });
    }

    /// Move to `phase` and log `message` under it.
    pub fn enter(&mut self, phase: FlowPhase, message: impl Into<String>) {
        self.phase = phase;
        self.push_log(message);
    }

    /// Record `message` as the active error and move to `Error`.
    ///
    /// The active result, query and history are left untouched.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.phase = FlowPhase::Error;
        self.push_log(format!("Error: {message}"));
        self.error = Some(message);
    }

    /// Clear the per-flow fields before a new flow starts.
    ///
    /// The active result survives so that find-more and replay can still see
    /// it; it is replaced once the new search succeeds.
    pub fn begin_flow(&mut self) {
        self.clear_log();
        self.error = None;
        self.playback_finished = false;
    }

    /// Drop the active result, log and error, and return to `Idle`.
    pub fn reset(&mut self) {
        self.phase = FlowPhase::Idle;
        self.query = None;
        self.active_result = None;
        self.clear_log();
        self.error = None;
        self.playback_finished = false;
    }

    fn clear_log(&mut self) {
        self.log.clear();
        self.log_epoch += 1;
    }

    /// Phases in log order, with consecutive duplicates collapsed.
    pub fn phase_trail(&self) -> Vec<FlowPhase> {
        let mut trail: Vec<FlowPhase> = Vec::new();
        for entry in &self.log {
            if trail.last() != Some(&entry.phase) {
                trail.push(entry.phase);
            }
        }
        trail
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].
///
/// Lock for a short critical section only; never hold the guard across an
/// `.await`.
pub type SharedState = Arc<Mutex<SessionState>>;

pub fn new_shared_state(history_capacity: usize) -> SharedState {
    Arc::new(Mutex::new(SessionState::new(history_capacity)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> SearchResponse {
        SearchResponse {
            summary: "s".into(),
            sources: Vec::new(),
            actual_query: "q".into(),
        }
    }

    // ---- FlowPhase ---

    #[test]
    fn only_idle_and_error_accept_new_flows() {
        let all = [
            FlowPhase::Idle,
            FlowPhase::Tweaking,
            FlowPhase::Analyzing,
            FlowPhase::Searching,
            FlowPhase::Synthesizing,
            FlowPhase::GeneratingAudio,
            FlowPhase::Playing,
            FlowPhase::Error,
        ];
        let accepting: Vec<_> = all.into_iter().filter(FlowPhase::accepts_new_flow).collect();
        assert_eq!(accepting, vec![FlowPhase::Idle, FlowPhase::Error]);
    }

    #[test]
    fn default_phase_is_idle() {
        assert_eq!(FlowPhase::default(), FlowPhase::Idle);
    }

    #[test]
    fn labels() {
        assert_eq!(FlowPhase::GeneratingAudio.label(), "Generating audio");
        assert_eq!(FlowPhase::Error.to_string(), "Error");
    }

    // ---- SessionState ---

    #[test]
    fn enter_tags_log_with_new_phase() {
        let mut state = SessionState::default();
        state.enter(FlowPhase::Analyzing, "Analyzing request");
        assert_eq!(state.phase, FlowPhase::Analyzing);
        assert_eq!(
            state.log,
            vec![LogEntry {
                phase: FlowPhase::Analyzing,
                message: "Analyzing request".into()
            }]
        );
        assert_eq!(state.log[0].to_string(), "[Analyzing] Analyzing request");
    }

    #[test]
    fn fail_keeps_active_result() {
        let mut state = SessionState::default();
        state.active_result = Some(response());
        state.fail("no audio data received");

        assert_eq!(state.phase, FlowPhase::Error);
        assert_eq!(state.error.as_deref(), Some("no audio data received"));
        assert!(state.active_result.is_some());
        assert_eq!(state.log.last().unwrap().phase, FlowPhase::Error);
    }

    #[test]
    fn begin_flow_clears_log_and_error_only() {
        let mut state = SessionState::default();
        state.active_result = Some(response());
        state.fail("boom");
        state.playback_finished = true;

        state.begin_flow();
        assert_eq!(state.log_epoch, 1);
        assert!(state.log.is_empty());
        assert!(state.error.is_none());
        assert!(!state.playback_finished);
        assert!(state.active_result.is_some());
    }

    #[test]
    fn reset_clears_everything_but_history() {
        let mut state = SessionState::new(20);
        state.history.record("q", response());
        state.active_result = Some(response());
        state.enter(FlowPhase::Playing, "Playing audio");

        state.reset();
        assert_eq!(state.log_epoch, 1);
        assert_eq!(state.phase, FlowPhase::Idle);
        assert!(state.active_result.is_none());
        assert!(state.log.is_empty());
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn phase_trail_collapses_repeats() {
        let mut state = SessionState::default();
        state.enter(FlowPhase::Searching, "Consulting search");
        state.push_log("Found 2 sources");
        state.enter(FlowPhase::Synthesizing, "Synthesizing");
        assert_eq!(
            state.phase_trail(),
            vec![FlowPhase::Searching, FlowPhase::Synthesizing]
        );
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }
}
