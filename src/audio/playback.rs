//! Playback of decoded speech through a single shared output.
//!
//! [`PlaybackController`] holds at most one playing buffer.  Starting playback
//! returns a [`PlaybackCompletion`] that resolves exactly once:
//!
//! * [`PlaybackEnd::Finished`] when the last sample has been rendered;
//! * [`PlaybackEnd::Stopped`] when [`PlaybackController::stop`] cut it short.
//!
//! The device work happens behind the [`AudioOutput`] trait so the controller
//! (and the search flow above it) can run against a test double.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::audio::output::CpalOutput;
use crate::audio::AudioBuffer;

/// Invoked by an [`AudioOutput`] when a buffer has been rendered to the end.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Slot value meaning "nothing is playing".
const EMPTY_SLOT: u64 = 0;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors raised while starting playback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// `play` was called while another buffer is still playing.
    #[error("another clip is already playing")]
    AlreadyPlaying,

    #[error("no audio output device found")]
    NoDevice,

    /// The device cannot render the buffer's sample rate / channel layout.
    #[error("output device does not support {0}")]
    Unsupported(String),

    #[error("failed to start output stream: {0}")]
    Stream(String),

    /// The shared output context could not be created or has gone away.
    #[error("audio output unavailable: {0}")]
    ContextUnavailable(String),
}

// ---------------------------------------------------------------------------
// AudioOutput trait
// ---------------------------------------------------------------------------

/// A sink that renders [`AudioBuffer`]s to a device.
///
/// # Contract
///
/// * `start` replaces whatever the output was rendering.  It returns within
///   a bounded time; callers may hold the session lock around it.
/// * `on_finished` is called at most once, from any thread, after the final
///   sample of `buffer` has left the device.
/// * `halt` silences output immediately and drops any pending
///   `on_finished` without calling it.
pub trait AudioOutput: Send + Sync {
    fn start(&self, buffer: AudioBuffer, on_finished: CompletionCallback)
        -> Result<(), PlaybackError>;

    fn halt(&self);
}

// ---------------------------------------------------------------------------
// PlaybackCompletion
// ---------------------------------------------------------------------------

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Rendered to the last sample.
    Finished,
    /// Halted by [`PlaybackController::stop`] (or the output went away).
    Stopped,
}

/// Resolves once the clip started by [`PlaybackController::play`] ends.
#[derive(Debug)]
pub struct PlaybackCompletion {
    rx: oneshot::Receiver<()>,
}

impl PlaybackCompletion {
    /// Wait for the clip to end.  Waiting does not keep the clip alive.
    pub async fn wait(self) -> PlaybackEnd {
        match self.rx.await {
            Ok(()) => PlaybackEnd::Finished,
            Err(_) => PlaybackEnd::Stopped,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackController
// ---------------------------------------------------------------------------

/// Starts and stops speech playback on one shared [`AudioOutput`].
///
/// The "currently playing" handle is a single slot holding the id of the
/// active clip.  The slot is cleared either by `stop` or by the natural
/// completion of that clip, whichever happens first, so completion and stop
/// can never both be reported for one clip.
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    current: Arc<AtomicU64>,
    next_id: AtomicU64,
}

impl PlaybackController {
    /// Build a controller over an explicit output.
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            current: Arc::new(AtomicU64::new(EMPTY_SLOT)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a controller over the process-wide cpal output.
    ///
    /// The device is not opened until the first call to [`play`](Self::play).
    pub fn with_default_output() -> Self {
        Self::new(CpalOutput::shared())
    }

    /// Start playing `buffer`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::AlreadyPlaying`] if a clip is still playing; call
    /// [`stop`](Self::stop) first.  Any error from the output itself.
    pub fn play(&self, buffer: AudioBuffer) -> Result<PlaybackCompletion, PlaybackError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self
            .current
            .compare_exchange(EMPTY_SLOT, id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PlaybackError::AlreadyPlaying);
        }

        let (tx, rx) = oneshot::channel();
        let slot = Arc::clone(&self.current);
        let on_finished: CompletionCallback = Box::new(move || {
            // Only the clip that still owns the slot reports completion.
            if slot
                .compare_exchange(id, EMPTY_SLOT, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let _ = tx.send(());
            }
        });

        log::debug!(
            "playback: starting clip {id} ({} frames @ {} Hz)",
            buffer.frames(),
            buffer.sample_rate()
        );

        if let Err(e) = self.output.start(buffer, on_finished) {
            let _ = self.current.compare_exchange(
                id,
                EMPTY_SLOT,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            log::warn!("playback: failed to start clip {id}: {e}");
            return Err(e);
        }

        Ok(PlaybackCompletion { rx })
    }

    /// Halt playback immediately.
    ///
    /// Idempotent: returns `false` and does nothing when no clip is playing.
    /// A stopped clip never reports natural completion.
    pub fn stop(&self) -> bool {
        let id = self.current.swap(EMPTY_SLOT, Ordering::AcqRel);
        if id == EMPTY_SLOT {
            return false;
        }
        self.output.halt();
        log::debug!("playback: stopped clip {id}");
        true
    }

    /// Returns `true` while a clip is playing.
    pub fn is_playing(&self) -> bool {
        self.current.load(Ordering::Acquire) != EMPTY_SLOT
    }
}

// ---------------------------------------------------------------------------
// MockOutput
// ---------------------------------------------------------------------------

/// Test output that records what it was asked to play.
///
/// In auto-finish mode every clip completes on a background thread right
/// after `start`; otherwise completion is triggered with
/// [`finish_current`](MockOutput::finish_current).
#[cfg(test)]
pub struct MockOutput {
    auto_finish: bool,
    started: std::sync::Mutex<Vec<AudioBuffer>>,
    pending: std::sync::Mutex<Option<CompletionCallback>>,
    halts: AtomicU64,
    fail_with: Option<PlaybackError>,
}

#[cfg(test)]
impl MockOutput {
    pub fn auto_finish() -> Self {
        Self::build(true, None)
    }

    pub fn manual() -> Self {
        Self::build(false, None)
    }

    pub fn failing(error: PlaybackError) -> Self {
        Self::build(false, Some(error))
    }

    fn build(auto_finish: bool, fail_with: Option<PlaybackError>) -> Self {
        Self {
            auto_finish,
            started: std::sync::Mutex::new(Vec::new()),
            pending: std::sync::Mutex::new(None),
            halts: AtomicU64::new(0),
            fail_with,
        }
    }

    /// Simulate the device reaching the end of the current clip.
    pub fn finish_current(&self) -> bool {
        let callback = self.pending.lock().unwrap().take();
        match callback {
            Some(done) => {
                done();
                true
            }
            None => false,
        }
    }

    pub fn started(&self) -> Vec<AudioBuffer> {
        self.started.lock().unwrap().clone()
    }

    pub fn halts(&self) -> u64 {
        self.halts.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl AudioOutput for MockOutput {
    fn start(
        &self,
        buffer: AudioBuffer,
        on_finished: CompletionCallback,
    ) -> Result<(), PlaybackError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.started.lock().unwrap().push(buffer);
        if self.auto_finish {
            std::thread::spawn(on_finished);
        } else {
            *self.pending.lock().unwrap() = Some(on_finished);
        }
        Ok(())
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().take();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AudioBuffer {
        AudioBuffer::new(vec![0.0; 240], 24_000, 1)
    }

    fn controller(output: &Arc<MockOutput>) -> PlaybackController {
        PlaybackController::new(Arc::clone(output) as Arc<dyn AudioOutput>)
    }

    #[tokio::test]
    async fn natural_end_reports_finished_and_frees_slot() {
        let output = Arc::new(MockOutput::manual());
        let ctl = controller(&output);

        let done = ctl.play(clip()).unwrap();
        assert!(ctl.is_playing());

        assert!(output.finish_current());
        assert_eq!(done.wait().await, PlaybackEnd::Finished);
        assert!(!ctl.is_playing());
    }

    #[tokio::test]
    async fn second_play_while_playing_is_rejected() {
        let output = Arc::new(MockOutput::manual());
        let ctl = controller(&output);

        let _first = ctl.play(clip()).unwrap();
        assert_eq!(ctl.play(clip()).unwrap_err(), PlaybackError::AlreadyPlaying);
        assert_eq!(output.started().len(), 1);
    }

    #[tokio::test]
    async fn stop_halts_without_completion() {
        let output = Arc::new(MockOutput::manual());
        let ctl = controller(&output);

        let done = ctl.play(clip()).unwrap();
        assert!(ctl.stop());
        assert_eq!(output.halts(), 1);
        assert!(!ctl.is_playing());

        // The device has nothing left to complete.
        assert!(!output.finish_current());
        assert_eq!(done.wait().await, PlaybackEnd::Stopped);
    }

    #[test]
    fn stop_is_idempotent() {
        let output = Arc::new(MockOutput::manual());
        let ctl = controller(&output);

        assert!(!ctl.stop());
        let _done = ctl.play(clip()).unwrap();
        assert!(ctl.stop());
        assert!(!ctl.stop());
        assert_eq!(output.halts(), 1);
    }

    /// Output that keeps every completion callback, even across `halt`, to
    /// model a device whose end-of-clip signal races a stop.
    struct LateOutput {
        callbacks: std::sync::Mutex<Vec<CompletionCallback>>,
    }

    impl AudioOutput for LateOutput {
        fn start(
            &self,
            _buffer: AudioBuffer,
            on_finished: CompletionCallback,
        ) -> Result<(), PlaybackError> {
            self.callbacks.lock().unwrap().push(on_finished);
            Ok(())
        }

        fn halt(&self) {}
    }

    #[tokio::test]
    async fn late_completion_does_not_touch_newer_clip() {
        let output = Arc::new(LateOutput {
            callbacks: std::sync::Mutex::new(Vec::new()),
        });
        let ctl = PlaybackController::new(Arc::clone(&output) as Arc<dyn AudioOutput>);

        let first = ctl.play(clip()).unwrap();
        assert!(ctl.stop());
        let second = ctl.play(clip()).unwrap();

        let mut callbacks = std::mem::take(&mut *output.callbacks.lock().unwrap());
        let second_done = callbacks.pop().unwrap();
        let first_done = callbacks.pop().unwrap();

        first_done();
        assert!(ctl.is_playing());
        assert_eq!(first.wait().await, PlaybackEnd::Stopped);

        second_done();
        assert!(!ctl.is_playing());
        assert_eq!(second.wait().await, PlaybackEnd::Finished);
    }

    #[test]
    fn failed_start_leaves_slot_empty() {
        let output = Arc::new(MockOutput::failing(PlaybackError::NoDevice));
        let ctl = controller(&output);

        assert_eq!(ctl.play(clip()).unwrap_err(), PlaybackError::NoDevice);
        assert!(!ctl.is_playing());
    }

    #[test]
    fn controller_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PlaybackController>();
    }
}
