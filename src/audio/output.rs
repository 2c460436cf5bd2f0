//! Speaker output via `cpal`.
//!
//! `cpal::Stream` cannot move between threads on every platform, so the
//! device and the live stream are owned by one dedicated `audio-output`
//! thread.  [`CpalOutput`] talks to that thread over a channel.
//!
//! The thread is the process-wide output context: it is spawned the first
//! time anything is played and lives until the process exits.
//!
//! Callers never wait on the thread without a deadline: opening the device
//! is bounded by [`OPEN_TIMEOUT`] and starting a clip by [`START_TIMEOUT`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::audio::playback::{AudioOutput, CompletionCallback, PlaybackError};
use crate::audio::AudioBuffer;

static SHARED: OnceLock<Arc<CpalOutput>> = OnceLock::new();

/// Longest wait for the output thread to find a device.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest wait for the output thread to open a stream for a clip.
pub const START_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// OutputCommand
// ---------------------------------------------------------------------------

enum OutputCommand {
    Play {
        id: u64,
        buffer: AudioBuffer,
        on_finished: CompletionCallback,
        reply: mpsc::SyncSender<Result<(), PlaybackError>>,
    },
    /// Sent by the stream callback once clip `id` has been fully rendered.
    Drained { id: u64 },
    Halt,
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// [`AudioOutput`] backed by the system default output device.
pub struct CpalOutput {
    context: OnceLock<Result<mpsc::Sender<OutputCommand>, PlaybackError>>,
    next_id: AtomicU64,
}

impl CpalOutput {
    /// The process-wide output, created on first call.
    pub fn shared() -> Arc<CpalOutput> {
        Arc::clone(SHARED.get_or_init(|| {
            Arc::new(CpalOutput {
                context: OnceLock::new(),
                next_id: AtomicU64::new(1),
            })
        }))
    }

    fn context(&self) -> Result<&mpsc::Sender<OutputCommand>, PlaybackError> {
        self.context
            .get_or_init(spawn_output_thread)
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl AudioOutput for CpalOutput {
    fn start(
        &self,
        buffer: AudioBuffer,
        on_finished: CompletionCallback,
    ) -> Result<(), PlaybackError> {
        let tx = self.context()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, reply_rx) = mpsc::sync_channel(1);

        tx.send(OutputCommand::Play {
            id,
            buffer,
            on_finished,
            reply,
        })
        .map_err(|_| thread_gone())?;

        let result = await_reply(&reply_rx, START_TIMEOUT);
        if matches!(result, Err(PlaybackError::ContextUnavailable(_))) {
            // A stream opened after we gave up must not play unobserved.
            let _ = tx.send(OutputCommand::Halt);
        }
        result
    }

    fn halt(&self) {
        // Nothing can be playing if the context was never created.
        if let Some(Ok(tx)) = self.context.get() {
            let _ = tx.send(OutputCommand::Halt);
        }
    }
}

fn thread_gone() -> PlaybackError {
    PlaybackError::ContextUnavailable("audio output thread has exited".into())
}

/// Wait at most `timeout` for the output thread to answer.
fn await_reply<T>(
    rx: &mpsc::Receiver<Result<T, PlaybackError>>,
    timeout: Duration,
) -> Result<T, PlaybackError> {
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(PlaybackError::ContextUnavailable(format!(
            "audio output did not answer within {} ms",
            timeout.as_millis()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(thread_gone()),
    }
}

// ---------------------------------------------------------------------------
// Output thread
// ---------------------------------------------------------------------------

fn spawn_output_thread() -> Result<mpsc::Sender<OutputCommand>, PlaybackError> {
    let (tx, rx) = mpsc::channel::<OutputCommand>();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), PlaybackError>>(1);
    let loop_tx = tx.clone();

    std::thread::Builder::new()
        .name("audio-output".into())
        .spawn(move || {
            let device = match cpal::default_host().default_output_device() {
                Some(device) => device,
                None => {
                    let _ = ready_tx.send(Err(PlaybackError::NoDevice));
                    return;
                }
            };
            log::info!(
                "playback: output device {}",
                device.name().unwrap_or_else(|_| "<unnamed>".into())
            );
            let _ = ready_tx.send(Ok(()));
            run_output_loop(&device, &rx, &loop_tx);
        })
        .map_err(|e| PlaybackError::ContextUnavailable(e.to_string()))?;

    await_reply(&ready_rx, OPEN_TIMEOUT)?;
    Ok(tx)
}

fn run_output_loop(
    device: &cpal::Device,
    rx: &mpsc::Receiver<OutputCommand>,
    tx: &mpsc::Sender<OutputCommand>,
) {
    let mut current: Option<(u64, cpal::Stream)> = None;

    while let Ok(command) = rx.recv() {
        match command {
            OutputCommand::Play {
                id,
                buffer,
                on_finished,
                reply,
            } => {
                // Drop the previous stream before opening the next one.
                current = None;
                let result = open_stream(device, id, buffer, on_finished, tx.clone());
                let _ = reply.send(result.map(|stream| {
                    current = Some((id, stream));
                }));
            }
            OutputCommand::Drained { id } => {
                if current.as_ref().is_some_and(|(playing, _)| *playing == id) {
                    log::debug!("playback: clip drained, closing stream");
                    current = None;
                }
            }
            OutputCommand::Halt => {
                current = None;
            }
        }
    }
}

/// Pick a device config that can render `buffer` as-is.  Mono clips may go
/// out on a stereo config, with the sample copied to both channels.
fn output_config(device: &cpal::Device, buffer: &AudioBuffer) -> Result<StreamConfig, PlaybackError> {
    let rate = SampleRate(buffer.sample_rate());
    let fits = |range: &cpal::SupportedStreamConfigRange, channels: u16| {
        range.channels() == channels
            && range.sample_format() == SampleFormat::F32
            && range.min_sample_rate() <= rate
            && range.max_sample_rate() >= rate
    };

    let mut wanted = vec![buffer.channels()];
    if buffer.channels() == 1 {
        wanted.push(2);
    }

    for channels in wanted {
        let found = device
            .supported_output_configs()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?
            .find(|range| fits(range, channels));
        if let Some(range) = found {
            return Ok(range.with_sample_rate(rate).config());
        }
    }

    Err(PlaybackError::Unsupported(format!(
        "{} Hz with {} channel(s)",
        buffer.sample_rate(),
        buffer.channels()
    )))
}

// ---------------------------------------------------------------------------
// ClipCursor
// ---------------------------------------------------------------------------

/// Read position within one clip, advanced by the stream callback.
struct ClipCursor {
    samples: Arc<[f32]>,
    in_channels: usize,
    out_channels: usize,
    total_frames: usize,
    position: usize,
}

impl ClipCursor {
    fn new(buffer: &AudioBuffer, out_channels: usize) -> Self {
        Self {
            samples: buffer.shared_samples(),
            in_channels: usize::from(buffer.channels()),
            out_channels,
            total_frames: buffer.frames(),
            position: 0,
        }
    }

    /// Render the next device period into `data`, padding with silence.
    ///
    /// Returns `true` once a period has been requested after the one that
    /// held the last frame, i.e. the device has consumed the whole clip.
    fn fill(&mut self, data: &mut [f32]) -> bool {
        let drained = self.position >= self.total_frames;
        for frame in data.chunks_mut(self.out_channels) {
            if self.position < self.total_frames {
                let base = self.position * self.in_channels;
                for (channel, out) in frame.iter_mut().enumerate() {
                    *out = self.samples[base + channel.min(self.in_channels - 1)];
                }
                self.position += 1;
            } else {
                frame.fill(0.0);
            }
        }
        drained
    }
}

fn open_stream(
    device: &cpal::Device,
    id: u64,
    buffer: AudioBuffer,
    on_finished: CompletionCallback,
    notify: mpsc::Sender<OutputCommand>,
) -> Result<cpal::Stream, PlaybackError> {
    let config = output_config(device, &buffer)?;
    let mut cursor = ClipCursor::new(&buffer, usize::from(config.channels));
    let mut on_finished = Some(on_finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cursor.fill(data) {
                    if let Some(done) = on_finished.take() {
                        done();
                        let _ = notify.send(OutputCommand::Drained { id });
                    }
                }
            },
            |err: cpal::StreamError| {
                log::error!("playback: cpal stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_output_is_a_singleton() {
        let a = CpalOutput::shared();
        let b = CpalOutput::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }

    /// Halting before anything was played must not open the device.
    #[test]
    fn halt_before_first_play_does_not_create_context() {
        let fresh = CpalOutput {
            context: OnceLock::new(),
            next_id: AtomicU64::new(1),
        };
        fresh.halt();
        assert!(fresh.context.get().is_none());
    }

    // ---- ClipCursor ---

    #[test]
    fn clip_is_not_done_until_the_period_after_its_last_frame() {
        let buffer = AudioBuffer::new(vec![0.1, 0.2, 0.3], 24_000, 1);
        let mut cursor = ClipCursor::new(&buffer, 1);
        let mut period = [9.0f32; 4];

        assert!(!cursor.fill(&mut period));
        assert_eq!(period, [0.1, 0.2, 0.3, 0.0]);

        assert!(cursor.fill(&mut period));
        assert_eq!(period, [0.0; 4]);
    }

    #[test]
    fn clip_ending_on_a_period_boundary_waits_one_more_period() {
        let buffer = AudioBuffer::new(vec![0.5; 4], 24_000, 1);
        let mut cursor = ClipCursor::new(&buffer, 1);
        let mut period = [0.0f32; 2];

        assert!(!cursor.fill(&mut period));
        assert!(!cursor.fill(&mut period));
        assert_eq!(period, [0.5, 0.5]);
        assert!(cursor.fill(&mut period));
    }

    #[test]
    fn mono_clip_is_copied_to_both_stereo_channels() {
        let buffer = AudioBuffer::new(vec![0.25, -0.25], 24_000, 1);
        let mut cursor = ClipCursor::new(&buffer, 2);
        let mut period = [1.0f32; 6];

        assert!(!cursor.fill(&mut period));
        assert_eq!(period, [0.25, 0.25, -0.25, -0.25, 0.0, 0.0]);
    }

    // ---- Replies from the output thread ---

    #[test]
    fn silent_output_thread_times_out() {
        let (_reply, rx) = mpsc::sync_channel::<Result<(), PlaybackError>>(1);
        let err = await_reply(&rx, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, PlaybackError::ContextUnavailable(ref m) if m.contains("20 ms")));
    }

    #[test]
    fn exited_output_thread_is_reported() {
        let (reply, rx) = mpsc::sync_channel::<Result<(), PlaybackError>>(1);
        drop(reply);
        let err = await_reply(&rx, START_TIMEOUT).unwrap_err();
        assert!(matches!(err, PlaybackError::ContextUnavailable(ref m) if m.contains("exited")));
    }

    #[test]
    fn thread_answer_is_passed_through() {
        let (reply, rx) = mpsc::sync_channel(1);
        reply.send(Err(PlaybackError::NoDevice)).unwrap();
        assert!(matches!(
            await_reply::<()>(&rx, START_TIMEOUT),
            Err(PlaybackError::NoDevice)
        ));
    }
}
