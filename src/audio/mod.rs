//! Audio pipeline: speech payload → decode → shared output.
//!
//! # Pipeline
//!
//! ```text
//! base64 PCM (from RemoteAssistant::generate_speech)
//!     → decode_pcm16        → AudioBuffer (f32, 24 kHz mono)
//!     → PlaybackController  → AudioOutput (CpalOutput on the audio-output thread)
//!     → PlaybackCompletion  → Finished | Stopped
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voice_search::audio::{decode_pcm16, PlaybackController, PlaybackEnd};
//!
//! # async fn example(payload: String) {
//! let buffer = decode_pcm16(&payload, 24_000, 1).unwrap();
//! let playback = PlaybackController::with_default_output();
//! let done = playback.play(buffer).unwrap();
//! assert_eq!(done.wait().await, PlaybackEnd::Finished);
//! # }
//! ```

pub mod buffer;
pub mod decode;
pub mod output;
pub mod playback;

pub use buffer::AudioBuffer;
pub use decode::{
    decode_pcm16, decode_with_format, DecodeError, PcmFormat, DEFAULT_CHANNELS,
    DEFAULT_SAMPLE_RATE,
};
pub use output::CpalOutput;
pub use playback::{
    AudioOutput, CompletionCallback, PlaybackCompletion, PlaybackController, PlaybackEnd,
    PlaybackError,
};

#[cfg(test)]
pub use playback::MockOutput;
