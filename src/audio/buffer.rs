//! Decoded, playable audio held entirely in memory.

use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// A complete clip of decoded PCM audio.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0)`.  The sample data
/// is reference-counted so handing a buffer to the output thread never copies
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap already-normalised interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels == 0`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "AudioBuffer needs at least one channel");
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample data.
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length at the buffer's own sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_frames_equal_samples() {
        let buf = AudioBuffer::new(vec![0.0; 480], 24_000, 1);
        assert_eq!(buf.frames(), 480);
        assert_eq!(buf.duration(), Duration::from_millis(20));
    }

    #[test]
    fn stereo_frames_are_half_the_samples() {
        let buf = AudioBuffer::new(vec![0.0; 480], 24_000, 2);
        assert_eq!(buf.frames(), 240);
        assert_eq!(buf.duration(), Duration::from_millis(10));
    }

    #[test]
    fn zero_rate_has_zero_duration() {
        let buf = AudioBuffer::new(vec![0.0; 10], 0, 1);
        assert_eq!(buf.duration(), Duration::ZERO);
    }

    #[test]
    fn clones_share_sample_data() {
        let buf = AudioBuffer::new(vec![0.25, -0.5], 24_000, 1);
        let other = buf.clone();
        assert!(Arc::ptr_eq(&buf.shared_samples(), &other.shared_samples()));
    }

    #[test]
    #[should_panic(expected = "at least one channel")]
    fn zero_channels_panics() {
        let _ = AudioBuffer::new(Vec::new(), 24_000, 0);
    }
}
