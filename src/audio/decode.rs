//! Base64 PCM payload → [`AudioBuffer`].
//!
//! The speech model returns raw little-endian signed 16-bit PCM with no
//! container header, base64 encoded.  [`decode_pcm16`] turns that into
//! normalised `f32` samples.  Decoding is pure CPU work: the same payload
//! always yields the same samples.

use base64::Engine as _;
use thiserror::Error;

use crate::audio::AudioBuffer;

/// Sample rate of the speech payload when the backend does not say otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
/// Channel count of the speech payload when the backend does not say otherwise.
pub const DEFAULT_CHANNELS: u16 = 1;

const BYTES_PER_SAMPLE: usize = 2;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Reasons a speech payload cannot be turned into audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("audio payload is empty")]
    Empty,

    #[error("audio payload is not valid base64: {0}")]
    Base64(String),

    #[error("audio payload of {len} bytes is not a whole number of {frame_bytes}-byte frames")]
    Misaligned { len: usize, frame_bytes: usize },

    #[error("audio format must have at least one channel")]
    NoChannels,
}

impl From<base64::DecodeError> for DecodeError {
    fn from(e: base64::DecodeError) -> Self {
        DecodeError::Base64(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// PcmFormat
// ---------------------------------------------------------------------------

/// Sample rate and channel layout of a raw PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl PcmFormat {
    /// Read the format from a MIME type such as
    /// `audio/L16;codec=pcm;rate=24000`.
    ///
    /// Parameters that are missing or unparseable keep their defaults.
    ///
    /// ```
    /// use voice_search::audio::PcmFormat;
    ///
    /// let fmt = PcmFormat::from_mime_type("audio/L16;codec=pcm;rate=16000");
    /// assert_eq!(fmt.sample_rate, 16_000);
    /// assert_eq!(fmt.channels, 1);
    /// ```
    pub fn from_mime_type(mime: &str) -> Self {
        Self::default().with_mime_type(mime)
    }

    /// Override this format with whatever `mime` advertises.
    pub fn with_mime_type(self, mime: &str) -> Self {
        let mut format = self;
        for param in mime.split(';').skip(1) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => {
                    if let Ok(rate) = value.trim().parse::<u32>() {
                        if rate > 0 {
                            format.sample_rate = rate;
                        }
                    }
                }
                "channels" => {
                    if let Ok(channels) = value.trim().parse::<u16>() {
                        if channels > 0 {
                            format.channels = channels;
                        }
                    }
                }
                _ => {}
            }
        }
        format
    }

    fn frame_bytes(&self) -> usize {
        BYTES_PER_SAMPLE * usize::from(self.channels)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a base64 payload of 16-bit little-endian PCM.
///
/// # Errors
///
/// * [`DecodeError::Empty`] for an empty payload (before or after base64).
/// * [`DecodeError::Base64`] for malformed base64.
/// * [`DecodeError::Misaligned`] when the byte count is not a multiple of
///   `2 * channels`.
///
/// ```
/// use voice_search::audio::decode_pcm16;
///
/// // Two samples: 0 and i16::MIN
/// let buf = decode_pcm16("AAAAgA==", 24_000, 1).unwrap();
/// assert_eq!(buf.samples(), &[0.0, -1.0]);
/// ```
pub fn decode_pcm16(
    payload: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioBuffer, DecodeError> {
    decode_with_format(
        payload,
        PcmFormat {
            sample_rate,
            channels,
        },
    )
}

/// [`decode_pcm16`] taking a [`PcmFormat`].
pub fn decode_with_format(payload: &str, format: PcmFormat) -> Result<AudioBuffer, DecodeError> {
    if format.channels == 0 {
        return Err(DecodeError::NoChannels);
    }

    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let frame_bytes = format.frame_bytes();
    if bytes.len() % frame_bytes != 0 {
        return Err(DecodeError::Misaligned {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let samples = bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(AudioBuffer::new(samples, format.sample_rate, format.channels))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
