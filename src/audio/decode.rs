//! Decoding of base64 WAV chunks into mono `f32` samples.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hound::{SampleFormat, WavReader};
use thiserror::Error;

use super::resample::downmix_to_mono;

// ---------------------------------------------------------------------------
// DecodedAudio
// ---------------------------------------------------------------------------

/// One decoded audio chunk, downmixed to mono.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("audio chunk is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("audio chunk is not a readable WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported sample width: {0} bits")]
    UnsupportedBits(u16),

    #[error("audio chunk contains no samples")]
    Empty,

    #[error("decode worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Turns the encoded payload of an audio chunk into playable samples.
///
/// Decoding runs on a blocking thread, so implementations must be `Send + Sync`.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, encoded: &str) -> Result<DecodedAudio, DecodeError>;
}

/// Decoder for base64-encoded RIFF/WAV chunks (integer or float PCM).
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode raw WAV bytes.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
        let mut reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(DecodeError::UnsupportedBits(spec.bits_per_sample));
                }
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let samples = downmix_to_mono(&interleaved, spec.channels);
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }

        Ok(DecodedAudio {
            samples,
            sample_rate: spec.sample_rate,
        })
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, encoded: &str) -> Result<DecodedAudio, DecodeError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        self.decode_bytes(&bytes)
    }
}
