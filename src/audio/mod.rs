//! Audio playback: base64 WAV chunk → decode → gapless scheduling → device.
//!
//! # Pipeline
//!
//! ```text
//! tts_audio_chunk → WavDecoder (blocking thread) → DecodedAudio
//!                 → PlaybackScheduler (device clock) → PlaybackSink
//!                 → PlaybackNotice::Finished → PlaybackScheduler
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avatar_sync::audio::{PlaybackScheduler, PlaybackSink, SimulatedOutput};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, _notices) = tokio::sync::mpsc::unbounded_channel();
//!     let sink: Arc<dyn PlaybackSink> = Arc::new(SimulatedOutput::new(tx));
//!     let mut playback = PlaybackScheduler::new(sink, 0.1);
//!     playback.start();
//! }
//! ```

pub mod clock;
pub mod decode;
pub mod output;
pub mod resample;
pub mod scheduler;

pub use clock::{AudioClock, FrameClock, ManualClock, WallClock};
pub use decode::{AudioDecoder, DecodeError, DecodedAudio, WavDecoder};
pub use output::{DeviceOutput, OutputError, PlaybackNotice, PlaybackSink, SimulatedOutput, StreamHandle};
pub use resample::{downmix_to_mono, resample_linear};
pub use scheduler::{DecodeTicket, PlaybackScheduler, PlaybackStatus, ScheduledSlot};
