//! Audio output sinks.
//!
//! A [`PlaybackSink`] accepts buffers with an absolute start time on its own
//! clock and reports each one back as [`PlaybackNotice::Finished`] once it
//! has been fully rendered.
//!
//! * [`DeviceOutput`] renders through the default `cpal` output device.  The
//!   returned [`StreamHandle`] is a RAII guard; dropping it stops the stream.
//! * [`SimulatedOutput`] renders nothing and completes buffers on tokio's
//!   clock.  Used when no device is available, and in tests.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use super::clock::{AudioClock, FrameClock, WallClock};
use super::decode::DecodedAudio;
use super::resample::resample_linear;

// ---------------------------------------------------------------------------
// Sink contract
// ---------------------------------------------------------------------------

/// Completion report from a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackNotice {
    Finished { id: u64 },
}

/// A device timeline that buffers can be placed on.
pub trait PlaybackSink: AudioClock {
    /// Queue `audio` to start at `start_at` seconds on this sink's clock.
    /// A start time already in the past plays immediately.
    fn schedule(&self, id: u64, audio: Arc<DecodedAudio>, start_at: f64);

    /// Drop every buffer that has not finished yet, without notices.
    fn cancel_all(&self);
}

// ---------------------------------------------------------------------------
// OutputError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// DeviceOutput
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal output stream alive.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

struct Voice {
    id: u64,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Default)]
struct Mixer {
    voices: Vec<Voice>,
}

impl Mixer {
    /// Fill one callback buffer starting at device frame `base`, returning
    /// the ids of voices that ended inside it.
    fn render(&mut self, data: &mut [f32], channels: usize, base: u64) -> Vec<u64> {
        let channels = channels.max(1);
        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let t = base + i as u64;
            let mut sum = 0.0_f32;
            for voice in &self.voices {
                if t >= voice.start_frame && t < voice.end_frame() {
                    sum += voice.samples[(t - voice.start_frame) as usize];
                }
            }
            let sample = sum.clamp(-1.0, 1.0);
            for out in frame.iter_mut() {
                *out = sample;
            }
        }

        let end = base + (data.len() / channels) as u64;
        let mut finished = Vec::new();
        self.voices.retain(|v| {
            if v.end_frame() <= end {
                finished.push(v.id);
                false
            } else {
                true
            }
        });
        finished
    }
}

/// Output through the default audio device.
///
/// The device frame counter is the playback clock.
#[derive(Clone)]
pub struct DeviceOutput {
    clock: FrameClock,
    mixer: Arc<Mutex<Mixer>>,
}

impl DeviceOutput {
    /// Open the default output device and start its stream.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::NoDevice`] when the host has no output device,
    /// or a cpal error when the stream cannot be configured or started.
    pub fn open(
        notices: UnboundedSender<PlaybackNotice>,
    ) -> Result<(Self, StreamHandle), OutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(OutputError::NoDevice)?;

        let supported = device.default_output_config()?;
        let channels = supported.channels() as usize;
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let clock = FrameClock::new(sample_rate);
        let mixer = Arc::new(Mutex::new(Mixer::default()));

        let cb_clock = clock.clone();
        let cb_mixer = Arc::clone(&mixer);
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let base = cb_clock.frames();
                let finished = match cb_mixer.lock() {
                    Ok(mut m) => m.render(data, channels, base),
                    Err(p) => p.into_inner().render(data, channels, base),
                };
                cb_clock.advance((data.len() / channels.max(1)) as u64);
                for id in finished {
                    let _ = notices.send(PlaybackNotice::Finished { id });
                }
            },
            |err: cpal::StreamError| {
                log::error!("playback: cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::info!("playback: output device open at {sample_rate} Hz, {channels} channel(s)");

        Ok((Self { clock, mixer }, StreamHandle { _stream: stream }))
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }
}

impl AudioClock for DeviceOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl PlaybackSink for DeviceOutput {
    fn schedule(&self, id: u64, audio: Arc<DecodedAudio>, start_at: f64) {
        let samples = resample_linear(&audio.samples, audio.sample_rate, self.clock.sample_rate());
        let start_frame = self.clock.frame_at(start_at).max(self.clock.frames());
        let voice = Voice {
            id,
            start_frame,
            samples,
        };
        match self.mixer.lock() {
            Ok(mut m) => m.voices.push(voice),
            Err(p) => p.into_inner().voices.push(voice),
        }
    }

    fn cancel_all(&self) {
        match self.mixer.lock() {
            Ok(mut m) => m.voices.clear(),
            Err(p) => p.into_inner().voices.clear(),
        }
    }
}

// ---------------------------------------------------------------------------
// SimulatedOutput
// ---------------------------------------------------------------------------

/// Silent sink that completes each buffer when its end time passes on
/// tokio's clock.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct SimulatedOutput {
    clock: WallClock,
    notices: UnboundedSender<PlaybackNotice>,
    timers: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl SimulatedOutput {
    pub fn new(notices: UnboundedSender<PlaybackNotice>) -> Self {
        Self {
            clock: WallClock::new(),
            notices,
            timers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl AudioClock for SimulatedOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl PlaybackSink for SimulatedOutput {
    fn schedule(&self, id: u64, audio: Arc<DecodedAudio>, start_at: f64) {
        let start = start_at.max(self.clock.now());
        let deadline = self.clock.instant_at(start + audio.duration());
        let notices = self.notices.clone();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("playback: no runtime for simulated output, buffer {id} dropped");
            return;
        };
        let timer = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = notices.send(PlaybackNotice::Finished { id });
        });

        let mut timers = match self.timers.lock() {
            Ok(t) => t,
            Err(p) => p.into_inner(),
        };
        timers.retain(|t| !t.is_finished());
        timers.push(timer);
    }

    fn cancel_all(&self) {
        let mut timers = match self.timers.lock() {
            Ok(t) => t,
            Err(p) => p.into_inner(),
        };
        for t in timers.drain(..) {
            t.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
