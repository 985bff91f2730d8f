//! Gapless placement of decoded audio chunks on the device timeline.
//!
//! Chunks are decoded asynchronously and may finish decoding out of order
//! in time, but they are placed back to back in the order their decodes
//! were started:
//!
//! ```text
//! start:   next_start = now + lookahead
//! chunk:   at = max(next_start, now); next_start = at + duration
//! ```
//!
//! The scheduler goes back to [`PlaybackStatus::Ready`] only when the end
//! marker has arrived, no decode is pending, and every placed buffer has
//! been reported finished by the sink.
//!
//! Chunks are only accepted between a start and the end of that turn.
//! After a stop or a completed turn, late chunks are dropped until the next
//! start.

use std::collections::HashSet;
use std::sync::Arc;

use super::decode::{DecodeError, DecodedAudio};
use super::output::PlaybackSink;

/// Playback state as seen by the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Ready,
    Speaking,
}

/// Where a chunk landed on the device timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSlot {
    pub id: u64,
    pub start: f64,
    pub duration: f64,
}

/// Ticket for a decode in flight.  Stale tickets (from before the latest
/// start or stop) are ignored when they come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeTicket {
    generation: u64,
}

pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    lookahead: f64,
    next_start: f64,
    generation: u64,
    next_id: u64,
    pending_decodes: usize,
    outstanding: HashSet<u64>,
    end_received: bool,
    accepting: bool,
    status: PlaybackStatus,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn PlaybackSink>, lookahead_secs: f64) -> Self {
        Self {
            sink,
            lookahead: lookahead_secs.max(0.0),
            next_start: 0.0,
            generation: 0,
            next_id: 0,
            pending_decodes: 0,
            outstanding: HashSet::new(),
            end_received: false,
            accepting: false,
            status: PlaybackStatus::Ready,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn pending_decodes(&self) -> usize {
        self.pending_decodes
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Whether chunks are currently being taken for the active turn.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Begin a new audio turn.  Decodes still in flight from a previous
    /// turn are abandoned.
    pub fn start(&mut self) {
        self.generation += 1;
        self.pending_decodes = 0;
        self.end_received = false;
        self.accepting = true;
        self.next_start = self.sink.now() + self.lookahead;
        self.status = PlaybackStatus::Speaking;
        log::debug!(
            "playback: turn {} starts at {:.3}s",
            self.generation,
            self.next_start
        );
    }

    /// Register a decode that is about to be started.  Returns `None` when
    /// no turn is accepting audio; the chunk should then be dropped.
    pub fn begin_decode(&mut self) -> Option<DecodeTicket> {
        if !self.accepting {
            log::debug!("playback: no active turn, dropping chunk");
            return None;
        }
        self.pending_decodes += 1;
        Some(DecodeTicket {
            generation: self.generation,
        })
    }

    /// Handle a finished decode.  Returns the slot the chunk was placed in.
    pub fn decoded(
        &mut self,
        ticket: DecodeTicket,
        result: Result<DecodedAudio, DecodeError>,
    ) -> Option<ScheduledSlot> {
        if ticket.generation != self.generation || !self.accepting {
            log::debug!("playback: discarding decode from turn {}", ticket.generation);
            return None;
        }
        self.pending_decodes = self.pending_decodes.saturating_sub(1);

        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                log::warn!("playback: dropping undecodable chunk: {e}");
                self.check_ready();
                return None;
            }
        };

        let id = self.next_id;
        self.next_id += 1;

        let duration = audio.duration();
        let start = self.next_start.max(self.sink.now());
        self.next_start = start + duration;
        self.outstanding.insert(id);
        self.sink.schedule(id, Arc::new(audio), start);

        Some(ScheduledSlot {
            id,
            start,
            duration,
        })
    }

    /// End marker for the current turn (also used for an audio error).
    pub fn end(&mut self) {
        self.end_received = true;
        self.check_ready();
    }

    /// A buffer has been fully rendered.
    pub fn finished(&mut self, id: u64) {
        if self.outstanding.remove(&id) {
            self.check_ready();
        }
    }

    /// Drop everything queued and return to ready.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.pending_decodes = 0;
        self.outstanding.clear();
        self.end_received = false;
        self.accepting = false;
        self.next_start = 0.0;
        self.sink.cancel_all();
        self.status = PlaybackStatus::Ready;
    }

    fn check_ready(&mut self) {
        if self.status == PlaybackStatus::Speaking
            && self.end_received
            && self.pending_decodes == 0
            && self.outstanding.is_empty()
        {
            log::debug!("playback: turn {} complete", self.generation);
            self.accepting = false;
            self.status = PlaybackStatus::Ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::{AudioClock, ManualClock};
    use std::sync::Mutex;

    /// Sink on a manual clock that records every placement.
    #[derive(Default)]
    struct RecordingSink {
        clock: ManualClock,
        placed: Mutex<Vec<(u64, f64, f64)>>,
        cancels: Mutex<usize>,
    }

    impl AudioClock for RecordingSink {
        fn now(&self) -> f64 {
            self.clock.now()
        }
    }

    impl PlaybackSink for RecordingSink {
        fn schedule(&self, id: u64, audio: Arc<DecodedAudio>, start_at: f64) {
            self.placed
                .lock()
                .unwrap()
                .push((id, start_at, audio.duration()));
        }

        fn cancel_all(&self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    fn secs(duration: f64) -> Result<DecodedAudio, DecodeError> {
        Ok(DecodedAudio {
            samples: vec![0.0; (duration * 1_000.0).round() as usize],
            sample_rate: 1_000,
        })
    }

    fn setup() -> (Arc<RecordingSink>, PlaybackScheduler) {
        let sink = Arc::new(RecordingSink::default());
        let sched = PlaybackScheduler::new(sink.clone(), 0.1);
        (sink, sched)
    }

    #[test]
    fn chunks_play_back_to_back() {
        let (sink, mut sched) = setup();
        sink.clock.set(10.0);
        sched.start();
        assert_eq!(sched.status(), PlaybackStatus::Speaking);

        let a = sched.begin_decode().unwrap();
        let b = sched.begin_decode().unwrap();
        let slot_a = sched.decoded(a, secs(0.5)).unwrap();
        let slot_b = sched.decoded(b, secs(0.25)).unwrap();

        assert!((slot_a.start - 10.1).abs() < 1e-9);
        assert!((slot_b.start - 10.6).abs() < 1e-9);
        assert_eq!(sink.placed.lock().unwrap().len(), 2);
    }

    #[test]
    fn late_decode_never_overlaps_or_starts_in_the_past() {
        let (sink, mut sched) = setup();
        sched.start();

        let a = sched.begin_decode().unwrap();
        let slot_a = sched.decoded(a, secs(0.2)).unwrap();

        // Second chunk decodes long after the first has ended.
        sink.clock.set(5.0);
        let b = sched.begin_decode().unwrap();
        let slot_b = sched.decoded(b, secs(0.3)).unwrap();

        assert!(slot_b.start >= slot_a.start + slot_a.duration);
        assert!((slot_b.start - 5.0).abs() < 1e-9);

        let c = sched.begin_decode().unwrap();
        let slot_c = sched.decoded(c, secs(0.1)).unwrap();
        assert!((slot_c.start - 5.3).abs() < 1e-9);
    }

    #[test]
    fn ready_only_after_end_and_all_buffers_finished() {
        let (_sink, mut sched) = setup();
        sched.start();
        let t = sched.begin_decode().unwrap();
        let slot = sched.decoded(t, secs(0.2)).unwrap();

        sched.end();
        assert_eq!(sched.status(), PlaybackStatus::Speaking);

        sched.finished(slot.id);
        assert_eq!(sched.status(), PlaybackStatus::Ready);
    }

    #[test]
    fn end_waits_for_pending_decode() {
        let (_sink, mut sched) = setup();
        sched.start();
        let t = sched.begin_decode().unwrap();
        sched.end();
        assert_eq!(sched.status(), PlaybackStatus::Speaking);

        let slot = sched.decoded(t, secs(0.1)).unwrap();
        assert_eq!(sched.status(), PlaybackStatus::Speaking);
        sched.finished(slot.id);
        assert_eq!(sched.status(), PlaybackStatus::Ready);
    }

    #[test]
    fn failed_decode_is_skipped() {
        let (sink, mut sched) = setup();
        sched.start();
        let t = sched.begin_decode().unwrap();
        let slot = sched.decoded(t, Err(DecodeError::Empty));
        assert!(slot.is_none());
        assert!(sink.placed.lock().unwrap().is_empty());

        sched.end();
        assert_eq!(sched.status(), PlaybackStatus::Ready);
    }

    #[test]
    fn stale_decode_after_restart_is_discarded() {
        let (sink, mut sched) = setup();
        sched.start();
        let old = sched.begin_decode().unwrap();

        sched.start();
        assert!(sched.decoded(old, secs(0.5)).is_none());
        assert!(sink.placed.lock().unwrap().is_empty());
        assert_eq!(sched.pending_decodes(), 0);
    }

    #[test]
    fn stop_cancels_and_returns_to_ready() {
        let (sink, mut sched) = setup();
        sched.start();
        let t = sched.begin_decode().unwrap();
        sched.decoded(t, secs(1.0)).unwrap();

        sched.stop();
        assert_eq!(sched.status(), PlaybackStatus::Ready);
        assert_eq!(sched.outstanding(), 0);
        assert_eq!(*sink.cancels.lock().unwrap(), 1);
    }

    #[test]
    fn unknown_finish_is_ignored() {
        let (_sink, mut sched) = setup();
        sched.start();
        sched.end();
        assert_eq!(sched.status(), PlaybackStatus::Ready);
        sched.finished(42);
        assert_eq!(sched.status(), PlaybackStatus::Ready);
    }

    #[test]
    fn chunk_after_stop_is_not_placed() {
        let (sink, mut sched) = setup();
        sched.start();
        sched.stop();

        assert!(sched.begin_decode().is_none());
        assert!(!sched.is_accepting());
        assert!(sink.placed.lock().unwrap().is_empty());
        assert_eq!(sched.status(), PlaybackStatus::Ready);
    }

    #[test]
    fn chunk_after_completed_turn_is_not_placed() {
        let (sink, mut sched) = setup();
        sched.start();
        sched.end();
        assert_eq!(sched.status(), PlaybackStatus::Ready);

        assert!(sched.begin_decode().is_none());
        assert!(sink.placed.lock().unwrap().is_empty());

        sched.start();
        assert!(sched.begin_decode().is_some());
    }
}
