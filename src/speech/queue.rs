//! Turn scheduler ("speech queue").
//!
//! [`TurnQueue`] is the synchronous core: a FIFO plus a single active slot.
//! [`SpeechQueue`] drives it from one tokio task that owns the queue and
//! reads [`SpeechCommand`]s from a channel, so two enqueues can never start
//! two presentations.
//!
//! ```text
//! Idle ──enqueue──▶ Active(turn) ──duration elapsed──▶ Active(next) | Idle
//!  ▲                    │
//!  └──────clear─────────┘   (abandoned, no completion signal)
//! ```

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::pipeline::{SharedState, StageEvent};

use super::turn::{Turn, TurnStatus, TurnTiming};

// ---------------------------------------------------------------------------
// TurnQueue
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ActiveTurn {
    turn: Turn,
    until: Instant,
}

/// FIFO of turns with at most one active turn.
#[derive(Debug)]
pub struct TurnQueue {
    timing: TurnTiming,
    queued: VecDeque<Turn>,
    active: Option<ActiveTurn>,
}

impl TurnQueue {
    pub fn new(timing: TurnTiming) -> Self {
        Self {
            timing,
            queued: VecDeque::new(),
            active: None,
        }
    }

    pub fn enqueue(&mut self, mut turn: Turn) {
        turn.status = TurnStatus::Queued;
        self.queued.push_back(turn);
    }

    /// Activate the next queued turn if nothing is active.
    pub fn start_next(&mut self, now: Instant) -> Option<&Turn> {
        if self.active.is_some() {
            return None;
        }
        let mut turn = self.queued.pop_front()?;
        turn.status = TurnStatus::Active;
        turn.duration = self.timing.duration_for(&turn.display_text);
        let until = now + turn.duration;
        self.active = Some(ActiveTurn { turn, until });
        self.active.as_ref().map(|a| &a.turn)
    }

    /// Complete the active turn once its duration has elapsed.
    pub fn finish_due(&mut self, now: Instant) -> Option<Turn> {
        if self.active.as_ref()?.until > now {
            return None;
        }
        let mut done = self.active.take()?.turn;
        done.status = TurnStatus::Done;
        Some(done)
    }

    /// Empty the queue and abandon the active turn.  The abandoned turn is
    /// returned with its status still `Active`; it never reaches `Done`.
    pub fn clear(&mut self) -> Option<Turn> {
        self.queued.clear();
        self.active.take().map(|a| a.turn)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.until)
    }

    pub fn active(&self) -> Option<&Turn> {
        self.active.as_ref().map(|a| &a.turn)
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.queued.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpeechQueue task
// ---------------------------------------------------------------------------

/// Commands accepted by the speech task.
#[derive(Debug)]
pub enum SpeechCommand {
    Enqueue(Turn),
    Clear,
}

/// Cheap, cloneable sender side of the speech task.
#[derive(Debug, Clone)]
pub struct SpeechHandle {
    tx: mpsc::UnboundedSender<SpeechCommand>,
}

impl SpeechHandle {
    pub fn enqueue(&self, turn: Turn) {
        if self.tx.send(SpeechCommand::Enqueue(turn)).is_err() {
            log::warn!("speech: queue task has stopped, turn dropped");
        }
    }

    /// Barge-in: drop everything, including the active turn.  Returns
    /// `false` when the queue task has already stopped.
    pub fn clear(&self) -> bool {
        if self.tx.send(SpeechCommand::Clear).is_err() {
            log::warn!("speech: queue task has stopped, clear ignored");
            return false;
        }
        true
    }
}

/// Single-consumer presentation loop.
pub struct SpeechQueue {
    queue: TurnQueue,
    events: mpsc::UnboundedSender<StageEvent>,
    state: SharedState,
}

impl SpeechQueue {
    pub fn new(
        timing: TurnTiming,
        events: mpsc::UnboundedSender<StageEvent>,
        state: SharedState,
    ) -> Self {
        Self {
            queue: TurnQueue::new(timing),
            events,
            state,
        }
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> (SpeechHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (SpeechHandle { tx }, task)
    }

    /// Run until every [`SpeechHandle`] is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SpeechCommand>) {
        loop {
            let deadline = self.queue.deadline();
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(SpeechCommand::Enqueue(turn)) => {
                        log::debug!("speech: queued turn from {}", turn.speaker);
                        self.queue.enqueue(turn);
                    }
                    Some(SpeechCommand::Clear) => {
                        if let Some(abandoned) = self.queue.clear() {
                            log::info!("speech: cleared, abandoned turn from {}", abandoned.speaker);
                        } else {
                            log::debug!("speech: cleared");
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(done) = self.queue.finish_due(Instant::now()) {
                        log::debug!("speech: {} finished after {:?}", done.speaker, done.duration);
                        self.emit(StageEvent::TurnFinished { speaker: done.speaker });
                        if self.queue.queued_len() == 0 {
                            self.emit(StageEvent::SpeakerIdle);
                        }
                    }
                }
            }

            if let Some(turn) = self.queue.start_next(Instant::now()) {
                log::info!(
                    "speech: {} speaking for {:?}",
                    turn.speaker,
                    turn.duration
                );
                let started = StageEvent::TurnStarted {
                    message_id: turn.message_id.clone(),
                    speaker: turn.speaker.clone(),
                    text: turn.display_text.clone(),
                    directive: turn.directive.clone(),
                    duration: turn.duration,
                };
                self.emit(started);
            }
            self.publish();
        }
        log::debug!("speech: all handles dropped, stopping");
    }

    fn emit(&self, event: StageEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let mut st = match self.state.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        st.active_speaker = self.queue.active().map(|t| t.speaker.clone());
        st.queued_turns = self.queue.queued_len();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipeline::new_shared_state;
    use crate::stream::Utterance;

    fn turn(speaker: &str, text: &str) -> Turn {
        Turn::from(Utterance {
            message_id: None,
            speaker: speaker.into(),
            display_text: text.into(),
            directive: None,
        })
    }

    // ---- TurnQueue ---------------------------------------------------------

    #[test]
    fn only_one_turn_is_active() {
        let mut q = TurnQueue::new(TurnTiming::default());
        let now = Instant::now();
        q.enqueue(turn("A", "un"));
        q.enqueue(turn("B", "deux"));

        assert_eq!(q.start_next(now).map(|t| t.speaker.clone()), Some("A".into()));
        assert!(q.start_next(now).is_none(), "second start while A active");
        assert_eq!(q.active().unwrap().status, TurnStatus::Active);
        assert_eq!(q.queued_len(), 1);
    }

    #[test]
    fn finish_waits_for_duration() {
        let mut q = TurnQueue::new(TurnTiming::default());
        let now = Instant::now();
        q.enqueue(turn("A", "court"));
        q.start_next(now);

        assert!(q.finish_due(now + Duration::from_millis(1_999)).is_none());
        let done = q.finish_due(now + Duration::from_millis(2_000)).unwrap();
        assert_eq!(done.status, TurnStatus::Done);
        assert_eq!(done.duration, Duration::from_millis(2_000));
        assert!(q.is_idle());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut q = TurnQueue::new(TurnTiming::default());
        q.enqueue(turn("A", "un"));
        q.enqueue(turn("B", "deux"));
        q.start_next(Instant::now());

        let abandoned = q.clear().unwrap();
        assert_eq!(abandoned.status, TurnStatus::Active);
        assert!(q.is_idle());

        assert!(q.clear().is_none());
        assert!(q.is_idle());
        assert!(q.deadline().is_none());
    }

    // ---- SpeechQueue task --------------------------------------------------

    fn drain(rx: &mut mpsc::UnboundedReceiver<StageEvent>) -> Vec<StageEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn turns_are_presented_back_to_back() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let state = new_shared_state();
        let (speech, _task) =
            SpeechQueue::new(TurnTiming::default(), events_tx, state.clone()).spawn();

        speech.enqueue(turn("A", "premier"));
        speech.enqueue(turn("B", "second"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let evs = drain(&mut events_rx);
        assert!(matches!(&evs[..], [StageEvent::TurnStarted { speaker, .. }] if speaker == "A"));
        {
            let st = state.lock().unwrap();
            assert_eq!(st.active_speaker.as_deref(), Some("A"));
            assert_eq!(st.queued_turns, 1);
        }

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        let evs = drain(&mut events_rx);
        assert!(matches!(&evs[0], StageEvent::TurnFinished { speaker } if speaker == "A"));
        assert!(matches!(&evs[1], StageEvent::TurnStarted { speaker, .. } if speaker == "B"));
        assert_eq!(evs.len(), 2, "no idle signal while B is queued: {evs:?}");

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        let evs = drain(&mut events_rx);
        assert!(matches!(&evs[0], StageEvent::TurnFinished { speaker } if speaker == "B"));
        assert!(matches!(evs[1], StageEvent::SpeakerIdle));
        assert!(state.lock().unwrap().active_speaker.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_abandons_without_completion_signal() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let state = new_shared_state();
        let (speech, _task) =
            SpeechQueue::new(TurnTiming::default(), events_tx, state.clone()).spawn();

        speech.enqueue(turn("A", "un"));
        speech.enqueue(turn("B", "deux"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drain(&mut events_rx);

        speech.clear();
        speech.clear();
        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let st = state.lock().unwrap();
            assert!(st.active_speaker.is_none());
            assert_eq!(st.queued_turns, 0);
        }

        // Well past A's original deadline: nothing finishes, nothing starts.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(drain(&mut events_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_after_clear_starts_fresh() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (speech, _task) =
            SpeechQueue::new(TurnTiming::default(), events_tx, new_shared_state()).spawn();

        speech.enqueue(turn("A", "un"));
        speech.clear();
        speech.enqueue(turn("C", "trois"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let evs = drain(&mut events_rx);
        let started: Vec<_> = evs
            .iter()
            .filter_map(|e| match e {
                StageEvent::TurnStarted { speaker, .. } => Some(speaker.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(started.last(), Some(&"C"));
    }

    #[tokio::test]
    async fn clear_reports_stopped_task() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (speech, task) =
            SpeechQueue::new(TurnTiming::default(), events_tx, new_shared_state()).spawn();
        assert!(speech.clear());

        task.abort();
        let _ = task.await;
        assert!(!speech.clear());
    }
}
