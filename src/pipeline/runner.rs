//! Orchestrator: the single task that turns link traffic into stage events.
//!
//! [`Orchestrator`] owns the dispatcher, the stream reassembler, the playback
//! scheduler and the display ledger.  Everything that touches them arrives
//! through one `select!` loop, so no locks guard them.
//!
//! # Flow
//!
//! ```text
//! LinkEvent::Inbound ─▶ Dispatcher ─┬─ Stream ─▶ Reassembler ─┬─ StreamText / Directive
//!                                   │                         └─ final ─▶ SpeechHandle
//!                                   ├─ Audio  ─▶ decode worker ─▶ PlaybackScheduler ─▶ sink
//!                                   ├─ Status ─▶ StageEvent
//!                                   └─ History ─▶ DisplayLedger ─▶ StageEvent
//!
//! LinkEvent::Opened ─▶ config_update, backlog fetch (roster + history)
//! LinkEvent::Closed ─▶ drop stream buffers, not ready
//! PlaybackNotice    ─▶ PlaybackScheduler (ready when the turn drained)
//! Control           ─▶ barge-in, send text, shutdown
//! ```
//!
//! Audio decoding runs on the blocking pool, one chunk at a time, so chunks
//! reach the scheduler in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::audio::{
    AudioDecoder, DecodeError, DecodeTicket, DecodedAudio, PlaybackNotice, PlaybackScheduler,
    PlaybackSink, PlaybackStatus, WavDecoder,
};
use crate::backend::{AgentInfo, BackendApi, HistoryEntry, RetryPolicy};
use crate::config::AppConfig;
use crate::link::{ConnectionHandle, LinkEvent, SessionState};
use crate::protocol::{AudioInput, Dispatcher, Envelope, HistoryInput, Route, StatusInput, StreamInput};
use crate::speech::{SpeechHandle, Turn};
use crate::stream::{DirectiveSyntax, Reassembler};

use super::events::StageEvent;
use super::history::DisplayLedger;
use super::state::{lock, SharedState};

// ---------------------------------------------------------------------------
// Control surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Abandon the active turn, the speech queue and queued audio.
    BargeIn,
    /// Send user text to `target` (an agent id or `broadcast`).
    SendText { text: String, target: String },
    Shutdown,
}

/// Cloneable handle for driving a running [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: UnboundedSender<Control>,
}

impl OrchestratorHandle {
    pub fn barge_in(&self) {
        let _ = self.tx.send(Control::BargeIn);
    }

    pub fn send_text(&self, text: impl Into<String>, target: impl Into<String>) {
        let _ = self.tx.send(Control::SendText {
            text: text.into(),
            target: target.into(),
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Control::Shutdown);
    }
}

/// Results of background work, fed back into the loop.
enum Inbox {
    Decoded {
        ticket: DecodeTicket,
        result: Result<DecodedAudio, DecodeError>,
    },
    Roster(Vec<AgentInfo>),
    Backlog(Vec<HistoryEntry>),
    Settings(serde_json::Value),
}

struct DecodeJob {
    ticket: DecodeTicket,
    data: String,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    dispatcher: Dispatcher,
    reassembler: Reassembler,
    playback: PlaybackScheduler,
    ledger: DisplayLedger,

    link: ConnectionHandle,
    speech: SpeechHandle,
    decoder: Arc<dyn AudioDecoder>,
    backend: Option<Arc<dyn BackendApi>>,
    retry: RetryPolicy,
    log_level: String,
    backlog_task: Option<JoinHandle<()>>,

    events: UnboundedSender<StageEvent>,
    state: SharedState,

    control_tx: UnboundedSender<Control>,
    control_rx: UnboundedReceiver<Control>,
    inbox_tx: UnboundedSender<Inbox>,
    inbox_rx: UnboundedReceiver<Inbox>,
    decode_tx: UnboundedSender<DecodeJob>,
    decode_rx: Option<UnboundedReceiver<DecodeJob>>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        link: ConnectionHandle,
        speech: SpeechHandle,
        sink: Arc<dyn PlaybackSink>,
        events: UnboundedSender<StageEvent>,
        state: SharedState,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (decode_tx, decode_rx) = mpsc::unbounded_channel();
        let lookahead = config.audio.lookahead_ms as f64 / 1_000.0;

        Self {
            dispatcher: Dispatcher::new(),
            reassembler: Reassembler::new(DirectiveSyntax::new(&config.stream.directives)),
            playback: PlaybackScheduler::new(sink, lookahead),
            ledger: DisplayLedger::default(),
            link,
            speech,
            decoder: Arc::new(WavDecoder::new()),
            backend: None,
            retry: RetryPolicy::from(&config.backend),
            log_level: config.link.log_level.clone(),
            backlog_task: None,
            events,
            state,
            control_tx,
            control_rx,
            inbox_tx,
            inbox_rx,
            decode_tx,
            decode_rx: Some(decode_rx),
        }
    }

    /// Fetch roster and history from `backend` on every link open.
    pub fn with_backend(mut self, backend: Arc<dyn BackendApi>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            tx: self.control_tx.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until [`Control::Shutdown`] or until the link event channel closes.
    pub async fn run(
        mut self,
        mut link_rx: UnboundedReceiver<LinkEvent>,
        mut notices: UnboundedReceiver<PlaybackNotice>,
    ) {
        if let Some(rx) = self.decode_rx.take() {
            tokio::spawn(decode_worker(
                Arc::clone(&self.decoder),
                rx,
                self.inbox_tx.clone(),
            ));
        }

        loop {
            tokio::select! {
                event = link_rx.recv() => match event {
                    Some(event) => self.on_link(event),
                    None => break,
                },
                Some(item) = self.inbox_rx.recv() => self.on_inbox(item),
                Some(notice) = notices.recv() => match notice {
                    PlaybackNotice::Finished { id } => self.with_playback(|p| p.finished(id)),
                },
                Some(control) = self.control_rx.recv() => {
                    if control == Control::Shutdown {
                        break;
                    }
                    self.on_control(control);
                }
            }
        }

        log::info!("pipeline: orchestrator shutting down");
        self.link.shutdown();
        self.speech.clear();
        self.with_playback(PlaybackScheduler::stop);
        if let Some(task) = self.backlog_task.take() {
            task.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Link
    // -----------------------------------------------------------------------

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connecting => {
                self.set_connection(SessionState::Connecting);
                self.set_component("ws", "checking");
            }
            LinkEvent::Opened => {
                self.set_connection(SessionState::Open);
                self.set_component("ws", "ok");
                self.set_ready(true);
                self.link.send(&Envelope::config_update(&self.log_level));
                self.fetch_backlog();
            }
            LinkEvent::Closed => {
                self.reassembler.clear();
                self.set_connection(SessionState::Disconnected);
                self.set_component("ws", "error");
                self.set_ready(false);
                self.set_processing(false);
            }
            LinkEvent::Inbound(raw) => {
                if let Some(route) = self.dispatcher.dispatch(&raw) {
                    self.on_route(route);
                }
            }
        }
    }

    fn fetch_backlog(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        if let Some(previous) = self.backlog_task.take() {
            previous.abort();
        }

        let retry = self.retry;
        let inbox = self.inbox_tx.clone();
        self.backlog_task = Some(tokio::spawn(async move {
            match retry.run("agents", || backend.agents()).await {
                Ok(agents) => {
                    let _ = inbox.send(Inbox::Roster(agents));
                }
                Err(e) => log::warn!("backend: agent roster unavailable: {e}"),
            }
            match retry.run("history", || backend.history()).await {
                Ok(entries) => {
                    let _ = inbox.send(Inbox::Backlog(entries));
                }
                Err(e) => log::warn!("backend: history unavailable: {e}"),
            }
            match retry.run("config", || backend.config()).await {
                Ok(settings) => {
                    let _ = inbox.send(Inbox::Settings(settings));
                }
                Err(e) => log::warn!("backend: settings unavailable: {e}"),
            }
        }));
    }

    // -----------------------------------------------------------------------
    // Routes
    // -----------------------------------------------------------------------

    fn on_route(&mut self, route: Route) {
        match route {
            Route::Stream(input) => self.on_stream(input),
            Route::Audio(input) => self.on_audio(input),
            Route::Status(input) => self.on_status(input),
            Route::History(HistoryInput {
                message_id,
                speaker,
                text,
            }) => {
                self.set_processing(false);
                if self.ledger.should_display(message_id.as_deref()) {
                    self.emit(StageEvent::History {
                        from_user: speaker == "user",
                        message_id,
                        speaker,
                        text,
                    });
                }
            }
        }
    }

    fn on_stream(&mut self, input: StreamInput) {
        match input {
            StreamInput::Chunk {
                speaker,
                correlation,
                fragment,
            } => {
                let Some(update) =
                    self.reassembler
                        .on_chunk(&speaker, correlation.as_deref(), &fragment)
                else {
                    return;
                };
                self.set_processing(false);
                for hit in update.directives {
                    log::debug!("stream: {} {}", update.speaker, hit.directive);
                    self.emit(StageEvent::Directive {
                        speaker: update.speaker.clone(),
                        directive: hit.directive,
                        display: hit.display_before,
                    });
                }
                self.emit(StageEvent::StreamText {
                    speaker: update.speaker,
                    correlation: update.correlation,
                    text: update.display,
                });
            }
            StreamInput::Final {
                message_id,
                speaker,
                correlation,
                text,
            } => {
                self.set_processing(false);
                let utterance = self.reassembler.on_final(
                    &speaker,
                    correlation.as_deref(),
                    message_id.as_deref(),
                    &text,
                );
                if !self.ledger.should_display(message_id.as_deref()) {
                    log::debug!("stream: {speaker} message already displayed");
                    return;
                }

                let from_user = speaker == "user";
                self.emit(StageEvent::History {
                    message_id: utterance.message_id.clone(),
                    speaker: utterance.speaker.clone(),
                    text: utterance.display_text.clone(),
                    from_user,
                });
                if !from_user {
                    self.speech.enqueue(Turn::from(utterance));
                }
            }
        }
    }

    fn on_audio(&mut self, input: AudioInput) {
        match input {
            AudioInput::Start { text } => {
                log::debug!("playback: start {:?}", text.unwrap_or_default());
                self.with_playback(PlaybackScheduler::start);
            }
            AudioInput::Chunk { data } => {
                let Some(ticket) = self.playback.begin_decode() else {
                    return;
                };
                if self.decode_tx.send(DecodeJob { ticket, data }).is_err() {
                    log::warn!("playback: decode worker gone, dropping chunk");
                    self.with_playback(|p| {
                        p.decoded(ticket, Err(DecodeError::Worker("stopped".into())));
                    });
                }
            }
            AudioInput::End => self.with_playback(PlaybackScheduler::end),
            AudioInput::Error { reason } => {
                log::warn!("playback: backend TTS error: {reason}");
                self.with_playback(PlaybackScheduler::end);
            }
        }
    }

    fn on_status(&mut self, input: StatusInput) {
        let event = match input {
            StatusInput::Component { component, status } => {
                lock(&self.state)
                    .components
                    .insert(component.clone(), status.clone());
                StageEvent::Component { component, status }
            }
            StatusInput::Agent { agent_id, status } => StageEvent::Agent { agent_id, status },
            StatusInput::Log(line) => StageEvent::Log(line),
            StatusInput::Visual(asset) => StageEvent::Visual(asset),
            StatusInput::VoiceSession { active } => StageEvent::VoiceSession { active },
            StatusInput::Transcription { text } => StageEvent::Transcription { text },
        };
        self.emit(event);
    }

    // -----------------------------------------------------------------------
    // Background results and controls
    // -----------------------------------------------------------------------

    fn on_inbox(&mut self, item: Inbox) {
        match item {
            Inbox::Decoded { ticket, result } => {
                let slot = self.with_playback(|p| p.decoded(ticket, result));
                if let Some(slot) = slot {
                    log::debug!(
                        "playback: buffer {} at {:.3}s for {:.3}s",
                        slot.id,
                        slot.start,
                        slot.duration
                    );
                }
            }
            Inbox::Roster(agents) => {
                log::info!("backend: {} agent(s) on the roster", agents.len());
                lock(&self.state).agents = agents.clone();
                self.emit(StageEvent::Roster(agents));
            }
            Inbox::Backlog(entries) => {
                let mut replayed = 0;
                for entry in entries {
                    if !self.ledger.should_display(entry.message_id.as_deref()) {
                        continue;
                    }
                    replayed += 1;
                    let text = self.reassembler.syntax().clean(&entry.text);
                    self.emit(StageEvent::History {
                        message_id: entry.message_id,
                        speaker: entry.speaker,
                        text,
                        from_user: entry.from_user,
                    });
                }
                log::info!("backend: replayed {replayed} history message(s)");
            }
            Inbox::Settings(settings) => {
                log::debug!("backend: settings {settings}");
                lock(&self.state).backend_settings = Some(settings.clone());
                self.emit(StageEvent::BackendSettings(settings));
            }
        }
    }

    fn on_control(&mut self, control: Control) {
        match control {
            Control::BargeIn => {
                log::info!("pipeline: barge-in");
                self.speech.clear();
                self.with_playback(PlaybackScheduler::stop);
            }
            Control::SendText { text, target } => {
                if self.link.send(&Envelope::user_narrative(&text, &target)) {
                    self.set_processing(true);
                }
            }
            Control::Shutdown => {}
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Run `f` on the playback scheduler and publish a status change.
    fn with_playback<R>(&mut self, f: impl FnOnce(&mut PlaybackScheduler) -> R) -> R {
        let before = self.playback.status();
        let out = f(&mut self.playback);
        let after = self.playback.status();
        if before != after {
            lock(&self.state).playback = after;
            if after == PlaybackStatus::Ready {
                log::info!("playback: ready");
            }
            self.emit(StageEvent::Playback(after));
        }
        out
    }

    fn set_connection(&self, connection: SessionState) {
        lock(&self.state).connection = connection;
        self.emit(StageEvent::Connection(connection));
    }

    fn set_ready(&self, ready: bool) {
        lock(&self.state).ready = ready;
        self.emit(StageEvent::Ready(ready));
    }

    fn set_processing(&self, processing: bool) {
        {
            let mut st = lock(&self.state);
            if st.processing == processing {
                return;
            }
            st.processing = processing;
        }
        self.emit(StageEvent::Processing(processing));
    }

    fn set_component(&self, component: &str, status: &str) {
        lock(&self.state)
            .components
            .insert(component.to_owned(), status.to_owned());
        self.emit(StageEvent::Component {
            component: component.to_owned(),
            status: status.to_owned(),
        });
    }

    fn emit(&self, event: StageEvent) {
        let _ = self.events.send(event);
    }
}

/// Decode chunks one at a time on the blocking pool.
async fn decode_worker(
    decoder: Arc<dyn AudioDecoder>,
    mut jobs: UnboundedReceiver<DecodeJob>,
    inbox: UnboundedSender<Inbox>,
) {
    while let Some(DecodeJob { ticket, data }) = jobs.recv().await {
        let decoder = Arc::clone(&decoder);
        let result = match tokio::task::spawn_blocking(move || decoder.decode(&data)).await {
            Ok(result) => result,
            Err(e) => Err(DecodeError::Worker(e.to_string())),
        };
        if inbox.send(Inbox::Decoded { ticket, result }).is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
