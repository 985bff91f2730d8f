//! Events delivered to the rendering collaborator.

use std::time::Duration;

use serde_json::Value;

use crate::audio::PlaybackStatus;
use crate::backend::AgentInfo;
use crate::link::SessionState;
use crate::protocol::{AgentStatus, VisualAsset};
use crate::stream::Directive;

/// Everything the stage (the presentation layer) needs to react to.
///
/// Events are produced in processing order by the orchestrator and the
/// speech queue and are consumed by exactly one receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    /// Link lifecycle change.
    Connection(SessionState),
    /// Input may be accepted (link open).
    Ready(bool),
    /// A user request is in flight and no answer has arrived yet.
    Processing(bool),

    /// Cleaned in-progress text of a streamed utterance.
    StreamText {
        speaker: String,
        correlation: String,
        text: String,
    },
    /// A directive found in streamed text.  `display` is the text shown at
    /// the moment the directive takes effect.
    Directive {
        speaker: String,
        directive: Directive,
        display: String,
    },

    /// A turn became the active speaker.
    TurnStarted {
        message_id: Option<String>,
        speaker: String,
        text: String,
        directive: Option<Directive>,
        duration: Duration,
    },
    /// The active turn ran its full duration.
    TurnFinished { speaker: String },
    /// The speech queue drained; nobody is speaking.
    SpeakerIdle,

    /// A message for the history view (live or replayed).
    History {
        message_id: Option<String>,
        speaker: String,
        text: String,
        from_user: bool,
    },

    Component { component: String, status: String },
    Agent { agent_id: String, status: AgentStatus },
    Log(Value),
    Visual(VisualAsset),
    VoiceSession { active: bool },
    Transcription { text: String },

    Playback(PlaybackStatus),
    Roster(Vec<AgentInfo>),
    /// Runtime settings reported by the backend after an open.
    BackendSettings(Value),
}
