//! Event dispatcher: parses one raw wire message and decides which part of
//! the engine handles it.
//!
//! The dispatcher itself is stateless.  It never fails towards its caller:
//! malformed payloads are logged and dropped, unknown types are ignored.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::envelope::Envelope;
use super::kind::MessageKind;

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// A wire message that could not be turned into an [`Envelope`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} message is missing {field}")]
    MissingField { kind: &'static str, field: &'static str },
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Input for the stream reassembler / turn scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamInput {
    Chunk {
        speaker: String,
        correlation: Option<String>,
        fragment: String,
    },
    Final {
        message_id: Option<String>,
        speaker: String,
        correlation: Option<String>,
        text: String,
    },
}

/// Input for the audio playback scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    Start { text: Option<String> },
    /// Base64 encoded audio container.
    Chunk { data: String },
    End,
    Error { reason: String },
}

/// Per-agent status carried by `system.status_update`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub commands: Option<Vec<String>>,
}

/// A generated image announced by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisualAsset {
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default = "background")]
    pub asset_type: String,
}

fn background() -> String {
    "background".into()
}

/// Input for the external status sink.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusInput {
    Component { component: String, status: String },
    Agent { agent_id: String, status: AgentStatus },
    Log(Value),
    Visual(VisualAsset),
    VoiceSession { active: bool },
    Transcription { text: String },
}

/// A complete, non-streamed message worth recording in the history view.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryInput {
    pub message_id: Option<String>,
    pub speaker: String,
    pub text: String,
}

/// Where a dispatched message goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Stream(StreamInput),
    Audio(AudioInput),
    Status(StatusInput),
    History(HistoryInput),
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Classifies inbound messages by declared type.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Parse and classify `raw`.
    ///
    /// Returns `None` for malformed payloads (logged) and for types that have
    /// no consumer on this side of the bus.
    pub fn dispatch(&self, raw: &str) -> Option<Route> {
        let envelope = match Self::parse(raw) {
            Ok(env) => env,
            Err(e) => {
                log::warn!("dispatch: dropping message: {e}");
                return None;
            }
        };
        match Self::route(&envelope) {
            Ok(route) => route,
            Err(e) => {
                log::warn!("dispatch: dropping {}: {e}", envelope.kind);
                None
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Envelope, ParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Classify an already parsed envelope.
    pub fn route(env: &Envelope) -> Result<Option<Route>, ParseError> {
        log::debug!(
            "dispatch: {} from {}",
            env.kind,
            env.sender.agent_id
        );
        let speaker = env.sender.agent_id.clone();
        let correlation = env.correlation_id().map(str::to_owned);

        let route = match env.message_kind() {
            MessageKind::NarrativeChunk => {
                let fragment = env.text_content().ok_or(ParseError::MissingField {
                    kind: "narrative.chunk",
                    field: "payload.content",
                })?;
                Route::Stream(StreamInput::Chunk {
                    speaker,
                    correlation,
                    fragment: fragment.to_owned(),
                })
            }
            MessageKind::NarrativeText => {
                let text = env.text_content().ok_or(ParseError::MissingField {
                    kind: "narrative.text",
                    field: "payload.content",
                })?;
                Route::Stream(StreamInput::Final {
                    message_id: env.id.clone(),
                    speaker,
                    correlation,
                    text: text.to_owned(),
                })
            }
            MessageKind::ExpertResponse => Route::History(HistoryInput {
                message_id: env.id.clone(),
                speaker,
                text: env.response_text(),
            }),
            MessageKind::AudioStart => Route::Audio(AudioInput::Start {
                text: env.field_str("text").map(str::to_owned),
            }),
            MessageKind::AudioChunk => {
                let data = env.field_str("audio_chunk").ok_or(ParseError::MissingField {
                    kind: "tts_audio_chunk",
                    field: "audio_chunk",
                })?;
                Route::Audio(AudioInput::Chunk {
                    data: data.to_owned(),
                })
            }
            MessageKind::AudioEnd => Route::Audio(AudioInput::End),
            MessageKind::AudioError => Route::Audio(AudioInput::Error {
                reason: env.field_str("error").unwrap_or("unknown").to_owned(),
            }),
            MessageKind::StatusUpdate => return Ok(Self::status_update(env)),
            MessageKind::Heartbeat => Route::Status(StatusInput::Component {
                component: speaker,
                status: env.field_str("status").unwrap_or("ok").to_owned(),
            }),
            MessageKind::SystemLog => Route::Status(StatusInput::Log(env.payload.content.clone())),
            MessageKind::VisualAsset => {
                let asset: VisualAsset = serde_json::from_value(env.payload.content.clone())?;
                Route::Status(StatusInput::Visual(asset))
            }
            MessageKind::VoiceSessionStart => {
                Route::Status(StatusInput::VoiceSession { active: true })
            }
            MessageKind::VoiceSessionEnd => {
                Route::Status(StatusInput::VoiceSession { active: false })
            }
            MessageKind::TranscriptionUpdate => Route::Status(StatusInput::Transcription {
                text: env.field_str("text").unwrap_or_default().to_owned(),
            }),
            MessageKind::TranscriptionStatus => Route::Status(StatusInput::Component {
                component: "whisper".into(),
                status: env.field_str("status").unwrap_or("ready").to_owned(),
            }),
            MessageKind::NarrativeAction
            | MessageKind::ExpertCommand
            | MessageKind::ConfigUpdate
            | MessageKind::Unknown(_) => {
                log::debug!("dispatch: ignoring {}", env.kind);
                return Ok(None);
            }
        };
        Ok(Some(route))
    }

    fn status_update(env: &Envelope) -> Option<Route> {
        let component = env.field_str("component");
        if env.recipient.target == "system" || component == Some("brain") {
            // System health only; an update without a component is dropped.
            let component = component?;
            return Some(Route::Status(StatusInput::Component {
                component: component.to_owned(),
                status: env.field_str("status").unwrap_or("unknown").to_owned(),
            }));
        }

        let status = match serde_json::from_value::<AgentStatus>(env.payload.content.clone()) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("dispatch: bad agent status from {}: {e}", env.sender.agent_id);
                return None;
            }
        };
        Some(Route::Status(StatusInput::Agent {
            agent_id: env.sender.agent_id.clone(),
            status,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
