//! Declared message types on the backend bus.

/// Every `type` value the engine understands.  Anything else maps to
/// [`MessageKind::Unknown`] and is ignored downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    NarrativeText,
    NarrativeChunk,
    NarrativeAction,
    ExpertCommand,
    ExpertResponse,
    StatusUpdate,
    Heartbeat,
    SystemLog,
    ConfigUpdate,
    VisualAsset,
    AudioStart,
    AudioChunk,
    AudioEnd,
    AudioError,
    VoiceSessionStart,
    VoiceSessionEnd,
    TranscriptionUpdate,
    TranscriptionStatus,
    Unknown(String),
}

impl MessageKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "narrative.text" => Self::NarrativeText,
            "narrative.chunk" => Self::NarrativeChunk,
            "narrative.action" => Self::NarrativeAction,
            "expert.command" => Self::ExpertCommand,
            "expert.response" => Self::ExpertResponse,
            "system.status_update" => Self::StatusUpdate,
            "system.heartbeat" => Self::Heartbeat,
            "system.log" => Self::SystemLog,
            "system.config_update" => Self::ConfigUpdate,
            "visual.asset" => Self::VisualAsset,
            "tts_start" => Self::AudioStart,
            "tts_audio_chunk" => Self::AudioChunk,
            "tts_end" => Self::AudioEnd,
            "tts_error" => Self::AudioError,
            "whisper_session_start" => Self::VoiceSessionStart,
            "whisper_session_end" => Self::VoiceSessionEnd,
            "transcription_update" => Self::TranscriptionUpdate,
            "transcription_status" => Self::TranscriptionStatus,
            other => Self::Unknown(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NarrativeText => "narrative.text",
            Self::NarrativeChunk => "narrative.chunk",
            Self::NarrativeAction => "narrative.action",
            Self::ExpertCommand => "expert.command",
            Self::ExpertResponse => "expert.response",
            Self::StatusUpdate => "system.status_update",
            Self::Heartbeat => "system.heartbeat",
            Self::SystemLog => "system.log",
            Self::ConfigUpdate => "system.config_update",
            Self::VisualAsset => "visual.asset",
            Self::AudioStart => "tts_start",
            Self::AudioChunk => "tts_audio_chunk",
            Self::AudioEnd => "tts_end",
            Self::AudioError => "tts_error",
            Self::VoiceSessionStart => "whisper_session_start",
            Self::VoiceSessionEnd => "whisper_session_end",
            Self::TranscriptionUpdate => "transcription_update",
            Self::TranscriptionStatus => "transcription_status",
            Self::Unknown(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_map_back_to_their_wire_name() {
        for name in [
            "narrative.text",
            "narrative.chunk",
            "expert.response",
            "system.status_update",
            "visual.asset",
            "tts_audio_chunk",
            "transcription_update",
        ] {
            let kind = MessageKind::from_wire(name);
            assert!(!matches!(kind, MessageKind::Unknown(_)), "{name}");
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn unknown_type_is_preserved() {
        let kind = MessageKind::from_wire("agent.internal_note");
        assert_eq!(kind, MessageKind::Unknown("agent.internal_note".into()));
        assert_eq!(kind.as_str(), "agent.internal_note");
    }
}
