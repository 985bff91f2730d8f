//! Turns and their presentation timing.

use std::time::Duration;

use crate::config::SpeechConfig;
use crate::stream::{Directive, Utterance};

/// Lifecycle of a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Queued,
    Active,
    Done,
}

/// One complete narrative utterance awaiting exclusive presentation.
///
/// Built only from finalized narrative content ([`Utterance`]), never from
/// raw chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub message_id: Option<String>,
    pub speaker: String,
    pub display_text: String,
    pub directive: Option<Directive>,
    /// Set when the turn becomes active.
    pub duration: Duration,
    pub status: TurnStatus,
}

impl From<Utterance> for Turn {
    fn from(u: Utterance) -> Self {
        Self {
            message_id: u.message_id,
            speaker: u.speaker,
            display_text: u.display_text,
            directive: u.directive,
            duration: Duration::ZERO,
            status: TurnStatus::Queued,
        }
    }
}

/// Maps cleaned text length to display time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTiming {
    pub per_char: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl TurnTiming {
    /// `clamp(chars * per_char, min, max)`.  Length is counted in Unicode
    /// scalar values, not bytes.
    pub fn duration_for(&self, display_text: &str) -> Duration {
        let chars = display_text.chars().count() as u32;
        let raw = self.per_char.saturating_mul(chars);
        raw.max(self.min).min(self.max.max(self.min))
    }
}

impl From<&SpeechConfig> for TurnTiming {
    fn from(cfg: &SpeechConfig) -> Self {
        Self {
            per_char: Duration::from_millis(cfg.per_char_ms),
            min: Duration::from_millis(cfg.min_ms),
            max: Duration::from_millis(cfg.max_ms),
        }
    }
}

impl Default for TurnTiming {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}
