//! Shared stage state.
//!
//! [`StageState`] is the polled counterpart of the [`super::StageEvent`]
//! stream: a UI that redraws on a timer reads it instead of folding events.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<StageState>>`, cheap to
//! clone and safe to share across tasks.  Never hold the lock across an
//! `.await`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::PlaybackStatus;
use crate::backend::AgentInfo;
use crate::link::SessionState;

// ---------------------------------------------------------------------------
// StageState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StageState {
    pub connection: SessionState,
    /// Input is accepted only while the link is open.
    pub ready: bool,
    /// A user request is awaiting its first answer.
    pub processing: bool,
    /// Speaker of the active turn, if any.
    pub active_speaker: Option<String>,
    /// Turns waiting behind the active one.
    pub queued_turns: usize,
    pub playback: PlaybackStatus,
    pub agents: Vec<AgentInfo>,
    /// Component health (`ws`, `brain`, `whisper`, ...).
    pub components: BTreeMap<String, String>,
    /// Last settings document fetched from the backend.
    pub backend_settings: Option<serde_json::Value>,
}

impl StageState {
    /// `true` while a turn is active or audio is playing.
    pub fn is_speaking(&self) -> bool {
        self.active_speaker.is_some() || self.playback == PlaybackStatus::Speaking
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

pub type SharedState = Arc<Mutex<StageState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(StageState::default()))
}

/// Lock `state`, recovering the data from a poisoned lock.
pub fn lock(state: &SharedState) -> MutexGuard<'_, StageState> {
    match state.lock() {
        Ok(s) => s,
        Err(p) => p.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
