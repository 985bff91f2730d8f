//! Connection lifecycle state machine, free of any I/O.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Open
//!      ▲                        │                 │
//!      └──── retry (fixed) ◀────┴──── close ◀─────┘
//! ```
//!
//! A close schedules exactly one retry; further closes while a retry is
//! pending do not add timers.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    retry_at: Option<Instant>,
    delay: Duration,
}

impl Session {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: SessionState::Disconnected,
            retry_at: None,
            delay: reconnect_delay,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// When the pending reconnect is due, if any.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Move to `Connecting`.  Returns `false` (and changes nothing) when a
    /// connection is already in progress or open.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            SessionState::Connecting | SessionState::Open | SessionState::Closing => false,
            SessionState::Disconnected => {
                self.state = SessionState::Connecting;
                self.retry_at = None;
                true
            }
        }
    }

    pub fn opened(&mut self) {
        self.state = SessionState::Open;
        self.retry_at = None;
    }

    /// Transport closed (or a connect attempt failed).  Returns `true` if
    /// this call scheduled the reconnect.
    pub fn closed(&mut self, now: Instant) -> bool {
        let shutting_down = self.state == SessionState::Closing;
        self.state = SessionState::Disconnected;
        if shutting_down || self.retry_at.is_some() {
            return false;
        }
        self.retry_at = Some(now + self.delay);
        true
    }

    /// Consume the pending retry if it is due.
    pub fn take_retry(&mut self, now: Instant) -> bool {
        match self.retry_at {
            Some(at) if at <= now => {
                self.retry_at = None;
                true
            }
            _ => false,
        }
    }

    /// Start an orderly shutdown; no retry follows.
    pub fn begin_close(&mut self) {
        self.state = SessionState::Closing;
        self.retry_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Duration::from_secs(5))
    }

    #[test]
    fn connect_is_idempotent() {
        let mut s = session();
        assert!(s.begin_connect());
        assert!(!s.begin_connect());
        s.opened();
        assert!(!s.begin_connect());
        assert_eq!(s.state(), SessionState::Open);
    }

    #[test]
    fn close_schedules_one_retry_after_fixed_delay() {
        let mut s = session();
        let now = Instant::now();
        s.begin_connect();
        s.opened();

        assert!(s.closed(now));
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.retry_at(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn double_close_does_not_stack_timers() {
        let mut s = session();
        let now = Instant::now();
        s.begin_connect();
        s.opened();

        assert!(s.closed(now));
        assert!(!s.closed(now + Duration::from_secs(1)));
        assert_eq!(s.retry_at(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn retry_fires_once_when_due() {
        let mut s = session();
        let now = Instant::now();
        s.begin_connect();
        s.closed(now);

        assert!(!s.take_retry(now + Duration::from_secs(4)));
        assert!(s.take_retry(now + Duration::from_secs(5)));
        assert!(!s.take_retry(now + Duration::from_secs(6)));
        assert!(s.begin_connect());
    }

    #[test]
    fn delay_does_not_grow_across_failures() {
        let mut s = session();
        let mut now = Instant::now();
        for _ in 0..4 {
            s.begin_connect();
            s.closed(now);
            assert_eq!(s.retry_at(), Some(now + Duration::from_secs(5)));
            now += Duration::from_secs(5);
            assert!(s.take_retry(now));
        }
    }

    #[test]
    fn close_during_shutdown_does_not_retry() {
        let mut s = session();
        s.begin_connect();
        s.opened();
        s.begin_close();
        assert!(!s.closed(Instant::now()));
        assert_eq!(s.retry_at(), None);
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn manual_connect_cancels_pending_retry() {
        let mut s = session();
        s.begin_connect();
        s.closed(Instant::now());
        assert!(s.retry_at().is_some());
        assert!(s.begin_connect());
        assert_eq!(s.retry_at(), None);
    }
}
