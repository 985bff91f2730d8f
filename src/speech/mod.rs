//! Turn-taking: completed narrative turns are presented one at a time, each
//! held for a duration derived from its text length.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use avatar_sync::pipeline::new_shared_state;
//! use avatar_sync::speech::{SpeechQueue, TurnTiming};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (events_tx, _events_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let (speech, _task) =
//!         SpeechQueue::new(TurnTiming::default(), events_tx, new_shared_state()).spawn();
//!
//!     // speech.enqueue(turn) for each finalized utterance,
//!     // speech.clear() on barge-in.
//!     speech.clear();
//! }
//! ```

pub mod queue;
pub mod turn;

pub use queue::{SpeechCommand, SpeechHandle, SpeechQueue, TurnQueue};
pub use turn::{Turn, TurnStatus, TurnTiming};
