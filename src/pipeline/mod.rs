//! Engine wiring: the orchestrator task, its output events and the shared
//! stage state.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager ──LinkEvent──▶ Orchestrator::run()  ← async tokio task
//!                                        │
//!                                        ├─ Dispatcher → Reassembler ─▶ SpeechQueue (own task)
//!                                        ├─ decode worker → PlaybackScheduler → PlaybackSink
//!                                        └─ status / history / backlog
//!                                        │
//!                                        ▼
//!                         StageEvent (mpsc) ──▶ rendering collaborator
//!
//! SharedState (Arc<Mutex<StageState>>) ←─── polled by a UI
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use avatar_sync::audio::{PlaybackSink, SimulatedOutput};
//! use avatar_sync::config::AppConfig;
//! use avatar_sync::link::ConnectionManager;
//! use avatar_sync::pipeline::{new_shared_state, Orchestrator};
//! use avatar_sync::speech::{SpeechQueue, TurnTiming};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let state = new_shared_state();
//!     let (stage_tx, mut stage_rx) = mpsc::unbounded_channel();
//!
//!     let (link_tx, link_rx) = mpsc::unbounded_channel();
//!     let (link, _) = ConnectionManager::new(&config.link, link_tx).spawn();
//!     let (speech, _) =
//!         SpeechQueue::new(TurnTiming::from(&config.speech), stage_tx.clone(), state.clone()).spawn();
//!
//!     let (notice_tx, notice_rx) = mpsc::unbounded_channel();
//!     let sink: Arc<dyn PlaybackSink> = Arc::new(SimulatedOutput::new(notice_tx));
//!
//!     let orchestrator = Orchestrator::new(&config, link.clone(), speech, sink, stage_tx, state);
//!     tokio::spawn(orchestrator.run(link_rx, notice_rx));
//!     link.connect().ok();
//!
//!     while let Some(event) = stage_rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

pub mod events;
pub mod history;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use events::StageEvent;
pub use history::DisplayLedger;
pub use runner::{Control, Orchestrator, OrchestratorHandle};
pub use state::{lock, new_shared_state, SharedState, StageState};
