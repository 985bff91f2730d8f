//! Backend bus protocol: the JSON envelope, its declared message types, and
//! the dispatcher that routes each inbound message to the stream
//! reassembler, the playback scheduler or the status sink.
//!
//! ```text
//! raw text frame ──parse──▶ Envelope ──route──▶ Route::Stream  → stream::Reassembler
//!                                             ├─ Route::Audio   → audio::PlaybackScheduler
//!                                             ├─ Route::Status  → StageEvent (status sink)
//!                                             └─ Route::History → StageEvent (history view)
//! ```

pub mod dispatch;
pub mod envelope;
pub mod kind;

pub use dispatch::{
    AgentStatus, AudioInput, Dispatcher, HistoryInput, ParseError, Route, StatusInput,
    StreamInput, VisualAsset,
};
pub use envelope::{Envelope, Metadata, Payload, Recipient, Sender};
pub use kind::MessageKind;
