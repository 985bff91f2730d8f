//! Real-time synchronization engine for a speaking character.
//!
//! Independently arriving text, audio and status events from an agent
//! backend are merged into a strictly serialized turn-taking presentation
//! and gapless audio playback, over a link that heals itself.
//!
//! | Module | Role |
//! |--------|------|
//! | [`link`] | WebSocket session with fixed-delay reconnect |
//! | [`protocol`] | Wire envelope and message routing |
//! | [`stream`] | Chunk reassembly and `[name:value]` directive extraction |
//! | [`speech`] | Turn scheduler (one active speaker at a time) |
//! | [`audio`] | Decoding and device-clock playback scheduling |
//! | [`backend`] | HTTP roster/history collaborator |
//! | [`pipeline`] | Orchestrator task, stage events and shared state |
//! | [`config`] | TOML settings |

pub mod audio;
pub mod backend;
pub mod config;
pub mod link;
pub mod pipeline;
pub mod protocol;
pub mod speech;
pub mod stream;
