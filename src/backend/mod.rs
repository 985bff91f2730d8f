//! HTTP collaborator: agent roster, history backlog and global config.
//!
//! ```text
//! GET /api/agents   → Vec<AgentInfo>     (empty list = warming up)
//! GET /api/history  → Vec<HistoryEntry>  ({"status":"connecting"} = warming up)
//! GET /api/config   → serde_json::Value
//! ```
//!
//! Calls through [`BackendApi`] are single attempts; wrap them in a
//! [`RetryPolicy`] to ride out backend start-up.

pub mod client;
pub mod retry;
pub mod types;

pub use client::{BackendApi, BackendError, HttpBackend};
pub use retry::RetryPolicy;
pub use types::{parse_agents, parse_history, AgentInfo, HistoryEntry};
