//! Duplex link to the agent backend with fixed-delay self-healing.
//!
//! [`Session`] is the pure lifecycle state machine; [`ConnectionManager`]
//! drives it over a `tokio-tungstenite` WebSocket and publishes
//! [`LinkEvent`]s.  Outbound sends are best effort: while the link is not
//! open they are logged and dropped.

pub mod manager;
pub mod session;

pub use manager::{ConnectionHandle, ConnectionManager, LinkError, LinkEvent};
pub use session::{Session, SessionState};
