//! crewlink-protocol: Shared message definitions for crewlink
//!
//! This crate defines the wire protocol spoken over the persistent push
//! socket, the request/response envelope used between UI surfaces and the
//! coordinator, and the data types both sides exchange.

pub mod bus;
pub mod envelope;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use bus::Coordinator;
pub use envelope::{PushMessage, Request, Response};
pub use types::{ConnectionState, Release, ThreadStatus, UnreadEntry, UpdatePayload};
pub use wire::WireMessage;
