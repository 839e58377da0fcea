//! crewlink-coordinator: the background coordinator
//!
//! Owns the single persistent connection to the update server, the
//! credential lifecycle, the persisted unread ledger, and the dispatch
//! table every UI surface talks to.

pub mod api;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod notify;
pub mod router;
pub mod storage;
pub mod unread;

pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionManager};
pub use router::{Router, RouterHandle};
