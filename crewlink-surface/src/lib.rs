//! crewlink-surface: the UI-surface side of crewlink
//!
//! A bounded notification ledger modelling what one surface shows the user,
//! plus the surface runtime task: startup hydration from the coordinator,
//! push ingestion, visibility tracking with the auto-read timer, and a
//! badge count for the embedder to render.

pub mod ledger;
pub mod surface;

pub use ledger::{NotificationEntry, NotificationLedger, UpsertOutcome, NOTIFICATION_CAPACITY};
pub use surface::{Surface, SurfaceEvent, SurfaceHandle};
