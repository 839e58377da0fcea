//! Cross-context messaging seam
//!
//! UI surfaces talk to the coordinator through this trait so the surface
//! crate never depends on the coordinator's internals (and tests can mock
//! the coordinator with a closure-backed stub).

use futures::future::BoxFuture;

use crate::envelope::{Request, Response};

/// Request/response channel to the coordinator.
///
/// Implementations must always produce a `Response`; transport failures
/// become an error envelope, never a hang.
pub trait Coordinator: Send + Sync {
    fn request(&self, request: Request) -> BoxFuture<'static, Response>;
}
