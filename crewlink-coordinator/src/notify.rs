//! OS notification seam
//!
//! Fire-and-forget. The actual desktop integration lives with the embedder;
//! the default implementation just logs, which is also what CI wants.

use tracing::info;

/// Displays a notification to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Default notifier: log at info level
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notification");
    }
}
