//! Surface runtime
//!
//! One task per UI surface. Hydrates its ledger from the coordinator at
//! startup, ingests live pushes, tracks visibility, runs the auto-read
//! timer, and keeps a badge count published on a watch channel for the
//! embedder to render.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Sleep};
use tracing::{debug, warn};

use crewlink_protocol::{Coordinator, PushMessage, Request, UnreadEntry};

use crate::ledger::NotificationLedger;

/// Delay between the surface becoming visible and auto-read firing
pub const AUTO_READ_DELAY: Duration = Duration::from_millis(2000);

/// Auto-read marks at most this many entries
pub const AUTO_READ_MAX: usize = 3;

enum SurfaceCommand {
    SetVisible(bool),
    MarkRead(String),
    MarkAllRead,
    Evict(String),
}

/// Renderer-facing event
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// The ledger changed; re-render
    Updated,
    /// A live update arrived; bring the surface to the user's attention
    Reveal,
}

/// Cloneable handle to a surface task
#[derive(Clone)]
pub struct SurfaceHandle {
    cmd_tx: mpsc::Sender<SurfaceCommand>,
    badge: watch::Receiver<usize>,
}

impl SurfaceHandle {
    /// Report a visibility change. Becoming visible arms the auto-read
    /// timer; becoming hidden cancels it.
    pub async fn set_visible(&self, visible: bool) {
        let _ = self.cmd_tx.send(SurfaceCommand::SetVisible(visible)).await;
    }

    /// Mark one thread's notification read
    pub async fn mark_read(&self, thread_id: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(SurfaceCommand::MarkRead(thread_id.into()))
            .await;
    }

    /// Mark every unread notification read
    pub async fn mark_all_read(&self) {
        let _ = self.cmd_tx.send(SurfaceCommand::MarkAllRead).await;
    }

    /// Remove a notification outright
    pub async fn evict(&self, thread_id: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(SurfaceCommand::Evict(thread_id.into()))
            .await;
    }

    /// Unread badge count, updated as the ledger changes
    pub fn badge(&self) -> watch::Receiver<usize> {
        self.badge.clone()
    }
}

/// The surface task state
pub struct Surface {
    coordinator: Arc<dyn Coordinator>,
    pushes: mpsc::Receiver<PushMessage>,
    ledger: NotificationLedger,
    visible: bool,
    auto_read: Option<Pin<Box<Sleep>>>,

    cmd_rx: mpsc::Receiver<SurfaceCommand>,
    events: mpsc::Sender<SurfaceEvent>,
    badge: watch::Sender<usize>,
}

impl Surface {
    /// Spawn the surface task. `pushes` is the receiver obtained when the
    /// embedder registered this surface with the router.
    pub fn spawn(
        coordinator: Arc<dyn Coordinator>,
        pushes: mpsc::Receiver<PushMessage>,
    ) -> (SurfaceHandle, mpsc::Receiver<SurfaceEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (event_tx, event_rx) = mpsc::channel(100);
        let (badge_tx, badge_rx) = watch::channel(0);

        let surface = Self {
            coordinator,
            pushes,
            ledger: NotificationLedger::new(),
            visible: false,
            auto_read: None,
            cmd_rx,
            events: event_tx,
            badge: badge_tx,
        };

        tokio::spawn(surface.run());
        (
            SurfaceHandle {
                cmd_tx,
                badge: badge_rx,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        self.hydrate().await;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        // All handles dropped
                        None => break,
                    }
                }

                push = self.pushes.recv() => {
                    match push {
                        Some(push) => self.handle_push(push).await,
                        // Router unregistered us
                        None => break,
                    }
                }

                _ = auto_read_due(&mut self.auto_read), if self.auto_read.is_some() => {
                    self.auto_read = None;
                    self.run_auto_read().await;
                }
            }
        }
    }

    /// Seed the ledger from the coordinator's persisted unread entries.
    /// Hydrated entries count toward the badge but never reveal the surface.
    async fn hydrate(&mut self) {
        let response = self.coordinator.request(Request::GetUnread).await;
        if !response.success {
            warn!(error = ?response.error, "Unread hydration failed");
            return;
        }
        let entries: Vec<UnreadEntry> = match response.data {
            Some(data) => match serde_json::from_value(data) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Discarding malformed unread entries: {}", e);
                    return;
                }
            },
            None => Vec::new(),
        };

        debug!(count = entries.len(), "Hydrated unread entries");
        for entry in entries {
            self.ledger
                .upsert(&entry.thread_id, entry.update, entry.timestamp, false);
        }
        self.publish().await;
    }

    async fn handle_command(&mut self, cmd: SurfaceCommand) {
        match cmd {
            SurfaceCommand::SetVisible(visible) => {
                self.visible = visible;
                if visible {
                    if self.ledger.unread_count() > 0 {
                        self.auto_read = Some(Box::pin(time::sleep(AUTO_READ_DELAY)));
                    }
                } else {
                    // Hiding cancels a pending auto-read
                    self.auto_read = None;
                }
            }

            SurfaceCommand::MarkRead(thread_id) => {
                if self.ledger.mark_as_read(&thread_id) {
                    self.notify_read(&thread_id).await;
                    self.publish().await;
                }
            }

            SurfaceCommand::MarkAllRead => {
                let marked = self.ledger.mark_all_as_read();
                for thread_id in &marked {
                    self.notify_read(thread_id).await;
                }
                if !marked.is_empty() {
                    self.publish().await;
                }
            }

            SurfaceCommand::Evict(thread_id) => {
                if self.ledger.evict(&thread_id) {
                    // The persisted entry goes with it
                    self.notify_read(&thread_id).await;
                    self.publish().await;
                }
            }
        }
    }

    async fn handle_push(&mut self, push: PushMessage) {
        match push {
            PushMessage::ThreadUpdate { thread_id, updates } => {
                let timestamp = updates.timestamp;
                let outcome = self.ledger.upsert(&thread_id, updates, timestamp, true);
                self.publish().await;
                if outcome.reveal {
                    let _ = self.events.send(SurfaceEvent::Reveal).await;
                }
            }
        }
    }

    /// Mark the most recent unread entries read, but only if the surface
    /// is still visible when the timer fires.
    async fn run_auto_read(&mut self) {
        if !self.visible {
            return;
        }
        let candidates = self.ledger.auto_read_candidates(AUTO_READ_MAX);
        if candidates.is_empty() {
            return;
        }
        debug!(count = candidates.len(), "Auto-read after visibility delay");
        for thread_id in &candidates {
            self.ledger.mark_as_read(thread_id);
            self.notify_read(thread_id).await;
        }
        self.publish().await;
    }

    /// Tell the coordinator so the persisted ledger entry drops
    async fn notify_read(&self, thread_id: &str) {
        let response = self
            .coordinator
            .request(Request::MarkRead {
                thread_id: thread_id.to_string(),
            })
            .await;
        if !response.success {
            warn!(%thread_id, error = ?response.error, "mark_read rejected");
        }
    }

    async fn publish(&mut self) {
        let _ = self.badge.send(self.ledger.unread_count());
        let _ = self.events.send(SurfaceEvent::Updated).await;
    }
}

async fn auto_read_due(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
