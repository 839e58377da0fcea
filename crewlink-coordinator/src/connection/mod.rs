//! Connection manager for the persistent push socket
//!
//! A single task owns the transport, the subscription set, the outbound
//! queue, and every timer (reconnect backoff, heartbeat, per-thread
//! throttle). Everything reaches it through [`ConnectionHandle`] commands;
//! it reports back through [`ConnectionEvent`]s.

pub mod backoff;
pub mod queue;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, Sleep};
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info, trace, warn};
use url::Url;

use crewlink_protocol::{ConnectionState, UpdatePayload, WireMessage};

use queue::OutboundQueue;
use transport::{Dialer, TransportEvent, CLOSE_ABNORMAL, CLOSE_NORMAL};

/// Heartbeat cadence while connected
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Trailing-edge debounce window for same-thread update bursts
pub const THROTTLE_WINDOW: Duration = Duration::from_millis(500);

/// Command accepted by the manager task
#[derive(Debug)]
enum Command {
    Connect { credential: Option<String> },
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Send(WireMessage),
    State(oneshot::Sender<ConnectionState>),
}

/// Event emitted by the manager task
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// A throttled thread update: exactly one per burst, carrying the
    /// latest payload received within the window
    ThreadUpdate {
        thread_id: String,
        updates: UpdatePayload,
    },
    /// Transport fault that did not close the connection
    Fault(String),
    /// Reconnection attempts exhausted; the caller owns the fallback
    Exhausted,
}

/// Cloneable handle to the manager task
#[derive(Clone)]
pub struct ConnectionHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ConnectionHandle {
    /// Open the connection, optionally carrying a credential as a URL
    /// query parameter. No-op when already open or connecting.
    pub async fn connect(&self, credential: Option<String>) {
        let _ = self.cmd_tx.send(Command::Connect { credential }).await;
    }

    /// Close cleanly: cancels timers, clears the queue and subscription
    /// set, and suppresses reconnection.
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect).await;
    }

    /// Add a thread to the subscription set (idempotent)
    pub async fn subscribe(&self, thread_id: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(Command::Subscribe(thread_id.into()))
            .await;
    }

    /// Remove a thread from the subscription set
    pub async fn unsubscribe(&self, thread_id: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(Command::Unsubscribe(thread_id.into()))
            .await;
    }

    /// Best-effort send: transmits now when connected, queues otherwise
    pub async fn send(&self, msg: WireMessage) {
        let _ = self.cmd_tx.send(Command::Send(msg)).await;
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::State(tx)).await.is_err() {
            return ConnectionState::Disconnected;
        }
        rx.await.unwrap_or(ConnectionState::Disconnected)
    }
}

/// The manager task state. Constructed once by the router; `spawn` hands
/// back only the handle, so a second connection cannot exist.
pub struct ConnectionManager {
    endpoint: String,
    dialer: Box<dyn Dialer>,
    state: ConnectionState,
    credential: Option<String>,
    subscriptions: BTreeSet<String>,
    queue: OutboundQueue,

    transport_tx: Option<mpsc::Sender<String>>,
    transport_rx: Option<mpsc::Receiver<TransportEvent>>,

    attempts: u32,
    reconnect: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Interval>,
    throttle: DelayQueue<String>,
    pending: HashMap<String, (delay_queue::Key, UpdatePayload)>,

    cmd_rx: mpsc::Receiver<Command>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Spawn the manager task for `endpoint`
    pub fn spawn(
        endpoint: String,
        dialer: Box<dyn Dialer>,
    ) -> (ConnectionHandle, mpsc::Receiver<ConnectionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (event_tx, event_rx) = mpsc::channel(100);

        let manager = Self {
            endpoint,
            dialer,
            state: ConnectionState::Disconnected,
            credential: None,
            subscriptions: BTreeSet::new(),
            queue: OutboundQueue::default(),
            transport_tx: None,
            transport_rx: None,
            attempts: 0,
            reconnect: None,
            heartbeat: None,
            throttle: DelayQueue::new(),
            pending: HashMap::new(),
            cmd_rx,
            events: event_tx,
        };

        tokio::spawn(manager.run());
        (ConnectionHandle { cmd_tx }, event_rx)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        // All handles dropped
                        None => break,
                    }
                }

                ev = recv_transport(&mut self.transport_rx), if self.transport_rx.is_some() => {
                    match ev {
                        Some(ev) => self.handle_transport(ev).await,
                        // I/O task died without a close event
                        None => {
                            self.handle_transport(TransportEvent::Closed { code: CLOSE_ABNORMAL })
                                .await
                        }
                    }
                }

                _ = heartbeat_tick(&mut self.heartbeat), if self.heartbeat.is_some() => {
                    self.send_wire(&WireMessage::Heartbeat).await;
                }

                Some(expired) = self.throttle.next(), if !self.pending.is_empty() => {
                    let thread_id = expired.into_inner();
                    if let Some((_, updates)) = self.pending.remove(&thread_id) {
                        let _ = self
                            .events
                            .send(ConnectionEvent::ThreadUpdate { thread_id, updates })
                            .await;
                    }
                }

                _ = reconnect_due(&mut self.reconnect), if self.reconnect.is_some() => {
                    self.reconnect = None;
                    self.try_connect().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { credential } => {
                if credential.is_some() {
                    self.credential = credential;
                }
                match self.state {
                    ConnectionState::Connected | ConnectionState::Connecting => {}
                    _ => {
                        // Manual connect overrides a pending backoff timer
                        self.reconnect = None;
                        self.attempts = 0;
                        self.try_connect().await;
                    }
                }
            }

            Command::Disconnect => {
                self.teardown_timers();
                self.drop_transport();
                self.queue.clear();
                self.subscriptions.clear();
                self.set_state(ConnectionState::Disconnected).await;
            }

            Command::Subscribe(thread_id) => {
                if self.subscriptions.insert(thread_id.clone())
                    && self.state == ConnectionState::Connected
                {
                    self.send_wire(&WireMessage::Subscribe { thread_id }).await;
                }
            }

            Command::Unsubscribe(thread_id) => {
                if self.subscriptions.remove(&thread_id)
                    && self.state == ConnectionState::Connected
                {
                    self.send_wire(&WireMessage::Unsubscribe { thread_id }).await;
                }
            }

            Command::Send(msg) => {
                let sent = self.state == ConnectionState::Connected
                    && self.send_wire(&msg).await;
                if !sent && !self.queue.push(msg) {
                    warn!("Outbound queue full, dropping newest message");
                }
            }

            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
        }
    }

    async fn handle_transport(&mut self, ev: TransportEvent) {
        match ev {
            TransportEvent::Frame(text) => self.handle_frame(&text).await,

            TransportEvent::Error(e) => {
                warn!("Transport fault: {}", e);
                let _ = self.events.send(ConnectionEvent::Fault(e)).await;
            }

            TransportEvent::Closed { code } => {
                self.teardown_timers();
                self.drop_transport();
                if code == CLOSE_NORMAL {
                    info!("Connection closed cleanly");
                    self.set_state(ConnectionState::Disconnected).await;
                } else if self.state != ConnectionState::Reconnecting {
                    debug!(code, "Connection closed abnormally");
                    self.schedule_reconnect().await;
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        let msg = match WireMessage::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                // Malformed frames never close the connection
                warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        match msg {
            WireMessage::Heartbeat => {
                // Liveness detection is asymmetric: acks reset nothing
                trace!("Heartbeat ack");
            }
            WireMessage::ThreadUpdate { thread_id, updates } => {
                self.throttle_update(thread_id, updates);
            }
            WireMessage::Error { error } => {
                warn!("Server error frame: {}", error);
                let _ = self.events.send(ConnectionEvent::Fault(error)).await;
            }
            other => {
                debug!(?other, "Ignoring unexpected inbound message");
            }
        }
    }

    /// Trailing-edge debounce: a newer payload for the same thread resets
    /// the deadline and replaces the pending payload.
    fn throttle_update(&mut self, thread_id: String, updates: UpdatePayload) {
        match self.pending.get_mut(&thread_id) {
            Some((key, pending)) => {
                self.throttle.reset(key, THROTTLE_WINDOW);
                *pending = updates;
            }
            None => {
                let key = self.throttle.insert(thread_id.clone(), THROTTLE_WINDOW);
                self.pending.insert(thread_id, (key, updates));
            }
        }
    }

    async fn try_connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            return;
        }
        self.set_state(ConnectionState::Connecting).await;

        let url = build_url(&self.endpoint, self.credential.as_deref());
        match self.dialer.dial(&url).await {
            Ok(handle) => {
                info!(endpoint = %self.endpoint, "Connected");
                self.transport_tx = Some(handle.tx);
                self.transport_rx = Some(handle.rx);
                self.attempts = 0;
                self.heartbeat = Some(time::interval_at(
                    Instant::now() + HEARTBEAT_INTERVAL,
                    HEARTBEAT_INTERVAL,
                ));
                self.set_state(ConnectionState::Connected).await;
                self.reconcile_subscriptions().await;
                self.flush_queue().await;
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                self.schedule_reconnect().await;
            }
        }
    }

    /// The subscription set is the single source of truth: replay it on
    /// every successful (re)connection regardless of server-side state.
    async fn reconcile_subscriptions(&mut self) {
        for thread_id in self.subscriptions.clone() {
            self.send_wire(&WireMessage::Subscribe { thread_id }).await;
        }
    }

    async fn flush_queue(&mut self) {
        while let Some(msg) = self.queue.pop() {
            if !self.send_wire(&msg).await {
                self.queue.requeue_front(msg);
                break;
            }
        }
    }

    async fn schedule_reconnect(&mut self) {
        self.teardown_timers();
        self.drop_transport();

        self.attempts += 1;
        if self.attempts > backoff::MAX_ATTEMPTS {
            warn!(attempts = self.attempts - 1, "Reconnection attempts exhausted");
            self.set_state(ConnectionState::Failed).await;
            let _ = self.events.send(ConnectionEvent::Exhausted).await;
            return;
        }

        let delay = backoff::delay_for_attempt(self.attempts);
        debug!(attempt = self.attempts, ?delay, "Scheduling reconnect");
        self.set_state(ConnectionState::Reconnecting).await;
        self.reconnect = Some(Box::pin(time::sleep(delay)));
    }

    /// Cancel every pending timer so none fires into a stale context
    fn teardown_timers(&mut self) {
        self.heartbeat = None;
        self.reconnect = None;
        self.throttle.clear();
        self.pending.clear();
    }

    /// Dropping the sender asks the I/O task to close the socket
    fn drop_transport(&mut self) {
        self.transport_tx = None;
        self.transport_rx = None;
    }

    async fn send_wire(&mut self, msg: &WireMessage) -> bool {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode message: {}", e);
                return true;
            }
        };
        match &self.transport_tx {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }

    async fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            let _ = self
                .events
                .send(ConnectionEvent::StateChanged(state))
                .await;
        }
    }
}

fn build_url(endpoint: &str, credential: Option<&str>) -> String {
    match credential {
        Some(token) => match Url::parse(endpoint) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("token", token);
                url.to_string()
            }
            Err(_) => endpoint.to_string(),
        },
        None => endpoint.to_string(),
    }
}

async fn recv_transport(
    rx: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn heartbeat_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn reconnect_due(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
