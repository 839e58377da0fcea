//! Update router
//!
//! The hub of the coordinator: owns the connection manager, the credential
//! store and the unread ledger, dispatches action-tagged surface requests,
//! and fans throttled thread updates out to registered surfaces and the OS
//! notifier. Surfaces only ever hold a [`RouterHandle`], so a second router
//! (and with it a second push connection) cannot exist.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crewlink_protocol::{Coordinator, PushMessage, Request, Response, UpdatePayload};
use crewlink_utils::{CrewlinkError, Result};

use crate::api::BackendApi;
use crate::connection::{ConnectionEvent, ConnectionHandle};
use crate::credentials::CredentialStore;
use crate::notify::Notifier;
use crate::storage::{Namespace, Storage};
use crate::unread::UnreadLedger;

/// Per-thread dispatch throttle, applied after the connection manager's
/// own debounce window
pub const DISPATCH_THROTTLE: Duration = Duration::from_millis(1000);

/// Retained analytics events
pub const ANALYTICS_CAP: usize = 100;

/// Storage key for the analytics buffer (local namespace)
const ANALYTICS_KEY: &str = "analytics_events";

/// Per-surface push buffer depth
const SURFACE_BUFFER: usize = 32;

/// Identifies a registered surface for the lifetime of its registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(Uuid);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

enum RouterCommand {
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Register {
        url: String,
        reply: oneshot::Sender<Option<(SurfaceId, mpsc::Receiver<PushMessage>)>>,
    },
    Unregister(SurfaceId),
}

/// Cloneable handle to the router task
#[derive(Clone)]
pub struct RouterHandle {
    cmd_tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Dispatch a request and wait for its reply envelope. A router that
    /// has gone away yields an error envelope, never a hang.
    pub async fn request(&self, request: Request) -> Response {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RouterCommand::Request { request, reply: tx })
            .await
            .is_err()
        {
            return Response::err("coordinator unavailable");
        }
        rx.await
            .unwrap_or_else(|_| Response::err("coordinator unavailable"))
    }

    /// Register a surface for push fan-out. Returns `None` when the
    /// surface's URL is outside the allow-list or the router is gone.
    pub async fn register_surface(
        &self,
        url: impl Into<String>,
    ) -> Option<(SurfaceId, mpsc::Receiver<PushMessage>)> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(RouterCommand::Register {
                url: url.into(),
                reply: tx,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn unregister_surface(&self, id: SurfaceId) {
        let _ = self.cmd_tx.send(RouterCommand::Unregister(id)).await;
    }
}

impl Coordinator for RouterHandle {
    fn request(&self, request: Request) -> BoxFuture<'static, Response> {
        let handle = self.clone();
        Box::pin(async move { RouterHandle::request(&handle, request).await })
    }
}

struct SurfaceEntry {
    url: String,
    tx: mpsc::Sender<PushMessage>,
}

/// The router task state
pub struct Router {
    connection: ConnectionHandle,
    conn_events: mpsc::Receiver<ConnectionEvent>,
    storage: Arc<dyn Storage>,
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    credentials: CredentialStore,
    unread: UnreadLedger,
    allowed_surface_urls: Vec<String>,
    surfaces: HashMap<SurfaceId, SurfaceEntry>,

    dispatch: DelayQueue<String>,
    pending: HashMap<String, (delay_queue::Key, UpdatePayload)>,

    cmd_rx: mpsc::Receiver<RouterCommand>,
}

impl Router {
    /// Spawn the router task and hand back its handle
    pub fn spawn(
        connection: ConnectionHandle,
        conn_events: mpsc::Receiver<ConnectionEvent>,
        storage: Arc<dyn Storage>,
        api: Arc<dyn BackendApi>,
        notifier: Arc<dyn Notifier>,
        allowed_surface_urls: Vec<String>,
    ) -> RouterHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let credentials = CredentialStore::load(storage.clone());
        let unread = UnreadLedger::load(&storage);

        let router = Self {
            connection,
            conn_events,
            storage,
            api,
            notifier,
            credentials,
            unread,
            allowed_surface_urls,
            surfaces: HashMap::new(),
            dispatch: DelayQueue::new(),
            pending: HashMap::new(),
            cmd_rx,
        };

        tokio::spawn(router.run());
        RouterHandle { cmd_tx }
    }

    async fn run(mut self) {
        // A persisted bearer token means a prior session authenticated;
        // open the push connection without waiting for a surface to ask.
        if let Some(bearer) = self.credentials.bearer().map(str::to_string) {
            info!("Bearer token on record, opening push connection");
            self.connection.connect(Some(bearer)).await;
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        // All handles dropped
                        None => break,
                    }
                }

                ev = self.conn_events.recv() => {
                    match ev {
                        Some(ev) => self.handle_connection_event(ev).await,
                        None => break,
                    }
                }

                Some(expired) = self.dispatch.next(), if !self.pending.is_empty() => {
                    let thread_id = expired.into_inner();
                    if let Some((_, updates)) = self.pending.remove(&thread_id) {
                        self.dispatch_update(thread_id, updates);
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::Request { request, reply } => {
                let response = self.handle_request(request).await;
                let _ = reply.send(response);
            }
            RouterCommand::Register { url, reply } => {
                let _ = reply.send(self.register_surface(url));
            }
            RouterCommand::Unregister(id) => {
                debug!(%id, "Surface unregistered");
                self.surfaces.remove(&id);
            }
        }
    }

    /// Surfaces are admitted by URL prefix; anything else is refused so a
    /// compromised page cannot attach itself to the push stream.
    fn register_surface(
        &mut self,
        url: String,
    ) -> Option<(SurfaceId, mpsc::Receiver<PushMessage>)> {
        if !self
            .allowed_surface_urls
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
        {
            warn!(%url, "Refusing surface registration outside the allow-list");
            return None;
        }
        let id = SurfaceId(Uuid::new_v4());
        let (tx, rx) = mpsc::channel(SURFACE_BUFFER);
        debug!(%id, %url, "Surface registered");
        self.surfaces.insert(id, SurfaceEntry { url, tx });
        Some((id, rx))
    }

    async fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::Authenticate { token } => {
                if let Err(e) = self.credentials.set_bearer(token.clone()) {
                    return Response::err(e.to_string());
                }
                self.connection.connect(Some(token)).await;
                Response::ok_empty()
            }

            Request::Search {
                query,
                season,
                episode,
            } => {
                let bearer = match self.bearer() {
                    Ok(bearer) => bearer,
                    Err(e) => return Response::err(e.to_string()),
                };
                match self.api.search(&bearer, &query, season, episode).await {
                    Ok(results) => Response::ok(results),
                    Err(e) => Response::err(e.to_string()),
                }
            }

            Request::GetStatus { thread_id } => {
                let bearer = match self.bearer() {
                    Ok(bearer) => bearer,
                    Err(e) => return Response::err(e.to_string()),
                };
                match self.api.thread_status(&bearer, &thread_id).await {
                    Ok(status) => match serde_json::to_value(status) {
                        Ok(data) => Response::ok(data),
                        Err(e) => Response::err(e.to_string()),
                    },
                    Err(e) => Response::err(e.to_string()),
                }
            }

            Request::Like { thread_id } => self.set_like(&thread_id, true).await,
            Request::Unlike { thread_id } => self.set_like(&thread_id, false).await,

            Request::RefreshThread { thread_id } => {
                let (bearer, forgery) = match self.state_changing_credentials().await {
                    Ok(pair) => pair,
                    Err(e) => return Response::err(e.to_string()),
                };
                match self.api.refresh_thread(&bearer, &forgery, &thread_id).await {
                    Ok(data) => Response::ok(data),
                    Err(e) => Response::err(e.to_string()),
                }
            }

            Request::RecordEvent { name, data } => self.record_event(name, data),

            Request::Subscribe { thread_id } => {
                self.connection.subscribe(thread_id).await;
                Response::ok_empty()
            }

            Request::Unsubscribe { thread_id } => {
                self.connection.unsubscribe(thread_id).await;
                Response::ok_empty()
            }

            Request::ConnectionStatus => {
                let state = self.connection.state().await;
                match serde_json::to_value(state) {
                    Ok(data) => Response::ok(data),
                    Err(e) => Response::err(e.to_string()),
                }
            }

            Request::MarkRead { thread_id } => {
                if self.unread.remove(&thread_id) {
                    if let Err(e) = self.unread.persist(&self.storage) {
                        warn!("Failed to persist unread ledger: {}", e);
                    }
                }
                Response::ok_empty()
            }

            Request::GetUnread => match serde_json::to_value(self.unread.entries()) {
                Ok(data) => Response::ok(data),
                Err(e) => Response::err(e.to_string()),
            },
        }
    }

    fn bearer(&self) -> Result<String> {
        self.credentials
            .bearer()
            .map(str::to_string)
            .ok_or_else(|| CrewlinkError::auth("not authenticated"))
    }

    /// Bearer plus a guaranteed-fresh anti-forgery token. A refresh failure
    /// aborts the state-changing call before it reaches the backend.
    async fn state_changing_credentials(&mut self) -> Result<(String, String)> {
        let bearer = self.bearer()?;
        let forgery = self
            .credentials
            .fresh_forgery_token(self.api.as_ref())
            .await?;
        Ok((bearer, forgery))
    }

    async fn set_like(&mut self, thread_id: &str, like: bool) -> Response {
        let (bearer, forgery) = match self.state_changing_credentials().await {
            Ok(pair) => pair,
            Err(e) => return Response::err(e.to_string()),
        };
        match self.api.set_like(&bearer, &forgery, thread_id, like).await {
            Ok(data) => Response::ok(data),
            Err(e) => Response::err(e.to_string()),
        }
    }

    fn record_event(&mut self, name: String, data: Value) -> Response {
        let mut events = self
            .storage
            .get(Namespace::Local, ANALYTICS_KEY)
            .ok()
            .flatten()
            .and_then(|v| match v {
                Value::Array(events) => Some(events),
                _ => None,
            })
            .unwrap_or_default();

        events.push(json!({
            "name": name,
            "data": data,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }));
        if events.len() > ANALYTICS_CAP {
            let overflow = events.len() - ANALYTICS_CAP;
            events.drain(..overflow);
        }

        match self
            .storage
            .set(Namespace::Local, ANALYTICS_KEY, Value::Array(events))
        {
            Ok(()) => Response::ok_empty(),
            Err(e) => Response::err(e.to_string()),
        }
    }

    async fn handle_connection_event(&mut self, ev: ConnectionEvent) {
        match ev {
            ConnectionEvent::ThreadUpdate { thread_id, updates } => {
                // Record first: the ledger survives a crash, the fan-out
                // does not.
                let now = chrono::Utc::now().timestamp_millis();
                self.unread.upsert(&thread_id, updates.clone(), now);
                if let Err(e) = self.unread.persist(&self.storage) {
                    warn!("Failed to persist unread ledger: {}", e);
                }
                self.throttle_dispatch(thread_id, updates);
            }
            ConnectionEvent::StateChanged(state) => {
                debug!(?state, "Push connection state changed");
            }
            ConnectionEvent::Exhausted => {
                warn!("Push connection gave up; waiting for a manual reconnect");
            }
            ConnectionEvent::Fault(e) => {
                debug!("Push connection fault: {}", e);
            }
        }
    }

    /// Trailing-edge throttle on top of the connection manager's debounce:
    /// a newer payload for the same thread resets the deadline and wins.
    fn throttle_dispatch(&mut self, thread_id: String, updates: UpdatePayload) {
        match self.pending.get_mut(&thread_id) {
            Some((key, pending)) => {
                self.dispatch.reset(key, DISPATCH_THROTTLE);
                *pending = updates;
            }
            None => {
                let key = self.dispatch.insert(thread_id.clone(), DISPATCH_THROTTLE);
                self.pending.insert(thread_id, (key, updates));
            }
        }
    }

    fn dispatch_update(&mut self, thread_id: String, updates: UpdatePayload) {
        let push = PushMessage::ThreadUpdate {
            thread_id: thread_id.clone(),
            updates: updates.clone(),
        };

        // Fan out to every registered surface; one surface's failure never
        // reaches the others. A closed channel means the surface went away.
        self.surfaces.retain(|id, surface| {
            match surface.tx.try_send(push.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(%id, url = %surface.url, "Dropping surface that went away");
                    false
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%id, url = %surface.url, "Surface push buffer full, dropping update");
                    true
                }
            }
        });

        let releases = updates.release_count();
        if releases > 0 {
            let title = updates
                .title
                .clone()
                .unwrap_or_else(|| format!("Thread {thread_id}"));
            self.notifier.notify(&title, &format!("{releases} new release(s)"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{ServerSide, TestDialer};
    use crate::connection::ConnectionManager;
    use crate::connection::transport::TransportEvent;
    use crate::storage::MemoryStorage;
    use crewlink_protocol::ThreadStatus;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::{self, Duration};

    struct MockApi {
        forgery_fetches: AtomicU32,
        fail_forgery: bool,
        likes: Mutex<Vec<(String, bool)>>,
    }

    impl MockApi {
        fn new() -> Self {
            Self {
                forgery_fetches: AtomicU32::new(0),
                fail_forgery: false,
                likes: Mutex::new(Vec::new()),
            }
        }

        fn failing_forgery() -> Self {
            let mut api = Self::new();
            api.fail_forgery = true;
            api
        }
    }

    impl BackendApi for MockApi {
        fn fetch_forgery_token(&self, _bearer: &str) -> BoxFuture<'static, Result<String>> {
            if self.fail_forgery {
                return Box::pin(async { Err(CrewlinkError::api("backend down")) });
            }
            let n = self.forgery_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move { Ok(format!("forge-{n}")) })
        }

        fn search(
            &self,
            _: &str,
            query: &str,
            _: Option<u32>,
            _: Option<u32>,
        ) -> BoxFuture<'static, Result<Value>> {
            let query = query.to_string();
            Box::pin(async move { Ok(json!({ "query": query, "results": [] })) })
        }

        fn thread_status(
            &self,
            _: &str,
            thread_id: &str,
        ) -> BoxFuture<'static, Result<ThreadStatus>> {
            let thread_id = thread_id.to_string();
            Box::pin(async move {
                Ok(ThreadStatus {
                    thread_id,
                    like_count: 4,
                    user_liked: Some(false),
                    last_updated: None,
                })
            })
        }

        fn set_like(
            &self,
            _: &str,
            _: &str,
            thread_id: &str,
            like: bool,
        ) -> BoxFuture<'static, Result<Value>> {
            self.likes.lock().unwrap().push((thread_id.to_string(), like));
            Box::pin(async { Ok(json!({ "likeCount": 5 })) })
        }

        fn refresh_thread(&self, _: &str, _: &str, _: &str) -> BoxFuture<'static, Result<Value>> {
            Box::pin(async { Ok(json!({ "refreshed": true })) })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<(String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) {
            self.shown
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
        }
    }

    struct Harness {
        handle: RouterHandle,
        accepts: mpsc::UnboundedReceiver<ServerSide>,
        urls: Arc<std::sync::Mutex<Vec<String>>>,
        api: Arc<MockApi>,
        notifier: Arc<RecordingNotifier>,
        storage: Arc<dyn Storage>,
    }

    fn harness_with(storage: Arc<dyn Storage>, api: Arc<MockApi>) -> Harness {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let dialer = TestDialer::new(accept_tx);
        let urls = dialer.urls.clone();
        let (connection, conn_events) =
            ConnectionManager::spawn("tcp://push.example:9000".into(), Box::new(dialer));
        let notifier = Arc::new(RecordingNotifier::default());
        let handle = Router::spawn(
            connection,
            conn_events,
            storage.clone(),
            api.clone(),
            notifier.clone(),
            vec!["https://media.example".into()],
        );
        Harness {
            handle,
            accepts: accept_rx,
            urls,
            api,
            notifier,
            storage,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryStorage::new()), Arc::new(MockApi::new()))
    }

    fn update_frame(thread_id: &str, like_count: u64) -> TransportEvent {
        TransportEvent::Frame(format!(
            r#"{{"type":"thread_update","threadId":"{thread_id}","updates":{{"likeCount":{like_count},"timestamp":1}}}}"#
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn push_reaches_surface_and_notifier_end_to_end() {
        let mut h = harness();
        let (_id, mut push_rx) = h
            .handle
            .register_surface("https://media.example/page")
            .await
            .unwrap();

        let resp = h
            .handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        assert!(resp.success);

        let mut server = h.accepts.recv().await.unwrap();
        h.handle
            .request(Request::Subscribe {
                thread_id: "12345".into(),
            })
            .await;
        let frame = server.from_mgr.recv().await.unwrap();
        assert_eq!(frame, r#"{"type":"subscribe","threadId":"12345"}"#);

        server
            .to_mgr
            .send(TransportEvent::Frame(
                r#"{"type":"thread_update","threadId":"12345","updates":{"newReleases":[{"title":"S01E01"}],"timestamp":1}}"#
                    .into(),
            ))
            .await
            .unwrap();

        // One push after both throttle stages (500ms + 1000ms)
        let push = time::timeout(Duration::from_secs(2), push_rx.recv())
            .await
            .expect("no push within the throttle windows")
            .unwrap();
        match push {
            PushMessage::ThreadUpdate { thread_id, updates } => {
                assert_eq!(thread_id, "12345");
                assert_eq!(updates.release_count(), 1);
            }
        }
        let extra = time::timeout(Duration::from_secs(2), push_rx.recv()).await;
        assert!(extra.is_err(), "single update produced more than one push");

        let shown = h.notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "Thread 12345");
        assert_eq!(shown[0].1, "1 new release(s)");
    }

    #[tokio::test(start_paused = true)]
    async fn surface_outside_allow_list_is_refused() {
        let h = harness();
        assert!(h
            .handle
            .register_surface("https://evil.example/page")
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn authenticate_persists_bearer_and_connects() {
        let mut h = harness();
        let resp = h
            .handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        assert!(resp.success);

        let _server = h.accepts.recv().await.unwrap();
        assert!(h.urls.lock().unwrap()[0].contains("token=abc123"));
        assert_eq!(
            h.storage.get(Namespace::Sync, "bearer_token").unwrap(),
            Some(json!("abc123"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn eager_connect_when_bearer_already_persisted() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage
            .set(Namespace::Sync, "bearer_token", json!("persisted"))
            .unwrap();

        let mut h = harness_with(storage, Arc::new(MockApi::new()));
        let _server = h.accepts.recv().await.unwrap();
        assert!(h.urls.lock().unwrap()[0].contains("token=persisted"));
    }

    #[tokio::test(start_paused = true)]
    async fn like_reuses_cached_forgery_token() {
        let mut h = harness();
        h.handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        let _server = h.accepts.recv().await.unwrap();

        for _ in 0..2 {
            let resp = h
                .handle
                .request(Request::Like {
                    thread_id: "7".into(),
                })
                .await;
            assert!(resp.success);
        }
        let resp = h
            .handle
            .request(Request::Unlike {
                thread_id: "7".into(),
            })
            .await;
        assert!(resp.success);

        assert_eq!(h.api.forgery_fetches.load(Ordering::SeqCst), 1);
        let likes = h.api.likes.lock().unwrap();
        assert_eq!(
            *likes,
            vec![
                ("7".to_string(), true),
                ("7".to_string(), true),
                ("7".to_string(), false)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn forgery_refresh_failure_aborts_the_like() {
        let mut h = harness_with(
            Arc::new(MemoryStorage::new()),
            Arc::new(MockApi::failing_forgery()),
        );
        h.handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        let _server = h.accepts.recv().await.unwrap();

        let resp = h
            .handle
            .request(Request::Like {
                thread_id: "7".into(),
            })
            .await;
        assert!(!resp.success);
        assert!(h.api.likes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unauthenticated_requests_get_error_envelopes() {
        let h = harness();
        for request in [
            Request::Search {
                query: "show".into(),
                season: None,
                episode: None,
            },
            Request::GetStatus {
                thread_id: "7".into(),
            },
            Request::Like {
                thread_id: "7".into(),
            },
        ] {
            let resp = h.handle.request(request).await;
            assert!(!resp.success);
            assert!(resp.error.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn update_lands_in_unread_ledger_and_mark_read_drops_it() {
        let mut h = harness();
        h.handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        let server = h.accepts.recv().await.unwrap();
        server.to_mgr.send(update_frame("12345", 3)).await.unwrap();

        // Let both throttle stages elapse
        time::sleep(Duration::from_secs(2)).await;

        let resp = h.handle.request(Request::GetUnread).await;
        let data = resp.data.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 1);
        assert_eq!(data[0]["threadId"], "12345");
        assert_eq!(data[0]["unread"], true);

        h.handle
            .request(Request::MarkRead {
                thread_id: "12345".into(),
            })
            .await;
        let resp = h.handle.request(Request::GetUnread).await;
        assert!(resp.data.unwrap().as_array().unwrap().is_empty());
        // And the persisted copy agrees
        let stored = h.storage.get(Namespace::Local, "unread_ledger").unwrap();
        assert_eq!(stored, Some(json!([])));
    }

    #[tokio::test(start_paused = true)]
    async fn second_stage_throttle_coalesces_spaced_updates() {
        let mut h = harness();
        let (_id, mut push_rx) = h
            .handle
            .register_surface("https://media.example/page")
            .await
            .unwrap();
        h.handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        let server = h.accepts.recv().await.unwrap();

        // 600ms apart: past the connection debounce, inside the router's
        // own 1000ms window
        server.to_mgr.send(update_frame("T1", 1)).await.unwrap();
        time::sleep(Duration::from_millis(600)).await;
        server.to_mgr.send(update_frame("T1", 2)).await.unwrap();

        let push = time::timeout(Duration::from_secs(3), push_rx.recv())
            .await
            .expect("no push emitted")
            .unwrap();
        match push {
            PushMessage::ThreadUpdate { updates, .. } => {
                assert_eq!(updates.like_count, Some(2));
            }
        }
        let extra = time::timeout(Duration::from_secs(2), push_rx.recv()).await;
        assert!(extra.is_err(), "coalesced burst produced two pushes");
    }

    #[tokio::test(start_paused = true)]
    async fn record_event_caps_the_buffer() {
        let h = harness();
        for n in 0..(ANALYTICS_CAP + 1) {
            let resp = h
                .handle
                .request(Request::RecordEvent {
                    name: format!("e{n}"),
                    data: Value::Null,
                })
                .await;
            assert!(resp.success);
        }

        let stored = h
            .storage
            .get(Namespace::Local, "analytics_events")
            .unwrap()
            .unwrap();
        let events = stored.as_array().unwrap();
        assert_eq!(events.len(), ANALYTICS_CAP);
        // The earliest event was dropped
        assert_eq!(events[0]["name"], "e1");
        assert_eq!(events[ANALYTICS_CAP - 1]["name"], format!("e{ANALYTICS_CAP}"));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_status_reports_state() {
        let h = harness();
        let resp = h.handle.request(Request::ConnectionStatus).await;
        assert_eq!(resp.data, Some(json!("disconnected")));
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_surface_stops_receiving_pushes() {
        let mut h = harness();
        let (id, mut push_rx) = h
            .handle
            .register_surface("https://media.example/page")
            .await
            .unwrap();
        h.handle.unregister_surface(id).await;

        h.handle
            .request(Request::Authenticate {
                token: "abc123".into(),
            })
            .await;
        let server = h.accepts.recv().await.unwrap();
        server.to_mgr.send(update_frame("T1", 1)).await.unwrap();

        let extra = time::timeout(Duration::from_secs(3), push_rx.recv()).await;
        // Channel closed (sender dropped at unregister), not a push
        assert!(matches!(extra, Ok(None)));
    }
}
