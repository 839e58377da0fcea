//! Scripted transport for tests
//!
//! Each dial hands the "server side" of a channel pair back to the test,
//! which can then read frames the manager sent and feed events at it.

use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::transport::{Dialer, TransportEvent, TransportHandle};
use crewlink_utils::{CrewlinkError, Result};

/// Server side of a scripted transport
pub(crate) struct ServerSide {
    /// Frames the manager sent (subscribe, heartbeat, ...)
    pub from_mgr: mpsc::Receiver<String>,
    /// Feed transport events to the manager
    pub to_mgr: mpsc::Sender<TransportEvent>,
}

/// Dialer whose transports are channel pairs handed to the test
pub(crate) struct TestDialer {
    accepts: mpsc::UnboundedSender<ServerSide>,
    pub urls: Arc<Mutex<Vec<String>>>,
    pub fail_all: bool,
    pub dial_count: Arc<AtomicU32>,
}

impl TestDialer {
    pub fn new(accepts: mpsc::UnboundedSender<ServerSide>) -> Self {
        Self {
            accepts,
            urls: Arc::new(Mutex::new(Vec::new())),
            fail_all: false,
            dial_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(accepts: mpsc::UnboundedSender<ServerSide>) -> Self {
        let mut dialer = Self::new(accepts);
        dialer.fail_all = true;
        dialer
    }
}

impl Dialer for TestDialer {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle>> {
        self.urls.lock().unwrap().push(url.to_string());
        self.dial_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_all {
            return Box::pin(async { Err(CrewlinkError::connection("refused")) });
        }
        let (out_tx, out_rx) = mpsc::channel(100);
        let (ev_tx, ev_rx) = mpsc::channel(100);
        let _ = self.accepts.send(ServerSide {
            from_mgr: out_rx,
            to_mgr: ev_tx,
        });
        Box::pin(async move {
            Ok(TransportHandle {
                tx: out_tx,
                rx: ev_rx,
            })
        })
    }
}
