//! Transport seam for the persistent push connection
//!
//! A transport carries newline-delimited JSON text frames. The manager talks
//! to it through a pair of channels; the I/O itself runs on its own task so
//! a stalled socket never blocks the manager loop.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use url::Url;

use crewlink_utils::{CrewlinkError, Result};

/// Close code for an intentional, clean shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer vanishes without a clean close
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Longest accepted frame (1 MB)
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

/// Event surfaced by a transport to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One inbound text frame
    Frame(String),
    /// Fault that did not close the connection
    Error(String),
    /// Connection is gone; 1000 is clean, anything else is abnormal
    Closed { code: u16 },
}

/// Live transport: frames out, events in.
///
/// Dropping `tx` asks the I/O task to close the socket cleanly.
#[derive(Debug)]
pub struct TransportHandle {
    pub tx: mpsc::Sender<String>,
    pub rx: mpsc::Receiver<TransportEvent>,
}

/// Opens transports by URL. The connection manager owns a dialer so tests
/// can script the transport without touching the network.
pub trait Dialer: Send + Sync {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle>>;
}

/// Dialer for `tcp://host:port` and `unix://path` endpoints.
///
/// Credentials ride as a `token` query parameter appended by the caller;
/// there is no in-band auth handshake.
pub struct NetDialer;

impl Dialer for NetDialer {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle>> {
        let url = url.to_string();
        Box::pin(async move {
            let parsed = Url::parse(&url)
                .map_err(|e| CrewlinkError::connection(format!("Invalid URL '{}': {}", url, e)))?;

            let stream: Box<dyn StreamTrait> = match parsed.scheme() {
                "tcp" => {
                    let host = parsed
                        .host_str()
                        .ok_or_else(|| CrewlinkError::connection("Missing host in TCP URL"))?;
                    let port = parsed
                        .port()
                        .ok_or_else(|| CrewlinkError::connection("Missing port in TCP URL"))?;
                    let addr = format!("{}:{}", host, port);
                    let tcp = TcpStream::connect(&addr).await.map_err(|e| {
                        CrewlinkError::connection(format!("Failed to connect to {}: {}", addr, e))
                    })?;
                    Box::new(tcp)
                }
                "unix" => {
                    let path = PathBuf::from(parsed.path());
                    let unix = UnixStream::connect(&path).await.map_err(|e| {
                        CrewlinkError::connection(format!(
                            "Failed to connect to {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    Box::new(unix)
                }
                other => {
                    return Err(CrewlinkError::connection(format!(
                        "Unsupported scheme '{}'",
                        other
                    )))
                }
            };

            let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
            let (out_tx, out_rx) = mpsc::channel::<String>(100);
            let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(100);
            tokio::spawn(io_task(framed, out_rx, event_tx));

            Ok(TransportHandle {
                tx: out_tx,
                rx: event_rx,
            })
        })
    }
}

/// Background task that owns the socket I/O
async fn io_task(
    mut framed: Framed<Box<dyn StreamTrait>, LinesCodec>,
    mut outgoing: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
) {
    loop {
        tokio::select! {
            msg = outgoing.recv() => {
                match msg {
                    Some(frame) => {
                        if let Err(e) = framed.send(frame).await {
                            tracing::error!("Failed to send frame: {}", e);
                            let _ = events
                                .send(TransportEvent::Closed { code: CLOSE_ABNORMAL })
                                .await;
                            return;
                        }
                    }
                    None => {
                        // Owner hung up: close the socket cleanly
                        let _ = SinkExt::<String>::close(&mut framed).await;
                        let _ = events
                            .send(TransportEvent::Closed { code: CLOSE_NORMAL })
                            .await;
                        return;
                    }
                }
            }

            item = framed.next() => {
                match item {
                    Some(Ok(line)) => {
                        if events.send(TransportEvent::Frame(line)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        // Oversized or garbled line; the socket itself is still up
                        let _ = events.send(TransportEvent::Error(e.to_string())).await;
                    }
                    None => {
                        tracing::info!("Server closed connection");
                        let _ = events
                            .send(TransportEvent::Closed { code: CLOSE_ABNORMAL })
                            .await;
                        return;
                    }
                }
            }
        }
    }
}
