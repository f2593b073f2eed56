//! Transaction-correlated transport over a persistent WebSocket
//!
//! All requests share one socket. Each request is stamped with a fresh
//! transaction id and parked in a pending map before the frame is written, so
//! a reply can never race its own registration. Replies resolve by removing
//! the entry, which makes double resolution impossible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::signaling::protocol::{
    ClientRequest, FrameKind, Jsep, RequestKind, ServerFrame, TrickleCandidate, WS_SUBPROTOCOL,
};

/// Event surfaced to the layer above the transport
#[derive(Debug)]
pub enum SignalEvent {
    /// Unsolicited frame that belongs to the room layer
    Frame(ServerFrame),

    /// The socket is gone and all in-flight requests have been failed
    Down {
        /// Why the transport considers the connection lost
        reason: String,
    },
}

/// Per-request send options
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Handle to scope the request to
    pub handle_id: Option<u64>,

    /// Treat a bare ack as a receipt and keep waiting for the plugin event
    pub ignore_ack: bool,

    /// Override the transport-wide reply timeout
    pub timeout: Option<Duration>,
}

impl SendOptions {
    /// Options for an async plugin request on the given handle
    pub fn plugin(handle_id: u64) -> Self {
        Self {
            handle_id: Some(handle_id),
            ignore_ack: true,
            timeout: None,
        }
    }

    /// Options for a synchronous plugin request on the given handle
    pub fn sync(handle_id: u64) -> Self {
        Self {
            handle_id: Some(handle_id),
            ignore_ack: false,
            timeout: None,
        }
    }
}

/// A request waiting for its reply
struct PendingRequest {
    reply: oneshot::Sender<ServerFrame>,
    ignore_ack: bool,
    label: String,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingRequest>>>;
type WriterSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

/// Correlated request transport over one WebSocket connection
///
/// The transport can be reconnected any number of times. Each successful
/// `connect` starts a new connection generation; the reader task of a stale
/// generation cannot disturb the current one.
pub struct SignalTransport {
    url: String,
    token: Option<String>,
    request_timeout: Duration,
    writer: WriterSlot,
    pending: PendingMap,
    events: mpsc::UnboundedSender<SignalEvent>,
    session_id: AtomicU64,
    generation: Arc<AtomicU64>,
}

impl SignalTransport {
    /// Create a transport for the given gateway URL
    ///
    /// No connection is made until `connect` is called. Unsolicited frames
    /// and drop notifications are delivered on `events`.
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        request_timeout: Duration,
        events: mpsc::UnboundedSender<SignalEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            request_timeout,
            writer: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
            session_id: AtomicU64::new(0),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the WebSocket and start the reader and writer tasks
    ///
    /// Replaces any previous connection. In-flight requests from a previous
    /// generation are not failed here; they already were when that
    /// generation's socket died.
    pub async fn connect(&self) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Ask the previous socket, if any, to close. Its reader is stale now
        // and will not touch the writer slot or the pending map.
        if let Some(old) = self.writer.lock().await.take() {
            let _ = old.send(Message::Close(None));
        }

        let mut request = self.url.as_str().into_client_request().map_err(|e| {
            Error::WebSocketError(format!("Invalid gateway URL {}: {}", self.url, e))
        })?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(WS_SUBPROTOCOL),
        );

        info!("Connecting to gateway at {}", self.url);
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.writer.lock().await = Some(tx);

        // Writer task: drains the outbound queue into the socket
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if write.send(message).await.is_err() {
                    debug!("Writer task exiting, socket closed");
                    break;
                }
            }
        });

        // Reader task: routes frames until the socket dies, then fails
        // whatever is still in flight and reports the drop exactly once.
        let pending = self.pending.clone();
        let events = self.events.clone();
        let writer = self.writer.clone();
        let generation_counter = self.generation.clone();
        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match ServerFrame::from_json(&text) {
                        Ok(frame) => route_frame(frame, &pending, &events).await,
                        Err(e) => warn!("Discarding unparseable frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) => break "closed by gateway".to_string(),
                    Some(Ok(_)) => {
                        // Ping, pong and binary frames carry no signaling
                    }
                    Some(Err(e)) => break format!("socket error: {}", e),
                    None => break "socket ended".to_string(),
                }
            };

            if generation_counter.load(Ordering::SeqCst) != generation {
                debug!("Reader of stale connection exiting: {}", reason);
                return;
            }

            writer.lock().await.take();
            let mut map = pending.lock().await;
            for (_, request) in map.drain() {
                debug!("Failing in-flight '{}' after transport loss", request.label);
            }
            drop(map);

            warn!("Signaling transport down: {}", reason);
            let _ = events.send(SignalEvent::Down { reason });
        });

        Ok(())
    }

    /// Close the socket and fail all in-flight requests
    ///
    /// Deliberate shutdown advances the generation first, so the reader of
    /// the closing socket exits quietly instead of reporting a drop.
    pub async fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.send(Message::Close(None));
        }
        self.pending.lock().await.clear();
        debug!("Signaling transport shut down");
    }

    /// Check whether a connection is currently open
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Remember the gateway session all further requests are scoped to
    pub fn set_session(&self, id: u64) {
        self.session_id.store(id, Ordering::SeqCst);
    }

    /// Forget the gateway session
    pub fn clear_session(&self) {
        self.session_id.store(0, Ordering::SeqCst);
    }

    /// The gateway session requests are scoped to, if one was created
    pub fn session_id(&self) -> Option<u64> {
        match self.session_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Send a correlated request and wait for its terminal reply
    ///
    /// The reply is the first non-ack frame echoing our transaction, or the
    /// ack itself when `ignore_ack` is not set. Frames carrying a gateway
    /// error, top-level or inside the plugin payload, come back as `Err`.
    pub async fn send(
        &self,
        kind: RequestKind,
        body: Option<serde_json::Value>,
        jsep: Option<Jsep>,
        opts: SendOptions,
    ) -> Result<ServerFrame> {
        let label = match body.as_ref().and_then(|b| b.get("request")).and_then(|r| r.as_str()) {
            Some(request) => format!("{} {}", kind.as_str(), request),
            None => kind.as_str().to_string(),
        };

        let mut request = ClientRequest::new(kind, String::new());
        request.handle_id = opts.handle_id;
        request.body = body;
        request.jsep = jsep;

        self.request_reply(request, label, opts.ignore_ack, opts.timeout)
            .await
    }

    /// Attach the room plugin and return the allocated handle id
    pub async fn attach(&self, opaque_id: &str) -> Result<u64> {
        let mut request = ClientRequest::new(RequestKind::Attach, String::new());
        request.plugin = Some(crate::signaling::protocol::VIDEO_ROOM_PLUGIN.to_string());
        request.opaque_id = Some(opaque_id.to_string());

        let frame = self
            .request_reply(request, "attach".to_string(), false, None)
            .await?;
        frame.data.map(|d| d.id).ok_or_else(|| {
            Error::ProtocolViolation("attach reply carries no handle id".to_string())
        })
    }

    /// Register a pending entry, write the frame, and wait for resolution
    ///
    /// The entry is registered before the frame hits the socket, so the reply
    /// cannot race its own registration. Transaction, session and token are
    /// stamped here.
    async fn request_reply(
        &self,
        mut request: ClientRequest,
        label: String,
        ignore_ack: bool,
        timeout_override: Option<Duration>,
    ) -> Result<ServerFrame> {
        let transaction = Uuid::new_v4().to_string();
        request.transaction = transaction.clone();
        request.session_id = self.session_id();
        request.token = self.token.clone();

        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            map.insert(
                transaction.clone(),
                PendingRequest {
                    reply: tx,
                    ignore_ack,
                    label: label.clone(),
                },
            );
        }

        if let Err(e) = self.write_frame(&request).await {
            self.pending.lock().await.remove(&transaction);
            return Err(e);
        }
        debug!("Sent '{}' as transaction {}", label, transaction);

        let timeout = timeout_override.unwrap_or(self.request_timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(frame)) => match frame.to_protocol_error() {
                Some(err) => Err(err),
                None => Ok(frame),
            },
            Ok(Err(_)) => Err(Error::TransportClosed),
            Err(_) => {
                self.pending.lock().await.remove(&transaction);
                warn!("Request '{}' timed out after {:?}", label, timeout);
                Err(Error::RequestTimeout {
                    request: label,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Fire a keepalive without waiting for the ack
    ///
    /// A tick while the transport is down, or before a session exists, is a
    /// silent no-op.
    pub async fn post_keepalive(&self) {
        if self.session_id().is_none() {
            return;
        }
        let mut request = ClientRequest::new(RequestKind::Keepalive, Uuid::new_v4().to_string());
        request.session_id = self.session_id();
        request.token = self.token.clone();
        match self.write_frame(&request).await {
            Ok(()) => debug!("Keepalive sent"),
            Err(_) => debug!("Keepalive skipped, transport down"),
        }
    }

    /// Relay a local ICE candidate, or the end-of-candidates marker
    pub async fn post_trickle(
        &self,
        handle_id: u64,
        candidate: Option<TrickleCandidate>,
    ) -> Result<()> {
        let mut request = ClientRequest::new(RequestKind::Trickle, Uuid::new_v4().to_string());
        request.session_id = self.session_id();
        request.handle_id = Some(handle_id);
        request.token = self.token.clone();
        request.candidate = Some(match candidate {
            Some(c) => serde_json::to_value(c).map_err(|e| {
                Error::SerializationError(format!("Failed to serialize candidate: {}", e))
            })?,
            None => serde_json::json!({ "completed": true }),
        });
        self.write_frame(&request).await
    }

    async fn write_frame(&self, request: &ClientRequest) -> Result<()> {
        let json = request.to_json()?;
        let writer = self.writer.lock().await;
        match writer.as_ref() {
            Some(w) => w
                .send(Message::Text(json))
                .map_err(|_| Error::TransportClosed),
            None => Err(Error::TransportClosed),
        }
    }
}

/// Route one inbound frame to its pending request or to the event channel
async fn route_frame(
    frame: ServerFrame,
    pending: &Mutex<HashMap<String, PendingRequest>>,
    events: &mpsc::UnboundedSender<SignalEvent>,
) {
    match frame.kind {
        FrameKind::Keepalive => {
            debug!("Gateway keepalive");
        }
        FrameKind::Ack => {
            let transaction = match frame.transaction.as_deref() {
                Some(t) => t.to_string(),
                None => {
                    debug!("Ack without transaction");
                    return;
                }
            };
            let mut map = pending.lock().await;
            let staged = map.get(&transaction).map(|p| p.ignore_ack);
            match staged {
                Some(true) => {
                    debug!("Request {} acknowledged, awaiting event", transaction);
                }
                Some(false) => {
                    if let Some(request) = map.remove(&transaction) {
                        let _ = request.reply.send(frame);
                    }
                }
                None => {
                    debug!("Unmatched ack for transaction {}", transaction);
                }
            }
        }
        FrameKind::Success | FrameKind::Error | FrameKind::Event => {
            let matched = match frame.transaction.as_deref() {
                Some(transaction) => pending.lock().await.remove(transaction),
                None => None,
            };
            match matched {
                Some(request) => {
                    let _ = request.reply.send(frame);
                }
                None => match frame.kind {
                    FrameKind::Event => {
                        let _ = events.send(SignalEvent::Frame(frame));
                    }
                    FrameKind::Error => {
                        warn!(
                            "Unmatched gateway error: {:?} (transaction {:?})",
                            frame.error, frame.transaction
                        );
                    }
                    _ => {
                        debug!("Unmatched success for transaction {:?}", frame.transaction);
                    }
                },
            }
        }
        FrameKind::Trickle
        | FrameKind::WebrtcUp
        | FrameKind::HangUp
        | FrameKind::Detached
        | FrameKind::Media
        | FrameKind::SlowLink => {
            debug!("Advisory frame: {:?} (sender {:?})", frame.kind, frame.sender);
        }
        FrameKind::Unknown => {
            warn!("Unknown frame type from gateway, ignoring");
        }
    }
}
