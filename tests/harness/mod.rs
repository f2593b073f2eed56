//! Integration test harness
//!
//! Provides infrastructure for end-to-end testing of the room client with:
//! - Embedded mock video-room gateway on a random port
//! - Shared gateway state across connections, so session claim works
//! - Scripted media engine that negotiates a fake SDP dialect
//! - Event stream assertion helpers
//!
//! Basic usage pattern:
//!
//! 1. Start a `MockGateway`
//! 2. Build a `RoomClient` against `gateway.url()` with a `MockEngine`
//! 3. Drive the client API and assert on events and gateway request logs
//! 4. Call `gateway.shutdown()` to clean up

// Each integration test binary compiles this module and uses its own slice
#![allow(dead_code)]


use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use videoroom_client::{ConnectionState, PublishedTrack, RoomEvent};

pub use engine::{MockEngine, MockPeer, MockTrack};

/// Embedded gateway speaking the video-room wire protocol
///
/// Session and room state live in shared registries that outlive individual
/// WebSocket connections, so a client that reconnects can claim its old
/// session exactly like against a real gateway.
pub struct MockGateway {
    addr: SocketAddr,
    state: Arc<GatewayState>,
    accept_task: JoinHandle<()>,
}

impl MockGateway {
    /// Bind a listener on a random loopback port and start accepting
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(GatewayState::default());

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_state = Arc::clone(&accept_state);
                let conn = tokio::spawn(run_connection(stream, conn_state));
                accept_state.connections.lock().unwrap().push(conn);
            }
        });

        Ok(Self {
            addr,
            state,
            accept_task,
        })
    }

    /// WebSocket URL clients should connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Every request frame received so far, oldest first
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Request frames of one top-level type ("create", "claim", ...)
    pub fn requests_of_kind(&self, kind: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["type"] == kind)
            .collect()
    }

    /// Bodies of plugin messages with the given "request" field
    pub fn plugin_bodies(&self, request: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["type"] == "message" && r["body"]["request"] == request)
            .map(|r| r["body"].clone())
            .collect()
    }

    /// Number of live sessions the gateway knows about
    pub fn session_count(&self) -> usize {
        self.state.sessions.lock().unwrap().len()
    }

    /// Subprotocols clients offered during the handshake
    pub fn negotiated_protocols(&self) -> Vec<String> {
        self.state.seen_protocols.lock().unwrap().clone()
    }

    /// Abruptly kill every open connection, keeping session state
    ///
    /// Clients observe a transport drop; their sessions stay claimable.
    pub fn drop_connections(&self) {
        let connections: Vec<_> = self.state.connections.lock().unwrap().drain(..).collect();
        for conn in connections {
            conn.abort();
        }
    }

    /// Forget all sessions, so later claims fail with 458
    pub fn forget_sessions(&self) {
        self.state.sessions.lock().unwrap().clear();
    }

    /// Stop accepting and kill every open connection
    pub fn shutdown(&self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Gateway state
// ============================================================================

#[derive(Default)]
struct GatewayState {
    next_id: AtomicU64,
    /// session id -> writer of the connection currently serving it
    sessions: Mutex<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    handles: Mutex<HashMap<u64, HandleRecord>>,
    rooms: Mutex<HashMap<u64, RoomRecord>>,
    requests: Mutex<Vec<Value>>,
    seen_protocols: Mutex<Vec<String>>,
    connections: Mutex<Vec<JoinHandle<()>>>,
}

enum HandleRecord {
    Fresh,
    Publisher { room: u64, user_id: u64 },
    Subscriber { room: u64, rows: Vec<RowRecord> },
}

#[derive(Clone)]
struct RowRecord {
    mid: String,
    kind: String,
    feed_id: u64,
    feed_mid: String,
}

impl RowRecord {
    fn to_json(&self) -> Value {
        json!({
            "mid": self.mid,
            "type": self.kind,
            "feed_id": self.feed_id,
            "feed_mid": self.feed_mid,
            "active": true,
        })
    }
}

#[derive(Default)]
struct RoomRecord {
    publishers: HashMap<u64, PublisherRecord>,
}

struct PublisherRecord {
    session_id: u64,
    handle_id: u64,
    display: Option<String>,
    streams: Vec<Value>,
}

impl PublisherRecord {
    fn to_json(&self, user_id: u64) -> Value {
        json!({
            "id": user_id,
            "display": self.display,
            "streams": self.streams,
        })
    }
}

async fn run_connection(stream: TcpStream, state: Arc<GatewayState>) {
    let protocol_log = Arc::clone(&state);
    let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(proto) = req
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
        {
            protocol_log
                .seen_protocols
                .lock()
                .unwrap()
                .push(proto.to_string());
            if let Ok(value) = HeaderValue::from_str(proto) {
                resp.headers_mut().insert("Sec-WebSocket-Protocol", value);
            }
        }
        Ok(resp)
    };

    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut sink, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => state.handle_text(&tx, &text),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

fn send(tx: &mpsc::UnboundedSender<Message>, frame: Value) {
    let _ = tx.send(Message::Text(frame.to_string()));
}

impl GatewayState {
    fn alloc_id(&self) -> u64 {
        1000 + self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn handle_text(&self, conn: &mpsc::UnboundedSender<Message>, text: &str) {
        let Ok(req) = serde_json::from_str::<Value>(text) else {
            return;
        };
        self.requests.lock().unwrap().push(req.clone());

        let kind = req["type"].as_str().unwrap_or_default();
        let txn = req["transaction"].as_str().unwrap_or_default().to_string();

        match kind {
            "create" => {
                let id = self.alloc_id();
                self.sessions.lock().unwrap().insert(id, conn.clone());
                send(
                    conn,
                    json!({"type": "success", "transaction": txn, "data": {"id": id}}),
                );
            }
            "claim" => {
                let sid = req["session_id"].as_u64().unwrap_or_default();
                let mut sessions = self.sessions.lock().unwrap();
                if sessions.contains_key(&sid) {
                    sessions.insert(sid, conn.clone());
                    drop(sessions);
                    send(conn, json!({"type": "success", "transaction": txn}));
                } else {
                    drop(sessions);
                    send(
                        conn,
                        json!({
                            "type": "error",
                            "transaction": txn,
                            "error": {"code": 458, "reason": "No such session"},
                        }),
                    );
                }
            }
            "attach" => {
                let id = self.alloc_id();
                self.handles.lock().unwrap().insert(id, HandleRecord::Fresh);
                send(
                    conn,
                    json!({"type": "success", "transaction": txn, "data": {"id": id}}),
                );
            }
            "destroy" => {
                let sid = req["session_id"].as_u64().unwrap_or_default();
                self.sessions.lock().unwrap().remove(&sid);
                send(conn, json!({"type": "success", "transaction": txn}));
            }
            "keepalive" | "trickle" => {
                send(conn, json!({"type": "ack", "transaction": txn}));
            }
            "message" => self.handle_plugin(conn, &txn, &req),
            _ => {
                send(
                    conn,
                    json!({
                        "type": "error",
                        "transaction": txn,
                        "error": {"code": 455, "reason": "Unknown request"},
                    }),
                );
            }
        }
    }

    fn handle_plugin(&self, conn: &mpsc::UnboundedSender<Message>, txn: &str, req: &Value) {
        let sid = req["session_id"].as_u64().unwrap_or_default();
        let hid = req["handle_id"].as_u64().unwrap_or_default();
        let body = &req["body"];
        let request = body["request"].as_str().unwrap_or_default();

        // Synchronous plugin requests reply with success directly
        match request {
            "exists" => {
                let room = body["room"].as_u64().unwrap_or_default();
                let exists = self.rooms.lock().unwrap().contains_key(&room);
                self.plugin_success(
                    conn,
                    txn,
                    sid,
                    hid,
                    json!({"videoroom": "success", "room": room, "exists": exists}),
                );
                return;
            }
            "create" => {
                let room = body["room"].as_u64().unwrap_or_default();
                let mut rooms = self.rooms.lock().unwrap();
                let data = if rooms.contains_key(&room) {
                    json!({"videoroom": "event", "error_code": 427, "error": "Room already exists"})
                } else {
                    rooms.insert(room, RoomRecord::default());
                    json!({"videoroom": "created", "room": room, "permanent": false})
                };
                drop(rooms);
                self.plugin_success(conn, txn, sid, hid, data);
                return;
            }
            "destroy" => {
                let room = body["room"].as_u64().unwrap_or_default();
                self.rooms.lock().unwrap().remove(&room);
                self.plugin_success(
                    conn,
                    txn,
                    sid,
                    hid,
                    json!({"videoroom": "destroyed", "room": room}),
                );
                return;
            }
            _ => {}
        }

        // Asynchronous requests are acked, the real reply is an event
        send(conn, json!({"type": "ack", "transaction": txn}));

        match request {
            "join" => match body["ptype"].as_str().unwrap_or_default() {
                "publisher" => self.join_publisher(conn, txn, sid, hid, body),
                _ => self.join_subscriber(conn, txn, sid, hid, body),
            },
            "configure" => {
                let sdp = req["jsep"]["sdp"].as_str().unwrap_or_default();
                self.configure(conn, txn, sid, hid, body, sdp);
            }
            "unpublish" => self.unpublish(conn, txn, sid, hid),
            "subscribe" => self.update_subscription(conn, txn, sid, hid, body, true),
            "unsubscribe" => self.update_subscription(conn, txn, sid, hid, body, false),
            "start" => {
                self.plugin_event(conn, Some(txn), sid, hid, json!({"videoroom": "event", "started": "ok"}), None);
            }
            "leave" => self.leave(conn, txn, sid, hid),
            _ => {
                self.plugin_event(
                    conn,
                    Some(txn),
                    sid,
                    hid,
                    json!({"videoroom": "event", "error_code": 455, "error": "Unknown request"}),
                    None,
                );
            }
        }
    }

    fn join_publisher(
        &self,
        conn: &mpsc::UnboundedSender<Message>,
        txn: &str,
        sid: u64,
        hid: u64,
        body: &Value,
    ) {
        let room = body["room"].as_u64().unwrap_or_default();
        let user_id = body["id"].as_u64().unwrap_or_default();
        let display = body["display"].as_str().map(|s| s.to_string());

        let mut rooms = self.rooms.lock().unwrap();
        let Some(record) = rooms.get_mut(&room) else {
            drop(rooms);
            self.plugin_event(
                conn,
                Some(txn),
                sid,
                hid,
                json!({"videoroom": "event", "error_code": 426, "error": "No such room"}),
                None,
            );
            return;
        };

        let others: Vec<Value> = record
            .publishers
            .iter()
            .filter(|(id, p)| **id != user_id && !p.streams.is_empty())
            .map(|(id, p)| p.to_json(*id))
            .collect();
        record.publishers.insert(
            user_id,
            PublisherRecord {
                session_id: sid,
                handle_id: hid,
                display,
                streams: Vec::new(),
            },
        );
        drop(rooms);

        self.handles
            .lock()
            .unwrap()
            .insert(hid, HandleRecord::Publisher { room, user_id });

        let private_id = self.alloc_id();
        self.plugin_event(
            conn,
            Some(txn),
            sid,
            hid,
            json!({
                "videoroom": "joined",
                "room": room,
                "id": user_id,
                "private_id": private_id,
                "publishers": others,
            }),
            None,
        );
    }

    /// Publisher configure negotiates media, subscriber configure restarts ICE
    fn configure(
        &self,
        conn: &mpsc::UnboundedSender<Message>,
        txn: &str,
        sid: u64,
        hid: u64,
        body: &Value,
        sdp: &str,
    ) {
        let record = {
            let handles = self.handles.lock().unwrap();
            match handles.get(&hid) {
                Some(HandleRecord::Publisher { room, user_id }) => Some((*room, *user_id)),
                Some(HandleRecord::Subscriber { rows, .. }) => {
                    let offer = subscriber_offer(rows);
                    drop(handles);
                    self.plugin_event(
                        conn,
                        Some(txn),
                        sid,
                        hid,
                        json!({"videoroom": "event", "configured": "ok"}),
                        Some(offer),
                    );
                    return;
                }
                _ => None,
            }
        };
        let Some((room, user_id)) = record else {
            self.plugin_event(
                conn,
                Some(txn),
                sid,
                hid,
                json!({"videoroom": "event", "error_code": 459, "error": "No such handle"}),
                None,
            );
            return;
        };

        let restart = body["restart"].as_bool().unwrap_or(false);
        let streams = parse_offered_tracks(sdp);

        {
            let mut rooms = self.rooms.lock().unwrap();
            if let Some(publisher) = rooms
                .get_mut(&room)
                .and_then(|r| r.publishers.get_mut(&user_id))
            {
                if !streams.is_empty() {
                    publisher.streams = streams.clone();
                }
            }
        }

        self.plugin_event(
            conn,
            Some(txn),
            sid,
            hid,
            json!({"videoroom": "event", "room": room, "configured": "ok"}),
            Some(json!({"type": "answer", "sdp": "v=mock;role=gateway;answer"})),
        );

        if !restart && !streams.is_empty() {
            let announcement = {
                let rooms = self.rooms.lock().unwrap();
                rooms
                    .get(&room)
                    .and_then(|r| r.publishers.get(&user_id))
                    .map(|p| p.to_json(user_id))
            };
            if let Some(publisher) = announcement {
                self.broadcast(room, user_id, json!({
                    "videoroom": "event",
                    "room": room,
                    "publishers": [publisher],
                }));
            }
        }
    }

    fn unpublish(&self, conn: &mpsc::UnboundedSender<Message>, txn: &str, sid: u64, hid: u64) {
        let located = {
            let handles = self.handles.lock().unwrap();
            match handles.get(&hid) {
                Some(HandleRecord::Publisher { room, user_id }) => Some((*room, *user_id)),
                _ => None,
            }
        };
        let Some((room, user_id)) = located else {
            return;
        };
        if let Some(publisher) = self
            .rooms
            .lock()
            .unwrap()
            .get_mut(&room)
            .and_then(|r| r.publishers.get_mut(&user_id))
        {
            publisher.streams.clear();
        }
        self.plugin_event(
            conn,
            Some(txn),
            sid,
            hid,
            json!({"videoroom": "event", "room": room, "unpublished": "ok"}),
            None,
        );
        self.broadcast(
            room,
            user_id,
            json!({"videoroom": "event", "room": room, "unpublished": user_id}),
        );
    }

    fn leave(&self, conn: &mpsc::UnboundedSender<Message>, txn: &str, sid: u64, hid: u64) {
        let located = {
            let mut handles = self.handles.lock().unwrap();
            match handles.get(&hid) {
                Some(HandleRecord::Publisher { room, user_id }) => {
                    let found = (*room, *user_id);
                    handles.insert(hid, HandleRecord::Fresh);
                    Some(found)
                }
                _ => None,
            }
        };
        let Some((room, user_id)) = located else {
            return;
        };
        if let Some(record) = self.rooms.lock().unwrap().get_mut(&room) {
            record.publishers.remove(&user_id);
        }
        self.plugin_event(
            conn,
            Some(txn),
            sid,
            hid,
            json!({"videoroom": "event", "leaving": "ok"}),
            None,
        );
        self.broadcast(
            room,
            user_id,
            json!({"videoroom": "event", "room": room, "leaving": user_id}),
        );
    }

    fn join_subscriber(
        &self,
        conn: &mpsc::UnboundedSender<Message>,
        txn: &str,
        sid: u64,
        hid: u64,
        body: &Value,
    ) {
        let room = body["room"].as_u64().unwrap_or_default();
        let mut rows = Vec::new();
        self.add_rows(room, body, &mut rows);

        let offer = subscriber_offer(&rows);
        let streams: Vec<Value> = rows.iter().map(RowRecord::to_json).collect();
        self.handles
            .lock()
            .unwrap()
            .insert(hid, HandleRecord::Subscriber { room, rows });

        self.plugin_event(
            conn,
            Some(txn),
            sid,
            hid,
            json!({"videoroom": "attached", "room": room, "streams": streams}),
            Some(offer),
        );
    }

    fn update_subscription(
        &self,
        conn: &mpsc::UnboundedSender<Message>,
        txn: &str,
        sid: u64,
        hid: u64,
        body: &Value,
        add: bool,
    ) {
        let (room, mut rows) = {
            let handles = self.handles.lock().unwrap();
            match handles.get(&hid) {
                Some(HandleRecord::Subscriber { room, rows }) => (*room, rows.clone()),
                _ => {
                    drop(handles);
                    self.plugin_event(
                        conn,
                        Some(txn),
                        sid,
                        hid,
                        json!({"videoroom": "event", "error_code": 459, "error": "Not a subscriber"}),
                        None,
                    );
                    return;
                }
            }
        };

        if add {
            self.add_rows(room, body, &mut rows);
        } else if let Some(selectors) = body["streams"].as_array() {
            for selector in selectors {
                let feed = selector["feed"].as_u64().unwrap_or_default();
                let feed_mid = selector["mid"].as_str();
                rows.retain(|row| {
                    row.feed_id != feed
                        || feed_mid.is_some_and(|m| m != row.feed_mid)
                });
            }
        }

        // Removals renegotiate too, the slot goes inactive in the offer
        let offer = Some(subscriber_offer(&rows));
        let streams: Vec<Value> = rows.iter().map(RowRecord::to_json).collect();
        self.handles
            .lock()
            .unwrap()
            .insert(hid, HandleRecord::Subscriber { room, rows });

        self.plugin_event(
            conn,
            Some(txn),
            sid,
            hid,
            json!({"videoroom": "updated", "room": room, "streams": streams}),
            offer,
        );
    }

    /// Resolve requested selectors against room publishers, allocating the
    /// lowest free subscription mid for each new row
    fn add_rows(&self, room: u64, body: &Value, rows: &mut Vec<RowRecord>) {
        let Some(selectors) = body["streams"].as_array() else {
            return;
        };
        let rooms = self.rooms.lock().unwrap();
        for selector in selectors {
            let feed = selector["feed"].as_u64().unwrap_or_default();
            let feed_mid = selector["mid"].as_str().unwrap_or("0").to_string();
            let kind = rooms
                .get(&room)
                .and_then(|r| r.publishers.get(&feed))
                .and_then(|p| {
                    p.streams
                        .iter()
                        .find(|s| s["mid"] == feed_mid.as_str())
                        .and_then(|s| s["type"].as_str())
                })
                .unwrap_or("video")
                .to_string();
            let mid = lowest_free_mid(rows);
            rows.push(RowRecord {
                mid,
                kind,
                feed_id: feed,
                feed_mid,
            });
        }
    }

    fn plugin_success(
        &self,
        conn: &mpsc::UnboundedSender<Message>,
        txn: &str,
        sid: u64,
        hid: u64,
        data: Value,
    ) {
        send(
            conn,
            json!({
                "type": "success",
                "transaction": txn,
                "session_id": sid,
                "sender": hid,
                "plugindata": {"plugin": "videoroom", "data": data},
            }),
        );
    }

    fn plugin_event(
        &self,
        conn: &mpsc::UnboundedSender<Message>,
        txn: Option<&str>,
        sid: u64,
        hid: u64,
        data: Value,
        jsep: Option<Value>,
    ) {
        let mut frame = json!({
            "type": "event",
            "session_id": sid,
            "sender": hid,
            "plugindata": {"plugin": "videoroom", "data": data},
        });
        if let Some(txn) = txn {
            frame["transaction"] = json!(txn);
        }
        if let Some(jsep) = jsep {
            frame["jsep"] = jsep;
        }
        send(conn, frame);
    }

    /// Deliver a room event to every member except `skip_user`, addressed to
    /// each member's own publisher handle
    fn broadcast(&self, room: u64, skip_user: u64, data: Value) {
        let targets: Vec<(u64, u64)> = {
            let rooms = self.rooms.lock().unwrap();
            let Some(record) = rooms.get(&room) else {
                return;
            };
            record
                .publishers
                .iter()
                .filter(|(id, _)| **id != skip_user)
                .map(|(_, p)| (p.session_id, p.handle_id))
                .collect()
        };
        let sessions = self.sessions.lock().unwrap();
        for (session_id, handle_id) in targets {
            if let Some(writer) = sessions.get(&session_id) {
                let frame = json!({
                    "type": "event",
                    "session_id": session_id,
                    "sender": handle_id,
                    "plugindata": {"plugin": "videoroom", "data": data.clone()},
                });
                let _ = writer.send(Message::Text(frame.to_string()));
            }
        }
    }
}

/// Parse "tracks=kind/id/mid,..." out of a mock publisher offer
fn parse_offered_tracks(sdp: &str) -> Vec<Value> {
    let Some(section) = sdp.split(';').find_map(|s| s.strip_prefix("tracks=")) else {
        return Vec::new();
    };
    section
        .split(',')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut parts = entry.split('/');
            let kind = parts.next()?;
            let _id = parts.next()?;
            let mid = parts.next()?;
            let codec = if kind == "audio" { "opus" } else { "vp8" };
            Some(json!({"type": kind, "mid": mid, "codec": codec}))
        })
        .collect()
}

/// Offer covering every active row, in the mock SDP dialect
fn subscriber_offer(rows: &[RowRecord]) -> Value {
    let mids = rows
        .iter()
        .map(|r| format!("{}:{}", r.mid, r.kind))
        .collect::<Vec<_>>()
        .join(",");
    json!({"type": "offer", "sdp": format!("v=mock;role=gateway;mids={}", mids)})
}

fn lowest_free_mid(rows: &[RowRecord]) -> String {
    let used: HashSet<&str> = rows.iter().map(|r| r.mid.as_str()).collect();
    let mut n = 0usize;
    loop {
        let candidate = n.to_string();
        if !used.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

// ============================================================================
// Event stream helpers
// ============================================================================

/// Wait until the client reports the given connection state, returning the
/// transition reason
pub async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<RoomEvent>,
    target: ConnectionState,
) -> Option<String> {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for connection state")
            .expect("event stream closed");
        if let RoomEvent::ConnectionChanged {
            current, reason, ..
        } = event
        {
            if current == target {
                return reason;
            }
        }
    }
}

/// Wait for the next track announcement, skipping unrelated events
pub async fn wait_for_published(
    events: &mut mpsc::UnboundedReceiver<RoomEvent>,
) -> (u64, PublishedTrack) {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a track announcement")
            .expect("event stream closed");
        if let RoomEvent::UserPublished { user_id, track } = event {
            return (user_id, track);
        }
    }
}

/// Wait for the next unpublish notice, skipping unrelated events
pub async fn wait_for_unpublished(
    events: &mut mpsc::UnboundedReceiver<RoomEvent>,
) -> (u64, Option<String>) {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for an unpublish notice")
            .expect("event stream closed");
        if let RoomEvent::UserUnpublished {
            user_id,
            stable_mid,
        } = event
        {
            return (user_id, stable_mid);
        }
    }
}
