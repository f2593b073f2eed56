//! Gateway signaling protocol types
//!
//! Every frame on the wire is a UTF-8 JSON object with a top-level `type`
//! discriminator and, for correlated requests, a `transaction` echoed back by
//! the gateway. Room operations travel as `message` requests whose `body`
//! carries the room plugin vocabulary.

use serde::{Deserialize, Serialize};

/// Plugin identifier sent when attaching room handles
pub const VIDEO_ROOM_PLUGIN: &str = "videoroom";

/// WebSocket subprotocol negotiated with the gateway
pub const WS_SUBPROTOCOL: &str = "videoroom-protocol";

/// Request types understood by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Create a new gateway session
    Create,
    /// Re-bind an existing session after a transport drop
    Claim,
    /// Destroy the current session
    Destroy,
    /// Attach a plugin handle to the session
    Attach,
    /// Room plugin message (body carries the room request)
    Message,
    /// Relay a local ICE candidate
    Trickle,
    /// Session keepalive
    Keepalive,
}

impl RequestKind {
    /// Get the wire name of this request type
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Create => "create",
            RequestKind::Claim => "claim",
            RequestKind::Destroy => "destroy",
            RequestKind::Attach => "attach",
            RequestKind::Message => "message",
            RequestKind::Trickle => "trickle",
            RequestKind::Keepalive => "keepalive",
        }
    }
}

/// Outbound request frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRequest {
    /// Request type
    #[serde(rename = "type")]
    pub kind: RequestKind,

    /// Correlation id echoed back by the gateway
    pub transaction: String,

    /// Session this request is scoped to (absent for session create)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,

    /// Handle this request is scoped to (room operations and trickle)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<u64>,

    /// Bearer token for authenticated gateways
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Plugin identifier (attach only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// Stable per-client correlation id (attach only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opaque_id: Option<String>,

    /// Room plugin body (message only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Session description riding along with the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsep: Option<Jsep>,

    /// ICE candidate payload (trickle only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<serde_json::Value>,
}

impl ClientRequest {
    /// Create a bare request of the given type
    pub fn new(kind: RequestKind, transaction: String) -> Self {
        Self {
            kind,
            transaction,
            session_id: None,
            handle_id: None,
            token: None,
            plugin: None,
            opaque_id: None,
            body: None,
            jsep: None,
            candidate: None,
        }
    }

    /// Convert request to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize request: {}", e))
        })
    }

    /// Parse request from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize request: {}", e))
        })
    }
}

/// Inbound frame discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Request received, terminal reply follows later
    Ack,
    /// Synchronous success reply
    Success,
    /// Plugin event (terminal reply for async requests, or unsolicited)
    Event,
    /// Request failed at the gateway
    Error,
    /// Gateway-side keepalive probe
    Keepalive,
    /// Remote ICE candidate (advisory, media path handles candidates)
    Trickle,
    /// Media transport for a handle came up
    WebrtcUp,
    /// Media transport for a handle went down
    HangUp,
    /// Handle was detached
    Detached,
    /// Media started or stopped flowing
    Media,
    /// Gateway reports a lossy link
    SlowLink,
    /// Anything newer than this client
    #[serde(other)]
    Unknown,
}

/// Inbound frame from the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    /// Frame discriminator
    #[serde(rename = "type")]
    pub kind: FrameKind,

    /// Transaction this frame answers, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,

    /// Session that produced this frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,

    /// Handle that produced this frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<u64>,

    /// Payload of session/handle create replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CreatedId>,

    /// Room plugin payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugindata: Option<PluginData>,

    /// Session description riding along with the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsep: Option<Jsep>,

    /// Top-level gateway error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

/// Numeric id allocated by a create or attach request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CreatedId {
    /// The allocated id
    pub id: u64,
}

/// Plugin payload wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginData {
    /// Plugin that produced the payload
    pub plugin: String,

    /// Plugin-specific payload
    pub data: serde_json::Value,
}

/// Top-level gateway error payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayError {
    /// Numeric error code
    pub code: i64,

    /// Human-readable reason
    pub reason: String,
}

/// Gateway error codes surfaced by room operations
pub mod gateway_codes {
    /// Request missing or malformed
    pub const INVALID_REQUEST: i64 = 455;

    /// Session id unknown to the gateway (expired or never created)
    pub const SESSION_NOT_FOUND: i64 = 458;

    /// Handle id unknown to the gateway
    pub const HANDLE_NOT_FOUND: i64 = 459;

    /// Token rejected
    pub const UNAUTHORIZED: i64 = 403;

    // Room plugin error codes

    /// Room does not exist
    pub const ROOM_NOT_FOUND: i64 = 426;

    /// Room already exists
    pub const ROOM_EXISTS: i64 = 427;

    /// Publisher id already taken in this room
    pub const ID_IN_USE: i64 = 436;

    /// Room is at its publisher limit
    pub const ROOM_FULL: i64 = 432;
}

impl ServerFrame {
    /// Extract a protocol-level error from this frame, if it carries one
    ///
    /// Checks the top-level error object first, then the plugin payload's
    /// `error_code`/`error` pair.
    pub fn to_protocol_error(&self) -> Option<crate::Error> {
        if let Some(err) = &self.error {
            return Some(crate::Error::Gateway {
                code: err.code,
                reason: err.reason.clone(),
            });
        }

        if let Some(plugin) = &self.plugindata {
            if let Some(code) = plugin.data.get("error_code").and_then(|v| v.as_i64()) {
                let reason = plugin
                    .data
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown plugin error")
                    .to_string();
                return Some(crate::Error::Gateway { code, reason });
            }
        }

        None
    }

    /// Deserialize the plugin payload into a typed response
    pub fn plugin_payload<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        let data = self
            .plugindata
            .as_ref()
            .map(|p| p.data.clone())
            .ok_or_else(|| {
                crate::Error::ProtocolViolation("reply carries no plugin payload".to_string())
            })?;

        serde_json::from_value(data).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to parse plugin payload: {}", e))
        })
    }

    /// Convert frame to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize frame: {}", e))
        })
    }

    /// Parse frame from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize frame: {}", e))
        })
    }
}

/// Session description exchanged with the gateway and the media engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jsep {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: JsepKind,

    /// SDP blob (opaque to this crate)
    pub sdp: String,
}

/// Session description direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsepKind {
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
}

impl Jsep {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: JsepKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: JsepKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Check if this description is an answer
    pub fn is_answer(&self) -> bool {
        self.kind == JsepKind::Answer
    }

    /// Check if this description is an offer
    pub fn is_offer(&self) -> bool {
        self.kind == JsepKind::Offer
    }
}

/// ICE candidate relayed through the trickle path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrickleCandidate {
    /// Candidate line
    pub candidate: String,

    /// Media line identifier
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Media line index
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}
