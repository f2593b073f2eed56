//! Track descriptors
//!
//! Local tracks describe what this client publishes, with per-track encoder
//! budgets. Remote tracks pair a subscription's stable identity with the
//! engine-side track handle that carries the media.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// Get the wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local track to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    /// Engine-side track identifier
    pub id: String,

    /// Audio or video
    pub kind: TrackKind,

    /// Encoder budget in kilobits per second, 0 for engine default
    pub bitrate_kbps: u32,
}

impl LocalTrack {
    /// Describe a local audio track
    pub fn audio(id: impl Into<String>, bitrate_kbps: u32) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
            bitrate_kbps,
        }
    }

    /// Describe a local video track
    pub fn video(id: impl Into<String>, bitrate_kbps: u32) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Video,
            bitrate_kbps,
        }
    }
}

/// Handle to a track owned by the media engine
///
/// The engine hands these out when remote media arrives. The crate never
/// looks inside; it only routes handles to the right subscription.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Engine-side track identifier
    fn id(&self) -> &str;

    /// Audio or video
    fn kind(&self) -> TrackKind;
}

/// A remote participant's track this client is subscribed to
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    /// Participant the track belongs to
    pub user_id: u64,

    /// Identity that survives renegotiations
    pub stable_mid: String,

    /// Mid of the subscriber connection slot currently carrying the track
    pub ephemeral_mid: String,

    /// Audio or video
    pub kind: TrackKind,

    /// Negotiated codec, when known
    pub codec: Option<String>,

    /// The engine track delivering the media
    pub media: Arc<dyn MediaTrack>,
}
