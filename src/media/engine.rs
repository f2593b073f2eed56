//! Media engine seam
//!
//! The crate handles signaling only; SDP negotiation, ICE and media flow
//! live behind these traits. A production engine wraps a WebRTC stack, tests
//! plug in a scripted fake.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::tracks::{LocalTrack, MediaTrack};
use crate::signaling::protocol::{Jsep, TrickleCandidate};

/// Which negotiation role a peer session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Sends local media to the gateway
    Publisher,
    /// Receives remote media from the gateway
    Subscriber,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Publisher => f.write_str("publisher"),
            PeerRole::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Connection state of an engine peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    /// Created, negotiation not started
    New,
    /// Negotiating or checking candidates
    Connecting,
    /// Media can flow
    Connected,
    /// Temporarily lost, may recover on its own
    Disconnected,
    /// Permanently failed
    Failed,
    /// Closed locally
    Closed,
}

/// Event emitted by the media engine
#[derive(Debug)]
pub enum EngineEvent {
    /// A local ICE candidate to relay to the gateway
    IceCandidate {
        /// Peer that produced the candidate
        role: PeerRole,
        /// The candidate payload
        candidate: TrickleCandidate,
    },

    /// Local candidate gathering finished for a peer
    IceGatheringComplete {
        /// Peer that finished gathering
        role: PeerRole,
    },

    /// A peer session changed connection state
    ConnectionChange {
        /// Peer that changed
        role: PeerRole,
        /// The new state
        state: PeerConnectionState,
    },

    /// Remote media arrived on a subscriber connection slot
    TrackAdded {
        /// Peer the track arrived on
        role: PeerRole,
        /// Mid of the connection slot carrying the track
        mid: String,
        /// The engine track handle
        track: Arc<dyn MediaTrack>,
    },

    /// A remote track stopped for good
    TrackEnded {
        /// Mid of the connection slot that carried the track
        mid: String,
    },

    /// A remote track went silent
    TrackMuted {
        /// Mid of the affected connection slot
        mid: String,
    },

    /// A muted remote track resumed
    TrackUnmuted {
        /// Mid of the affected connection slot
        mid: String,
    },

    /// Periodic quality sample from the engine
    Stats {
        /// Engine-defined report payload
        report: serde_json::Value,
    },
}

/// Factory for peer sessions
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a peer session for the given role
    ///
    /// The peer reports everything it does on `events`. The same channel is
    /// shared by all peers; events carry the role where it matters.
    async fn create_peer(
        &self,
        role: PeerRole,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Arc<dyn MediaPeer>>;
}

/// One negotiated media session
#[async_trait]
pub trait MediaPeer: Send + Sync {
    /// Add a local track to the session before creating an offer
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    /// Create an offer, optionally restarting ICE
    async fn create_offer(&self, ice_restart: bool) -> Result<Jsep>;

    /// Apply the remote answer to a previously created offer
    async fn apply_answer(&self, answer: Jsep) -> Result<()>;

    /// Apply a remote offer and produce the answer
    async fn create_answer(&self, offer: Jsep) -> Result<Jsep>;

    /// Stop the track on the given connection slot
    async fn stop_track(&self, mid: &str) -> Result<()>;

    /// Close the session and release engine resources
    async fn close(&self) -> Result<()>;
}
