//! Application-facing events
//!
//! The client surfaces room activity on a typed channel handed out at
//! construction. Events are one-way notifications; every request/response
//! interaction happens through the client methods instead.

use std::fmt;

use crate::signaling::room::PublishedTrack;

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no session
    Disconnected,
    /// First connection being established
    Connecting,
    /// Session live, room operations available
    Connected,
    /// Transport lost, resynchronization in progress
    Reconnecting,
    /// Orderly teardown in progress
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Room activity delivered to the application
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// A participant announced a track, one event per track
    UserPublished {
        /// Publisher of the track
        user_id: u64,
        /// The announced track, usable with `subscribe`
        track: PublishedTrack,
    },

    /// A participant stopped publishing
    UserUnpublished {
        /// The participant that stopped
        user_id: u64,
        /// Stable mid of the affected track, absent when the whole feed
        /// went away
        stable_mid: Option<String>,
    },

    /// A participant left the room
    UserLeft {
        /// The participant that left
        user_id: u64,
    },

    /// The client connection state changed
    ConnectionChanged {
        /// State after the transition
        current: ConnectionState,
        /// State before the transition
        previous: ConnectionState,
        /// What triggered the transition
        reason: Option<String>,
    },

    /// Quality sample forwarded from the media engine
    QualityReport {
        /// Engine-defined report payload
        report: serde_json::Value,
    },
}

impl RoomEvent {
    /// The participant this event concerns, if any
    pub fn user_id(&self) -> Option<u64> {
        match self {
            RoomEvent::UserPublished { user_id, .. }
            | RoomEvent::UserUnpublished { user_id, .. }
            | RoomEvent::UserLeft { user_id } => Some(*user_id),
            RoomEvent::ConnectionChanged { .. } | RoomEvent::QualityReport { .. } => None,
        }
    }

    /// Check if this is a connection state change
    pub fn is_connection_change(&self) -> bool {
        matches!(self, RoomEvent::ConnectionChanged { .. })
    }
}

impl fmt::Display for RoomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomEvent::UserPublished { user_id, track } => {
                write!(f, "user {} published {} (mid {})", user_id, track.kind, track.mid)
            }
            RoomEvent::UserUnpublished { user_id, stable_mid: Some(mid) } => {
                write!(f, "user {} unpublished {}", user_id, mid)
            }
            RoomEvent::UserUnpublished { user_id, stable_mid: None } => {
                write!(f, "user {} unpublished", user_id)
            }
            RoomEvent::UserLeft { user_id } => write!(f, "user {} left", user_id),
            RoomEvent::ConnectionChanged { current, previous, .. } => {
                write!(f, "connection {} -> {}", previous, current)
            }
            RoomEvent::QualityReport { .. } => f.write_str("quality report"),
        }
    }
}
