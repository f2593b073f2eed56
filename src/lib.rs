//! Signaling client for video-room SFU gateways
//!
//! This crate speaks the transaction-correlated WebSocket protocol of a
//! video-room media gateway and turns it into a typed async API: join a
//! room, publish tracks, subscribe to other participants, survive transport
//! drops without losing the session.
//!
//! # Features
//!
//! - **Correlated RPC over one WebSocket**: every request is matched to its
//!   response by transaction id, with ack staging for plugin requests
//! - **Session lifecycle**: create, keepalive and claim-on-reconnect so the
//!   gateway keeps server-side state across network drops
//! - **Room protocol**: exists/create/destroy, publisher join, media
//!   configure, per-track subscribe and unsubscribe
//! - **Stable track identity**: gateway connection slots are remapped on
//!   every renegotiation; subscribers get identifiers that never move
//! - **Pluggable media engine**: SDP and ICE stay behind a trait seam, so
//!   any WebRTC stack (or a scripted fake) can drive the media plane
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  RoomClient                                             │
//! │  ├─ event pump (gateway frames + engine events)         │
//! │  ├─ SubscribeQueue (serialized renegotiations)          │
//! │  ├─ TrackMap (ephemeral mid -> stable identity)         │
//! │  ├─ RoomChannel (publisher/subscriber handles)          │
//! │  ├─ GatewaySession (create/claim/keepalive)             │
//! │  └─ SignalTransport (correlated RPC over WebSocket)     │
//! │       ↕                                                 │
//! │  video-room gateway                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use videoroom_client::{ClientConfig, LocalTrack, RoomClient, RoomEvent};
//!
//! let config = ClientConfig::new("wss://gateway.example.com/ws")
//!     .with_token("secret");
//! let (client, mut events) = RoomClient::new(config, my_engine)?;
//!
//! client.connect().await?;
//! client.join(1234, 42, Some("alice")).await?;
//! client.publish(vec![
//!     LocalTrack::audio("mic", 64),
//!     LocalTrack::video("cam", 400),
//! ]).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let RoomEvent::UserPublished { user_id, track } = event {
//!         let remote = client.subscribe(user_id, &track).await?;
//!         println!("receiving {} from {}", remote.stable_mid, user_id);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod signaling;

// Re-exports for public API
pub use client::{ConnectionState, RoomClient, RoomEvent};
pub use config::{ClientConfig, ReconnectOptions, VideoCodec};
pub use error::{Error, Result};
pub use media::{
    EngineEvent, LocalTrack, MediaEngine, MediaPeer, MediaTrack, PeerConnectionState, PeerRole,
    RemoteTrack, TrackKind,
};
pub use signaling::{
    CreateRoomOptions, Jsep, PublishedTrack, PublisherInfo, RoomMembership, TrickleCandidate,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
