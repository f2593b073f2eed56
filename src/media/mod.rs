//! Media engine seam and track descriptors

pub mod engine;
pub mod tracks;

pub use engine::{EngineEvent, MediaEngine, MediaPeer, PeerConnectionState, PeerRole};
pub use tracks::{LocalTrack, MediaTrack, RemoteTrack, TrackKind};
