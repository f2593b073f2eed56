//! Client orchestration
//!
//! [`RoomClient`] is the crate entry point. It owns the signaling stack,
//! drives the media engine through the [`crate::media`] seam, serializes
//! subscription work, and keeps the session alive across transport drops.

pub mod events;
pub mod room;

pub(crate) mod reconnect;
pub(crate) mod subscriber;
pub(crate) mod track_map;

pub use events::{ConnectionState, RoomEvent};
pub use room::RoomClient;
