//! Gateway signaling: wire protocol, correlated transport, session and room

pub mod protocol;
pub mod room;
pub mod session;
pub mod transport;

pub use protocol::{
    ClientRequest, FrameKind, GatewayError, Jsep, JsepKind, RequestKind, ServerFrame,
    TrickleCandidate,
};
pub use room::{
    CreateRoomOptions, PublishedTrack, PublisherInfo, RoomChannel, RoomMembership, RoomUpdate,
    StreamRow, StreamSelector, SubscriptionUpdate,
};
pub use session::GatewaySession;
pub use transport::{SendOptions, SignalEvent, SignalTransport};
