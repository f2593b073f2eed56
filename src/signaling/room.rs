//! Room plugin channel
//!
//! Wraps the room vocabulary the gateway's video-room plugin speaks: room
//! management, the publisher join/configure/unpublish cycle, and the
//! subscriber join/subscribe/start cycle. Requests travel as `message` frames
//! scoped to one of two plugin handles, a publisher handle and a lazily
//! attached subscriber handle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::VideoCodec;
use crate::error::{Error, Result};
use crate::media::tracks::{LocalTrack, TrackKind};
use crate::signaling::protocol::{Jsep, RequestKind, ServerFrame};
use crate::signaling::transport::{SendOptions, SignalTransport};

/// Room plugin request bodies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum RoomRequest {
    /// Check whether a room exists
    Exists { room: u64 },

    /// Create a room
    Create {
        room: u64,
        publishers: u32,
        bitrate: u64,
        videocodec: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        admin_key: Option<String>,
    },

    /// Destroy a room
    Destroy {
        room: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        admin_key: Option<String>,
    },

    /// Join a room as publisher or subscriber
    Join {
        room: u64,
        ptype: ParticipantType,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        streams: Option<Vec<StreamSelector>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        private_id: Option<u64>,
    },

    /// Negotiate or renegotiate the publisher media session
    Configure {
        #[serde(skip_serializing_if = "Option::is_none")]
        bitrate: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        restart: Option<bool>,
    },

    /// Stop publishing without leaving the room
    Unpublish,

    /// Add streams to the subscriber session
    Subscribe { streams: Vec<StreamSelector> },

    /// Remove streams from the subscriber session
    Unsubscribe { streams: Vec<StreamSelector> },

    /// Accept the subscriber offer and start media flow
    Start,

    /// Leave the room
    Leave,
}

impl RoomRequest {
    fn to_body(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize room request: {}", e))
        })
    }
}

/// Role a participant joins a room as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantType {
    /// Publishes media into the room
    Publisher,
    /// Receives other participants' media
    Subscriber,
}

/// Selects a publisher's stream for subscription operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamSelector {
    /// Publisher the stream belongs to
    pub feed: u64,

    /// The publisher-side mid, absent to select the whole feed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
}

impl StreamSelector {
    /// Select one announced track of a publisher
    pub fn track(feed: u64, mid: impl Into<String>) -> Self {
        Self {
            feed,
            mid: Some(mid.into()),
        }
    }

    /// Select every stream of a publisher
    pub fn feed(feed: u64) -> Self {
        Self { feed, mid: None }
    }
}

/// A track another participant announced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishedTrack {
    /// Audio or video
    #[serde(rename = "type")]
    pub kind: TrackKind,

    /// Publisher-side mid identifying the track within its feed
    pub mid: String,

    /// Negotiated codec, when the gateway reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    /// Whether the publisher has disabled the track
    #[serde(default)]
    pub disabled: bool,
}

/// An active publisher as reported by the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherInfo {
    /// Room-unique participant id
    pub id: u64,

    /// Display name, if the publisher set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Tracks the publisher announced
    #[serde(default)]
    pub streams: Vec<PublishedTrack>,
}

/// Payload of a successful publisher join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinedRoom {
    /// The room that was joined
    pub room: u64,

    /// Secret used to tie the subscriber session to this participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_id: Option<u64>,

    /// Publishers already active in the room
    #[serde(default)]
    pub publishers: Vec<PublisherInfo>,
}

/// One row of the gateway's subscription stream table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRow {
    /// Subscriber-connection mid; reshuffled by renegotiations
    pub mid: String,

    /// Audio or video
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TrackKind>,

    /// Publisher the stream comes from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_id: Option<u64>,

    /// Publisher-side mid of the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_mid: Option<String>,

    /// False for slots the gateway has deactivated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StreamsPayload {
    #[serde(default)]
    streams: Vec<StreamRow>,
}

#[derive(Debug, Deserialize)]
struct ExistsPayload {
    #[serde(default)]
    exists: bool,
}

/// Result of a subscriber join, subscribe or unsubscribe
///
/// `description` is the gateway's renegotiation offer. Join and subscribe
/// replies always carry one; unsubscribe may not.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    /// Full stream table after the operation, inactive rows included
    pub streams: Vec<StreamRow>,

    /// Renegotiation offer to answer through the media engine
    pub description: Option<Jsep>,
}

/// Unsolicited room activity parsed from gateway events
#[derive(Debug, Clone, PartialEq)]
pub enum RoomUpdate {
    /// Publishers appeared or announced new tracks
    NewPublishers(Vec<PublisherInfo>),

    /// A publisher stopped publishing but stayed in the room
    Unpublished { user_id: u64 },

    /// A participant left the room
    Left { user_id: u64 },
}

impl RoomUpdate {
    /// Parse a room update out of an unsolicited event frame
    ///
    /// Returns `None` for frames that carry nothing actionable, including
    /// the `ok` confirmations the gateway mirrors back for our own
    /// unpublish and leave.
    pub fn from_frame(frame: &ServerFrame) -> Option<RoomUpdate> {
        let data = &frame.plugindata.as_ref()?.data;

        if let Some(publishers) = data.get("publishers") {
            if let Ok(list) = serde_json::from_value::<Vec<PublisherInfo>>(publishers.clone()) {
                if !list.is_empty() {
                    return Some(RoomUpdate::NewPublishers(list));
                }
            }
            return None;
        }

        if let Some(unpublished) = data.get("unpublished") {
            return unpublished
                .as_u64()
                .map(|user_id| RoomUpdate::Unpublished { user_id });
        }

        if let Some(leaving) = data.get("leaving") {
            return leaving.as_u64().map(|user_id| RoomUpdate::Left { user_id });
        }

        None
    }
}

/// Room creation knobs forwarded to the gateway
#[derive(Debug, Clone)]
pub struct CreateRoomOptions {
    /// Maximum concurrent publishers
    pub publishers: u32,

    /// Room-wide bitrate cap in bits per second, 0 for the gateway default
    pub bitrate: u64,

    /// Human-readable room description
    pub description: Option<String>,
}

impl Default for CreateRoomOptions {
    fn default() -> Self {
        Self {
            publishers: 16,
            bitrate: 0,
            description: None,
        }
    }
}

/// Room membership held by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomMembership {
    /// Room we are joined to
    pub room_id: u64,

    /// Our participant id in that room
    pub user_id: u64,
}

/// Sum of per-track encoder budgets converted to the gateway's unit
///
/// Track budgets are kilobits per second; the gateway expects bits per
/// second. Returns `None` when no budget was requested.
pub fn total_bitrate_bps(tracks: &[LocalTrack]) -> Option<u64> {
    let total_kbps: u64 = tracks.iter().map(|t| t.bitrate_kbps as u64).sum();
    (total_kbps > 0).then_some(total_kbps * 1000)
}

/// Room protocol operations over the shared transport
///
/// Owns the two plugin handles and the membership record. Handles survive a
/// session claim; everything here is cleared only by `reset`.
pub struct RoomChannel {
    transport: Arc<SignalTransport>,
    opaque_id: String,
    video_codec: VideoCodec,
    admin_key: Option<String>,
    publisher_handle: RwLock<Option<u64>>,
    subscriber_handle: RwLock<Option<u64>>,
    membership: RwLock<Option<RoomMembership>>,
    private_id: RwLock<Option<u64>>,
}

impl RoomChannel {
    /// Create a room channel over the given transport
    pub fn new(
        transport: Arc<SignalTransport>,
        video_codec: VideoCodec,
        admin_key: Option<String>,
    ) -> Self {
        Self {
            transport,
            opaque_id: format!("videoroom-{}", Uuid::new_v4()),
            video_codec,
            admin_key,
            publisher_handle: RwLock::new(None),
            subscriber_handle: RwLock::new(None),
            membership: RwLock::new(None),
            private_id: RwLock::new(None),
        }
    }

    /// Attach the publisher handle, reusing an existing one
    pub async fn attach_publisher(&self) -> Result<u64> {
        if let Some(id) = *self.publisher_handle.read().await {
            return Ok(id);
        }
        let id = self.transport.attach(&self.opaque_id).await?;
        *self.publisher_handle.write().await = Some(id);
        debug!("Publisher handle {} attached", id);
        Ok(id)
    }

    /// Attach the subscriber handle, reusing an existing one
    pub async fn attach_subscriber(&self) -> Result<u64> {
        if let Some(id) = *self.subscriber_handle.read().await {
            return Ok(id);
        }
        let id = self.transport.attach(&self.opaque_id).await?;
        *self.subscriber_handle.write().await = Some(id);
        debug!("Subscriber handle {} attached", id);
        Ok(id)
    }

    /// Publisher handle id, if attached
    pub async fn publisher_handle(&self) -> Option<u64> {
        *self.publisher_handle.read().await
    }

    /// Subscriber handle id, if attached
    pub async fn subscriber_handle(&self) -> Option<u64> {
        *self.subscriber_handle.read().await
    }

    /// Current room membership, if joined
    pub async fn membership(&self) -> Option<RoomMembership> {
        *self.membership.read().await
    }

    /// Check whether a room exists at the gateway
    pub async fn exists(&self, room: u64) -> Result<bool> {
        let handle = self.require_publisher().await?;
        let body = RoomRequest::Exists { room }.to_body()?;
        let frame = self
            .transport
            .send(RequestKind::Message, Some(body), None, SendOptions::sync(handle))
            .await?;
        let payload: ExistsPayload = frame.plugin_payload()?;
        Ok(payload.exists)
    }

    /// Create a room with this client's negotiated codec
    pub async fn create_room(&self, room: u64, options: CreateRoomOptions) -> Result<()> {
        let handle = self.require_publisher().await?;
        let body = RoomRequest::Create {
            room,
            publishers: options.publishers,
            bitrate: options.bitrate,
            videocodec: self.video_codec.as_wire_str().to_string(),
            description: options.description,
            admin_key: self.admin_key.clone(),
        }
        .to_body()?;

        self.transport
            .send(RequestKind::Message, Some(body), None, SendOptions::sync(handle))
            .await?;
        info!("Room {} created", room);
        Ok(())
    }

    /// Destroy a room at the gateway
    pub async fn destroy_room(&self, room: u64) -> Result<()> {
        let handle = self.require_publisher().await?;
        let body = RoomRequest::Destroy {
            room,
            admin_key: self.admin_key.clone(),
        }
        .to_body()?;

        self.transport
            .send(RequestKind::Message, Some(body), None, SendOptions::sync(handle))
            .await?;
        info!("Room {} destroyed", room);
        Ok(())
    }

    /// Join a room as a publisher
    ///
    /// Returns the publishers already active in the room. Joining twice is a
    /// caller error; membership only clears on `reset`.
    pub async fn join_publisher(
        &self,
        room: u64,
        user_id: u64,
        display: Option<&str>,
    ) -> Result<Vec<PublisherInfo>> {
        if let Some(current) = *self.membership.read().await {
            return Err(Error::AlreadyJoined(current.room_id));
        }
        let handle = self.require_publisher().await?;

        let body = RoomRequest::Join {
            room,
            ptype: ParticipantType::Publisher,
            id: Some(user_id),
            display: display.map(|d| d.to_string()),
            streams: None,
            private_id: None,
        }
        .to_body()?;

        let frame = self
            .transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        let joined: JoinedRoom = frame.plugin_payload()?;

        *self.membership.write().await = Some(RoomMembership { room_id: room, user_id });
        *self.private_id.write().await = joined.private_id;
        info!(
            "Joined room {} as user {} ({} active publishers)",
            room,
            user_id,
            joined.publishers.len()
        );
        Ok(joined.publishers)
    }

    /// Negotiate the publisher media session
    ///
    /// Sends the engine's offer with the summed track budgets and returns the
    /// gateway's answer.
    pub async fn configure_media(&self, offer: Jsep, tracks: &[LocalTrack]) -> Result<Jsep> {
        self.send_configure(offer, tracks, false).await
    }

    /// Renegotiate the publisher session with an ICE restart offer
    pub async fn restart_publisher(&self, offer: Jsep, tracks: &[LocalTrack]) -> Result<Jsep> {
        self.send_configure(offer, tracks, true).await
    }

    async fn send_configure(&self, offer: Jsep, tracks: &[LocalTrack], restart: bool) -> Result<Jsep> {
        let handle = self.require_publisher().await?;
        let body = RoomRequest::Configure {
            bitrate: total_bitrate_bps(tracks),
            restart: restart.then_some(true),
        }
        .to_body()?;

        let frame = self
            .transport
            .send(
                RequestKind::Message,
                Some(body),
                Some(offer),
                SendOptions::plugin(handle),
            )
            .await?;

        let answer = frame.jsep.ok_or_else(|| {
            Error::ProtocolViolation("configure reply carries no session description".to_string())
        })?;
        if !answer.is_answer() {
            return Err(Error::ProtocolViolation(
                "configure reply carries an offer, expected an answer".to_string(),
            ));
        }
        Ok(answer)
    }

    /// Stop publishing while staying in the room
    pub async fn unpublish(&self) -> Result<()> {
        let handle = self.require_publisher().await?;
        let body = RoomRequest::Unpublish.to_body()?;
        self.transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        debug!("Unpublished");
        Ok(())
    }

    /// Join the subscriber session with an initial stream selection
    pub async fn join_subscriber(&self, streams: Vec<StreamSelector>) -> Result<SubscriptionUpdate> {
        let membership = self.membership.read().await.ok_or_else(|| {
            Error::InvalidOperation("join a room before subscribing".to_string())
        })?;
        let handle = self.require_subscriber().await?;

        let body = RoomRequest::Join {
            room: membership.room_id,
            ptype: ParticipantType::Subscriber,
            id: None,
            display: None,
            streams: Some(streams),
            private_id: *self.private_id.read().await,
        }
        .to_body()?;

        let frame = self
            .transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        self.subscription_update(frame, true)
    }

    /// Add streams to the existing subscriber session
    pub async fn subscribe(&self, streams: Vec<StreamSelector>) -> Result<SubscriptionUpdate> {
        let handle = self.require_subscriber().await?;
        let body = RoomRequest::Subscribe { streams }.to_body()?;
        let frame = self
            .transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        self.subscription_update(frame, true)
    }

    /// Remove streams from the subscriber session
    pub async fn unsubscribe(&self, streams: Vec<StreamSelector>) -> Result<SubscriptionUpdate> {
        let handle = self.require_subscriber().await?;
        let body = RoomRequest::Unsubscribe { streams }.to_body()?;
        let frame = self
            .transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        self.subscription_update(frame, false)
    }

    /// Accept the subscriber offer and start media flow
    pub async fn start(&self, answer: Jsep) -> Result<()> {
        let handle = self.require_subscriber().await?;
        let body = RoomRequest::Start.to_body()?;
        self.transport
            .send(
                RequestKind::Message,
                Some(body),
                Some(answer),
                SendOptions::plugin(handle),
            )
            .await?;
        debug!("Subscriber media started");
        Ok(())
    }

    /// Ask the gateway for an ICE restart offer on the subscriber session
    pub async fn restart_subscriber_ice(&self) -> Result<Jsep> {
        let handle = self.require_subscriber().await?;
        let body = RoomRequest::Configure {
            bitrate: None,
            restart: Some(true),
        }
        .to_body()?;

        let frame = self
            .transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        let offer = frame.jsep.ok_or_else(|| {
            Error::ProtocolViolation("restart reply carries no session description".to_string())
        })?;
        if !offer.is_offer() {
            return Err(Error::ProtocolViolation(
                "restart reply carries an answer, expected an offer".to_string(),
            ));
        }
        Ok(offer)
    }

    /// Leave the room
    pub async fn leave(&self) -> Result<()> {
        let handle = self.require_publisher().await?;
        let body = RoomRequest::Leave.to_body()?;
        self.transport
            .send(RequestKind::Message, Some(body), None, SendOptions::plugin(handle))
            .await?;
        debug!("Left room");
        Ok(())
    }

    /// Forget handles and membership after a full teardown
    ///
    /// Not called on claim-based recovery, where the gateway still holds
    /// both handles and the membership they carry.
    pub async fn reset(&self) {
        *self.publisher_handle.write().await = None;
        *self.subscriber_handle.write().await = None;
        *self.membership.write().await = None;
        *self.private_id.write().await = None;
    }

    fn extract_update(frame: ServerFrame) -> SubscriptionUpdate {
        let streams = frame
            .plugindata
            .as_ref()
            .and_then(|p| serde_json::from_value::<StreamsPayload>(p.data.clone()).ok())
            .map(|p| p.streams)
            .unwrap_or_default();
        SubscriptionUpdate {
            streams,
            description: frame.jsep,
        }
    }

    fn subscription_update(
        &self,
        frame: ServerFrame,
        description_required: bool,
    ) -> Result<SubscriptionUpdate> {
        let update = Self::extract_update(frame);
        if description_required && update.description.is_none() {
            return Err(Error::ProtocolViolation(
                "subscribe reply carries no renegotiation offer".to_string(),
            ));
        }
        Ok(update)
    }

    async fn require_publisher(&self) -> Result<u64> {
        self.publisher_handle
            .read()
            .await
            .ok_or_else(|| Error::HandleNotAttached("publisher".to_string()))
    }

    async fn require_subscriber(&self) -> Result<u64> {
        self.subscriber_handle
            .read()
            .await
            .ok_or_else(|| Error::HandleNotAttached("subscriber".to_string()))
    }
}
