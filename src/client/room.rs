//! Room client façade
//!
//! Ties the signaling stack and the media engine together behind one typed
//! API: connect, join, publish, subscribe, and a room event stream. A single
//! event pump consumes both gateway frames and engine events, so room state
//! is only ever mutated from one task plus the serialized subscribe worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::events::{ConnectionState, RoomEvent};
use crate::client::reconnect::RetryPolicy;
use crate::client::subscriber::{
    QueueHandle, RemoteSubscription, SubscribeCommand, SubscribeQueue, TrackArrival,
};
use crate::client::track_map::{TrackMap, TrackMapEntry};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::media::engine::{EngineEvent, MediaEngine, MediaPeer, PeerRole};
use crate::media::tracks::{LocalTrack, MediaTrack, RemoteTrack};
use crate::signaling::room::{
    CreateRoomOptions, PublishedTrack, PublisherInfo, RoomChannel, RoomMembership, RoomUpdate,
    StreamSelector, SubscriptionUpdate,
};
use crate::signaling::session::GatewaySession;
use crate::signaling::transport::{SignalEvent, SignalTransport};

/// Client for one gateway connection and at most one room
///
/// Create it with a media engine, receive events on the channel handed back,
/// then `connect` and `join`. All methods are cheap to call from any task;
/// the client is `Send + Sync` and can be shared by reference.
pub struct RoomClient {
    inner: Arc<ClientInner>,
}

impl RoomClient {
    /// Create a client and its event stream
    ///
    /// Validates the configuration up front. No connection is made until
    /// `connect` is called.
    pub fn new(
        config: ClientConfig,
        engine: Arc<dyn MediaEngine>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RoomEvent>)> {
        config.validate()?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(SignalTransport::new(
            config.gateway_url.clone(),
            config.api_token.clone(),
            Duration::from_millis(config.request_timeout_ms),
            signal_tx,
        ));
        let session = GatewaySession::new(
            transport.clone(),
            Duration::from_secs(config.keepalive_interval_secs),
        );
        let room = RoomChannel::new(
            transport.clone(),
            config.video_codec,
            config.admin_key.clone(),
        );

        let inner = Arc::new(ClientInner {
            config,
            transport,
            session,
            room,
            engine,
            state: RwLock::new(ConnectionState::Disconnected),
            events: events_tx,
            engine_events: engine_tx,
            publisher_peer: RwLock::new(None),
            subscriber_peer: RwLock::new(None),
            published: RwLock::new(Vec::new()),
            track_map: RwLock::new(TrackMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            queue: RwLock::new(None),
            mute_timers: Mutex::new(HashMap::new()),
            pump_sources: Mutex::new(Some(PumpSources {
                signal_rx,
                engine_rx,
            })),
            pump: Mutex::new(None),
        });

        Ok((Self { inner }, events_rx))
    }

    /// Connect to the gateway and establish a session
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    /// Check whether a room exists at the gateway
    pub async fn room_exists(&self, room: u64) -> Result<bool> {
        self.inner.require_connected().await?;
        self.inner.room.exists(room).await
    }

    /// Create a room
    pub async fn create_room(&self, room: u64, options: CreateRoomOptions) -> Result<()> {
        self.inner.require_connected().await?;
        self.inner.room.create_room(room, options).await
    }

    /// Destroy a room
    pub async fn destroy_room(&self, room: u64) -> Result<()> {
        self.inner.require_connected().await?;
        self.inner.room.destroy_room(room).await
    }

    /// Join a room as the given participant
    ///
    /// Tracks already announced by other participants are replayed as
    /// `UserPublished` events before this returns.
    pub async fn join(&self, room: u64, user_id: u64, display: Option<&str>) -> Result<()> {
        self.inner.join(room, user_id, display).await
    }

    /// Publish local tracks into the joined room
    pub async fn publish(&self, tracks: Vec<LocalTrack>) -> Result<()> {
        self.inner.publish(tracks).await
    }

    /// Stop publishing while staying in the room
    pub async fn unpublish(&self) -> Result<()> {
        self.inner.unpublish().await
    }

    /// Subscribe to a track another participant announced
    ///
    /// Resolves once the media engine has the track flowing. Subscribing to
    /// a kind already held for that participant replaces the old track.
    pub async fn subscribe(&self, user_id: u64, track: &PublishedTrack) -> Result<RemoteTrack> {
        self.inner.subscribe(user_id, track).await
    }

    /// Drop every subscription to a participant
    pub async fn unsubscribe(&self, user_id: u64) -> Result<()> {
        self.inner.unsubscribe(user_id).await
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Check whether room operations are currently available
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Current room membership, if joined
    pub async fn current_room(&self) -> Option<RoomMembership> {
        self.inner.room.membership().await
    }

    /// The engine track bound to a stable identity, if one has been bound
    ///
    /// Stable identities arrive in [`RemoteTrack`] and in `UserUnpublished`
    /// events; this resolves one back to its media handle. Bindings outlive
    /// table rebuilds and clear on disconnect.
    pub async fn remote_track(&self, stable_mid: &str) -> Option<Arc<dyn MediaTrack>> {
        self.inner.track_map.read().await.track(stable_mid)
    }

    /// The publisher owning a stable identity, while its stream is in the
    /// current subscription table
    pub async fn remote_user(&self, stable_mid: &str) -> Option<u64> {
        self.inner.track_map.read().await.user(stable_mid)
    }

    /// Leave the room, destroy the session and release everything
    ///
    /// Idempotent; closing a disconnected client does nothing.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

struct PumpSources {
    signal_rx: mpsc::UnboundedReceiver<SignalEvent>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

enum PumpItem {
    Signal(SignalEvent),
    Engine(EngineEvent),
}

/// Shared internals behind the client façade
pub(crate) struct ClientInner {
    config: ClientConfig,
    transport: Arc<SignalTransport>,
    session: GatewaySession,
    room: RoomChannel,
    engine: Arc<dyn MediaEngine>,
    state: RwLock<ConnectionState>,
    events: mpsc::UnboundedSender<RoomEvent>,
    engine_events: mpsc::UnboundedSender<EngineEvent>,
    publisher_peer: RwLock<Option<Arc<dyn MediaPeer>>>,
    subscriber_peer: RwLock<Option<Arc<dyn MediaPeer>>>,
    published: RwLock<Vec<LocalTrack>>,
    track_map: RwLock<TrackMap>,
    subscriptions: RwLock<HashMap<u64, RemoteSubscription>>,
    queue: RwLock<Option<SubscribeQueue>>,
    mute_timers: Mutex<HashMap<String, JoinHandle<()>>>,
    pump_sources: Mutex<Option<PumpSources>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ClientInner {
    // ========== Connection lifecycle ==========

    async fn connect(self: &Arc<Self>) -> Result<()> {
        self.transition_from(
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            Some("connect requested"),
        )
        .await
        .map_err(|actual| {
            Error::InvalidOperation(format!("cannot connect while {}", actual))
        })?;

        match self.establish().await {
            Ok(()) => {
                let _ = self
                    .transition_from(
                        ConnectionState::Connecting,
                        ConnectionState::Connected,
                        Some("session established"),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.session.stop_keepalive().await;
                self.transport.shutdown().await;
                self.transport.clear_session();
                self.room.reset().await;
                let _ = self
                    .transition_from(
                        ConnectionState::Connecting,
                        ConnectionState::Disconnected,
                        Some("connect failed"),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn establish(self: &Arc<Self>) -> Result<()> {
        self.transport.connect().await?;
        self.session.create().await?;
        self.room.attach_publisher().await?;
        self.session.start_keepalive().await;
        self.start_pump().await;
        *self.queue.write().await = Some(SubscribeQueue::start(Arc::downgrade(self)));
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.write().await;
            match *state {
                ConnectionState::Disconnected | ConnectionState::Disconnecting => {
                    debug!("Close on a client that is already {}", *state);
                    return Ok(());
                }
                previous => {
                    *state = ConnectionState::Disconnecting;
                    previous
                }
            }
        };
        self.notify_transition(previous, ConnectionState::Disconnecting, Some("close requested"));

        // Say goodbye while the transport may still be up
        if self.transport.is_connected().await {
            if self.room.membership().await.is_some() {
                if let Err(e) = self.room.leave().await {
                    debug!("Leave failed during close: {}", e);
                }
            }
            self.session.destroy().await;
        } else {
            self.session.stop_keepalive().await;
        }

        self.teardown().await;
        let _ = self
            .transition_from(
                ConnectionState::Disconnecting,
                ConnectionState::Disconnected,
                Some("closed"),
            )
            .await;
        Ok(())
    }

    /// Full teardown back to a blank slate, keeping only the configuration
    async fn teardown(&self) {
        self.session.stop_keepalive().await;
        self.transport.shutdown().await;
        self.transport.clear_session();
        self.room.reset().await;

        // Dropping the queue aborts the worker and cancels queued jobs
        *self.queue.write().await = None;

        for (_, timer) in self.mute_timers.lock().await.drain() {
            timer.abort();
        }
        if let Some(peer) = self.publisher_peer.write().await.take() {
            if let Err(e) = peer.close().await {
                debug!("Publisher peer close failed: {}", e);
            }
        }
        if let Some(peer) = self.subscriber_peer.write().await.take() {
            if let Err(e) = peer.close().await {
                debug!("Subscriber peer close failed: {}", e);
            }
        }
        self.published.write().await.clear();
        self.subscriptions.write().await.clear();
        self.track_map.write().await.reset();
    }

    /// Move to `next` if the state is `expected`, else report the actual one
    async fn transition_from(
        &self,
        expected: ConnectionState,
        next: ConnectionState,
        reason: Option<&str>,
    ) -> std::result::Result<(), ConnectionState> {
        {
            let mut state = self.state.write().await;
            if *state != expected {
                return Err(*state);
            }
            *state = next;
        }
        self.notify_transition(expected, next, reason);
        Ok(())
    }

    fn notify_transition(
        &self,
        previous: ConnectionState,
        next: ConnectionState,
        reason: Option<&str>,
    ) {
        info!("Connection state: {} -> {}", previous, next);
        let _ = self.events.send(RoomEvent::ConnectionChanged {
            current: next,
            previous,
            reason: reason.map(|r| r.to_string()),
        });
    }

    pub(crate) async fn require_connected(&self) -> Result<()> {
        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            return Err(Error::InvalidOperation(format!(
                "client is {}, expected connected",
                state
            )));
        }
        Ok(())
    }

    // ========== Reconnection ==========

    async fn run_reconnect(&self) {
        let policy = RetryPolicy::new(&self.config.reconnect);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let delay = policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if *self.state.read().await != ConnectionState::Reconnecting {
                debug!("Resynchronization abandoned, client state changed");
                return;
            }
            if policy.exhausted(attempt, started.elapsed()) {
                error!(
                    "Resynchronization gave up after {} attempts over {:?}",
                    attempt,
                    started.elapsed()
                );
                self.teardown().await;
                let _ = self
                    .transition_from(
                        ConnectionState::Reconnecting,
                        ConnectionState::Disconnected,
                        Some("reconnection exhausted"),
                    )
                    .await;
                return;
            }

            match self.resync().await {
                Ok(()) => {
                    let _ = self
                        .transition_from(
                            ConnectionState::Reconnecting,
                            ConnectionState::Connected,
                            Some("session resynchronized"),
                        )
                        .await;
                    info!("Resynchronized after {} retries", attempt);
                    return;
                }
                Err(e) => {
                    warn!(
                        "Reconnect attempt {}/{} failed: {}",
                        attempt + 1,
                        policy.max_attempts(),
                        e
                    );
                    attempt += 1;
                }
            }
        }
    }

    /// One resynchronization attempt: reconnect, claim, restart media
    async fn resync(&self) -> Result<()> {
        self.transport.connect().await?;
        self.session.claim().await?;

        let publisher = self.publisher_peer.read().await.clone();
        if let Some(peer) = publisher {
            let tracks = self.published.read().await.clone();
            if tracks.is_empty() {
                return Err(Error::NoPublishedTracks);
            }
            let offer = peer.create_offer(true).await?;
            let answer = self.room.restart_publisher(offer, &tracks).await?;
            peer.apply_answer(answer).await?;
        }

        let subscriber = self.subscriber_peer.read().await.clone();
        if let Some(peer) = subscriber {
            let offer = self.room.restart_subscriber_ice().await?;
            let answer = peer.create_answer(offer).await?;
            self.room.start(answer).await?;
        }

        self.session.start_keepalive().await;
        Ok(())
    }

    // ========== Room operations ==========

    pub(crate) async fn join(
        &self,
        room: u64,
        user_id: u64,
        display: Option<&str>,
    ) -> Result<()> {
        self.require_connected().await?;
        let publishers = self.room.join_publisher(room, user_id, display).await?;
        for publisher in publishers {
            self.announce_publisher(publisher);
        }
        Ok(())
    }

    pub(crate) async fn publish(&self, tracks: Vec<LocalTrack>) -> Result<()> {
        self.require_connected().await?;
        if tracks.is_empty() {
            return Err(Error::InvalidOperation(
                "publish requires at least one track".to_string(),
            ));
        }
        if self.room.membership().await.is_none() {
            return Err(Error::InvalidOperation(
                "join a room before publishing".to_string(),
            ));
        }

        let peer = self.ensure_peer(PeerRole::Publisher).await?;
        for track in &tracks {
            peer.add_track(track).await?;
        }
        let offer = peer.create_offer(false).await?;
        let answer = self.room.configure_media(offer, &tracks).await?;
        peer.apply_answer(answer).await?;

        info!("Publishing {} local tracks", tracks.len());
        *self.published.write().await = tracks;
        Ok(())
    }

    pub(crate) async fn unpublish(&self) -> Result<()> {
        self.require_connected().await?;
        if self.published.read().await.is_empty() {
            return Err(Error::InvalidOperation("nothing is published".to_string()));
        }

        self.room.unpublish().await?;
        if let Some(peer) = self.publisher_peer.write().await.take() {
            if let Err(e) = peer.close().await {
                warn!("Publisher peer close failed: {}", e);
            }
        }
        self.published.write().await.clear();
        Ok(())
    }

    pub(crate) async fn subscribe(
        &self,
        user_id: u64,
        track: &PublishedTrack,
    ) -> Result<RemoteTrack> {
        self.require_connected().await?;
        let handle = self.queue_handle().await?;
        match handle
            .run(SubscribeCommand::Add {
                user_id,
                track: track.clone(),
            })
            .await?
        {
            Some(remote) => Ok(remote),
            None => Err(Error::ProtocolViolation(
                "subscription completed without a track".to_string(),
            )),
        }
    }

    pub(crate) async fn unsubscribe(&self, user_id: u64) -> Result<()> {
        self.require_connected().await?;
        let handle = self.queue_handle().await?;
        handle.run(SubscribeCommand::Remove { user_id }).await?;
        Ok(())
    }

    async fn queue_handle(&self) -> Result<QueueHandle> {
        self.queue
            .read()
            .await
            .as_ref()
            .map(|q| q.handle())
            .ok_or_else(|| Error::InvalidOperation("client is not connected".to_string()))
    }

    // ========== Subscription work (runs on the queue worker) ==========

    pub(crate) async fn execute_subscribe(
        &self,
        command: SubscribeCommand,
        arrivals: &mut mpsc::UnboundedReceiver<TrackArrival>,
    ) -> Result<Option<RemoteTrack>> {
        match command {
            SubscribeCommand::Add { user_id, track } => self
                .subscribe_track(user_id, track, arrivals)
                .await
                .map(Some),
            SubscribeCommand::Remove { user_id } => {
                self.unsubscribe_user(user_id).await?;
                Ok(None)
            }
        }
    }

    async fn subscribe_track(
        &self,
        user_id: u64,
        track: PublishedTrack,
        arrivals: &mut mpsc::UnboundedReceiver<TrackArrival>,
    ) -> Result<RemoteTrack> {
        // Arrivals from earlier renegotiations are stale by now
        while arrivals.try_recv().is_ok() {}

        let first = self.room.subscriber_handle().await.is_none();
        if first {
            self.room.attach_subscriber().await?;
        }
        let peer = self.ensure_peer(PeerRole::Subscriber).await?;

        let selector = StreamSelector::track(user_id, track.mid.clone());
        let update = if first {
            self.room.join_subscriber(vec![selector]).await?
        } else {
            self.room.subscribe(vec![selector]).await?
        };
        self.apply_subscription_update(&update).await;

        let offer = update.description.ok_or_else(|| {
            Error::ProtocolViolation("subscribe reply carries no renegotiation offer".to_string())
        })?;
        let answer = peer.create_answer(offer).await?;
        self.room.start(answer).await?;

        let timeout = Duration::from_millis(self.config.subscribe_track_timeout_ms);
        let arrival = tokio::time::timeout(timeout, arrivals.recv())
            .await
            .map_err(|_| Error::RequestTimeout {
                request: format!("subscriber track {}/{}", user_id, track.mid),
                timeout_ms: self.config.subscribe_track_timeout_ms,
            })?
            .ok_or_else(|| {
                Error::InvalidOperation("subscription canceled by teardown".to_string())
            })?;

        let entry = self
            .track_map
            .write()
            .await
            .bind(user_id, &arrival.mid, arrival.track.clone())
            .ok_or_else(|| {
                Error::ProtocolViolation(format!(
                    "no stream table row for user {} mid {}",
                    user_id, arrival.mid
                ))
            })?;

        let remote = RemoteTrack {
            user_id,
            stable_mid: entry.stable_mid.clone(),
            ephemeral_mid: entry.ephemeral_mid.clone(),
            kind: entry.kind,
            codec: track.codec.clone(),
            media: arrival.track,
        };

        let displaced = self
            .subscriptions
            .write()
            .await
            .entry(user_id)
            .or_default()
            .bind(remote.clone());
        if let Some(old) = displaced {
            debug!("Replacing {} subscription for user {}", old.kind, user_id);
            if let Err(e) = peer.stop_track(&old.ephemeral_mid).await {
                debug!("Stopping replaced track failed: {}", e);
            }
        }

        info!(
            "Subscribed to user {} {} as {}",
            user_id, remote.kind, remote.stable_mid
        );
        Ok(remote)
    }

    async fn unsubscribe_user(&self, user_id: u64) -> Result<()> {
        let mut existing = self
            .subscriptions
            .write()
            .await
            .remove(&user_id)
            .ok_or_else(|| {
                Error::InvalidOperation(format!("no subscription for user {}", user_id))
            })?;

        let update = self
            .room
            .unsubscribe(vec![StreamSelector::feed(user_id)])
            .await?;
        self.apply_subscription_update(&update).await;

        let peer = self.subscriber_peer.read().await.clone();
        if let Some(offer) = update.description {
            if let Some(peer) = &peer {
                let answer = peer.create_answer(offer).await?;
                self.room.start(answer).await?;
            }
        }
        if let Some(peer) = &peer {
            for track in existing.drain() {
                if let Err(e) = peer.stop_track(&track.ephemeral_mid).await {
                    debug!("Stopping unsubscribed track failed: {}", e);
                }
            }
        }

        info!("Unsubscribed from user {}", user_id);
        Ok(())
    }

    async fn apply_subscription_update(&self, update: &SubscriptionUpdate) {
        let entries = TrackMapEntry::from_rows(&update.streams);
        self.track_map.write().await.replace(entries);
    }

    async fn ensure_peer(&self, role: PeerRole) -> Result<Arc<dyn MediaPeer>> {
        let slot = match role {
            PeerRole::Publisher => &self.publisher_peer,
            PeerRole::Subscriber => &self.subscriber_peer,
        };
        let mut guard = slot.write().await;
        if let Some(peer) = guard.clone() {
            return Ok(peer);
        }
        let peer = self
            .engine
            .create_peer(role, self.engine_events.clone())
            .await?;
        *guard = Some(peer.clone());
        debug!("Created {} peer", role);
        Ok(peer)
    }

    // ========== Event pump ==========

    async fn start_pump(self: &Arc<Self>) {
        let mut pump_slot = self.pump.lock().await;
        if pump_slot.is_some() {
            return;
        }
        let Some(PumpSources {
            mut signal_rx,
            mut engine_rx,
        }) = self.pump_sources.lock().await.take()
        else {
            return;
        };

        let weak = Arc::downgrade(self);
        *pump_slot = Some(tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    signal = signal_rx.recv() => match signal {
                        Some(event) => PumpItem::Signal(event),
                        None => break,
                    },
                    engine = engine_rx.recv() => match engine {
                        Some(event) => PumpItem::Engine(event),
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else { break };
                match item {
                    PumpItem::Signal(event) => inner.on_signal_event(event).await,
                    PumpItem::Engine(event) => inner.on_engine_event(event).await,
                }
            }
            debug!("Event pump exiting");
        }));
    }

    async fn on_signal_event(self: &Arc<Self>, event: SignalEvent) {
        match event {
            SignalEvent::Frame(frame) => match RoomUpdate::from_frame(&frame) {
                Some(update) => self.on_room_update(update).await,
                None => debug!("Room event with nothing actionable"),
            },
            SignalEvent::Down { reason } => {
                if self
                    .transition_from(
                        ConnectionState::Connected,
                        ConnectionState::Reconnecting,
                        Some(reason.as_str()),
                    )
                    .await
                    .is_err()
                {
                    debug!("Transport drop while not connected, ignoring");
                    return;
                }
                let weak = Arc::downgrade(self);
                tokio::spawn(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.run_reconnect().await;
                    }
                });
            }
        }
    }

    async fn on_room_update(&self, update: RoomUpdate) {
        match update {
            RoomUpdate::NewPublishers(list) => {
                for publisher in list {
                    self.announce_publisher(publisher);
                }
            }
            RoomUpdate::Unpublished { user_id } => {
                self.drop_remote_user(user_id).await;
                let _ = self.events.send(RoomEvent::UserUnpublished {
                    user_id,
                    stable_mid: None,
                });
            }
            RoomUpdate::Left { user_id } => {
                self.drop_remote_user(user_id).await;
                let _ = self.events.send(RoomEvent::UserLeft { user_id });
            }
        }
    }

    fn announce_publisher(&self, publisher: PublisherInfo) {
        for track in publisher.streams {
            if track.disabled {
                continue;
            }
            let _ = self.events.send(RoomEvent::UserPublished {
                user_id: publisher.id,
                track,
            });
        }
    }

    async fn drop_remote_user(&self, user_id: u64) {
        let Some(mut subscription) = self.subscriptions.write().await.remove(&user_id) else {
            return;
        };
        let peer = self.subscriber_peer.read().await.clone();
        for track in subscription.drain() {
            if let Some(timer) = self.mute_timers.lock().await.remove(&track.stable_mid) {
                timer.abort();
            }
            if let Some(peer) = &peer {
                if let Err(e) = peer.stop_track(&track.ephemeral_mid).await {
                    debug!("Stopping departed track failed: {}", e);
                }
            }
        }
    }

    async fn on_engine_event(self: &Arc<Self>, event: EngineEvent) {
        match event {
            EngineEvent::IceCandidate { role, candidate } => {
                match self.handle_for(role).await {
                    Some(handle) => {
                        if let Err(e) = self.transport.post_trickle(handle, Some(candidate)).await
                        {
                            debug!("Candidate relay failed: {}", e);
                        }
                    }
                    None => debug!("Dropping candidate for unattached {} handle", role),
                }
            }
            EngineEvent::IceGatheringComplete { role } => {
                if let Some(handle) = self.handle_for(role).await {
                    if let Err(e) = self.transport.post_trickle(handle, None).await {
                        debug!("Candidate completion relay failed: {}", e);
                    }
                }
            }
            EngineEvent::ConnectionChange { role, state } => {
                debug!("{} peer connection is {:?}", role, state);
            }
            EngineEvent::TrackAdded { role, mid, track } => {
                if role != PeerRole::Subscriber {
                    debug!("Ignoring engine track on {} peer", role);
                    return;
                }
                let arrivals = { self.queue.read().await.as_ref().map(|q| q.arrivals()) };
                match arrivals {
                    Some(arrivals) => {
                        let _ = arrivals.send(TrackArrival { mid, track });
                    }
                    None => debug!("Track arrived with no subscription work pending"),
                }
            }
            EngineEvent::TrackEnded { mid } => self.on_track_ended(&mid).await,
            EngineEvent::TrackMuted { mid } => self.on_track_muted(&mid).await,
            EngineEvent::TrackUnmuted { mid } => self.on_track_unmuted(&mid).await,
            EngineEvent::Stats { report } => {
                let _ = self.events.send(RoomEvent::QualityReport { report });
            }
        }
    }

    async fn handle_for(&self, role: PeerRole) -> Option<u64> {
        match role {
            PeerRole::Publisher => self.room.publisher_handle().await,
            PeerRole::Subscriber => self.room.subscriber_handle().await,
        }
    }

    async fn on_track_ended(&self, mid: &str) {
        let entry = self.track_map.read().await.entry_by_ephemeral(mid).cloned();
        let Some(entry) = entry else {
            debug!("Ended track on unmapped mid {}", mid);
            return;
        };
        if let Some(timer) = self.mute_timers.lock().await.remove(&entry.stable_mid) {
            timer.abort();
        }
        if self
            .remove_subscription_slot(entry.user_id, &entry.stable_mid)
            .await
        {
            let _ = self.events.send(RoomEvent::UserUnpublished {
                user_id: entry.user_id,
                stable_mid: Some(entry.stable_mid),
            });
        }
    }

    /// Muted tracks become unpublish events only after a debounce, so a
    /// brief renegotiation gap does not masquerade as a departure.
    async fn on_track_muted(self: &Arc<Self>, mid: &str) {
        let entry = self.track_map.read().await.entry_by_ephemeral(mid).cloned();
        let Some(entry) = entry else {
            debug!("Muted track on unmapped mid {}", mid);
            return;
        };
        debug!("Track {} muted, starting debounce", entry.stable_mid);

        let weak = Arc::downgrade(self);
        let stable_mid = entry.stable_mid.clone();
        let user_id = entry.user_id;
        let debounce = Duration::from_millis(self.config.mute_debounce_ms);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(inner) = weak.upgrade() else { return };
            inner.mute_timers.lock().await.remove(&stable_mid);
            if inner.remove_subscription_slot(user_id, &stable_mid).await {
                info!(
                    "Track {} stayed silent for {:?}, treating as unpublished",
                    stable_mid, debounce
                );
                let _ = inner.events.send(RoomEvent::UserUnpublished {
                    user_id,
                    stable_mid: Some(stable_mid.clone()),
                });
            }
        });

        let mut timers = self.mute_timers.lock().await;
        if let Some(old) = timers.insert(entry.stable_mid.clone(), timer) {
            old.abort();
        }
    }

    async fn on_track_unmuted(&self, mid: &str) {
        let stable_mid = self
            .track_map
            .read()
            .await
            .entry_by_ephemeral(mid)
            .map(|e| e.stable_mid.clone());
        let Some(stable_mid) = stable_mid else { return };
        if let Some(timer) = self.mute_timers.lock().await.remove(&stable_mid) {
            timer.abort();
            debug!("Track {} resumed before the debounce elapsed", stable_mid);
        }
    }

    async fn remove_subscription_slot(&self, user_id: u64, stable_mid: &str) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(subscription) = subscriptions.get_mut(&user_id) else {
            return false;
        };
        let removed = subscription.remove_stable(stable_mid).is_some();
        if subscription.is_empty() {
            subscriptions.remove(&user_id);
        }
        removed
    }
}
