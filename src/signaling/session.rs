//! Gateway session lifecycle
//!
//! A session is the billing unit the gateway holds state against. It must be
//! kept alive with periodic keepalives or the gateway reaps it, and it can be
//! claimed over a fresh connection after a transport drop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::signaling::protocol::RequestKind;
use crate::signaling::transport::{SendOptions, SignalTransport};

/// Manages one gateway session over a shared transport
pub struct GatewaySession {
    transport: Arc<SignalTransport>,
    keepalive_interval: Duration,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
}

impl GatewaySession {
    /// Create a session manager over the given transport
    pub fn new(transport: Arc<SignalTransport>, keepalive_interval: Duration) -> Self {
        Self {
            transport,
            keepalive_interval,
            keepalive_task: Mutex::new(None),
        }
    }

    /// Create a fresh session and scope the transport to it
    pub async fn create(&self) -> Result<u64> {
        let frame = self
            .transport
            .send(RequestKind::Create, None, None, SendOptions::default())
            .await?;
        let id = frame.data.map(|d| d.id).ok_or_else(|| {
            Error::ProtocolViolation("create reply carries no session id".to_string())
        })?;

        self.transport.set_session(id);
        info!("Gateway session {} created", id);
        Ok(id)
    }

    /// Re-bind the previous session to the current connection
    ///
    /// Only valid after a reconnect while the gateway still holds the
    /// session. Handles attached before the drop remain usable afterwards.
    pub async fn claim(&self) -> Result<u64> {
        let id = self.transport.session_id().ok_or(Error::NoSessionToClaim)?;
        self.transport
            .send(RequestKind::Claim, None, None, SendOptions::default())
            .await?;
        info!("Gateway session {} claimed", id);
        Ok(id)
    }

    /// Session id currently scoped, if any
    pub fn id(&self) -> Option<u64> {
        self.transport.session_id()
    }

    /// Start the keepalive timer, replacing any previous one
    ///
    /// Must be restarted after a claim so ticks resume on the new
    /// connection without waiting out a stale interval.
    pub async fn start_keepalive(&self) {
        let transport = self.transport.clone();
        let period = self.keepalive_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; the session was just created
            // or claimed, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                transport.post_keepalive().await;
            }
        });

        let mut slot = self.keepalive_task.lock().await;
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
        debug!("Keepalive timer started ({:?} period)", period);
    }

    /// Stop the keepalive timer if it is running
    pub async fn stop_keepalive(&self) {
        if let Some(task) = self.keepalive_task.lock().await.take() {
            task.abort();
            debug!("Keepalive timer stopped");
        }
    }

    /// Tear down the session at the gateway, best effort
    ///
    /// The gateway reaps unreferenced sessions on its own, so a failed
    /// destroy is only worth a warning.
    pub async fn destroy(&self) {
        self.stop_keepalive().await;

        if let Some(id) = self.transport.session_id() {
            if self.transport.is_connected().await {
                match self
                    .transport
                    .send(RequestKind::Destroy, None, None, SendOptions::default())
                    .await
                {
                    Ok(_) => info!("Gateway session {} destroyed", id),
                    Err(e) => warn!("Failed to destroy session {}: {}", id, e),
                }
            }
        }
        self.transport.clear_session();
    }
}
