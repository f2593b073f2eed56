//! Serialized subscription work
//!
//! Subscription changes renegotiate the shared subscriber connection, so two
//! in flight at once would corrupt each other's stream tables. All of them
//! funnel through a single worker; each job completes, including the wait
//! for its media to arrive, before the next one starts.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::room::ClientInner;
use crate::error::{Error, Result};
use crate::media::tracks::{MediaTrack, RemoteTrack, TrackKind};
use crate::signaling::room::PublishedTrack;

/// A subscription change to run on the worker
#[derive(Debug, Clone)]
pub(crate) enum SubscribeCommand {
    /// Subscribe to one announced track of a publisher
    Add { user_id: u64, track: PublishedTrack },

    /// Drop every subscription to a publisher
    Remove { user_id: u64 },
}

/// Remote media handed from the event pump to the waiting job
#[derive(Debug)]
pub(crate) struct TrackArrival {
    pub mid: String,
    pub track: Arc<dyn MediaTrack>,
}

struct SubscribeJob {
    command: SubscribeCommand,
    reply: oneshot::Sender<Result<Option<RemoteTrack>>>,
}

/// Single-concurrency subscription worker
///
/// Dropping the queue aborts the worker and cancels queued jobs; their
/// callers see a cancellation error. The client replaces the whole queue on
/// teardown, which is how stale work from a previous connection epoch is
/// discarded.
pub(crate) struct SubscribeQueue {
    jobs: mpsc::UnboundedSender<SubscribeJob>,
    arrivals: mpsc::UnboundedSender<TrackArrival>,
    worker: JoinHandle<()>,
}

/// Cheap handle for submitting work without keeping the queue alive
///
/// Callers hold this across the await for their result, so the queue itself
/// can be dropped mid-flight and the caller still resolves.
#[derive(Clone)]
pub(crate) struct QueueHandle {
    jobs: mpsc::UnboundedSender<SubscribeJob>,
}

impl SubscribeQueue {
    /// Start the worker against the client internals
    ///
    /// The worker holds a weak reference; jobs fail cleanly if the client is
    /// dropped while work is queued.
    pub fn start(inner: Weak<ClientInner>) -> Self {
        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel::<SubscribeJob>();
        let (arrivals_tx, mut arrivals_rx) = mpsc::unbounded_channel::<TrackArrival>();

        let worker = tokio::spawn(async move {
            while let Some(job) = jobs_rx.recv().await {
                let result = match inner.upgrade() {
                    Some(inner) => {
                        inner
                            .execute_subscribe(job.command, &mut arrivals_rx)
                            .await
                    }
                    None => Err(Error::InvalidOperation("client closed".to_string())),
                };
                let _ = job.reply.send(result);
            }
            debug!("Subscribe worker exiting");
        });

        Self {
            jobs: jobs_tx,
            arrivals: arrivals_tx,
            worker,
        }
    }

    /// Handle for submitting commands
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            jobs: self.jobs.clone(),
        }
    }

    /// Where the event pump forwards subscriber track arrivals
    pub fn arrivals(&self) -> mpsc::UnboundedSender<TrackArrival> {
        self.arrivals.clone()
    }
}

impl Drop for SubscribeQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl QueueHandle {
    /// Run a command on the worker and wait for its outcome
    pub async fn run(&self, command: SubscribeCommand) -> Result<Option<RemoteTrack>> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(SubscribeJob { command, reply: tx })
            .map_err(|_| Error::InvalidOperation("subscription queue closed".to_string()))?;
        rx.await
            .map_err(|_| Error::InvalidOperation("subscription canceled by teardown".to_string()))?
    }
}

/// Subscription slots held for one remote publisher
#[derive(Debug, Clone, Default)]
pub(crate) struct RemoteSubscription {
    pub audio: Option<RemoteTrack>,
    pub video: Option<RemoteTrack>,
}

impl RemoteSubscription {
    /// Put a track into its slot, returning the displaced one
    pub fn bind(&mut self, track: RemoteTrack) -> Option<RemoteTrack> {
        let slot = match track.kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        };
        slot.replace(track)
    }

    /// Remove the track bound to a stable identity, whichever slot holds it
    pub fn remove_stable(&mut self, stable_mid: &str) -> Option<RemoteTrack> {
        if self.audio.as_ref().is_some_and(|t| t.stable_mid == stable_mid) {
            return self.audio.take();
        }
        if self.video.as_ref().is_some_and(|t| t.stable_mid == stable_mid) {
            return self.video.take();
        }
        None
    }

    /// Take every bound track
    pub fn drain(&mut self) -> Vec<RemoteTrack> {
        self.audio.take().into_iter().chain(self.video.take()).collect()
    }

    /// Check whether any slot is bound
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}
