//! Ephemeral-to-stable track identity map
//!
//! Subscriber renegotiations reshuffle connection-slot mids, so a mid seen on
//! an engine event is only meaningful against the latest stream table. This
//! map keeps that table and binds engine tracks to identities that survive
//! renegotiation: the pair of publisher id and publisher-side mid.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::media::tracks::{MediaTrack, TrackKind};
use crate::signaling::room::StreamRow;

/// One row of the identity table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMapEntry {
    /// Audio or video
    pub kind: TrackKind,

    /// Publisher the stream comes from
    pub user_id: u64,

    /// Subscriber-connection mid, valid until the next renegotiation
    pub ephemeral_mid: String,

    /// Identity that survives renegotiation
    pub stable_mid: String,
}

impl TrackMapEntry {
    /// Build table rows from a gateway stream table
    ///
    /// Rows without a kind, feed or publisher-side mid are deactivated slots
    /// and are skipped. The stable mid is composed from the publisher id and
    /// its mid, which keeps it unique across publishers.
    pub fn from_rows(rows: &[StreamRow]) -> Vec<TrackMapEntry> {
        rows.iter()
            .filter(|row| row.active != Some(false))
            .filter_map(|row| {
                let kind = row.kind?;
                let user_id = row.feed_id?;
                let feed_mid = row.feed_mid.as_ref()?;
                Some(TrackMapEntry {
                    kind,
                    user_id,
                    ephemeral_mid: row.mid.clone(),
                    stable_mid: format!("{}/{}", user_id, feed_mid),
                })
            })
            .collect()
    }
}

/// Identity table plus the engine tracks bound through it
///
/// The table is replaced wholesale on every subscription change, because the
/// gateway reports the full post-operation state. Bindings accumulate across
/// replacements and only clear on `reset`.
#[derive(Debug, Default)]
pub struct TrackMap {
    rows: Vec<TrackMapEntry>,
    bindings: HashMap<String, Arc<dyn MediaTrack>>,
}

impl TrackMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the identity table with the latest gateway state
    pub fn replace(&mut self, rows: Vec<TrackMapEntry>) {
        debug!("Track table replaced with {} rows", rows.len());
        self.rows = rows;
    }

    /// Bind an engine track to its stable identity
    ///
    /// Looks up the row matching both the publisher and the slot the track
    /// arrived on. A miss means the engine raced a renegotiation; it is
    /// logged and ignored.
    pub fn bind(
        &mut self,
        user_id: u64,
        ephemeral_mid: &str,
        track: Arc<dyn MediaTrack>,
    ) -> Option<TrackMapEntry> {
        let entry = self
            .rows
            .iter()
            .find(|row| row.user_id == user_id && row.ephemeral_mid == ephemeral_mid)
            .cloned();

        match entry {
            Some(entry) => {
                self.bindings.insert(entry.stable_mid.clone(), track);
                Some(entry)
            }
            None => {
                warn!(
                    "No table row for user {} mid {}, dropping track binding",
                    user_id, ephemeral_mid
                );
                None
            }
        }
    }

    /// The engine track bound to a stable identity
    pub fn track(&self, stable_mid: &str) -> Option<Arc<dyn MediaTrack>> {
        self.bindings.get(stable_mid).cloned()
    }

    /// The publisher owning a stable identity, per the current table
    pub fn user(&self, stable_mid: &str) -> Option<u64> {
        self.rows
            .iter()
            .find(|row| row.stable_mid == stable_mid)
            .map(|row| row.user_id)
    }

    /// Resolve a subscriber-connection mid against the current table
    pub fn entry_by_ephemeral(&self, ephemeral_mid: &str) -> Option<&TrackMapEntry> {
        self.rows.iter().find(|row| row.ephemeral_mid == ephemeral_mid)
    }

    /// Drop the table and all bindings
    pub fn reset(&mut self) {
        self.rows.clear();
        self.bindings.clear();
    }
}
