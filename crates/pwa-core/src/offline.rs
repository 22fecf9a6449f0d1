//! Offline change log
//!
//! Captures user mutations made while the network is down, persists them
//! as one ordered list under a single storage key, and replays them in
//! append order once connectivity returns.
//!
//! A replay pass is all-or-nothing: the log is cleared only after every
//! record in the pass replayed successfully. The first failure stops the
//! pass and leaves the whole log in place, so the next pass starts again
//! from the first record.

use crate::clock::Clock;
use crate::error::{PersistenceError, ReplayError, SyncError};
use crate::persistence::Persistence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One captured mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord<T> {
    /// Caller-defined description of the mutation
    pub payload: T,
    /// Capture time, non-decreasing across the log
    pub timestamp: DateTime<Utc>,
}

/// Applies one captured change against the live system
#[async_trait]
pub trait ReplayHandler<T>: Send + Sync {
    /// Replay a single change
    ///
    /// # Errors
    /// Any error stops the current pass.
    async fn replay(&self, payload: &T) -> Result<(), ReplayError>;
}

/// Result of [`OfflineChangeLog::record`]
#[derive(Debug)]
#[must_use]
pub enum RecordOutcome {
    /// Appended and written to the store
    Persisted {
        /// Zero-based position in the log
        position: usize,
    },
    /// Appended in memory; the write failed and is retried on the next change
    Deferred {
        /// Zero-based position in the log
        position: usize,
        /// Why the write failed
        error: PersistenceError,
    },
}

impl RecordOutcome {
    /// Position of the new record
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Persisted { position } | Self::Deferred { position, .. } => *position,
        }
    }

    /// Persistence warning, if any
    #[inline]
    #[must_use]
    pub fn warning(&self) -> Option<&PersistenceError> {
        match self {
            Self::Persisted { .. } => None,
            Self::Deferred { error, .. } => Some(error),
        }
    }
}

/// Result of a replay pass that did not hit a replay failure
#[derive(Debug)]
#[must_use]
pub enum SyncReport {
    /// Log was empty
    NothingPending,
    /// Another pass is still running; this trigger was ignored
    AlreadyRunning,
    /// Every record replayed and was removed from the log
    Completed {
        /// Records replayed
        replayed: usize,
        /// Set when the in-memory log was cleared but the store write failed
        warning: Option<PersistenceError>,
    },
}

impl SyncReport {
    /// Records replayed in this pass
    #[inline]
    #[must_use]
    pub fn replayed(&self) -> usize {
        match self {
            Self::Completed { replayed, .. } => *replayed,
            Self::NothingPending | Self::AlreadyRunning => 0,
        }
    }
}

#[derive(Debug)]
struct LogState<T> {
    records: Vec<ChangeRecord<T>>,
    unsaved: bool,
    /// Bumped by `clear`; a pass drains its snapshot only if unchanged
    generation: u64,
}

/// Durable, ordered log of offline changes
///
/// The in-memory copy is authoritative while a store write is failing;
/// otherwise every pass reloads from the store, since the process may have
/// restarted (or another writer appended) since the last `record`.
pub struct OfflineChangeLog<T> {
    store: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    key: String,
    state: Mutex<LogState<T>>,
    sync_gate: tokio::sync::Mutex<()>,
}

impl<T> std::fmt::Debug for OfflineChangeLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OfflineChangeLog")
            .field("key", &self.key)
            .field("records", &state.records.len())
            .field("unsaved", &state.unsaved)
            .finish_non_exhaustive()
    }
}

impl<T> OfflineChangeLog<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open the log stored under `key`
    ///
    /// A stored value that does not parse is copied to `<key>.corrupt` and
    /// the log starts empty.
    ///
    /// # Errors
    /// - `PersistenceError` if the store cannot be read, or the corrupt
    ///   value cannot be set aside
    pub fn open(
        store: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
    ) -> Result<Self, PersistenceError> {
        let key = key.into();
        let records = match store.get(&key)? {
            None => Vec::new(),
            Some(text) => match serde_json::from_str::<Vec<ChangeRecord<T>>>(&text) {
                Ok(records) => records,
                Err(e) => {
                    let backup = format!("{key}.corrupt");
                    warn!(
                        %key,
                        %backup,
                        error = %e,
                        "stored change log is malformed; setting it aside"
                    );
                    store.put(&backup, &text)?;
                    store.remove(&key)?;
                    Vec::new()
                }
            },
        };
        debug!(%key, records = records.len(), "change log opened");

        Ok(Self {
            store,
            clock,
            key,
            state: Mutex::new(LogState {
                records,
                unsaved: false,
                generation: 0,
            }),
            sync_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Append a change and persist the whole log
    ///
    /// The state lock is held across the store write so concurrent writers
    /// can never persist snapshots out of order.
    pub fn record(&self, payload: T) -> RecordOutcome {
        let mut timestamp = i64::try_from(self.clock.now())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default();

        let mut state = self.state.lock();
        if let Some(last) = state.records.last() {
            timestamp = timestamp.max(last.timestamp);
        }
        state.records.push(ChangeRecord { payload, timestamp });
        let position = state.records.len() - 1;

        match self.persist(&state.records) {
            Ok(()) => {
                state.unsaved = false;
                debug!(position, "change recorded");
                RecordOutcome::Persisted { position }
            }
            Err(error) => {
                state.unsaved = true;
                warn!(position, %error, "change kept in memory only; will retry on next write");
                RecordOutcome::Deferred { position, error }
            }
        }
    }

    /// Replay every pending change in order through `handler`
    ///
    /// At most one pass runs at a time; a trigger arriving mid-pass returns
    /// [`SyncReport::AlreadyRunning`]. Changes recorded while the pass is in
    /// flight stay in the log for the next pass, including after a `clear`
    /// made mid-pass.
    ///
    /// # Errors
    /// - `SyncError::ReplayFailed` at the first failing record; nothing is
    ///   removed from the log
    pub async fn on_network_restored(
        &self,
        handler: &dyn ReplayHandler<T>,
    ) -> Result<SyncReport, SyncError> {
        let Ok(_gate) = self.sync_gate.try_lock() else {
            debug!("replay already in progress");
            return Ok(SyncReport::AlreadyRunning);
        };

        let (snapshot, generation) = self.refresh();
        let total = snapshot.len();
        if total == 0 {
            return Ok(SyncReport::NothingPending);
        }

        info!(records = total, "replaying offline changes");
        for (index, record) in snapshot.iter().enumerate() {
            if let Err(source) = handler.replay(&record.payload).await {
                warn!(index, total, error = %source, "replay failed; log kept for next retry");
                return Err(SyncError::ReplayFailed {
                    index,
                    total,
                    source,
                });
            }
        }

        let mut state = self.state.lock();
        if state.generation != generation {
            info!(replayed = total, "log was cleared during the pass; keeping later records");
            return Ok(SyncReport::Completed {
                replayed: total,
                warning: None,
            });
        }
        let replayed = total.min(state.records.len());
        state.records.drain(..replayed);
        let warning = match self.persist(&state.records) {
            Ok(()) => {
                state.unsaved = false;
                None
            }
            Err(error) => {
                state.unsaved = true;
                warn!(%error, "replayed changes cleared in memory only");
                Some(error)
            }
        };
        info!(replayed, remaining = state.records.len(), "offline changes synced");

        Ok(SyncReport::Completed { replayed, warning })
    }

    /// Connectivity dropped; nothing changes in the log
    pub fn on_network_lost(&self) {
        info!(pending = self.len(), "network lost; changes will be queued");
    }

    /// Drop every pending change
    ///
    /// # Errors
    /// - `PersistenceError` if the empty log could not be written; memory is
    ///   cleared regardless
    pub fn clear(&self) -> Result<(), PersistenceError> {
        let mut state = self.state.lock();
        state.records.clear();
        state.generation += 1;
        let result = self.persist(&state.records);
        state.unsaved = result.is_err();
        result
    }

    /// Copy of the pending changes in order
    #[must_use]
    pub fn records(&self) -> Vec<ChangeRecord<T>> {
        self.state.lock().records.clone()
    }

    /// Pending change count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether nothing is pending
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Whether the store is behind the in-memory log
    #[inline]
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.lock().unsaved
    }

    /// Key the log is stored under
    #[inline]
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Sync memory with the store before a pass and snapshot the log
    fn refresh(&self) -> (Vec<ChangeRecord<T>>, u64) {
        let mut state = self.state.lock();
        if state.unsaved {
            match self.persist(&state.records) {
                Ok(()) => state.unsaved = false,
                Err(error) => warn!(%error, "store still failing; replaying in-memory log"),
            }
        } else {
            match self.load() {
                Ok(records) => state.records = records,
                Err(error) => {
                    warn!(%error, "could not reload change log; replaying in-memory copy");
                }
            }
        }
        (state.records.clone(), state.generation)
    }

    fn load(&self) -> Result<Vec<ChangeRecord<T>>, PersistenceError> {
        match self.store.get(&self.key)? {
            None => Ok(Vec::new()),
            Some(text) => {
                serde_json::from_str(&text).map_err(|source| PersistenceError::Serialization {
                    key: self.key.clone(),
                    source,
                })
            }
        }
    }

    fn persist(&self, records: &[ChangeRecord<T>]) -> Result<(), PersistenceError> {
        let text =
            serde_json::to_string(records).map_err(|source| PersistenceError::Serialization {
                key: self.key.clone(),
                source,
            })?;
        self.store.put(&self.key, &text)
    }
}
