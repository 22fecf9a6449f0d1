//! Composition root
//!
//! [`PwaShell`] owns one instance of each queue for a page/session and
//! wires them to the network monitor, the durable store, and the replay
//! handler. It is also where queue outcomes turn into user-facing
//! notifications.

use crate::clock::Clock;
use crate::config::ShellConfig;
use crate::error::{PersistenceError, ShellError, SyncError};
use crate::network::{Connectivity, NetworkEvent, NetworkMonitor};
use crate::notification::{
    NotificationId, NotificationKind, NotificationQueue, NotificationRequest, Presenter,
};
use crate::offline::{OfflineChangeLog, RecordOutcome, ReplayHandler, SyncReport};
use crate::persistence::Persistence;
use crate::rate_limit::{FireDecision, RateLimiter};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Storage key of the notification sound preference
pub const SOUND_PREF_KEY: &str = "notificationSound";

/// One page/session worth of queues and collaborators
pub struct PwaShell<T> {
    config: ShellConfig,
    notifications: NotificationQueue,
    changes: OfflineChangeLog<T>,
    limiter: RateLimiter,
    network: NetworkMonitor,
    acted_on: Mutex<Connectivity>,
    handler: Arc<dyn ReplayHandler<T>>,
    store: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    persistence_warned: AtomicBool,
}

impl<T> std::fmt::Debug for PwaShell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PwaShell")
            .field("config", &self.config)
            .field("notifications", &self.notifications)
            .field("changes", &self.changes)
            .field("network", &self.network.current())
            .finish_non_exhaustive()
    }
}

impl<T> PwaShell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Wire a shell
    ///
    /// # Errors
    /// - `ShellError::Config` if `config` fails validation
    /// - `ShellError::Persistence` if the change log cannot be opened
    pub fn new(
        config: ShellConfig,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn Persistence>,
        handler: Arc<dyn ReplayHandler<T>>,
    ) -> Result<Self, ShellError> {
        config.validate()?;

        let notifications =
            NotificationQueue::new(&config.notifications, presenter, Arc::clone(&clock));
        match store.get(SOUND_PREF_KEY) {
            Ok(Some(value)) => notifications.set_sound_enabled(value.trim() != "false"),
            Ok(None) => {}
            Err(error) => warn!(%error, "could not read sound preference; using config"),
        }

        let changes = OfflineChangeLog::open(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.offline.storage_key.clone(),
        )?;
        let limiter = RateLimiter::new(config.rate_limit.cooldown());

        Ok(Self {
            config,
            notifications,
            changes,
            limiter,
            network: NetworkMonitor::default(),
            acted_on: Mutex::new(Connectivity::default()),
            handler,
            store,
            clock,
            persistence_warned: AtomicBool::new(false),
        })
    }

    /// Show a notification through the queue
    pub fn notify(&self, request: NotificationRequest) -> NotificationId {
        self.notifications.enqueue(request)
    }

    fn announce(&self, kind: NotificationKind, message: impl Into<String>) -> NotificationId {
        self.notify(NotificationRequest::new(
            message,
            kind,
            self.config.notifications.default_duration(),
        ))
    }

    /// Capture a mutation made while offline
    pub fn record_change(&self, payload: T) -> RecordOutcome {
        let outcome = self.changes.record(payload);
        match outcome.warning() {
            Some(error) => self.warn_persistence(error),
            None => self.persistence_warned.store(false, Ordering::Relaxed),
        }
        outcome
    }

    /// React to a connectivity transition
    ///
    /// Failures are surfaced as notifications and logged; nothing here is
    /// fatal.
    pub async fn handle_network_event(&self, event: NetworkEvent) {
        *self.acted_on.lock() = match event {
            NetworkEvent::Lost => Connectivity::Offline,
            NetworkEvent::Restored => Connectivity::Online,
        };
        match event {
            NetworkEvent::Lost => {
                self.changes.on_network_lost();
                self.announce(
                    NotificationKind::Warning,
                    "Connection lost. Some features may be unavailable.",
                );
            }
            NetworkEvent::Restored => {
                self.announce(NotificationKind::Success, "Connection restored.");
                // Outcome already surfaced as a notification.
                let _ = self.sync_now().await;
            }
        }
    }

    /// Replay pending changes now and announce the outcome
    ///
    /// # Errors
    /// - `SyncError::ReplayFailed` as returned by the change log, after one
    ///   aggregate error notification has been shown
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        if !self.changes.is_empty() {
            self.announce(NotificationKind::Info, "Syncing data...");
        }

        let result = self.changes.on_network_restored(self.handler.as_ref()).await;
        match &result {
            Ok(SyncReport::Completed { warning, .. }) => {
                self.announce(NotificationKind::Success, "Data synced.");
                match warning {
                    Some(error) => self.warn_persistence(error),
                    None => self.persistence_warned.store(false, Ordering::Relaxed),
                }
            }
            Ok(SyncReport::NothingPending | SyncReport::AlreadyRunning) => {}
            Err(SyncError::ReplayFailed { total, .. }) => {
                self.announce(
                    NotificationKind::Error,
                    format!(
                        "Could not sync {total} pending change(s). Will retry when back online."
                    ),
                );
            }
        }
        result
    }

    /// Gate a call-to-action behind the cooldown
    pub fn try_contact(&self) -> FireDecision {
        let decision = self.limiter.try_fire(self.clock.now());
        if let FireDecision::Denied { .. } = decision {
            self.announce(
                NotificationKind::Warning,
                format!(
                    "Please wait {} seconds before trying again.",
                    decision.remaining_secs()
                ),
            );
        }
        decision
    }

    /// Flip the notification sound preference and persist it
    ///
    /// Returns the new setting.
    ///
    /// # Errors
    /// - `PersistenceError` if the preference could not be saved; the new
    ///   setting still applies for this session
    pub fn toggle_sound(&self) -> Result<bool, PersistenceError> {
        let enabled = !self.notifications.sound_enabled();
        self.notifications.set_sound_enabled(enabled);
        self.announce(
            NotificationKind::Info,
            if enabled {
                "Notification sound enabled."
            } else {
                "Notification sound disabled."
            },
        );
        self.store
            .put(SOUND_PREF_KEY, if enabled { "true" } else { "false" })?;
        Ok(enabled)
    }

    /// Feed a raw connectivity observation to the monitor
    pub fn observe(&self, connectivity: Connectivity) -> Option<NetworkEvent> {
        self.network.set(connectivity)
    }

    /// React to monitor transitions until every sender is gone
    ///
    /// The state current at subscription is compared against the last one
    /// acted on, so a transition observed before the loop starts is not lost.
    pub async fn run(&self, mut rx: watch::Receiver<Connectivity>) {
        loop {
            let now = *rx.borrow_and_update();
            if let Some(event) = self.transition_to(now) {
                self.handle_network_event(event).await;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        info!("network monitor closed; shell event loop exiting");
    }

    fn transition_to(&self, now: Connectivity) -> Option<NetworkEvent> {
        let mut last = self.acted_on.lock();
        let event = NetworkEvent::between(*last, now);
        *last = now;
        event
    }

    fn warn_persistence(&self, error: &PersistenceError) {
        warn!(%error, "change log not persisted");
        if !self.persistence_warned.swap(true, Ordering::Relaxed) {
            self.announce(
                NotificationKind::Warning,
                "Changes are saved on this device only for now.",
            );
        }
    }

    /// Notification queue
    #[inline]
    #[must_use]
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Offline change log
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &OfflineChangeLog<T> {
        &self.changes
    }

    /// Connectivity monitor
    #[inline]
    #[must_use]
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }
}
