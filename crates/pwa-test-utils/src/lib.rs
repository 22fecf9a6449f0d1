//! Testing utilities for the PWA shell workspace
//!
//! Shared fakes for the presenter, replay handler and store contracts.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pwa_core::{
    Clock, DismissHandle, DismissReason, ManualClock, MemoryStore, NotificationConfig,
    NotificationId, NotificationQueue, Persistence, PersistenceError, Presenter, ReplayError,
    ReplayHandler, ShownNotification,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Presenter that remembers everything it was asked to do
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    shown: Mutex<Vec<ShownNotification>>,
    handles: Mutex<Vec<DismissHandle>>,
    dismissed: Mutex<Vec<(NotificationId, DismissReason)>>,
    on_screen: Mutex<HashSet<NotificationId>>,
    peak: AtomicUsize,
    close_immediately: AtomicBool,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Presenter that closes each notification from inside `display`
    pub fn closing_immediately() -> Arc<Self> {
        let presenter = Self::default();
        presenter.close_immediately.store(true, Ordering::SeqCst);
        Arc::new(presenter)
    }

    pub fn shown(&self) -> Vec<ShownNotification> {
        self.shown.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.shown
            .lock()
            .iter()
            .map(|s| s.request.message.clone())
            .collect()
    }

    pub fn dismissed(&self) -> Vec<(NotificationId, DismissReason)> {
        self.dismissed.lock().clone()
    }

    /// Most notifications on screen at any instant
    pub fn peak_on_screen(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn on_screen(&self) -> usize {
        self.on_screen.lock().len()
    }

    /// Close the oldest notification still held by the presenter
    pub fn close_oldest(&self) -> Option<NotificationId> {
        let handle = {
            let mut handles = self.handles.lock();
            let index = handles.iter().position(|h| !h.is_dismissed())?;
            handles.remove(index)
        };
        handle.dismiss();
        Some(handle.id())
    }

    /// Close the `n`-th live notification (wrapping)
    pub fn close_nth(&self, n: usize) -> Option<NotificationId> {
        let handle = {
            let mut handles = self.handles.lock();
            handles.retain(|h| !h.is_dismissed());
            if handles.is_empty() {
                return None;
            }
            let index = n % handles.len();
            handles.remove(index)
        };
        handle.dismiss();
        Some(handle.id())
    }

    pub fn handle(&self, id: NotificationId) -> Option<DismissHandle> {
        self.handles.lock().iter().find(|h| h.id() == id).cloned()
    }
}

impl Presenter for RecordingPresenter {
    fn display(&self, shown: &ShownNotification, handle: DismissHandle) {
        self.shown.lock().push(shown.clone());
        {
            let mut on_screen = self.on_screen.lock();
            on_screen.insert(shown.id);
            self.peak.fetch_max(on_screen.len(), Ordering::SeqCst);
        }
        if self.close_immediately.load(Ordering::SeqCst) {
            handle.dismiss();
        } else {
            self.handles.lock().push(handle);
        }
    }

    fn dismissed(&self, id: NotificationId, reason: DismissReason) {
        self.on_screen.lock().remove(&id);
        self.dismissed.lock().push((id, reason));
    }
}

/// Replay handler that records payloads and fails on demand
#[derive(Debug, Default)]
pub struct ScriptedReplayHandler {
    seen: Mutex<Vec<serde_json::Value>>,
    fail_on: Mutex<Option<serde_json::Value>>,
}

impl ScriptedReplayHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handler that rejects `payload` every time it is replayed
    pub fn failing_on(payload: serde_json::Value) -> Arc<Self> {
        let handler = Self::default();
        *handler.fail_on.lock() = Some(payload);
        Arc::new(handler)
    }

    pub fn stop_failing(&self) {
        *self.fail_on.lock() = None;
    }

    pub fn seen(&self) -> Vec<serde_json::Value> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ReplayHandler<serde_json::Value> for ScriptedReplayHandler {
    async fn replay(&self, payload: &serde_json::Value) -> Result<(), ReplayError> {
        self.seen.lock().push(payload.clone());
        if self.fail_on.lock().as_ref() == Some(payload) {
            return Err(ReplayError::Unreachable(format!("scripted failure on {payload}")));
        }
        Ok(())
    }
}

/// Store whose writes can be switched off
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Persistence for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("quota exceeded".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("quota exceeded".to_string()));
        }
        self.inner.remove(key)
    }
}

/// Queue on a virtual clock with no dismiss grace
pub fn manual_queue(
    max_concurrent: usize,
    presenter: Arc<RecordingPresenter>,
) -> (NotificationQueue, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let config = NotificationConfig {
        max_concurrent,
        dismiss_grace_ms: 0,
        ..NotificationConfig::default()
    };
    let queue = NotificationQueue::new(&config, presenter, Arc::clone(&clock) as Arc<dyn Clock>);
    (queue, clock)
}
