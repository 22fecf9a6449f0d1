//! Terminal stand-ins for the presenter and replay handler

use async_trait::async_trait;
use pwa_core::{
    DismissHandle, DismissReason, NotificationId, Presenter, ReplayError, ReplayHandler,
    ShownNotification,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prints notifications to stdout as they appear and disappear
#[derive(Debug, Default)]
pub(crate) struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn display(&self, shown: &ShownNotification, _handle: DismissHandle) {
        let request = &shown.request;
        let lifetime = if request.auto_dismisses() {
            format!("{}ms", request.duration.as_millis())
        } else {
            "sticky".to_string()
        };
        let chime = shown
            .tone_hz
            .map(|hz| format!(" ♪{hz}Hz"))
            .unwrap_or_default();
        println!(
            "  ▶ [{:<7}] {} ({lifetime}{chime}) {}",
            request.kind.as_str(),
            request.message,
            shown.id
        );
    }

    fn dismissed(&self, id: NotificationId, reason: DismissReason) {
        println!("  ◀ {id} ({reason:?})");
    }
}

/// Prints each replayed change, optionally failing at one position
#[derive(Debug, Default)]
pub(crate) struct PrintingReplayHandler {
    fail_at: Option<usize>,
    calls: AtomicUsize,
}

impl PrintingReplayHandler {
    pub(crate) fn new(fail_at: Option<usize>) -> Self {
        Self {
            fail_at,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplayHandler<Value> for PrintingReplayHandler {
    async fn replay(&self, payload: &Value) -> Result<(), ReplayError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(index) {
            println!("  ✗ #{index} {payload}");
            return Err(ReplayError::Rejected(format!("change #{index} refused")));
        }
        println!("  ✓ #{index} {payload}");
        Ok(())
    }
}
