//! Bounded-concurrency notification queue
//!
//! Admits requests in arrival order and keeps at most `max_concurrent` of
//! them on screen. A slot frees when the notification's [`DismissHandle`]
//! fires, whether from its auto-dismiss timer, the user, or a clear-all;
//! the handle is one-shot, so a slot is never freed twice.

use super::{DismissReason, NotificationId, NotificationRequest, ShownNotification};
use crate::clock::{Clock, TimerId};
use crate::config::NotificationConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Renders and removes notifications
///
/// Calls arrive with no queue lock held. `display` may dismiss through the
/// handle before returning; the queue handles that re-entrancy.
pub trait Presenter: Send + Sync {
    /// Show a notification; keep `handle` to close it on user action
    fn display(&self, shown: &ShownNotification, handle: DismissHandle);

    /// The notification is gone; called exactly once per display
    fn dismissed(&self, id: NotificationId, reason: DismissReason);
}

/// One-shot completion signal for a displayed notification
///
/// Clones share the same flag: only the first `dismiss` across all clones
/// frees the slot.
#[derive(Debug, Clone)]
pub struct DismissHandle {
    id: NotificationId,
    fired: Arc<AtomicBool>,
    queue: Weak<QueueInner>,
}

impl DismissHandle {
    /// Notification this handle belongs to
    #[inline]
    #[must_use]
    pub fn id(&self) -> NotificationId {
        self.id
    }

    /// Whether the notification has already been dismissed
    #[inline]
    #[must_use]
    pub fn is_dismissed(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Close the notification on user action
    ///
    /// Returns `true` for the call that actually dismissed it.
    pub fn dismiss(&self) -> bool {
        self.fire(DismissReason::User)
    }

    fn fire(&self, reason: DismissReason) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(queue) = self.queue.upgrade() {
            queue.complete(self.id, reason);
        }
        true
    }
}

/// Counters since the queue was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Requests admitted to `pending`
    pub enqueued: u64,
    /// Requests handed to the presenter
    pub displayed: u64,
    /// Dismissed by their timer
    pub dismissed_by_timer: u64,
    /// Dismissed by user action
    pub dismissed_by_user: u64,
    /// Dismissed by a clear-all
    pub dismissed_by_clear: u64,
}

impl QueueStats {
    /// All dismissals regardless of reason
    #[inline]
    #[must_use]
    pub fn dismissed(&self) -> u64 {
        self.dismissed_by_timer + self.dismissed_by_user + self.dismissed_by_clear
    }
}

#[derive(Debug)]
struct ActiveEntry {
    handle: DismissHandle,
    timer: Option<TimerId>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<(NotificationId, NotificationRequest)>,
    active: HashMap<NotificationId, ActiveEntry>,
    draining: bool,
    stats: QueueStats,
}

struct QueueInner {
    max_concurrent: usize,
    grace: Duration,
    sound_enabled: AtomicBool,
    presenter: Arc<dyn Presenter>,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

impl std::fmt::Debug for QueueInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueInner")
            .field("max_concurrent", &self.max_concurrent)
            .field("grace", &self.grace)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl QueueInner {
    /// Admit pending requests while capacity allows
    ///
    /// Only one drain runs at a time. A drain requested while another is
    /// running is absorbed by the running one, which re-checks capacity
    /// under the lock before it exits.
    fn drain(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let (shown, handle) = {
                let mut state = self.state.lock();
                if state.active.len() >= self.max_concurrent {
                    state.draining = false;
                    return;
                }
                let Some((id, request)) = state.pending.pop_front() else {
                    state.draining = false;
                    return;
                };

                let handle = DismissHandle {
                    id,
                    fired: Arc::new(AtomicBool::new(false)),
                    queue: Arc::downgrade(self),
                };
                state.active.insert(
                    id,
                    ActiveEntry {
                        handle: handle.clone(),
                        timer: None,
                    },
                );
                state.stats.displayed += 1;
                debug!(
                    %id,
                    active = state.active.len(),
                    pending = state.pending.len(),
                    "notification admitted"
                );

                let tone_hz = self
                    .sound_enabled
                    .load(Ordering::Relaxed)
                    .then(|| request.kind.tone_hz());
                (
                    ShownNotification {
                        id,
                        request,
                        tone_hz,
                    },
                    handle,
                )
            };

            self.presenter.display(&shown, handle.clone());

            if shown.request.auto_dismisses() && !handle.is_dismissed() {
                self.arm_timer(shown.id, shown.request.duration, handle);
            }
        }
    }

    fn arm_timer(&self, id: NotificationId, duration: Duration, handle: DismissHandle) {
        let timer = self.clock.after(
            duration.saturating_add(self.grace),
            Box::new(move || {
                handle.fire(DismissReason::Timeout);
            }),
        );

        let mut state = self.state.lock();
        if let Some(entry) = state.active.get_mut(&id) {
            entry.timer = Some(timer);
        } else {
            // Dismissed while the timer was being armed.
            drop(state);
            self.clock.cancel(timer);
        }
    }

    fn complete(self: &Arc<Self>, id: NotificationId, reason: DismissReason) {
        let timer = {
            let mut state = self.state.lock();
            let Some(entry) = state.active.remove(&id) else {
                warn!(%id, "dismissal for a notification that is not active");
                return;
            };
            match reason {
                DismissReason::Timeout => state.stats.dismissed_by_timer += 1,
                DismissReason::User => state.stats.dismissed_by_user += 1,
                DismissReason::Cleared => state.stats.dismissed_by_clear += 1,
            }
            debug!(%id, ?reason, active = state.active.len(), "notification dismissed");
            entry.timer
        };

        if let Some(timer) = timer {
            self.clock.cancel(timer);
        }
        self.presenter.dismissed(id, reason);
        self.drain();
    }
}

/// FIFO notification queue with bounded concurrency
///
/// Constructed per page/session by the composition root and shared by
/// cloning. Pending requests are unbounded: transient UI messages cannot
/// realistically flood it.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    /// Create queue from config
    #[must_use]
    pub fn new(
        config: &NotificationConfig,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if config.max_concurrent == 0 {
            warn!("max_concurrent of 0 would never display anything; using 1");
        }
        Self {
            inner: Arc::new(QueueInner {
                max_concurrent: config.max_concurrent.max(1),
                grace: config.dismiss_grace(),
                sound_enabled: AtomicBool::new(config.sound_enabled),
                presenter,
                clock,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Create queue with default settings and the given capacity
    #[must_use]
    pub fn with_capacity(
        max_concurrent: usize,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = NotificationConfig {
            max_concurrent,
            ..NotificationConfig::default()
        };
        Self::new(&config, presenter, clock)
    }

    /// Append a request and display it as soon as a slot is free
    pub fn enqueue(&self, request: NotificationRequest) -> NotificationId {
        let id = NotificationId::new();
        {
            let mut state = self.inner.state.lock();
            state.pending.push_back((id, request));
            state.stats.enqueued += 1;
        }
        self.inner.drain();
        id
    }

    /// Dismiss an on-screen notification
    ///
    /// Returns `false` if `id` is not currently displayed.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let handle = self
            .inner
            .state
            .lock()
            .active
            .get(&id)
            .map(|entry| entry.handle.clone());
        handle.is_some_and(|h| h.fire(DismissReason::User))
    }

    /// Dismiss everything on screen; pending requests keep draining
    ///
    /// Returns how many notifications were dismissed.
    pub fn dismiss_all(&self) -> usize {
        let handles: Vec<DismissHandle> = self
            .inner
            .state
            .lock()
            .active
            .values()
            .map(|entry| entry.handle.clone())
            .collect();
        handles
            .into_iter()
            .filter(|h| h.fire(DismissReason::Cleared))
            .count()
    }

    /// Notifications currently displayed
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// Requests waiting for a slot
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Whether nothing is displayed or waiting
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.active.is_empty() && state.pending.is_empty()
    }

    /// Capacity
    #[inline]
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Turn chimes on or off for subsequent displays
    #[inline]
    pub fn set_sound_enabled(&self, enabled: bool) {
        self.inner.sound_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether displays carry a chime
    #[inline]
    #[must_use]
    pub fn sound_enabled(&self) -> bool {
        self.inner.sound_enabled.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.inner.state.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct Screen {
        shown: Mutex<Vec<(NotificationId, String)>>,
        handles: Mutex<Vec<DismissHandle>>,
        gone: Mutex<Vec<(NotificationId, DismissReason)>>,
        close_on_display: AtomicBool,
    }

    impl Presenter for Screen {
        fn display(&self, shown: &ShownNotification, handle: DismissHandle) {
            self.shown
                .lock()
                .push((shown.id, shown.request.message.clone()));
            if self.close_on_display.load(Ordering::SeqCst) {
                handle.dismiss();
            } else {
                self.handles.lock().push(handle);
            }
        }

        fn dismissed(&self, id: NotificationId, reason: DismissReason) {
            self.gone.lock().push((id, reason));
        }
    }

    fn setup(max: usize) -> (NotificationQueue, Arc<Screen>, Arc<ManualClock>) {
        let screen = Arc::new(Screen::default());
        let clock = Arc::new(ManualClock::new());
        let config = NotificationConfig {
            max_concurrent: max,
            dismiss_grace_ms: 0,
            ..NotificationConfig::default()
        };
        let queue = NotificationQueue::new(&config, screen.clone(), clock.clone());
        (queue, screen, clock)
    }

    fn messages(screen: &Screen) -> Vec<String> {
        screen.shown.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    #[test]
    fn admits_up_to_capacity() {
        let (queue, screen, _clock) = setup(2);

        for i in 0..5 {
            queue.enqueue(NotificationRequest::info(format!("n{i}")));
        }

        assert_eq!(queue.active_count(), 2);
        assert_eq!(queue.pending_len(), 3);
        assert_eq!(messages(&screen), vec!["n0", "n1"]);
    }

    #[test]
    fn timer_frees_slot_and_drains_fifo() {
        let (queue, screen, clock) = setup(1);

        queue.enqueue(NotificationRequest::info("a").with_duration(Duration::from_millis(100)));
        queue.enqueue(NotificationRequest::info("b").with_duration(Duration::from_millis(100)));
        assert_eq!(messages(&screen), vec!["a"]);

        clock.advance(Duration::from_millis(100));
        assert_eq!(messages(&screen), vec!["a", "b"]);
        assert_eq!(queue.active_count(), 1);

        clock.advance(Duration::from_millis(100));
        assert!(queue.is_idle());
        assert_eq!(queue.stats().dismissed_by_timer, 2);
    }

    #[test]
    fn grace_delays_slot_release() {
        let screen = Arc::new(Screen::default());
        let clock = Arc::new(ManualClock::new());
        let queue = NotificationQueue::with_capacity(1, screen.clone(), clock.clone());

        queue.enqueue(NotificationRequest::info("a").with_duration(Duration::from_millis(1000)));
        clock.advance(Duration::from_millis(1000));
        assert_eq!(queue.active_count(), 1);
        clock.advance(Duration::from_millis(500));
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn manual_dismiss_cancels_timer() {
        let (queue, screen, clock) = setup(3);

        let id = queue.enqueue(NotificationRequest::info("a"));
        assert_eq!(clock.pending_timers(), 1);

        assert!(queue.dismiss(id));
        assert!(!queue.dismiss(id));
        assert_eq!(clock.pending_timers(), 0);
        assert_eq!(*screen.gone.lock(), vec![(id, DismissReason::User)]);
    }

    #[test]
    fn persistent_has_no_timer() {
        let (queue, _screen, clock) = setup(3);

        queue.enqueue(NotificationRequest::info("sticky").persistent());
        assert_eq!(clock.pending_timers(), 0);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(queue.active_count(), 1);
    }

    #[test]
    fn synchronous_dismiss_inside_display_keeps_order() {
        let (queue, screen, _clock) = setup(3);
        screen.close_on_display.store(true, Ordering::SeqCst);

        for i in 0..7 {
            queue.enqueue(NotificationRequest::info(format!("n{i}")));
        }

        assert_eq!(
            messages(&screen),
            (0..7).map(|i| format!("n{i}")).collect::<Vec<_>>()
        );
        assert!(queue.is_idle());
        assert_eq!(queue.stats().dismissed_by_user, 7);
    }

    #[test]
    fn dismiss_all_only_touches_active() {
        let (queue, screen, _clock) = setup(2);

        for i in 0..4 {
            queue.enqueue(NotificationRequest::info(format!("n{i}")).persistent());
        }

        assert_eq!(queue.dismiss_all(), 2);
        assert_eq!(messages(&screen), vec!["n0", "n1", "n2", "n3"]);
        assert_eq!(queue.active_count(), 2);
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.stats().dismissed_by_clear, 2);
    }

    #[test]
    fn handle_outlives_queue() {
        let (queue, screen, _clock) = setup(1);
        queue.enqueue(NotificationRequest::info("a").persistent());
        drop(queue);

        let handle = screen.handles.lock().pop().unwrap();
        assert!(handle.dismiss());
        assert!(handle.is_dismissed());
        assert!(screen.gone.lock().is_empty());
    }

    #[test]
    fn sound_toggle_controls_tone() {
        #[derive(Default)]
        struct Tones(Mutex<Vec<Option<u32>>>);
        impl Presenter for Tones {
            fn display(&self, shown: &ShownNotification, _handle: DismissHandle) {
                self.0.lock().push(shown.tone_hz);
            }
            fn dismissed(&self, _id: NotificationId, _reason: DismissReason) {}
        }

        let tones = Arc::new(Tones::default());
        let queue =
            NotificationQueue::with_capacity(5, tones.clone(), Arc::new(ManualClock::new()));

        queue.enqueue(NotificationRequest::error("loud"));
        queue.set_sound_enabled(false);
        queue.enqueue(NotificationRequest::error("quiet"));

        assert_eq!(*tones.0.lock(), vec![Some(400), None]);
        assert!(!queue.sound_enabled());
    }

    #[test]
    fn huge_duration_does_not_stall_queue() {
        let screen = Arc::new(Screen::default());
        let clock = Arc::new(ManualClock::new());
        let queue = NotificationQueue::with_capacity(1, screen.clone(), clock.clone());

        let long = queue.enqueue(NotificationRequest::info("long").with_duration(Duration::MAX));
        queue.enqueue(NotificationRequest::info("next").with_duration(Duration::from_millis(10)));
        assert_eq!(queue.active_count(), 1);
        assert_eq!(clock.pending_timers(), 1);

        clock.advance(Duration::from_secs(86_400));
        assert_eq!(messages(&screen), vec!["long"]);

        assert!(queue.dismiss(long));
        assert_eq!(messages(&screen), vec!["long", "next"]);
        clock.advance(Duration::from_millis(510));
        assert!(queue.is_idle());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (queue, screen, _clock) = setup(0);
        queue.enqueue(NotificationRequest::info("a"));
        assert_eq!(queue.max_concurrent(), 1);
        assert_eq!(messages(&screen), vec!["a"]);
    }
}
