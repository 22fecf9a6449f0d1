//! Clock and timer contract
//!
//! Both queues schedule delayed work (auto-dismiss, re-drain) through a
//! [`Clock`]. Production code runs on [`TokioClock`]; tests drive
//! [`ManualClock`] so that every timer fires at an exact virtual instant.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Milliseconds since the Unix epoch (or since start for virtual clocks)
pub type Millis = u64;

/// Work run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Time source and cancelable one-shot timers
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Millis;

    /// Run `callback` once after `delay`
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Cancel a timer; returns `false` if it already fired or was canceled
    fn cancel(&self, id: TimerId) -> bool;
}

fn duration_millis(delay: Duration) -> Millis {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

struct ScheduledTimer {
    id: TimerId,
    due: Millis,
    callback: TimerCallback,
}

struct ManualState {
    now: Millis,
    next_id: u64,
    timers: Vec<ScheduledTimer>,
}

/// Virtual clock advanced explicitly by the caller
///
/// Timers fire in `(due, registration)` order. Callbacks run with no
/// internal lock held, so they may schedule or cancel further timers;
/// any that fall due inside the current advance window fire too.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    /// Create a clock reading `0`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a clock reading `start`
    #[must_use]
    pub fn starting_at(start: Millis) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                next_id: 0,
                timers: Vec::new(),
            }),
        }
    }

    /// Move time forward by `delta`, firing due timers
    pub fn advance(&self, delta: Duration) {
        let target = self.now().saturating_add(duration_millis(delta));
        self.advance_to(target);
    }

    /// Move time forward to `target`, firing due timers
    ///
    /// Targets in the past leave the clock where it is.
    pub fn advance_to(&self, target: Millis) {
        loop {
            let next = {
                let mut state = self.state.lock();
                let position = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(i, _)| i);

                match position {
                    Some(i) => {
                        let timer = state.timers.swap_remove(i);
                        state.now = state.now.max(timer.due);
                        timer
                    }
                    None => {
                        state.now = state.now.max(target);
                        return;
                    }
                }
            };
            (next.callback)();
        }
    }

    /// Fire every timer that is due right now
    pub fn run_due(&self) {
        self.advance_to(self.now());
    }

    /// Number of timers not yet fired or canceled
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("pending_timers", &state.timers.len())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.state.lock().now
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let mut state = self.state.lock();
        let id = TimerId(state.next_id);
        state.next_id += 1;
        let due = state.now.saturating_add(duration_millis(delay));
        state.timers.push(ScheduledTimer { id, due, callback });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        match state.timers.iter().position(|t| t.id == id) {
            Some(i) => {
                state.timers.swap_remove(i);
                true
            }
            None => false,
        }
    }
}

/// Wall clock backed by tokio sleep tasks
///
/// Each timer is one spawned task. A timer is live while its id is in
/// `live`; whoever removes the id first (the task or `cancel`) wins.
#[derive(Debug)]
pub struct TokioClock {
    handle: Handle,
    next_id: AtomicU64,
    live: Arc<DashMap<TimerId, Option<AbortHandle>>>,
}

impl TokioClock {
    /// Create a clock spawning on the given runtime
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(0),
            live: Arc::new(DashMap::new()),
        }
    }

    /// Create a clock on the current runtime
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of timers still waiting
    #[inline]
    #[must_use]
    pub fn live_timers(&self) -> usize {
        self.live.len()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Millis {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.insert(id, None);

        let live = Arc::clone(&self.live);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if live.remove(&id).is_some() {
                callback();
            }
        });

        if let Some(mut entry) = self.live.get_mut(&id) {
            *entry = Some(task.abort_handle());
        }
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        match self.live.remove(&id) {
            Some((_, abort)) => {
                if let Some(abort) = abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }
}
