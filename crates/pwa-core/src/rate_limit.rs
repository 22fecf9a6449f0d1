//! Cooldown guard for a repeatable user action
//!
//! In-memory only: it dampens repeated clicks within a session and is not
//! an audit trail.

use crate::clock::Millis;
use parking_lot::Mutex;
use std::time::Duration;

/// Outcome of [`RateLimiter::try_fire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    /// Action may proceed; the cooldown restarts now
    Allowed,
    /// Action is still cooling down
    Denied {
        /// Wait before the next permitted firing
        remaining_ms: u64,
    },
}

impl FireDecision {
    /// Whether the action may proceed
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Remaining wait in whole seconds, rounded up
    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        match self {
            Self::Allowed => 0,
            Self::Denied { remaining_ms } => remaining_ms.div_ceil(1000),
        }
    }
}

/// Fixed-window cooldown limiter
#[derive(Debug)]
pub struct RateLimiter {
    cooldown_ms: u64,
    last_fire: Mutex<Option<Millis>>,
}

impl RateLimiter {
    /// Create limiter; the first firing is always allowed
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown_ms: u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
            last_fire: Mutex::new(None),
        }
    }

    /// Try to fire at `now`
    pub fn try_fire(&self, now: Millis) -> FireDecision {
        let mut last = self.last_fire.lock();
        if let Some(previous) = *last {
            let elapsed = now.saturating_sub(previous);
            if elapsed < self.cooldown_ms {
                return FireDecision::Denied {
                    remaining_ms: self.cooldown_ms - elapsed,
                };
            }
        }
        *last = Some(now);
        FireDecision::Allowed
    }

    /// Forget the last firing
    pub fn reset(&self) {
        *self.last_fire.lock() = None;
    }

    /// Configured cooldown
    #[inline]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}
