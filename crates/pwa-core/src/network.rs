//! Connectivity tracking
//!
//! The core never polls: a platform adapter feeds raw online/offline
//! observations into [`NetworkMonitor::set`], which turns them into
//! transition events and publishes the current state on a watch channel.

use tokio::sync::watch;
use tracing::info;

/// Observed connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connectivity {
    /// Network reachable
    #[default]
    Online,
    /// Network unreachable
    Offline,
}

impl Connectivity {
    /// Whether online
    #[inline]
    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// A connectivity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkEvent {
    /// Offline -> online
    Restored,
    /// Online -> offline
    Lost,
}

impl NetworkEvent {
    /// Event for moving from `from` to `to`, if it is a transition at all
    #[must_use]
    pub fn between(from: Connectivity, to: Connectivity) -> Option<Self> {
        match (from, to) {
            (Connectivity::Offline, Connectivity::Online) => Some(Self::Restored),
            (Connectivity::Online, Connectivity::Offline) => Some(Self::Lost),
            _ => None,
        }
    }
}

/// Publishes connectivity transitions
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<Connectivity>,
}

impl NetworkMonitor {
    /// Create monitor in the given initial state
    #[must_use]
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Record an observation; returns the transition it caused, if any
    ///
    /// Repeated observations of the same state are swallowed so
    /// subscribers only wake on real transitions.
    pub fn set(&self, observed: Connectivity) -> Option<NetworkEvent> {
        let mut event = None;
        self.tx.send_if_modified(|current| {
            event = NetworkEvent::between(*current, observed);
            *current = observed;
            event.is_some()
        });
        if let Some(event) = event {
            info!(?event, "connectivity changed");
        }
        event
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Receiver woken on every transition
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}
