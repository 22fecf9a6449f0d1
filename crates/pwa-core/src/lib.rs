//! PWA Core - notification queue and offline change synchronization
//!
//! The stateful part of a web app shell:
//! - A FIFO notification queue that keeps at most N toasts on screen
//! - A durable log of changes captured offline, replayed in order on reconnect
//! - A cooldown limiter for repeatable call-to-action buttons
//! - The clock, store, presenter and network contracts they run against
//!
//! # Example
//!
//! ```rust,ignore
//! use pwa_core::prelude::*;
//!
//! # async fn example(
//! #     presenter: Arc<dyn Presenter>,
//! #     handler: Arc<dyn ReplayHandler<serde_json::Value>>,
//! # ) -> Result<(), ShellError> {
//! let shell = PwaShell::new(
//!     ShellConfig::new(),
//!     presenter,
//!     Arc::new(TokioClock::current()),
//!     Arc::new(MemoryStore::new()),
//!     handler,
//! )?;
//!
//! let _ = shell.record_change(serde_json::json!({ "op": "save_contact" }));
//! shell.handle_network_event(NetworkEvent::Restored).await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod clock;
pub mod config;
pub mod error;
pub mod network;
pub mod notification;
pub mod offline;
pub mod persistence;
pub mod rate_limit;
pub mod shell;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, Millis, TimerCallback, TimerId, TokioClock};
pub use config::{NotificationConfig, OfflineConfig, RateLimitConfig, ShellConfig};
pub use error::{ConfigError, PersistenceError, ReplayError, ShellError, SyncError};
pub use network::{Connectivity, NetworkEvent, NetworkMonitor};
pub use notification::{
    DismissHandle, DismissReason, NotificationId, NotificationKind, NotificationQueue,
    NotificationRequest, Presenter, QueueStats, ShownNotification,
};
pub use offline::{ChangeRecord, OfflineChangeLog, RecordOutcome, ReplayHandler, SyncReport};
pub use persistence::{FileStore, MemoryStore, Persistence};
pub use rate_limit::{FireDecision, RateLimiter};
pub use shell::PwaShell;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring a shell
    pub use crate::{
        Clock, Connectivity, MemoryStore, NetworkEvent, NotificationQueue, NotificationRequest,
        OfflineChangeLog, Persistence, Presenter, PwaShell, ReplayHandler, ShellConfig,
        ShellError, TokioClock,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
