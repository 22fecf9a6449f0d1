//! Transient UI notifications
//!
//! Defines what a notification is (message, kind, lifetime) and the queue
//! that limits how many are on screen at once.

mod queue;

pub use queue::{DismissHandle, NotificationQueue, Presenter, QueueStats};

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;
use ulid::Ulid;

/// Lifetime used by the convenience constructors
pub const DEFAULT_DURATION: Duration = Duration::from_millis(5000);

/// Unique notification identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Ulid);

impl NotificationId {
    /// Generate new notification ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visual category of a notification
///
/// Only styling depends on the kind; queueing treats all kinds alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
    /// Degraded but usable
    Warning,
    /// Neutral information
    #[default]
    Info,
}

impl NotificationKind {
    /// Background style class
    #[must_use]
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "danger",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    /// Icon name shown before the message
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Success => "bi-check-circle-fill",
            Self::Error | Self::Warning => "bi-exclamation-triangle-fill",
            Self::Info => "bi-info-circle-fill",
        }
    }

    /// Frequency of the chime played on display
    #[must_use]
    pub fn tone_hz(&self) -> u32 {
        match self {
            Self::Success => 800,
            Self::Error => 400,
            Self::Warning => 600,
            Self::Info => 500,
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown names fall back to [`NotificationKind::Info`].
impl FromStr for NotificationKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "error" | "danger" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Info,
        })
    }
}

/// A notification waiting to be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    /// Display text
    pub message: String,
    /// Styling category
    pub kind: NotificationKind,
    /// Time on screen; zero keeps it until dismissed explicitly
    pub duration: Duration,
}

impl NotificationRequest {
    /// Create request
    #[inline]
    pub fn new(message: impl Into<String>, kind: NotificationKind, duration: Duration) -> Self {
        Self {
            message: message.into(),
            kind,
            duration,
        }
    }

    /// Success notification with the default lifetime
    #[inline]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Success, DEFAULT_DURATION)
    }

    /// Error notification with the default lifetime
    #[inline]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Error, DEFAULT_DURATION)
    }

    /// Warning notification with the default lifetime
    #[inline]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Warning, DEFAULT_DURATION)
    }

    /// Info notification with the default lifetime
    #[inline]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Info, DEFAULT_DURATION)
    }

    /// Override lifetime
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Keep on screen until dismissed
    #[inline]
    #[must_use]
    pub fn persistent(self) -> Self {
        self.with_duration(Duration::ZERO)
    }

    /// Whether a timer will remove it
    #[inline]
    #[must_use]
    pub fn auto_dismisses(&self) -> bool {
        !self.duration.is_zero()
    }
}

/// Why a displayed notification went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DismissReason {
    /// Its auto-dismiss timer fired
    Timeout,
    /// The user (or caller) closed it
    User,
    /// Removed by a clear-all
    Cleared,
}

/// A notification handed to the presenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownNotification {
    /// Queue-assigned ID
    pub id: NotificationId,
    /// What to show
    pub request: NotificationRequest,
    /// Chime to play, `None` when sound is off
    pub tone_hz: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_styling_matches_category() {
        assert_eq!(NotificationKind::Error.css_class(), "danger");
        assert_eq!(NotificationKind::Success.icon(), "bi-check-circle-fill");
        assert_eq!(NotificationKind::Warning.icon(), NotificationKind::Error.icon());
        assert_eq!(NotificationKind::Success.tone_hz(), 800);
        assert_eq!(NotificationKind::Info.tone_hz(), 500);
    }

    #[test]
    fn kind_parse_falls_back_to_info() {
        assert_eq!("warning".parse(), Ok(NotificationKind::Warning));
        assert_eq!(" ERROR ".parse(), Ok(NotificationKind::Error));
        assert_eq!("bogus".parse(), Ok(NotificationKind::Info));
    }

    #[test]
    fn request_constructors() {
        let req = NotificationRequest::success("saved");
        assert_eq!(req.kind, NotificationKind::Success);
        assert_eq!(req.duration, DEFAULT_DURATION);
        assert!(req.auto_dismisses());

        let sticky = NotificationRequest::info("syncing").persistent();
        assert!(!sticky.auto_dismisses());
    }
}
