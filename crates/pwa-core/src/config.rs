//! Shell configuration
//!
//! Plain serde structs with defaults for every field, so a TOML file only
//! needs to name what it overrides:
//!
//! ```toml
//! [notifications]
//! max_concurrent = 2
//!
//! [rate_limit]
//! cooldown_ms = 10000
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Storage key of the pending-change log
pub const DEFAULT_STORAGE_KEY: &str = "pending_changes";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Notification queue settings
    pub notifications: NotificationConfig,
    /// Offline change log settings
    pub offline: OfflineConfig,
    /// Call-to-action rate limit
    pub rate_limit: RateLimitConfig,
}

impl ShellConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max notifications on screen
    #[inline]
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.notifications.max_concurrent = max;
        self
    }

    /// With extra time before a notification's slot frees
    #[inline]
    #[must_use]
    pub fn with_dismiss_grace(mut self, grace: Duration) -> Self {
        self.notifications.dismiss_grace_ms = millis(grace);
        self
    }

    /// With rate limit cooldown
    #[inline]
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit.cooldown_ms = millis(cooldown);
        self
    }

    /// With change log storage key
    #[inline]
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.offline.storage_key = key.into();
        self
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML or wrong field types
    /// - `ConfigError::Invalid` if values are out of range
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - see [`ShellConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notifications.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "notifications.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.offline.storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "offline.storage_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Notification queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Maximum notifications on screen at once
    pub max_concurrent: usize,
    /// Lifetime for notifications raised by the shell itself
    pub default_duration_ms: u64,
    /// Added to every positive lifetime before the slot frees (hide animation)
    pub dismiss_grace_ms: u64,
    /// Whether displays carry a chime
    pub sound_enabled: bool,
}

impl NotificationConfig {
    /// Default lifetime as a duration
    #[inline]
    #[must_use]
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }

    /// Grace period as a duration
    #[inline]
    #[must_use]
    pub fn dismiss_grace(&self) -> Duration {
        Duration::from_millis(self.dismiss_grace_ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_duration_ms: 5000,
            dismiss_grace_ms: 500,
            sound_enabled: true,
        }
    }
}

/// Offline change log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Key the log is stored under
    pub storage_key: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Call-to-action rate limit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum gap between two permitted firings
    pub cooldown_ms: u64,
}

impl RateLimitConfig {
    /// Cooldown as a duration
    #[inline]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { cooldown_ms: 30_000 }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
