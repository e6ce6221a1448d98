//! Session coordinator configuration.
//!
//! Every field has a default so the configuration can be embedded in a
//! larger application config and loaded from environment variables with
//! only the values that differ.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the session lifecycle coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between renewal checks while a session is active.
    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: u64,

    /// Lead time before expiry, in seconds, during which renewal is attempted.
    #[serde(default = "default_renewal_window_seconds")]
    pub renewal_window_seconds: u64,

    /// Upper bound, in seconds, on the startup session pull.
    /// A pull that takes longer is treated as "no session".
    #[serde(default = "default_init_timeout_seconds")]
    pub init_timeout_seconds: u64,

    /// Path of the login/entry surface.
    /// A remembered destination is only consumed when startup lands here.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Key of the persisted slot holding the remembered destination.
    #[serde(default = "default_redirect_key")]
    pub redirect_key: String,
}

fn default_check_interval_seconds() -> u64 {
    60
}

fn default_renewal_window_seconds() -> u64 {
    300
}

fn default_init_timeout_seconds() -> u64 {
    10
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_redirect_key() -> String {
    "atelier.redirect_after_login".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval_seconds(),
            renewal_window_seconds: default_renewal_window_seconds(),
            init_timeout_seconds: default_init_timeout_seconds(),
            login_path: default_login_path(),
            redirect_key: default_redirect_key(),
        }
    }
}

impl SessionConfig {
    /// Returns the renewal check interval.
    ///
    /// Clamped to at least one second; a zero interval would spin.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds.max(1))
    }

    /// Returns the renewal window.
    #[must_use]
    pub fn renewal_window(&self) -> Duration {
        Duration::from_secs(self.renewal_window_seconds)
    }

    /// Returns the startup pull timeout.
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_seconds)
    }
}
