//! Centralized console configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (e.g. `PROVIDER__TOKEN_URL`).
//!
//! See [`SessionConfig`] for the coordinator's own settings.

use atelier_session::SessionConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Console configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ConsoleConfig {
    /// Session coordinator configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// OAuth2 identity provider configuration.
    pub provider: ProviderConfig,

    /// File backing the persisted key-value slots.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Location the console starts at.
    #[serde(default = "default_entry_path")]
    pub entry_path: String,

    /// Destination to remember before starting, as if access had been denied.
    #[serde(default)]
    pub intended_destination: Option<String>,
}

/// OAuth2 endpoints and client credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Token endpoint used for the refresh-token grant.
    pub token_url: String,

    /// RFC 7009 revocation endpoint. Sign-out skips revocation when unset.
    #[serde(default)]
    pub revocation_url: Option<String>,

    /// Userinfo endpoint used to resolve the identity after sign-in.
    #[serde(default)]
    pub userinfo_url: Option<String>,

    /// OAuth2 client identifier.
    pub client_id: String,

    /// OAuth2 client secret, for confidential clients.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// File holding the provider's persisted session.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Refresh token used to sign in when no session is persisted.
    #[serde(default)]
    pub bootstrap_refresh_token: Option<String>,

    /// Timeout for each HTTP request, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".atelier/state.json")
}

fn default_entry_path() -> String {
    "/".to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".atelier/session.json")
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
