//! Sessions issued by the identity provider.
//!
//! A session is a time-bounded proof of authentication. It is created by the
//! provider on sign-in or renewal and superseded by each renewal; this crate
//! never mutates one in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Opaque credential attached to a session.
///
/// The values are only ever forwarded to the identity provider. `Debug`
/// output redacts them so sessions can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCredential {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl AccessCredential {
    /// Creates a credential from the provider-issued tokens.
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Returns the access token for forwarding to external calls.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token, if the provider issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// An authenticated session.
///
/// Timestamps are stored as UTC and serialized as epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Credential forwarded to the provider and dependent requests.
    credential: AccessCredential,
    /// When the provider issued this session.
    #[serde(with = "chrono::serde::ts_seconds")]
    issued_at: DateTime<Utc>,
    /// When the session stops being valid.
    #[serde(with = "chrono::serde::ts_seconds")]
    expires_at: DateTime<Utc>,
    /// The principal this session authenticates.
    identity: Identity,
}

impl Session {
    /// Creates a session.
    #[must_use]
    pub fn new(
        credential: AccessCredential,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        identity: Identity,
    ) -> Self {
        Self {
            credential,
            issued_at,
            expires_at,
            identity,
        }
    }

    /// Returns the session credential.
    #[must_use]
    pub fn credential(&self) -> &AccessCredential {
        &self.credential
    }

    /// Returns when the session was issued.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the authenticated identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns how long the session remains valid at `now`.
    ///
    /// The result is negative once the session has expired.
    #[must_use]
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}
