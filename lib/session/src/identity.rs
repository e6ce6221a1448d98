//! The authenticated principal.
//!
//! An `Identity` is issued by the identity provider alongside a session and
//! is never edited locally: a new sign-in replaces it wholesale and a
//! sign-out clears it.

use serde::{Deserialize, Serialize};

/// Stable identifier for an authenticated principal.
///
/// The value is opaque to this crate; it is whatever subject identifier the
/// identity provider assigns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    /// Creates a new identity ID from a string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the identity ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The authenticated principal with its minimal profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identifier assigned by the identity provider.
    id: IdentityId,
    /// Human-readable name, if the provider supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    /// Contact address, if the provider supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

impl Identity {
    /// Creates an identity with no profile attributes.
    #[must_use]
    pub fn new(id: IdentityId) -> Self {
        Self {
            id,
            display_name: None,
            email: None,
        }
    }

    /// Creates an identity with its profile attributes.
    #[must_use]
    pub fn with_profile(
        id: IdentityId,
        display_name: Option<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            id,
            display_name,
            email,
        }
    }

    /// Returns the identity's stable ID.
    #[must_use]
    pub fn id(&self) -> &IdentityId {
        &self.id
    }

    /// Returns the display name, if available.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the contact email, if available.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
