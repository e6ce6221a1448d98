//! Authentication events and lifecycle state.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::session::Session;

/// An authentication event pushed by the identity provider.
///
/// Produced only by the provider's push channel or by the one-time session
/// pull; consumed only by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "session", rename_all = "snake_case")]
pub enum AuthEvent {
    /// The session known at startup, if any.
    InitialSession(Option<Session>),
    /// A user signed in.
    SignedIn(Session),
    /// The current session was superseded by a renewed one.
    TokenRefreshed(Session),
    /// The user signed out or was forced out.
    SignedOut,
}

impl AuthEvent {
    /// Returns a short name suitable for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialSession(_) => "initial_session",
            Self::SignedIn(_) => "signed_in",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::SignedOut => "signed_out",
        }
    }
}

/// The coordinator's single view of "am I authenticated".
///
/// Exactly one instance exists per coordinator, owned by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Nothing has been determined yet.
    #[default]
    Uninitialized,
    /// The one-time session pull is in flight.
    Initializing,
    /// A session is active.
    Authenticated {
        /// The authenticated principal.
        identity: Identity,
        /// The current session.
        session: Session,
    },
    /// No session is active.
    Unauthenticated,
}

impl LifecycleState {
    /// Returns true while the state has not been determined.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Initializing)
    }

    /// Returns true if a session is active.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Returns the active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Returns the authenticated identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Returns a short name suitable for log fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Authenticated { .. } => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}
