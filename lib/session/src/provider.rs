//! The identity provider seam.
//!
//! The identity provider owns credentials, token issuance, and session
//! persistence. The coordinator only consumes the four operations below.

use async_trait::async_trait;
use rootcause::prelude::Report;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::event::AuthEvent;
use crate::session::Session;

/// Callback receiving pushes from the provider's event channel.
///
/// Channel failures are delivered as `Err` so the receiver can log them;
/// they never carry a state change.
pub type AuthListener = Arc<dyn Fn(Result<AuthEvent, ProviderError>) + Send + Sync>;

/// Contract of the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the session the provider already holds, if any.
    async fn current_session(&self) -> Result<Option<Session>, Report<ProviderError>>;

    /// Starts delivering authentication events to `listener`.
    ///
    /// Delivery stops when the returned subscription is released.
    async fn subscribe(&self, listener: AuthListener) -> Result<Subscription, Report<ProviderError>>;

    /// Exchanges `session` for a superseding one.
    ///
    /// On success the provider also pushes `AuthEvent::TokenRefreshed`.
    async fn renew(&self, session: &Session) -> Result<Session, Report<ProviderError>>;

    /// Ends the current session.
    ///
    /// On success the provider also pushes `AuthEvent::SignedOut`.
    async fn sign_out(&self) -> Result<(), Report<ProviderError>>;
}

/// Handle to an active event subscription.
///
/// Releasing the handle, explicitly or by dropping it, stops delivery.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a subscription that runs `release` when it is released.
    #[must_use]
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Stops event delivery.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
