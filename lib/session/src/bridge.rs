//! Bridge from the provider's push channel into the session store.

use rootcause::prelude::Report;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::event::AuthEvent;
use crate::provider::{AuthListener, IdentityProvider, Subscription};
use crate::redirect::RedirectIntentStore;
use crate::store::SessionStore;

/// Subscribes once to provider events and writes them into the store.
///
/// Channel failures are logged and dropped. They never change state and the
/// bridge does not resubscribe.
pub struct EventBridge {
    store: Arc<SessionStore>,
    redirects: Arc<RedirectIntentStore>,
    subscription: Mutex<Option<Subscription>>,
}

impl EventBridge {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, redirects: Arc<RedirectIntentStore>) -> Self {
        Self {
            store,
            redirects,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to `provider`. Attaching an attached bridge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the subscription could not be made.
    pub async fn attach(&self, provider: &dyn IdentityProvider) -> Result<(), Report<ProviderError>> {
        if self.is_attached() {
            debug!("event bridge already attached");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let redirects = Arc::clone(&self.redirects);
        let listener: AuthListener = Arc::new(move |result| apply(&store, &redirects, result));

        let subscription = provider.subscribe(listener).await?;

        let mut slot = self.subscription.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            // Lost a race with a concurrent attach; dropping releases ours.
            return Ok(());
        }
        *slot = Some(subscription);
        info!("event bridge attached");
        Ok(())
    }

    /// Applies one delivery from the push channel.
    pub fn apply(&self, result: Result<AuthEvent, ProviderError>) {
        apply(&self.store, &self.redirects, result);
    }

    /// Releases the subscription. Later events are not delivered.
    pub fn detach(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            debug!("event bridge detached");
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

fn apply(
    store: &SessionStore,
    redirects: &RedirectIntentStore,
    result: Result<AuthEvent, ProviderError>,
) {
    let event = match result {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "identity provider event channel failed");
            return;
        }
    };

    let kind = event.kind();
    match event {
        AuthEvent::SignedIn(session)
        | AuthEvent::TokenRefreshed(session)
        | AuthEvent::InitialSession(Some(session)) => {
            let identity = session.identity().clone();
            if store.set_authenticated(identity, session) {
                debug!(event = kind, "applied provider event");
            }
        }
        AuthEvent::InitialSession(None) => {
            debug!(event = kind, "ignoring empty initial session");
        }
        AuthEvent::SignedOut => {
            store.set_unauthenticated();
            redirects.clear();
            debug!(event = kind, "applied provider event");
        }
    }
}
