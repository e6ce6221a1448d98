//! The session lifecycle coordinator.
//!
//! Wires the store, bridge, initializer, scheduler and redirect slot around
//! one identity provider. One coordinator exists per client process; it is
//! created explicitly and torn down explicitly.

use rootcause::prelude::Report;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::bridge::EventBridge;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::ProviderError;
use crate::event::LifecycleState;
use crate::initializer::Initializer;
use crate::navigator::Navigator;
use crate::provider::IdentityProvider;
use crate::redirect::RedirectIntentStore;
use crate::scheduler::{RenewalPolicy, RenewalScheduler};
use crate::storage::KeyValueStore;
use crate::store::SessionStore;

/// Establishes, observes, renews and tears down one authenticated session.
pub struct SessionCoordinator {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    redirects: Arc<RedirectIntentStore>,
    bridge: EventBridge,
    initializer: Initializer,
    scheduler: Arc<RenewalScheduler>,
    started: AtomicBool,
    torn_down: AtomicBool,
}

impl SessionCoordinator {
    /// Creates a coordinator reading time from the system clock.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        config: &SessionConfig,
    ) -> Self {
        Self::with_clock(provider, storage, navigator, config, Arc::new(SystemClock))
    }

    /// Creates a coordinator reading time from `clock`.
    #[must_use]
    pub fn with_clock(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        config: &SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let redirects = Arc::new(RedirectIntentStore::new(
            storage,
            config.redirect_key.clone(),
            config.login_path.clone(),
        ));
        let bridge = EventBridge::new(Arc::clone(&store), Arc::clone(&redirects));
        let initializer = Initializer::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            Arc::clone(&redirects),
            navigator,
            config.init_timeout(),
        );
        let scheduler = Arc::new(RenewalScheduler::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            clock,
            RenewalPolicy::new(config.renewal_window()),
            config.check_interval(),
        ));

        Self {
            provider,
            store,
            redirects,
            bridge,
            initializer,
            scheduler,
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Subscribes to provider events, arms the scheduler supervisor, and runs
    /// the one-time session pull. Later calls return immediately.
    ///
    /// Resolves once the lifecycle state is no longer loading. A failed
    /// subscription is logged; the coordinator then relies on the pull and
    /// its own transitions.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) || self.torn_down.load(Ordering::Acquire) {
            return;
        }

        if let Err(e) = self.bridge.attach(self.provider.as_ref()).await {
            warn!(error = %e, "failed to subscribe to identity provider events");
        }
        if self.torn_down.load(Ordering::Acquire) {
            // Torn down while subscribing; release what attach just stored.
            self.bridge.detach();
            return;
        }
        self.scheduler.start();
        self.initializer.run().await;
    }

    #[must_use]
    pub fn current_state(&self) -> LifecycleState {
        self.store.current_state()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    /// Returns a receiver notified on every effective state transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LifecycleState> {
        self.store.watch()
    }

    /// Remembers where the user was going when access was denied.
    pub fn remember_intended_destination(&self, path: &str) -> bool {
        self.redirects.remember(path)
    }

    /// Signs the user out.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; the state is left unchanged.
    pub async fn sign_out(&self) -> Result<(), Report<ProviderError>> {
        self.provider.sign_out().await?;
        self.store.set_unauthenticated();
        self.redirects.clear();
        info!("signed out");
        Ok(())
    }

    /// Returns true while the renewal timer is running.
    #[must_use]
    pub fn is_renewal_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Cancels the renewal timer, releases the event subscription, and
    /// closes the store. Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown();
        self.bridge.detach();
        self.store.close();
        info!("session coordinator torn down");
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("state", &self.store.current_state().name())
            .field("bridge", &self.bridge)
            .field("initializer", &self.initializer)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
