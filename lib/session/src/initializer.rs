//! One-time startup pull of the existing session.
//!
//! Any number of callers may invoke [`Initializer::run`]; the body executes
//! once per instance. A failed or timed out pull counts as "no session" and is
//! not retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::navigator::Navigator;
use crate::provider::IdentityProvider;
use crate::redirect::RedirectIntentStore;
use crate::session::Session;
use crate::store::SessionStore;

/// Runs the startup pull at most once.
pub struct Initializer {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    redirects: Arc<RedirectIntentStore>,
    navigator: Arc<dyn Navigator>,
    timeout: Duration,
    started: AtomicBool,
    finished: AtomicBool,
}

impl Initializer {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<SessionStore>,
        redirects: Arc<RedirectIntentStore>,
        navigator: Arc<dyn Navigator>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            redirects,
            navigator,
            timeout,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Pulls the provider's session and settles the store.
    ///
    /// Returns immediately on every call after the first.
    pub async fn run(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("session initialization already started");
            return;
        }

        self.store.mark_initializing();

        let pulled = self.pull().await;
        let found = pulled.is_some();
        self.store.apply_initial(pulled);
        self.store.mark_initialized();

        let state = self.store.current_state();
        info!(found, state = state.name(), "session initialization finished");

        if state.is_authenticated() {
            self.follow_redirect();
        }

        self.finished.store(true, Ordering::Release);
    }

    async fn pull(&self) -> Option<Session> {
        match tokio::time::timeout(self.timeout, self.provider.current_session()).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(error = %e, "session pull failed, treating as signed out");
                None
            }
            Err(_) => {
                let e = ProviderError::TimedOut {
                    operation: "session pull",
                };
                warn!(error = %e, timeout = ?self.timeout, "treating as signed out");
                None
            }
        }
    }

    fn follow_redirect(&self) {
        let current = self.navigator.current_path();
        if !self.redirects.is_login_path(&current) {
            return;
        }

        if let Some(destination) = self.redirects.take_if_present() {
            info!(destination = %destination, "returning to intended destination");
            self.navigator.navigate(&destination);
        }
    }

    /// Returns true once `run` has been entered.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns true once the single run has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Initializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initializer")
            .field("timeout", &self.timeout)
            .field("started", &self.is_started())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
