//! In-crate fakes for the provider, clock and navigator seams.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rootcause::prelude::Report;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::error::ProviderError;
use crate::event::AuthEvent;
use crate::identity::Identity;
use crate::navigator::Navigator;
use crate::provider::{AuthListener, IdentityProvider, Subscription};
use crate::session::{AccessCredential, Session};

pub(crate) fn session_expiring_at(token: &str, issued_at: DateTime<Utc>, lifetime: Duration) -> Session {
    Session::new(
        AccessCredential::new(token.to_string(), Some(format!("rt_{token}"))),
        issued_at,
        issued_at + lifetime,
        Identity::with_profile(
            "usr_1".into(),
            Some("Ada".to_string()),
            Some("ada@example.com".to_string()),
        ),
    )
}

/// Wall clock that follows tokio's (possibly paused) time.
pub(crate) struct PausedClock {
    base: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl PausedClock {
    pub(crate) fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.anchor);
        self.base + Duration::from_std(elapsed).unwrap()
    }
}

type Listeners = Arc<Mutex<Vec<(u64, AuthListener)>>>;

/// Scriptable identity provider that records every call.
pub(crate) struct FakeProvider {
    clock: Arc<dyn Clock>,
    session: Mutex<Option<Session>>,
    listeners: Listeners,
    next_listener: AtomicU64,
    pull_delay: Mutex<Option<std::time::Duration>>,
    subscribe_delay: Mutex<Option<std::time::Duration>>,
    pull_fails: AtomicBool,
    subscribe_fails: AtomicBool,
    renew_fails: AtomicBool,
    renew_fails_once: AtomicBool,
    sign_out_fails: AtomicBool,
    sign_in_after_sign_out: Mutex<Option<Session>>,
    renewed_lifetime: Duration,
    pulls: AtomicUsize,
    subscribes: AtomicUsize,
    renewals: AtomicUsize,
    sign_outs: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub(crate) fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            session: Mutex::new(None),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            pull_delay: Mutex::new(None),
            subscribe_delay: Mutex::new(None),
            pull_fails: AtomicBool::new(false),
            subscribe_fails: AtomicBool::new(false),
            renew_fails: AtomicBool::new(false),
            renew_fails_once: AtomicBool::new(false),
            sign_out_fails: AtomicBool::new(false),
            sign_in_after_sign_out: Mutex::new(None),
            renewed_lifetime: Duration::hours(2),
            pulls: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            renewals: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_session(self, session: Session) -> Self {
        *self.session.lock().unwrap() = Some(session);
        self
    }

    pub(crate) fn delay_pull(&self, delay: std::time::Duration) {
        *self.pull_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn delay_subscribe(&self, delay: std::time::Duration) {
        *self.subscribe_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn fail_pull(&self) {
        self.pull_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_subscribe(&self) {
        self.subscribe_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_renew(&self) {
        self.renew_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_renew(&self) {
        self.renew_fails_once.store(true, Ordering::SeqCst);
    }

    /// Makes the next successful sign-out push `SignedIn(session)` right
    /// after its `SignedOut`, as a user signing straight back in would.
    pub(crate) fn sign_in_after_sign_out(&self, session: Session) {
        *self.sign_in_after_sign_out.lock().unwrap() = Some(session);
    }

    pub(crate) fn fail_sign_out(&self) {
        self.sign_out_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Delivers `event` to every live listener, synchronously.
    pub(crate) fn emit(&self, event: AuthEvent) {
        self.deliver(Ok(event));
    }

    pub(crate) fn emit_error(&self, reason: &str) {
        self.deliver(Err(ProviderError::Channel {
            reason: reason.to_string(),
        }));
    }

    fn deliver(&self, result: Result<AuthEvent, ProviderError>) {
        let listeners: Vec<AuthListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(result.clone());
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn current_session(&self) -> Result<Option<Session>, Report<ProviderError>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.pull_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.pull_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable {
                reason: "backend unreachable".to_string(),
            }
            .into());
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn subscribe(&self, listener: AuthListener) -> Result<Subscription, Report<ProviderError>> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.subscribe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.subscribe_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Channel {
                reason: "event channel refused".to_string(),
            }
            .into());
        }

        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));

        let listeners = Arc::clone(&self.listeners);
        Ok(Subscription::new(move || {
            listeners.lock().unwrap().retain(|(other, _)| *other != id);
        }))
    }

    async fn renew(&self, session: &Session) -> Result<Session, Report<ProviderError>> {
        let count = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        if self.renew_fails.load(Ordering::SeqCst) || self.renew_fails_once.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 400,
                reason: "invalid_grant".to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        let renewed = Session::new(
            AccessCredential::new(
                format!("at_renewed_{count}"),
                session.credential().refresh_token().map(str::to_string),
            ),
            now,
            now + self.renewed_lifetime,
            session.identity().clone(),
        );
        *self.session.lock().unwrap() = Some(renewed.clone());
        self.emit(AuthEvent::TokenRefreshed(renewed.clone()));
        Ok(renewed)
    }

    async fn sign_out(&self) -> Result<(), Report<ProviderError>> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.sign_out_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable {
                reason: "backend unreachable".to_string(),
            }
            .into());
        }
        *self.session.lock().unwrap() = None;
        self.emit(AuthEvent::SignedOut);

        let next = self.sign_in_after_sign_out.lock().unwrap().take();
        if let Some(next) = next {
            *self.session.lock().unwrap() = Some(next.clone());
            self.emit(AuthEvent::SignedIn(next));
        }
        Ok(())
    }
}

/// Navigator that records every navigation.
pub(crate) struct RecordingNavigator {
    current: Mutex<String>,
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn at(path: &str) -> Self {
        Self {
            current: Mutex::new(path.to_string()),
            visits: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn navigate(&self, path: &str) {
        *self.current.lock().unwrap() = path.to_string();
        self.visits.lock().unwrap().push(path.to_string());
    }
}
