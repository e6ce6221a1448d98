//! Proactive session renewal.
//!
//! A supervisor task watches the session store. Entering `Authenticated` arms
//! a periodic check; leaving it disarms the check. Each check compares the
//! session's remaining lifetime with the renewal window:
//!
//! - more than the window left: nothing happens
//! - inside the window: the provider renews the session, and the superseding
//!   session arrives through the event bridge
//! - already expired, or renewal failed: the session is forcibly signed out
//!
//! At most one check task exists at any time. The supervisor arms whenever
//! the store is authenticated without a live check task, so merged watch
//! updates (a sign-out immediately followed by a sign-in) still end with a
//! running check.

use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::event::LifecycleState;
use crate::provider::IdentityProvider;
use crate::session::Session;
use crate::store::SessionStore;

/// What a single check decides to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// The session has more than the renewal window left.
    Wait,
    /// The session expires within the renewal window.
    Renew,
    /// The session has already expired.
    Expired,
}

/// Pure renewal decision over a session's expiry.
#[derive(Debug, Clone, Copy)]
pub struct RenewalPolicy {
    renewal_window: chrono::Duration,
}

impl RenewalPolicy {
    #[must_use]
    pub fn new(renewal_window: Duration) -> Self {
        Self {
            renewal_window: chrono::Duration::from_std(renewal_window)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    #[must_use]
    pub fn evaluate(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> RenewalDecision {
        let remaining = expires_at - now;
        if remaining <= chrono::Duration::zero() {
            RenewalDecision::Expired
        } else if remaining <= self.renewal_window {
            RenewalDecision::Renew
        } else {
            RenewalDecision::Wait
        }
    }
}

/// Owned handle to a running check task.
///
/// Cancelling or dropping the handle aborts the task.
#[derive(Debug)]
pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Stops the check task.
    pub fn cancel(self) {
        self.task.abort();
    }

    /// Returns true while the check task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Arms and disarms the periodic renewal check.
pub struct RenewalScheduler {
    checker: Checker,
    check_interval: Duration,
    timer: Mutex<Option<SchedulerHandle>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    arms: AtomicU64,
    shut_down: AtomicBool,
}

impl RenewalScheduler {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        policy: RenewalPolicy,
        check_interval: Duration,
    ) -> Self {
        Self {
            checker: Checker {
                provider,
                store,
                clock,
                policy,
            },
            check_interval,
            timer: Mutex::new(None),
            supervisor: Mutex::new(None),
            arms: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Starts following the session store. Calling it again, or after
    /// [`RenewalScheduler::shutdown`], is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        if supervisor.is_some() {
            return;
        }
        if self.shut_down.load(Ordering::Acquire) {
            debug!("renewal scheduler already shut down, not starting");
            return;
        }

        let receiver = self.checker.store.watch();
        let scheduler = Arc::downgrade(self);
        *supervisor = Some(tokio::spawn(supervise(scheduler, receiver)));
        debug!("renewal scheduler started");
    }

    /// Starts a fresh check task, cancelling any previous one first.
    ///
    /// The first check runs immediately.
    pub fn arm(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.cancel();
        }

        let checker = self.checker.clone();
        let interval = self.check_interval;
        *timer = Some(SchedulerHandle::new(tokio::spawn(checker.run(interval))));
        self.arms.fetch_add(1, Ordering::Relaxed);
        debug!(interval_secs = interval.as_secs(), "renewal timer armed");
    }

    /// Cancels the check task, if any.
    pub fn disarm(&self) {
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.cancel();
            debug!("renewal timer disarmed");
        }
    }

    /// Returns true while a check task is running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(SchedulerHandle::is_active)
    }

    /// Number of times a check task has been armed.
    #[must_use]
    pub fn arm_count(&self) -> u64 {
        self.arms.load(Ordering::Relaxed)
    }

    /// Stops the supervisor and the check task for good.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        self.disarm();
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("check_interval", &self.check_interval)
            .field("policy", &self.checker.policy)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

async fn supervise(weak: Weak<RenewalScheduler>, mut receiver: watch::Receiver<LifecycleState>) {
    loop {
        let authenticated = receiver.borrow_and_update().is_authenticated();
        let Some(scheduler) = weak.upgrade() else {
            return;
        };

        if !authenticated {
            scheduler.disarm();
        } else if !scheduler.is_armed() {
            scheduler.arm();
        }
        drop(scheduler);

        if receiver.changed().await.is_err() {
            return;
        }
    }
}

#[derive(Clone)]
struct Checker {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    policy: RenewalPolicy,
}

impl Checker {
    async fn run(self, check_interval: Duration) {
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.check().await.is_break() {
                debug!("renewal checks stopped");
                return;
            }
        }
    }

    async fn check(&self) -> ControlFlow<()> {
        let state = self.store.current_state();
        let Some(session) = state.session() else {
            return ControlFlow::Break(());
        };

        let now = self.clock.now();
        match self.policy.evaluate(session.expires_at(), now) {
            RenewalDecision::Wait => ControlFlow::Continue(()),
            RenewalDecision::Renew => {
                let remaining_secs = session.time_until_expiry(now).num_seconds();
                info!(remaining_secs, "session inside renewal window, renewing");
                match self.provider.renew(session).await {
                    Ok(renewed) => {
                        debug!(expires_at = %renewed.expires_at(), "session renewed");
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        warn!(error = %e, "session renewal failed, signing out");
                        self.force_sign_out(session).await;
                        ControlFlow::Continue(())
                    }
                }
            }
            RenewalDecision::Expired => {
                warn!(expires_at = %session.expires_at(), "session already expired, signing out");
                self.force_sign_out(session).await;
                ControlFlow::Continue(())
            }
        }
    }

    /// Signs out through the provider, then ends `session` in the store.
    ///
    /// The store is updated whether or not the provider call succeeded, since
    /// its `SignedOut` push may never arrive. A session established after the
    /// sign-out is kept and stays under this task's watch; the next tick stops
    /// the task if the store is left without one.
    async fn force_sign_out(&self, session: &Session) {
        if let Err(e) = self.provider.sign_out().await {
            error!(error = %e, "forced sign-out failed, clearing session locally");
        }
        self.store.end_session(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EventBridge;
    use crate::redirect::RedirectIntentStore;
    use crate::storage::MemoryKeyValueStore;
    use crate::testing::{FakeProvider, PausedClock, session_expiring_at};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn policy_window_boundaries() {
        let policy = RenewalPolicy::new(Duration::from_secs(300));
        let expires_at = at(11, 0);

        assert_eq!(policy.evaluate(expires_at, at(10, 50)), RenewalDecision::Wait);
        assert_eq!(policy.evaluate(expires_at, at(10, 55)), RenewalDecision::Renew);
        assert_eq!(policy.evaluate(expires_at, at(10, 56)), RenewalDecision::Renew);
        assert_eq!(policy.evaluate(expires_at, at(11, 0)), RenewalDecision::Expired);
        assert_eq!(policy.evaluate(expires_at, at(11, 30)), RenewalDecision::Expired);
    }

    struct Harness {
        provider: Arc<FakeProvider>,
        store: Arc<SessionStore>,
        scheduler: Arc<RenewalScheduler>,
        clock: Arc<PausedClock>,
        _bridge: EventBridge,
    }

    async fn harness() -> Harness {
        let clock = Arc::new(PausedClock::new());
        let provider = Arc::new(FakeProvider::with_clock(clock.clone()));
        let store = Arc::new(SessionStore::new());
        let redirects = Arc::new(RedirectIntentStore::new(
            Arc::new(MemoryKeyValueStore::new()),
            "redirect",
            "/login",
        ));
        let bridge = EventBridge::new(Arc::clone(&store), redirects);
        bridge.attach(provider.as_ref()).await.expect("attach");
        let scheduler = Arc::new(RenewalScheduler::new(
            provider.clone(),
            Arc::clone(&store),
            clock.clone(),
            RenewalPolicy::new(Duration::from_secs(300)),
            Duration::from_secs(60),
        ));
        Harness {
            provider,
            store,
            scheduler,
            clock,
            _bridge: bridge,
        }
    }

    impl Harness {
        fn authenticate_for(&self, lifetime: chrono::Duration) {
            let session = session_expiring_at("at_1", self.clock.now(), lifetime);
            self.store.set_authenticated(session.identity().clone(), session);
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn renews_inside_window() {
        let h = harness().await;
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::minutes(4));
        settle().await;

        assert_eq!(h.provider.renewals(), 1);
        assert!(h.scheduler.is_armed());
        assert_eq!(
            h.store.current_state().session().map(|s| s.credential().access_token()),
            Some("at_renewed_1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_outside_window() {
        let h = harness().await;
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::minutes(10));
        settle().await;

        assert_eq!(h.provider.renewals(), 0);
        assert!(h.scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_failure_signs_out() {
        let h = harness().await;
        h.provider.fail_renew();
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::minutes(4));
        settle().await;

        assert_eq!(h.provider.renewals(), 1);
        assert_eq!(h.provider.sign_outs(), 1);
        assert_eq!(h.store.current_state(), LifecycleState::Unauthenticated);
        assert!(!h.scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sign_out_still_clears_session() {
        let h = harness().await;
        h.provider.fail_renew();
        h.provider.fail_sign_out();
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::minutes(4));
        settle().await;

        assert_eq!(h.store.current_state(), LifecycleState::Unauthenticated);
        assert!(!h.scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_signs_out_without_renewing() {
        let h = harness().await;
        h.scheduler.start();
        let session = session_expiring_at(
            "at_stale",
            h.clock.now() - chrono::Duration::hours(2),
            chrono::Duration::hours(1),
        );
        h.store.set_authenticated(session.identity().clone(), session);
        settle().await;

        assert_eq!(h.provider.renewals(), 0);
        assert_eq!(h.provider.sign_outs(), 1);
        assert_eq!(h.store.current_state(), LifecycleState::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn disarms_on_sign_out() {
        let h = harness().await;
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::hours(2));
        settle().await;
        assert!(h.scheduler.is_armed());

        h.store.set_unauthenticated();
        settle().await;

        assert!(!h.scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn arm_replaces_previous_timer() {
        let h = harness().await;
        h.authenticate_for(chrono::Duration::hours(2));

        h.scheduler.arm();
        h.scheduler.arm();
        settle().await;

        assert!(h.scheduler.is_armed());
        assert_eq!(h.scheduler.arm_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_right_after_forced_sign_out_is_renewed() {
        let h = harness().await;
        h.provider.fail_next_renew();
        let next = session_expiring_at("at_next", h.clock.now(), chrono::Duration::hours(2));
        h.provider.sign_in_after_sign_out(next.clone());
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::minutes(4));
        settle().await;

        assert_eq!(h.provider.sign_outs(), 1);
        assert_eq!(h.store.current_state().session(), Some(&next));
        assert!(h.scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(117 * 60)).await;

        assert_eq!(h.provider.renewals(), 2);
        assert_eq!(
            h.store.current_state().session().map(|s| s.credential().access_token()),
            Some("at_renewed_2")
        );
        assert!(h.scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_shutdown_is_refused() {
        let h = harness().await;
        h.scheduler.shutdown();
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::hours(2));
        settle().await;

        assert!(!h.scheduler.is_armed());
        assert_eq!(h.scheduler.arm_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything() {
        let h = harness().await;
        h.scheduler.start();
        h.authenticate_for(chrono::Duration::hours(2));
        settle().await;

        h.scheduler.shutdown();
        h.store.set_unauthenticated();
        h.authenticate_for(chrono::Duration::minutes(4));
        settle().await;

        assert!(!h.scheduler.is_armed());
        assert_eq!(h.provider.renewals(), 0);
    }
}
