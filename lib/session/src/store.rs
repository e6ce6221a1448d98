//! The session store: single source of truth for the lifecycle state.
//!
//! The store performs no I/O. Other components drive it through the
//! transition methods below and observe it through [`SessionStore::watch`].
//! Transitions that leave the state unchanged do not notify observers.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

use crate::event::LifecycleState;
use crate::identity::Identity;
use crate::session::Session;

/// Holds the lifecycle state and applies transitions to it.
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<LifecycleState>,
    closed: AtomicBool,
}

impl SessionStore {
    /// Creates a store in the `Uninitialized` state.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            state,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn current_state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    /// Returns true while the state has not been determined.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Returns a receiver notified on every effective transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Transitions to `Authenticated`.
    ///
    /// Returns false, leaving observers un-notified, when the incoming session
    /// is identical to the current one or the store has been closed.
    pub fn set_authenticated(&self, identity: Identity, session: Session) -> bool {
        if self.is_closed("set_authenticated") {
            return false;
        }

        let changed = self.state.send_if_modified(|state| {
            if state.session() == Some(&session) {
                return false;
            }
            *state = LifecycleState::Authenticated { identity, session };
            true
        });

        if changed {
            debug!("session store transitioned to authenticated");
        }
        changed
    }

    /// Transitions to `Unauthenticated`, dropping any identity and session.
    pub fn set_unauthenticated(&self) -> bool {
        if self.is_closed("set_unauthenticated") {
            return false;
        }

        let changed = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Unauthenticated {
                return false;
            }
            *state = LifecycleState::Unauthenticated;
            true
        });

        if changed {
            debug!("session store transitioned to unauthenticated");
        }
        changed
    }

    /// Marks the startup pull as in flight.
    ///
    /// Only moves `Uninitialized` to `Initializing`; a state an early push
    /// event already established is kept.
    pub fn mark_initializing(&self) -> bool {
        if self.is_closed("mark_initializing") {
            return false;
        }

        self.state.send_if_modified(|state| {
            if *state != LifecycleState::Uninitialized {
                return false;
            }
            *state = LifecycleState::Initializing;
            true
        })
    }

    /// Applies the startup pull result if nothing newer has arrived.
    ///
    /// The result only lands while the state is still `Initializing`. A push
    /// event applied during the pull is newer than the pulled snapshot and is
    /// kept.
    pub fn apply_initial(&self, pulled: Option<Session>) -> bool {
        if self.is_closed("apply_initial") {
            return false;
        }

        self.state.send_if_modified(|state| {
            if *state != LifecycleState::Initializing {
                debug!(state = state.name(), "keeping state established during pull");
                return false;
            }
            *state = match pulled {
                Some(session) => LifecycleState::Authenticated {
                    identity: session.identity().clone(),
                    session,
                },
                None => LifecycleState::Unauthenticated,
            };
            true
        })
    }

    /// Marks the startup pull as finished.
    ///
    /// Any state still loading falls back to `Unauthenticated`, so the
    /// loading flag is always cleared.
    pub fn mark_initialized(&self) -> bool {
        if self.is_closed("mark_initialized") {
            return false;
        }

        self.state.send_if_modified(|state| {
            if !state.is_loading() {
                return false;
            }
            *state = LifecycleState::Unauthenticated;
            true
        })
    }

    /// Transitions to `Unauthenticated` only while `session` is current.
    ///
    /// A session that superseded `session` in the meantime is kept.
    pub fn end_session(&self, session: &Session) -> bool {
        if self.is_closed("end_session") {
            return false;
        }

        let changed = self.state.send_if_modified(|state| {
            if state.session() != Some(session) {
                return false;
            }
            *state = LifecycleState::Unauthenticated;
            true
        });

        if changed {
            debug!("session store ended session");
        }
        changed
    }

    /// Tears the store down. Every later transition is a no-op.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true once the store has been torn down.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_closed(&self, operation: &'static str) -> bool {
        let closed = self.closed();
        if closed {
            debug!(operation, "ignoring transition on closed session store");
        }
        closed
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
