//! Session lifecycle coordination for atelier client applications.
//!
//! This crate provides:
//! - The session store holding the single `LifecycleState`
//! - An event bridge applying identity provider pushes to the store
//! - A one-time initializer pulling any existing session at startup
//! - A renewal scheduler renewing sessions shortly before they expire
//! - A single-use redirect slot for "where the user was going"
//!
//! Credential verification and token issuance belong to the identity
//! provider, consumed through the [`IdentityProvider`] trait.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Authenticated <-> Unauthenticated
//! ```
//!
//! The renewal timer runs exactly while the state is `Authenticated`.
//!
//! # Example
//!
//! ```
//! use atelier_session::{RenewalDecision, RenewalPolicy, SessionConfig};
//! use chrono::{Duration, Utc};
//!
//! let config = SessionConfig::default();
//! let policy = RenewalPolicy::new(config.renewal_window());
//! let now = Utc::now();
//!
//! assert_eq!(policy.evaluate(now + Duration::minutes(10), now), RenewalDecision::Wait);
//! assert_eq!(policy.evaluate(now + Duration::minutes(4), now), RenewalDecision::Renew);
//! assert_eq!(policy.evaluate(now - Duration::minutes(1), now), RenewalDecision::Expired);
//! ```

pub mod bridge;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod identity;
pub mod initializer;
pub mod navigator;
pub mod provider;
pub mod redirect;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod store;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use bridge::EventBridge;
pub use clock::{Clock, SystemClock};
pub use config::SessionConfig;
pub use coordinator::SessionCoordinator;
pub use error::{ProviderError, StorageError};
pub use event::{AuthEvent, LifecycleState};
pub use identity::{Identity, IdentityId};
pub use initializer::Initializer;
pub use navigator::Navigator;
pub use provider::{AuthListener, IdentityProvider, Subscription};
pub use redirect::RedirectIntentStore;
pub use scheduler::{RenewalDecision, RenewalPolicy, RenewalScheduler, SchedulerHandle};
pub use session::{AccessCredential, Session};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use store::SessionStore;
