//! Remembered destination across the detour through authentication.
//!
//! When access is denied, the application remembers where the user was going.
//! After the next successful authentication the value is consumed exactly
//! once. Storage failures never surface to callers: the feature degrades to
//! "no remembered destination".

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Single-slot, single-use store for the post-authentication destination.
pub struct RedirectIntentStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    login_path: String,
    slot: Mutex<()>,
}

impl RedirectIntentStore {
    /// Creates a store persisting its slot under `key`.
    ///
    /// `login_path` is never remembered, since redirecting to it after
    /// authenticating would loop.
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            key: key.into(),
            login_path: login_path.into(),
            slot: Mutex::new(()),
        }
    }

    /// Returns true if `path` names the login surface, ignoring any query
    /// or fragment.
    #[must_use]
    pub fn is_login_path(&self, path: &str) -> bool {
        path_without_query(path) == self.login_path
    }

    /// Remembers `path`, replacing any previous destination.
    ///
    /// Returns false if the path was not stored, either because it is not a
    /// local path or because storage failed.
    pub fn remember(&self, path: &str) -> bool {
        if !is_local_path(path) {
            warn!(path, "refusing to remember non-local destination");
            return false;
        }
        if self.is_login_path(path) {
            debug!(path, "not remembering the login surface as a destination");
            return false;
        }

        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match self.storage.set(&self.key, path) {
            Ok(()) => {
                debug!(path, "remembered intended destination");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to persist intended destination");
                false
            }
        }
    }

    /// Reads and clears the remembered destination.
    ///
    /// A second call returns `None`. If the slot cannot be cleared the value
    /// is withheld, so a destination can never be returned twice.
    pub fn take_if_present(&self) -> Option<String> {
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        let path = match self.storage.get(&self.key) {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read intended destination");
                return None;
            }
        };

        if let Err(e) = self.storage.remove(&self.key) {
            warn!(error = %e, "failed to clear intended destination, discarding it");
            return None;
        }

        if !is_local_path(&path) {
            warn!(path, "discarding non-local stored destination");
            return None;
        }

        Some(path)
    }

    /// Forgets any remembered destination.
    pub fn clear(&self) {
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.storage.remove(&self.key) {
            warn!(error = %e, "failed to clear intended destination");
        }
    }
}

impl std::fmt::Debug for RedirectIntentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectIntentStore")
            .field("key", &self.key)
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

/// Returns true for same-origin absolute paths such as `/billing?tab=due`.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

fn path_without_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}
