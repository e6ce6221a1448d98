//! Navigator for a headless client: tracks the location and logs moves.

use atelier_session::Navigator;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Keeps the current location in memory.
#[derive(Debug)]
pub struct LoggingNavigator {
    current: Mutex<String>,
}

impl LoggingNavigator {
    #[must_use]
    pub fn new(entry_path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(entry_path.into()),
        }
    }
}

impl Navigator for LoggingNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, path: &str) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        info!(from = %current, to = path, "navigating");
        *current = path.to_string();
    }
}
