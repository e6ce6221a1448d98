//! Location seam used to follow a remembered destination.

/// Reads and changes the application's current location.
pub trait Navigator: Send + Sync {
    /// Returns the current path, e.g. `/login`.
    fn current_path(&self) -> String;

    /// Moves the application to `path`.
    fn navigate(&self, path: &str);
}
