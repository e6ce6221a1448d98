//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ProviderError`: Failures reported by the external identity provider
//! - `StorageError`: Failures of the persisted key-value slot

use std::fmt;

/// Errors from identity provider operations.
///
/// These errors cover the provider calls the coordinator depends on:
/// the session pull, the push channel, renewal, and sign-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider could not be reached.
    Unavailable { reason: String },
    /// The provider rejected the request.
    Rejected { status: u16, reason: String },
    /// The authorization server refused a grant with an OAuth error code.
    Denied { code: String, reason: String },
    /// The provider answered with something that could not be understood.
    InvalidResponse { reason: String },
    /// The session has no refresh credential, so it cannot be renewed.
    NotRenewable,
    /// The operation did not complete within the allotted time.
    TimedOut { operation: &'static str },
    /// The push channel failed or dropped events.
    Channel { reason: String },
    /// Reading or writing the provider's own session persistence failed.
    Persistence { reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => {
                write!(f, "identity provider unavailable: {reason}")
            }
            Self::Rejected { status, reason } => {
                write!(f, "identity provider rejected request ({status}): {reason}")
            }
            Self::Denied { code, reason } => {
                write!(f, "identity provider denied grant ({code}): {reason}")
            }
            Self::InvalidResponse { reason } => {
                write!(f, "invalid identity provider response: {reason}")
            }
            Self::NotRenewable => write!(f, "session has no refresh credential"),
            Self::TimedOut { operation } => {
                write!(f, "identity provider {operation} timed out")
            }
            Self::Channel { reason } => {
                write!(f, "authentication event channel failed: {reason}")
            }
            Self::Persistence { reason } => {
                write!(f, "session persistence failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from the persisted key-value slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading a value failed.
    ReadFailed { key: String, reason: String },
    /// Writing or removing a value failed.
    WriteFailed { key: String, reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { key, reason } => {
                write!(f, "failed to read '{key}': {reason}")
            }
            Self::WriteFailed { key, reason } => {
                write!(f, "failed to write '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}
