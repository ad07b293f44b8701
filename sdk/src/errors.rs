//! Error types and handling
//!
//! This module provides the error type used by the Ross engine outside of a
//! run: configuration and secret lookup failures.
//! Errors raised while a run executes are reported to observers through
//! [`crate::events::AbortReason`] instead.
//!
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry API key values; secrets are referred to by
//! key name only.

use thiserror::Error;

/// Trait for Ross error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require a configuration change or restart.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::KeyringError("locked".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("bad log level".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::PathCanonicalization(_, _) => "Invalid path specified",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::SecretNotFound(_) => "Set the API key in the environment or system keychain",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::PathCanonicalization(_, _) | Self::SecretNotFound(_) => false,

            // A locked or busy keychain may succeed on retry
            Self::KeyringError(_) => true,
        }
    }
}
