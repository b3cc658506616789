//! Error types for Confab
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Confab operations
///
/// This enum encompasses all possible failure kinds that can occur during
/// session management, conversation sends, history operations, and local
/// persistence. Callers pattern-match on the variant to decide whether a
/// failure is recoverable (retry, re-login) or needs surfacing as-is.
#[derive(Error, Debug)]
pub enum ConfabError {
    /// Input rejected locally before any I/O (e.g. empty message text)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation needs a credential but none is present
    #[error("Authentication required: no session token available")]
    AuthRequired,

    /// The login endpoint rejected the supplied email/password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The server rejected the bearer credential (401); the session has
    /// been invalidated by the time this error reaches the caller
    #[error("Session rejected by server: logged out")]
    Unauthorized,

    /// A single-flight operation was attempted while one is in flight
    #[error("Operation already in flight: {0}")]
    Busy(&'static str),

    /// Transport-level failure (no connectivity, timeout, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Well-formed error response from the server (4xx/5xx other than 401)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code returned by the server
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage errors (file access, malformed store)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Confab operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. The concrete
/// [`ConfabError`] kind stays reachable via `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
