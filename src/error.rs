//! Error types for telegram-media-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error variants (Config, Ledger, RateLimited, etc.)
//! - Transient/Permanent classification used by the retry policy
//! - Context information (config key, ledger path, retry-after hint)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for telegram-media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for telegram-media-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "filter.max_file_size")
        key: Option<String>,
    },

    /// Network error from the HTTP layer
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Server imposed a rate limit, optionally telling us how long to wait
    #[error("rate limited by server")]
    RateLimited {
        /// Server-specified minimum wait before the next attempt, if provided
        retry_after: Option<Duration>,
    },

    /// Authentication or authorization failed (bad token, revoked access)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Channel does not exist or the account cannot access it
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// Telegram API returned an error response
    #[error("API error {code}: {description}")]
    Api {
        /// Numeric error code from the API response
        code: i64,
        /// Human-readable description from the API response
        description: String,
    },

    /// Ledger file exists but cannot be parsed
    #[error("corrupt ledger at {path}: {reason}")]
    CorruptLedger {
        /// Path of the unparseable ledger file
        path: PathBuf,
        /// Why parsing failed
        reason: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File name cannot be made safe for the local filesystem
    #[error("invalid file name: {0}")]
    InvalidFilename(String),

    /// Run was cancelled before completion
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failure classification used by the retry policy
///
/// Transient failures may succeed on a later attempt; permanent failures
/// will not and are surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Likely to succeed if retried (timeouts, rate limits, 5xx responses)
    Transient,
    /// Will not succeed on retry (auth failures, bad channel, disk errors)
    Permanent,
}

impl Error {
    /// Classify this error as transient or permanent
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Timeouts and connection-level failures are worth retrying
            Error::Network(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Error::Timeout(_) => ErrorKind::Transient,
            Error::RateLimited { .. } => ErrorKind::Transient,
            // Connection-ish I/O errors are transient; disk problems are not
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::Interrupted => ErrorKind::Transient,
                _ => ErrorKind::Permanent,
            },
            // Server-side API failures (5xx) are transient; client errors are not
            Error::Api { code, .. } => {
                if *code >= 500 {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Error::Auth(_) => ErrorKind::Permanent,
            Error::InvalidChannel(_) => ErrorKind::Permanent,
            Error::CorruptLedger { .. } => ErrorKind::Permanent,
            Error::Config { .. } => ErrorKind::Permanent,
            Error::Serialization(_) => ErrorKind::Permanent,
            Error::InvalidFilename(_) => ErrorKind::Permanent,
            Error::Cancelled => ErrorKind::Permanent,
            // Unknown errors: be conservative and don't retry
            Error::Other(_) => ErrorKind::Permanent,
        }
    }
}
