//! Error types for the DDNS agent
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::url_guard::UrlRejection;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS agent
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration source does not exist
    #[error("Configuration source missing: {0}")]
    ConfigMissing(String),

    /// The configuration source is not well-formed or fails validation
    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Transport-level failure (timeout, connection error, unreadable body)
    #[error("Network failure: {message}")]
    Network {
        /// Human-readable description, never containing the request URL
        message: String,
        /// HTTP status, when the server answered before the failure
        status: Option<u16>,
    },

    /// An outbound URL failed validation; no request was made
    #[error("URL rejected: {0}")]
    UrlRejected(#[from] UrlRejection),

    /// A target token could not be decrypted
    #[error("Token decryption failed: {0}")]
    DecryptionFailed(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Environment-level settings errors
    #[error("Settings error: {0}")]
    Settings(String),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a "configuration missing" error
    pub fn config_missing(msg: impl Into<String>) -> Self {
        Self::ConfigMissing(msg.into())
    }

    /// Create a "configuration invalid" error
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// Create a network error without a response code
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
            status: None,
        }
    }

    /// Create a network error carrying the response code that was received
    pub fn network_with_status(msg: impl Into<String>, status: u16) -> Self {
        Self::Network {
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a decryption error
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::DecryptionFailed(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// HTTP status attached to a network failure, if any
    pub fn response_code(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Text persisted in the update history for this failure
    ///
    /// URL rejections record only the rejection reason; transport failures
    /// record the transport message.
    pub fn record_message(&self) -> String {
        match self {
            Self::UrlRejected(reason) => reason.to_string(),
            Self::Network { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this error means durability can no longer be guaranteed
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::StateStore(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::StateStore(err.to_string())
    }
}
