//! Error types for AlertRelay

use thiserror::Error;

/// Result type alias using AlertRelay's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AlertRelay operations
#[derive(Error, Debug)]
pub enum Error {
    /// A channel configuration was rejected at construction time
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A template fragment failed to render
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The transport collaborator reported a failed delivery
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error was caused by caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::Cancelled))
    }
}

/// Raised while building a notifier from a malformed channel configuration.
///
/// Displays as the bare reason so messages can be surfaced to users verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ValidationError {
    /// First violated constraint
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// First template fragment that failed during a render session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to render template {fragment}: {message}")]
pub struct TemplateError {
    /// Template name, or `inline` for templates taken from channel settings
    pub fragment: String,
    /// Error reported by the template engine
    pub message: String,
}

/// Delivery failures reported by the dispatch gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The caller cancelled before or during the network call
    #[error("dispatch cancelled")]
    Cancelled,

    /// Network-level failure (connect, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote endpoint answered with a non-success status
    #[error("webhook returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The request could not be built (bad URL or header)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
