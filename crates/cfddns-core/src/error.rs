//! Error types for the updater
//!
//! Every component returns [`Error`]; the engine tags it with the cycle
//! phase that produced it (see [`crate::engine::CycleError`]).

use thiserror::Error;

/// Result type alias for updater operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Request construction or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed JSON or a response shape we could not decode
    #[error("Decode error: {0}")]
    Decode(String),

    /// The remote service answered, but reported failure
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Service name ("cloudflare", "ipify", ...)
        provider: String,
        /// Error message, including any error list the service returned
        message: String,
    },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the remote side rejected the request (as opposed to us failing to reach it)
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
