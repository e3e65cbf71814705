//! Error types for the sidekick agent
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for sidekick operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the sidekick agent
#[derive(Error, Debug)]
pub enum Error {
    /// The network prefix could not be parsed as CIDR
    #[error("Invalid network prefix '{prefix}': {reason}")]
    InvalidPrefix {
        /// The rejected input
        prefix: String,
        /// Why it was rejected
        reason: String,
    },

    /// No non-loopback interface address falls inside the prefix
    #[error("No IP address matching {0} found")]
    NoMatchingAddress(String),

    /// The OS interface table could not be read
    #[error("Failed to enumerate network interfaces: {0}")]
    InterfaceEnumerationFailed(String),

    /// No registry endpoint could be reached
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The registry answered with an error body
    #[error("Registry error {code}: {message}")]
    Registry {
        /// Store-specific error code
        code: u32,
        /// Store-specific message, including the cause when present
        message: String,
    },

    /// The initial write of the leaf key failed
    #[error("Failed to register {key}: {reason}")]
    RegistryWriteFailed {
        /// The leaf key
        key: String,
        /// Underlying failure
        reason: String,
    },

    /// A TTL refresh of a segment failed
    #[error("Failed to refresh TTL of {path}: {reason}")]
    RegistryRefreshFailed {
        /// The segment being refreshed
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// The DNS provider rejected or failed the upsert
    #[error("Upsert failed ({provider}): {message}")]
    ProviderUpsertFailed {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Invalid command-line or API usage
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid prefix error
    pub fn invalid_prefix(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }

    /// Create an interface enumeration error
    pub fn enumeration(msg: impl Into<String>) -> Self {
        Self::InterfaceEnumerationFailed(msg.into())
    }

    /// Create a registry-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::RegistryUnavailable(msg.into())
    }

    /// Create a registry rejection error
    pub fn registry(code: u32, message: impl Into<String>) -> Self {
        Self::Registry {
            code,
            message: message.into(),
        }
    }

    /// Create a provider upsert error
    pub fn upsert(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUpsertFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Wrap a failure of the initial leaf write.
    ///
    /// An unreachable registry stays `RegistryUnavailable`.
    pub fn write_failed(key: &str, err: Error) -> Self {
        match err {
            Self::RegistryUnavailable(_) => err,
            other => Self::RegistryWriteFailed {
                key: key.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Wrap a failure of a segment refresh.
    ///
    /// An unreachable registry stays `RegistryUnavailable`.
    pub fn refresh_failed(path: &str, err: Error) -> Self {
        match err {
            Self::RegistryUnavailable(_) => err,
            other => Self::RegistryRefreshFailed {
                path: path.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// True for errors caused by bad input rather than a failing dependency
    ///
    /// A malformed CIDR is an address-selection failure, not a usage error,
    /// even when it is caught while validating the configuration.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
