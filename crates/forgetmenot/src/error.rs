//! Error types for forgetmenot

use thiserror::Error;

/// Result type alias for caching operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by a store backend
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for caching and memoization
#[derive(Debug, Error)]
pub enum Error {
    /// A cached or memoized member was declared or invoked in a disallowed way
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// No cache store was configured and no host fallback is installed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Arguments, discriminators or results could not be encoded
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The store backend failed; propagated unchanged
    #[error("cache store error: {0}")]
    Backend(#[source] BackendError),

    /// A participant's warm entry point failed
    #[error("participant `{participant}` failed to warm: {detail}")]
    WarmParticipant {
        /// Type name of the failing participant
        participant: &'static str,
        /// Full failure detail
        detail: String,
    },
}

impl Error {
    /// Wrap a backend failure
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BackendError>,
    {
        Error::Backend(err.into())
    }

    /// Returns true for [`Error::InvalidUsage`]
    pub fn is_invalid_usage(&self) -> bool {
        matches!(self, Error::InvalidUsage(_))
    }

    /// Returns true for [`Error::Configuration`]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
