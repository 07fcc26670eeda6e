//! Error types for cache synchronization.

use std::fmt;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the cache engine and its collaborators.
///
/// `Error` is `Clone` because one in-flight fetch result is handed to every
/// de-duplicated reader of the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad key-derivation or call input. Programmer error, never retried.
    InvalidArgument(String),

    /// Target entity is absent on the remote service.
    NotFound(String),

    /// Network or server failure reported by the collaborator.
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// A mutation for the same target is already pending.
    OperationInProgress(String),

    /// Form-level validation failed. Holds every failed rule.
    ValidationError(Vec<String>),

    /// A cached value had an unexpected shape for the requested view.
    InvalidCacheEntry(String),

    /// Encoding a value for the envelope failed.
    SerializationError(String),

    /// Decoding an envelope payload failed.
    DeserializationError(String),

    /// Envelope was written by an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },

    /// Configuration could not be applied.
    ConfigError(String),
}

/// Fieldless view of [`Error`] for matching on the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Transport,
    OperationInProgress,
    Validation,
    InvalidCacheEntry,
    Serialization,
    Config,
}

impl Error {
    /// Shorthand for a transport failure without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Shorthand for a transport failure carrying a response status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Error::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::OperationInProgress(_) => ErrorKind::OperationInProgress,
            Error::ValidationError(_) => ErrorKind::Validation,
            Error::InvalidCacheEntry(_) => ErrorKind::InvalidCacheEntry,
            Error::SerializationError(_)
            | Error::DeserializationError(_)
            | Error::VersionMismatch { .. } => ErrorKind::Serialization,
            Error::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Whether re-invoking the same operation may succeed.
    ///
    /// The engine never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Human-readable message suitable for a notification banner.
    pub fn user_message(&self) -> String {
        match self {
            Error::Transport {
                status: Some(status),
                message,
            } => match status {
                400 => "Invalid request. Please check your input and try again.".to_string(),
                401 => "You are not authorized to perform this action.".to_string(),
                403 => {
                    "Access denied. You do not have permission to perform this action.".to_string()
                }
                404 => "The requested resource was not found.".to_string(),
                422 => "Invalid data provided. Please check your input.".to_string(),
                429 => "Too many requests. Please wait a moment and try again.".to_string(),
                500 => "Server error. Please try again later.".to_string(),
                502..=504 => "Service unavailable. Please try again later.".to_string(),
                _ => message.clone(),
            },
            Error::Transport {
                status: None,
                message,
            } => message.clone(),
            Error::NotFound(_) => "The requested resource was not found.".to_string(),
            Error::OperationInProgress(_) => {
                "This action is already in progress. Please wait.".to_string()
            }
            Error::ValidationError(errors) => errors.join("\n"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Transport {
                status: Some(status),
                message,
            } => write!(f, "Transport error ({}): {}", status, message),
            Error::Transport {
                status: None,
                message,
            } => write!(f, "Transport error: {}", message),
            Error::OperationInProgress(msg) => write!(f, "Operation in progress: {}", msg),
            Error::ValidationError(errors) => {
                write!(f, "Validation failed: {}", errors.join("; "))
            }
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "Cache schema version mismatch: expected {}, found {}",
                expected, found
            ),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}
