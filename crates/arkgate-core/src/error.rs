//! Error types for the Arkgate synchronizer
//!
//! This module defines all error types used throughout the crate.
//!
//! Errors fall in three groups:
//! - caller-correctable input (`MalformedAddress`, `InvalidInput`, `NotFound`)
//! - recoverable conditions the synchronizer already repaired (`ParentNotFound`)
//! - infrastructure failures (`Persistence`, `ConfigWrite`, channel errors)

use thiserror::Error;

use crate::model::RecordId;

/// Result type alias for Arkgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Arkgate synchronizer
#[derive(Error, Debug)]
pub enum Error {
    /// The input could not be parsed as a CIDR literal
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    /// A child referenced a parent that could not be resolved.
    ///
    /// The child has been persisted with its reference cleared.
    #[error(
        "{parent} {parent_id} referenced by {child} {child_id} not found ({reason}); \
         reference cleared"
    )]
    ParentNotFound {
        /// Parent record kind (e.g. "interface")
        parent: &'static str,
        /// The dangling reference that was cleared
        parent_id: RecordId,
        /// Child record kind (e.g. "ip")
        child: &'static str,
        /// Id of the persisted, now unlinked child
        child_id: RecordId,
        /// Why resolution failed
        reason: String,
    },

    /// A record addressed by id does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind
        kind: &'static str,
        /// Record id
        id: RecordId,
    },

    /// Storage backend errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Host configuration file could not be written
    #[error("Config write error ({path}): {message}")]
    ConfigWrite {
        /// Target path or device
        path: String,
        /// Error message
        message: String,
    },

    /// The control endpoint could not be reached
    #[error("Control channel unavailable at {endpoint}: {message}")]
    ChannelUnavailable {
        /// Socket path
        endpoint: String,
        /// Error message
        message: String,
    },

    /// The privileged peer answered with something other than `OK`
    #[error("Command rejected by peer: {0:?}")]
    CommandRejected(String),

    /// A bounded operation ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors not covered by a more specific variant
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
    /// Create a malformed address error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedAddress(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(kind: &'static str, id: RecordId) -> Self {
        Self::NotFound { kind, id }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a config write error
    pub fn config_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a channel unavailable error
    pub fn channel_unavailable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelUnavailable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the operation that produced this error still committed its data change.
    ///
    /// `ParentNotFound` has already been repaired; config and channel failures
    /// happen after the store write and never roll it back.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ParentNotFound { .. }
                | Error::ConfigWrite { .. }
                | Error::ChannelUnavailable { .. }
                | Error::CommandRejected(_)
                | Error::Timeout(_)
        )
    }

    /// HTTP status an API layer should map this error to
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedAddress(_) | Error::InvalidInput(_) => 400,
            Error::NotFound { .. } => 404,
            _ => 500,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
