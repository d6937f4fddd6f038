//! Error types for mcp-socket-bridge.
//!
//! None of the transport, framing or handler errors here are ever returned to
//! callers of the bridge API. They are logged, stored in the observable error
//! state, or turned into JSON-RPC error responses.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while opening or driving a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint URL could not be turned into a connection request.
    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The transport refused to open for another reason.
    #[error("failed to open transport: {0}")]
    OpenFailed(String),
}

/// Errors raised while resolving the instance identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    /// No identity could be determined.
    #[error("instance identifier unavailable: {0}")]
    Unavailable(String),
}

/// Reasons an inbound frame is dropped without a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The frame is JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The `jsonrpc` member is missing or not "2.0".
    #[error("unsupported jsonrpc version")]
    UnsupportedVersion,

    /// The `id` member is neither a string nor an integer.
    #[error("invalid request id")]
    InvalidId,

    /// The `method` member is missing or not a string.
    #[error("missing method")]
    MissingMethod,
}

/// Failure reported by a capability handler.
///
/// The message is sent to the client verbatim in a `-32000` error response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Message used when a failure carries no text of its own.
    pub const UNKNOWN: &'static str = "Unknown error";

    /// Creates a handler error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message to put on the wire.
    #[must_use]
    pub fn message(&self) -> &str {
        if self.message.is_empty() {
            Self::UNKNOWN
        } else {
            &self.message
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(error.to_string())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}
