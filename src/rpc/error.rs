//! Error types for the bridge
//!
//! Domain errors use thiserror; binaries and config loading convert at the
//! boundary with anyhow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level bridge error
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The endpoint was closed before or during the call
    #[error("endpoint {0} is closed")]
    Closed(String),

    /// Operation name was empty or otherwise unusable
    #[error("invalid operation name: {0:?}")]
    InvalidOperation(String),

    /// Transform descriptor failed validation or application
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Connection registry errors
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Waiter invariant violations
    #[error("Waiter error: {0}")]
    Waiter(#[from] WaiterError),

    /// The frontend reported a failure for a request we issued
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Malformed or unclassifiable inbound message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transport rejected a send
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No handler in the chain accepted the operation
    #[error("operation '{0}' is not supported")]
    UnsupportedOperation(String),

    /// A local operation handler failed
    #[error("{0}")]
    Handler(String),

    /// The wait was abandoned (endpoint closed or task aborted)
    #[error("operation cancelled")]
    Cancelled,

    /// Readiness was not reached within the configured timeout
    #[error("frontend not ready after {0} ms")]
    ReadyTimeout(u64),
}

impl BridgeError {
    /// Stable identifier used as `kind` in structured errors sent to the frontend.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Closed(_) => "Closed",
            BridgeError::InvalidOperation(_) => "InvalidOperation",
            BridgeError::Transform(_) => "TransformError",
            BridgeError::Connection(_) => "ConnectionError",
            BridgeError::Waiter(_) => "WaiterError",
            BridgeError::Remote(_) => "RemoteError",
            BridgeError::Protocol(_) => "ProtocolError",
            BridgeError::Transport(_) => "TransportError",
            BridgeError::Json(_) => "JsonError",
            BridgeError::UnsupportedOperation(_) => "NotImplementedError",
            BridgeError::Handler(_) => "HandlerError",
            BridgeError::Cancelled => "Cancelled",
            BridgeError::ReadyTimeout(_) => "TimeoutError",
        }
    }

    /// Build a handler failure from anything displayable.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        BridgeError::Handler(message.to_string())
    }
}

/// Failure reported by the frontend for an operation this side scheduled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{operation}' failed with message '{message}'")]
pub struct RemoteError {
    /// Operation name that failed
    pub operation: String,
    /// Message supplied by the frontend
    pub message: String,
}

/// Structured error sent back to the frontend when a local handler fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error class, see [`BridgeError::kind`]
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Optional chain of causes, outermost first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<Vec<String>>,
}

impl ErrorReport {
    /// Package an error; `with_traceback` adds its source chain.
    pub fn from_error(error: &BridgeError, with_traceback: bool) -> Self {
        let traceback = with_traceback.then(|| {
            let mut chain = vec![error.to_string()];
            let mut source = std::error::Error::source(error);
            while let Some(cause) = source {
                chain.push(cause.to_string());
                source = cause.source();
            }
            chain
        });

        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            traceback,
        }
    }
}

/// Transform descriptor errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// A bare tag was given for a transform that needs parameters
    #[error("transform '{0}' requires structured parameters")]
    MissingParameters(String),

    /// Unknown transform tag
    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    /// Descriptor was neither a string nor an object
    #[error("transform descriptor must be a string or an object, got {0}")]
    InvalidDescriptor(String),

    /// `function` code does not look like a function definition
    #[error("function code does not look like a function: {0:?}")]
    NotAFunction(String),

    /// A field had the wrong JSON type
    #[error("transform field '{field}' must be {expected}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },

    /// An `advanced` mapping referenced a key absent from the payload
    #[error("payload is missing key '{0}' required by advanced transform")]
    MissingKey(String),

    /// An `advanced` transform was applied to a non-object payload
    #[error("advanced transform expects an object payload")]
    PayloadNotObject,
}

/// Convenience result alias for transform operations
pub type TransformResult<T> = std::result::Result<T, TransformError>;

/// Connection registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No connection class is registered for the cid's prefix
    #[error("no connection class registered for cid '{0}'")]
    UnknownPrefix(String),

    /// Class name not present in the catalog
    #[error("connection class '{0}' is not registered")]
    UnknownClass(String),

    /// Lookup without creation found nothing
    #[error("connection '{0}' does not exist")]
    NotFound(String),

    /// The cid is empty
    #[error("connection id must not be empty")]
    EmptyCid,
}

/// Convenience result alias for connection operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Waiter invariant violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaiterError {
    /// `set` was called on a waiter that already holds an outcome
    #[error("waiter for request '{0}' was already set")]
    AlreadySet(String),
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been closed
    #[error("transport closed")]
    Closed,

    /// IO error while writing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialisation error while encoding the message
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
