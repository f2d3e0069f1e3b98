//! Error types for the duplex RPC layer.
//!
//! `RpcError` covers everything that can go wrong in the library itself:
//! decoding envelopes, resolving and binding methods, registering services
//! and moving frames over the connection. Failures reported by service
//! methods are a separate value, [`MethodError`], because they travel back to
//! the caller as ordinary response payloads.

use crate::config::RpcConfig;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the duplex RPC library.
#[derive(Debug, Error)]
pub enum RpcError {
    // Envelope errors
    #[error("rpc: method request ill-formed: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("rpc: can't find service {namespace:?} for method {method:?}")]
    ServiceNotFound { namespace: String, method: String },

    #[error("rpc: can't find method {method:?}")]
    MethodNotFound { method: String },

    #[error("rpc: invalid params for {method:?}: {message}")]
    Bind {
        method: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("rpc: failed to encode response: {message}")]
    Encode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Registration errors
    #[error("rpc: type {name:?} is not exported")]
    UnexportedService { name: String },

    #[error("rpc: no service name for type {type_name:?}")]
    MissingServiceName { type_name: String },

    #[error("rpc: {service:?} has no exported methods of suitable type")]
    NoSuitableMethods { service: String },

    #[error("rpc: service already defined: {service:?}")]
    DuplicateService { service: String },

    // Connection errors
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Connection handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for duplex RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Coarse failure category, used for logging and by hosts deciding whether
/// an error is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    NotFound,
    Bind,
    Encode,
    Registration,
    Transport,
    Config,
    Internal,
}

impl RpcError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        RpcError::Parse {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        RpcError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        RpcError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        RpcError::Internal {
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Parse { .. } => ErrorKind::Parse,
            RpcError::ServiceNotFound { .. } | RpcError::MethodNotFound { .. } => {
                ErrorKind::NotFound
            }
            RpcError::Bind { .. } => ErrorKind::Bind,
            RpcError::Encode { .. } => ErrorKind::Encode,
            RpcError::UnexportedService { .. }
            | RpcError::MissingServiceName { .. }
            | RpcError::NoSuitableMethods { .. }
            | RpcError::DuplicateService { .. } => ErrorKind::Registration,
            RpcError::Transport { .. } | RpcError::HandshakeTimeout(_) => ErrorKind::Transport,
            RpcError::Config { .. } => ErrorKind::Config,
            RpcError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Status marker reported to hooks when this error ends a dispatch.
    ///
    /// Every failure the dispatcher can recover from is reported as a bad
    /// request, matching the single marker the wire protocol knows about.
    pub fn status_code(&self) -> u16 {
        RpcConfig::STATUS_BAD_REQUEST
    }

    /// Whether the connection loop must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(io) => io.into(),
            other => RpcError::transport(other.to_string()),
        }
    }
}

/// Failure value returned by a service method.
///
/// Only the message text crosses the wire, so this is a plain string
/// wrapper rather than a boxed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodError {
    message: String,
}

impl MethodError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Message sent back in the response's `error` field.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MethodError {}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for MethodError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for MethodError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Return type of every registered service method.
pub type MethodResult = std::result::Result<(), MethodError>;
