//! Bridge error types.
//!
//! Failures are split in two layers:
//!
//! * [`AdapterError`] is produced by the engine RPC adapter and describes what
//!   went wrong on the control channel (stream ended, correlation mismatch,
//!   error object returned by the engine, ...).  Every variant carries the
//!   engine method that was being called.
//! * [`BridgeError`] is what the resource services return.  Its variants map
//!   one-to-one onto the status vocabulary of the front API, see
//!   [`crate::status::Status`].

use thiserror::Error;

/// Engine error code for "no such device".
const ENODEV: i64 = -19;
/// Engine error code for "no such file or directory".
const ENOENT: i64 = -2;

/// Failure of a single call issued through the engine RPC adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The stream ended before a complete response was received.
    #[error("{method}: connection closed before a complete response was received")]
    Eof {
        /// Engine method name.
        method: String,
    },

    /// The response id does not match the request id.
    #[error("{method}: response id {got} does not match request id {expected}")]
    IdMismatch {
        /// Engine method name.
        method: String,
        /// Id sent with the request.
        expected: u64,
        /// Id echoed by the engine.
        got: u64,
    },

    /// The engine returned a JSON-RPC error object.
    #[error("{method}: engine error {code}: {message}")]
    Remote {
        /// Engine method name.
        method: String,
        /// Error code reported by the engine.
        code: i64,
        /// Error message reported by the engine.
        message: String,
    },

    /// Connecting, writing or reading the control socket failed.
    #[error("{method}: transport error: {reason}")]
    Transport {
        /// Engine method name.
        method: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The request could not be encoded or the response could not be decoded.
    #[error("{method}: codec error: {reason}")]
    Codec {
        /// Engine method name.
        method: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The caller cancelled the call before a response arrived.
    #[error("{method}: call cancelled")]
    Cancelled {
        /// Engine method name.
        method: String,
    },

    /// The caller's deadline passed before a response arrived.
    #[error("{method}: deadline exceeded")]
    DeadlineExceeded {
        /// Engine method name.
        method: String,
    },
}

impl AdapterError {
    /// Create an [`AdapterError::Transport`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(method: &str, e: E) -> Self {
        Self::Transport {
            method: method.to_owned(),
            reason: e.to_string(),
        }
    }

    /// Create an [`AdapterError::Codec`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn codec<E: std::fmt::Display>(method: &str, e: E) -> Self {
        Self::Codec {
            method: method.to_owned(),
            reason: e.to_string(),
        }
    }

    /// The engine method this error originated from.
    pub fn method(&self) -> &str {
        match self {
            Self::Eof { method }
            | Self::IdMismatch { method, .. }
            | Self::Remote { method, .. }
            | Self::Transport { method, .. }
            | Self::Codec { method, .. }
            | Self::Cancelled { method }
            | Self::DeadlineExceeded { method } => method,
        }
    }

    /// Whether the engine reported that the addressed device does not exist.
    ///
    /// Classification is done on the engine error code, never on the message.
    pub fn is_no_device(&self) -> bool {
        matches!(self, Self::Remote { code, .. } if *code == ENODEV || *code == ENOENT)
    }
}

/// Unified error type for resource operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Malformed or missing field, bad identifier, bad name or mask.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Unknown resource name or pagination token.
    #[error("not found: {0}")]
    NotFound(String),

    /// A referential or ordering precondition does not hold.
    #[error("failed precondition: {0}")]
    Conflict(String),

    /// The engine call failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Local infrastructure (temporary files, persistence) failed.
    #[error("internal error: {0}")]
    Infrastructure(String),
}

impl BridgeError {
    /// Create a [`BridgeError::Validation`] error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a [`BridgeError::NotFound`] error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a [`BridgeError::Conflict`] error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a [`BridgeError::Infrastructure`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn infrastructure<E: std::fmt::Display>(e: E) -> Self {
        Self::Infrastructure(e.to_string())
    }

    /// Whether this error wraps an engine "no such device" report.
    pub fn is_no_device(&self) -> bool {
        matches!(self, Self::Adapter(e) if e.is_no_device())
    }
}
