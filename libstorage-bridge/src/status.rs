//! Front API status vocabulary.
//!
//! A reduced set of the gRPC status codes.  Every [`BridgeError`] is mapped
//! onto exactly one [`Code`] here; this is the only place where that mapping
//! lives.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, BridgeError};

/// Status codes returned by the front API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    /// The operation completed successfully.
    Ok = 0,
    /// The operation was cancelled.
    Cancelled = 1,
    /// Unknown error.
    Unknown = 2,
    /// Client specified an invalid argument.
    InvalidArgument = 3,
    /// Deadline expired before operation could complete.
    DeadlineExceeded = 4,
    /// Some requested entity was not found.
    NotFound = 5,
    /// The system is not in a state required for the operation's execution.
    FailedPrecondition = 9,
    /// Internal error.
    Internal = 13,
}

impl Code {
    /// Get human-readable description of this code
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Code::Ok => "The operation completed successfully",
            Code::Cancelled => "The operation was cancelled",
            Code::Unknown => "Unknown error",
            Code::InvalidArgument => "Client specified an invalid argument",
            Code::DeadlineExceeded => "Deadline expired before operation could complete",
            Code::NotFound => "Some requested entity was not found",
            Code::FailedPrecondition => {
                "The system is not in a state required for the operation's execution"
            }
            Code::Internal => "Internal error",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Outcome of a front API call that failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Create a new `Status` with the associated code and message
    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Status {
        Status {
            code,
            message: message.into(),
        }
    }

    /// Get the `Code` of this `Status`
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// Get the text error message of this `Status`
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status: {}, message: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

impl From<&BridgeError> for Code {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::Validation(_) => Code::InvalidArgument,
            BridgeError::NotFound(_) => Code::NotFound,
            BridgeError::Conflict(_) => Code::FailedPrecondition,
            BridgeError::Adapter(AdapterError::Cancelled { .. }) => Code::Cancelled,
            BridgeError::Adapter(AdapterError::DeadlineExceeded { .. }) => {
                Code::DeadlineExceeded
            }
            BridgeError::Adapter(_) => Code::Unknown,
            BridgeError::Infrastructure(_) => Code::Internal,
        }
    }
}

impl From<BridgeError> for Status {
    fn from(err: BridgeError) -> Self {
        Status::new(Code::from(&err), err.to_string())
    }
}
