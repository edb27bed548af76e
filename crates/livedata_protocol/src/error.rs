//! Protocol errors and their wire representation.

use livedata_codec::CodecError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Wire error codes.
pub mod codes {
    /// The request could not be understood.
    pub const MALFORMED: u16 = 400;
    /// The request was refused by the mutation validator.
    pub const REJECTED: u16 = 403;
    /// The named publication, collection or method does not exist.
    pub const NOT_FOUND: u16 = 404;
    /// The document conflicts with an existing one.
    pub const CONFLICT: u16 = 409;
    /// The data source failed.
    pub const INTERNAL: u16 = 500;
}

/// Errors raised while decoding inbound frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame was not valid JSON or not an object.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The frame was an object but lacked required fields.
    #[error("malformed message: {reason}")]
    Malformed {
        /// What was wrong with the frame.
        reason: String,
        /// Request id carried by the frame, if any.
        correlation_id: Option<String>,
    },

    /// The `msg` field named a message type this server does not handle.
    #[error("unknown message type: {msg}")]
    UnknownMessageType {
        /// The unrecognised `msg` value.
        msg: String,
    },
}

impl ProtocolError {
    /// Creates a malformed message error without a correlation id.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            correlation_id: None,
        }
    }

    /// Attaches the request id of the offending frame.
    #[must_use]
    pub fn with_correlation_id(self, id: Option<String>) -> Self {
        match self {
            Self::Malformed { reason, .. } => Self::Malformed {
                reason,
                correlation_id: id,
            },
            other => other,
        }
    }

    /// Returns the request id of the offending frame, if it carried one.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Malformed { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }
}

/// Structured error sent to clients inside `nosub` and `result` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Numeric error code (see [`codes`]).
    pub error: u16,
    /// Human readable reason.
    pub reason: String,
}

impl WireError {
    /// Creates a wire error.
    pub fn new(error: u16, reason: impl Into<String>) -> Self {
        Self {
            error,
            reason: reason.into(),
        }
    }

    /// The error sent when subscribing to an unregistered publication.
    pub fn unknown_publication() -> Self {
        Self::new(codes::NOT_FOUND, "Unknown name")
    }
}

impl From<&ProtocolError> for WireError {
    fn from(err: &ProtocolError) -> Self {
        Self::new(codes::MALFORMED, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_only_on_malformed() {
        let err = ProtocolError::malformed("missing mutator")
            .with_correlation_id(Some("m1".into()));
        assert_eq!(err.correlation_id(), Some("m1"));

        let err = ProtocolError::UnknownMessageType { msg: "ping".into() }
            .with_correlation_id(Some("m1".into()));
        assert_eq!(err.correlation_id(), None);
    }

    #[test]
    fn wire_error_from_protocol_error() {
        let err = ProtocolError::malformed("missing collection");
        let wire = WireError::from(&err);
        assert_eq!(wire.error, codes::MALFORMED);
        assert!(wire.reason.contains("missing collection"));
    }

    #[test]
    fn unknown_publication_wire_error() {
        let wire = WireError::unknown_publication();
        assert_eq!(wire.error, 404);
        assert_eq!(wire.reason, "Unknown name");
    }
}
