//! Error types for the LiveData server.

use crate::connection::ConnectionId;
use livedata_core::CoreError;
use livedata_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the LiveData server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Error from the synchronization core.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// An inbound frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No connection is registered under this id.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's task has stopped.
    #[error("connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// The connection limit was reached.
    #[error("too many connections (limit {limit})")]
    TooManyConnections {
        /// Configured limit.
        limit: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the error was caused by the client.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Protocol(_) => true,
            ServerError::Core(err) => err.code() < 500,
            _ => false,
        }
    }
}
