//! Transport error type.

use crate::connection::ConnectionId;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by connectors and connections.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An outbound connection attempt failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// An outbound connection attempt did not complete in time
    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// The host name did not resolve to any address
    #[error("could not resolve host: {host}")]
    Resolve { host: String },

    /// The connection has been torn down
    #[error("connection {id} is closed")]
    ConnectionClosed { id: ConnectionId },

    /// The connection's queue of unsent bytes is at its limit
    #[error("connection {id} write queue is full ({queued} bytes pending)")]
    WriteQueueFull { id: ConnectionId, queued: usize },

    /// `start_listening` was called on a connector that already listened
    #[error("connector is already listening on {addr}")]
    AlreadyListening { addr: SocketAddr },

    /// The connector was closed and cannot be used again
    #[error("connector is closed")]
    ConnectorClosed,

    /// `connect` was called while a live connection exists
    #[error("client already has a live connection")]
    AlreadyConnected,

    /// The client handler cannot change once the connection is established
    #[error("message handler cannot be replaced after connect")]
    HandlerLocked,

    /// The event loop dropped a task before it completed
    #[error("event loop error: {0}")]
    EventLoop(String),

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true if this error came from an outbound connection attempt.
    ///
    /// These are recoverable by retrying.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. }
                | TransportError::ConnectTimeout { .. }
                | TransportError::Resolve { .. }
        )
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
