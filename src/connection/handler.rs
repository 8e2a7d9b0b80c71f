//! Message Handlers
//!
//! A [`MessageHandler`] is the one upcall from the transport into
//! application code. It receives each inbound chunk together with the
//! connection it arrived on and decides whether the connection stays open.
//!
//! Chunks are raw: a single write on the peer may arrive as several chunks,
//! and several writes may arrive as one. Only order and content are
//! preserved. Framing is up to the handler, typically with the primitives in
//! [`crate::wire`].
//!
//! Handlers run on the event loop thread. A handler that blocks stalls every
//! other connection sharing that loop.
//!
//! ## Example
//!
//! ```
//! use sockloop::connection::{Connection, MessageHandler};
//! use std::sync::Arc;
//!
//! // Any matching closure is a handler
//! let upper: Arc<dyn MessageHandler> = Arc::new(|bytes: &[u8], conn: &Connection| {
//!     conn.send(&bytes.to_ascii_uppercase()).is_ok()
//! });
//! ```

use crate::connection::Connection;
use tracing::trace;

/// The capability every connection owner implements.
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound chunk.
    ///
    /// Returns `false` to close the connection.
    fn handle_message(&self, bytes: &[u8], connection: &Connection) -> bool;
}

impl<F> MessageHandler for F
where
    F: Fn(&[u8], &Connection) -> bool + Send + Sync,
{
    fn handle_message(&self, bytes: &[u8], connection: &Connection) -> bool {
        self(bytes, connection)
    }
}

/// Writes every inbound chunk back to the connection it came from.
///
/// Bytes the socket cannot take immediately are queued, so nothing is dropped
/// under backpressure. The connection closes only if its write queue
/// overflows.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

/// The built-in echo handler.
pub const ECHO_HANDLER: EchoHandler = EchoHandler;

impl MessageHandler for EchoHandler {
    fn handle_message(&self, bytes: &[u8], connection: &Connection) -> bool {
        connection.send(bytes).is_ok()
    }
}

/// Drops every inbound chunk and keeps the connection open.
///
/// Connectors use this until a handler is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardHandler;

/// The built-in discard handler.
pub const DISCARD_HANDLER: DiscardHandler = DiscardHandler;

impl MessageHandler for DiscardHandler {
    fn handle_message(&self, bytes: &[u8], connection: &Connection) -> bool {
        trace!(conn = connection.id(), bytes = bytes.len(), "Discarding chunk");
        true
    }
}
