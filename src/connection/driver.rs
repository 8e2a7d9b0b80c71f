//! Connection Driver
//!
//! Each open connection is served by one task on its connector's event loop.
//! The task waits for socket readiness and reacts:
//!
//! - **Readable**: read as many bytes as fit in the connection's pooled
//!   buffer and hand exactly those bytes to the handler, once per event.
//! - **Writable** (only while writes are queued): flush the queue.
//! - **Shutdown**: stop and release everything.
//!
//! Because one task owns the read side, handler calls for a connection never
//! overlap.

use crate::buffer::BufferCache;
use crate::connection::{Connection, ConnectionState};
use bytes::BytesMut;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Why a driver stopped.
#[derive(Debug)]
pub(crate) enum CloseReason {
    /// `close()` was called on the connection or its connector
    Requested,
    /// The peer closed its side
    PeerClosed,
    /// The handler returned `false`
    HandlerDeclined,
    /// The handler panicked
    HandlerPanicked,
    /// A socket error occurred
    Io(io::Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => f.write_str("close requested"),
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::HandlerDeclined => f.write_str("handler declined"),
            CloseReason::HandlerPanicked => f.write_str("handler panicked"),
            CloseReason::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

/// Runs the readiness loop for `connection` until it closes.
///
/// The connection must already be open. On return the connection is
/// `Closed`, its socket is released, and its read buffer is back in `cache`.
pub(crate) async fn drive(
    connection: Arc<Connection>,
    cache: Arc<BufferCache>,
    read_buffer_size: usize,
) -> CloseReason {
    let Some(stream) = connection.stream() else {
        connection.finish();
        return CloseReason::Requested;
    };
    let mut shutdown_rx = connection.subscribe_shutdown();
    let mut buf = cache.get_buffer(read_buffer_size);

    let reason = loop {
        if *shutdown_rx.borrow() || connection.state() >= ConnectionState::Closing {
            break CloseReason::Requested;
        }

        let interest = if connection.has_pending_writes() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break CloseReason::Requested;
                }
            }
            _ = connection.write_queued() => {}
            ready = stream.ready(interest) => {
                let ready = match ready {
                    Ok(ready) => ready,
                    Err(e) => break CloseReason::Io(e),
                };

                if ready.is_readable() {
                    if let Some(reason) = read_and_dispatch(&connection, &stream, &mut buf) {
                        break reason;
                    }
                }

                if ready.is_writable() {
                    if let Err(e) = connection.drain_pending(&stream) {
                        break CloseReason::Io(e);
                    }
                }
            }
        }
    };

    match &reason {
        CloseReason::Io(e) => {
            warn!(conn = connection.id(), peer = %connection.peer_addr(), error = %e, "Connection error")
        }
        CloseReason::HandlerPanicked => {
            warn!(conn = connection.id(), peer = %connection.peer_addr(), "Message handler panicked")
        }
        _ => debug!(conn = connection.id(), reason = %reason, "Connection ending"),
    }

    connection.close();
    drop(stream);
    cache.release(buf);
    connection.finish();
    reason
}

/// Reads one chunk and delivers it. Returns a reason if the connection
/// must close.
fn read_and_dispatch(
    connection: &Connection,
    stream: &TcpStream,
    buf: &mut BytesMut,
) -> Option<CloseReason> {
    buf.clear();

    match stream.try_read_buf(buf) {
        Ok(0) => Some(CloseReason::PeerClosed),
        Ok(n) => {
            connection.record_read(n);
            trace!(conn = connection.id(), bytes = n, "Read chunk");
            deliver(connection, &buf[..n])
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
        Err(e) => Some(CloseReason::Io(e)),
    }
}

fn deliver(connection: &Connection, bytes: &[u8]) -> Option<CloseReason> {
    let handler = connection.handler();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.handle_message(bytes, connection)
    }));

    match outcome {
        Ok(true) => None,
        Ok(false) => Some(CloseReason::HandlerDeclined),
        Err(_) => Some(CloseReason::HandlerPanicked),
    }
}
