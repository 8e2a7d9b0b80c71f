//! The shared connection handle.
//!
//! A `Connection` is held as `Arc<Connection>` by its owning connector, by
//! its driver task, and by any caller that looked it up. All methods take
//! `&self` and are safe to call from any thread, including from inside the
//! connection's own message handler.

use crate::connection::handler::MessageHandler;
use crate::connection::state::{AtomicState, ConnectionState};
use crate::connection::stats::ConnectionStats;
use crate::error::{Result, TransportError};
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace, warn};

/// Identifier assigned to a connection by its connector.
///
/// Server-side ids start at 1, increase by one per accepted connection, and
/// are never reused.
pub type ConnectionId = u64;

/// Bytes accepted by [`Connection::send`] but not yet taken by the socket.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl PendingWrites {
    pub(crate) fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn push(&mut self, chunk: Bytes) {
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}

/// One non-blocking socket endpoint.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: AtomicState,

    /// Taken on close so later writes fail fast
    stream: Mutex<Option<Arc<TcpStream>>>,

    /// Writes that did not fit the socket buffer, oldest first
    pending: Mutex<PendingWrites>,
    max_pending_write_bytes: usize,

    handler: RwLock<Arc<dyn MessageHandler>>,

    /// Signals the driver task to tear down
    shutdown_tx: watch::Sender<bool>,

    /// Wakes the driver when a write is queued
    write_wakeup: Notify,

    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Wraps a connected stream. The connection starts in `Connecting` and
    /// must be opened before its driver runs.
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        handler: Arc<dyn MessageHandler>,
        stats: Arc<ConnectionStats>,
        max_pending_write_bytes: usize,
    ) -> io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            id,
            peer_addr,
            local_addr,
            state: AtomicState::new(ConnectionState::Connecting),
            stream: Mutex::new(Some(Arc::new(stream))),
            pending: Mutex::new(PendingWrites::default()),
            max_pending_write_bytes,
            handler: RwLock::new(handler),
            shutdown_tx,
            write_wakeup: Notify::new(),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            stats,
        })
    }

    /// Returns the connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Returns true while the connection is open for I/O.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Total bytes delivered to the handler.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Total bytes accepted by the socket.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Bytes queued by [`send`](Self::send) that the socket has not taken yet.
    pub fn pending_write_bytes(&self) -> usize {
        self.pending.lock().unwrap().len
    }

    /// Replaces the handler used for this connection's future deliveries.
    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.handler.write().unwrap() = handler;
    }

    /// Attempts to hand `bytes` to the socket without blocking.
    ///
    /// Returns how many bytes the socket accepted. Anything short of
    /// `bytes.len()`, including 0, means the send buffer is full and the
    /// caller owns retrying the rest. While bytes queued by
    /// [`send`](Self::send) are still pending this returns 0, so the two
    /// paths never reorder data.
    ///
    /// Fails with [`TransportError::ConnectionClosed`] once the connection
    /// is closing or closed. A socket error closes the connection.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let stream = self.live_stream()?;
        if bytes.is_empty() {
            return Ok(0);
        }

        let pending = self.pending.lock().unwrap();
        if !pending.is_empty() {
            return Ok(0);
        }

        let result = stream.try_write(bytes);
        drop(pending);

        match result {
            Ok(n) => {
                self.record_written(n);
                trace!(conn = self.id, bytes = n, offered = bytes.len(), "Wrote bytes");
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(self.fail_write(e)),
        }
    }

    /// Writes as much of `bytes` as the socket takes now and queues the
    /// rest to be flushed when the socket becomes writable.
    ///
    /// Fails with [`TransportError::WriteQueueFull`] if the remainder would
    /// push the queue past its limit. The remainder is then not queued; any
    /// prefix the socket already took stays written.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let stream = self.live_stream()?;
        if bytes.is_empty() {
            return Ok(());
        }

        let mut pending = self.pending.lock().unwrap();
        let mut offset = 0;

        if pending.is_empty() {
            match stream.try_write(bytes) {
                Ok(n) => {
                    self.record_written(n);
                    offset = n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    drop(pending);
                    return Err(self.fail_write(e));
                }
            }
        }

        if offset == bytes.len() {
            return Ok(());
        }

        let remainder = &bytes[offset..];
        if pending.len + remainder.len() > self.max_pending_write_bytes {
            return Err(TransportError::WriteQueueFull {
                id: self.id,
                queued: pending.len,
            });
        }

        pending.push(Bytes::copy_from_slice(remainder));
        trace!(
            conn = self.id,
            queued = remainder.len(),
            pending = pending.len,
            "Queued bytes for writable"
        );
        drop(pending);

        self.write_wakeup.notify_one();
        Ok(())
    }

    /// Requests teardown. Idempotent.
    ///
    /// The connection stops accepting writes immediately; the driver task
    /// releases the socket and its buffer shortly after.
    pub fn close(&self) {
        if self.state.advance(ConnectionState::Closing) {
            debug!(conn = self.id, peer = %self.peer_addr, "Closing connection");
            self.stream.lock().unwrap().take();
            self.shutdown_tx.send_replace(true);
        }
    }

    pub(crate) fn open(&self) -> bool {
        let opened = self.state.advance(ConnectionState::Open);
        if opened {
            self.stats.connection_opened();
        }
        opened
    }

    /// Marks the connection closed once its driver has exited.
    pub(crate) fn finish(&self) {
        self.state.advance(ConnectionState::Closing);
        if self.state.advance(ConnectionState::Closed) {
            self.stream.lock().unwrap().take();
            self.pending.lock().unwrap().clear();
            self.stats.connection_closed();
            debug!(
                conn = self.id,
                peer = %self.peer_addr,
                bytes_read = self.bytes_read(),
                bytes_written = self.bytes_written(),
                "Connection closed"
            );
        }
    }

    /// Returns the stream for the driver, if the connection is still live.
    pub(crate) fn stream(&self) -> Option<Arc<TcpStream>> {
        self.stream.lock().unwrap().clone()
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub(crate) async fn write_queued(&self) {
        self.write_wakeup.notified().await
    }

    pub(crate) fn has_pending_writes(&self) -> bool {
        !self.pending.lock().unwrap().is_empty()
    }

    pub(crate) fn handler(&self) -> Arc<dyn MessageHandler> {
        Arc::clone(&self.handler.read().unwrap())
    }

    pub(crate) fn record_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        self.stats.delivered(n);
    }

    /// Flushes queued writes until the queue is empty or the socket would
    /// block.
    pub(crate) fn drain_pending(&self, stream: &TcpStream) -> io::Result<()> {
        let mut guard = self.pending.lock().unwrap();
        let pending = &mut *guard;

        while let Some(front) = pending.chunks.front_mut() {
            match stream.try_write(front) {
                Ok(n) => {
                    self.record_written(n);
                    pending.len -= n;
                    if n == front.len() {
                        pending.chunks.pop_front();
                    } else {
                        front.advance(n);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        trace!(conn = self.id, pending = pending.len, "Drained write queue");
        Ok(())
    }

    fn live_stream(&self) -> Result<Arc<TcpStream>> {
        if self.state() != ConnectionState::Open {
            return Err(TransportError::ConnectionClosed { id: self.id });
        }
        self.stream
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransportError::ConnectionClosed { id: self.id })
    }

    fn record_written(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
        self.stats.bytes_written(n);
    }

    fn fail_write(&self, error: io::Error) -> TransportError {
        warn!(conn = self.id, peer = %self.peer_addr, error = %error, "Write failed");
        self.close();
        TransportError::ConnectionClosed { id: self.id }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .finish()
    }
}
