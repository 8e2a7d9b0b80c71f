//! Server Connector
//!
//! Owns a listening socket and the table of connections it accepted.
//!
//! ## Accept Path
//!
//! The accept loop runs as a task on the connector's event loop. For every
//! accepted socket it:
//!
//! 1. Assigns the next id (ids start at 1 and are never reused)
//! 2. Attaches the connector's current [`MessageHandler`]
//! 3. Opens the connection and inserts it into the table
//! 4. Spawns the connection's driver, which removes the entry on exit
//!
//! The table is only written by the accept path and by teardown, so
//! [`get_connection`](ServerConnector::get_connection) and
//! [`count_connections`](ServerConnector::count_connections) always see a
//! consistent snapshot.

use crate::buffer::BufferCache;
use crate::connection::driver::drive;
use crate::connection::{
    Connection, ConnectionId, ConnectionStats, MessageHandler, DISCARD_HANDLER,
};
use crate::connector::TransportConfig;
use crate::error::{Result, TransportError};
use crate::reactor::EventLoop;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Where the listening socket is in its lifecycle.
#[derive(Debug)]
enum ListenState {
    /// Never asked to listen
    Idle,
    /// A bind is in flight
    Binding(SocketAddr),
    /// The accept loop is running
    Listening {
        addr: SocketAddr,
        shutdown_tx: watch::Sender<bool>,
    },
    /// Closed, with the address it listened on if it ever did
    Stopped(Option<SocketAddr>),
}

/// State shared between the connector and its accept loop.
struct Shared {
    config: TransportConfig,
    cache: Arc<BufferCache>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    handler: RwLock<Arc<dyn MessageHandler>>,
    next_id: AtomicU64,
    stats: Arc<ConnectionStats>,
    closed: AtomicBool,
}

impl Shared {
    fn handler(&self) -> Arc<dyn MessageHandler> {
        Arc::clone(&self.handler.read().unwrap())
    }

    /// Turns an accepted socket into a tracked, driven connection.
    fn register(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        // Only the accept loop allocates ids, so the id is claimed once the
        // connection exists and a failed registration leaves no gap.
        let id = self.next_id.load(Ordering::Relaxed);
        let connection = match Connection::new(
            id,
            stream,
            self.handler(),
            Arc::clone(&self.stats),
            self.config.max_pending_write_bytes,
        ) {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to register connection");
                return;
            }
        };
        self.next_id.store(id + 1, Ordering::Relaxed);
        connection.open();

        {
            let mut table = self.connections.write().unwrap();
            if self.closed.load(Ordering::Acquire) {
                // Lost a race with close(); the driver tears it down at once
                connection.close();
            } else {
                table.insert(id, Arc::clone(&connection));
            }
        }

        info!(conn = id, peer = %peer, "Connection accepted");

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let cache = Arc::clone(&shared.cache);
            drive(Arc::clone(&connection), cache, shared.config.read_buffer_size).await;
            shared.connections.write().unwrap().remove(&connection.id());
        });
    }
}

/// Returns a connector stuck in `Binding` to `Idle`.
///
/// Covers a failed bind and a `start_listening_on` future dropped before
/// it completed; the accept loop it may have spawned exits once the
/// shutdown sender is gone.
struct BindingGuard<'a>(&'a Mutex<ListenState>);

impl Drop for BindingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            if matches!(*state, ListenState::Binding(_)) {
                *state = ListenState::Idle;
            }
        }
    }
}

/// Accepts connections until `shutdown_rx` fires.
async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => shared.register(stream, peer),
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    debug!(addr = ?listener.local_addr().ok(), "Accept loop stopped");
}

/// Listens on a port and manages every connection it accepts.
///
/// # Example
///
/// ```no_run
/// use sockloop::buffer::BufferCache;
/// use sockloop::connection::ECHO_HANDLER;
/// use sockloop::connector::ServerConnector;
/// use std::sync::Arc;
///
/// # async fn run() -> sockloop::Result<()> {
/// let server = ServerConnector::new(Arc::new(BufferCache::new()));
/// server.set_message_handler(Arc::new(ECHO_HANDLER));
/// let addr = server.start_listening(9000).await?;
/// println!("echoing on {}", addr);
/// # Ok(())
/// # }
/// ```
pub struct ServerConnector {
    shared: Arc<Shared>,
    event_loop: EventLoop,
    listen: Mutex<ListenState>,
}

impl ServerConnector {
    /// Creates a connector on the current runtime with default settings.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(cache: Arc<BufferCache>) -> Self {
        Self::with_config(cache, TransportConfig::default())
    }

    /// Creates a connector on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_config(cache: Arc<BufferCache>, config: TransportConfig) -> Self {
        Self::with_event_loop(EventLoop::current(), cache, config)
    }

    /// Creates a connector whose sockets are driven by `event_loop`.
    pub fn with_event_loop(
        event_loop: EventLoop,
        cache: Arc<BufferCache>,
        config: TransportConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                cache,
                connections: RwLock::new(HashMap::new()),
                handler: RwLock::new(Arc::new(DISCARD_HANDLER)),
                next_id: AtomicU64::new(1),
                stats: Arc::new(ConnectionStats::new()),
                closed: AtomicBool::new(false),
            }),
            event_loop,
            listen: Mutex::new(ListenState::Idle),
        }
    }

    /// Binds `0.0.0.0:port` and starts accepting.
    ///
    /// Returns the bound address, which differs from the request when
    /// `port` is 0.
    pub async fn start_listening(&self, port: u16) -> Result<SocketAddr> {
        self.start_listening_on(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
    }

    /// Binds `addr` and starts accepting.
    ///
    /// A connector listens at most once. Calling this again fails with
    /// [`TransportError::AlreadyListening`], unless the earlier bind failed.
    pub async fn start_listening_on(&self, addr: SocketAddr) -> Result<SocketAddr> {
        {
            let mut state = self.listen.lock().unwrap();
            match &*state {
                ListenState::Idle => {}
                ListenState::Binding(addr)
                | ListenState::Listening { addr, .. }
                | ListenState::Stopped(Some(addr)) => {
                    return Err(TransportError::AlreadyListening { addr: *addr });
                }
                ListenState::Stopped(None) => return Err(TransportError::ConnectorClosed),
            }
            *state = ListenState::Binding(addr);
        }
        // Declared before the state lock below so it drops after it
        let _binding = BindingGuard(&self.listen);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let bound = self
            .event_loop
            .run(async move {
                let listener = TcpListener::bind(addr).await?;
                let local_addr = listener.local_addr()?;
                tokio::spawn(accept_loop(shared, listener, shutdown_rx));
                Ok::<_, io::Error>(local_addr)
            })
            .await;

        let mut state = self.listen.lock().unwrap();
        let local_addr = match bound {
            Ok(Ok(local_addr)) => local_addr,
            Ok(Err(source)) => return Err(TransportError::Bind { addr, source }),
            Err(e) => return Err(e),
        };

        if !matches!(*state, ListenState::Binding(_)) {
            // Closed while the bind was in flight
            shutdown_tx.send_replace(true);
            *state = ListenState::Stopped(Some(local_addr));
            return Err(TransportError::ConnectorClosed);
        }

        *state = ListenState::Listening {
            addr: local_addr,
            shutdown_tx,
        };
        info!(addr = %local_addr, "Listening for connections");
        Ok(local_addr)
    }

    /// Sets the handler attached to connections accepted from now on.
    ///
    /// Connections already open keep the handler they were accepted with;
    /// use [`Connection::set_message_handler`] to change one of those.
    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.shared.handler.write().unwrap() = handler;
    }

    /// Returns the open connection with `id`, or `None` for unknown or
    /// closed ids.
    pub fn get_connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.shared
            .connections
            .read()
            .unwrap()
            .get(&id)
            .filter(|connection| connection.is_connected())
            .cloned()
    }

    /// Number of open connections.
    pub fn count_connections(&self) -> usize {
        self.shared
            .connections
            .read()
            .unwrap()
            .values()
            .filter(|connection| connection.is_connected())
            .count()
    }

    /// Ids of open connections, ascending.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .shared
            .connections
            .read()
            .unwrap()
            .values()
            .filter(|connection| connection.is_connected())
            .map(|connection| connection.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.listen.lock().unwrap() {
            ListenState::Listening { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// Returns true while the accept loop is running.
    pub fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Counters across every connection this connector accepted.
    pub fn stats(&self) -> &ConnectionStats {
        &self.shared.stats
    }

    /// Stops accepting and closes every tracked connection. Idempotent.
    ///
    /// Further operations on the closed connections fail with
    /// [`TransportError::ConnectionClosed`]. The listening socket and the
    /// connections' buffers are released by their tasks shortly after.
    pub fn close(&self) {
        let listened_on = {
            let mut state = self.listen.lock().unwrap();
            match std::mem::replace(&mut *state, ListenState::Stopped(None)) {
                ListenState::Listening { addr, shutdown_tx } => {
                    shutdown_tx.send_replace(true);
                    *state = ListenState::Stopped(Some(addr));
                    Some(addr)
                }
                ListenState::Stopped(addr) => {
                    *state = ListenState::Stopped(addr);
                    None
                }
                ListenState::Binding(_) | ListenState::Idle => None,
            }
        };

        let connections: Vec<Arc<Connection>> = {
            let mut table = self.shared.connections.write().unwrap();
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            table.drain().map(|(_, connection)| connection).collect()
        };

        for connection in &connections {
            connection.close();
        }

        info!(
            addr = ?listened_on,
            closed_connections = connections.len(),
            "Server connector closed"
        );
    }
}

impl Drop for ServerConnector {
    fn drop(&mut self) {
        self.close();
    }
}
