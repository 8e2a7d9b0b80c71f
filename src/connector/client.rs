//! Client Connector
//!
//! Opens one outbound connection and drives it with the same machinery the
//! server uses. There is no connection table: a client manages exactly one
//! connection at a time.

use crate::buffer::BufferCache;
use crate::connection::driver::drive;
use crate::connection::{
    Connection, ConnectionId, ConnectionState, ConnectionStats, MessageHandler, DISCARD_HANDLER,
};
use crate::connector::TransportConfig;
use crate::error::{Result, TransportError};
use crate::reactor::EventLoop;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info, warn};

/// Connects to a remote endpoint and manages the resulting connection.
pub struct ClientConnector {
    config: TransportConfig,
    cache: Arc<BufferCache>,
    event_loop: EventLoop,
    handler: RwLock<Arc<dyn MessageHandler>>,
    connection: Mutex<Option<Arc<Connection>>>,

    /// Set while a `connect` call is in flight
    connecting: AtomicBool,

    next_id: AtomicU64,
    stats: Arc<ConnectionStats>,
}

impl ClientConnector {
    /// Creates a client on the current runtime with default settings.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(cache: Arc<BufferCache>) -> Self {
        Self::with_config(cache, TransportConfig::default())
    }

    /// Creates a client on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_config(cache: Arc<BufferCache>, config: TransportConfig) -> Self {
        Self::with_event_loop(EventLoop::current(), cache, config)
    }

    /// Creates a client whose connection is driven by `event_loop`.
    pub fn with_event_loop(
        event_loop: EventLoop,
        cache: Arc<BufferCache>,
        config: TransportConfig,
    ) -> Self {
        Self {
            config,
            cache,
            event_loop,
            handler: RwLock::new(Arc::new(DISCARD_HANDLER)),
            connection: Mutex::new(None),
            connecting: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Sets the handler for the next connection.
    ///
    /// Fails with [`TransportError::HandlerLocked`] while a connection is
    /// live or being established, so the handler is always in place before
    /// the first inbound chunk. Use [`Connection::set_message_handler`] to
    /// swap the handler of a live connection explicitly.
    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        // Held across the check so a concurrent connect either sees the new
        // handler or makes this call fail
        let mut current = self.handler.write().unwrap();
        if self.connecting.load(Ordering::Acquire) || self.has_live_connection() {
            return Err(TransportError::HandlerLocked);
        }
        *current = handler;
        Ok(())
    }

    /// Connects to `host:port` and returns the open connection.
    ///
    /// `host` may be an IP literal or a name to resolve. Each resolved
    /// address is tried in turn, each bounded by the configured timeout.
    /// Fails with [`TransportError::AlreadyConnected`] while a previous
    /// connection is still live; once it has closed, a new `connect` gets
    /// the next id.
    ///
    /// Dropping the returned future abandons the attempt and leaves the
    /// client ready for another `connect`.
    pub async fn connect(&self, host: &str, port: u16) -> Result<Arc<Connection>> {
        let handler = {
            let handler = self.handler.read().unwrap();
            if self
                .connecting
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(TransportError::AlreadyConnected);
            }
            Arc::clone(&handler)
        };
        let _in_flight = InFlight(&self.connecting);

        self.establish(host, port, handler).await
    }

    async fn establish(
        &self,
        host: &str,
        port: u16,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<Connection>> {
        if self.has_live_connection() {
            return Err(TransportError::AlreadyConnected);
        }

        let target = format!("{}:{}", host, port);
        let host = host.to_string();
        let timeout = self.config.connect_timeout;

        debug!(addr = %target, "Connecting");
        let stream = self
            .event_loop
            .run(async move {
                let addrs: Vec<SocketAddr> = match lookup_host(target.as_str()).await {
                    Ok(addrs) => addrs.collect(),
                    Err(_) => Vec::new(),
                };
                if addrs.is_empty() {
                    return Err(TransportError::Resolve { host });
                }
                connect_any(&addrs, timeout, target).await
            })
            .await??;

        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(Connection::new(
            id,
            stream,
            handler,
            Arc::clone(&self.stats),
            self.config.max_pending_write_bytes,
        )?);
        connection.open();
        *self.connection.lock().unwrap() = Some(Arc::clone(&connection));

        info!(conn = id, peer = %connection.peer_addr(), "Connected");

        self.event_loop.spawn(drive(
            Arc::clone(&connection),
            Arc::clone(&self.cache),
            self.config.read_buffer_size,
        ));

        Ok(connection)
    }

    /// Returns the managed connection, which may already be closed.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().unwrap().clone()
    }

    /// Returns the id of the managed connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection().map(|connection| connection.id())
    }

    /// Returns true while the managed connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection()
            .is_some_and(|connection| connection.is_connected())
    }

    /// Counters across every connection this client opened.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Closes the managed connection. Idempotent.
    pub fn close(&self) {
        if let Some(connection) = self.connection() {
            connection.close();
        }
    }

    fn has_live_connection(&self) -> bool {
        self.connection()
            .is_some_and(|connection| connection.state() <= ConnectionState::Open)
    }
}

/// Clears the in-flight flag when `connect` returns or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tries each address in order and returns the first stream that connects.
///
/// An address that times out or refuses moves on to the next one. The error
/// is `ConnectTimeout` only when every address timed out.
async fn connect_any(
    addrs: &[SocketAddr],
    timeout: Duration,
    target: String,
) -> Result<TcpStream> {
    let mut last_error = None;

    for &addr in addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => {
                debug!(addr = %addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
            Err(_) => debug!(addr = %addr, ?timeout, "Connect attempt timed out"),
        }
    }

    Err(match last_error {
        Some(source) => TransportError::Connect {
            addr: target,
            source,
        },
        None => TransportError::ConnectTimeout {
            addr: target,
            timeout,
        },
    })
}

impl Drop for ClientConnector {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ECHO_HANDLER;
    use crate::connector::ServerConnector;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn echo_server(cache: &Arc<BufferCache>) -> (ServerConnector, u16) {
        let server = ServerConnector::new(Arc::clone(cache));
        server.set_message_handler(Arc::new(ECHO_HANDLER));
        let addr = server
            .start_listening_on("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        (server, addr.port())
    }

    /// Collects every chunk the handler sees, in order.
    fn collector() -> (Arc<dyn MessageHandler>, Arc<Mutex<Vec<u8>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: Arc<dyn MessageHandler> = Arc::new(move |bytes: &[u8], _: &Connection| {
            sink.lock().unwrap().extend_from_slice(bytes);
            true
        });
        (handler, received)
    }

    /// Writes all of `bytes`, retrying whatever the socket did not accept.
    async fn write_all(connection: &Connection, bytes: &[u8]) {
        let mut offset = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while offset < bytes.len() {
            let n = connection.write(&bytes[offset..]).unwrap();
            assert!(n <= bytes.len() - offset);
            offset += n;
            if n == 0 {
                assert!(tokio::time::Instant::now() < deadline, "write stalled");
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    #[tokio::test]
    async fn test_connect_registers_with_server() {
        let cache = Arc::new(BufferCache::new());
        let (server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        let connection = client.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(connection.id(), 1);
        assert!(connection.is_connected());
        assert!(client.is_connected());

        wait_until(|| server.count_connections() == 1).await;
        let accepted = server.get_connection(1).unwrap();
        assert!(accepted.is_connected());
        assert_eq!(accepted.peer_addr(), connection.local_addr());
        assert!(server.get_connection(2).is_none());
    }

    #[tokio::test]
    async fn test_empty_write_keeps_connection_open() {
        let cache = Arc::new(BufferCache::new());
        let (_server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        let connection = client.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(connection.write(&[]).unwrap(), 0);
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let cache = Arc::new(BufferCache::new());
        let (_server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));
        let (handler, received) = collector();
        client.set_message_handler(handler).unwrap();

        let connection = client.connect("localhost", port).await.unwrap();
        let payload = [0x00u8, 0x0f, 0xf0, 0xff, 0x7f, 0x80];
        write_all(&connection, &payload).await;

        wait_until(|| received.lock().unwrap().len() >= payload.len()).await;
        assert_eq!(*received.lock().unwrap(), payload);
    }

    #[tokio::test]
    async fn test_large_echo_preserves_order() {
        let cache = Arc::new(BufferCache::new());
        let (_server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));
        let (handler, received) = collector();
        client.set_message_handler(handler).unwrap();

        let connection = client.connect("127.0.0.1", port).await.unwrap();
        let payload: Vec<u8> = (0..256 * 1024u32).map(|i| (i % 241) as u8).collect();
        connection.send(&payload).unwrap();

        wait_until(|| received.lock().unwrap().len() >= payload.len()).await;
        assert!(*received.lock().unwrap() == payload);
    }

    #[tokio::test]
    async fn test_server_close_fails_client_writes() {
        let cache = Arc::new(BufferCache::new());
        let (server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        let connection = client.connect("127.0.0.1", port).await.unwrap();
        wait_until(|| server.count_connections() == 1).await;

        server.close();
        assert!(server.get_connection(1).is_none());

        wait_until(|| !connection.is_connected()).await;
        assert!(matches!(
            connection.write(b"after close"),
            Err(TransportError::ConnectionClosed { id: 1 })
        ));
    }

    #[tokio::test]
    async fn test_handler_locked_after_connect() {
        let cache = Arc::new(BufferCache::new());
        let (_server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        client.connect("127.0.0.1", port).await.unwrap();
        let result = client.set_message_handler(Arc::new(ECHO_HANDLER));
        assert!(matches!(result, Err(TransportError::HandlerLocked)));

        client.close();
        wait_until(|| !client.is_connected()).await;
        assert!(client.set_message_handler(Arc::new(ECHO_HANDLER)).is_ok());
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let cache = Arc::new(BufferCache::new());
        let (server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        client.connect("127.0.0.1", port).await.unwrap();
        let again = client.connect("127.0.0.1", port).await;
        assert!(matches!(again, Err(TransportError::AlreadyConnected)));

        client.close();
        client.close();
        let second = client.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(second.id(), 2);
        assert_eq!(client.connection_id(), Some(2));

        wait_until(|| server.connection_ids() == vec![2]).await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ClientConnector::new(Arc::new(BufferCache::new()));
        let result = client.connect("127.0.0.1", port).await;
        let err = result.unwrap_err();
        assert!(err.is_connect_error());
        assert!(client.connection().is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let client = ClientConnector::new(Arc::new(BufferCache::new()));
        let result = client.connect("host.invalid", 80).await;
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let cache = Arc::new(BufferCache::new());
        let server = ServerConnector::new(Arc::clone(&cache));
        server.set_message_handler(Arc::new(|bytes: &[u8], connection: &Connection| {
            if bytes.contains(&b'!') {
                panic!("rejecting chunk");
            }
            connection.send(bytes).is_ok()
        }));
        let port = server
            .start_listening_on("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .port();

        let doomed = ClientConnector::new(Arc::clone(&cache));
        let healthy = ClientConnector::new(Arc::clone(&cache));
        let (handler, received) = collector();
        healthy.set_message_handler(handler).unwrap();

        let doomed_conn = doomed.connect("127.0.0.1", port).await.unwrap();
        let healthy_conn = healthy.connect("127.0.0.1", port).await.unwrap();
        wait_until(|| server.count_connections() == 2).await;

        write_all(&doomed_conn, b"boom!").await;
        wait_until(|| !doomed_conn.is_connected()).await;
        wait_until(|| server.count_connections() == 1).await;

        write_all(&healthy_conn, b"still here").await;
        wait_until(|| received.lock().unwrap().len() >= 10).await;
        assert_eq!(&*received.lock().unwrap(), b"still here");
    }

    #[tokio::test]
    async fn test_handler_returning_false_closes_both_ends() {
        let cache = Arc::new(BufferCache::new());
        let server = ServerConnector::new(Arc::clone(&cache));
        server.set_message_handler(Arc::new(|_: &[u8], _: &Connection| false));
        let port = server
            .start_listening_on("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .port();

        let client = ClientConnector::new(Arc::clone(&cache));
        let connection = client.connect("127.0.0.1", port).await.unwrap();
        write_all(&connection, b"quit").await;

        wait_until(|| !connection.is_connected()).await;
        wait_until(|| server.count_connections() == 0).await;
        assert!(server.get_connection(1).is_none());
    }

    #[test]
    fn test_dedicated_event_loops() {
        let cache = Arc::new(BufferCache::new());
        let server_loop = EventLoop::dedicated("sockloop-server").unwrap();
        let client_loop = EventLoop::dedicated("sockloop-client").unwrap();

        tokio_test::block_on(async {
            let server = ServerConnector::with_event_loop(
                server_loop,
                Arc::clone(&cache),
                TransportConfig::default(),
            );
            server.set_message_handler(Arc::new(ECHO_HANDLER));
            let port = server
                .start_listening_on("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap()
                .port();

            let client = ClientConnector::with_event_loop(
                client_loop,
                Arc::clone(&cache),
                TransportConfig::default(),
            );
            let (handler, received) = collector();
            client.set_message_handler(handler).unwrap();

            let connection = client.connect("127.0.0.1", port).await.unwrap();
            connection.send(b"across threads").unwrap();

            wait_until(|| received.lock().unwrap().len() >= 14).await;
            assert_eq!(&*received.lock().unwrap(), b"across threads");
        });
    }

    #[tokio::test]
    async fn test_dropped_connect_can_be_retried() {
        let cache = Arc::new(BufferCache::new());
        let (server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        {
            let attempt = client.connect("127.0.0.1", port);
            tokio::pin!(attempt);
            tokio::select! {
                biased;
                _ = &mut attempt => panic!("connect completed without yielding"),
                _ = std::future::ready(()) => {}
            }
        }
        assert!(client.connection().is_none());

        let (handler, received) = collector();
        client.set_message_handler(handler).unwrap();
        let connection = client.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(connection.id(), 1);

        connection.send(b"again").unwrap();
        wait_until(|| received.lock().unwrap().len() >= 5).await;
        assert_eq!(&*received.lock().unwrap(), b"again");
        wait_until(|| server.count_connections() >= 1).await;
    }

    #[tokio::test]
    async fn test_connect_moves_past_unreachable_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let reachable = listener.local_addr().unwrap();

        // Non-routable; either times out or fails fast depending on the host
        let unreachable: SocketAddr = "10.255.255.1:9".parse().unwrap();

        let stream = connect_any(
            &[unreachable, reachable],
            Duration::from_millis(200),
            "mixed".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(stream.peer_addr().unwrap(), reachable);
    }

    #[tokio::test]
    async fn test_connect_reports_last_refusal() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let result = connect_any(&[closed], Duration::from_secs(1), "closed".to_string()).await;
        assert!(matches!(
            result,
            Err(TransportError::Connect { ref addr, .. }) if addr == "closed"
        ));
    }

    #[tokio::test]
    async fn test_handler_set_before_connect_is_used() {
        let cache = Arc::new(BufferCache::new());
        let (_server, port) = echo_server(&cache).await;
        let client = ClientConnector::new(Arc::clone(&cache));

        let (handler, received) = collector();
        client.set_message_handler(handler).unwrap();
        let connection = client.connect("127.0.0.1", port).await.unwrap();

        // Locked for as long as the connection is live
        assert!(matches!(
            client.set_message_handler(Arc::new(ECHO_HANDLER)),
            Err(TransportError::HandlerLocked)
        ));

        connection.send(b"mine").unwrap();
        wait_until(|| received.lock().unwrap().len() >= 4).await;
        assert_eq!(&*received.lock().unwrap(), b"mine");
    }
}
