//! # sockloop - A Non-Blocking TCP Transport
//!
//! sockloop is a small transport layer: it accepts and opens TCP
//! connections, multiplexes them on an event loop, hands inbound bytes to
//! application handlers, and provides a compact wire codec for building
//! protocols on top.
//!
//! ## Features
//!
//! - **Event-Driven**: One loop thread serves many sockets through readiness
//!   notifications (epoll / kqueue / IOCP via Tokio)
//! - **Non-Blocking Writes**: `write` never blocks and reports how many bytes
//!   the socket took; `send` queues the rest
//! - **Pooled Buffers**: Read buffers are borrowed from a shared, bucketed cache
//! - **Compact Codec**: SLEB128-style integers and length-prefixed ASCII strings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               sockloop                                  │
//! │                                                                         │
//! │  ┌─────────────────┐                       ┌─────────────────┐          │
//! │  │ ServerConnector │── accept ──┐   ┌──────│ ClientConnector │          │
//! │  │ (id → conn map) │            │   │      │ (one conn)      │          │
//! │  └─────────────────┘            ▼   ▼      └─────────────────┘          │
//! │                           ┌──────────────┐                              │
//! │                           │  Connection  │── chunk ──> MessageHandler   │
//! │                           │  + driver    │                              │
//! │                           └──────┬───────┘                              │
//! │                    readiness     │     read buffers                     │
//! │               ┌──────────────────┼──────────────────┐                   │
//! │               ▼                                     ▼                   │
//! │  ┌──────────────────────────┐           ┌──────────────────────┐        │
//! │  │        EventLoop         │           │     BufferCache      │        │
//! │  │  (Tokio I/O driver)      │           │ (power-of-2 buckets) │        │
//! │  └──────────────────────────┘           └──────────────────────┘        │
//! │                                                                         │
//! │  wire: compact integers and ASCII strings over bytes::Buf / BufMut      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use sockloop::{BufferCache, ClientConnector, Connection, MessageHandler, ServerConnector, ECHO_HANDLER};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = Arc::new(BufferCache::new());
//!
//!     // An echo server on an ephemeral port
//!     let server = ServerConnector::new(Arc::clone(&cache));
//!     server.set_message_handler(Arc::new(ECHO_HANDLER));
//!     let addr = server.start_listening(0).await?;
//!
//!     // A client that prints whatever comes back
//!     let client = ClientConnector::new(Arc::clone(&cache));
//!     let printer: Arc<dyn MessageHandler> = Arc::new(|bytes: &[u8], _: &Connection| {
//!         println!("got {:?}", bytes);
//!         true
//!     });
//!     client.set_message_handler(printer)?;
//!
//!     let connection = client.connect("127.0.0.1", addr.port()).await?;
//!     connection.send(b"hello")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`reactor`]: The event loop connections are registered with
//! - [`connection`]: Connections, their driver task and message handlers
//! - [`connector`]: Server and client connectors
//! - [`buffer`]: The shared buffer cache
//! - [`wire`]: Compact integer and ASCII string codec
//! - [`error`]: Transport errors
//!
//! ## Design Highlights
//!
//! ### One Reader Per Connection
//!
//! Every connection is served by a single driver task, so its handler is
//! never invoked concurrently. Different connections on a multi-threaded
//! runtime may be served in parallel.
//!
//! ### Ordered Writes
//!
//! `write` refuses (returns 0) while bytes queued by `send` are still
//! pending, so mixing the two never reorders data on the wire.
//!
//! ### Handler Isolation
//!
//! A handler that panics closes only the connection it was serving.

pub mod buffer;
pub mod connection;
pub mod connector;
pub mod error;
pub mod reactor;
pub mod wire;

// Re-export commonly used types for convenience
pub use buffer::{BufferCache, BufferCacheConfig};
pub use connection::{
    Connection, ConnectionId, ConnectionState, ConnectionStats, MessageHandler, DISCARD_HANDLER,
    ECHO_HANDLER,
};
pub use connector::{ClientConnector, ServerConnector, TransportConfig};
pub use error::{Result, TransportError};
pub use reactor::EventLoop;
pub use wire::{WireError, WireResult};

/// The default port the echo server listens on
pub const DEFAULT_PORT: u16 = 7007;

/// The default host the echo server binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of sockloop
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
