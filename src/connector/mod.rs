//! Connector Module
//!
//! Connectors own sockets and hand them to the connection machinery.
//!
//! - [`ServerConnector`]: listens on a port, accepts connections, assigns
//!   ids and keeps the connection table
//! - [`ClientConnector`]: opens and manages a single outbound connection
//!
//! Both register their connections with an [`EventLoop`](crate::reactor::EventLoop),
//! either the runtime they were created on or one injected at construction,
//! and both draw read buffers from a shared
//! [`BufferCache`](crate::buffer::BufferCache).

pub mod client;
pub mod config;
pub mod server;

pub use client::ClientConnector;
pub use config::TransportConfig;
pub use server::ServerConnector;
