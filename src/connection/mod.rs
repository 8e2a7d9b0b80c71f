//! Connection Module
//!
//! A [`Connection`] is one non-blocking TCP endpoint registered with an
//! event loop. Inbound bytes are handed to a [`MessageHandler`] exactly as
//! they were read; outbound bytes go through a best-effort
//! [`Connection::write`] or the queueing [`Connection::send`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Connection driver task                     │
//! │                                                             │
//! │  ┌──────────────┐   readable   ┌──────────────┐             │
//! │  │ wait on      │─────────────>│ read into    │──> handler  │
//! │  │ readiness    │              │ pooled buf   │             │
//! │  │              │   writable   ┌──────────────┐             │
//! │  │              │─────────────>│ drain queued │             │
//! │  └──────────────┘              │ writes       │             │
//! │         ▲                      └──────────────┘             │
//! │         │ close() / send() wake the task                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Connecting → Open → Closing → Closed`. Transitions only move forward;
//! closing an already closing or closed connection is a no-op.
//!
//! ## Modules
//!
//! - `handle`: the shared [`Connection`] handle and its write paths
//! - `handler`: the [`MessageHandler`] capability and built-in handlers
//! - `driver`: the per-connection readiness loop
//! - `state`: [`ConnectionState`] and its monotonic transitions
//! - `stats`: counters shared by the connections of one connector

pub mod driver;
pub mod handle;
pub mod handler;
pub mod state;
pub mod stats;

// Re-export commonly used types
pub use handle::{Connection, ConnectionId};
pub use handler::{DiscardHandler, EchoHandler, MessageHandler, DISCARD_HANDLER, ECHO_HANDLER};
pub use state::ConnectionState;
pub use stats::ConnectionStats;
