//! Event Loop Module
//!
//! Every socket a connector owns is registered with one readiness reactor.
//! The reactor here is tokio's I/O driver, which sits on top of the platform
//! multiplexing primitive (epoll on Linux, kqueue on the BSDs and macOS, IOCP
//! on Windows). Connection and connector code only ever talks to an
//! [`EventLoop`], so the same logic runs unchanged on each platform.
//!
//! ## Threading
//!
//! ```text
//!   ServerConnector ──┐                    ┌── conn 1 task
//!                     ├──> EventLoop ──────┼── conn 2 task
//!   ClientConnector ──┘   (one thread)     └── accept task
//! ```
//!
//! An [`EventLoop::dedicated`] loop runs a single-threaded runtime on its
//! own OS thread, so every handler callback for its sockets runs on that
//! thread. Several connectors may share a loop or run on independent ones.

pub mod event_loop;

pub use event_loop::EventLoop;
