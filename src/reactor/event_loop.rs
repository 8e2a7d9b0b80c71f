//! Handle to the runtime that drives a connector's sockets.

use crate::error::{Result, TransportError};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A cloneable handle to the event loop sockets are registered with.
///
/// Cloning shares the loop. A dedicated loop stops when its last clone is
/// dropped; a loop obtained from [`EventLoop::current`] lives as long as the
/// surrounding runtime.
#[derive(Debug, Clone)]
pub struct EventLoop {
    handle: Handle,

    /// Present only for loops this crate started
    thread: Option<Arc<LoopThread>>,
}

/// Keeps a dedicated loop thread alive.
#[derive(Debug)]
struct LoopThread {
    name: String,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            let _ = stop_tx.send(());
            debug!(event_loop = %self.name, "Event loop stop requested");
        }
    }
}

impl EventLoop {
    /// Returns the loop of the tokio runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
            thread: None,
        }
    }

    /// Wraps an existing runtime handle.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            thread: None,
        }
    }

    /// Starts a single-threaded loop on a new OS thread named `name`.
    pub fn dedicated(name: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread_name = name.to_string();
        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                runtime.block_on(async {
                    // Resolves on stop request or when the sender is dropped
                    let _ = stop_rx.await;
                });
                debug!(event_loop = %thread_name, "Event loop thread exiting");
            })?;

        info!(event_loop = %name, "Event loop started");

        Ok(Self {
            handle,
            thread: Some(Arc::new(LoopThread {
                name: name.to_string(),
                stop_tx: Mutex::new(Some(stop_tx)),
            })),
        })
    }

    /// Spawns a task onto this loop.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs `future` on this loop and waits for its output.
    ///
    /// Sockets created inside `future` are registered with this loop's
    /// driver even when the caller is on a different runtime.
    pub(crate) async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn(future)
            .await
            .map_err(|e| TransportError::EventLoop(e.to_string()))
    }

    /// Returns the underlying runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Returns true if this loop runs on a thread this crate started.
    pub fn is_dedicated(&self) -> bool {
        self.thread.is_some()
    }
}
