//! Buffer Pooling Module
//!
//! Reads and writes on a busy transport would otherwise allocate a fresh
//! buffer per socket event. The [`BufferCache`] keeps idle `BytesMut`
//! buffers in power-of-two buckets and hands them back out on demand.
//!
//! ## Ownership
//!
//! ```text
//!   BufferCache ──get_buffer(n)──> borrower (exclusive owner)
//!        ▲                               │
//!        └──────────release(buf)─────────┘
//! ```
//!
//! A buffer is moved out of the cache on borrow and moved back on release, so
//! two borrowers can never hold the same buffer. Releasing is cooperative:
//! a buffer that is simply dropped is freed like any other allocation.
//!
//! ## Example
//!
//! ```
//! use sockloop::buffer::BufferCache;
//!
//! let cache = BufferCache::new();
//! let mut buf = cache.get_buffer(1000);
//! assert!(buf.capacity() >= 1000);
//! buf.extend_from_slice(b"scratch");
//! cache.release(buf);
//!
//! // The released buffer is reused for the next request of the same size
//! let again = cache.get_buffer(1000);
//! assert!(again.is_empty());
//! assert_eq!(cache.stats().hits, 1);
//! ```

pub mod cache;

pub use cache::{BufferCache, BufferCacheConfig, BufferCacheStats};
