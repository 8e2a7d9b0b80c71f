//! Bucketed pool of reusable byte buffers.
//!
//! Requests are rounded up to the next power of two (never below
//! `min_bucket_size`) and served from that bucket. A released buffer is filed
//! under the largest bucket its capacity fully covers, so any buffer handed
//! out of bucket `N` can hold at least `N` bytes.

use bytes::BytesMut;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::trace;

/// Configuration for a [`BufferCache`].
#[derive(Debug, Clone)]
pub struct BufferCacheConfig {
    /// Smallest bucket size in bytes (default: 64)
    pub min_bucket_size: usize,

    /// Idle buffers kept per bucket before releases start dropping (default: 64)
    pub max_idle_per_bucket: usize,
}

impl Default for BufferCacheConfig {
    fn default() -> Self {
        Self {
            min_bucket_size: 64,
            max_idle_per_bucket: 64,
        }
    }
}

/// Counters describing how well the cache is doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferCacheStats {
    /// Requests served from an idle buffer
    pub hits: u64,
    /// Requests that had to allocate
    pub misses: u64,
    /// Buffers accepted back into the pool
    pub released: u64,
    /// Released buffers dropped because their bucket was full or too small
    pub dropped: u64,
    /// Buffers currently idle in the pool
    pub idle: usize,
}

/// A pool of reusable `BytesMut` buffers shared by every connection of one
/// or more connectors.
///
/// Borrow and release are serialized by a single mutex; the critical section
/// is a `Vec` push or pop.
#[derive(Debug)]
pub struct BufferCache {
    config: BufferCacheConfig,

    /// Idle buffers by bucket size
    buckets: Mutex<HashMap<usize, Vec<BytesMut>>>,

    hits: AtomicU64,
    misses: AtomicU64,
    released: AtomicU64,
    dropped: AtomicU64,
}

impl Default for BufferCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferCache {
    /// Creates an empty cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(BufferCacheConfig::default())
    }

    /// Creates an empty cache with the given configuration.
    pub fn with_config(config: BufferCacheConfig) -> Self {
        Self {
            config: BufferCacheConfig {
                min_bucket_size: config.min_bucket_size.max(1),
                ..config
            },
            buckets: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            released: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns an empty buffer whose capacity is at least `min_capacity`.
    ///
    /// The buffer is exclusively owned by the caller until it is passed to
    /// [`release`](Self::release) or dropped.
    pub fn get_buffer(&self, min_capacity: usize) -> BytesMut {
        let bucket = self.bucket_for_request(min_capacity);

        let reused = {
            let mut buckets = self.buckets.lock().unwrap();
            buckets.get_mut(&bucket).and_then(Vec::pop)
        };

        match reused {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug_assert!(buf.capacity() >= min_capacity);
                buf
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(bucket, "Allocating new buffer");
                BytesMut::with_capacity(bucket)
            }
        }
    }

    /// Returns a buffer to the pool so a later request can reuse it.
    ///
    /// The buffer is cleared first. Buffers smaller than the smallest bucket,
    /// or destined for a bucket that is already full, are dropped.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let capacity = buf.capacity();

        if capacity < self.config.min_bucket_size {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Largest power of two not exceeding the capacity
        let bucket = 1usize << (usize::BITS - 1 - capacity.leading_zeros());

        let mut buckets = self.buckets.lock().unwrap();
        let idle = buckets.entry(bucket).or_default();
        if idle.len() < self.config.max_idle_per_bucket {
            idle.push(buf);
            self.released.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> BufferCacheStats {
        let idle = self.buckets.lock().unwrap().values().map(Vec::len).sum();
        BufferCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            idle,
        }
    }

    /// Drops every idle buffer.
    pub fn clear(&self) {
        self.buckets.lock().unwrap().clear();
    }

    fn bucket_for_request(&self, min_capacity: usize) -> usize {
        let wanted = min_capacity.max(self.config.min_bucket_size);
        // Requests beyond the largest power of two are allocated exactly.
        wanted.checked_next_power_of_two().unwrap_or(wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_capacity_at_least_requested() {
        let cache = BufferCache::new();
        for size in [0, 1, 63, 64, 65, 1000, 4096, 70_000] {
            let buf = cache.get_buffer(size);
            assert!(buf.capacity() >= size, "capacity for {}", size);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let cache = BufferCache::new();
        let mut buf = cache.get_buffer(500);
        buf.extend_from_slice(b"leftover");
        let ptr = buf.as_ptr();
        cache.release(buf);

        let reused = cache.get_buffer(300);
        assert_eq!(reused.as_ptr(), ptr);
        assert!(reused.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.idle, 0);
    }

    #[test]
    fn test_smaller_bucket_not_used_for_larger_request() {
        let cache = BufferCache::new();
        let small = cache.get_buffer(100);
        cache.release(small);

        let big = cache.get_buffer(1000);
        assert!(big.capacity() >= 1000);
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().idle, 1);
    }

    #[test]
    fn test_full_bucket_drops_release() {
        let cache = BufferCache::with_config(BufferCacheConfig {
            min_bucket_size: 64,
            max_idle_per_bucket: 2,
        });

        let bufs: Vec<_> = (0..3).map(|_| cache.get_buffer(64)).collect();
        for buf in bufs {
            cache.release(buf);
        }

        let stats = cache.stats();
        assert_eq!(stats.released, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.idle, 2);
    }

    #[test]
    fn test_tiny_buffers_are_not_pooled() {
        let cache = BufferCache::new();
        cache.release(BytesMut::with_capacity(8));
        assert_eq!(cache.stats().dropped, 1);
        assert_eq!(cache.stats().idle, 0);
    }

    #[test]
    fn test_clear_drops_idle() {
        let cache = BufferCache::new();
        let buf = cache.get_buffer(128);
        cache.release(buf);
        assert_eq!(cache.stats().idle, 1);
        cache.clear();
        assert_eq!(cache.stats().idle, 0);
    }

    #[test]
    fn test_concurrent_borrowers_never_share() {
        let cache = Arc::new(BufferCache::new());
        // Seed the pool so threads race for the same idle buffers
        let seeded: Vec<_> = (0..8).map(|_| cache.get_buffer(256)).collect();
        for buf in seeded {
            cache.release(buf);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..100 {
                        held.push(cache.get_buffer(256));
                        if held.len() > 4 {
                            cache.release(held.remove(0));
                        }
                    }
                    held
                })
            })
            .collect();

        // Keep every thread's buffers alive while comparing addresses
        let held: Vec<BytesMut> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        let mut seen = HashSet::new();
        for buf in &held {
            assert!(seen.insert(buf.as_ptr()), "buffer held by two borrowers");
        }
    }
}
