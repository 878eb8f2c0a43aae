//! Size-classed pool of reusable byte buffers.
//!
//! Buffers are handed out as [`PooledBuffer`] guards. The guard owns the
//! buffer exclusively and gives it back to the pool when dropped, so every
//! exit path of the acquiring call (including `?` and unwinding) releases it.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Smallest size class handed out, in bytes.
const MIN_CLASS_BYTES: usize = 4096;

/// Hit/miss counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquisitions served from a retained buffer.
    pub hits: usize,
    /// Acquisitions that had to allocate.
    pub misses: usize,
    /// Buffers currently retained across all classes.
    pub retained: usize,
}

/// Free lists of byte buffers keyed by power-of-two capacity.
pub struct BufferPool {
    classes: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    max_per_class: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl BufferPool {
    /// Create a pool keeping at most `max_per_class` idle buffers per class.
    pub fn new(max_per_class: usize) -> Self {
        Self {
            classes: Mutex::new(HashMap::new()),
            max_per_class,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Size class serving a request of `len` bytes.
    pub fn class_for(len: usize) -> usize {
        len.max(MIN_CLASS_BYTES).next_power_of_two()
    }

    /// Borrow a buffer of exactly `len` visible bytes.
    ///
    /// Contents are unspecified; callers overwrite the whole range.
    pub fn acquire(&self, len: usize) -> PooledBuffer<'_> {
        let class = Self::class_for(len);
        let reused = self.lock().get_mut(&class).and_then(Vec::pop);

        let buf = match reused {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                log::debug!("buffer pool: allocating {} byte class for {} bytes", class, len);
                vec![0u8; class]
            }
        };

        PooledBuffer {
            buf: Some(buf),
            len,
            pool: self,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            retained: self.lock().values().map(Vec::len).sum(),
        }
    }

    /// Drop every retained buffer.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn release(&self, buf: Vec<u8>) {
        let mut classes = self.lock();
        let free = classes.entry(buf.len()).or_default();
        if free.len() < self.max_per_class {
            free.push(buf);
        }
    }

    // A panic while holding the lock leaves the free lists intact, so a
    // poisoned mutex is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Vec<Vec<u8>>>> {
        self.classes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(4)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_per_class", &self.max_per_class)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive loan of a pooled buffer, returned on drop.
pub struct PooledBuffer<'a> {
    buf: Option<Vec<u8>>,
    len: usize,
    pool: &'a BufferPool,
}

impl PooledBuffer<'_> {
    /// Copy the visible bytes into an exact-length vector.
    pub fn to_exact_vec(&self) -> Vec<u8> {
        self.deref().to_vec()
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => &buf[..self.len],
            None => &[],
        }
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => &mut buf[..self.len],
            None => &mut [],
        }
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
