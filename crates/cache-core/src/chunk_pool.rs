//! Chunk Pool — fixed-size buffer allocator with watermark backpressure
//! (spec.md §4.A).
//!
//! Grounded on `teleport-core::buffer_pool::BufferPool`: the same
//! `Mutex<Vec<Vec<u8>>>` free-list plus an atomic counter of buffers
//! currently checked out, and the same `PooledBuffer` RAII guard that
//! returns its buffer to the pool on `Drop`. The pool here additionally
//! tracks the three watermarks (low/high/critical) the spec requires, which
//! the donor's pool has no equivalent of — it only enforces a single hard
//! cap.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Pressure level derived from `used_chunks` against the pool's watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPressure {
    Normal,
    Low,
    High,
    Critical,
}

/// Fixed-size chunk allocator. One instance is owned (via `Arc`) by the
/// `Engine` and handed out to every `Object`.
pub struct ChunkPool {
    chunk_size: usize,
    total_chunks: usize,
    free: Mutex<Vec<Box<[u8]>>>,
    used_chunks: AtomicUsize,
    low_mark: usize,
    high_mark: usize,
    critical_mark: usize,
}

impl ChunkPool {
    /// `chunk_size` is the fixed size of every chunk (spec default 4096).
    /// `total_chunks` bounds how many chunks may be checked out at once.
    /// Watermarks are chunk counts, not byte counts, and must satisfy
    /// `low_mark <= high_mark <= critical_mark <= total_chunks`.
    pub fn new(
        chunk_size: usize,
        total_chunks: usize,
        low_mark: usize,
        high_mark: usize,
        critical_mark: usize,
    ) -> Arc<Self> {
        debug_assert!(low_mark <= high_mark && high_mark <= critical_mark);
        debug_assert!(critical_mark <= total_chunks);

        Arc::new(Self {
            chunk_size,
            total_chunks,
            free: Mutex::new(Vec::new()),
            used_chunks: AtomicUsize::new(0),
            low_mark,
            high_mark,
            critical_mark,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn used_chunks(&self) -> usize {
        self.used_chunks.load(Ordering::Relaxed)
    }

    /// Current pressure level, derived from `used_chunks` against the
    /// configured watermarks.
    pub fn pressure(self: &Arc<Self>) -> PoolPressure {
        let used = self.used_chunks();
        if used >= self.critical_mark {
            PoolPressure::Critical
        } else if used >= self.high_mark {
            PoolPressure::High
        } else if used >= self.low_mark {
            PoolPressure::Low
        } else {
            PoolPressure::Normal
        }
    }

    /// Attempts to check out one chunk. Returns `None` once `total_chunks`
    /// checked-out buffers are outstanding — callers turn this into
    /// `ObjectError::PoolExhausted` (spec.md §7.1) rather than blocking,
    /// since the core is never allowed to block.
    pub fn acquire(self: &Arc<Self>) -> Option<PooledChunk> {
        if self.used_chunks.load(Ordering::Relaxed) >= self.total_chunks {
            warn!(
                total_chunks = self.total_chunks,
                "chunk pool exhausted on acquire"
            );
            return None;
        }

        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.chunk_size].into_boxed_slice());

        self.used_chunks.fetch_add(1, Ordering::Relaxed);
        trace!(used = self.used_chunks(), "chunk acquired");

        Some(PooledChunk {
            buf: Some(buf),
            pool: self.clone(),
        })
    }

    fn release(&self, buf: Box<[u8]>) {
        self.used_chunks.fetch_sub(1, Ordering::Relaxed);
        self.free.lock().push(buf);
        trace!(used = self.used_chunks(), "chunk released");
    }
}

/// RAII guard around one checked-out chunk buffer. Returns the buffer to its
/// pool's free list on `Drop`, mirroring `teleport-core::buffer_pool::PooledBuffer`.
pub struct PooledChunk {
    buf: Option<Box<[u8]>>,
    pool: Arc<ChunkPool>,
}

impl Deref for PooledChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer taken before drop")
    }
}

impl DerefMut for PooledChunk {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledChunk {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> Arc<ChunkPool> {
        ChunkPool::new(4096, 10, 6, 8, 9)
    }

    #[test]
    fn acquire_and_release_round_trips_used_count() {
        let pool = test_pool();
        assert_eq!(pool.used_chunks(), 0);

        let chunk = pool.acquire().expect("pool should not be exhausted");
        assert_eq!(pool.used_chunks(), 1);
        assert_eq!(chunk.len(), 4096);

        drop(chunk);
        assert_eq!(pool.used_chunks(), 0);
    }

    #[test]
    fn acquire_fails_once_total_chunks_checked_out() {
        let pool = ChunkPool::new(64, 2, 1, 2, 2);
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn pressure_tracks_watermarks() {
        let pool = test_pool();
        assert_eq!(pool.pressure(), PoolPressure::Normal);

        let mut held = Vec::new();
        for _ in 0..6 {
            held.push(pool.acquire().unwrap());
        }
        assert_eq!(pool.pressure(), PoolPressure::Low);

        for _ in 0..2 {
            held.push(pool.acquire().unwrap());
        }
        assert_eq!(pool.pressure(), PoolPressure::High);

        held.push(pool.acquire().unwrap());
        assert_eq!(pool.pressure(), PoolPressure::Critical);
    }

    #[test]
    fn released_buffer_is_reused_not_reallocated() {
        let pool = test_pool();
        let chunk = pool.acquire().unwrap();
        drop(chunk);
        assert_eq!(pool.free.lock().len(), 1);

        let _chunk2 = pool.acquire().unwrap();
        assert_eq!(pool.free.lock().len(), 0);
    }
}
