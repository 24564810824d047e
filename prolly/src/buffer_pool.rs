//! Buffer pool for reusable encoder scratch buffers.
//!
//! The buffer pool reduces allocation overhead when serializing nodes by
//! keeping a fixed set of growable byte buffers that are leased out to
//! encoders and returned automatically.
//!
//! # Design
//!
//! - Creates all buffers at construction time
//! - Uses a free list (Vec) for O(1) lease/return
//! - Returns buffers automatically via RAII (Drop on `ScratchBuffer`)
//! - Thread-safe: uses Mutex for the free list bookkeeping only
//!
//! # Invariants
//!
//! - Pool capacity is fixed after construction
//! - No leased buffer is ever larger than `max_buffer_size`
//! - Free list size + leased count == capacity

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Default number of scratch buffers in a pool.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Default upper bound on a single scratch buffer.
///
/// Item regions are addressed with `u16` offsets, so a node never needs much
/// more than a few regions of 64KB.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 4 * 64 * 1024;

/// Initial capacity reserved for each buffer at construction.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// A pool of reusable scratch buffers.
///
/// # Pre-conditions
/// - `capacity` must be > 0 when creating
/// - `max_buffer_size` must be > 0 when creating
///
/// # Invariants
/// - `free_list.len() + leased_count == capacity`
pub struct BufferPool {
    /// Free buffers available for leasing.
    free_list: Mutex<Vec<Vec<u8>>>,
    /// Total capacity (for assertions).
    capacity: usize,
    /// Largest size a caller may lease.
    max_buffer_size: usize,
}

impl BufferPool {
    /// Create a new buffer pool with the default maximum buffer size.
    ///
    /// # Panics
    /// Panics if capacity is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Self::with_max_buffer_size(capacity, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Create a new buffer pool.
    ///
    /// # Post-conditions
    /// - Pool contains `capacity` empty buffers
    ///
    /// # Panics
    /// Panics if capacity or `max_buffer_size` is 0.
    #[must_use]
    pub fn with_max_buffer_size(capacity: usize, max_buffer_size: usize) -> Arc<Self> {
        assert!(capacity > 0, "Buffer pool capacity must be positive");
        assert!(max_buffer_size > 0, "Buffer pool max buffer size must be positive");

        let initial = INITIAL_BUFFER_SIZE.min(max_buffer_size);
        let mut free_list = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free_list.push(Vec::with_capacity(initial));
        }

        Arc::new(Self {
            free_list: Mutex::new(free_list),
            capacity,
            max_buffer_size,
        })
    }

    /// Lease a raw buffer with room for at least `size` bytes.
    ///
    /// # Returns
    /// - `Some(Vec<u8>)` if a buffer is available (empty, capacity >= `size`)
    /// - `None` if the pool is exhausted or `size > max_buffer_size`
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn lease(&self, size: usize) -> Option<Vec<u8>> {
        if size > self.max_buffer_size {
            return None;
        }
        let mut buffer = self.free_list.lock().expect("lock poisoned").pop()?;
        buffer.clear();
        buffer.reserve(size);
        Some(buffer)
    }

    /// Lease a scratch buffer that returns itself to the pool when dropped.
    ///
    /// # Returns
    /// - `Some(ScratchBuffer)` if a buffer is available
    /// - `None` if the pool is exhausted or `size > max_buffer_size`
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn lease_scratch(self: &Arc<Self>, size: usize) -> Option<ScratchBuffer> {
        let buffer = self.lease(size)?;
        Some(ScratchBuffer {
            buffer,
            pool: Arc::clone(self),
        })
    }

    /// Return a buffer to the pool.
    ///
    /// Buffers that grew past `max_buffer_size` are shrunk so the pool never
    /// pins more memory than `capacity * max_buffer_size`.
    ///
    /// # Panics
    /// Panics if returning would exceed capacity (indicates a bug).
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn return_buffer(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        if buffer.capacity() > self.max_buffer_size {
            buffer.shrink_to(self.max_buffer_size);
        }
        let mut free_list = self.free_list.lock().expect("lock poisoned");
        // Invariant check: we should never exceed capacity
        assert!(
            free_list.len() < self.capacity,
            "Buffer pool overflow: returning buffer to full pool"
        );
        free_list.push(buffer);
    }

    /// Get the number of available buffers.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn available(&self) -> usize {
        self.free_list.lock().expect("lock poisoned").len()
    }

    /// Get the total capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the largest size that can be leased.
    #[must_use]
    pub const fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish_non_exhaustive()
    }
}

/// A leased scratch buffer.
///
/// Dereferences to the underlying `Vec<u8>`. The buffer goes back to its pool
/// when this handle is dropped, including during unwinding.
pub struct ScratchBuffer {
    buffer: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for ScratchBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        self.pool.return_buffer(std::mem::take(&mut self.buffer));
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
