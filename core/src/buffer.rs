//! Reusable request-body buffers.
//!
//! # Design
//! Every executor invocation borrows one buffer for its whole lifetime,
//! including retries, and refills it from the descriptor's original body
//! before each send. The buffer goes back to the pool when the guard drops,
//! so early returns and unwinding release it the same way success does.
//!
//! A pool is owned by a [`crate::Client`] rather than the process, and
//! clones of the pool share the same free list.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Idle buffers kept per pool; extra releases are dropped.
pub const MAX_POOLED_BUFFERS: usize = 64;

/// Buffers that grew past this capacity are freed instead of pooled.
pub const MAX_POOLED_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a buffer. Its contents are unspecified until it is refilled.
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    pub fn release(&self, buf: Vec<u8>) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < MAX_POOLED_BUFFERS {
            free.push(buf);
        }
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A buffer on loan from a [`BufferPool`], returned on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl PooledBuffer {
    /// Reset the buffer and copy `source` into it.
    pub fn refill(&mut self, source: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(source);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
