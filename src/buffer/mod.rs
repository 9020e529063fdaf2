//! Receive-buffer pooling for listener reader loops
//!
//! Each datagram read wants a fresh zeroed buffer of the full receive
//! size; recycling them keeps the reader loop from hitting the allocator
//! on every packet.

use bytes::BytesMut;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Buffers retained beyond this count are dropped instead of pooled
const MAX_POOLED: usize = 8;

/// A pool of reusable receive buffers of one fixed size
pub struct BufferPool {
    available: Mutex<VecDeque<BytesMut>>,
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool of buffers of `buffer_size` bytes, pre-allocating
    /// `initial` of them
    pub fn new(buffer_size: usize, initial: usize) -> Self {
        let initial = initial.min(MAX_POOLED);
        let available = (0..initial)
            .map(|_| BytesMut::zeroed(buffer_size))
            .collect();

        Self {
            available: Mutex::new(available),
            buffer_size,
        }
    }

    /// The size of every buffer handed out
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Take a buffer, resized to the pool's buffer size
    pub fn get(&self) -> BytesMut {
        let recycled = self.available.lock().unwrap().pop_front();

        match recycled {
            Some(mut buf) => {
                buf.resize(self.buffer_size, 0);
                buf
            }
            None => BytesMut::zeroed(self.buffer_size),
        }
    }

    /// Return a buffer for reuse
    pub fn put(&self, buf: BytesMut) {
        let mut available = self.available.lock().unwrap();
        if available.len() < MAX_POOLED {
            available.push_back(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_full_size() {
        let pool = BufferPool::new(1473, 0);
        let buf = pool.get();
        assert_eq!(buf.len(), 1473);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_recycled_buffer_is_resized() {
        let pool = BufferPool::new(64, 1);

        let mut buf = pool.get();
        buf.truncate(3);
        pool.put(buf);

        assert_eq!(pool.get().len(), 64);
    }

    #[test]
    fn test_pool_caps_retained_buffers() {
        let pool = BufferPool::new(16, 0);
        for _ in 0..MAX_POOLED + 4 {
            pool.put(BytesMut::zeroed(16));
        }

        assert_eq!(pool.available.lock().unwrap().len(), MAX_POOLED);
    }
}
