//! Managed byte buffers handed out by an injected provider.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use tracing::trace;

use crate::utils::require;
use crate::{Error, IcebergResult};

/// A fixed-size, zero-initialized byte buffer owned by whoever acquired it. Only a provider can
/// change its size.
#[derive(Debug, Default)]
pub struct ManagedBuffer {
    data: BytesMut,
}

impl ManagedBuffer {
    fn zeroed(size: usize) -> Self {
        Self {
            data: BytesMut::zeroed(size),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Copy `bytes` to the start of the buffer and return the written region. The buffer must
    /// already be large enough.
    pub fn stage(&mut self, bytes: &[u8]) -> IcebergResult<&[u8]> {
        require!(
            bytes.len() <= self.capacity(),
            Error::internal_error(format!(
                "staging {} bytes into a {} byte buffer",
                bytes.len(),
                self.capacity()
            ))
        );
        self.data[..bytes.len()].copy_from_slice(bytes);
        Ok(&self.data[..bytes.len()])
    }
}

/// Source of [`ManagedBuffer`]s. Shared infrastructure: implementations must tolerate concurrent
/// use from independent engines.
pub trait BufferProvider: Debug + Send + Sync {
    fn acquire(&self, size: usize) -> IcebergResult<ManagedBuffer>;

    /// Replace the contents of `buffer` with `new_size` fresh bytes. Contents are not preserved.
    /// Resizing to zero releases the buffer's memory. On failure `buffer` is left untouched.
    fn resize(&self, buffer: &mut ManagedBuffer, new_size: usize) -> IcebergResult<()>;
}

/// Heap-backed provider that tracks outstanding bytes and optionally refuses to exceed a limit.
#[derive(Debug, Default)]
pub struct HeapBufferProvider {
    limit: Option<usize>,
    allocated: AtomicUsize,
}

impl HeapBufferProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Bytes currently handed out and not released
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    fn reserve(&self, release: usize, requested: usize) -> IcebergResult<()> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.saturating_sub(release).checked_add(requested)?;
                (next <= limit).then_some(next)
            })
            .map(|_| ())
            .map_err(|_| Error::BufferAllocation { requested, limit })
    }
}

impl BufferProvider for HeapBufferProvider {
    fn acquire(&self, size: usize) -> IcebergResult<ManagedBuffer> {
        self.reserve(0, size)?;
        trace!(size, "acquired buffer");
        Ok(ManagedBuffer::zeroed(size))
    }

    fn resize(&self, buffer: &mut ManagedBuffer, new_size: usize) -> IcebergResult<()> {
        let old_size = buffer.capacity();
        self.reserve(old_size, new_size)?;
        trace!(old_size, new_size, "resized buffer");
        *buffer = ManagedBuffer::zeroed(new_size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_into_buffer() {
        let provider = HeapBufferProvider::new();
        let mut buffer = provider.acquire(8).unwrap();
        assert_eq!(buffer.stage(b"abc").unwrap(), b"abc");
        assert!(buffer.stage(b"too long for it").is_err());
    }

    #[test]
    fn test_tracks_allocations() {
        let provider = HeapBufferProvider::new();
        let mut buffer = provider.acquire(4096).unwrap();
        assert_eq!(provider.allocated(), 4096);
        provider.resize(&mut buffer, 8192).unwrap();
        assert_eq!(provider.allocated(), 8192);
        assert_eq!(buffer.capacity(), 8192);
        provider.resize(&mut buffer, 0).unwrap();
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(provider.allocated(), 0);
    }

    #[test]
    fn test_limit_refuses_growth() {
        let provider = HeapBufferProvider::with_limit(100);
        let mut buffer = provider.acquire(64).unwrap();
        let err = provider.resize(&mut buffer, 128).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferAllocation {
                requested: 128,
                limit: 100
            }
        ));
        assert_eq!(provider.allocated(), 64);
        assert_eq!(buffer.capacity(), 64);
    }
}
