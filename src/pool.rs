//! Kernel-shared buffer pool: reservation, mapping and teardown.
//!
//! The pool is the only place where buffer memory is mapped or
//! unmapped. Everything above it sees buffers through a copy-out
//! accessor; no reference to the shared memory ever leaves this
//! module.

use crate::error::{CameraError, Result};
use crate::traits::VideoDevice;
use crate::v4l2::MmapRegion;

/// Streaming refuses to start below this pool size; a single buffer
/// makes dequeue/requeue races unrecoverable.
pub const MIN_BUFFERS: u32 = 2;

#[derive(Debug)]
enum Backing {
    Mmap(MmapRegion),
    #[cfg(test)]
    Shared(std::sync::Arc<std::sync::Mutex<Vec<u8>>>),
}

/// One buffer of the pool, valid exactly between its mapping and the
/// pool's release.
#[derive(Debug)]
pub struct MappedBuffer {
    backing: Backing,
}

impl MappedBuffer {
    pub(crate) const fn from_region(region: MmapRegion) -> Self {
        Self {
            backing: Backing::Mmap(region),
        }
    }

    /// A buffer backed by ordinary heap memory shared with a mock
    /// device.
    #[cfg(test)]
    pub(crate) const fn shared(cell: std::sync::Arc<std::sync::Mutex<Vec<u8>>>) -> Self {
        Self {
            backing: Backing::Shared(cell),
        }
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Mmap(region) => region.len(),
            #[cfg(test)]
            Backing::Shared(cell) => cell.lock().map_or(0, |bytes| bytes.len()),
        }
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy up to `len` bytes of the buffer into owned storage.
    pub fn copy_out(&self, len: usize) -> Vec<u8> {
        match &self.backing {
            Backing::Mmap(region) => region.copy_out(len),
            #[cfg(test)]
            Backing::Shared(cell) => cell
                .lock()
                .map(|bytes| bytes.iter().copied().take(len).collect())
                .unwrap_or_default(),
        }
    }
}

/// Ordered collection of mapped kernel buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<MappedBuffer>,
}

impl BufferPool {
    /// Reserve `requested` buffers from the kernel and map each granted
    /// one. The driver may grant fewer than requested; fewer than
    /// [`MIN_BUFFERS`] fails with [`CameraError::InsufficientBuffers`].
    /// If any mapping fails, every buffer mapped so far is unmapped and
    /// the kernel reservation is freed before the error propagates.
    pub fn allocate<A: VideoDevice>(api: &mut A, requested: u32) -> Result<Self> {
        let granted = api.request_buffers(requested)?;
        if granted < MIN_BUFFERS {
            let _ = api.request_buffers(0);
            return Err(CameraError::InsufficientBuffers { granted });
        }

        let mut buffers = Vec::with_capacity(granted as usize);
        for index in 0..granted {
            match api.map_buffer(index) {
                Ok(buffer) => buffers.push(buffer),
                Err(source) => {
                    // Unmap before freeing the kernel reservation.
                    buffers.clear();
                    let _ = api.request_buffers(0);
                    return Err(CameraError::MemoryMap { index, source });
                }
            }
        }
        Ok(Self { buffers })
    }

    /// Unmap every buffer and free the kernel-side reservation. Safe to
    /// call on an already-empty pool.
    pub fn release<A: VideoDevice>(mut self, api: &mut A) {
        self.buffers.clear();
        let _ = api.request_buffers(0);
    }

    /// Number of buffers in the pool.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// The buffer at `index`, if it exists.
    pub fn buffer(&self, index: u32) -> Option<&MappedBuffer> {
        self.buffers.get(index as usize)
    }
}
