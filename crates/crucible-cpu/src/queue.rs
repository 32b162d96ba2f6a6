//! The host queue implementation.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crucible_core::error::{CrucibleError, Result};
use crucible_core::queue::{AllocId, DeviceQueue, OwnershipModel, SharedQueue};

/// Allocation alignment, large enough for any POD element type.
const BLOCK_ALIGN: usize = 64;

/// Default per-work-group local memory reported by the emulated device.
const DEFAULT_LOCAL_MEMORY: usize = 64 * 1024;

struct ArenaBlock {
    ptr: NonNull<u8>,
    layout: Layout,
    model: OwnershipModel,
}

// SAFETY: blocks are raw heap allocations reached only through the arena
// mutex; the pointer is valid until `dealloc`.
unsafe impl Send for ArenaBlock {}

/// Accelerator queue emulated in host memory.
///
/// Supports all three queue-backed ownership models. Device and managed
/// allocations are never host-addressable through the API even though they
/// live in host memory; that keeps test cases honest about staging.
///
/// Asynchronous device faults can be injected with
/// [`HostQueue::inject_async_fault`]; they surface at the next `wait()`
/// call, mirroring how a real queue rethrows asynchronous exceptions.
pub struct HostQueue {
    name: String,
    blocks: Mutex<HashMap<u64, ArenaBlock>>,
    next_id: AtomicU64,
    bytes_in_use: AtomicUsize,
    local_memory: usize,
    pending_faults: Mutex<Vec<String>>,
}

impl HostQueue {
    /// Create a new emulated queue.
    pub fn new() -> Self {
        info!("initializing host-emulated accelerator queue");
        HostQueue {
            name: "host-emulated".to_string(),
            blocks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            bytes_in_use: AtomicUsize::new(0),
            local_memory: DEFAULT_LOCAL_MEMORY,
            pending_faults: Mutex::new(Vec::new()),
        }
    }

    /// Create a queue advertising a specific local-memory limit, for
    /// exercising the unsupported-backend skip path.
    pub fn with_local_memory(local_memory: usize) -> Self {
        let mut queue = HostQueue::new();
        queue.local_memory = local_memory;
        queue
    }

    /// Shared handle, ready for a driver.
    pub fn shared() -> SharedQueue {
        Arc::new(HostQueue::new())
    }

    /// Bytes currently allocated, for leak checks in harness self-tests.
    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use.load(Ordering::Relaxed)
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Queue a fault that will surface at the next `wait()`, emulating an
    /// exception raised asynchronously by enqueued device work.
    pub fn inject_async_fault(&self, message: impl Into<String>) {
        self.pending_faults.lock().push(message.into());
    }

    fn block_range_check(block: &ArenaBlock, byte_offset: usize, len: usize) -> Result<()> {
        if byte_offset + len > block.layout.size() {
            return Err(CrucibleError::TransferFailed(format!(
                "range {}..{} exceeds allocation size {}",
                byte_offset,
                byte_offset + len,
                block.layout.size()
            )));
        }
        Ok(())
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceQueue for HostQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, model: OwnershipModel) -> bool {
        !matches!(model, OwnershipModel::HostContainer)
    }

    fn local_memory_limit(&self) -> usize {
        self.local_memory
    }

    fn alloc(&self, model: OwnershipModel, bytes: usize) -> Result<AllocId> {
        assert!(bytes > 0, "zero-size allocations never reach the queue");
        let layout = Layout::from_size_align(bytes, BLOCK_ALIGN).map_err(|e| {
            CrucibleError::AllocationFailed {
                bytes,
                reason: e.to_string(),
            }
        })?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(CrucibleError::AllocationFailed {
            bytes,
            reason: "allocator returned null".to_string(),
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.blocks.lock().insert(id, ArenaBlock { ptr, layout, model });
        self.bytes_in_use.fetch_add(bytes, Ordering::Relaxed);
        debug!(id, bytes, model = model.label(), "allocated block");
        Ok(AllocId::new(id))
    }

    fn host_ptr(&self, id: AllocId) -> Result<NonNull<u8>> {
        let blocks = self.blocks.lock();
        let block = blocks
            .get(&id.raw())
            .ok_or_else(|| CrucibleError::TransferFailed(format!("unknown allocation {id:?}")))?;
        if block.model != OwnershipModel::UnifiedAlloc {
            return Err(CrucibleError::UnsupportedModel {
                model: block.model,
                queue: self.name.clone(),
            });
        }
        Ok(block.ptr)
    }

    fn upload(&self, id: AllocId, byte_offset: usize, src: &[u8]) -> Result<()> {
        let blocks = self.blocks.lock();
        let block = blocks
            .get(&id.raw())
            .ok_or_else(|| CrucibleError::TransferFailed(format!("unknown allocation {id:?}")))?;
        Self::block_range_check(block, byte_offset, src.len())?;
        // SAFETY: range checked above; src is a distinct host buffer.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                block.ptr.as_ptr().add(byte_offset),
                src.len(),
            );
        }
        Ok(())
    }

    fn download(&self, id: AllocId, byte_offset: usize, dst: &mut [u8]) -> Result<()> {
        let blocks = self.blocks.lock();
        let block = blocks
            .get(&id.raw())
            .ok_or_else(|| CrucibleError::TransferFailed(format!("unknown allocation {id:?}")))?;
        Self::block_range_check(block, byte_offset, dst.len())?;
        // SAFETY: range checked above; dst is a distinct host buffer.
        unsafe {
            std::ptr::copy_nonoverlapping(
                block.ptr.as_ptr().add(byte_offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    fn free(&self, id: AllocId) {
        match self.blocks.lock().remove(&id.raw()) {
            Some(block) => {
                self.bytes_in_use
                    .fetch_sub(block.layout.size(), Ordering::Relaxed);
                // SAFETY: allocated with this layout in `alloc`, removed from
                // the arena so it cannot be freed twice.
                unsafe { dealloc(block.ptr.as_ptr(), block.layout) };
            }
            None => warn!(?id, "free of unknown allocation"),
        }
    }

    fn wait(&self) -> Result<()> {
        let mut faults = self.pending_faults.lock();
        if faults.is_empty() {
            return Ok(());
        }
        let message = faults.remove(0);
        faults.clear();
        Err(CrucibleError::DeviceFault(message))
    }
}

impl Drop for HostQueue {
    fn drop(&mut self) {
        let mut blocks = self.blocks.lock();
        if !blocks.is_empty() {
            warn!(
                leaked = blocks.len(),
                "queue dropped with live allocations"
            );
        }
        for (_, block) in blocks.drain() {
            // SAFETY: same layout as at allocation; drain guarantees each
            // block is freed once.
            unsafe { dealloc(block.ptr.as_ptr(), block.layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_queue_models_only() {
        let queue = HostQueue::new();
        assert!(queue.supports(OwnershipModel::UnifiedAlloc));
        assert!(queue.supports(OwnershipModel::DeviceAlloc));
        assert!(queue.supports(OwnershipModel::ManagedBuffer));
        assert!(!queue.supports(OwnershipModel::HostContainer));
    }

    #[test]
    fn upload_download_round_trip() {
        let queue = HostQueue::new();
        let id = queue.alloc(OwnershipModel::DeviceAlloc, 64).unwrap();

        let src: Vec<u8> = (0..64).collect();
        queue.upload(id, 0, &src).unwrap();

        let mut dst = vec![0u8; 32];
        queue.download(id, 16, &mut dst).unwrap();
        assert_eq!(&dst[..], &src[16..48]);

        queue.free(id);
        assert_eq!(queue.bytes_in_use(), 0);
    }

    #[test]
    fn fresh_allocations_are_zeroed() {
        let queue = HostQueue::new();
        let id = queue.alloc(OwnershipModel::ManagedBuffer, 128).unwrap();
        let mut dst = vec![0xffu8; 128];
        queue.download(id, 0, &mut dst).unwrap();
        assert!(dst.iter().all(|&b| b == 0));
        queue.free(id);
    }

    #[test]
    fn unified_blocks_expose_host_pointers() {
        let queue = HostQueue::new();
        let unified = queue.alloc(OwnershipModel::UnifiedAlloc, 16).unwrap();
        let device = queue.alloc(OwnershipModel::DeviceAlloc, 16).unwrap();

        assert!(queue.host_ptr(unified).is_ok());
        let err = queue.host_ptr(device).unwrap_err();
        assert!(matches!(err, CrucibleError::UnsupportedModel { .. }));

        queue.free(unified);
        queue.free(device);
    }

    #[test]
    fn out_of_range_transfer_is_rejected() {
        let queue = HostQueue::new();
        let id = queue.alloc(OwnershipModel::DeviceAlloc, 8).unwrap();
        let err = queue.upload(id, 4, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, CrucibleError::TransferFailed(_)));
        queue.free(id);
    }

    #[test]
    fn injected_fault_surfaces_at_wait() {
        let queue = HostQueue::new();
        queue.wait().unwrap();

        queue.inject_async_fault("simulated device exception");
        let err = queue.wait().unwrap_err();
        assert!(matches!(err, CrucibleError::DeviceFault(_)));

        // The fault queue is drained; later waits succeed again.
        queue.wait().unwrap();
    }
}
