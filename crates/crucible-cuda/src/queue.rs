//! The cudarc-backed queue implementation.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cudarc::driver::{CudaContext, CudaSlice, CudaStream};
use parking_lot::Mutex;
use tracing::{debug, info};

use crucible_core::error::{CrucibleError, Result};
use crucible_core::queue::{AllocId, DeviceQueue, OwnershipModel, SharedQueue};

/// Typical per-block shared memory on current NVIDIA hardware.
const CUDA_LOCAL_MEMORY: usize = 48 * 1024;

/// Accelerator queue over a CUDA device.
///
/// Only the device-only ownership model is expressed; the driver skips
/// unified and managed cells on this queue.
pub struct CudaQueue {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    name: String,
    buffers: Mutex<HashMap<u64, CudaSlice<u8>>>,
    next_id: AtomicU64,
}

impl CudaQueue {
    /// Create a queue on device `ordinal`.
    pub fn new(ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(ordinal).map_err(|e| {
            CrucibleError::BackendUnavailable(format!(
                "failed to create CUDA device {ordinal}: {e}"
            ))
        })?;
        let name = ctx
            .name()
            .map_err(|e| CrucibleError::BackendUnavailable(format!("device name query: {e}")))?;
        let stream = ctx.default_stream();

        info!(ordinal, name = %name, "initialized CUDA queue");
        Ok(CudaQueue {
            ctx,
            stream,
            name,
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Shared handle on device `ordinal`, ready for a driver.
    pub fn shared(ordinal: usize) -> Result<SharedQueue> {
        Ok(Arc::new(CudaQueue::new(ordinal)?))
    }
}

impl DeviceQueue for CudaQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, model: OwnershipModel) -> bool {
        matches!(model, OwnershipModel::DeviceAlloc)
    }

    fn local_memory_limit(&self) -> usize {
        CUDA_LOCAL_MEMORY
    }

    fn alloc(&self, model: OwnershipModel, bytes: usize) -> Result<AllocId> {
        assert!(bytes > 0, "zero-size allocations never reach the queue");
        if model != OwnershipModel::DeviceAlloc {
            return Err(CrucibleError::UnsupportedModel {
                model,
                queue: self.name.clone(),
            });
        }

        // SAFETY: uninitialized device memory is not read before the harness
        // uploads into it.
        let buffer = unsafe { self.stream.alloc::<u8>(bytes) }.map_err(|e| {
            CrucibleError::AllocationFailed {
                bytes,
                reason: e.to_string(),
            }
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().insert(id, buffer);
        debug!(id, bytes, "allocated device buffer");
        Ok(AllocId::new(id))
    }

    fn host_ptr(&self, _id: AllocId) -> Result<NonNull<u8>> {
        Err(CrucibleError::UnsupportedModel {
            model: OwnershipModel::UnifiedAlloc,
            queue: self.name.clone(),
        })
    }

    fn upload(&self, id: AllocId, byte_offset: usize, src: &[u8]) -> Result<()> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .get_mut(&id.raw())
            .ok_or_else(|| CrucibleError::TransferFailed(format!("unknown allocation {id:?}")))?;
        let mut view = buffer.slice_mut(byte_offset..byte_offset + src.len());
        self.stream
            .memcpy_htod(src, &mut view)
            .map_err(|e| CrucibleError::TransferFailed(format!("HtoD copy failed: {e}")))?;
        self.stream
            .synchronize()
            .map_err(|e| CrucibleError::DeviceFault(e.to_string()))
    }

    fn download(&self, id: AllocId, byte_offset: usize, dst: &mut [u8]) -> Result<()> {
        let buffers = self.buffers.lock();
        let buffer = buffers
            .get(&id.raw())
            .ok_or_else(|| CrucibleError::TransferFailed(format!("unknown allocation {id:?}")))?;
        let view = buffer.slice(byte_offset..byte_offset + dst.len());
        self.stream
            .memcpy_dtoh(&view, dst)
            .map_err(|e| CrucibleError::TransferFailed(format!("DtoH copy failed: {e}")))?;
        self.stream
            .synchronize()
            .map_err(|e| CrucibleError::DeviceFault(e.to_string()))
    }

    fn free(&self, id: AllocId) {
        // Dropping the slice releases the device memory.
        self.buffers.lock().remove(&id.raw());
    }

    fn wait(&self) -> Result<()> {
        self.stream
            .synchronize()
            .map_err(|e| CrucibleError::DeviceFault(e.to_string()))?;
        self.ctx
            .synchronize()
            .map_err(|e| CrucibleError::DeviceFault(e.to_string()))
    }
}

/// Whether at least one CUDA device is present.
pub fn is_cuda_available() -> bool {
    CudaContext::device_count().map(|count| count > 0).unwrap_or(false)
}
