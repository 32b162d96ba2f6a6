//! CUDA accelerator queue.
//!
//! With the `cuda` feature enabled this crate provides [`CudaQueue`], a
//! [`DeviceQueue`](crucible_core::DeviceQueue) over a cudarc context and
//! stream. Without the feature it exposes a stub whose constructor reports
//! the backend as unavailable, so downstream code compiles unchanged.
//!
//! CUDA expresses only the device-only ownership model here; unified and
//! managed cells report unsupported and are skipped by the driver.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(feature = "cuda")]
mod queue;

#[cfg(feature = "cuda")]
pub use queue::{is_cuda_available, CudaQueue};

#[cfg(not(feature = "cuda"))]
mod stub {
    use crucible_core::error::{CrucibleError, Result};
    use crucible_core::queue::SharedQueue;

    /// Stub queue when the `cuda` feature is disabled.
    pub struct CudaQueue;

    impl CudaQueue {
        /// Creation fails when the backend is not compiled in.
        pub fn new(_ordinal: usize) -> Result<Self> {
            Err(CrucibleError::BackendUnavailable(
                "cuda feature not enabled".to_string(),
            ))
        }

        /// Shared handle; always fails for the stub.
        pub fn shared(_ordinal: usize) -> Result<SharedQueue> {
            Err(CrucibleError::BackendUnavailable(
                "cuda feature not enabled".to_string(),
            ))
        }
    }

    /// Always false without the `cuda` feature.
    pub fn is_cuda_available() -> bool {
        false
    }
}

#[cfg(not(feature = "cuda"))]
pub use stub::{is_cuda_available, CudaQueue};
