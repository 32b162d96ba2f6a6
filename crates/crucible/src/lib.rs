//! # Crucible
//!
//! Correctness-verification harness for heterogeneous (CPU/accelerator)
//! parallel-algorithm libraries. Given an algorithm under test, Crucible
//! drives it across every supported memory-ownership model (host container,
//! unified-shared, device-only, and opaque managed buffers) and execution
//! policy, over a size sweep that covers both tiny edge cases and large
//! inputs, and compares the results against serial reference oracles.
//!
//! ## Quick Start
//!
//! ```no_run
//! use crucible::prelude::*;
//!
//! struct FillCase;
//!
//! impl MatrixCase<u32> for FillCase {
//!     fn name(&self) -> &str {
//!         "fill"
//!     }
//!
//!     fn roles(&self) -> usize {
//!         1
//!     }
//!
//!     fn run(&mut self, cx: &mut CaseContext<'_, u32>) -> Result<()> {
//!         let mut data = cx.transfer(MemoryRole::Keys, cx.n);
//!         fill_with(&mut data.get(), |i| i as u32);
//!         data.update_data()?;
//!         cx.wait()?;
//!
//!         data.retrieve_data()?;
//!         let expected: Vec<u32> = (0..cx.n as u32).collect();
//!         expect_eq_n!(&expected, &data.get()[..], "fill round trip");
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     let status = crucible::run_matrix(&mut FillCase).unwrap();
//!     std::process::exit(done(status));
//! }
//! ```
//!
//! ## Backends
//!
//! - **Host** - emulated accelerator, always available
//! - **CUDA** - NVIDIA devices (requires the `cuda` feature)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(hidden_glob_reexports)]

use std::sync::OnceLock;

use tracing::info;

// Re-export core types
pub use crucible_core::*;

// Re-export the always-available host backend
pub use crucible_cpu::HostQueue;

// CUDA backend (stubbed out without the `cuda` feature)
pub use crucible_cuda::CudaQueue;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::QueueBackend;
    pub use crate::QueueBuilder;
    pub use crucible_core::prelude::*;
    pub use crucible_cpu::HostQueue;
}

/// Which accelerator backend to build a queue on.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum QueueBackend {
    /// Pick the best available backend.
    #[default]
    Auto,
    /// The host-emulated queue.
    Host,
    /// A CUDA device.
    Cuda,
}

/// Builder for the process's accelerator queue.
pub struct QueueBuilder {
    backend: QueueBackend,
    device_index: usize,
}

impl QueueBuilder {
    /// New builder with automatic backend selection.
    pub fn new() -> Self {
        QueueBuilder {
            backend: QueueBackend::Auto,
            device_index: 0,
        }
    }

    /// Select the backend.
    pub fn backend(mut self, backend: QueueBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Select the device index for hardware backends.
    pub fn device(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    /// Build the queue.
    pub fn build(self) -> Result<SharedQueue> {
        match self.backend {
            QueueBackend::Host => Ok(HostQueue::shared()),
            QueueBackend::Cuda => crucible_cuda::CudaQueue::shared(self.device_index),
            QueueBackend::Auto => {
                if crucible_cuda::is_cuda_available() {
                    info!("auto-selected CUDA queue");
                    return crucible_cuda::CudaQueue::shared(self.device_index);
                }
                info!("auto-selected host-emulated queue (no accelerator available)");
                Ok(HostQueue::shared())
            }
        }
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// The process-wide queue shared by all matrix cells. Lazily initialized,
// never torn down before exit.
static GLOBAL_QUEUE: OnceLock<SharedQueue> = OnceLock::new();

/// Install a specific queue as the process-wide shared queue.
///
/// Must be called before the first [`global_queue`] call; returns the
/// rejected queue if one is already installed.
pub fn install_queue(queue: SharedQueue) -> std::result::Result<(), SharedQueue> {
    GLOBAL_QUEUE.set(queue)
}

/// The process-wide shared queue, initializing it with automatic backend
/// selection on first use.
pub fn global_queue() -> SharedQueue {
    GLOBAL_QUEUE
        .get_or_init(|| {
            QueueBuilder::new()
                .build()
                .unwrap_or_else(|_| HostQueue::shared())
        })
        .clone()
}

/// Run `case` over the full verification matrix on the process-wide queue
/// with the default sweep.
pub fn run_matrix<T: Element, C: MatrixCase<T>>(case: &mut C) -> Result<RunStatus> {
    BackendMatrixDriver::new(Some(global_queue())).run_case(case)
}

/// Check availability of backends at runtime.
pub mod availability {
    /// The host-emulated queue is always available.
    pub fn host() -> bool {
        true
    }

    /// Whether a CUDA device is present and the backend is compiled in.
    pub fn cuda() -> bool {
        crucible_cuda::is_cuda_available()
    }

    /// Backends usable in this process, preferred first.
    pub fn available_backends() -> Vec<crate::QueueBackend> {
        let mut backends = Vec::new();
        if cuda() {
            backends.push(crate::QueueBackend::Cuda);
        }
        backends.push(crate::QueueBackend::Host);
        backends
    }
}
