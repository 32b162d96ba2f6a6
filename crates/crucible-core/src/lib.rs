//! # Crucible Core
//!
//! Backend-agnostic core of Crucible, a correctness-verification harness
//! for heterogeneous parallel-algorithm libraries. An algorithm under test
//! is driven across every supported memory-ownership model and execution
//! policy, and its output is compared against serial reference oracles.
//!
//! ## Core Abstractions
//!
//! - [`DeviceQueue`] - byte-level accelerator queue contract
//! - [`MemoryRegion`] - single-owner allocation under one ownership model
//! - [`RoleDataProvider`] - role-indexed buffers for one matrix cell
//! - [`HostShadowTransfer`] - staged host access to device-only memory
//! - [`BackendMatrixDriver`] - the (backend × size) verification loop
//! - [`KernelIdentity`] - per-call-site unique kernel tags
//! - [`oracle`] - serial segmented reduce/scan ground truth
//!
//! ## Example
//!
//! ```ignore
//! use crucible_core::prelude::*;
//!
//! struct CopyCase;
//!
//! impl MatrixCase<u32> for CopyCase {
//!     fn name(&self) -> &str { "copy" }
//!     fn roles(&self) -> usize { 2 }
//!     fn run(&mut self, cx: &mut CaseContext<'_, u32>) -> Result<()> {
//!         let mut input = cx.transfer(MemoryRole::Keys, cx.n);
//!         fill_with(&mut input.get(), |i| i as u32);
//!         input.update_data()?;
//!         // ... run the algorithm under test, then compare ...
//!         Ok(())
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod check;
pub mod driver;
pub mod error;
pub mod kernel_id;
pub mod memory;
pub mod oracle;
pub mod provider;
pub mod queue;
pub mod transfer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::check::{
        check_values, done, exit_code, fill_with, ComparePolicy, RunStatus, SKIP_RETURN_CODE,
    };
    pub use crate::driver::{
        Backend, BackendMatrixDriver, CaseContext, ExecutionPolicy, MatrixCase, SizeSweep,
        SweepConfig,
    };
    pub use crate::error::{CrucibleError, Result};
    pub use crate::kernel_id::{KernelIdentity, KernelRegistry};
    pub use crate::memory::{Element, HostWindow, MemoryRegion, RoleStart};
    pub use crate::provider::{InitSpec, MemoryRole, RoleDataProvider, RoleLayout};
    pub use crate::queue::{AllocId, DeviceQueue, DeviceSpan, OwnershipModel, SharedQueue};
    pub use crate::transfer::{HostShadowTransfer, ShadowSlice};
    pub use crate::{expect_eq, expect_eq_n, expect_false, expect_true};
}

// Re-exports for convenience
pub use check::{done, exit_code, ComparePolicy, RunStatus, SKIP_RETURN_CODE};
pub use driver::{
    Backend, BackendMatrixDriver, CaseContext, ExecutionPolicy, MatrixCase, SweepConfig,
};
pub use error::{CrucibleError, Result};
pub use kernel_id::{KernelIdentity, KernelRegistry};
pub use memory::{Element, MemoryRegion, RoleStart};
pub use provider::{InitSpec, MemoryRole, RoleDataProvider, RoleLayout};
pub use queue::{AllocId, DeviceQueue, DeviceSpan, OwnershipModel, SharedQueue};
pub use transfer::{HostShadowTransfer, ShadowSlice};
