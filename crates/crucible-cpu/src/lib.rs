//! Host-emulated accelerator queue.
//!
//! [`HostQueue`] implements the [`DeviceQueue`](crucible_core::DeviceQueue)
//! contract entirely in host memory, simulating accelerator behavior. It is
//! primarily used for testing the harness itself and as a fallback when no
//! accelerator is available: unified allocations hand out real host
//! pointers, device and managed allocations stay opaque so that the staged
//! transfer paths are exercised exactly as they would be against hardware.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

mod queue;

pub use queue::HostQueue;
