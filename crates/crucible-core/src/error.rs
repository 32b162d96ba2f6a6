//! Error types for the verification harness.

use thiserror::Error;

use crate::queue::OwnershipModel;

/// Errors produced by the harness core and its backends.
#[derive(Error, Debug)]
pub enum CrucibleError {
    /// A non-zero-size allocation could not be satisfied. Fatal; the driver
    /// does not retry a failed device allocation mid-sweep.
    #[error("allocation of {bytes} bytes failed: {reason}")]
    AllocationFailed {
        /// Requested size in bytes.
        bytes: usize,
        /// Backend-specific failure description.
        reason: String,
    },

    /// A host/device copy failed or was issued with an invalid range.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// The requested backend is not compiled in or no device is present.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The queue cannot express the requested memory-ownership model.
    /// This is the recognized "skip this cell" condition, not a failure.
    #[error("memory model {model:?} not supported by queue '{queue}'")]
    UnsupportedModel {
        /// The model that was requested.
        model: OwnershipModel,
        /// Name of the queue that rejected it.
        queue: String,
    },

    /// An exception raised asynchronously by queued device work, surfaced
    /// synchronously at the next `wait()`.
    #[error("device fault: {0}")]
    DeviceFault(String),

    /// A role layout or transfer range violated the declared sizes.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    /// Two call sites derived the same kernel identity within one run.
    #[error("kernel identity collision: {0}")]
    KernelNameCollision(String),
}

/// Convenience result type used throughout the harness.
pub type Result<T> = std::result::Result<T, CrucibleError>;
