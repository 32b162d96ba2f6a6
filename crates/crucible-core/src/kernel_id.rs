//! Per-call-site kernel identities.
//!
//! Some accelerator toolchains require every compiled kernel to carry a
//! globally unique identity; a generic test body invoked for several
//! backends and sub-steps must therefore derive a fresh identity per call
//! site. [`KernelIdentity`] is a cheap, deterministic name handle;
//! [`KernelRegistry`] asserts that no two call sites of one run collide.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CrucibleError, Result};

static RUN_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Fresh serial for one driver run, so identities from separate runs in one
/// process never collide.
pub(crate) fn next_run_serial() -> u64 {
    RUN_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Statically distinguishable tag for one kernel call site.
///
/// `derive` is a pure function of `(base, discriminator)`: equal inputs give
/// equal identities, distinct discriminators give distinct identities.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KernelIdentity {
    name: Arc<str>,
}

impl KernelIdentity {
    /// Identity rooted at `base`, normally the test-case name.
    pub fn new(base: &str) -> Self {
        KernelIdentity { name: base.into() }
    }

    /// Derive a new identity distinguished by `discriminator`.
    pub fn derive<D: fmt::Display>(&self, discriminator: D) -> Self {
        KernelIdentity {
            name: format!("{}::{}", self.name, discriminator).into(),
        }
    }

    /// The full derived name.
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for KernelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for KernelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelIdentity({})", self.name)
    }
}

/// Collision check over the identities of one driver run.
#[derive(Default)]
pub struct KernelRegistry {
    seen: Mutex<HashSet<Arc<str>>>,
}

impl KernelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identity`, failing if an equal identity was already
    /// registered in this run.
    pub fn register(&self, identity: &KernelIdentity) -> Result<()> {
        let mut seen = self.seen.lock();
        if !seen.insert(identity.name.clone()) {
            return Err(CrucibleError::KernelNameCollision(
                identity.as_str().to_string(),
            ));
        }
        Ok(())
    }

    /// Number of identities registered so far.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
