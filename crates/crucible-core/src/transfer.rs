//! Host shadow staging for non-host-addressable regions.
//!
//! [`HostShadowTransfer`] is the one place a test case touches data that may
//! live in device-only memory. Its state is fixed at construction:
//!
//! - **Passthrough**: the region is host-addressable; `get()` hands out a
//!   window directly into the region and the sync calls are no-ops.
//! - **Staged**: the transfer owns a host buffer of the requested count;
//!   `update_data()` commits it to the region and `retrieve_data()` refreshes
//!   it from the region.
//!
//! The transfer never synchronizes on its own: call `update_data()` before
//! device work depends on the content, and `retrieve_data()` after device
//! work before reading the host side. That ordering is the caller's
//! contract.

use std::ops::{Deref, DerefMut};

use bytemuck::Zeroable;

use crate::error::Result;
use crate::memory::{Element, HostWindow, RoleStart};
use crate::provider::{MemoryRole, RoleDataProvider};

/// Per-invocation staging adapter for one role of one provider.
pub struct HostShadowTransfer<'p, T: Element> {
    provider: &'p RoleDataProvider<T>,
    role: MemoryRole,
    count: usize,
    /// `Some` iff this transfer is staged.
    staged: Option<Vec<T>>,
}

impl<'p, T: Element> HostShadowTransfer<'p, T> {
    /// Create a transfer over the first `count` elements of `role`'s
    /// window. Staging is chosen by the provider's ownership model.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the role's declared size.
    pub fn new(provider: &'p RoleDataProvider<T>, role: MemoryRole, count: usize) -> Self {
        assert!(
            count <= provider.declared_size(role),
            "transfer of {} elements exceeds declared size {} for {:?}",
            count,
            provider.declared_size(role),
            role
        );
        let staged = provider
            .host_buffering_required()
            .then(|| vec![T::zeroed(); count]);
        HostShadowTransfer {
            provider,
            role,
            count,
            staged,
        }
    }

    /// Whether this transfer stages through an owned host buffer.
    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// Element count this transfer covers.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Host-visible view of the data: the staged buffer, or a direct window
    /// into the region when no staging is needed.
    pub fn get(&mut self) -> ShadowSlice<'_, T> {
        match &mut self.staged {
            Some(buf) => ShadowSlice::Staged(buf.as_mut_slice()),
            None => match self.provider.start(self.role) {
                RoleStart::Host(window) => ShadowSlice::Direct(window.truncate(self.count)),
                RoleStart::Device(_) => {
                    unreachable!("passthrough transfer over a non-host-addressable region")
                }
            },
        }
    }

    /// Refresh the host view from the region. No-op in passthrough mode.
    pub fn retrieve_data(&mut self) -> Result<()> {
        match &mut self.staged {
            Some(buf) => self.provider.retrieve(self.role, buf),
            None => Ok(()),
        }
    }

    /// Commit the host view to the region. No-op in passthrough mode.
    pub fn update_data(&self) -> Result<()> {
        match &self.staged {
            Some(buf) => self.provider.update(self.role, buf),
            None => Ok(()),
        }
    }

    /// Commit only the first `count` elements of the host view, for cases
    /// that produce a result prefix shorter than the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the transfer's element count.
    pub fn update_data_prefix(&self, count: usize) -> Result<()> {
        assert!(
            count <= self.count,
            "prefix {} exceeds transfer count {}",
            count,
            self.count
        );
        match &self.staged {
            Some(buf) => self.provider.update(self.role, &buf[..count]),
            None => Ok(()),
        }
    }
}

/// Host view handed out by [`HostShadowTransfer::get`].
pub enum ShadowSlice<'a, T: Element> {
    /// Direct window into a host-addressable region.
    Direct(HostWindow<'a, T>),
    /// View of the transfer's staged host buffer.
    Staged(&'a mut [T]),
}

impl<'a, T: Element> Deref for ShadowSlice<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            ShadowSlice::Direct(window) => window,
            ShadowSlice::Staged(buf) => buf,
        }
    }
}

impl<'a, T: Element> DerefMut for ShadowSlice<'a, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            ShadowSlice::Direct(window) => window,
            ShadowSlice::Staged(buf) => buf,
        }
    }
}
