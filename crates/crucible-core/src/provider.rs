//! Role-indexed data providers.
//!
//! A test case addresses its buffers by [`MemoryRole`], not by raw
//! allocation: keys, values, and up to two result sequences. The
//! [`RoleDataProvider`] owns one [`MemoryRegion`] per declared role, all
//! under the same ownership model, each with an independent start offset so
//! that "iterator starts mid-allocation" paths are exercised.

use std::fmt;

use crate::error::{CrucibleError, Result};
use crate::memory::{Element, MemoryRegion, RoleStart};
use crate::queue::{OwnershipModel, SharedQueue};

/// Logical purpose of a buffer within a test case.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MemoryRole {
    /// Segment keys.
    Keys,
    /// Input values.
    Values,
    /// Primary result sequence.
    Result,
    /// Secondary result sequence (e.g. reduced values next to reduced keys).
    SecondaryResult,
}

impl MemoryRole {
    /// All roles, in declaration order.
    pub const ALL: [MemoryRole; 4] = [
        MemoryRole::Keys,
        MemoryRole::Values,
        MemoryRole::Result,
        MemoryRole::SecondaryResult,
    ];

    /// Stable index used to select the backing region.
    pub fn index(self) -> usize {
        match self {
            MemoryRole::Keys => 0,
            MemoryRole::Values => 1,
            MemoryRole::Result => 2,
            MemoryRole::SecondaryResult => 3,
        }
    }

    /// Conventional mid-allocation start offset for this role.
    pub fn default_offset(self) -> usize {
        match self {
            MemoryRole::Keys => 3,
            MemoryRole::Values => 5,
            MemoryRole::Result => 7,
            MemoryRole::SecondaryResult => 9,
        }
    }
}

/// Declared size and start offset of one role's region.
///
/// The region's true capacity is `size + offset`; only the `size` elements
/// from `offset` are the test case's window.
#[derive(Clone, Copy, Debug)]
pub struct RoleLayout {
    /// Usable element count exposed to the test case.
    pub size: usize,
    /// Elements before the window start, never touched by the test case.
    pub offset: usize,
}

/// Ordered role layouts for one test-case shape (1 to 4 buffers).
#[derive(Clone, Debug)]
pub struct InitSpec {
    entries: Vec<RoleLayout>,
}

impl InitSpec {
    /// Build a spec from explicit layouts.
    ///
    /// # Panics
    ///
    /// Panics unless `1..=4` layouts are given.
    pub fn new(entries: Vec<RoleLayout>) -> Self {
        assert!(
            (1..=4).contains(&entries.len()),
            "a test case uses between 1 and 4 roles, got {}",
            entries.len()
        );
        InitSpec { entries }
    }

    /// `role_count` roles of `size` elements each, at the conventional
    /// offsets.
    pub fn uniform(size: usize, role_count: usize) -> Self {
        assert!(
            (1..=4).contains(&role_count),
            "a test case uses between 1 and 4 roles, got {role_count}"
        );
        InitSpec {
            entries: MemoryRole::ALL[..role_count]
                .iter()
                .map(|role| RoleLayout {
                    size,
                    offset: role.default_offset(),
                })
                .collect(),
        }
    }

    /// Number of declared roles.
    pub fn role_count(&self) -> usize {
        self.entries.len()
    }

    /// Layout of the role at `index`.
    pub fn get(&self, index: usize) -> RoleLayout {
        self.entries[index]
    }

    /// Iterate the layouts in role order.
    pub fn iter(&self) -> impl Iterator<Item = &RoleLayout> {
        self.entries.iter()
    }
}

/// Owner of one [`MemoryRegion`] per declared role.
///
/// Providers are created fresh for every matrix cell and dropped, releasing
/// every allocation, before the next cell begins.
pub struct RoleDataProvider<T: Element> {
    model: OwnershipModel,
    slots: Vec<(RoleLayout, MemoryRegion<T>)>,
}

impl<T: Element> fmt::Debug for RoleDataProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleDataProvider")
            .field("model", &self.model)
            .field("roles", &self.slots.len())
            .finish()
    }
}

impl<T: Element> RoleDataProvider<T> {
    /// Construct one region of capacity `size + offset` per spec entry.
    ///
    /// `queue` is required for the queue-backed models and ignored for
    /// [`OwnershipModel::HostContainer`].
    pub fn new(
        spec: &InitSpec,
        model: OwnershipModel,
        queue: Option<&SharedQueue>,
    ) -> Result<Self> {
        let mut slots = Vec::with_capacity(spec.role_count());
        for layout in spec.iter() {
            let capacity = layout.size + layout.offset;
            let region = match model {
                OwnershipModel::HostContainer => MemoryRegion::host(capacity),
                _ => {
                    let queue = queue.ok_or_else(|| {
                        CrucibleError::BackendUnavailable(format!(
                            "model {model} requires an accelerator queue"
                        ))
                    })?;
                    MemoryRegion::on_queue(model, capacity, queue)?
                }
            };
            slots.push((*layout, region));
        }
        Ok(RoleDataProvider { model, slots })
    }

    /// Ownership model shared by all regions of this provider.
    pub fn model(&self) -> OwnershipModel {
        self.model
    }

    /// Number of roles this provider was built with.
    pub fn role_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether test cases must stage host copies through a
    /// [`HostShadowTransfer`](crate::transfer::HostShadowTransfer).
    pub fn host_buffering_required(&self) -> bool {
        !self.model.host_addressable()
    }

    /// Declared usable size of `role`'s window.
    pub fn declared_size(&self, role: MemoryRole) -> usize {
        self.slot(role).0.size
    }

    /// Offset-adjusted start position of `role`'s window.
    pub fn start(&self, role: MemoryRole) -> RoleStart<'_, T> {
        let (layout, region) = self.slot(role);
        region.start(layout.offset)
    }

    /// Copy `dst.len()` elements out of `role`'s window into host memory.
    ///
    /// # Panics
    ///
    /// Panics if the requested length exceeds the role's declared size.
    pub fn retrieve(&self, role: MemoryRole, dst: &mut [T]) -> Result<()> {
        let (layout, region) = self.slot(role);
        assert!(
            dst.len() <= layout.size,
            "retrieve of {} elements exceeds declared size {} for {:?}",
            dst.len(),
            layout.size,
            role
        );
        region.retrieve(layout.offset, dst)
    }

    /// Copy host memory into `role`'s window.
    ///
    /// # Panics
    ///
    /// Panics if the source length exceeds the role's declared size.
    pub fn update(&self, role: MemoryRole, src: &[T]) -> Result<()> {
        let (layout, region) = self.slot(role);
        assert!(
            src.len() <= layout.size,
            "update of {} elements exceeds declared size {} for {:?}",
            src.len(),
            layout.size,
            role
        );
        region.update(layout.offset, src)
    }

    /// Direct access to `role`'s backing region, offsets included.
    ///
    /// Intended for harness self-tests that verify the `[0, offset)` prefix
    /// is never touched; ordinary test cases go through the role window.
    pub fn region(&self, role: MemoryRole) -> &MemoryRegion<T> {
        &self.slot(role).1
    }

    fn slot(&self, role: MemoryRole) -> &(RoleLayout, MemoryRegion<T>) {
        self.slots
            .get(role.index())
            .unwrap_or_else(|| panic!("role {role:?} not declared by this provider"))
    }
}
