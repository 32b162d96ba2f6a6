//! Typed memory regions over the ownership models.
//!
//! A [`MemoryRegion`] owns exactly one allocation under one
//! [`OwnershipModel`] and is the only owner: allocation handles are never
//! cloned, and the backing storage is released exactly once on drop. A
//! region of size zero never allocates, and its drop is equally a no-op.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bytemuck::{Pod, Zeroable};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::{CrucibleError, Result};
use crate::queue::{AllocId, DeviceSpan, OwnershipModel, SharedQueue};

/// Element types the harness can place in a region.
///
/// `Pod` gives byte-level transport through queues; the comparison and debug
/// bounds are what the assertion primitives need.
pub trait Element: Pod + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T: Pod + PartialEq + fmt::Debug + Send + Sync + 'static> Element for T {}

enum RegionStorage<T: Element> {
    /// Zero-size region: nothing was allocated, nothing will be freed.
    Empty,
    /// Plain host container. The mutex lets several role-scoped transfers
    /// coexist against one provider; the harness itself is single-threaded.
    Host(Mutex<Vec<T>>),
    /// Queue-owned allocation. `host` is populated for unified allocations
    /// only, queried once at construction.
    Queue {
        id: AllocId,
        host: Option<NonNull<u8>>,
        queue: SharedQueue,
    },
}

/// One contiguous allocation of `T` under one ownership model.
pub struct MemoryRegion<T: Element> {
    model: OwnershipModel,
    capacity: usize,
    storage: RegionStorage<T>,
}

// SAFETY: the raw unified-memory pointer is owned by the queue the region
// holds an Arc to, and all mutation goes through blocking queue transfers or
// the host mutex. Moving or sharing the region does not move the storage.
unsafe impl<T: Element> Send for MemoryRegion<T> {}
unsafe impl<T: Element> Sync for MemoryRegion<T> {}

impl<T: Element> MemoryRegion<T> {
    /// Create a host-container region of `count` elements, zero-filled.
    pub fn host(count: usize) -> Self {
        let storage = if count == 0 {
            RegionStorage::Empty
        } else {
            RegionStorage::Host(Mutex::new(vec![T::zeroed(); count]))
        };
        MemoryRegion {
            model: OwnershipModel::HostContainer,
            capacity: count,
            storage,
        }
    }

    /// Create a queue-backed region of `count` elements under `model`.
    ///
    /// `model` must be one of the queue models; use [`MemoryRegion::host`]
    /// for plain host containers. For `count == 0` no allocator call is
    /// made at all.
    pub fn on_queue(model: OwnershipModel, count: usize, queue: &SharedQueue) -> Result<Self> {
        assert!(
            !matches!(model, OwnershipModel::HostContainer),
            "host containers are not queue-backed"
        );
        if count == 0 {
            return Ok(MemoryRegion {
                model,
                capacity: 0,
                storage: RegionStorage::Empty,
            });
        }

        let bytes = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| CrucibleError::InvalidLayout(format!("{count} elements overflow")))?;
        let id = queue.alloc(model, bytes)?;
        let host = if model == OwnershipModel::UnifiedAlloc {
            Some(queue.host_ptr(id)?)
        } else {
            None
        };

        Ok(MemoryRegion {
            model,
            capacity: count,
            storage: RegionStorage::Queue {
                id,
                host,
                queue: queue.clone(),
            },
        })
    }

    /// Ownership model of this region.
    pub fn model(&self) -> OwnershipModel {
        self.model
    }

    /// Total capacity in elements (declared size plus role offset).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ownership-appropriate position at `base + role_offset`.
    ///
    /// Host-addressable models yield a direct mutable window over
    /// `[role_offset, capacity)`; the others yield an opaque [`DeviceSpan`]
    /// that only queue operations may touch.
    ///
    /// # Panics
    ///
    /// Panics if `role_offset > capacity`.
    pub fn start(&self, role_offset: usize) -> RoleStart<'_, T> {
        assert!(
            role_offset <= self.capacity,
            "role offset {} exceeds capacity {}",
            role_offset,
            self.capacity
        );
        let len = self.capacity - role_offset;
        match &self.storage {
            RegionStorage::Empty => {
                if self.model.host_addressable() {
                    RoleStart::Host(HostWindow {
                        inner: WindowInner::Empty,
                    })
                } else {
                    RoleStart::Device(DeviceSpan::empty())
                }
            }
            RegionStorage::Host(cell) => {
                let guard = MutexGuard::map(cell.lock(), |v| &mut v[role_offset..]);
                RoleStart::Host(HostWindow {
                    inner: WindowInner::Guard(guard),
                })
            }
            RegionStorage::Queue { id, host, .. } => match host {
                Some(base) => {
                    // SAFETY: the unified allocation is count*size_of::<T>()
                    // bytes and lives until this region drops; the offset
                    // stays inside it per the assert above.
                    let ptr = unsafe { base.as_ptr().cast::<T>().add(role_offset) };
                    RoleStart::Host(HostWindow {
                        inner: WindowInner::Raw {
                            ptr,
                            len,
                            _lt: PhantomData,
                        },
                    })
                }
                None => RoleStart::Device(DeviceSpan {
                    alloc: *id,
                    offset: role_offset,
                    len,
                }),
            },
        }
    }

    /// Blocking copy of `dst.len()` elements starting at `elem_offset` out
    /// of the region into host memory. No-op for zero-size regions.
    pub fn retrieve(&self, elem_offset: usize, dst: &mut [T]) -> Result<()> {
        self.check_range(elem_offset, dst.len())?;
        match &self.storage {
            RegionStorage::Empty => Ok(()),
            RegionStorage::Host(cell) => {
                let data = cell.lock();
                dst.copy_from_slice(&data[elem_offset..elem_offset + dst.len()]);
                Ok(())
            }
            RegionStorage::Queue { id, queue, .. } => queue.download(
                *id,
                elem_offset * std::mem::size_of::<T>(),
                bytemuck::cast_slice_mut::<T, u8>(dst),
            ),
        }
    }

    /// Blocking copy of host memory into the region starting at
    /// `elem_offset`. No-op for zero-size regions.
    pub fn update(&self, elem_offset: usize, src: &[T]) -> Result<()> {
        self.check_range(elem_offset, src.len())?;
        match &self.storage {
            RegionStorage::Empty => Ok(()),
            RegionStorage::Host(cell) => {
                let mut data = cell.lock();
                data[elem_offset..elem_offset + src.len()].copy_from_slice(src);
                Ok(())
            }
            RegionStorage::Queue { id, queue, .. } => queue.upload(
                *id,
                elem_offset * std::mem::size_of::<T>(),
                bytemuck::cast_slice::<T, u8>(src),
            ),
        }
    }

    fn check_range(&self, elem_offset: usize, len: usize) -> Result<()> {
        if elem_offset + len > self.capacity {
            return Err(CrucibleError::TransferFailed(format!(
                "range {}..{} exceeds region capacity {}",
                elem_offset,
                elem_offset + len,
                self.capacity
            )));
        }
        Ok(())
    }
}

impl<T: Element> Drop for MemoryRegion<T> {
    fn drop(&mut self) {
        if let RegionStorage::Queue { id, queue, .. } = &self.storage {
            queue.free(*id);
        }
    }
}

impl<T: Element> fmt::Debug for MemoryRegion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("model", &self.model)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Ownership-appropriate start position returned by
/// [`MemoryRegion::start`].
pub enum RoleStart<'a, T: Element> {
    /// Direct mutable window for host-addressable models.
    Host(HostWindow<'a, T>),
    /// Opaque accelerator-side position; host dereference is not possible.
    Device(DeviceSpan),
}

enum WindowInner<'a, T: Element> {
    Empty,
    Guard(MappedMutexGuard<'a, [T]>),
    Raw {
        ptr: *mut T,
        len: usize,
        _lt: PhantomData<&'a mut [T]>,
    },
}

/// Mutable view into the host-addressable part of a region.
///
/// Holds the region's lock for host containers; take at most one window per
/// region at a time.
pub struct HostWindow<'a, T: Element> {
    inner: WindowInner<'a, T>,
}

impl<'a, T: Element> HostWindow<'a, T> {
    /// Shrink the window to its first `count` elements.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the window length.
    pub fn truncate(self, count: usize) -> Self {
        let inner = match self.inner {
            WindowInner::Empty => {
                assert_eq!(count, 0, "cannot truncate an empty window to {count}");
                WindowInner::Empty
            }
            WindowInner::Guard(g) => {
                WindowInner::Guard(MappedMutexGuard::map(g, |s| &mut s[..count]))
            }
            WindowInner::Raw { ptr, len, _lt } => {
                assert!(count <= len, "truncate {count} exceeds window length {len}");
                WindowInner::Raw { ptr, len: count, _lt }
            }
        };
        HostWindow { inner }
    }
}

impl<'a, T: Element> Deref for HostWindow<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &self.inner {
            WindowInner::Empty => &[],
            WindowInner::Guard(g) => g,
            // SAFETY: pointer and length were validated at construction and
            // the window borrows the region for 'a.
            WindowInner::Raw { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(*ptr, *len)
            },
        }
    }
}

impl<'a, T: Element> DerefMut for HostWindow<'a, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match &mut self.inner {
            WindowInner::Empty => &mut [],
            WindowInner::Guard(g) => g,
            // SAFETY: as in `deref`; the window is the unique borrow.
            WindowInner::Raw { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(*ptr, *len)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_host_region_is_empty() {
        let region = MemoryRegion::<u32>::host(0);
        assert_eq!(region.capacity(), 0);
        // retrieve/update of nothing succeed as no-ops
        region.retrieve(0, &mut []).unwrap();
        region.update(0, &[]).unwrap();
    }

    #[test]
    fn host_region_start_and_copy() {
        let region = MemoryRegion::<u32>::host(8);
        region.update(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        match region.start(3) {
            RoleStart::Host(window) => assert_eq!(&window[..], &[4, 5, 6, 7, 8]),
            RoleStart::Device(_) => panic!("host region produced a device span"),
        }

        let mut back = [0u32; 4];
        region.retrieve(2, &mut back).unwrap();
        assert_eq!(back, [3, 4, 5, 6]);
    }

    #[test]
    fn out_of_range_transfer_is_rejected() {
        let region = MemoryRegion::<u32>::host(4);
        let mut dst = [0u32; 4];
        let err = region.retrieve(1, &mut dst).unwrap_err();
        assert!(matches!(err, CrucibleError::TransferFailed(_)));
    }

    #[test]
    fn window_truncate() {
        let region = MemoryRegion::<u32>::host(6);
        region.update(0, &[9, 9, 1, 2, 3, 4]).unwrap();
        match region.start(2) {
            RoleStart::Host(window) => {
                let window = window.truncate(2);
                assert_eq!(&window[..], &[1, 2]);
            }
            RoleStart::Device(_) => unreachable!(),
        };
    }
}
