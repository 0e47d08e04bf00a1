// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-capacity component pools
//!
//! The world never allocates component memory itself. Each registered type
//! gets a [`ComponentPool`] from the injected [`PoolFactory`], sized once
//! from the type's maximum live count. Pools hand out raw slots only: they
//! do not construct or drop values, the world does that through the type's
//! vtable.
//!
//! The default strategy is [`FixedBlockPool`]: one contiguous allocation of
//! `capacity` blocks with a LIFO free list.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::component::SlotIndex;
use crate::error::{EcsError, Result};
use crate::report;

/// Smallest block handed out by a pool, in bytes.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Size and alignment of one pool block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub size: usize,
    pub align: usize,
}

impl BlockLayout {
    /// Block layout for a component layout: at least [`MIN_BLOCK_SIZE`]
    /// bytes, padded to the component's alignment.
    pub fn for_component(layout: Layout) -> Self {
        let size = layout.size().max(MIN_BLOCK_SIZE);
        let align = layout.align();
        let padded = (size + align - 1) & !(align - 1);
        Self {
            size: padded,
            align,
        }
    }
}

/// Raw slot storage for one component type.
///
/// Contract: bounded capacity, O(1) acquire/release, and a slot's address
/// stays fixed between its acquire and its release.
///
/// # Safety
///
/// The world constructs, reads and drops component values through the
/// addresses this trait returns. Implementors must guarantee that for every
/// slot between `acquire` and `release`:
///
/// - `ptr` returns `Some`, pointing to `block_layout().size` bytes that are
///   valid for reads and writes and aligned to `block_layout().align`;
/// - the address does not change and no other live slot overlaps it;
/// - the memory stays allocated until the slot is released or the pool is
///   dropped.
///
/// `acquire` must never return a slot that is already live.
pub unsafe trait ComponentPool: Send + Sync {
    /// Take a free slot. Fails with `CapacityExhausted` when all are live.
    fn acquire(&mut self) -> Result<SlotIndex>;

    /// Return a slot. Returns `false` if it was not live.
    fn release(&mut self, slot: SlotIndex) -> bool;

    /// Address of a live slot.
    fn ptr(&self, slot: SlotIndex) -> Option<NonNull<u8>>;

    fn is_live(&self, slot: SlotIndex) -> bool;

    fn capacity(&self) -> usize;

    fn live_count(&self) -> usize;

    fn block_layout(&self) -> BlockLayout;
}

/// Creates one pool per component type when a world is built.
pub trait PoolFactory: Send + Sync {
    fn create(
        &self,
        component: &'static str,
        layout: BlockLayout,
        max_count: usize,
    ) -> Result<Box<dyn ComponentPool>>;
}

/// Default pool: contiguous blocks and a LIFO free list.
pub struct FixedBlockPool {
    component: &'static str,
    storage: NonNull<u8>,
    alloc_layout: Option<Layout>,
    block: BlockLayout,
    capacity: usize,
    free_list: Vec<SlotIndex>,
    live: Vec<bool>,
}

// SAFETY: the pool owns its allocation exclusively and only stores values
// of `Component` types, which are `Send + Sync`.
unsafe impl Send for FixedBlockPool {}
unsafe impl Sync for FixedBlockPool {}

impl FixedBlockPool {
    pub fn new(component: &'static str, block: BlockLayout, capacity: usize) -> Result<Self> {
        if !block.align.is_power_of_two() || block.size == 0 || block.size % block.align != 0 {
            return Err(report!(EcsError::WorldNotReady(format!(
                "invalid block layout for {component}: {block:?}"
            ))));
        }
        if capacity > SlotIndex::MAX as usize {
            return Err(report!(EcsError::CapacityExhausted {
                component,
                max: SlotIndex::MAX as usize,
            }));
        }

        let total = block.size.checked_mul(capacity).ok_or_else(|| {
            report!(EcsError::CapacityExhausted {
                component,
                max: capacity,
            })
        })?;

        let (storage, alloc_layout) = if total == 0 {
            (NonNull::dangling(), None)
        } else {
            let layout = Layout::from_size_align(total, block.align).map_err(|err| {
                report!(EcsError::WorldNotReady(format!(
                    "pool layout for {component}: {err}"
                )))
            })?;
            // SAFETY: layout has a non-zero size.
            let raw = unsafe { alloc::alloc(layout) };
            match NonNull::new(raw) {
                Some(ptr) => (ptr, Some(layout)),
                None => alloc::handle_alloc_error(layout),
            }
        };

        // Reversed so that slot 0 is handed out first.
        let free_list = (0..capacity as SlotIndex).rev().collect();

        Ok(Self {
            component,
            storage,
            alloc_layout,
            block,
            capacity,
            free_list,
            live: vec![false; capacity],
        })
    }
}

// SAFETY: blocks are carved out of one allocation at `slot * block.size`,
// `new` rejects layouts whose size is not a multiple of the alignment, and
// the live table keeps a slot from being handed out twice.
unsafe impl ComponentPool for FixedBlockPool {
    fn acquire(&mut self) -> Result<SlotIndex> {
        match self.free_list.pop() {
            Some(slot) => {
                self.live[slot as usize] = true;
                Ok(slot)
            }
            None => Err(report!(EcsError::CapacityExhausted {
                component: self.component,
                max: self.capacity,
            })),
        }
    }

    fn release(&mut self, slot: SlotIndex) -> bool {
        match self.live.get_mut(slot as usize) {
            Some(live) if *live => {
                *live = false;
                self.free_list.push(slot);
                true
            }
            _ => false,
        }
    }

    fn ptr(&self, slot: SlotIndex) -> Option<NonNull<u8>> {
        if !self.is_live(slot) {
            return None;
        }
        // SAFETY: a live slot is < capacity, so the offset stays inside the
        // allocation.
        unsafe {
            let ptr = self.storage.as_ptr().add(slot as usize * self.block.size);
            Some(NonNull::new_unchecked(ptr))
        }
    }

    fn is_live(&self, slot: SlotIndex) -> bool {
        self.live.get(slot as usize).copied().unwrap_or(false)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn live_count(&self) -> usize {
        self.capacity - self.free_list.len()
    }

    fn block_layout(&self) -> BlockLayout {
        self.block
    }
}

impl Drop for FixedBlockPool {
    fn drop(&mut self) {
        if let Some(layout) = self.alloc_layout {
            // SAFETY: allocated in `new` with this exact layout.
            unsafe { alloc::dealloc(self.storage.as_ptr(), layout) };
        }
    }
}

/// Factory for [`FixedBlockPool`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedBlockPoolFactory;

impl PoolFactory for FixedBlockPoolFactory {
    fn create(
        &self,
        component: &'static str,
        layout: BlockLayout,
        max_count: usize,
    ) -> Result<Box<dyn ComponentPool>> {
        Ok(Box::new(FixedBlockPool::new(component, layout, max_count)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: usize) -> FixedBlockPool {
        FixedBlockPool::new("Test", BlockLayout::for_component(Layout::new::<u64>()), capacity)
            .unwrap()
    }

    #[test]
    fn test_block_layout_minimum_and_padding() {
        let tiny = BlockLayout::for_component(Layout::new::<u8>());
        assert_eq!(tiny.size, MIN_BLOCK_SIZE);

        let odd = BlockLayout::for_component(Layout::from_size_align(12, 16).unwrap());
        assert_eq!(odd.size, 16);
        assert_eq!(odd.align, 16);
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let mut pool = pool(3);
        for _ in 0..3 {
            pool.acquire().unwrap();
        }
        assert_eq!(pool.live_count(), 3);
        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, EcsError::CapacityExhausted { max: 3, .. }));
    }

    #[test]
    fn test_release_then_reacquire() {
        let mut pool = pool(2);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.release(a));
        assert!(!pool.release(a), "double release must be rejected");
        assert_eq!(pool.acquire().unwrap(), a);
    }

    #[test]
    fn test_stable_aligned_pointers() {
        let mut pool = pool(4);
        let slot = pool.acquire().unwrap();
        let first = pool.ptr(slot).unwrap();
        for _ in 0..3 {
            pool.acquire().unwrap();
        }
        assert_eq!(pool.ptr(slot).unwrap(), first);
        assert_eq!(first.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
    }

    #[test]
    fn test_dead_slot_has_no_pointer() {
        let mut pool = pool(1);
        assert!(pool.ptr(0).is_none());
        let slot = pool.acquire().unwrap();
        assert!(pool.ptr(slot).is_some());
        pool.release(slot);
        assert!(pool.ptr(slot).is_none());
    }

    #[test]
    fn test_malformed_block_layout_is_rejected() {
        let unpadded = BlockLayout { size: 12, align: 8 };
        assert!(FixedBlockPool::new("Test", unpadded, 4).is_err());
        let odd_align = BlockLayout { size: 12, align: 3 };
        assert!(FixedBlockPool::new("Test", odd_align, 0).is_err());
    }

    #[test]
    fn test_zero_capacity_pool() {
        let mut pool = pool(0);
        assert_eq!(pool.capacity(), 0);
        assert!(pool.acquire().is_err());
    }
}
