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

//! Component traits, keys and type-erased factories
//!
//! A component type is known to the world only through its [`ComponentKey`]
//! and a [`ComponentVTable`] that default-constructs and destroys instances
//! in raw pool slots.

use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Marker trait for components
///
/// Components must be 'static and default-constructible: the world creates
/// every instance from `Default` and lets systems fill it in afterwards.
pub trait Component: Default + 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: Default + 'static + Send + Sync> Component for T {}

/// Process-stable key of a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey(pub u32);

impl ComponentKey {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slot inside a component pool.
pub type SlotIndex = u32;

/// Arena handle to one live component instance.
///
/// Valid from `add_component` until the matching `remove_component` (or the
/// owning entity's destruction). The handle remembers its owner, so once the
/// slot is released it stops resolving even if another entity reuses the
/// slot. Resolve it through the world each time it is used instead of
/// caching references across ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    pub entity: Entity,
    pub key: ComponentKey,
    pub slot: SlotIndex,
}

/// Type-erased construct/destroy functions for one component type.
#[derive(Clone, Copy)]
pub struct ComponentVTable {
    name: &'static str,
    type_id: TypeId,
    layout: Layout,
    construct: unsafe fn(*mut u8),
    destroy: Option<unsafe fn(*mut u8)>,
}

impl ComponentVTable {
    pub fn of<T: Component>() -> Self {
        Self {
            name: short_type_name::<T>(),
            type_id: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            construct: construct_default::<T>,
            destroy: if std::mem::needs_drop::<T>() {
                Some(drop_in_place::<T>)
            } else {
                None
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Write a default-constructed instance into `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of this type's layout and must not hold
    /// a live instance.
    pub unsafe fn construct(&self, ptr: NonNull<u8>) {
        (self.construct)(ptr.as_ptr());
    }

    /// Run the destructor of the instance at `ptr`.
    ///
    /// # Safety
    /// `ptr` must hold a live instance of this type. It is dead afterwards.
    pub unsafe fn destroy(&self, ptr: NonNull<u8>) {
        if let Some(destroy) = self.destroy {
            destroy(ptr.as_ptr());
        }
    }
}

impl fmt::Debug for ComponentVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVTable")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("needs_drop", &self.destroy.is_some())
            .finish()
    }
}

/// Registered component type: key, factory and live-instance budget.
#[derive(Clone, Copy, Debug)]
pub struct ComponentDescriptor {
    pub key: ComponentKey,
    pub vtable: ComponentVTable,
    pub max_count: usize,
}

impl ComponentDescriptor {
    pub fn name(&self) -> &'static str {
        self.vtable.name()
    }
}

unsafe fn construct_default<T: Component>(ptr: *mut u8) {
    ptr.cast::<T>().write(T::default());
}

unsafe fn drop_in_place<T>(ptr: *mut u8) {
    std::ptr::drop_in_place(ptr.cast::<T>());
}

/// `type_name` without the module path.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}
