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

//! Views over the entities holding a component type

use std::any::TypeId;
use std::collections::btree_set;
use std::collections::BTreeSet;

use ahash::AHashMap;

use crate::component::{short_type_name, Component, ComponentKey, SlotIndex};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::report;
use crate::world::ComponentStore;

/// Entities holding one component type, in index order.
///
/// Borrows the world immutably, so no entity can gain or lose the component
/// while the view is alive. Take a fresh view each tick.
#[derive(Clone, Copy)]
pub struct View<'w> {
    key: ComponentKey,
    entities: &'w BTreeSet<Entity>,
}

impl<'w> View<'w> {
    pub(crate) fn new(key: ComponentKey, entities: &'w BTreeSet<Entity>) -> Self {
        Self { key, entities }
    }

    pub fn key(&self) -> ComponentKey {
        self.key
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    pub fn iter(&self) -> std::iter::Copied<btree_set::Iter<'w, Entity>> {
        self.entities.iter().copied()
    }

    /// Copy the entity set out, releasing the borrow on the world.
    pub fn to_vec(&self) -> Vec<Entity> {
        self.iter().collect()
    }
}

impl<'w> IntoIterator for View<'w> {
    type Item = Entity;
    type IntoIter = std::iter::Copied<btree_set::Iter<'w, Entity>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter().copied()
    }
}

impl std::fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("key", &self.key)
            .field("len", &self.entities.len())
            .finish()
    }
}

/// Payload access handed to [`World::for_each_mut`](crate::World::for_each_mut).
///
/// Reads and writes component data of any type. It cannot add, remove or
/// destroy anything.
pub struct Payloads<'w> {
    stores: &'w mut [ComponentStore],
    slots: &'w AHashMap<(Entity, ComponentKey), SlotIndex>,
    type_keys: &'w AHashMap<TypeId, ComponentKey>,
}

impl<'w> Payloads<'w> {
    pub(crate) fn new(
        stores: &'w mut [ComponentStore],
        slots: &'w AHashMap<(Entity, ComponentKey), SlotIndex>,
        type_keys: &'w AHashMap<TypeId, ComponentKey>,
    ) -> Self {
        Self {
            stores,
            slots,
            type_keys,
        }
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.type_keys
            .get(&TypeId::of::<T>())
            .is_some_and(|key| self.slots.contains_key(&(entity, *key)))
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T> {
        let ptr = self.locate::<T>(entity)?;
        // SAFETY: live slot of T's pool.
        Ok(unsafe { &*ptr.cast::<T>().as_ptr() })
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        let ptr = self.locate::<T>(entity)?;
        // SAFETY: live slot of T's pool, exclusive through `&mut self`.
        Ok(unsafe { &mut *ptr.cast::<T>().as_ptr() })
    }

    fn locate<T: Component>(&self, entity: Entity) -> Result<std::ptr::NonNull<u8>> {
        let key = self.type_keys.get(&TypeId::of::<T>()).copied().ok_or_else(|| {
            report!(EcsError::UnknownComponent(
                short_type_name::<T>().to_string()
            ))
        })?;
        let store = &self.stores[key.index()];
        self.slots
            .get(&(entity, key))
            .and_then(|slot| store.pool.ptr(*slot))
            .ok_or_else(|| {
                report!(EcsError::ComponentNotFound {
                    entity,
                    component: store.name(),
                })
            })
    }
}
