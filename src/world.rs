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

//! World: entity table, pooled component storage and association maps
//!
//! The world keeps three maps in lockstep:
//!
//! - entity → component keys it holds
//! - component key → entities holding it (what views iterate)
//! - (entity, component key) → pool slot
//!
//! They are only touched by [`World::add_component`],
//! [`World::remove_component`], [`World::destroy_entity`] and
//! [`World::commit_entities`]. Entities sitting in a staging area exist in
//! none of them until their area is committed.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{
    short_type_name, Component, ComponentDescriptor, ComponentHandle, ComponentKey, SlotIndex,
};
use crate::entity::{Entity, GenerationId, MAX_INDEX};
use crate::error::{EcsError, Result};
use crate::pool::{BlockLayout, ComponentPool, FixedBlockPoolFactory, PoolFactory};
use crate::registry::ComponentRegistry;
use crate::report;
use crate::view::{Payloads, View};

/// World shared between the game loop thread and producers.
///
/// Views run under the read lock; ticks and commits under the write lock.
pub type SharedWorld = Arc<RwLock<World>>;

/// Component keys held by one entity.
pub(crate) type KeyList = SmallVec<[ComponentKey; 8]>;

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Alive,
    /// Handed out to a staging area, not committed yet.
    Reserved,
}

/// Pool plus the descriptor it was built from.
pub(crate) struct ComponentStore {
    pub(crate) descriptor: ComponentDescriptor,
    pub(crate) pool: Box<dyn ComponentPool>,
}

impl ComponentStore {
    #[inline]
    pub(crate) fn name(&self) -> &'static str {
        self.descriptor.name()
    }
}

/// Configures and creates a [`World`].
///
/// ```
/// use pooled_ecs::prelude::*;
///
/// #[derive(Default)]
/// struct Health(u32);
///
/// let mut registry = ComponentRegistry::new();
/// registry.register::<Health>(2).unwrap();
///
/// let world = WorldBuilder::new()
///     .with_registry(&registry)
///     .with_pool_factory(FixedBlockPoolFactory)
///     .build()
///     .unwrap();
/// assert_eq!(world.entity_count(), 0);
/// ```
#[derive(Default)]
pub struct WorldBuilder<'r> {
    registry: Option<&'r ComponentRegistry>,
    pool_factory: Option<Box<dyn PoolFactory>>,
}

impl<'r> WorldBuilder<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: &'r ComponentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_pool_factory(mut self, factory: impl PoolFactory + 'static) -> Self {
        self.pool_factory = Some(Box::new(factory));
        self
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_some()
    }

    /// Build the world, creating one pool per registered component type.
    /// Capacities are fixed from here on.
    pub fn build(self) -> Result<World> {
        let registry = self
            .registry
            .ok_or_else(|| report!(EcsError::WorldNotReady("no component registry".into())))?;
        let factory = self
            .pool_factory
            .unwrap_or_else(|| Box::new(FixedBlockPoolFactory));

        let mut stores = Vec::with_capacity(registry.len());
        let mut type_keys = AHashMap::with_capacity(registry.len());
        for descriptor in registry.descriptors() {
            let layout = BlockLayout::for_component(descriptor.vtable.layout());
            let pool = factory.create(descriptor.name(), layout, descriptor.max_count)?;
            let block = pool.block_layout();
            if block.size < layout.size || block.align < layout.align {
                return Err(report!(EcsError::WorldNotReady(format!(
                    "pool for {} has blocks of {block:?}, needs {layout:?}",
                    descriptor.name()
                ))));
            }
            type_keys.insert(descriptor.vtable.type_id(), descriptor.key);
            stores.push(ComponentStore {
                descriptor: *descriptor,
                pool,
            });
        }

        let id = NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(world = id, components = stores.len(), "world created");

        Ok(World {
            id,
            entities: Vec::new(),
            states: Vec::new(),
            free: Vec::new(),
            next_index: Arc::new(AtomicU32::new(0)),
            alive_count: 0,
            registered: FxHashMap::default(),
            component_entities: vec![BTreeSet::new(); stores.len()],
            stores,
            type_keys,
            entity_components: AHashMap::new(),
            slots: AHashMap::new(),
        })
    }
}

/// The ECS world.
pub struct World {
    id: u64,

    // Entity table, indexed by entity index.
    entities: Vec<Entity>,
    states: Vec<SlotState>,
    free: Vec<u32>,
    next_index: Arc<AtomicU32>,
    alive_count: usize,
    registered: FxHashMap<usize, Entity>,

    pub(crate) stores: Vec<ComponentStore>,
    pub(crate) type_keys: AHashMap<TypeId, ComponentKey>,
    pub(crate) entity_components: AHashMap<Entity, KeyList>,
    pub(crate) component_entities: Vec<BTreeSet<Entity>>,
    pub(crate) slots: AHashMap<(Entity, ComponentKey), SlotIndex>,
}

impl World {
    /// Build a world over `registry` with fixed-block pools.
    pub fn new(registry: &ComponentRegistry) -> Result<Self> {
        WorldBuilder::new().with_registry(registry).build()
    }

    pub fn into_shared(self) -> SharedWorld {
        Arc::new(RwLock::new(self))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn index_reserver(&self) -> Arc<AtomicU32> {
        self.next_index.clone()
    }

    // ---- entities -------------------------------------------------------

    /// Create an entity, recycling a destroyed index when one is free.
    /// A recycled index comes back with its generation bumped.
    pub fn create_entity(&mut self) -> Result<Entity> {
        let entity = match self.free.pop() {
            Some(index) => {
                let slot = index as usize;
                let entity = self.entities[slot].next_generation();
                self.entities[slot] = entity;
                self.states[slot] = SlotState::Alive;
                entity
            }
            None => {
                let index = reserve_index(&self.next_index)?;
                self.grow_to(index);
                let entity = self.entities[index as usize];
                self.states[index as usize] = SlotState::Alive;
                entity
            }
        };
        self.alive_count += 1;
        tracing::trace!(%entity, "entity created");
        Ok(entity)
    }

    /// Destroy a live entity and every component it holds.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        self.require_alive(entity)?;

        #[cfg(feature = "profiling")]
        let _span = info_span!("world.destroy_entity", entity = %entity).entered();

        if let Some(keys) = self.entity_components.remove(&entity) {
            for key in keys {
                self.detach(entity, key);
            }
        }

        let slot = entity.index() as usize;
        self.states[slot] = SlotState::Free;
        self.free.push(entity.index());
        self.alive_count -= 1;
        tracing::debug!(%entity, "entity destroyed");
        Ok(())
    }

    /// True when `entity` is alive and its generation is current.
    /// Never fails: stale, invalid and out-of-range ids are just absent.
    pub fn entity_exists(&self, entity: Entity) -> bool {
        if !entity.is_valid() {
            return false;
        }
        let slot = entity.index() as usize;
        matches!(self.states.get(slot), Some(SlotState::Alive)) && self.entities[slot] == entity
    }

    /// True while `entity` sits in an uncommitted staging area.
    pub fn is_staged(&self, entity: Entity) -> bool {
        if !entity.is_valid() || entity.generation() != 0 {
            return false;
        }
        let index = entity.index();
        match self.states.get(index as usize) {
            Some(state) => *state == SlotState::Reserved,
            None => index < self.next_index.load(Ordering::Acquire),
        }
    }

    /// Number of live (committed) entities.
    pub fn entity_count(&self) -> usize {
        self.alive_count
    }

    /// Live entities in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities
            .iter()
            .zip(&self.states)
            .filter(|(_, state)| **state == SlotState::Alive)
            .map(|(entity, _)| *entity)
    }

    /// Remember `entity` under a well-known slot (player, camera, ...).
    pub fn register_entity(&mut self, slot: usize, entity: Entity) -> Result<()> {
        self.require_alive(entity)?;
        self.registered.insert(slot, entity);
        Ok(())
    }

    /// The entity last registered under `slot`. It may have been destroyed
    /// since; check with [`entity_exists`](Self::entity_exists).
    pub fn registered_entity(&self, slot: usize) -> Option<Entity> {
        self.registered.get(&slot).copied()
    }

    // ---- components -----------------------------------------------------

    /// Attach a default-constructed component of type `key`.
    pub fn add_component(&mut self, entity: Entity, key: ComponentKey) -> Result<ComponentHandle> {
        let vtable = self.store(key)?.descriptor.vtable;
        let slot = self.attach(entity, key, |ptr| {
            // SAFETY: fresh slot sized and aligned for this type.
            unsafe { vtable.construct(ptr) }
        })?;
        self.publish(entity, key);
        Ok(ComponentHandle { entity, key, slot })
    }

    /// Attach `T::default()` and return it for initialisation.
    pub fn add<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        self.insert(entity, T::default())
    }

    /// Attach `value` as entity's `T` component.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> Result<&mut T> {
        let key = self.key_for::<T>()?;
        let slot = self.attach(entity, key, move |ptr| {
            // SAFETY: fresh slot sized and aligned for T.
            unsafe { ptr.cast::<T>().as_ptr().write(value) }
        })?;
        self.publish(entity, key);
        let ptr = self.slot_ptr(key, slot)?;
        // SAFETY: the slot was just initialised with a T.
        Ok(unsafe { &mut *ptr.cast::<T>().as_ptr() })
    }

    /// Destroy entity's component of type `key` and free its slot.
    pub fn remove_component(&mut self, entity: Entity, key: ComponentKey) -> Result<()> {
        self.require_alive(entity)?;
        let name = self.store(key)?.name();
        let present = self
            .entity_components
            .get_mut(&entity)
            .and_then(|keys| {
                let pos = keys.iter().position(|k| *k == key)?;
                keys.swap_remove(pos);
                Some(())
            })
            .is_some();
        if !present {
            return Err(report!(EcsError::ComponentNotFound {
                entity,
                component: name,
            }));
        }
        if self
            .entity_components
            .get(&entity)
            .is_some_and(|keys| keys.is_empty())
        {
            self.entity_components.remove(&entity);
        }
        self.detach(entity, key);
        tracing::trace!(%entity, component = name, "component removed");
        Ok(())
    }

    pub fn remove<T: Component>(&mut self, entity: Entity) -> Result<()> {
        let key = self.key_for::<T>()?;
        self.remove_component(entity, key)
    }

    /// False for dead entities, unknown keys and absent components.
    pub fn has_component(&self, entity: Entity, key: ComponentKey) -> bool {
        self.entity_exists(entity) && self.slots.contains_key(&(entity, key))
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.type_keys
            .get(&TypeId::of::<T>())
            .is_some_and(|key| self.has_component(entity, *key))
    }

    /// Raw address of entity's component of type `key`.
    ///
    /// Valid until the component is removed. Prefer the typed accessors.
    pub fn component_ptr(&self, entity: Entity, key: ComponentKey) -> Result<NonNull<u8>> {
        let slot = self.locate(entity, key)?;
        self.slot_ptr(key, slot)
    }

    /// Arena handle of entity's component of type `key`.
    pub fn component_handle(&self, entity: Entity, key: ComponentKey) -> Result<ComponentHandle> {
        let slot = self.locate(entity, key)?;
        Ok(ComponentHandle { entity, key, slot })
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T> {
        let key = self.key_for::<T>()?;
        let ptr = self.component_ptr(entity, key)?;
        // SAFETY: the slot belongs to T's pool and holds a live T.
        Ok(unsafe { &*ptr.cast::<T>().as_ptr() })
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        let key = self.key_for::<T>()?;
        let ptr = self.component_ptr(entity, key)?;
        // SAFETY: as in `get`, and `&mut self` makes the access exclusive.
        Ok(unsafe { &mut *ptr.cast::<T>().as_ptr() })
    }

    /// Resolve a handle to a live `T`. `None` if the component was removed,
    /// its owner destroyed, or the handle is for another type.
    pub fn resolve<T: Component>(&self, handle: ComponentHandle) -> Option<&T> {
        let ptr = self.handle_ptr::<T>(handle)?;
        // SAFETY: live slot of T's pool.
        Some(unsafe { &*ptr.cast::<T>().as_ptr() })
    }

    pub fn resolve_mut<T: Component>(&mut self, handle: ComponentHandle) -> Option<&mut T> {
        let ptr = self.handle_ptr::<T>(handle)?;
        // SAFETY: live slot of T's pool, exclusive through `&mut self`.
        Some(unsafe { &mut *ptr.cast::<T>().as_ptr() })
    }

    /// Component keys held by a live entity.
    pub fn components_of(&self, entity: Entity) -> Result<&[ComponentKey]> {
        self.require_alive(entity)?;
        Ok(self
            .entity_components
            .get(&entity)
            .map(|keys| keys.as_slice())
            .unwrap_or(&[]))
    }

    // ---- views ----------------------------------------------------------

    /// Read-only view over every committed entity holding `key`.
    pub fn view(&self, key: ComponentKey) -> Result<View<'_>> {
        let entities = self
            .component_entities
            .get(key.index())
            .ok_or_else(|| report!(EcsError::UnknownComponent(key.to_string())))?;
        Ok(View::new(key, entities))
    }

    pub fn view_of<T: Component>(&self) -> Result<View<'_>> {
        let key = self.key_for::<T>()?;
        self.view(key)
    }

    /// Visit every entity holding `key` with mutable access to component
    /// payloads.
    ///
    /// [`Payloads`] has no structural operations: entities cannot gain or
    /// lose components while the view backing this loop is walked. Queue
    /// such changes on the command queue instead.
    pub fn for_each_mut<F>(&mut self, key: ComponentKey, mut f: F) -> Result<()>
    where
        F: FnMut(Entity, &mut Payloads<'_>) -> Result<()>,
    {
        let entities = self
            .component_entities
            .get(key.index())
            .ok_or_else(|| report!(EcsError::UnknownComponent(key.to_string())))?;
        let mut payloads = Payloads::new(&mut self.stores, &self.slots, &self.type_keys);
        for &entity in entities {
            f(entity, &mut payloads)?;
        }
        Ok(())
    }

    // ---- registry lookups -----------------------------------------------

    pub fn key_of<T: Component>(&self) -> Option<ComponentKey> {
        self.type_keys.get(&TypeId::of::<T>()).copied()
    }

    pub fn component_name(&self, key: ComponentKey) -> Option<&'static str> {
        self.stores.get(key.index()).map(ComponentStore::name)
    }

    pub fn component_keys(&self) -> impl Iterator<Item = ComponentKey> + '_ {
        self.stores.iter().map(|store| store.descriptor.key)
    }

    /// Live instances of `key`.
    pub fn live_count(&self, key: ComponentKey) -> Option<usize> {
        self.stores.get(key.index()).map(|store| store.pool.live_count())
    }

    /// Fixed instance budget of `key`.
    pub fn capacity(&self, key: ComponentKey) -> Option<usize> {
        self.stores.get(key.index()).map(|store| store.pool.capacity())
    }

    // ---- internals ------------------------------------------------------

    pub(crate) fn key_for<T: Component>(&self) -> Result<ComponentKey> {
        self.key_of::<T>().ok_or_else(|| {
            report!(EcsError::UnknownComponent(
                short_type_name::<T>().to_string()
            ))
        })
    }

    pub(crate) fn store(&self, key: ComponentKey) -> Result<&ComponentStore> {
        self.stores
            .get(key.index())
            .ok_or_else(|| report!(EcsError::UnknownComponent(key.to_string())))
    }

    pub(crate) fn require_alive(&self, entity: Entity) -> Result<()> {
        if self.entity_exists(entity) {
            Ok(())
        } else if self.is_staged(entity) {
            Err(report!(EcsError::StagedEntityMutation(entity)))
        } else if !entity.is_valid() {
            Err(report!(EcsError::InvalidEntity))
        } else {
            Err(report!(EcsError::EntityNotFound(entity)))
        }
    }

    fn handle_ptr<T: Component>(&self, handle: ComponentHandle) -> Option<NonNull<u8>> {
        let store = self.stores.get(handle.key.index())?;
        if store.descriptor.vtable.type_id() != TypeId::of::<T>() {
            return None;
        }
        if self.slots.get(&(handle.entity, handle.key)) != Some(&handle.slot) {
            return None;
        }
        store.pool.ptr(handle.slot)
    }

    fn locate(&self, entity: Entity, key: ComponentKey) -> Result<SlotIndex> {
        self.require_alive(entity)?;
        let name = self.store(key)?.name();
        self.slots.get(&(entity, key)).copied().ok_or_else(|| {
            report!(EcsError::ComponentNotFound {
                entity,
                component: name,
            })
        })
    }

    fn slot_ptr(&self, key: ComponentKey, slot: SlotIndex) -> Result<NonNull<u8>> {
        let store = self.store(key)?;
        store.pool.ptr(slot).ok_or_else(|| {
            report!(EcsError::ComponentNotFound {
                entity: GenerationId::invalid(),
                component: store.name(),
            })
        })
    }

    /// Acquire and initialise a slot, recording entity → key and the slot.
    /// Does not touch component → entity, see [`publish`](Self::publish).
    pub(crate) fn attach(
        &mut self,
        entity: Entity,
        key: ComponentKey,
        init: impl FnOnce(NonNull<u8>),
    ) -> Result<SlotIndex> {
        self.require_alive(entity)?;
        let store = self
            .stores
            .get_mut(key.index())
            .ok_or_else(|| report!(EcsError::UnknownComponent(key.to_string())))?;
        if self.slots.contains_key(&(entity, key)) {
            return Err(report!(EcsError::ComponentAlreadyPresent {
                entity,
                component: store.name(),
            }));
        }

        let slot = store.pool.acquire()?;
        let ptr = match store.pool.ptr(slot) {
            Some(ptr) => ptr,
            None => {
                store.pool.release(slot);
                return Err(report!(EcsError::ComponentNotFound {
                    entity,
                    component: store.name(),
                }));
            }
        };
        init(ptr);

        self.entity_components.entry(entity).or_default().push(key);
        self.slots.insert((entity, key), slot);
        tracing::trace!(%entity, component = store.name(), slot, "component added");
        Ok(slot)
    }

    /// Make an attached component visible to views of its type.
    pub(crate) fn publish(&mut self, entity: Entity, key: ComponentKey) {
        self.component_entities[key.index()].insert(entity);
    }

    /// Drop the payload, free the slot and forget (entity, key) in the
    /// slot and view maps. The caller fixes up entity → keys.
    fn detach(&mut self, entity: Entity, key: ComponentKey) {
        if let Some(slot) = self.slots.remove(&(entity, key)) {
            let store = &mut self.stores[key.index()];
            if let Some(ptr) = store.pool.ptr(slot) {
                // SAFETY: live slot holding an instance of this store's type.
                unsafe { store.descriptor.vtable.destroy(ptr) };
            }
            store.pool.release(slot);
        }
        self.component_entities[key.index()].remove(&entity);
    }

    /// Extend the entity table so `index` is addressable. New slots start
    /// out reserved at generation 0.
    fn grow_to(&mut self, index: u32) {
        let needed = index as usize + 1;
        while self.entities.len() < needed {
            let next = self.entities.len() as u32;
            self.entities.push(GenerationId::new(next, 0));
            self.states.push(SlotState::Reserved);
        }
    }

    /// Turn a reserved index into a live entity. Used by commit.
    pub(crate) fn activate_reserved(&mut self, entity: Entity) -> Result<()> {
        if !self.is_staged(entity) {
            return Err(report!(EcsError::EntityNotStaged(entity)));
        }
        self.grow_to(entity.index());
        self.states[entity.index() as usize] = SlotState::Alive;
        self.alive_count += 1;
        Ok(())
    }
}

pub(crate) fn reserve_index(next_index: &AtomicU32) -> Result<u32> {
    let index = next_index.fetch_add(1, Ordering::AcqRel);
    if index > MAX_INDEX {
        next_index.fetch_sub(1, Ordering::AcqRel);
        return Err(report!(EcsError::EntityCapacityExhausted { max: MAX_INDEX }));
    }
    Ok(index)
}

impl Drop for World {
    fn drop(&mut self) {
        for (&(_, key), &slot) in &self.slots {
            let store = &mut self.stores[key.index()];
            if let Some(ptr) = store.pool.ptr(slot) {
                // SAFETY: every recorded slot holds a live instance.
                unsafe { store.descriptor.vtable.destroy(ptr) };
            }
            store.pool.release(slot);
        }
        self.slots.clear();
        tracing::debug!(world = self.id, "world destroyed");
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &self.alive_count)
            .field("component_types", &self.stores.len())
            .finish()
    }
}
