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

//! Staging areas: entity creation off the authoritative world state
//!
//! A [`StagingArea`] reserves entity indices from its world through a
//! shared atomic counter and buffers the components those entities will get.
//! Nothing about a staged entity is visible to views, to
//! [`World::entity_exists`] or to the association maps until
//! [`World::commit_entities`] merges the area, which needs `&mut World`
//! (the write lock of a [`SharedWorld`](crate::world::SharedWorld)).
//!
//! Areas are `Send`, so a loader thread can fill one while the game loop
//! keeps ticking, then hand it to the loop as a command.
//!
//! ```
//! use pooled_ecs::prelude::*;
//!
//! #[derive(Default)]
//! struct Health(u32);
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register::<Health>(8).unwrap();
//! let mut world = World::new(&registry).unwrap();
//!
//! let mut area = world.create_staging_area();
//! let e = area.create_entity().unwrap();
//! area.insert(e, Health(50)).unwrap();
//! assert!(world.view_of::<Health>().unwrap().is_empty());
//!
//! world.commit_entities(&mut area).unwrap();
//! assert!(world.view_of::<Health>().unwrap().contains(e));
//! assert!(area.is_empty());
//! ```

use std::any::TypeId;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{short_type_name, Component, ComponentKey};
use crate::entity::{Entity, GenerationId};
use crate::error::{EcsError, Result};
use crate::report;
use crate::world::{reserve_index, World};

/// Component value waiting in a staging area.
trait StagedValue: Send {
    fn component_type(&self) -> TypeId;
    fn name(&self) -> &'static str;

    /// # Safety
    /// `ptr` must be an uninitialised slot sized and aligned for the value.
    unsafe fn write(self: Box<Self>, ptr: NonNull<u8>);
}

struct Staged<T>(T);

impl<T: Component> StagedValue for Staged<T> {
    fn component_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn name(&self) -> &'static str {
        short_type_name::<T>()
    }

    unsafe fn write(self: Box<Self>, ptr: NonNull<u8>) {
        ptr.cast::<T>().as_ptr().write(self.0);
    }
}

enum StagedComponent {
    /// Default-construct through the type's vtable at commit.
    Default(ComponentKey),
    Value(Box<dyn StagedValue>),
}

/// Private buffer of not-yet-committed entities.
///
/// Indices reserved by an area that is dropped without being committed are
/// never handed out again.
pub struct StagingArea {
    world_id: u64,
    reserver: Arc<AtomicU32>,
    entities: Vec<Entity>,
    components: Vec<(Entity, StagedComponent)>,
}

impl StagingArea {
    /// Reserve a fresh entity. The id stays private to this area until it
    /// is committed.
    pub fn create_entity(&mut self) -> Result<Entity> {
        let index = reserve_index(&self.reserver)?;
        let entity = GenerationId::new(index, 0);
        self.entities.push(entity);
        Ok(entity)
    }

    /// Stage a default-constructed component by key.
    pub fn add_component(&mut self, entity: Entity, key: ComponentKey) -> Result<()> {
        self.require_member(entity)?;
        self.components.push((entity, StagedComponent::Default(key)));
        Ok(())
    }

    pub fn add<T: Component>(&mut self, entity: Entity) -> Result<()> {
        self.insert(entity, T::default())
    }

    /// Stage `value` as the entity's `T` component.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        self.require_member(entity)?;
        self.components
            .push((entity, StagedComponent::Value(Box::new(Staged(value)))));
        Ok(())
    }

    /// Drop a staged entity and its staged components.
    pub fn discard(&mut self, entity: Entity) -> bool {
        let before = self.entities.len();
        self.entities.retain(|e| *e != entity);
        self.components.retain(|(e, _)| *e != entity);
        before != self.entities.len()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    /// Staged entities in creation order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn require_member(&self, entity: Entity) -> Result<()> {
        if self.contains(entity) {
            Ok(())
        } else {
            Err(report!(EcsError::EntityNotStaged(entity)))
        }
    }
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("world", &self.world_id)
            .field("entities", &self.entities.len())
            .field("components", &self.components.len())
            .finish()
    }
}

impl World {
    pub fn create_staging_area(&self) -> StagingArea {
        StagingArea {
            world_id: self.id(),
            reserver: self.index_reserver(),
            entities: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Reserve an entity in `area`. Equivalent to `area.create_entity()`
    /// after checking the area belongs to this world.
    pub fn create_staged_entity(&self, area: &mut StagingArea) -> Result<Entity> {
        self.require_own_area(area)?;
        area.create_entity()
    }

    /// Merge every staged entity and component of `area` into the world and
    /// empty the area.
    ///
    /// The whole area is validated first: membership, component types,
    /// duplicates and remaining pool capacity. On a validation error nothing
    /// is merged and the area is left as it was.
    pub fn commit_entities(&mut self, area: &mut StagingArea) -> Result<()> {
        self.require_own_area(area)?;

        #[cfg(feature = "profiling")]
        let _span = info_span!("world.commit_entities", entities = area.len()).entered();

        for &entity in &area.entities {
            if !self.is_staged(entity) {
                return Err(report!(EcsError::EntityNotStaged(entity)));
            }
        }

        let mut keys = Vec::with_capacity(area.components.len());
        let mut seen = AHashSet::with_capacity(area.components.len());
        let mut demand: AHashMap<ComponentKey, usize> = AHashMap::new();
        for (entity, component) in &area.components {
            let key = match component {
                StagedComponent::Default(key) => {
                    self.store(*key)?;
                    *key
                }
                StagedComponent::Value(value) => self
                    .type_keys
                    .get(&value.component_type())
                    .copied()
                    .ok_or_else(|| {
                        report!(EcsError::UnknownComponent(value.name().to_string()))
                    })?,
            };
            if !seen.insert((*entity, key)) {
                return Err(report!(EcsError::ComponentAlreadyPresent {
                    entity: *entity,
                    component: self.store(key)?.name(),
                }));
            }
            *demand.entry(key).or_default() += 1;
            keys.push(key);
        }

        for (&key, &needed) in &demand {
            let store = self.store(key)?;
            let free = store.pool.capacity() - store.pool.live_count();
            if needed > free {
                return Err(report!(EcsError::CapacityExhausted {
                    component: store.name(),
                    max: store.pool.capacity(),
                }));
            }
        }

        let entities = std::mem::take(&mut area.entities);
        let components = std::mem::take(&mut area.components);

        for &entity in &entities {
            self.activate_reserved(entity)?;
        }

        for ((entity, component), key) in components.into_iter().zip(keys) {
            match component {
                StagedComponent::Default(_) => {
                    let vtable = self.store(key)?.descriptor.vtable;
                    self.attach(entity, key, |ptr| {
                        // SAFETY: fresh slot sized and aligned for this type.
                        unsafe { vtable.construct(ptr) }
                    })?;
                }
                StagedComponent::Value(value) => {
                    self.attach(entity, key, |ptr| {
                        // SAFETY: the key was resolved from the value's TypeId.
                        unsafe { value.write(ptr) }
                    })?;
                }
            }
            self.publish(entity, key);
        }

        tracing::debug!(
            entities = entities.len(),
            components = seen.len(),
            "staging area committed"
        );
        Ok(())
    }

    fn require_own_area(&self, area: &StagingArea) -> Result<()> {
        if area.world_id == self.id() {
            Ok(())
        } else {
            Err(report!(EcsError::ForeignStagingArea))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;

    #[derive(Default, Debug, PartialEq)]
    struct Health(u32);

    #[derive(Default, Debug, PartialEq)]
    struct Name(String);

    fn world() -> World {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>(2).unwrap();
        registry.register::<Name>(8).unwrap();
        World::new(&registry).unwrap()
    }

    #[test]
    fn test_staged_entities_invisible_until_commit() {
        let mut world = world();
        let mut area = world.create_staging_area();
        let e = world.create_staged_entity(&mut area).unwrap();
        area.insert(e, Name("crate".into())).unwrap();

        assert!(world.is_staged(e));
        assert!(!world.entity_exists(e));
        assert!(world.view_of::<Name>().unwrap().is_empty());
        assert!(matches!(
            world.add::<Health>(e),
            Err(EcsError::StagedEntityMutation(_))
        ));

        world.commit_entities(&mut area).unwrap();
        assert!(world.entity_exists(e));
        assert!(!world.is_staged(e));
        assert_eq!(world.get::<Name>(e).unwrap().0, "crate");
        assert!(world.view_of::<Name>().unwrap().contains(e));
        assert!(!world.view_of::<Health>().unwrap().contains(e));
    }

    #[test]
    fn test_staged_indices_do_not_collide_with_live_entities() {
        let mut world = world();
        let mut area = world.create_staging_area();
        let staged = area.create_entity().unwrap();
        let live = world.create_entity().unwrap();
        assert_ne!(staged.index(), live.index());

        world.commit_entities(&mut area).unwrap();
        assert!(world.entity_exists(staged));
        assert!(world.entity_exists(live));
        assert_eq!(world.entity_count(), 2);
    }

    #[test]
    fn test_commit_checks_capacity_up_front() {
        let mut world = world();
        let mut area = world.create_staging_area();
        for _ in 0..3 {
            let e = area.create_entity().unwrap();
            area.add::<Health>(e).unwrap();
        }

        let err = world.commit_entities(&mut area).unwrap_err();
        assert!(matches!(err, EcsError::CapacityExhausted { max: 2, .. }));
        assert_eq!(area.len(), 3, "failed commit leaves the area untouched");
        assert_eq!(world.entity_count(), 0);

        let last = area.entities()[2];
        assert!(area.discard(last));
        world.commit_entities(&mut area).unwrap();
        assert_eq!(world.view_of::<Health>().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_staged_component_rejected() {
        let mut world = world();
        let health = world.key_of::<Health>().unwrap();
        let mut area = world.create_staging_area();
        let e = area.create_entity().unwrap();
        area.add_component(e, health).unwrap();
        area.insert(e, Health(4)).unwrap();
        assert!(matches!(
            world.commit_entities(&mut area),
            Err(EcsError::ComponentAlreadyPresent { .. })
        ));
    }

    #[test]
    fn test_foreign_entities_and_areas() {
        let mut world = world();
        let other = self::world();
        let mut area = world.create_staging_area();
        assert!(area.insert(GenerationId::new(7, 0), Health(1)).is_err());

        let mut foreign = other.create_staging_area();
        assert!(matches!(
            world.commit_entities(&mut foreign),
            Err(EcsError::ForeignStagingArea)
        ));

        let e = area.create_entity().unwrap();
        world.commit_entities(&mut area).unwrap();
        let mut again = world.create_staging_area();
        again.entities.push(e);
        assert!(matches!(
            world.commit_entities(&mut again),
            Err(EcsError::EntityNotStaged(_))
        ));
    }

    #[test]
    fn test_staging_from_another_thread() {
        let mut world = world();
        let mut area = world.create_staging_area();
        let handle = std::thread::spawn(move || {
            for i in 0..4 {
                let e = area.create_entity().unwrap();
                area.insert(e, Name(format!("loaded-{i}"))).unwrap();
            }
            area
        });
        let mut area = handle.join().unwrap();
        world.commit_entities(&mut area).unwrap();
        assert_eq!(world.view_of::<Name>().unwrap().len(), 4);
    }
}
