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

//! Prefabs: reusable entity recipes.
//!
//! A prefab describes the components of one entity once and can build it
//! either directly in a world or inside a staging area on a loader thread.

use serde::{Deserialize, Serialize};

use crate::assets::AssetContainer;
use crate::component::{Component, ComponentKey};
use crate::entity::Entity;
use crate::error::Result;
use crate::registry::Registry;
use crate::staging::StagingArea;
use crate::world::World;

/// Where a prefab writes its components.
pub enum PrefabTarget<'a> {
    World(&'a mut World, Entity),
    Staged(&'a mut StagingArea, Entity),
}

impl PrefabTarget<'_> {
    pub fn entity(&self) -> Entity {
        match self {
            PrefabTarget::World(_, entity) | PrefabTarget::Staged(_, entity) => *entity,
        }
    }

    pub fn insert<T: Component>(&mut self, value: T) -> Result<()> {
        match self {
            PrefabTarget::World(world, entity) => world.insert(*entity, value).map(|_| ()),
            PrefabTarget::Staged(area, entity) => area.insert(*entity, value),
        }
    }

    pub fn add_component(&mut self, key: ComponentKey) -> Result<()> {
        match self {
            PrefabTarget::World(world, entity) => world.add_component(*entity, key).map(|_| ()),
            PrefabTarget::Staged(area, entity) => area.add_component(*entity, key),
        }
    }
}

/// Entity recipe
pub trait Prefab: Send + Sync {
    /// Attach this prefab's components to `target`.
    fn build(&self, target: &mut PrefabTarget<'_>, assets: &AssetContainer) -> Result<()>;

    /// Create a new entity in `world` and build it. On failure the
    /// half-built entity is destroyed.
    fn instantiate(&self, world: &mut World, assets: &AssetContainer) -> Result<Entity> {
        let entity = world.create_entity()?;
        let result = self.build(&mut PrefabTarget::World(world, entity), assets);
        match result {
            Ok(()) => Ok(entity),
            Err(err) => {
                world.destroy_entity(entity)?;
                Err(err)
            }
        }
    }

    /// Stage a new entity in `area`; it appears in the world on commit.
    fn instantiate_staged(&self, area: &mut StagingArea, assets: &AssetContainer) -> Result<Entity> {
        let entity = area.create_entity()?;
        let result = self.build(&mut PrefabTarget::Staged(area, entity), assets);
        match result {
            Ok(()) => Ok(entity),
            Err(err) => {
                area.discard(entity);
                Err(err)
            }
        }
    }
}

/// Key of a registered prefab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrefabKey(pub u32);

pub type PrefabRegistry = Registry<PrefabKey, Box<dyn Prefab>>;
