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

//! Hierarchical transform propagation
//!
//! Entities carry a local [`Transform`] and optionally a [`Parent`]. The
//! [`TransformSystem`] composes parent chains into [`GlobalTransform`]s.
//! It reads first and writes afterwards; anything structural (a missing
//! `GlobalTransform`, a parent link to a dead entity) is queued as a command.

use glam::{Mat4, Quat, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::assets::AssetContainer;
use crate::command::{CommandContext, CommandQueue};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::registry::ComponentRegistry;
use crate::report;
use crate::system::{Flow, System};
use crate::world::World;

/// Parent chains deeper than this are treated as cycles.
pub const MAX_HIERARCHY_DEPTH: usize = 256;

/// Local transform relative to the parent (or the world for roots)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn compute_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// World-space matrix, written by [`TransformSystem`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalTransform(pub Mat4);

impl GlobalTransform {
    pub fn translation(&self) -> Vec3 {
        self.0.w_axis.truncate()
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.0.transform_point3(point)
    }
}

/// Link to the parent entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Parent(pub Entity);

/// Register the transform components with the given budgets.
pub fn register_components(registry: &mut ComponentRegistry, max_count: usize) -> Result<()> {
    registry.register::<Transform>(max_count)?;
    registry.register::<GlobalTransform>(max_count)?;
    registry.register::<Parent>(max_count)?;
    Ok(())
}

/// Propagates local transforms down parent chains.
///
/// Runs every `update_interval` ticks; 1 means every tick. Between runs,
/// `GlobalTransform` lags behind local changes.
#[derive(Debug)]
pub struct TransformSystem {
    update_interval: u32,
    since_update: u32,
    last_updated: usize,
}

impl TransformSystem {
    pub fn new(update_interval: u32) -> Self {
        Self {
            update_interval: update_interval.max(1),
            // First tick always propagates
            since_update: update_interval.max(1) - 1,
            last_updated: 0,
        }
    }

    pub fn update_interval(&self) -> u32 {
        self.update_interval
    }

    /// Number of globals computed by the last propagation
    pub fn last_updated(&self) -> usize {
        self.last_updated
    }

    /// Compute every global and apply it. Returns how many were computed.
    pub fn propagate(&mut self, world: &mut World, commands: &CommandQueue) -> Result<usize> {
        let entities = world.view_of::<Transform>()?.to_vec();
        let parent_key = world.key_of::<Parent>();

        let mut globals: FxHashMap<Entity, Mat4> = FxHashMap::default();
        let mut stale_links = FxHashSet::default();
        for &entity in &entities {
            resolve_global(world, entity, &mut globals, &mut stale_links)?;
        }

        if let Some(parent_key) = parent_key {
            for entity in stale_links {
                tracing::debug!(%entity, "dropping link to a dead parent");
                // An earlier system may have queued the entity for destruction.
                commands.custom(move |ctx: &mut CommandContext<'_>| -> Result<()> {
                    if ctx.world.entity_exists(entity) && ctx.world.has_component(entity, parent_key)
                    {
                        ctx.world.remove_component(entity, parent_key)?;
                    }
                    Ok(())
                });
            }
        }

        for &entity in &entities {
            let Some(matrix) = globals.get(&entity).copied() else {
                continue;
            };
            if world.has::<GlobalTransform>(entity) {
                world.get_mut::<GlobalTransform>(entity)?.0 = matrix;
            } else {
                commands.custom(move |ctx: &mut CommandContext<'_>| -> Result<()> {
                    if ctx.world.entity_exists(entity) && !ctx.world.has::<GlobalTransform>(entity) {
                        ctx.world.insert(entity, GlobalTransform(matrix))?;
                    }
                    Ok(())
                });
            }
        }

        self.last_updated = globals.len();
        Ok(self.last_updated)
    }
}

impl Default for TransformSystem {
    fn default() -> Self {
        Self::new(1)
    }
}

impl System for TransformSystem {
    fn update(
        &mut self,
        world: &mut World,
        _assets: &AssetContainer,
        commands: &CommandQueue,
    ) -> Result<Flow> {
        self.since_update += 1;
        if self.since_update < self.update_interval {
            return Ok(Flow::Continue);
        }
        self.since_update = 0;
        self.propagate(world, commands)?;
        Ok(Flow::Continue)
    }
}

/// Walk up from `entity` to the first resolved ancestor or root, then fold
/// the chain back down.
fn resolve_global(
    world: &World,
    entity: Entity,
    globals: &mut FxHashMap<Entity, Mat4>,
    stale_links: &mut FxHashSet<Entity>,
) -> Result<Mat4> {
    if let Some(matrix) = globals.get(&entity) {
        return Ok(*matrix);
    }

    let mut chain = vec![entity];
    let mut base = Mat4::IDENTITY;
    let mut current = entity;

    loop {
        if !world.has::<Parent>(current) {
            break;
        }
        let parent = world.get::<Parent>(current)?.0;
        if !world.entity_exists(parent) {
            stale_links.insert(current);
            break;
        }
        if let Some(matrix) = globals.get(&parent) {
            base = *matrix;
            break;
        }
        if !world.has::<Transform>(parent) {
            // Parent without a transform acts as the origin.
            break;
        }
        if chain.len() >= MAX_HIERARCHY_DEPTH || chain.contains(&parent) {
            return Err(report!(EcsError::HierarchyError(format!(
                "transform hierarchy of {entity} is cyclic or deeper than {MAX_HIERARCHY_DEPTH}"
            ))));
        }
        chain.push(parent);
        current = parent;
    }

    let mut matrix = base;
    for &link in chain.iter().rev() {
        matrix *= world.get::<Transform>(link)?.compute_matrix();
        globals.insert(link, matrix);
    }
    Ok(matrix)
}
