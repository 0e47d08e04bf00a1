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

//! System loop command queue
//!
//! Structural changes requested while systems run (destroying entities,
//! adding or removing components, editing the system list, committing a
//! staging area) are queued here and applied by the system loop after every
//! system of the tick has run. No system ever sees a half-applied command
//! from its own tick.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::assets::AssetContainer;
use crate::component::{Component, ComponentKey};
use crate::entity::Entity;
use crate::error::Result;
use crate::staging::StagingArea;
use crate::system::{SystemKey, SystemList, SystemRegistry};
use crate::world::World;

/// Everything a command may touch when it runs.
pub struct CommandContext<'a> {
    pub systems: &'a mut SystemList,
    pub world: &'a mut World,
    pub assets: &'a AssetContainer,
    pub registry: &'a SystemRegistry,
}

/// User-defined deferred operation.
///
/// Commands are cloneable so a command prototype can be enqueued many times
/// (scene switches, replayed edits).
pub trait LoopCommand: Send {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()>;

    fn clone_box(&self) -> Box<dyn LoopCommand>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

impl<F> LoopCommand for F
where
    F: Fn(&mut CommandContext<'_>) -> Result<()> + Clone + Send + 'static,
{
    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        self(ctx)
    }

    fn clone_box(&self) -> Box<dyn LoopCommand> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn LoopCommand> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

type ComponentInsert = Box<dyn FnOnce(&mut World, Entity) -> Result<()> + Send>;

/// Deferred operation applied between ticks.
pub enum Command {
    DestroyEntity(Entity),
    AddComponent(Entity, ComponentKey),
    /// Attach a typed value
    Insert(Entity, ComponentInsert),
    RemoveComponent(Entity, ComponentKey),
    /// Merge a staging area filled elsewhere
    Commit(StagingArea),
    CreateSystem(SystemKey),
    DestroySystem(SystemKey),
    SetOrder(Vec<SystemKey>),
    Custom(Box<dyn LoopCommand>),
}

impl Command {
    pub fn apply(self, ctx: &mut CommandContext<'_>) -> Result<()> {
        match self {
            Command::DestroyEntity(entity) => ctx.world.destroy_entity(entity),
            Command::AddComponent(entity, key) => ctx.world.add_component(entity, key).map(|_| ()),
            Command::Insert(entity, insert) => insert(ctx.world, entity),
            Command::RemoveComponent(entity, key) => ctx.world.remove_component(entity, key),
            Command::Commit(mut area) => ctx.world.commit_entities(&mut area),
            Command::CreateSystem(key) => ctx.systems.create_system(ctx.registry, key),
            Command::DestroySystem(key) => {
                ctx.systems.destroy_system(key);
                Ok(())
            }
            Command::SetOrder(order) => ctx.systems.set_order(order),
            Command::Custom(command) => command.execute(ctx),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::DestroyEntity(e) => f.debug_tuple("DestroyEntity").field(e).finish(),
            Command::AddComponent(e, key) => {
                f.debug_tuple("AddComponent").field(e).field(key).finish()
            }
            Command::Insert(e, _) => f.debug_tuple("Insert").field(e).finish(),
            Command::RemoveComponent(e, key) => {
                f.debug_tuple("RemoveComponent").field(e).field(key).finish()
            }
            Command::Commit(area) => f.debug_tuple("Commit").field(area).finish(),
            Command::CreateSystem(key) => f.debug_tuple("CreateSystem").field(key).finish(),
            Command::DestroySystem(key) => f.debug_tuple("DestroySystem").field(key).finish(),
            Command::SetOrder(order) => f.debug_tuple("SetOrder").field(order).finish(),
            Command::Custom(command) => write!(f, "Custom({})", command.name()),
        }
    }
}

/// FIFO of deferred commands, safe to fill from any thread.
#[derive(Default)]
pub struct CommandQueue {
    commands: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, command: Command) {
        self.commands.lock().push_back(command);
    }

    pub fn dequeue(&self) -> Option<Command> {
        self.commands.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    /// Queue entity destruction
    pub fn destroy_entity(&self, entity: Entity) {
        self.enqueue(Command::DestroyEntity(entity));
    }

    pub fn add_component(&self, entity: Entity, key: ComponentKey) {
        self.enqueue(Command::AddComponent(entity, key));
    }

    /// Queue attaching `value` as entity's `T`.
    pub fn insert<T: Component>(&self, entity: Entity, value: T) {
        self.enqueue(Command::Insert(
            entity,
            Box::new(move |world, entity| world.insert(entity, value).map(|_| ())),
        ));
    }

    pub fn remove_component(&self, entity: Entity, key: ComponentKey) {
        self.enqueue(Command::RemoveComponent(entity, key));
    }

    pub fn commit(&self, area: StagingArea) {
        self.enqueue(Command::Commit(area));
    }

    pub fn create_system(&self, key: SystemKey) {
        self.enqueue(Command::CreateSystem(key));
    }

    pub fn destroy_system(&self, key: SystemKey) {
        self.enqueue(Command::DestroySystem(key));
    }

    pub fn set_order(&self, order: Vec<SystemKey>) {
        self.enqueue(Command::SetOrder(order));
    }

    pub fn custom(&self, command: impl LoopCommand + 'static) {
        self.enqueue(Command::Custom(Box::new(command)));
    }

    /// Apply every command queued before this call, oldest first.
    ///
    /// Commands enqueued while draining wait for the next drain. A command
    /// failing with a recoverable error is logged and skipped. A fatal error
    /// stops the drain and the commands behind it are discarded. Returns the
    /// number of commands applied.
    pub fn drain(&self, ctx: &mut CommandContext<'_>) -> Result<usize> {
        let pending: Vec<Command> = self.commands.lock().drain(..).collect();
        let total = pending.len();
        let mut applied = 0;

        for (index, command) in pending.into_iter().enumerate() {
            tracing::trace!(?command, "applying command");
            match command.apply(ctx) {
                Ok(()) => applied += 1,
                Err(err) if !err.is_fatal() => {
                    tracing::warn!(index, error = %err, "command failed, skipping");
                }
                Err(err) => {
                    let dropped = total - index - 1;
                    if dropped > 0 {
                        tracing::warn!(dropped, "discarding commands after fatal failure");
                    }
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.len())
            .finish()
    }
}
