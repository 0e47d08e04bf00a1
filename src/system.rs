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

//! System trait, system registry and the ordered system list

use std::any::TypeId;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::assets::AssetContainer;
use crate::command::CommandQueue;
use crate::component::short_type_name;
use crate::error::{EcsError, Result};
use crate::registry::Registry;
use crate::report;
use crate::world::World;

/// Key of a registered system type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemKey(pub u32);

impl std::fmt::Display for SystemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// Continuation flag returned by [`System::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flow {
    #[default]
    Continue,
    /// End the loop after this tick
    Stop,
}

impl Flow {
    pub fn is_continue(self) -> bool {
        self == Flow::Continue
    }
}

impl From<bool> for Flow {
    fn from(keep_running: bool) -> Self {
        if keep_running {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }
}

/// System trait
///
/// Systems run one after another on the loop thread. Component payloads may
/// be changed directly; structural changes (entity destruction, adding or
/// removing components, editing the system list) go through `commands` and
/// take effect once the whole tick has run.
pub trait System: Send {
    /// Get system name
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    fn update(
        &mut self,
        world: &mut World,
        assets: &AssetContainer,
        commands: &CommandQueue,
    ) -> Result<Flow>;
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

type SystemFactory = Arc<dyn Fn() -> BoxedSystem + Send + Sync>;

#[derive(Clone)]
struct SystemEntry {
    name: &'static str,
    factory: SystemFactory,
}

/// System types known to the process.
///
/// Cloning is cheap; a system loop keeps its own copy so it never has to
/// lock the process-wide registry while running.
#[derive(Clone)]
pub struct SystemRegistry {
    entries: Registry<SystemKey, SystemEntry>,
    by_type: FxHashMap<TypeId, SystemKey>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self {
            entries: Registry::new("system"),
            by_type: FxHashMap::default(),
        }
    }

    /// Register `S` built by `factory`.
    pub fn register<S, F>(&mut self, factory: F) -> Result<SystemKey>
    where
        S: System + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let name = short_type_name::<S>();
        if self.by_type.contains_key(&TypeId::of::<S>()) {
            return Err(report!(EcsError::AlreadyRegistered(format!("system {name}"))));
        }

        let key = SystemKey(self.entries.len() as u32);
        self.entries.register(
            key,
            SystemEntry {
                name,
                factory: Arc::new(move || Box::new(factory()) as BoxedSystem),
            },
        )?;
        self.by_type.insert(TypeId::of::<S>(), key);

        tracing::debug!(system = name, %key, "registered system");
        Ok(key)
    }

    pub fn register_default<S: System + Default + 'static>(&mut self) -> Result<SystemKey> {
        self.register(S::default)
    }

    pub fn key_of<S: System + 'static>(&self) -> Option<SystemKey> {
        self.by_type.get(&TypeId::of::<S>()).copied()
    }

    /// Build a fresh instance of the system registered under `key`.
    pub fn create(&self, key: SystemKey) -> Result<BoxedSystem> {
        let entry = self.entries.require(key)?;
        Ok((entry.factory)())
    }

    pub fn name(&self, key: SystemKey) -> Option<&'static str> {
        self.entries.get(key).map(|entry| entry.name)
    }

    pub fn contains(&self, key: SystemKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Live systems of one loop plus their execution order.
#[derive(Default)]
pub struct SystemList {
    systems: FxHashMap<SystemKey, BoxedSystem>,
    order: Vec<SystemKey>,
}

impl SystemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate the system registered under `key`. Does nothing if the
    /// list already holds it.
    pub fn create_system(&mut self, registry: &SystemRegistry, key: SystemKey) -> Result<()> {
        if self.systems.contains_key(&key) {
            return Ok(());
        }
        let system = registry.create(key)?;
        tracing::debug!(system = system.name(), %key, "created system");
        self.systems.insert(key, system);
        Ok(())
    }

    /// Add an already built system, replacing any previous one under `key`.
    pub fn insert(&mut self, key: SystemKey, system: BoxedSystem) -> Option<BoxedSystem> {
        self.systems.insert(key, system)
    }

    /// Drop the system and take it out of the order. Absent keys are ignored.
    pub fn destroy_system(&mut self, key: SystemKey) -> Option<BoxedSystem> {
        let system = self.systems.remove(&key)?;
        self.order.retain(|k| *k != key);
        tracing::debug!(system = system.name(), %key, "destroyed system");
        Some(system)
    }

    /// Drop every system and clear the order.
    pub fn destroy_systems(&mut self) {
        self.systems.clear();
        self.order.clear();
    }

    pub fn has_system(&self, key: SystemKey) -> bool {
        self.systems.contains_key(&key)
    }

    /// Replace the execution order. Every key must name a live system.
    pub fn set_order(&mut self, order: Vec<SystemKey>) -> Result<()> {
        if let Some(missing) = order.iter().find(|key| !self.systems.contains_key(key)) {
            return Err(report!(EcsError::SystemNotFound(missing.to_string())));
        }
        self.order = order;
        Ok(())
    }

    pub fn order(&self) -> &[SystemKey] {
        &self.order
    }

    pub fn clear_order(&mut self) {
        self.order.clear();
    }

    /// System at position `index` of the order.
    pub fn get(&self, index: usize) -> Option<&dyn System> {
        let key = self.order.get(index)?;
        self.systems.get(key).map(|system| system.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BoxedSystem> {
        let key = self.order.get(index)?;
        self.systems.get_mut(key)
    }

    pub fn system_mut(&mut self, key: SystemKey) -> Option<&mut BoxedSystem> {
        self.systems.get_mut(&key)
    }

    /// Number of systems in the order
    pub fn count(&self) -> usize {
        self.order.len()
    }

    /// Number of live systems, ordered or not
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl std::fmt::Debug for SystemList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = (0..self.count())
            .filter_map(|i| self.get(i).map(|s| s.name()))
            .collect();
        f.debug_struct("SystemList")
            .field("order", &names)
            .field("len", &self.systems.len())
            .finish()
    }
}

/// Builds the system list a loop starts with.
pub trait SystemListFactory: Send {
    fn create(&self, registry: &SystemRegistry) -> Result<SystemList>;
}

/// Creates the given systems and runs them in the given order.
#[derive(Debug, Clone, Default)]
pub struct OrderedSystemListFactory {
    order: Vec<SystemKey>,
}

impl OrderedSystemListFactory {
    pub fn new(order: Vec<SystemKey>) -> Self {
        Self { order }
    }
}

impl SystemListFactory for OrderedSystemListFactory {
    fn create(&self, registry: &SystemRegistry) -> Result<SystemList> {
        let mut list = SystemList::new();
        for &key in &self.order {
            list.create_system(registry, key)?;
        }
        list.set_order(self.order.clone())?;
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;

    #[derive(Default)]
    struct Counter {
        ticks: u32,
    }

    impl System for Counter {
        fn update(&mut self, _: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            self.ticks += 1;
            Ok(Flow::from(self.ticks < 3))
        }
    }

    #[derive(Default)]
    struct Spawner;

    impl System for Spawner {
        fn name(&self) -> &'static str {
            "spawner"
        }

        fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            world.create_entity()?;
            Ok(Flow::Continue)
        }
    }

    fn registry() -> (SystemRegistry, SystemKey, SystemKey) {
        let mut registry = SystemRegistry::new();
        let counter = registry.register_default::<Counter>().unwrap();
        let spawner = registry.register_default::<Spawner>().unwrap();
        (registry, counter, spawner)
    }

    #[test]
    fn test_flow_from_bool() {
        assert_eq!(Flow::from(true), Flow::Continue);
        assert_eq!(Flow::from(false), Flow::Stop);
        assert!(!Flow::Stop.is_continue());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let (mut registry, counter, _) = registry();
        assert_eq!(registry.key_of::<Counter>(), Some(counter));
        assert_eq!(registry.name(counter), Some("Counter"));
        assert!(registry.register_default::<Counter>().is_err());
        assert!(registry.create(SystemKey(42)).is_err());
    }

    #[test]
    fn test_create_system_is_idempotent() {
        let (registry, counter, _) = registry();
        let mut list = SystemList::new();
        list.create_system(&registry, counter).unwrap();
        list.create_system(&registry, counter).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn test_order_requires_live_systems() {
        let (registry, counter, spawner) = registry();
        let mut list = SystemList::new();
        list.create_system(&registry, counter).unwrap();
        assert!(list.set_order(vec![counter, spawner]).is_err());

        list.create_system(&registry, spawner).unwrap();
        list.set_order(vec![spawner, counter]).unwrap();
        assert_eq!(list.get(0).unwrap().name(), "spawner");
        assert_eq!(list.get(1).unwrap().name(), "Counter");
        assert!(list.get(2).is_none());
    }

    #[test]
    fn test_destroy_removes_from_order() {
        let (registry, counter, spawner) = registry();
        let mut list = OrderedSystemListFactory::new(vec![counter, spawner])
            .create(&registry)
            .unwrap();
        assert_eq!(list.count(), 2);

        assert!(list.destroy_system(counter).is_some());
        assert!(list.destroy_system(counter).is_none());
        assert_eq!(list.order(), &[spawner]);

        list.destroy_systems();
        assert!(list.is_empty());
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn test_system_update_through_list() {
        let (registry, counter, spawner) = registry();
        let mut list = OrderedSystemListFactory::new(vec![spawner, counter])
            .create(&registry)
            .unwrap();

        let components = ComponentRegistry::new();
        let mut world = World::new(&components).unwrap();
        let assets = AssetContainer::new();
        let commands = CommandQueue::new();

        for index in 0..list.count() {
            let system = list.get_mut(index).unwrap();
            assert!(system.update(&mut world, &assets, &commands).unwrap().is_continue());
        }
        assert_eq!(world.entity_count(), 1);
    }
}
