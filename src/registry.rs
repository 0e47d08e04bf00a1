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

//! Factory registries keyed by stable type keys.
//!
//! Component, system and asset-factory registrations all follow the same
//! rule: one entry per key, registered once during startup, read-only while
//! worlds and loops run. Registering a key twice is a contract violation.
//!
//! Process-wide instances are created lazily on first access:
//!
//! ```
//! use pooled_ecs::registry;
//!
//! #[derive(Default)]
//! struct Velocity(f32, f32);
//!
//! let key = registry::components().write().register::<Velocity>(1024).unwrap();
//! assert_eq!(registry::components().read().key_of::<Velocity>(), Some(key));
//! ```
//!
//! Worlds take a registry by reference when they are built, so tests and
//! tools can use local registries instead of the global ones.

use std::any::TypeId;
use std::fmt;
use std::hash::Hash;
use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::assets::AssetFactoryRegistry;
use crate::component::{Component, ComponentDescriptor, ComponentKey, ComponentVTable};
use crate::error::{EcsError, Result};
use crate::report;
use crate::system::SystemRegistry;

/// Keyed set of factory entries.
#[derive(Clone)]
pub struct Registry<K, E> {
    label: &'static str,
    entries: FxHashMap<K, E>,
}

impl<K: Copy + Eq + Hash + fmt::Debug, E> Registry<K, E> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, key: K, entry: E) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(report!(EcsError::AlreadyRegistered(format!(
                "{} {key:?}",
                self.label
            ))));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn unregister(&mut self, key: K) -> Option<E> {
        self.entries.remove(&key)
    }

    pub fn get(&self, key: K) -> Option<&E> {
        self.entries.get(&key)
    }

    /// Like [`get`](Self::get) but raises `NotRegistered` when absent.
    pub fn require(&self, key: K) -> Result<&E> {
        self.entries.get(&key).ok_or_else(|| {
            report!(EcsError::NotRegistered(format!("{} {key:?}", self.label)))
        })
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, E> fmt::Debug for Registry<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.label)
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Component types known to the process: factory plus max live count.
///
/// Keys are assigned densely in registration order.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    descriptors: Vec<ComponentDescriptor>,
    by_type: FxHashMap<TypeId, ComponentKey>,
    by_name: FxHashMap<&'static str, ComponentKey>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` with a budget of `max_count` live instances per world.
    pub fn register<T: Component>(&mut self, max_count: usize) -> Result<ComponentKey> {
        let vtable = ComponentVTable::of::<T>();
        if self.by_type.contains_key(&vtable.type_id()) {
            return Err(report!(EcsError::AlreadyRegistered(format!(
                "component {}",
                vtable.name()
            ))));
        }

        let key = ComponentKey(self.descriptors.len() as u32);
        self.descriptors.push(ComponentDescriptor {
            key,
            vtable,
            max_count,
        });
        self.by_type.insert(vtable.type_id(), key);
        self.by_name.entry(vtable.name()).or_insert(key);

        tracing::debug!(component = vtable.name(), %key, max_count, "registered component");
        Ok(key)
    }

    pub fn key_of<T: Component>(&self) -> Option<ComponentKey> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn key_by_name(&self, name: &str) -> Option<ComponentKey> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor(&self, key: ComponentKey) -> Option<&ComponentDescriptor> {
        self.descriptors.get(key.index())
    }

    /// Change the budget of a registered type. Only affects worlds built
    /// afterwards.
    pub fn set_max_count(&mut self, key: ComponentKey, max_count: usize) -> Result<()> {
        match self.descriptors.get_mut(key.index()) {
            Some(descriptor) => {
                descriptor.max_count = max_count;
                Ok(())
            }
            None => Err(report!(EcsError::UnknownComponent(key.to_string()))),
        }
    }

    pub fn descriptors(&self) -> &[ComponentDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Process-wide component registry.
pub fn components() -> &'static RwLock<ComponentRegistry> {
    static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(ComponentRegistry::new()))
}

/// Process-wide system registry.
pub fn systems() -> &'static RwLock<SystemRegistry> {
    static REGISTRY: OnceLock<RwLock<SystemRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(SystemRegistry::new()))
}

/// Process-wide asset factory registry.
pub fn asset_factories() -> &'static RwLock<AssetFactoryRegistry> {
    static REGISTRY: OnceLock<RwLock<AssetFactoryRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(AssetFactoryRegistry::new()))
}
