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

//! Asset loading with a prepare / create / commit protocol
//!
//! - [`AssetFactory`] turns opaque [`FileData`] into an asset in three
//!   phases: `prepare` makes a staging object, `create` runs once per file
//!   (possibly in parallel) and `commit` does the serialized bookkeeping.
//! - [`AssetContainer`] owns loaded assets with reference counts and hands
//!   out scoped read/write guards.
//! - [`AssetServer`] drives a batch of [`AssetSource`]s through the
//!   protocol.

mod container;
mod factory;
mod loader;
mod server;

pub use container::{AssetContainer, AssetId, SharedAssets};
pub use factory::{AssetFactory, AssetFactoryKey, AssetFactoryRegistry};
pub use loader::{
    BinaryAsset, BinaryFactory, FileData, FileLoader, FsFileLoader, JsonAsset, JsonFactory,
    MemoryFileLoader, TextAsset, TextFactory,
};
pub use server::{AssetServer, AssetSource, AssetSourceKey, AssetSourceRegistry, LoadReport};

use std::any::Any;
use std::marker::PhantomData;

/// Trait for assets that can be loaded
pub trait Asset: Send + Sync + 'static {
    /// Get asset type name
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Get approximate memory size in bytes
    fn memory_size(&self) -> usize {
        std::mem::size_of_val(self)
    }

    /// Called when the last reference is released
    fn on_unload(&mut self) {}
}

/// Object-safe view of an [`Asset`] used by the container.
pub(crate) trait AnyAsset: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn asset_name(&self) -> &'static str;
    fn asset_size(&self) -> usize;
    fn unload(&mut self);
}

impl<T: Asset> AnyAsset for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn asset_name(&self) -> &'static str {
        Asset::type_name(self)
    }

    fn asset_size(&self) -> usize {
        Asset::memory_size(self)
    }

    fn unload(&mut self) {
        Asset::on_unload(self)
    }
}

/// Typed handle to an asset in an [`AssetContainer`]
pub struct AssetHandle<T: Asset> {
    id: AssetId,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Asset> AssetHandle<T> {
    pub(crate) fn new(id: AssetId) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }
}

impl<T: Asset> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Asset> Copy for AssetHandle<T> {}

impl<T: Asset> PartialEq for AssetHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: Asset> Eq for AssetHandle<T> {}

impl<T: Asset> std::hash::Hash for AssetHandle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: Asset> std::fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AssetHandle").field(&self.id).finish()
    }
}
