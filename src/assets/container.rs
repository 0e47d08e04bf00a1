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

//! Reference-counted asset storage

use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use super::{AnyAsset, Asset, AssetHandle, AssetSourceKey};
use crate::error::{EcsError, Result};
use crate::report;

new_key_type! {
    /// Generational id of a loaded asset.
    pub struct AssetId;
}

/// Container shared between the game loop and loader threads.
pub type SharedAssets = Arc<AssetContainer>;

struct AssetEntry {
    asset: Box<dyn AnyAsset>,
    source: Option<AssetSourceKey>,
    refs: usize,
}

#[derive(Default)]
struct AssetStore {
    entries: SlotMap<AssetId, AssetEntry>,
    by_source: FxHashMap<AssetSourceKey, AssetId>,
}

/// Loaded assets keyed by [`AssetId`].
///
/// Every access goes through the container's own lock. `get` and `get_mut`
/// return guards: drop them before the end of the current scope, and never
/// hold one across a tick.
#[derive(Default)]
pub struct AssetContainer {
    store: RwLock<AssetStore>,
}

impl AssetContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedAssets {
        Arc::new(self)
    }

    /// Insert an asset with a reference count of one.
    pub fn insert<A: Asset>(&self, asset: A) -> AssetHandle<A> {
        let mut store = self.store.write();
        AssetHandle::new(Self::insert_entry(&mut store, Box::new(asset), None))
    }

    /// Insert an asset built from `source`.
    ///
    /// If another thread resident-loaded the same source in the meantime, the
    /// existing asset gains a reference and `asset` is dropped. Returns the
    /// id and whether it was already resident.
    pub(crate) fn insert_from_source(
        &self,
        asset: Box<dyn AnyAsset>,
        source: AssetSourceKey,
    ) -> (AssetId, bool) {
        let mut store = self.store.write();
        let resident = store.by_source.get(&source).copied();
        if let Some(id) = resident {
            if let Some(entry) = store.entries.get_mut(id) {
                entry.refs += 1;
                tracing::debug!(asset = asset.asset_name(), ?id, "source already resident");
                return (id, true);
            }
        }
        (Self::insert_entry(&mut store, asset, Some(source)), false)
    }

    fn insert_entry(
        store: &mut AssetStore,
        asset: Box<dyn AnyAsset>,
        source: Option<AssetSourceKey>,
    ) -> AssetId {
        let name = asset.asset_name();
        let id = store.entries.insert(AssetEntry {
            asset,
            source,
            refs: 1,
        });
        if let Some(source) = source {
            store.by_source.insert(source, id);
        }
        tracing::debug!(asset = name, ?id, "asset inserted");
        id
    }

    /// Read access to an asset, held until the guard is dropped.
    pub fn get<A: Asset>(&self, handle: AssetHandle<A>) -> Result<MappedRwLockReadGuard<'_, A>> {
        let id = handle.id();
        RwLockReadGuard::try_map(self.store.read(), |store| {
            store.entries.get(id)?.asset.as_any().downcast_ref::<A>()
        })
        .map_err(|_| report!(EcsError::AssetNotFound(format!("{id:?}"))))
    }

    /// Write access to an asset, held until the guard is dropped.
    pub fn get_mut<A: Asset>(
        &self,
        handle: AssetHandle<A>,
    ) -> Result<MappedRwLockWriteGuard<'_, A>> {
        let id = handle.id();
        RwLockWriteGuard::try_map(self.store.write(), |store| {
            store
                .entries
                .get_mut(id)?
                .asset
                .as_any_mut()
                .downcast_mut::<A>()
        })
        .map_err(|_| report!(EcsError::AssetNotFound(format!("{id:?}"))))
    }

    /// Typed handle for `id` if it holds an `A`.
    pub fn typed<A: Asset>(&self, id: AssetId) -> Option<AssetHandle<A>> {
        let store = self.store.read();
        let entry = store.entries.get(id)?;
        entry
            .asset
            .as_any()
            .is::<A>()
            .then(|| AssetHandle::new(id))
    }

    /// Asset loaded from `source`, if it is still resident.
    pub fn find_by_source(&self, source: AssetSourceKey) -> Option<AssetId> {
        self.store.read().by_source.get(&source).copied()
    }

    /// Take another reference. Returns the new count.
    pub fn add_ref(&self, id: AssetId) -> Result<usize> {
        let mut store = self.store.write();
        match store.entries.get_mut(id) {
            Some(entry) => {
                entry.refs += 1;
                Ok(entry.refs)
            }
            None => Err(report!(EcsError::AssetNotFound(format!("{id:?}")))),
        }
    }

    /// Drop one reference. The asset is unloaded when the count reaches
    /// zero. Returns the remaining count.
    pub fn release(&self, id: AssetId) -> Result<usize> {
        let mut store = self.store.write();
        let entry = store
            .entries
            .get_mut(id)
            .ok_or_else(|| report!(EcsError::AssetNotFound(format!("{id:?}"))))?;
        entry.refs -= 1;
        let remaining = entry.refs;

        if remaining == 0 {
            if let Some(mut entry) = store.entries.remove(id) {
                entry.asset.unload();
                if let Some(source) = entry.source {
                    store.by_source.remove(&source);
                }
                tracing::debug!(asset = entry.asset.asset_name(), ?id, "asset unloaded");
            }
        }
        Ok(remaining)
    }

    pub fn ref_count(&self, id: AssetId) -> Option<usize> {
        self.store.read().entries.get(id).map(|entry| entry.refs)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.store.read().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.store.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().entries.is_empty()
    }

    /// Approximate bytes held by resident assets.
    pub fn memory_usage(&self) -> usize {
        self.store
            .read()
            .entries
            .values()
            .map(|entry| entry.asset.asset_size())
            .sum()
    }
}

impl std::fmt::Debug for AssetContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetContainer")
            .field("len", &self.len())
            .finish()
    }
}
