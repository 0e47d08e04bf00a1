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

//! Asset factories and their registry

use std::any::{Any, TypeId};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{AnyAsset, Asset, FileData};
use crate::component::short_type_name;
use crate::error::{EcsError, Result};
use crate::registry::Registry;
use crate::report;

/// Key of a registered asset factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetFactoryKey(pub u32);

/// Builds assets of one type from loaded file data.
///
/// `create` may be called from several threads at once with the same
/// staging object, so staging state that accumulates must use interior
/// locking. `commit` runs once, after every `create` of the batch.
pub trait AssetFactory: Send + Sync + 'static {
    type Asset: Asset;
    type Staging: Send + Sync + 'static;

    fn prepare(&self) -> Self::Staging;

    fn create(&self, data: &FileData, staging: &Self::Staging) -> Result<Self::Asset>;

    fn commit(&self, staging: Self::Staging) -> Result<()> {
        drop(staging);
        Ok(())
    }
}

pub(crate) type ErasedStaging = Box<dyn Any + Send + Sync>;

/// Wrapper trait for type-erased factories
pub(crate) trait ErasedAssetFactory: Send + Sync {
    fn prepare(&self) -> ErasedStaging;
    fn create(
        &self,
        data: &FileData,
        staging: &(dyn Any + Send + Sync),
    ) -> Result<Box<dyn AnyAsset>>;
    fn commit(&self, staging: ErasedStaging) -> Result<()>;
    fn name(&self) -> &'static str;
}

struct TypedAssetFactory<F: AssetFactory> {
    factory: F,
}

impl<F: AssetFactory> ErasedAssetFactory for TypedAssetFactory<F> {
    fn prepare(&self) -> ErasedStaging {
        Box::new(self.factory.prepare())
    }

    fn create(
        &self,
        data: &FileData,
        staging: &(dyn Any + Send + Sync),
    ) -> Result<Box<dyn AnyAsset>> {
        let staging = staging.downcast_ref::<F::Staging>().ok_or_else(|| {
            report!(EcsError::AssetLoadError(format!(
                "{}: staging type mismatch",
                self.name()
            )))
        })?;
        let asset = self.factory.create(data, staging)?;
        Ok(Box::new(asset))
    }

    fn commit(&self, staging: ErasedStaging) -> Result<()> {
        match staging.downcast::<F::Staging>() {
            Ok(staging) => self.factory.commit(*staging),
            Err(_) => Err(report!(EcsError::AssetLoadError(format!(
                "{}: staging type mismatch",
                self.name()
            )))),
        }
    }

    fn name(&self) -> &'static str {
        short_type_name::<F>()
    }
}

/// Asset factories known to the process.
pub struct AssetFactoryRegistry {
    factories: Registry<AssetFactoryKey, Arc<dyn ErasedAssetFactory>>,
    by_type: FxHashMap<TypeId, AssetFactoryKey>,
}

impl AssetFactoryRegistry {
    pub fn new() -> Self {
        Self {
            factories: Registry::new("asset factory"),
            by_type: FxHashMap::default(),
        }
    }

    pub fn register<F: AssetFactory>(&mut self, factory: F) -> Result<AssetFactoryKey> {
        if self.by_type.contains_key(&TypeId::of::<F>()) {
            return Err(report!(EcsError::AlreadyRegistered(format!(
                "asset factory {}",
                short_type_name::<F>()
            ))));
        }
        let key = AssetFactoryKey(self.factories.len() as u32);
        self.factories
            .register(key, Arc::new(TypedAssetFactory { factory }))?;
        self.by_type.insert(TypeId::of::<F>(), key);
        Ok(key)
    }

    pub fn key_of<F: AssetFactory>(&self) -> Option<AssetFactoryKey> {
        self.by_type.get(&TypeId::of::<F>()).copied()
    }

    pub(crate) fn get(&self, key: AssetFactoryKey) -> Result<Arc<dyn ErasedAssetFactory>> {
        self.factories.require(key).cloned()
    }

    pub fn contains(&self, key: AssetFactoryKey) -> bool {
        self.factories.contains(key)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for AssetFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AssetFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetFactoryRegistry")
            .field("len", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{TextAsset, TextFactory};
    use std::path::PathBuf;

    #[test]
    fn test_register_once() {
        let mut registry = AssetFactoryRegistry::new();
        let key = registry.register(TextFactory).unwrap();
        assert_eq!(registry.key_of::<TextFactory>(), Some(key));
        assert!(registry.register(TextFactory).is_err());
    }

    #[test]
    fn test_erased_protocol() {
        let mut registry = AssetFactoryRegistry::new();
        let key = registry.register(TextFactory).unwrap();
        let factory = registry.get(key).unwrap();

        let staging = factory.prepare();
        let data = FileData::new(PathBuf::from("hello.txt"), b"hello".to_vec());
        let asset = factory.create(&data, staging.as_ref()).unwrap();
        factory.commit(staging).unwrap();

        let text = asset.as_any().downcast_ref::<TextAsset>().unwrap();
        assert_eq!(text.text, "hello");
    }
}
