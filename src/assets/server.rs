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

//! Batch asset loading through the factory protocol

use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::factory::ErasedAssetFactory;
use super::{AssetContainer, AssetFactoryKey, AssetFactoryRegistry, AssetId, FileData};
use super::{FileLoader, FsFileLoader};
use crate::error::{EcsError, Result};
use crate::registry::Registry;

/// Key of a registered asset source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetSourceKey(pub u32);

/// Where an asset comes from and which factory builds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub path: PathBuf,
    pub factory: AssetFactoryKey,
}

pub type AssetSourceRegistry = Registry<AssetSourceKey, AssetSource>;

/// Outcome of [`AssetServer::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Newly created assets
    pub loaded: Vec<(AssetSourceKey, AssetId)>,
    /// Already resident assets whose reference count was bumped
    pub reused: Vec<(AssetSourceKey, AssetId)>,
    /// Recoverable failures, skipped
    pub failed: Vec<(AssetSourceKey, EcsError)>,
}

impl LoadReport {
    /// Asset id for `source` from this batch.
    pub fn id_of(&self, source: AssetSourceKey) -> Option<AssetId> {
        self.loaded
            .iter()
            .chain(&self.reused)
            .find(|(key, _)| *key == source)
            .map(|(_, id)| *id)
    }
}

/// Drives asset sources through read, prepare, create and commit.
pub struct AssetServer {
    file_loader: Arc<dyn FileLoader>,
}

struct FactoryBatch {
    factory: Arc<dyn ErasedAssetFactory>,
    files: Vec<(AssetSourceKey, FileData)>,
}

impl AssetServer {
    /// Create new asset server reading from `base_path`
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self::with_loader(FsFileLoader::new(base_path))
    }

    pub fn with_loader(loader: impl FileLoader + 'static) -> Self {
        Self {
            file_loader: Arc::new(loader),
        }
    }

    /// Load `keys` into `container`.
    ///
    /// Sources already resident, or listed more than once, get their
    /// reference count bumped instead of being loaded again. File and parse failures are collected in the
    /// report; unknown source or factory keys are errors.
    pub fn load(
        &self,
        keys: &[AssetSourceKey],
        sources: &AssetSourceRegistry,
        factories: &AssetFactoryRegistry,
        container: &AssetContainer,
    ) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut pending = Vec::new();
        // Extra occurrences of a pending key within this batch
        let mut repeats: FxHashMap<AssetSourceKey, usize> = FxHashMap::default();

        for &key in keys {
            let source = sources.require(key)?;
            if let Some(count) = repeats.get_mut(&key) {
                *count += 1;
                continue;
            }
            match container.find_by_source(key) {
                Some(id) => {
                    container.add_ref(id)?;
                    report.reused.push((key, id));
                }
                None => {
                    pending.push((key, source));
                    repeats.insert(key, 0);
                }
            }
        }

        let files = self.read_files(&pending);

        let mut batches: Vec<FactoryBatch> = Vec::new();
        let mut batch_index: FxHashMap<AssetFactoryKey, usize> = FxHashMap::default();
        for ((key, source), file) in pending.iter().zip(files) {
            let data = match file {
                Ok(data) => data,
                Err(err) => {
                    report.failed.push((*key, err));
                    continue;
                }
            };
            let index = match batch_index.get(&source.factory) {
                Some(index) => *index,
                None => {
                    batches.push(FactoryBatch {
                        factory: factories.get(source.factory)?,
                        files: Vec::new(),
                    });
                    batch_index.insert(source.factory, batches.len() - 1);
                    batches.len() - 1
                }
            };
            batches[index].files.push((*key, data));
        }

        for batch in batches {
            let staging = batch.factory.prepare();

            #[cfg(feature = "parallel")]
            let files = batch.files.par_iter();
            #[cfg(not(feature = "parallel"))]
            let files = batch.files.iter();

            let created: Vec<_> = files
                .map(|(key, data)| (*key, batch.factory.create(data, staging.as_ref())))
                .collect();

            batch.factory.commit(staging)?;

            for (key, asset) in created {
                match asset {
                    Ok(asset) => {
                        let (id, resident) = container.insert_from_source(asset, key);
                        if resident {
                            report.reused.push((key, id));
                        } else {
                            report.loaded.push((key, id));
                        }
                        for _ in 0..repeats.get(&key).copied().unwrap_or(0) {
                            container.add_ref(id)?;
                            report.reused.push((key, id));
                        }
                    }
                    Err(err) if !err.is_fatal() => report.failed.push((key, err)),
                    Err(err) => return Err(err),
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            "asset batch finished"
        );
        Ok(report)
    }

    /// Drop one reference for each resident source in `keys`. Returns how
    /// many assets were unloaded.
    pub fn release(&self, keys: &[AssetSourceKey], container: &AssetContainer) -> Result<usize> {
        let mut unloaded = 0;
        for &key in keys {
            if let Some(id) = container.find_by_source(key) {
                if container.release(id)? == 0 {
                    unloaded += 1;
                }
            }
        }
        Ok(unloaded)
    }

    fn read_files(&self, pending: &[(AssetSourceKey, &AssetSource)]) -> Vec<Result<FileData>> {
        #[cfg(feature = "parallel")]
        let jobs = pending.par_iter();
        #[cfg(not(feature = "parallel"))]
        let jobs = pending.iter();

        jobs.map(|(_, source)| self.file_loader.load(&source.path))
            .collect()
    }
}
