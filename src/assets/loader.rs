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

//! File loaders and built-in asset factories

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use super::{Asset, AssetFactory};
use crate::error::{EcsError, Result};
use crate::report;

/// Raw bytes of one loaded file. Opaque to the ECS.
#[derive(Clone, Debug)]
pub struct FileData {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl FileData {
    pub fn new(path: PathBuf, bytes: Vec<u8>) -> Self {
        Self { path, bytes }
    }

    /// Contents as UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes).map_err(|err| {
            report!(EcsError::ParseError(format!(
                "{}: {err}",
                self.path.display()
            )))
        })
    }
}

/// Reads files for asset factories.
///
/// Failures are recoverable: they come back as `Err` and the caller skips
/// or retries the asset.
pub trait FileLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<FileData>;
}

/// Loads files from disk relative to a base directory.
#[derive(Debug, Clone)]
pub struct FsFileLoader {
    base_path: PathBuf,
}

impl FsFileLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl FileLoader for FsFileLoader {
    fn load(&self, path: &Path) -> Result<FileData> {
        let full_path = self.base_path.join(path);
        let bytes = std::fs::read(&full_path).map_err(|err| {
            let err = match err.kind() {
                std::io::ErrorKind::NotFound => {
                    EcsError::FileNotFound(full_path.display().to_string())
                }
                _ => EcsError::IoError(format!("{}: {err}", full_path.display())),
            };
            report!(err)
        })?;
        Ok(FileData::new(path.to_path_buf(), bytes))
    }
}

/// In-memory file table, for tests and embedded data.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileLoader {
    files: FxHashMap<PathBuf, Vec<u8>>,
}

impl MemoryFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), bytes.into());
        self
    }
}

impl FileLoader for MemoryFileLoader {
    fn load(&self, path: &Path) -> Result<FileData> {
        match self.files.get(path) {
            Some(bytes) => Ok(FileData::new(path.to_path_buf(), bytes.clone())),
            None => Err(report!(EcsError::FileNotFound(path.display().to_string()))),
        }
    }
}

/// Simple binary data asset
#[derive(Clone, Debug)]
pub struct BinaryAsset {
    pub data: Vec<u8>,
    pub path: PathBuf,
}

impl Asset for BinaryAsset {
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.data.len()
    }
}

/// Binary asset factory
pub struct BinaryFactory;

impl AssetFactory for BinaryFactory {
    type Asset = BinaryAsset;
    type Staging = ();

    fn prepare(&self) -> Self::Staging {}

    fn create(&self, data: &FileData, _staging: &Self::Staging) -> Result<Self::Asset> {
        Ok(BinaryAsset {
            data: data.bytes.clone(),
            path: data.path.clone(),
        })
    }
}

/// JSON data asset
#[derive(Clone, Debug)]
pub struct JsonAsset {
    pub value: serde_json::Value,
    pub path: PathBuf,
}

impl Asset for JsonAsset {}

/// JSON asset factory
pub struct JsonFactory;

impl AssetFactory for JsonFactory {
    type Asset = JsonAsset;
    type Staging = ();

    fn prepare(&self) -> Self::Staging {}

    fn create(&self, data: &FileData, _staging: &Self::Staging) -> Result<Self::Asset> {
        let value: serde_json::Value = serde_json::from_slice(&data.bytes).map_err(|err| {
            report!(EcsError::ParseError(format!(
                "{}: {err}",
                data.path.display()
            )))
        })?;

        Ok(JsonAsset {
            value,
            path: data.path.clone(),
        })
    }
}

/// Text asset
#[derive(Clone, Debug)]
pub struct TextAsset {
    pub text: String,
    pub path: PathBuf,
}

impl Asset for TextAsset {
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.text.len()
    }
}

/// Text asset factory
pub struct TextFactory;

impl AssetFactory for TextFactory {
    type Asset = TextAsset;
    type Staging = ();

    fn prepare(&self) -> Self::Staging {}

    fn create(&self, data: &FileData, _staging: &Self::Staging) -> Result<Self::Asset> {
        Ok(TextAsset {
            text: data.text()?.to_string(),
            path: data.path.clone(),
        })
    }
}
