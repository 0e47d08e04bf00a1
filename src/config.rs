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

//! Runtime configuration, loaded once at startup.
//!
//! ```
//! use pooled_ecs::config::EcsConfig;
//!
//! let config = EcsConfig::from_json_str(r#"{
//!     "components": { "Health": 2 },
//!     "game_loop": { "max_ticks": 600, "tick_interval_ms": 16 },
//!     "logging": { "level": "debug" }
//! }"#).unwrap();
//! assert_eq!(config.components["Health"], 2);
//! assert_eq!(config.game_loop.max_ticks, Some(600));
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};
use crate::registry::ComponentRegistry;
use crate::report;
use crate::system_loop::LoopConfig;

/// Log output options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `pooled_ecs=debug`
    pub level: String,
    /// One JSON object per line instead of the human format
    pub json: bool,
    /// Also write to daily-rotated files in this directory
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Max live count overrides by component type name
    pub components: BTreeMap<String, usize>,
    pub game_loop: LoopConfig,
    pub logging: LoggingConfig,
    /// Ticks between transform propagations
    pub transform_update_interval: u32,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            components: BTreeMap::new(),
            game_loop: LoopConfig::default(),
            logging: LoggingConfig::default(),
            transform_update_interval: 1,
        }
    }
}

impl EcsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| report!(EcsError::ConfigError(err.to_string())))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            report!(EcsError::ConfigError(format!("{}: {err}", path.display())))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| report!(EcsError::ConfigError(err.to_string())))
    }

    /// Apply the component budget overrides. Call before building worlds.
    ///
    /// Names must match registered component types.
    pub fn apply_to(&self, registry: &mut ComponentRegistry) -> Result<()> {
        for (name, &max_count) in &self.components {
            let key = registry.key_by_name(name).ok_or_else(|| {
                report!(EcsError::ConfigError(format!("unknown component {name}")))
            })?;
            registry.set_max_count(key, max_count)?;
            tracing::debug!(component = %name, max_count, "component budget overridden");
        }
        Ok(())
    }
}
