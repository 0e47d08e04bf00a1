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

//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use pooled_ecs::prelude::*;
//! ```

pub use crate::assets::{
    Asset, AssetContainer, AssetFactory, AssetFactoryRegistry, AssetHandle, AssetId,
    AssetServer, AssetSource, AssetSourceKey, AssetSourceRegistry, FileData, SharedAssets,
};
pub use crate::command::{Command, CommandContext, CommandQueue, LoopCommand};
pub use crate::component::{Component, ComponentHandle, ComponentKey};
pub use crate::config::EcsConfig;
pub use crate::debug::{Diagnostics, WorldInspector};
pub use crate::entity::{Entity, GenerationId};
pub use crate::error::{EcsError, ErrorCategory, Result};
pub use crate::game_loop::{GameLoop, GameLoopHandle, LoopExit};
pub use crate::input::{Input, InputState, KeyCode, MouseButton, SharedInput};
pub use crate::pool::{FixedBlockPoolFactory, PoolFactory};
pub use crate::prefab::{Prefab, PrefabTarget};
pub use crate::registry::ComponentRegistry;
pub use crate::staging::StagingArea;
pub use crate::system::{
    Flow, OrderedSystemListFactory, System, SystemKey, SystemList, SystemRegistry,
};
pub use crate::system_loop::{LoopConfig, LoopState, SystemLoop};
pub use crate::transform::{GlobalTransform, Parent, Transform, TransformSystem};
pub use crate::view::{Payloads, View};
pub use crate::world::{SharedWorld, World, WorldBuilder};
