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

//! Pooled ECS - fixed-capacity Entity Component System runtime
//!
//! Components live in per-type pools sized once when the world is built.
//! Entities are generational ids. Systems run in a fixed order on one loop
//! thread and defer structural changes to a command queue; loader threads
//! build entities in private staging areas and commit them between ticks.

pub mod assets;
pub mod command;
pub mod component;
pub mod config;
pub mod debug;
pub mod entity;
pub mod error;
pub mod game_loop;
pub mod input;
#[cfg(feature = "logging")]
pub mod logging;
pub mod pool;
pub mod prefab;
pub mod prelude;
pub mod registry;
pub mod staging;
pub mod system;
pub mod system_loop;
pub mod transform;
pub mod view;
pub mod world;

pub use command::*;
pub use component::*;
pub use entity::*;
pub use error::*;
pub use game_loop::*;
pub use pool::*;
pub use staging::*;
pub use system::*;
pub use system_loop::*;
pub use view::*;
pub use world::*;
