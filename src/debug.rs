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

//! World inspection and tick diagnostics

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::component::ComponentKey;
use crate::entity::Entity;
use crate::system_loop::TickProfile;
use crate::world::World;

/// Pool usage of one component type
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentUsage {
    pub key: u32,
    pub name: &'static str,
    pub live: usize,
    pub capacity: usize,
    /// Entities in the type's view
    pub viewed: usize,
}

impl ComponentUsage {
    pub fn is_full(&self) -> bool {
        self.live >= self.capacity
    }
}

/// Snapshot of a world's occupancy
#[derive(Clone, Debug, Serialize)]
pub struct WorldSummary {
    pub entities: usize,
    pub components: Vec<ComponentUsage>,
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== World Summary ===")?;
        writeln!(f, "Entities: {}", self.entities)?;
        for usage in &self.components {
            writeln!(
                f,
                "  {:<24} {:>6}/{:<6} view {}",
                usage.name, usage.live, usage.capacity, usage.viewed
            )?;
        }
        Ok(())
    }
}

/// World inspector for debugging
pub struct WorldInspector;

impl WorldInspector {
    pub fn summary(world: &World) -> WorldSummary {
        let components = world
            .component_keys()
            .map(|key| Self::usage(world, key))
            .collect();
        WorldSummary {
            entities: world.entity_count(),
            components,
        }
    }

    fn usage(world: &World, key: ComponentKey) -> ComponentUsage {
        ComponentUsage {
            key: key.0,
            name: world.component_name(key).unwrap_or("?"),
            live: world.live_count(key).unwrap_or(0),
            capacity: world.capacity(key).unwrap_or(0),
            viewed: world.view(key).map(|view| view.len()).unwrap_or(0),
        }
    }

    /// Component types close to their budget (`threshold` in 0..=1).
    pub fn near_capacity(world: &World, threshold: f32) -> Vec<ComponentUsage> {
        Self::summary(world)
            .components
            .into_iter()
            .filter(|usage| {
                usage.capacity > 0 && usage.live as f32 >= usage.capacity as f32 * threshold
            })
            .collect()
    }

    /// Names of the components an entity holds, or `None` if it is dead.
    pub fn describe_entity(world: &World, entity: Entity) -> Option<Vec<&'static str>> {
        if !world.entity_exists(entity) {
            return None;
        }
        let keys = world.components_of(entity).ok()?;
        let mut names: Vec<_> = keys
            .iter()
            .filter_map(|key| world.component_name(*key))
            .collect();
        names.sort_unstable();
        Some(names)
    }

    /// Emit the summary as `tracing` events
    pub fn log_summary(world: &World) {
        let summary = Self::summary(world);
        tracing::info!(entities = summary.entities, "world summary");
        for usage in &summary.components {
            tracing::info!(
                component = usage.name,
                live = usage.live,
                capacity = usage.capacity,
                "component usage"
            );
        }
    }
}

/// Rolling tick timing window
#[derive(Clone, Debug)]
pub struct Diagnostics {
    tick_times: VecDeque<Duration>,
    max_samples: usize,
}

impl Diagnostics {
    pub fn new(max_samples: usize) -> Self {
        Self {
            tick_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, tick_time: Duration) {
        self.tick_times.push_back(tick_time);
        if self.tick_times.len() > self.max_samples {
            self.tick_times.pop_front();
        }
    }

    pub fn record_profile(&mut self, profile: &TickProfile) {
        self.record(profile.total_time);
    }

    pub fn avg_tick_time(&self) -> Duration {
        if self.tick_times.is_empty() {
            return Duration::ZERO;
        }
        self.tick_times.iter().sum::<Duration>() / self.tick_times.len() as u32
    }

    /// Ticks per second implied by the average tick time
    pub fn tick_rate(&self) -> f64 {
        let avg = self.avg_tick_time().as_secs_f64();
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    pub fn min_tick_time(&self) -> Duration {
        self.tick_times.iter().copied().min().unwrap_or_default()
    }

    pub fn max_tick_time(&self) -> Duration {
        self.tick_times.iter().copied().max().unwrap_or_default()
    }

    pub fn samples(&self) -> usize {
        self.tick_times.len()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(60)
    }
}
