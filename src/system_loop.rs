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

//! System loop: ordered ticks plus the deferred command drain
//!
//! A tick runs every system of the list in order, then applies the commands
//! queued during the tick. Commands queued before the first tick (creating
//! systems, setting the order) are applied before it starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::assets::{AssetContainer, SharedAssets};
use crate::command::{CommandContext, CommandQueue};
use crate::error::{EcsError, Result};
use crate::report;
use crate::system::{Flow, SystemKey, SystemList, SystemListFactory, SystemRegistry};
use crate::world::{SharedWorld, World};

/// Lifecycle of a [`SystemLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

/// Loop pacing and bookkeeping options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Stop after this many ticks
    pub max_ticks: Option<u64>,
    /// Minimum time between tick starts, 0 for none
    pub tick_interval_ms: u64,
    /// Name of the game loop worker thread
    pub thread_name: String,
    /// Collect per-system timings
    pub profile: bool,
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_ticks: None,
            tick_interval_ms: 0,
            thread_name: "game-loop".to_string(),
            profile: false,
        }
    }
}

/// Aggregated timings of one system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulated {
    min: Duration,
    max: Duration,
    total: Duration,
    calls: u64,
}

/// System profiler for collecting timing data
#[derive(Debug, Default)]
pub struct SystemProfiler {
    stats: FxHashMap<SystemKey, Accumulated>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&mut self, key: SystemKey, duration: Duration) {
        let entry = self.stats.entry(key).or_insert(Accumulated {
            min: duration,
            ..Accumulated::default()
        });
        entry.min = entry.min.min(duration);
        entry.max = entry.max.max(duration);
        entry.total += duration;
        entry.calls += 1;
    }

    pub fn get_stats(&self, key: SystemKey) -> Option<SystemStats> {
        let acc = self.stats.get(&key)?;
        if acc.calls == 0 {
            return None;
        }
        Some(SystemStats {
            min: acc.min,
            max: acc.max,
            avg: acc.total / acc.calls as u32,
            call_count: acc.calls,
        })
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }
}

/// Per-system timing data for a single tick
#[derive(Debug, Clone)]
pub struct SystemTiming {
    pub key: SystemKey,
    pub name: &'static str,
    pub duration: Duration,
}

/// Timings of one tick
#[derive(Debug, Clone)]
pub struct TickProfile {
    pub tick: u64,
    pub total_time: Duration,
    pub drain_time: Duration,
    pub commands_applied: usize,
    pub system_timings: Vec<SystemTiming>,
}

/// Drives a [`SystemList`] tick by tick.
pub struct SystemLoop {
    state: LoopState,
    registry: SystemRegistry,
    list_factory: Option<Box<dyn SystemListFactory>>,
    systems: SystemList,
    commands: Arc<CommandQueue>,
    config: LoopConfig,
    profiler: SystemProfiler,
    last_profile: Option<TickProfile>,
    ticks: u64,
}

impl SystemLoop {
    /// Create a loop creating systems from `registry`.
    ///
    /// The loop is not ready until a list factory is set.
    pub fn new(registry: SystemRegistry) -> Self {
        Self {
            state: LoopState::Uninitialized,
            registry,
            list_factory: None,
            systems: SystemList::new(),
            commands: Arc::new(CommandQueue::new()),
            config: LoopConfig::default(),
            profiler: SystemProfiler::new(),
            last_profile: None,
            ticks: 0,
        }
    }

    /// Create a loop over a snapshot of the process-wide system registry.
    pub fn from_global() -> Self {
        Self::new(crate::registry::systems().read().clone())
    }

    pub fn with_list_factory(mut self, factory: impl SystemListFactory + 'static) -> Self {
        self.set_list_factory(factory);
        self
    }

    pub fn set_list_factory(&mut self, factory: impl SystemListFactory + 'static) {
        self.list_factory = Some(Box::new(factory));
    }

    /// Share `queue` with producers outside the loop.
    pub fn with_queue(mut self, queue: Arc<CommandQueue>) -> Self {
        self.commands = queue;
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.list_factory.is_some()
    }

    /// Build the system list. Required once before the first tick; calling
    /// it again on a stopped loop starts over with a fresh list.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state == LoopState::Running {
            return Err(report!(EcsError::LoopNotReady(
                "cannot initialize a running loop".into()
            )));
        }
        let factory = self.list_factory.as_ref().ok_or_else(|| {
            report!(EcsError::LoopNotReady("system list factory is not set".into()))
        })?;

        self.systems = factory.create(&self.registry)?;
        self.state = LoopState::Ready;
        self.ticks = 0;
        self.last_profile = None;

        tracing::info!(systems = self.systems.count(), "system loop initialized");
        Ok(())
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Queue for deferred commands; clone the `Arc` to enqueue from elsewhere.
    pub fn commands(&self) -> &Arc<CommandQueue> {
        &self.commands
    }

    pub fn systems(&self) -> &SystemList {
        &self.systems
    }

    pub fn systems_mut(&mut self) -> &mut SystemList {
        &mut self.systems
    }

    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Ticks completed since the last `initialize`
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    /// Get the most recent tick profile (only with `LoopConfig::profile`)
    pub fn last_profile(&self) -> Option<&TickProfile> {
        self.last_profile.as_ref()
    }

    /// Run one tick.
    ///
    /// Returns `Flow::Stop` once the loop has ended: a system asked to stop,
    /// the order is empty, or `max_ticks` was reached. Any error stops the
    /// loop for good.
    pub fn tick(&mut self, world: &mut World, assets: &AssetContainer) -> Result<Flow> {
        match self.state {
            LoopState::Uninitialized => return Err(report!(EcsError::LoopNotInitialized)),
            LoopState::Stopped => return Err(report!(EcsError::LoopStopped)),
            LoopState::Ready | LoopState::Running => {}
        }

        match self.tick_inner(world, assets) {
            Ok(Flow::Continue) => Ok(Flow::Continue),
            Ok(Flow::Stop) => {
                self.stop();
                Ok(Flow::Stop)
            }
            Err(err) => {
                self.stop();
                Err(err)
            }
        }
    }

    fn tick_inner(&mut self, world: &mut World, assets: &AssetContainer) -> Result<Flow> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("system_loop.tick", tick = self.ticks).entered();

        if self.state == LoopState::Ready {
            self.state = LoopState::Running;
            self.drain(world, assets)?;
        }

        if self.systems.count() == 0 {
            tracing::info!("system order is empty");
            return Ok(Flow::Stop);
        }

        let tick_start = Instant::now();
        let mut timings = Vec::new();
        let mut flow = Flow::Continue;

        for index in 0..self.systems.count() {
            let key = self.systems.order()[index];
            let system = self
                .systems
                .system_mut(key)
                .ok_or_else(|| report!(EcsError::SystemNotFound(key.to_string())))?;

            let start = Instant::now();
            let result = system.update(world, assets, &self.commands);
            let duration = start.elapsed();
            let name = system.name();

            if self.config.profile {
                self.profiler.record_execution(key, duration);
                timings.push(SystemTiming {
                    key,
                    name,
                    duration,
                });
            }

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    tracing::info!(system = name, tick = self.ticks, "system requested stop");
                    flow = Flow::Stop;
                    break;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(system = name, error = %err, "system update failed, continuing");
                }
            }
        }

        let drain_start = Instant::now();
        let applied = self.drain(world, assets)?;

        if self.config.profile {
            self.last_profile = Some(TickProfile {
                tick: self.ticks,
                total_time: tick_start.elapsed(),
                drain_time: drain_start.elapsed(),
                commands_applied: applied,
                system_timings: timings,
            });
        }

        self.ticks += 1;
        if self.config.max_ticks.is_some_and(|max| self.ticks >= max) {
            tracing::info!(ticks = self.ticks, "tick limit reached");
            flow = Flow::Stop;
        }
        Ok(flow)
    }

    fn drain(&mut self, world: &mut World, assets: &AssetContainer) -> Result<usize> {
        let mut ctx = CommandContext {
            systems: &mut self.systems,
            world,
            assets,
            registry: &self.registry,
        };
        self.commands.drain(&mut ctx)
    }

    fn stop(&mut self) {
        if self.state != LoopState::Stopped {
            self.state = LoopState::Stopped;
            tracing::info!(ticks = self.ticks, "system loop stopped");
        }
    }

    /// Tick until the loop stops. Returns the number of ticks run.
    pub fn run(&mut self, world: &mut World, assets: &AssetContainer) -> Result<u64> {
        let interval = self.config.tick_interval();
        loop {
            let started = Instant::now();
            if self.tick(world, assets)? == Flow::Stop {
                return Ok(self.ticks);
            }
            pace(interval, started);
        }
    }

    /// Like [`run`](Self::run), holding the world's write lock only for the
    /// duration of each tick so other threads can commit staging areas or
    /// read views in between.
    pub fn run_shared(&mut self, world: &SharedWorld, assets: &SharedAssets) -> Result<u64> {
        let interval = self.config.tick_interval();
        loop {
            let started = Instant::now();
            let flow = {
                let mut world = world.write();
                self.tick(&mut world, assets)?
            };
            if flow == Flow::Stop {
                return Ok(self.ticks);
            }
            pace(interval, started);
        }
    }
}

fn pace(interval: Option<Duration>, started: Instant) {
    match interval {
        Some(interval) => {
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        None => std::thread::yield_now(),
    }
}

impl std::fmt::Debug for SystemLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLoop")
            .field("state", &self.state)
            .field("systems", &self.systems)
            .field("ticks", &self.ticks)
            .field("pending_commands", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandQueue;
    use crate::registry::ComponentRegistry;
    use crate::system::{OrderedSystemListFactory, System};

    struct StopAfter(u32);

    impl System for StopAfter {
        fn update(&mut self, _: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            self.0 = self.0.saturating_sub(1);
            Ok(Flow::from(self.0 > 0))
        }
    }

    #[derive(Default)]
    struct Spawn;

    impl System for Spawn {
        fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            world.create_entity()?;
            Ok(Flow::Continue)
        }
    }

    #[derive(Default)]
    struct Broken;

    impl System for Broken {
        fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            let ghost = world.create_entity()?;
            world.destroy_entity(ghost)?;
            world.destroy_entity(ghost)?;
            Ok(Flow::Continue)
        }
    }

    fn fixture() -> (World, AssetContainer, SystemRegistry) {
        let components = ComponentRegistry::new();
        (
            World::new(&components).unwrap(),
            AssetContainer::new(),
            SystemRegistry::new(),
        )
    }

    #[test]
    fn test_tick_before_initialize_fails() {
        let (mut world, assets, registry) = fixture();
        let mut system_loop = SystemLoop::new(registry);
        assert!(!system_loop.is_ready());
        assert!(matches!(
            system_loop.tick(&mut world, &assets),
            Err(EcsError::LoopNotInitialized)
        ));
        assert!(system_loop.initialize().is_err());
    }

    #[test]
    fn test_state_machine() {
        let (mut world, assets, mut registry) = fixture();
        let stop = registry.register(|| StopAfter(2)).unwrap();
        let mut system_loop = SystemLoop::new(registry)
            .with_list_factory(OrderedSystemListFactory::new(vec![stop]));

        assert_eq!(system_loop.state(), LoopState::Uninitialized);
        system_loop.initialize().unwrap();
        assert_eq!(system_loop.state(), LoopState::Ready);

        assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Continue);
        assert_eq!(system_loop.state(), LoopState::Running);
        assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Stop);
        assert_eq!(system_loop.state(), LoopState::Stopped);
        assert!(matches!(
            system_loop.tick(&mut world, &assets),
            Err(EcsError::LoopStopped)
        ));
    }

    #[test]
    fn test_run_until_stop() {
        let (mut world, assets, mut registry) = fixture();
        let spawn = registry.register_default::<Spawn>().unwrap();
        let stop = registry.register(|| StopAfter(5)).unwrap();
        let mut system_loop = SystemLoop::new(registry)
            .with_list_factory(OrderedSystemListFactory::new(vec![spawn, stop]));
        system_loop.initialize().unwrap();

        assert_eq!(system_loop.run(&mut world, &assets).unwrap(), 5);
        assert_eq!(world.entity_count(), 5);
    }

    #[test]
    fn test_startup_commands_build_the_list() {
        let (mut world, assets, mut registry) = fixture();
        let spawn = registry.register_default::<Spawn>().unwrap();
        let mut system_loop = SystemLoop::new(registry)
            .with_list_factory(OrderedSystemListFactory::default())
            .with_config(LoopConfig {
                max_ticks: Some(3),
                ..LoopConfig::default()
            });
        system_loop.initialize().unwrap();
        system_loop.commands().create_system(spawn);
        system_loop.commands().set_order(vec![spawn]);

        assert_eq!(system_loop.run(&mut world, &assets).unwrap(), 3);
        assert_eq!(world.entity_count(), 3);
    }

    #[test]
    fn test_empty_order_stops() {
        let (mut world, assets, registry) = fixture();
        let mut system_loop =
            SystemLoop::new(registry).with_list_factory(OrderedSystemListFactory::default());
        system_loop.initialize().unwrap();
        assert_eq!(system_loop.run(&mut world, &assets).unwrap(), 0);
        assert_eq!(system_loop.state(), LoopState::Stopped);
    }

    #[test]
    fn test_fatal_error_stops_loop() {
        let (mut world, assets, mut registry) = fixture();
        let broken = registry.register_default::<Broken>().unwrap();
        let mut system_loop = SystemLoop::new(registry)
            .with_list_factory(OrderedSystemListFactory::new(vec![broken]));
        system_loop.initialize().unwrap();

        let err = system_loop.run(&mut world, &assets).unwrap_err();
        assert!(matches!(err, EcsError::EntityNotFound(_)));
        assert_eq!(system_loop.state(), LoopState::Stopped);
    }

    #[test]
    fn test_reinitialize_after_stop() {
        let (mut world, assets, mut registry) = fixture();
        let stop = registry.register(|| StopAfter(1)).unwrap();
        let mut system_loop = SystemLoop::new(registry)
            .with_list_factory(OrderedSystemListFactory::new(vec![stop]));
        system_loop.initialize().unwrap();
        assert_eq!(system_loop.run(&mut world, &assets).unwrap(), 1);

        system_loop.initialize().unwrap();
        assert_eq!(system_loop.ticks(), 0);
        assert_eq!(system_loop.run(&mut world, &assets).unwrap(), 1);
    }

    #[test]
    fn test_profiling_records_each_system() {
        let (mut world, assets, mut registry) = fixture();
        let spawn = registry.register_default::<Spawn>().unwrap();
        let mut system_loop = SystemLoop::new(registry)
            .with_list_factory(OrderedSystemListFactory::new(vec![spawn]))
            .with_config(LoopConfig {
                max_ticks: Some(4),
                profile: true,
                ..LoopConfig::default()
            });
        system_loop.initialize().unwrap();
        system_loop.run(&mut world, &assets).unwrap();

        let stats = system_loop.profiler().get_stats(spawn).unwrap();
        assert_eq!(stats.call_count, 4);
        assert!(stats.min <= stats.avg && stats.avg <= stats.max);

        let profile = system_loop.last_profile().unwrap();
        assert_eq!(profile.tick, 3);
        assert_eq!(profile.system_timings.len(), 1);
        assert_eq!(profile.system_timings[0].name, "Spawn");
    }

    #[test]
    fn test_loop_config_interval() {
        assert_eq!(LoopConfig::default().tick_interval(), None);
        let config = LoopConfig {
            tick_interval_ms: 16,
            ..LoopConfig::default()
        };
        assert_eq!(config.tick_interval(), Some(Duration::from_millis(16)));
    }
}
