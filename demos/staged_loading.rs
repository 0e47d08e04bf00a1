//! Demo: load a level on a worker thread while the game loop keeps ticking.
//!
//! The loader reads level files through the asset server, builds tile
//! entities in a staging area and hands the area to the loop's command
//! queue. The tiles show up in views all at once, between two ticks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use pooled_ecs::assets::MemoryFileLoader;
use pooled_ecs::prelude::*;
use serde::Deserialize;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct Tile {
    x: i32,
    y: i32,
}

#[derive(Debug, Default)]
struct Solid;

#[derive(Debug, Deserialize)]
struct Level {
    name: String,
    tiles: Vec<Tile>,
    #[serde(default)]
    solid: Vec<usize>,
}

impl Asset for Level {
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.tiles.len() * std::mem::size_of::<Tile>()
    }
}

/// Parses level files and counts tiles across the batch.
struct LevelFactory;

impl AssetFactory for LevelFactory {
    type Asset = Level;
    type Staging = AtomicUsize;

    fn prepare(&self) -> Self::Staging {
        AtomicUsize::new(0)
    }

    fn create(&self, data: &FileData, staging: &Self::Staging) -> Result<Level> {
        let level: Level = serde_json::from_slice(&data.bytes)?;
        staging.fetch_add(level.tiles.len(), Ordering::Relaxed);
        Ok(level)
    }

    fn commit(&self, staging: Self::Staging) -> Result<()> {
        tracing::info!(tiles = staging.into_inner(), "level batch parsed");
        Ok(())
    }
}

/// One tile of a level.
struct TilePrefab {
    tile: Tile,
    solid: bool,
}

impl Prefab for TilePrefab {
    fn build(&self, target: &mut PrefabTarget<'_>, _: &AssetContainer) -> Result<()> {
        target.insert(self.tile)?;
        if self.solid {
            target.insert(Solid)?;
        }
        Ok(())
    }
}

/// Stops once `expected` tiles are live.
struct WaitForTiles {
    expected: usize,
    ticks: u64,
}

impl System for WaitForTiles {
    fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
        self.ticks += 1;
        let tiles = world.view_of::<Tile>()?.len();
        if tiles >= self.expected {
            tracing::info!(tiles, ticks = self.ticks, "level visible");
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

const MEADOW: &str = r#"{
    "name": "meadow",
    "tiles": [
        {"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 2, "y": 0},
        {"x": 0, "y": 1}, {"x": 2, "y": 1}
    ],
    "solid": [0, 2]
}"#;

const CAVE: &str = r#"{
    "name": "cave",
    "tiles": [{"x": 10, "y": 10}, {"x": 11, "y": 10}, {"x": 12, "y": 10}],
    "solid": [0, 1, 2]
}"#;

fn load_levels(
    world: &SharedWorld,
    assets: &SharedAssets,
    commands: &CommandQueue,
) -> Result<usize> {
    let server = AssetServer::with_loader(
        MemoryFileLoader::new()
            .with_file("levels/meadow.json", MEADOW)
            .with_file("levels/cave.json", CAVE),
    );
    let mut factories = AssetFactoryRegistry::new();
    let level_factory = factories.register(LevelFactory)?;

    let mut sources = AssetSourceRegistry::new("level");
    let keys = [AssetSourceKey(0), AssetSourceKey(1)];
    for (key, path) in keys.iter().zip(["levels/meadow.json", "levels/cave.json"]) {
        sources.register(
            *key,
            AssetSource {
                path: path.into(),
                factory: level_factory,
            },
        )?;
    }

    let report = server.load(&keys, &sources, &factories, assets)?;
    for (key, err) in &report.failed {
        tracing::warn!(?key, error = %err, "level skipped");
    }

    let mut area = world.read().create_staging_area();
    for (_, id) in &report.loaded {
        let Some(handle) = assets.typed::<Level>(*id) else {
            continue;
        };
        let level = assets.get(handle)?;
        for (index, tile) in level.tiles.iter().enumerate() {
            let prefab = TilePrefab {
                tile: *tile,
                solid: level.solid.contains(&index),
            };
            prefab.instantiate_staged(&mut area, assets)?;
        }
        tracing::info!(level = %level.name, tiles = level.tiles.len(), "level staged");
    }

    let staged = area.len();
    commands.commit(area);
    Ok(staged)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_thread_names(true).init();

    let mut components = ComponentRegistry::new();
    components.register::<Tile>(256)?;
    components.register::<Solid>(256)?;
    let world = World::new(&components)?.into_shared();
    let assets = AssetContainer::new().into_shared();

    let mut systems = SystemRegistry::new();
    let wait = systems.register(|| WaitForTiles {
        expected: 8,
        ticks: 0,
    })?;
    let commands = Arc::new(CommandQueue::new());
    let system_loop = SystemLoop::new(systems)
        .with_queue(commands.clone())
        .with_config(LoopConfig {
            max_ticks: Some(1_000),
            tick_interval_ms: 5,
            ..LoopConfig::default()
        })
        .with_list_factory(OrderedSystemListFactory::new(vec![wait]));

    let game_loop = GameLoop::new();
    let handle = game_loop.run(system_loop, world.clone(), assets.clone())?;

    let loader = {
        let world = world.clone();
        let assets = assets.clone();
        thread::Builder::new()
            .name("loader".into())
            .spawn(move || load_levels(&world, &assets, &commands))
            .map_err(EcsError::from)?
    };
    let staged = loader
        .join()
        .map_err(|_| EcsError::GameLoopFailed("loader thread panicked".into()))??;

    handle.join()?;
    let exit = game_loop
        .completion()
        .recv()
        .map_err(|err| EcsError::GameLoopFailed(err.to_string()))?;
    exit.result?;

    let world = world.read();
    println!("staged {staged} tiles, loop ran {} ticks", exit.ticks);
    println!(
        "tiles: {}, solid: {}",
        world.view_of::<Tile>()?.len(),
        world.view_of::<Solid>()?.len()
    );
    Ok(())
}
