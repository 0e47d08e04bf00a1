//! Demo: a game loop on its own thread, fed by a simulated platform thread.
//!
//! Space spawns a ball, Escape quits. The main thread plays the role of the
//! window's message loop and writes input into shared state.

use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use pooled_ecs::input::{shared_input, take_frame};
use pooled_ecs::prelude::*;
use pooled_ecs::registry;
use pooled_ecs::transform;

#[derive(Debug, Default)]
struct Velocity(Vec3);

/// Turns key presses into spawn commands.
struct PlayerControl {
    input: SharedInput,
}

impl System for PlayerControl {
    fn update(&mut self, _: &mut World, _: &AssetContainer, commands: &CommandQueue) -> Result<Flow> {
        let frame = take_frame(&self.input);
        if frame.quit_requested || frame.keys.just_pressed(KeyCode::Escape) {
            return Ok(Flow::Stop);
        }
        if frame.keys.just_pressed(KeyCode::Space) {
            commands.custom(|ctx: &mut CommandContext<'_>| {
                let ball = ctx.world.create_entity()?;
                ctx.world.insert(ball, Transform::from_translation(Vec3::Y * 10.0))?;
                ctx.world.insert(ball, Velocity(Vec3::new(1.0, 0.0, 0.0)))?;
                tracing::info!(%ball, "ball spawned");
                Ok(())
            });
        }
        Ok(Flow::Continue)
    }
}

#[derive(Default)]
struct Movement;

impl System for Movement {
    fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
        let key = world.view_of::<Velocity>()?.key();
        world.for_each_mut(key, |entity, payloads| {
            let step = payloads.get::<Velocity>(entity)?.0 * 0.016;
            payloads.get_mut::<Transform>(entity)?.translation += step;
            Ok(())
        })?;
        Ok(Flow::Continue)
    }
}

#[derive(Default)]
struct Report {
    frames: u64,
}

impl System for Report {
    fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
        self.frames += 1;
        if self.frames % 30 == 0 {
            WorldInspector::log_summary(world);
        }
        Ok(Flow::Continue)
    }
}

const CONFIG: &str = r#"{
    "components": { "Velocity": 32 },
    "game_loop": { "max_ticks": 600, "tick_interval_ms": 16, "profile": true },
    "transform_update_interval": 2
}"#;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_thread_names(true).init();

    let config = EcsConfig::from_json_str(CONFIG)?;
    let input = shared_input();

    {
        let mut components = registry::components().write();
        components.register::<Velocity>(1024)?;
        transform::register_components(&mut components, 64)?;
        config.apply_to(&mut components)?;
    }

    let order = {
        let mut systems = registry::systems().write();
        let control = {
            let input = input.clone();
            systems.register(move || PlayerControl {
                input: input.clone(),
            })?
        };
        let movement = systems.register_default::<Movement>()?;
        let interval = config.transform_update_interval;
        let transforms = systems.register(move || TransformSystem::new(interval))?;
        let report = systems.register_default::<Report>()?;
        vec![control, movement, transforms, report]
    };

    let world = World::new(&registry::components().read())?.into_shared();
    let assets = AssetContainer::new().into_shared();
    let system_loop = SystemLoop::from_global()
        .with_config(config.game_loop.clone())
        .with_list_factory(OrderedSystemListFactory::new(order));

    let game_loop = GameLoop::new();
    let handle = game_loop.run(system_loop, world.clone(), assets)?;

    // Platform thread: tap Space a few times, then ask to quit.
    for _ in 0..5 {
        thread::sleep(Duration::from_millis(100));
        let now = Instant::now();
        let mut input = input.write();
        input.keys.press(KeyCode::Space, now);
        input.keys.release(KeyCode::Space, now + Duration::from_millis(30));
    }
    thread::sleep(Duration::from_millis(200));
    input.write().quit_requested = true;

    let exit = game_loop
        .completion()
        .recv()
        .map_err(|err| EcsError::GameLoopFailed(err.to_string()))?;
    let system_loop = handle.join()?;
    exit.result?;

    let mut diagnostics = Diagnostics::new(1);
    if let Some(profile) = system_loop.last_profile() {
        diagnostics.record_profile(profile);
    }
    println!("{}", WorldInspector::summary(&world.read()));
    println!(
        "ran {} ticks, last tick took {:?}",
        exit.ticks,
        diagnostics.avg_tick_time()
    );
    Ok(())
}
