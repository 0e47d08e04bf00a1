use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pooled_ecs::prelude::*;

#[derive(Debug, Default)]
struct Position(f32);

#[derive(Debug, Default)]
struct Doomed;

type Log = Arc<Mutex<Vec<String>>>;

/// Moves everything and queues destruction of doomed entities.
struct Physics {
    log: Log,
}

impl System for Physics {
    fn update(&mut self, world: &mut World, _: &AssetContainer, commands: &CommandQueue) -> Result<Flow> {
        let doomed: Vec<Entity> = world.view_of::<Doomed>()?.to_vec();
        for entity in doomed {
            commands.destroy_entity(entity);
        }
        let key = world.view_of::<Position>()?.key();
        world.for_each_mut(key, |entity, payloads| {
            payloads.get_mut::<Position>(entity)?.0 += 1.0;
            Ok(())
        })?;
        self.log.lock().push("physics".into());
        Ok(Flow::Continue)
    }
}

/// Reports whether the doomed entities are still visible.
struct Player {
    log: Log,
}

impl System for Player {
    fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
        let visible = world.view_of::<Doomed>()?.len();
        self.log.lock().push(format!("player sees {visible}"));
        Ok(Flow::Continue)
    }
}

/// Stops the loop on its third frame.
struct Render {
    log: Log,
    frames: u32,
}

impl System for Render {
    fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
        self.frames += 1;
        self.log
            .lock()
            .push(format!("render {}", world.entity_count()));
        Ok(Flow::from(self.frames < 3))
    }
}

struct Scene {
    world: World,
    assets: AssetContainer,
    system_loop: SystemLoop,
    log: Log,
    doomed: Entity,
    survivor: Entity,
}

fn scene() -> Scene {
    let mut components = ComponentRegistry::new();
    components.register::<Position>(16).unwrap();
    components.register::<Doomed>(4).unwrap();
    let mut world = World::new(&components).unwrap();

    let doomed = world.create_entity().unwrap();
    world.add::<Position>(doomed).unwrap();
    world.add::<Doomed>(doomed).unwrap();
    let survivor = world.create_entity().unwrap();
    world.add::<Position>(survivor).unwrap();

    let log: Log = Arc::default();
    let mut systems = SystemRegistry::new();
    let physics = {
        let log = log.clone();
        systems.register(move || Physics { log: log.clone() }).unwrap()
    };
    let player = {
        let log = log.clone();
        systems.register(move || Player { log: log.clone() }).unwrap()
    };
    let render = {
        let log = log.clone();
        systems
            .register(move || Render {
                log: log.clone(),
                frames: 0,
            })
            .unwrap()
    };

    let mut system_loop = SystemLoop::new(systems)
        .with_list_factory(OrderedSystemListFactory::new(vec![physics, player, render]));
    system_loop.initialize().unwrap();

    Scene {
        world,
        assets: AssetContainer::new(),
        system_loop,
        log,
        doomed,
        survivor,
    }
}

#[test]
fn destruction_is_deferred_to_the_end_of_the_tick() {
    let Scene {
        mut world,
        assets,
        mut system_loop,
        log,
        doomed,
        survivor,
    } = scene();

    assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Continue);
    assert_eq!(
        *log.lock(),
        vec!["physics", "player sees 1", "render 2"]
    );
    assert!(!world.entity_exists(doomed));

    log.lock().clear();
    assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Continue);
    assert_eq!(
        *log.lock(),
        vec!["physics", "player sees 0", "render 1"]
    );
    assert_eq!(world.get::<Position>(survivor).unwrap().0, 2.0);
}

#[test]
fn loop_runs_until_a_system_stops_it() {
    let Scene {
        mut world,
        assets,
        mut system_loop,
        log,
        ..
    } = scene();

    let ticks = system_loop.run(&mut world, &assets).unwrap();
    assert_eq!(ticks, 3);
    assert_eq!(system_loop.state(), LoopState::Stopped);
    assert_eq!(log.lock().last().map(String::as_str), Some("render 1"));
    assert!(matches!(
        system_loop.tick(&mut world, &assets),
        Err(EcsError::LoopStopped)
    ));
}

#[test]
fn startup_commands_run_before_the_first_systems() {
    let Scene {
        mut world,
        assets,
        mut system_loop,
        log,
        survivor,
        ..
    } = scene();

    let physics = system_loop.registry().key_of::<Physics>().unwrap();
    let render = system_loop.registry().key_of::<Render>().unwrap();
    system_loop.commands().destroy_entity(survivor);
    system_loop.commands().set_order(vec![render, physics]);

    system_loop.tick(&mut world, &assets).unwrap();
    assert_eq!(*log.lock(), vec!["render 1", "physics"]);
    assert!(!world.entity_exists(survivor));
}

#[test]
fn systems_can_be_swapped_between_ticks() {
    let Scene {
        mut world,
        assets,
        mut system_loop,
        log,
        ..
    } = scene();

    let player = system_loop.registry().key_of::<Player>().unwrap();
    let render = system_loop.registry().key_of::<Render>().unwrap();

    system_loop.tick(&mut world, &assets).unwrap();
    system_loop.commands().destroy_system(player);
    system_loop.commands().set_order(vec![render]);

    // Queued between ticks, applied once the next tick has run.
    system_loop.tick(&mut world, &assets).unwrap();
    assert_eq!(log.lock().len(), 6);
    log.lock().clear();

    assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Stop);
    assert_eq!(*log.lock(), vec!["render 1"]);
    assert!(!system_loop.systems().has_system(player));
    assert_eq!(system_loop.systems().count(), 1);
}

#[test]
fn game_loop_rejects_a_second_run() {
    let Scene {
        world,
        system_loop,
        ..
    } = scene();
    let world = world.into_shared();
    let assets = AssetContainer::new().into_shared();

    let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(0);
    let mut systems = SystemRegistry::new();
    struct Wait(crossbeam::channel::Receiver<()>);
    impl System for Wait {
        fn update(&mut self, _: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            let _ = self.0.recv_timeout(Duration::from_secs(5));
            Ok(Flow::Stop)
        }
    }
    let wait = systems
        .register(move || Wait(release_rx.clone()))
        .unwrap();
    let blocking = SystemLoop::new(systems).with_list_factory(OrderedSystemListFactory::new(vec![wait]));

    let game_loop = GameLoop::new();
    let handle = game_loop
        .run(blocking, world.clone(), assets.clone())
        .unwrap();
    assert!(game_loop.is_running());
    assert_eq!(
        game_loop.run(system_loop, world.clone(), assets).unwrap_err(),
        EcsError::GameLoopAlreadyRunning
    );

    release_tx.send(()).unwrap();
    let exit = game_loop
        .completion()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(exit.ticks, 1);
    assert!(exit.result.is_ok());
    handle.join().unwrap();
    assert!(!game_loop.is_running());
}

#[test]
fn game_loop_reports_fatal_system_errors() {
    struct Overflow;
    impl System for Overflow {
        fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            let entity = world.create_entity()?;
            world.add::<Doomed>(entity)?;
            Ok(Flow::Continue)
        }
    }

    let mut components = ComponentRegistry::new();
    components.register::<Doomed>(2).unwrap();
    let world = World::new(&components).unwrap().into_shared();

    let mut systems = SystemRegistry::new();
    let overflow = systems.register(|| Overflow).unwrap();
    let system_loop =
        SystemLoop::new(systems).with_list_factory(OrderedSystemListFactory::new(vec![overflow]));

    let game_loop = GameLoop::new();
    let handle = game_loop
        .run(system_loop, world.clone(), AssetContainer::new().into_shared())
        .unwrap();
    let exit = game_loop
        .completion()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert!(matches!(
        exit.result,
        Err(EcsError::CapacityExhausted { max: 2, .. })
    ));
    assert_eq!(exit.ticks, 2);

    let system_loop = handle.join().unwrap();
    assert_eq!(system_loop.state(), LoopState::Stopped);
    assert_eq!(world.read().view_of::<Doomed>().unwrap().len(), 2);
}

#[test]
fn transform_repairs_tolerate_entities_destroyed_in_the_same_tick() {
    let mut components = ComponentRegistry::new();
    components.register::<Position>(8).unwrap();
    components.register::<Doomed>(4).unwrap();
    pooled_ecs::transform::register_components(&mut components, 8).unwrap();
    let mut world = World::new(&components).unwrap();

    // No GlobalTransform yet, so the transform system queues one.
    let doomed = world.create_entity().unwrap();
    world.add::<Position>(doomed).unwrap();
    world.add::<Doomed>(doomed).unwrap();
    world.add::<Transform>(doomed).unwrap();
    let survivor = world.create_entity().unwrap();
    world.add::<Position>(survivor).unwrap();
    world.add::<Transform>(survivor).unwrap();

    let log: Log = Arc::default();
    let mut systems = SystemRegistry::new();
    let physics = {
        let log = log.clone();
        systems.register(move || Physics { log: log.clone() }).unwrap()
    };
    let transforms = systems.register_default::<TransformSystem>().unwrap();
    let mut system_loop = SystemLoop::new(systems)
        .with_list_factory(OrderedSystemListFactory::new(vec![physics, transforms]));
    system_loop.initialize().unwrap();
    let assets = AssetContainer::new();

    assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Continue);
    assert_eq!(system_loop.state(), LoopState::Running);
    assert!(!world.entity_exists(doomed));
    assert!(world.has::<GlobalTransform>(survivor));
    assert_eq!(world.view_of::<GlobalTransform>().unwrap().to_vec(), vec![survivor]);
}

#[test]
fn recoverable_command_failures_do_not_drop_later_commands() {
    let Scene {
        mut world,
        assets,
        mut system_loop,
        survivor,
        ..
    } = scene();

    system_loop.tick(&mut world, &assets).unwrap();
    system_loop
        .commands()
        .custom(|_: &mut CommandContext<'_>| -> Result<()> {
            Err(EcsError::FileNotFound("level.json".into()))
        });
    system_loop.commands().destroy_entity(survivor);

    assert_eq!(system_loop.tick(&mut world, &assets).unwrap(), Flow::Continue);
    assert_eq!(system_loop.state(), LoopState::Running);
    assert!(!world.entity_exists(survivor));
    assert!(system_loop.commands().is_empty());
}

#[test]
fn payload_only_ticks_leave_views_unchanged() {
    struct Drift;
    impl System for Drift {
        fn update(&mut self, world: &mut World, _: &AssetContainer, _: &CommandQueue) -> Result<Flow> {
            let key = world.view_of::<Position>()?.key();
            world.for_each_mut(key, |entity, payloads| {
                payloads.get_mut::<Position>(entity)?.0 += 0.5;
                Ok(())
            })?;
            Ok(Flow::Continue)
        }
    }

    let mut components = ComponentRegistry::new();
    components.register::<Position>(8).unwrap();
    let mut world = World::new(&components).unwrap();
    for _ in 0..5 {
        let entity = world.create_entity().unwrap();
        world.add::<Position>(entity).unwrap();
    }

    let mut systems = SystemRegistry::new();
    let drift = systems.register(|| Drift).unwrap();
    let mut system_loop =
        SystemLoop::new(systems).with_list_factory(OrderedSystemListFactory::new(vec![drift]));
    system_loop.initialize().unwrap();
    let assets = AssetContainer::new();

    let before = world.view_of::<Position>().unwrap().to_vec();
    system_loop.tick(&mut world, &assets).unwrap();
    let after = world.view_of::<Position>().unwrap().to_vec();
    assert_eq!(before, after);
    assert!(after
        .iter()
        .all(|&e| world.get::<Position>(e).unwrap().0 == 0.5));
}
