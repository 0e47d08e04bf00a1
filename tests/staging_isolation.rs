use std::sync::Arc;
use std::thread;

use pooled_ecs::prelude::*;

#[derive(Debug, Default, PartialEq)]
struct Tile {
    x: i32,
    y: i32,
}

#[derive(Debug, Default)]
struct Solid;

fn registry(tiles: usize) -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register::<Tile>(tiles).unwrap();
    registry.register::<Solid>(tiles).unwrap();
    registry
}

#[test]
fn staged_entities_are_invisible_until_commit() {
    let mut world = World::new(&registry(16)).unwrap();
    let live = world.create_entity().unwrap();
    world.add::<Tile>(live).unwrap();

    let mut area = world.create_staging_area();
    let staged = world.create_staged_entity(&mut area).unwrap();
    area.insert(staged, Tile { x: 3, y: 4 }).unwrap();
    area.add::<Solid>(staged).unwrap();

    assert_ne!(staged.index(), live.index());
    assert!(!world.entity_exists(staged));
    assert_eq!(world.view_of::<Tile>().unwrap().to_vec(), vec![live]);
    assert!(world.view_of::<Solid>().unwrap().is_empty());

    world.commit_entities(&mut area).unwrap();
    assert!(area.is_empty());
    assert!(world.entity_exists(staged));
    assert_eq!(world.get::<Tile>(staged).unwrap(), &Tile { x: 3, y: 4 });
    assert_eq!(world.view_of::<Tile>().unwrap().to_vec(), vec![live, staged]);
    assert_eq!(world.view_of::<Solid>().unwrap().to_vec(), vec![staged]);
}

#[test]
fn staged_entities_cannot_be_touched_directly() {
    let mut world = World::new(&registry(4)).unwrap();
    let mut area = world.create_staging_area();
    let staged = area.create_entity().unwrap();

    assert!(world.add::<Tile>(staged).is_err());
    assert!(world.destroy_entity(staged).is_err());
    assert!(!world.has::<Tile>(staged));
}

#[test]
fn commit_is_all_or_nothing() {
    let mut world = World::new(&registry(2)).unwrap();
    let mut area = world.create_staging_area();
    for x in 0..3 {
        let e = area.create_entity().unwrap();
        area.insert(e, Tile { x, y: 0 }).unwrap();
    }

    let err = world.commit_entities(&mut area).unwrap_err();
    assert!(matches!(err, EcsError::CapacityExhausted { max: 2, .. }));
    assert_eq!(area.len(), 3);
    assert!(world.view_of::<Tile>().unwrap().is_empty());
    assert_eq!(world.entity_count(), 0);

    let last = area.entities()[2];
    assert!(area.discard(last));
    world.commit_entities(&mut area).unwrap();
    assert_eq!(world.view_of::<Tile>().unwrap().len(), 2);
}

#[test]
fn area_from_another_world_is_rejected() {
    let mut world = World::new(&registry(4)).unwrap();
    let other = World::new(&registry(4)).unwrap();
    let mut area = other.create_staging_area();
    area.create_entity().unwrap();

    assert!(matches!(
        world.commit_entities(&mut area),
        Err(EcsError::ForeignStagingArea)
    ));
}

#[test]
fn loader_thread_builds_while_the_world_is_shared() {
    let world = World::new(&registry(64)).unwrap().into_shared();
    let queue = Arc::new(CommandQueue::new());

    let mut area = world.read().create_staging_area();
    let loader = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut staged = Vec::new();
            for x in 0..8 {
                let e = area.create_entity().unwrap();
                area.insert(e, Tile { x, y: x * 2 }).unwrap();
                if x % 2 == 0 {
                    area.add::<Solid>(e).unwrap();
                }
                staged.push(e);
            }
            queue.commit(area);
            staged
        })
    };

    // Meanwhile the owner keeps working on live entities.
    let live = {
        let mut world = world.write();
        let e = world.create_entity().unwrap();
        world.add::<Tile>(e).unwrap();
        e
    };

    let staged = loader.join().unwrap();
    assert_eq!(world.read().view_of::<Tile>().unwrap().len(), 1);
    assert!(staged.iter().all(|&e| !world.read().entity_exists(e)));

    let assets = AssetContainer::new();
    let mut systems = SystemList::new();
    let registry = SystemRegistry::new();
    {
        let mut world = world.write();
        let mut ctx = CommandContext {
            systems: &mut systems,
            world: &mut *world,
            assets: &assets,
            registry: &registry,
        };
        assert_eq!(queue.drain(&mut ctx).unwrap(), 1);
    }

    let world = world.read();
    assert!(world.entity_exists(live));
    assert_eq!(world.view_of::<Tile>().unwrap().len(), 9);
    assert_eq!(world.view_of::<Solid>().unwrap().len(), 4);
    assert_eq!(world.get::<Tile>(staged[5]).unwrap(), &Tile { x: 5, y: 10 });
}
