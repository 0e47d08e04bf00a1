use pooled_ecs::prelude::*;

#[derive(Debug, Default, PartialEq)]
struct Health {
    current: u32,
    max: u32,
}

#[derive(Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

fn world_with(health_budget: usize) -> World {
    let mut registry = ComponentRegistry::new();
    registry.register::<Health>(health_budget).unwrap();
    registry.register::<Position>(64).unwrap();
    World::new(&registry).unwrap()
}

#[test]
fn destroyed_entity_is_gone_and_its_index_gets_a_newer_generation() {
    let mut world = world_with(4);
    let old = world.create_entity().unwrap();
    world.add::<Health>(old).unwrap();

    world.destroy_entity(old).unwrap();
    assert!(!world.entity_exists(old));

    let new = world.create_entity().unwrap();
    assert_eq!(new.index(), old.index());
    assert!(new.generation() > old.generation());
    assert_ne!(new, old);
    assert!(world.entity_exists(new));
    assert!(!world.entity_exists(old));
    assert!(!world.has::<Health>(new));
}

#[test]
fn destroying_twice_is_an_error() {
    let mut world = world_with(4);
    let e = world.create_entity().unwrap();
    world.destroy_entity(e).unwrap();

    let err = world.destroy_entity(e).unwrap_err();
    assert!(matches!(err, EcsError::EntityNotFound(_)));
    assert_eq!(err.category(), ErrorCategory::ContractViolation);
}

#[test]
fn capacity_is_a_hard_budget() {
    const N: usize = 5;
    let mut world = world_with(N);
    let entities: Vec<Entity> = (0..=N).map(|_| world.create_entity().unwrap()).collect();

    for &e in &entities[..N] {
        world.add::<Health>(e).unwrap();
    }
    let err = world.add::<Health>(entities[N]).unwrap_err();
    assert!(matches!(err, EcsError::CapacityExhausted { max: N, .. }));
    assert_eq!(err.category(), ErrorCategory::Capacity);
    assert!(!world.has::<Health>(entities[N]));

    world.remove::<Health>(entities[2]).unwrap();
    world.add::<Health>(entities[N]).unwrap();

    world.remove::<Health>(entities[N]).unwrap();
    world.destroy_entity(entities[0]).unwrap();
    world.add::<Health>(entities[N]).unwrap();
    world.add::<Health>(entities[2]).unwrap();
    let key = world.key_of::<Health>().unwrap();
    assert_eq!(world.live_count(key), Some(N));
}

#[test]
fn health_budget_of_two_scenario() {
    let mut world = world_with(2);
    let a = world.create_entity().unwrap();
    let b = world.create_entity().unwrap();
    let c = world.create_entity().unwrap();

    world.add::<Health>(a).unwrap();
    world.add::<Health>(b).unwrap();
    assert!(world.add::<Health>(c).unwrap_err().is_fatal());
}

#[test]
fn added_component_is_default_and_removed_component_is_gone() {
    let mut world = world_with(4);
    let e = world.create_entity().unwrap();
    let key = world.key_of::<Position>().unwrap();

    let handle = world.add_component(e, key).unwrap();
    assert_eq!(world.get::<Position>(e).unwrap(), &Position::default());
    assert!(world.component_ptr(e, key).is_ok());
    assert_eq!(world.resolve::<Position>(handle), Some(&Position::default()));

    world.remove_component(e, key).unwrap();
    assert!(matches!(
        world.get::<Position>(e),
        Err(EcsError::ComponentNotFound { .. })
    ));
    assert!(world.component_ptr(e, key).is_err());
    assert!(world.resolve::<Position>(handle).is_none());
}

#[test]
fn adding_the_same_component_twice_fails() {
    let mut world = world_with(4);
    let e = world.create_entity().unwrap();
    world.insert(e, Health { current: 3, max: 3 }).unwrap();

    assert!(matches!(
        world.add::<Health>(e),
        Err(EcsError::ComponentAlreadyPresent { .. })
    ));
    assert_eq!(world.get::<Health>(e).unwrap().current, 3);
}

#[test]
fn views_follow_structural_changes() {
    let mut world = world_with(8);
    let a = world.create_entity().unwrap();
    let b = world.create_entity().unwrap();
    world.add::<Health>(a).unwrap();
    world.add::<Health>(b).unwrap();
    world.add::<Position>(b).unwrap();

    assert_eq!(world.view_of::<Health>().unwrap().to_vec(), vec![a, b]);
    assert_eq!(world.view_of::<Position>().unwrap().to_vec(), vec![b]);

    world.destroy_entity(b).unwrap();
    assert_eq!(world.view_of::<Health>().unwrap().to_vec(), vec![a]);
    assert!(world.view_of::<Position>().unwrap().is_empty());
}

#[test]
fn payloads_can_be_changed_while_walking_a_view() {
    let mut world = world_with(8);
    for i in 0..4 {
        let e = world.create_entity().unwrap();
        world.insert(e, Health { current: i, max: 10 }).unwrap();
        if i % 2 == 0 {
            world.add::<Position>(e).unwrap();
        }
    }

    let key = world.key_of::<Health>().unwrap();
    world
        .for_each_mut(key, |entity, payloads| {
            let boost = if payloads.has::<Position>(entity) { 5 } else { 1 };
            payloads.get_mut::<Health>(entity)?.current += boost;
            Ok(())
        })
        .unwrap();

    let totals: Vec<u32> = world
        .view(key)
        .unwrap()
        .iter()
        .map(|e| world.get::<Health>(e).unwrap().current)
        .collect();
    assert_eq!(totals, vec![5, 2, 7, 4]);
}

#[test]
fn named_entity_slots() {
    let mut world = world_with(4);
    let player = world.create_entity().unwrap();
    world.register_entity(0, player).unwrap();
    assert_eq!(world.registered_entity(0), Some(player));
    assert_eq!(world.registered_entity(1), None);
}
