//! End-to-end scenarios driven through the world's virtual clock.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use otter_core::prelude::*;
use otter_test_utils::fixtures::{amount, otter_world, set_amount, world_with_resource};

fn counting_action(counter: &Rc<Cell<u32>>) -> CommandAction {
    let counter = Rc::clone(counter);
    CommandAction::custom(move |_, _| {
        counter.set(counter.get() + 1);
        Ok(())
    })
}

#[test]
fn test_priority_orders_the_fold() {
    let a = Modifier::new("A", 2.0, Operation::Mul).with_priority(5.0);
    let b = Modifier::new("B", 3.0, Operation::Add).with_priority(1.0);
    let stack = ModifierStack::from_entries([("a", a.clone()), ("b", b.clone())]);
    assert_eq!(stack.apply(10.0), 23.0);

    let reversed =
        ModifierStack::from_entries([("a", a.with_priority(1.0)), ("b", b.with_priority(5.0))]);
    assert_eq!(reversed.apply(10.0), 26.0);
}

#[test]
fn test_timed_modifier_expires_after_its_duration() {
    let mut world = world_with_resource("gold", 100.0);
    let stack = StackRef::ResourceGeneration("gold".into());
    world
        .set_modifier(
            &stack,
            "rush",
            Modifier::new("Gold Rush", 1.0, Operation::Add).with_duration(1.0),
        )
        .unwrap();

    for _ in 0..9 {
        world.force_tick(0.1);
    }
    assert!(world.stack(&stack).unwrap().contains_key("rush"));

    world.force_tick(0.1);
    world.force_tick(0.1);
    assert!(!world.stack(&stack).unwrap().contains_key("rush"));
}

#[test]
fn test_timed_modifier_expires_on_the_clock() {
    let mut world = world_with_resource("gold", 100.0);
    let stack = StackRef::ResourceMax("gold".into());
    world
        .set_modifier(
            &stack,
            "vault",
            Modifier::new("Vault", 2.0, Operation::Mul).with_duration(1.0),
        )
        .unwrap();
    assert_eq!(world.resource(&"gold".into()).unwrap().max(), 200.0);

    world.advance(0.9);
    assert!(world.stack(&stack).unwrap().contains_key("vault"));
    world.advance(0.2);
    assert!(!world.stack(&stack).unwrap().contains_key("vault"));
    assert_eq!(world.resource(&"gold".into()).unwrap().max(), 100.0);
}

#[test]
fn test_clamping_and_lifetime_total() {
    let mut world = world_with_resource("gold", 100.0);
    set_amount(&mut world, "gold", 250.0);
    assert_eq!(amount(&world, "gold"), 100.0);

    set_amount(&mut world, "gold", -5.0);
    assert_eq!(amount(&world, "gold"), 0.0);

    let gold = world.resource(&"gold".into()).unwrap();
    assert_eq!(gold.amount_ever_obtained(), 100.0);
}

#[test]
fn test_rejected_run_leaves_balances_untouched() {
    let mut world = world_with_resource("gold", 100.0);
    world
        .register_resource(ResourceOptions::new("wood", "Wood", 100.0))
        .unwrap();
    world
        .register_command(
            CommandOptions::new("build", "Build", 1.0)
                .with_cost("gold", 10.0)
                .with_cost("wood", 4.0),
        )
        .unwrap();
    set_amount(&mut world, "gold", 5.0);
    set_amount(&mut world, "wood", 20.0);

    let outcome = world.run_command(&"build".into()).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Rejected(Blocked::InsufficientResources {
            resource: "gold".into(),
            required: 10.0,
            available: 5.0,
        })
    );
    assert_eq!(amount(&world, "gold"), 5.0);
    assert_eq!(amount(&world, "wood"), 20.0);

    set_amount(&mut world, "gold", 50.0);
    assert!(world.run_command(&"build".into()).unwrap().is_started());
    assert_eq!(amount(&world, "gold"), 40.0);
    assert_eq!(amount(&world, "wood"), 16.0);
}

#[test]
fn test_cooldown_lifecycle() {
    let finished = Rc::new(Cell::new(0));
    let cooled = Rc::new(Cell::new(0));
    let mut world = World::new();
    world
        .register_command(
            CommandOptions::new("rest", "Rest", 2.0)
                .with_cooldown(3.0)
                .on_finish(counting_action(&finished))
                .on_cooldown_finish(counting_action(&cooled)),
        )
        .unwrap();
    let id = CommandId::from("rest");

    assert!(world.run_command(&id).unwrap().is_started());
    assert!(!world.can_run(&id));
    assert_eq!(
        world.run_command(&id).unwrap(),
        RunOutcome::Rejected(Blocked::AlreadyRunning)
    );

    for step in 1..50 {
        world.advance(0.1);
        assert!(!world.can_run(&id), "runnable too early at step {step}");
        if step == 19 {
            assert_eq!(finished.get(), 0);
        }
        if step == 20 {
            assert_eq!(finished.get(), 1);
            assert_eq!(world.command(&id).unwrap().state(), CommandState::OnCooldown);
        }
    }
    assert_eq!(cooled.get(), 0);

    world.advance(0.1);
    assert!(world.can_run(&id));
    assert!(world.command(&id).unwrap().can_run());
    assert_eq!((finished.get(), cooled.get()), (1, 1));

    world.advance(10.0);
    assert_eq!((finished.get(), cooled.get()), (1, 1));
}

#[test]
fn test_concurrent_runs_finish_independently() {
    let finishes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&finishes);
    let mut world = World::new();
    world
        .register_command(
            CommandOptions::new("cast", "Cast Line", 1.0)
                .concurrent()
                .on_finish(CommandAction::custom(move |world, _| {
                    sink.borrow_mut().push(world.now());
                    Ok(())
                })),
        )
        .unwrap();
    let id = CommandId::from("cast");

    assert!(world.run_command(&id).unwrap().is_started());
    world.advance(0.3);
    assert!(world.run_command(&id).unwrap().is_started());
    assert_eq!(world.command(&id).unwrap().state(), CommandState::Running(2));

    world.advance(2.0);
    let finishes = finishes.borrow();
    assert_eq!(finishes.len(), 2);
    assert!((finishes[0] - 1.0).abs() < 1e-9);
    assert!((finishes[1] - 1.3).abs() < 1e-9);
}

#[test]
fn test_completion_callbacks_fire_once() {
    let mut world = World::new();
    world
        .register_command(CommandOptions::new("nap", "Nap", 1.0).with_cooldown(1.0))
        .unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (on_finish, on_cooldown) = (Rc::clone(&log), Rc::clone(&log));

    world
        .run_command_with(
            &"nap".into(),
            Some(Box::new(move |world: &mut World| {
                on_finish.borrow_mut().push(("finish", world.now()));
            })),
            Some(Box::new(move |world: &mut World| {
                on_cooldown.borrow_mut().push(("cooldown", world.now()));
            })),
        )
        .unwrap();
    world.advance(5.0);

    assert_eq!(*log.borrow(), vec![("finish", 1.0), ("cooldown", 2.0)]);
}

#[test]
fn test_eating_fish_feeds_the_otter() {
    let mut world = otter_world();
    let eat = CommandId::from("eat_fish");
    let find = CommandId::from("find_fish_solo");

    assert!(!world.command(&eat).unwrap().is_visible());
    set_amount(&mut world, "fish", 30.0);
    world.advance(0.05);
    assert!(world.command(&eat).unwrap().is_visible());

    assert!(world.run_command(&eat).unwrap().is_started());
    assert!((amount(&world, "fish") - 20.0).abs() < 1e-9);

    world.advance(3.0);
    let quantity = world.command(&find).unwrap().quantity_modifiers().unwrap();
    let well_fed = quantity.get("well_fed").unwrap();
    assert_eq!(well_fed.duration.map(f64::round), Some(30.0));
    assert!((world.command(&find).unwrap().multiplier() - 1.2).abs() < 1e-9);
    assert_eq!(world.command(&eat).unwrap().state(), CommandState::OnCooldown);

    world.advance(29.5);
    assert!(world
        .stack(&StackRef::CommandQuantity(find.clone()))
        .unwrap()
        .contains_key("well_fed"));

    world.advance(1.0);
    assert!(!world
        .stack(&StackRef::CommandQuantity(find.clone()))
        .unwrap()
        .contains_key("well_fed"));
    assert!(!world
        .stack(&StackRef::CommandQuantity("gather_wood_solo".into()))
        .unwrap()
        .contains_key("well_fed"));
    assert_eq!(world.command(&eat).unwrap().state(), CommandState::Idle);
}

#[test]
fn test_wood_is_discovered_by_gathering() {
    let mut world = otter_world();
    let gather = CommandId::from("gather_wood_solo");
    assert!(!world.command(&gather).unwrap().is_visible());

    set_amount(&mut world, "fish", 10.0);
    world.advance(0.05);
    assert!(world.command(&gather).unwrap().is_visible());
    assert!(!world.resource(&"wood".into()).unwrap().is_visible());

    assert!(world.run_command(&gather).unwrap().is_started());
    world.advance(5.0);
    assert_eq!(amount(&world, "wood"), 1.0);
    world.advance(0.05);
    assert!(world.resource(&"wood".into()).unwrap().is_visible());
}

#[test]
fn test_offline_catch_up_with_force_tick() {
    let mut world = otter_world();
    set_amount(&mut world, "fish", 100.0);
    world.force_tick(1000.0);
    assert!((amount(&world, "fish") - 70.0).abs() < 1e-9);
    assert_eq!(world.time_played(), 1000.0);
}

#[test]
fn test_resource_round_trip_through_store() {
    let mut world = otter_world();
    set_amount(&mut world, "fish", 80.0);
    set_amount(&mut world, "fish", 42.0);
    world
        .set_modifier(
            &StackRef::ResourceMax("fish".into()),
            "net_rack",
            Modifier::new("Net Rack", 500.0, Operation::Add).serialized(),
        )
        .unwrap();
    world
        .set_modifier(
            &StackRef::ResourceMax("fish".into()),
            "ephemeral",
            Modifier::new("Ephemeral", 2.0, Operation::Mul),
        )
        .unwrap();

    let mut store = MemoryStore::new();
    world.save_to(&mut store).unwrap();

    let mut restored = otter_world();
    let report = restored.load_from(&store);
    assert!(report.skipped.is_empty());

    let fish = restored.resource(&"fish".into()).unwrap();
    assert_eq!(fish.amount(), 42.0);
    assert_eq!(fish.amount_ever_obtained(), 80.0);
    assert!(fish.max_modifiers().contains_key("net_rack"));
    assert!(!fish.max_modifiers().contains_key("ephemeral"));
    assert!(fish.generation_modifiers().contains_key("permanent_hunger"));
}
