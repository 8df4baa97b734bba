mod support;

use pop_core::{Blackboard, Location, TickContext};
use pop_goals::{
    ActionKind, Activity, EngineConfig, GoalKind, GoalState, Item, PopGoalManager,
};
use pop_tools::{install_log, take_log};
use support::TestWorld;

const POP: u64 = 1;

fn hungry_world() -> TestWorld {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    world.pop_mut(POP).food = 10;
    world.put_resource(Location::new(3, 0), Item::named("food", "berries"), 200);
    world
}

#[test]
fn hungry_pop_gathers_then_eats_until_fed() {
    support::init_tracing();
    let mut world = hungry_world();
    let mut bb = Blackboard::new();
    let mut ctx = TickContext::new(0, 42);
    let mut manager = PopGoalManager::with_default_goals(POP, EngineConfig::default());

    let food = manager
        .goals()
        .iter()
        .find(|g| matches!(g.kind(), GoalKind::Food { .. }))
        .map(|g| g.id())
        .expect("default food goal");

    assert_eq!(manager.perform_goals(&ctx, &mut world, &mut bb), Some(food));
    let goal = manager.goal(food).expect("food goal");
    match goal.action(0).map(|n| n.kind()) {
        Some(ActionKind::Gather(g)) => assert_eq!(g.stack.amount, 15 + 70 - 10),
        other => panic!("expected a gather step, got {other:?}"),
    }
    assert!(matches!(
        goal.action(1).map(|n| n.kind()),
        Some(ActionKind::Consume(_))
    ));

    let mut saw_eating = false;
    for _ in 0..30 {
        ctx = ctx.next();
        manager.perform_goals(&ctx, &mut world, &mut bb);
        saw_eating |= world.pop(POP).activity == Activity::Eating;
        if manager.goal(food).map(|g| g.state()) == Some(GoalState::Fulfilled) {
            break;
        }
    }

    assert_eq!(manager.goal(food).map(|g| g.state()), Some(GoalState::Fulfilled));
    assert!(saw_eating);
    assert!(world.pop(POP).food >= 70);
    // 75 harvested, six eaten.
    assert_eq!(world.held(POP, &Item::food()), 69);
    assert_eq!(manager.in_progress(), None);
}

#[test]
fn recurring_need_re_arms_when_it_returns() {
    let mut world = hungry_world();
    let mut bb = Blackboard::new();
    install_log(&mut bb);
    let mut ctx = TickContext::new(0, 42);
    let mut manager = PopGoalManager::with_default_goals(POP, EngineConfig::default());

    support::run(&mut manager, &mut world, &mut bb, &mut ctx, 20);
    let food = manager.goals()[0].id();
    assert_eq!(manager.goal(food).map(|g| g.state()), Some(GoalState::Fulfilled));
    assert_eq!(take_log(&mut bb).count("goal.reset"), 0);

    // Fed pops do not re-arm.
    support::run(&mut manager, &mut world, &mut bb, &mut ctx, 3);
    assert_eq!(manager.goal(food).map(|g| g.state()), Some(GoalState::Fulfilled));

    world.pop_mut(POP).food = 30;
    assert_eq!(manager.perform_goals(&ctx, &mut world, &mut bb), Some(food));
    assert_eq!(take_log(&mut bb).count("goal.reset"), 1);
    assert_eq!(manager.goal(food).map(|g| g.state()), Some(GoalState::Active));

    // Food already carried covers the new deficit, so no new harvest is needed.
    let harvested_before = world.calls.harvest;
    support::run(&mut manager, &mut world, &mut bb, &mut ctx, 10);
    assert_eq!(manager.goal(food).map(|g| g.state()), Some(GoalState::Fulfilled));
    assert_eq!(world.calls.harvest, harvested_before);
    assert!(world.pop(POP).food >= 70);
}
