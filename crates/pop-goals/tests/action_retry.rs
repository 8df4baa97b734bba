mod support;

use pop_core::{Blackboard, Location, TickContext};
use pop_goals::{
    ActionKind, ActionRetryPolicy, ActionState, ActionTree, Activity, Building, Target,
};
use pop_tools::{install_log, take_log};
use support::TestWorld;

const POP: u64 = 1;

fn hut_at(location: Location) -> ActionKind {
    ActionKind::build(Building::hut(), location)
}

#[test]
fn blocked_action_finishes_once_its_outcome_exists_after_enough_retries() {
    support::init_tracing();
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    let mut bb = Blackboard::new();
    let ctx = TickContext::new(0, 1);
    let site = Location::new(0, 0);

    let mut tree = ActionTree::new(ActionRetryPolicy::default());
    let build = tree.insert(hut_at(site), None, POP, &world, &mut bb);

    for expected in 1..=5 {
        assert!(!tree.execute(build, &ctx, POP, &mut world, &mut bb));
        assert_eq!(tree.get(build).map(|n| n.retries()), Some(expected));
    }

    // Someone else builds the hut. The sixth blocked attempt accepts it.
    world.put_building(site, "hut");
    assert!(tree.execute(build, &ctx, POP, &mut world, &mut bb));
    assert_eq!(tree.get(build).map(|n| n.state()), Some(ActionState::Done));
    assert_eq!(world.calls.build, 0);

    // Done is terminal: no more retries, no side effects.
    for _ in 0..3 {
        assert!(tree.execute(build, &ctx, POP, &mut world, &mut bb));
    }
    assert_eq!(tree.get(build).map(|n| n.retries()), Some(6));
    assert_eq!(world.calls.build, 0);
}

#[test]
fn satisfied_outcome_is_ignored_before_the_threshold() {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    let mut bb = Blackboard::new();
    let ctx = TickContext::new(0, 1);
    let site = Location::new(0, 0);
    world.put_building(site, "hut");

    let mut tree = ActionTree::new(ActionRetryPolicy::default());
    let build = tree.insert(hut_at(site), None, POP, &world, &mut bb);

    for _ in 0..5 {
        assert!(!tree.execute(build, &ctx, POP, &mut world, &mut bb));
    }
    assert!(tree.execute(build, &ctx, POP, &mut world, &mut bb));
}

#[test]
fn action_blocked_past_budget_resets() {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    let mut bb = Blackboard::new();
    install_log(&mut bb);
    let ctx = TickContext::new(0, 1);

    let mut tree = ActionTree::new(ActionRetryPolicy::default());
    let build = tree.insert(hut_at(Location::new(4, 4)), None, POP, &world, &mut bb);

    let mut last = 0;
    for _ in 0..15 {
        assert!(!tree.execute(build, &ctx, POP, &mut world, &mut bb));
        let retries = tree.get(build).map_or(0, |n| n.retries());
        assert!(retries > last);
        last = retries;
    }
    assert_eq!(last, 15);
    assert_eq!(take_log(&mut bb).count("action.reset"), 0);

    assert!(!tree.execute(build, &ctx, POP, &mut world, &mut bb));
    let node = tree.get(build).expect("node survives reset");
    assert_eq!(node.retries(), 0);
    assert_eq!(node.state(), ActionState::Inactive);
    assert_eq!(node.prep_conditions().len(), 4);
    assert_eq!(take_log(&mut bb).count("action.reset"), 1);
}

#[test]
fn custom_budget_is_honoured() {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    let mut bb = Blackboard::new();
    let ctx = TickContext::new(0, 1);
    let policy = ActionRetryPolicy {
        finish_if_satisfied_after: 1,
        reset_after: 2,
    };

    let mut tree = ActionTree::new(policy);
    let build = tree.insert(hut_at(Location::new(4, 4)), None, POP, &world, &mut bb);
    tree.execute(build, &ctx, POP, &mut world, &mut bb);
    tree.execute(build, &ctx, POP, &mut world, &mut bb);
    assert_eq!(tree.get(build).map(|n| n.retries()), Some(2));
    tree.execute(build, &ctx, POP, &mut world, &mut bb);
    assert_eq!(tree.get(build).map(|n| n.retries()), Some(0));
}

#[test]
fn single_tick_completion_sets_activity_and_finishes() {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    let mut bb = Blackboard::new();
    let ctx = TickContext::new(0, 1);

    let mut tree = ActionTree::new(ActionRetryPolicy::default());
    let walk = tree.insert(
        ActionKind::move_to(Target::Fixed(Location::new(3, -2))),
        None,
        POP,
        &world,
        &mut bb,
    );

    assert!(tree.execute(walk, &ctx, POP, &mut world, &mut bb));
    assert_eq!(world.pop(POP).location, Location::new(3, -2));
    assert_eq!(world.pop(POP).activity, Activity::Moving);
    assert_eq!(tree.get(walk).map(|n| n.state()), Some(ActionState::Done));
}

#[test]
fn started_action_completes_through_update() {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    world.instant_moves = false;
    let mut bb = Blackboard::new();
    let mut ctx = TickContext::new(0, 1);

    let mut tree = ActionTree::new(ActionRetryPolicy::default());
    let walk = tree.insert(
        ActionKind::move_to(Target::Fixed(Location::new(3, 0))),
        None,
        POP,
        &world,
        &mut bb,
    );

    assert!(!tree.execute(walk, &ctx, POP, &mut world, &mut bb));
    assert_eq!(tree.get(walk).map(|n| n.state()), Some(ActionState::Active));
    assert!(tree.is_moving(walk, POP, &world));

    let mut ticks = 0;
    while !tree.execute(walk, &ctx, POP, &mut world, &mut bb) {
        world.step();
        ctx = ctx.next();
        ticks += 1;
        assert!(ticks < 10, "move never arrived");
    }
    assert_eq!(ticks, 3);
    assert_eq!(world.pop(POP).location, Location::new(3, 0));
}

#[test]
fn drained_move_queue_triggers_a_repath() {
    let mut world = TestWorld::new().with_pop(POP, Location::new(0, 0));
    world.instant_moves = false;
    let mut bb = Blackboard::new();
    let ctx = TickContext::new(0, 1);

    let mut tree = ActionTree::new(ActionRetryPolicy::default());
    let walk = tree.insert(
        ActionKind::move_to(Target::Fixed(Location::new(0, 4))),
        None,
        POP,
        &world,
        &mut bb,
    );
    tree.execute(walk, &ctx, POP, &mut world, &mut bb);
    assert_eq!(world.calls.pathfind.get(), 1);

    world.pop_mut(POP).queued.clear();
    assert!(!tree.execute(walk, &ctx, POP, &mut world, &mut bb));
    assert_eq!(world.calls.pathfind.get(), 2);
    match tree.get(walk).map(|n| n.kind()) {
        Some(ActionKind::Move(m)) => assert_eq!(m.repaths(), 1),
        other => panic!("unexpected node {other:?}"),
    }
    assert_eq!(world.pop(POP).queued.len(), 4);
}
