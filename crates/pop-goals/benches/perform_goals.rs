use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pop_core::{Blackboard, Location, TickContext};
use pop_goals::{tick_pops, EngineConfig, Goal, GoalKind, GoalPriority, Item, ItemStack, PopGoalManager};

#[path = "../tests/support/mod.rs"]
mod support;

use support::TestWorld;

fn make_world(pops: u64) -> TestWorld {
    let mut world = TestWorld::new();
    world.consume_gain = 1;
    for id in 0..pops {
        let x = (id % 32) as i32 - 16;
        let y = (id / 32) as i32 - 16;
        world = world.with_pop(id, Location::new(x, y));
        world.pop_mut(id).food = 20;
        world.put_resource(Location::new(x, y + 1), Item::named("food", "berries"), u32::MAX);
    }
    world
}

fn make_managers(pops: u64) -> Vec<PopGoalManager<u64>> {
    (0..pops)
        .map(|id| {
            let mut manager = PopGoalManager::with_default_goals(id, EngineConfig::default());
            manager.add_goal(Goal::new(
                GoalKind::Gather {
                    stack: ItemStack::new(Item::wood(), 10),
                },
                GoalPriority::Low,
            ));
            manager
        })
        .collect()
}

fn bench_tick_pops(c: &mut Criterion) {
    let mut group = c.benchmark_group("pop-goals/tick_pops");

    for &n in &[16u64, 256u64] {
        let mut world = make_world(n);
        let mut managers = make_managers(n);
        let mut bb = Blackboard::new();
        let mut ctx = TickContext::new(0, 0xC0FFEE);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                tick_pops(&ctx, &mut world, &mut bb, &mut managers);
                ctx = ctx.next();
                black_box(managers[0].in_progress());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tick_pops);
criterion_main!(benches);
