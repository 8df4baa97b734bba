#![allow(dead_code)]

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};

use pop_core::{Blackboard, Location, TickContext, WorldMut, WorldView};
use pop_goals::{
    Activity, Building, Item, ItemStack, Path, PopGoalManager, PopWorldMut, PopWorldView,
    Recipe, Stat, Tile,
};

pub const WORLD_RADIUS: i32 = 60;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct Pop {
    pub location: Location,
    pub inventory: BTreeMap<Item, u32>,
    pub food: i32,
    pub water: i32,
    pub health: i32,
    pub activity: Activity,
    pub queued: VecDeque<Location>,
}

impl Pop {
    pub fn at(location: Location) -> Self {
        Self {
            location,
            inventory: BTreeMap::new(),
            food: 100,
            water: 100,
            health: 100,
            activity: Activity::Idle,
            queued: VecDeque::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Calls {
    pub pathfind: Cell<u32>,
    pub find_tiles: Cell<u32>,
    pub harvest: u32,
    pub build: u32,
}

fn bump(cell: &Cell<u32>) {
    cell.set(cell.get() + 1);
}

/// Deterministic grid world. Every tile inside `WORLD_RADIUS` exists and is walkable unless
/// listed otherwise; resources carry a finite stock.
#[derive(Debug, Default)]
pub struct TestWorld {
    pub pops: BTreeMap<u64, Pop>,
    pub tiles: BTreeMap<Location, Tile>,
    pub stock: BTreeMap<Location, u32>,
    pub recipes: Vec<Recipe>,
    /// Moves land as soon as they are queued.
    pub instant_moves: bool,
    /// Stat gained per consumed unit.
    pub consume_gain: i32,
    pub calls: Calls,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            instant_moves: true,
            consume_gain: 10,
            ..Self::default()
        }
    }

    pub fn with_pop(mut self, id: u64, location: Location) -> Self {
        self.pops.insert(id, Pop::at(location));
        self
    }

    pub fn pop(&self, id: u64) -> &Pop {
        &self.pops[&id]
    }

    pub fn pop_mut(&mut self, id: u64) -> &mut Pop {
        self.pops.get_mut(&id).expect("unknown pop")
    }

    pub fn put_resource(&mut self, location: Location, item: Item, amount: u32) {
        let mut tile = self.tile_or_default(location);
        tile.resource = Some(item);
        self.tiles.insert(location, tile);
        self.stock.insert(location, amount);
    }

    pub fn put_building(&mut self, location: Location, name: &'static str) {
        let mut tile = self.tile_or_default(location);
        tile.building = Some(name.into());
        self.tiles.insert(location, tile);
    }

    pub fn tile_building(&self, location: Location) -> Option<Cow<'static, str>> {
        self.tiles.get(&location).and_then(|t| t.building.clone())
    }

    pub fn give(&mut self, id: u64, item: Item, amount: u32) {
        *self.pop_mut(id).inventory.entry(item).or_default() += amount;
    }

    pub fn held(&self, id: u64, item: &Item) -> u32 {
        self.quantity(id, item)
    }

    /// Land one queued move per pop.
    pub fn step(&mut self) {
        for pop in self.pops.values_mut() {
            if let Some(next) = pop.queued.pop_front() {
                pop.location = next;
            }
        }
    }

    fn tile_or_default(&self, location: Location) -> Tile {
        self.tiles.get(&location).cloned().unwrap_or(Tile {
            location,
            building: None,
            resource: None,
            walkable: true,
        })
    }

    fn in_bounds(location: Location) -> bool {
        location.x.abs() <= WORLD_RADIUS && location.y.abs() <= WORLD_RADIUS
    }
}

impl WorldView for TestWorld {
    type Agent = u64;
}

impl WorldMut for TestWorld {}

impl PopWorldView for TestWorld {
    fn location(&self, agent: u64) -> Option<Location> {
        self.pops.get(&agent).map(|p| p.location)
    }

    fn quantity(&self, agent: u64, item: &Item) -> u32 {
        self.pops.get(&agent).map_or(0, |p| {
            p.inventory
                .iter()
                .filter(|(held, _)| item.matches(held))
                .map(|(_, n)| *n)
                .sum()
        })
    }

    fn stat(&self, agent: u64, stat: Stat) -> Option<i32> {
        let pop = self.pops.get(&agent)?;
        Some(match stat {
            Stat::Food => pop.food,
            Stat::Water => pop.water,
            Stat::Health => pop.health,
        })
    }

    fn activity(&self, agent: u64) -> Option<Activity> {
        self.pops.get(&agent).map(|p| p.activity)
    }

    fn tile(&self, location: Location) -> Option<Tile> {
        Self::in_bounds(location).then(|| self.tile_or_default(location))
    }

    fn find_tiles_with_resource_near(
        &self,
        location: Location,
        resource: &Item,
        distance: u32,
    ) -> Vec<Tile> {
        bump(&self.calls.find_tiles);
        self.tiles
            .values()
            .filter(|t| t.holds(resource) && location.manhattan(t.location) <= distance)
            .cloned()
            .collect()
    }

    fn pathfind(&self, agent: u64, target: Location) -> Option<Path> {
        bump(&self.calls.pathfind);
        let mut at = self.location(agent)?;
        if !Self::in_bounds(target) {
            return None;
        }
        let mut moves = Vec::new();
        while at != target {
            at = if at.x != target.x {
                at.offset((target.x - at.x).signum(), 0)
            } else {
                at.offset(0, (target.y - at.y).signum())
            };
            moves.push(at);
        }
        Some(Path { moves })
    }

    fn has_pending_moves(&self, agent: u64) -> bool {
        self.pops.get(&agent).is_some_and(|p| !p.queued.is_empty())
    }

    fn recipe(&self, item: &Item) -> Option<Recipe> {
        self.recipes
            .iter()
            .find(|r| item.matches(&r.result.item))
            .cloned()
    }
}

impl PopWorldMut for TestWorld {
    fn set_activity(&mut self, agent: u64, activity: Activity) {
        if let Some(pop) = self.pops.get_mut(&agent) {
            pop.activity = activity;
        }
    }

    fn add_item(&mut self, agent: u64, stack: &ItemStack) {
        self.give(agent, stack.item.clone(), stack.amount);
    }

    fn remove_item(&mut self, agent: u64, stack: &ItemStack) -> bool {
        if self.quantity(agent, &stack.item) < stack.amount {
            return false;
        }
        let pop = self.pop_mut(agent);
        let mut left = stack.amount;
        for (held, n) in pop.inventory.iter_mut() {
            if left == 0 {
                break;
            }
            if stack.item.matches(held) {
                let take = left.min(*n);
                *n -= take;
                left -= take;
            }
        }
        pop.inventory.retain(|_, n| *n > 0);
        true
    }

    fn queue_moves(&mut self, agent: u64, path: Path) {
        let instant = self.instant_moves;
        let pop = self.pop_mut(agent);
        if instant {
            if let Some(destination) = path.destination() {
                pop.location = destination;
            }
            pop.queued.clear();
        } else {
            pop.queued = path.moves.into();
        }
    }

    fn harvest(&mut self, agent: u64, location: Location, resource: &Item, max: u32) -> u32 {
        self.calls.harvest += 1;
        let Some(tile) = self.tiles.get_mut(&location) else {
            return 0;
        };
        let Some(found) = tile.resource.clone().filter(|r| resource.matches(r)) else {
            return 0;
        };
        let stock = self.stock.entry(location).or_default();
        let taken = max.min(*stock);
        *stock -= taken;
        if *stock == 0 {
            tile.resource = None;
        }
        if taken > 0 {
            self.give(agent, found, taken);
        }
        taken
    }

    fn build(&mut self, location: Location, building: &Building, agent: u64) -> bool {
        self.calls.build += 1;
        let held = building
            .materials
            .iter()
            .all(|m| self.quantity(agent, &m.item) >= m.amount);
        match self.tile(location) {
            Some(mut tile) if held && tile.walkable && !tile.has_building() => {
                tile.building = Some(building.name.clone());
                self.tiles.insert(location, tile);
                true
            }
            _ => false,
        }
    }

    fn consume(&mut self, agent: u64, item: &Item, stat: Stat) -> bool {
        if !self.remove_item(agent, &ItemStack::new(item.clone(), 1)) {
            return false;
        }
        let gain = self.consume_gain;
        let pop = self.pop_mut(agent);
        let value = match stat {
            Stat::Food => &mut pop.food,
            Stat::Water => &mut pop.water,
            Stat::Health => &mut pop.health,
        };
        *value = (*value + gain).min(100);
        true
    }
}

/// Run `ticks` scheduling steps, landing queued moves after each.
pub fn run(
    manager: &mut PopGoalManager<u64>,
    world: &mut TestWorld,
    bb: &mut Blackboard,
    ctx: &mut TickContext,
    ticks: u32,
) {
    for _ in 0..ticks {
        manager.perform_goals(ctx, world, bb);
        world.step();
        *ctx = ctx.next();
    }
}
