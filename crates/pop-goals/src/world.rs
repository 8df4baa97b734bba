//! The engine's view of the simulated world.
//!
//! Terrain, tile storage, pathfinding, inventories and recipes all live outside this crate.
//! A host simulation implements [`PopWorldView`] and [`PopWorldMut`] on its world type; the
//! engine only ever talks to the world through these two traits.

use std::borrow::Cow;
use std::fmt;

use pop_core::{Location, WorldMut, WorldView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stat {
    Food,
    Water,
    Health,
}

/// Transient activity label shown for a pop (what it is doing right now).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activity {
    #[default]
    Idle,
    Working,
    Moving,
    Sleeping,
    Eating,
    Drinking,
    Searching,
    Gathering,
    Building,
    Crafting,
    Farming,
    Wandering,
}

/// An item type. A category-only item (`wood`) stands for any named item of that category
/// (`wood:oak`, `wood:pine`) when used as a requirement or a search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Item {
    pub category: Cow<'static, str>,
    pub name: Option<Cow<'static, str>>,
}

impl Item {
    pub fn category(category: impl Into<Cow<'static, str>>) -> Self {
        Self {
            category: category.into(),
            name: None,
        }
    }

    pub fn named(
        category: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            category: category.into(),
            name: Some(name.into()),
        }
    }

    pub fn food() -> Self {
        Self::category("food")
    }

    pub fn water() -> Self {
        Self::category("water")
    }

    pub fn wood() -> Self {
        Self::category("wood")
    }

    pub fn stone() -> Self {
        Self::category("stone")
    }

    /// `category` or `category:name`; also the resource-location index key.
    pub fn key(&self) -> String {
        match &self.name {
            Some(name) => format!("{}:{}", self.category, name),
            None => self.category.to_string(),
        }
    }

    /// Whether `other` satisfies a request for `self`.
    pub fn matches(&self, other: &Item) -> bool {
        if self.category != other.category {
            return false;
        }
        match &self.name {
            None => true,
            Some(name) => other.name.as_ref() == Some(name),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemStack {
    pub item: Item,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(item: Item, amount: u32) -> Self {
        Self { item, amount }
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.item, self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Building {
    pub name: Cow<'static, str>,
    pub materials: Vec<ItemStack>,
}

impl Building {
    pub fn new(name: impl Into<Cow<'static, str>>, materials: Vec<ItemStack>) -> Self {
        Self {
            name: name.into(),
            materials,
        }
    }

    /// A small hut: 10 wood, 5 stone.
    pub fn hut() -> Self {
        Self::new(
            "hut",
            vec![
                ItemStack::new(Item::wood(), 10),
                ItemStack::new(Item::stone(), 5),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub materials: Vec<ItemStack>,
    pub result: ItemStack,
}

impl Recipe {
    /// Materials with repeated items summed, in first-listed order.
    pub fn requirements(&self) -> Vec<ItemStack> {
        let mut merged: Vec<ItemStack> = Vec::with_capacity(self.materials.len());
        for stack in &self.materials {
            match merged.iter_mut().find(|m| m.item == stack.item) {
                Some(m) => m.amount = m.amount.saturating_add(stack.amount),
                None => merged.push(stack.clone()),
            }
        }
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub location: Location,
    /// Name of the building standing on the tile.
    pub building: Option<Cow<'static, str>>,
    /// Harvestable resource on the tile.
    pub resource: Option<Item>,
    pub walkable: bool,
}

impl Tile {
    pub fn has_building(&self) -> bool {
        self.building.is_some()
    }

    pub fn holds(&self, resource: &Item) -> bool {
        self.resource.as_ref().is_some_and(|r| resource.matches(r))
    }
}

/// A sequence of single-tile moves, first move first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    pub moves: Vec<Location>,
}

impl Path {
    pub fn destination(&self) -> Option<Location> {
        self.moves.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn apply(self, lhs: i32, rhs: i32) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Le => lhs <= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

/// World queries the engine needs.
pub trait PopWorldView: WorldView {
    fn location(&self, agent: Self::Agent) -> Option<Location>;

    /// Quantity held. Category-only items count every named item of that category.
    fn quantity(&self, agent: Self::Agent, item: &Item) -> u32;

    fn has_item(&self, agent: Self::Agent, item: &Item) -> bool {
        self.quantity(agent, item) > 0
    }

    fn stat(&self, agent: Self::Agent, stat: Stat) -> Option<i32>;

    fn activity(&self, agent: Self::Agent) -> Option<Activity>;

    fn tile(&self, location: Location) -> Option<Tile>;

    fn find_tiles_with_resource_near(
        &self,
        location: Location,
        resource: &Item,
        distance: u32,
    ) -> Vec<Tile>;

    fn distance(&self, a: Location, b: Location) -> u32 {
        a.manhattan(b)
    }

    fn pathfind(&self, agent: Self::Agent, target: Location) -> Option<Path>;

    /// Whether the agent still has queued moves that have not landed yet.
    fn has_pending_moves(&self, agent: Self::Agent) -> bool;

    fn recipe(&self, item: &Item) -> Option<Recipe>;
}

/// World mutations the engine performs.
pub trait PopWorldMut: WorldMut + PopWorldView {
    fn set_activity(&mut self, agent: Self::Agent, activity: Activity);

    fn add_item(&mut self, agent: Self::Agent, stack: &ItemStack);

    /// Remove `stack` (category-aware). Returns `false`, changing nothing, when the agent holds
    /// less than requested.
    fn remove_item(&mut self, agent: Self::Agent, stack: &ItemStack) -> bool;

    /// Hand a path to the movement system. Moves land on later ticks.
    fn queue_moves(&mut self, agent: Self::Agent, path: Path);

    /// Harvest up to `max` of `resource` from the tile at `location` into the agent's
    /// inventory. Returns the amount harvested.
    fn harvest(&mut self, agent: Self::Agent, location: Location, resource: &Item, max: u32)
        -> u32;

    fn build(&mut self, location: Location, building: &Building, agent: Self::Agent) -> bool;

    /// Eat or drink one unit of `item`, raising `stat`. Returns `false` when nothing was
    /// consumed.
    fn consume(&mut self, agent: Self::Agent, item: &Item, stat: Stat) -> bool;
}
