use std::borrow::Cow;

use pop_core::{AgentId, Blackboard, Location, Scope, ScopeId, TickContext};

use crate::condition::{Condition, Target, TARGET_LOCATION};
use crate::world::{
    Activity, Building, CompareOp, Item, ItemStack, PopWorldMut, PopWorldView, Recipe, Stat,
};

/// Blackboard scopes visible to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeScopes {
    pub own: ScopeId,
    pub parent: Option<ScopeId>,
}

impl NodeScopes {
    /// Where a node publishes results meant for its siblings.
    pub fn publish(self) -> ScopeId {
        self.parent.unwrap_or(self.own)
    }
}

/// The closed set of things a pop can do.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Move(MoveTo),
    LocateResource(LocateResource),
    Harvest(Harvest),
    Gather(Gather),
    Build(BuildAt),
    Craft(Craft),
    Consume(Consume),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveTo {
    pub target: Target,
    destination: Option<Location>,
    repaths: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocateResource {
    pub resource: Item,
    pub radius: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Harvest {
    pub stack: ItemStack,
    pub target: Target,
    /// Exact resource last seen on the target tile, for forgetting it once depleted.
    last_seen: Option<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gather {
    pub stack: ItemStack,
    pub radius: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildAt {
    pub building: Building,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Craft {
    pub item: Item,
    recipe: Option<Recipe>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consume {
    pub item: Item,
    pub stat: Stat,
    pub threshold: i32,
}

impl ActionKind {
    pub fn move_to(target: Target) -> Self {
        ActionKind::Move(MoveTo {
            target,
            destination: None,
            repaths: 0,
        })
    }

    pub fn locate(resource: Item, radius: u32) -> Self {
        ActionKind::LocateResource(LocateResource { resource, radius })
    }

    pub fn harvest(stack: ItemStack, target: Target) -> Self {
        ActionKind::Harvest(Harvest {
            stack,
            target,
            last_seen: None,
        })
    }

    pub fn gather(stack: ItemStack, radius: u32) -> Self {
        ActionKind::Gather(Gather { stack, radius })
    }

    pub fn build(building: Building, location: Location) -> Self {
        ActionKind::Build(BuildAt { building, location })
    }

    pub fn craft(item: Item) -> Self {
        ActionKind::Craft(Craft { item, recipe: None })
    }

    pub fn consume(item: Item, stat: Stat, threshold: i32) -> Self {
        ActionKind::Consume(Consume {
            item,
            stat,
            threshold,
        })
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            ActionKind::Move(m) => match m.target {
                Target::Fixed(l) => format!("move({},{})", l.x, l.y).into(),
                Target::Discovered(_) => "move(discovered)".into(),
            },
            ActionKind::LocateResource(l) => format!("locate({})", l.resource).into(),
            ActionKind::Harvest(h) => format!("harvest({})", h.stack).into(),
            ActionKind::Gather(g) => format!("gather({})", g.stack).into(),
            ActionKind::Build(b) => format!("build({})", b.building.name).into(),
            ActionKind::Craft(c) => format!("craft({})", c.item).into(),
            ActionKind::Consume(c) => format!("consume({})", c.item).into(),
        }
    }

    /// Activity label applied to the pop when the action starts.
    pub fn activity(&self) -> Option<Activity> {
        Some(match self {
            ActionKind::Move(_) => Activity::Moving,
            ActionKind::LocateResource(_) => Activity::Searching,
            ActionKind::Harvest(_) | ActionKind::Gather(_) => Activity::Gathering,
            ActionKind::Build(_) => Activity::Building,
            ActionKind::Craft(_) => Activity::Crafting,
            ActionKind::Consume(c) if c.stat == Stat::Water => Activity::Drinking,
            ActionKind::Consume(_) => Activity::Eating,
        })
    }

    pub fn is_movement(&self) -> bool {
        matches!(self, ActionKind::Move(_))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, ActionKind::Gather(_))
    }

    /// Compute `(prep, post)` for a node.
    pub(crate) fn determine_conditions<W>(
        &mut self,
        scopes: NodeScopes,
        world: &W,
    ) -> (Vec<Condition>, Vec<Condition>)
    where
        W: PopWorldView,
    {
        match self {
            ActionKind::Move(m) => {
                let prep = match m.target {
                    Target::Discovered(_) => vec![Condition::target_known(m.target)],
                    Target::Fixed(_) => Vec::new(),
                };
                (prep, vec![Condition::on_location(m.target)])
            }
            ActionKind::LocateResource(_) => (
                Vec::new(),
                vec![Condition::target_known(Target::Discovered(scopes.publish()))],
            ),
            ActionKind::Harvest(h) => (
                vec![Condition::on_location(h.target)],
                vec![Condition::has_items(h.stack.clone())],
            ),
            ActionKind::Gather(g) => (Vec::new(), vec![Condition::has_items(g.stack.clone())]),
            ActionKind::Build(b) => {
                let mut prep: Vec<Condition> = b
                    .building
                    .materials
                    .iter()
                    .cloned()
                    .map(Condition::has_items)
                    .collect();
                prep.push(Condition::on_location(Target::Fixed(b.location)));
                prep.push(Condition::building_exists(b.building.name.clone(), b.location).invert());
                let post = vec![Condition::building_exists(
                    b.building.name.clone(),
                    b.location,
                )];
                (prep, post)
            }
            ActionKind::Craft(c) => {
                c.recipe = world.recipe(&c.item);
                match &c.recipe {
                    Some(recipe) => (
                        recipe
                            .requirements()
                            .into_iter()
                            .map(Condition::has_items)
                            .collect(),
                        vec![Condition::has_items(recipe.result.clone())],
                    ),
                    None => {
                        tracing::error!(item = %c.item, "no recipe for crafted item");
                        (
                            Vec::new(),
                            vec![Condition::has_items(ItemStack::new(c.item.clone(), 1))],
                        )
                    }
                }
            }
            ActionKind::Consume(c) => (
                vec![Condition::has_items(ItemStack::new(c.item.clone(), 1))],
                vec![Condition::entity_property(
                    c.stat,
                    CompareOp::Ge,
                    c.threshold,
                )],
            ),
        }
    }

    /// Sub-actions of a composite, in execution order.
    pub(crate) fn determine_actions(&self, scopes: NodeScopes) -> Vec<ActionKind> {
        match self {
            ActionKind::Gather(g) => {
                let found = Target::Discovered(scopes.own);
                vec![
                    ActionKind::locate(g.stack.item.clone(), g.radius),
                    ActionKind::move_to(found),
                    ActionKind::harvest(g.stack.clone(), found),
                ]
            }
            _ => Vec::new(),
        }
    }

    /// Drop per-run state so the next `start` begins from scratch.
    pub(crate) fn reset(&mut self) {
        match self {
            ActionKind::Move(m) => {
                m.destination = None;
                m.repaths = 0;
            }
            ActionKind::Harvest(h) => h.last_seen = None,
            ActionKind::Craft(c) => c.recipe = None,
            _ => {}
        }
    }

    /// First phase. `true` means the work finished within this tick.
    pub(crate) fn start<W>(
        &mut self,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
        scopes: NodeScopes,
    ) -> bool
    where
        W: PopWorldMut,
    {
        match self {
            ActionKind::Move(m) => m.start(agent, world, blackboard),
            ActionKind::LocateResource(l) => l.run(agent, world, blackboard, scopes),
            ActionKind::Harvest(h) => h.run(ctx, agent, world, blackboard),
            ActionKind::Build(b) => b.run(agent, world),
            ActionKind::Craft(c) => c.run(agent, world),
            ActionKind::Consume(c) => c.run(agent, world),
            // Composites are driven by the tree.
            ActionKind::Gather(_) => false,
        }
    }

    /// Second phase, polled every tick while active.
    pub(crate) fn update<W>(
        &mut self,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
        scopes: NodeScopes,
    ) -> bool
    where
        W: PopWorldMut,
    {
        match self {
            ActionKind::Move(m) => m.update(agent, world, blackboard),
            _ => self.start(ctx, agent, world, blackboard, scopes),
        }
    }
}

impl MoveTo {
    pub fn repaths(&self) -> u32 {
        self.repaths
    }

    fn start<W: PopWorldMut>(&mut self, agent: W::Agent, world: &mut W, bb: &Blackboard) -> bool {
        let Some(destination) = self.target.resolve(agent.stable_id(), bb) else {
            return false;
        };
        self.destination = Some(destination);
        if world.location(agent) == Some(destination) {
            return true;
        }
        self.issue_path(agent, world, destination);
        world.location(agent) == Some(destination)
    }

    fn update<W: PopWorldMut>(&mut self, agent: W::Agent, world: &mut W, bb: &Blackboard) -> bool {
        let Some(destination) = self.destination else {
            return self.start(agent, world, bb);
        };
        if world.location(agent) == Some(destination) {
            return true;
        }
        if !world.has_pending_moves(agent) {
            // The queue drained without reaching the target: blocked tile or lost path.
            self.repaths += 1;
            tracing::debug!(
                agent = agent.stable_id(),
                repaths = self.repaths,
                "move queue drained early, repathing"
            );
            self.issue_path(agent, world, destination);
        }
        world.location(agent) == Some(destination)
    }

    fn issue_path<W: PopWorldMut>(&self, agent: W::Agent, world: &mut W, destination: Location) {
        match world.pathfind(agent, destination) {
            Some(path) => world.queue_moves(agent, path),
            None => tracing::debug!(
                agent = agent.stable_id(),
                x = destination.x,
                y = destination.y,
                "no path to destination"
            ),
        }
    }
}

impl LocateResource {
    fn run<W: PopWorldView>(
        &self,
        agent: W::Agent,
        world: &W,
        bb: &mut Blackboard,
        scopes: NodeScopes,
    ) -> bool {
        let Some(here) = world.location(agent) else {
            return false;
        };
        let nearest = |a: &Location, b: &Location| {
            (world.distance(here, *a), *a).cmp(&(world.distance(here, *b), *b))
        };

        let remembered = bb
            .get_resource_locations(&self.resource.key())
            .into_iter()
            .filter(|l| world.distance(here, *l) <= self.radius)
            .filter(|l| world.tile(*l).is_some_and(|t| t.holds(&self.resource)))
            .min_by(nearest);

        let found = remembered.or_else(|| {
            let tiles = world.find_tiles_with_resource_near(here, &self.resource, self.radius);
            for tile in &tiles {
                if let Some(resource) = &tile.resource {
                    bb.add_resource_location(&resource.key(), tile.location);
                }
            }
            tiles
                .iter()
                .filter(|t| t.holds(&self.resource))
                .map(|t| t.location)
                .min_by(nearest)
        });

        let Some(location) = found else {
            tracing::debug!(
                agent = agent.stable_id(),
                resource = %self.resource,
                radius = self.radius,
                "resource not found"
            );
            return false;
        };

        let scope = Scope::Action {
            entity: agent.stable_id(),
            action: scopes.publish(),
        };
        bb.set(scope, TARGET_LOCATION, location);
        tracing::debug!(
            agent = agent.stable_id(),
            resource = %self.resource,
            x = location.x,
            y = location.y,
            "resource located"
        );
        true
    }
}

impl Harvest {
    fn run<W: PopWorldMut>(
        &mut self,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        bb: &mut Blackboard,
    ) -> bool {
        let held = world.quantity(agent, &self.stack.item);
        if held >= self.stack.amount {
            return true;
        }
        let Some(location) = self.target.resolve(agent.stable_id(), bb) else {
            return false;
        };
        if let Some(resource) = world.tile(location).and_then(|t| t.resource) {
            self.last_seen = Some(resource);
        }

        let harvested = world.harvest(agent, location, &self.stack.item, self.stack.amount - held);
        if harvested == 0 && !world.tile(location).is_some_and(|t| t.holds(&self.stack.item)) {
            let mut keys = vec![self.stack.item.key()];
            keys.extend(self.last_seen.as_ref().map(Item::key));
            for key in keys {
                bb.remove_resource_location(&key, location);
            }
            pop_tools::emit(
                bb,
                pop_tools::TraceEvent::new(ctx.tick, "resource.depleted")
                    .with_a(agent.stable_id()),
            );
        }
        world.quantity(agent, &self.stack.item) >= self.stack.amount
    }
}

impl BuildAt {
    fn run<W: PopWorldMut>(&self, agent: W::Agent, world: &mut W) -> bool {
        if !world.build(self.location, &self.building, agent) {
            return false;
        }
        for stack in &self.building.materials {
            if !world.remove_item(agent, stack) {
                tracing::warn!(
                    agent = agent.stable_id(),
                    material = %stack,
                    "building placed but material could not be removed"
                );
            }
        }
        tracing::info!(
            agent = agent.stable_id(),
            building = %self.building.name,
            x = self.location.x,
            y = self.location.y,
            "building placed"
        );
        true
    }
}

impl Craft {
    fn run<W: PopWorldMut>(&self, agent: W::Agent, world: &mut W) -> bool {
        let Some(recipe) = &self.recipe else {
            tracing::error!(item = %self.item, "cannot craft without a recipe");
            return false;
        };
        let requirements = recipe.requirements();
        if !requirements
            .iter()
            .all(|m| world.quantity(agent, &m.item) >= m.amount)
        {
            return false;
        }
        for stack in &requirements {
            if !world.remove_item(agent, stack) {
                tracing::warn!(
                    agent = agent.stable_id(),
                    material = %stack,
                    result = %recipe.result,
                    "material could not be removed, crafting abandoned"
                );
                return false;
            }
        }
        world.add_item(agent, &recipe.result);
        tracing::debug!(agent = agent.stable_id(), result = %recipe.result, "crafted");
        true
    }
}

impl Consume {
    fn run<W: PopWorldMut>(&self, agent: W::Agent, world: &mut W) -> bool {
        let reached = |world: &W| {
            world
                .stat(agent, self.stat)
                .is_some_and(|v| v >= self.threshold)
        };
        if reached(&*world) {
            return true;
        }
        if !world.consume(agent, &self.item, self.stat) {
            return false;
        }
        reached(&*world)
    }
}
