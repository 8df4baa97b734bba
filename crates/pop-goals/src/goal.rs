//! Goals: a desired world state plus the ordered plan of actions that reaches it.

use std::fmt;

use pop_core::{AgentId, Blackboard, Location, TickContext};
use pop_tools::TraceEvent;

use crate::action::{ActionId, ActionKind, ActionNode, ActionState, ActionTree};
use crate::condition::{all_hold, Condition, Target};
use crate::config::EngineConfig;
use crate::error::PlanError;
use crate::world::{Building, CompareOp, Item, ItemStack, PopWorldMut, PopWorldView, Stat};

/// Extra food gathered on top of the deficit.
const FOOD_MARGIN: i32 = 15;
/// Extra water gathered on top of the deficit.
const WATER_MARGIN: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoalId(u64);

impl GoalId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Ordering is meaningful: `High > Medium > Low > Background`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum GoalPriority {
    Background,
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalState {
    #[default]
    Inactive,
    Active,
    Fulfilled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GoalKind {
    /// Keep the food stat at or above `min`.
    Food { min: i32 },
    /// Keep the water stat at or above `min`.
    Drink { min: i32 },
    Gather { stack: ItemStack },
    Build { building: Building, location: Location },
    Craft { item: Item },
}

impl GoalKind {
    /// Recurring goals are re-armed after fulfilment whenever their prep conditions hold again.
    pub fn is_recurring(&self) -> bool {
        matches!(self, GoalKind::Food { .. } | GoalKind::Drink { .. })
    }

    fn conditions(&self) -> (Vec<Condition>, Vec<Condition>) {
        match self {
            GoalKind::Food { min } => stat_conditions(Stat::Food, *min),
            GoalKind::Drink { min } => stat_conditions(Stat::Water, *min),
            GoalKind::Gather { stack } => (Vec::new(), vec![Condition::has_items(stack.clone())]),
            GoalKind::Build { building, location } => {
                let exists = Condition::building_exists(building.name.clone(), *location);
                (vec![exists.clone().invert()], vec![exists])
            }
            GoalKind::Craft { item } => (
                Vec::new(),
                vec![Condition::has_items(ItemStack::new(item.clone(), 1))],
            ),
        }
    }

    /// The ordered action plan for the agent's current state.
    pub fn plan<W>(
        &self,
        agent: W::Agent,
        world: &W,
        config: &EngineConfig,
    ) -> Result<Vec<ActionKind>, PlanError>
    where
        W: PopWorldView,
    {
        let radius = config.locate_radius;
        let plan = match self {
            GoalKind::Food { min } => {
                need_plan(agent, world, Stat::Food, Item::food(), *min, FOOD_MARGIN, radius)?
            }
            GoalKind::Drink { min } => {
                need_plan(agent, world, Stat::Water, Item::water(), *min, WATER_MARGIN, radius)?
            }
            GoalKind::Gather { stack } => vec![ActionKind::gather(stack.clone(), radius)],
            GoalKind::Build { building, location } => building
                .materials
                .iter()
                .map(|m| ActionKind::gather(m.clone(), radius))
                .chain([
                    ActionKind::move_to(Target::Fixed(*location)),
                    ActionKind::build(building.clone(), *location),
                ])
                .collect(),
            GoalKind::Craft { item } => {
                let recipe = world
                    .recipe(item)
                    .ok_or_else(|| PlanError::MissingRecipe(item.key()))?;
                recipe
                    .requirements()
                    .into_iter()
                    .map(|m| ActionKind::gather(m, radius))
                    .chain([ActionKind::craft(item.clone())])
                    .collect()
            }
        };
        Ok(plan)
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalKind::Food { min } => write!(f, "food(>={min})"),
            GoalKind::Drink { min } => write!(f, "drink(>={min})"),
            GoalKind::Gather { stack } => write!(f, "gather({stack})"),
            GoalKind::Build { building, location } => {
                write!(f, "build({} @ {},{})", building.name, location.x, location.y)
            }
            GoalKind::Craft { item } => write!(f, "craft({item})"),
        }
    }
}

fn stat_conditions(stat: Stat, min: i32) -> (Vec<Condition>, Vec<Condition>) {
    (
        vec![Condition::entity_property(stat, CompareOp::Lt, min)],
        vec![Condition::entity_property(stat, CompareOp::Ge, min)],
    )
}

/// Gather `margin + min - current` of the item, then consume it until the stat recovers.
fn need_plan<W: PopWorldView>(
    agent: W::Agent,
    world: &W,
    stat: Stat,
    item: Item,
    min: i32,
    margin: i32,
    radius: u32,
) -> Result<Vec<ActionKind>, PlanError> {
    let current = world
        .stat(agent, stat)
        .ok_or(PlanError::UnknownAgent(agent.stable_id()))?;
    if current >= min {
        return Ok(Vec::new());
    }
    // Thresholds come from config and stats from the host; neither is bounded.
    let deficit = i64::from(margin) + i64::from(min) - i64::from(current);
    let amount = u32::try_from(deficit).unwrap_or(u32::MAX);
    Ok(vec![
        ActionKind::gather(ItemStack::new(item.clone(), amount), radius),
        ActionKind::consume(item, stat, min),
    ])
}

pub struct Goal {
    id: GoalId,
    kind: GoalKind,
    priority: GoalPriority,
    state: GoalState,
    prep: Vec<Condition>,
    post: Vec<Condition>,
    tree: ActionTree,
    actions: Vec<ActionId>,
    fulfilled: bool,
    tries: u32,
    config: EngineConfig,
    last_plan_error: Option<PlanError>,
}

impl Goal {
    pub fn new(kind: GoalKind, priority: GoalPriority) -> Self {
        let config = EngineConfig::default();
        let (prep, post) = kind.conditions();
        Self {
            id: GoalId(0),
            kind,
            priority,
            state: GoalState::Inactive,
            prep,
            post,
            tree: ActionTree::new(config.action),
            actions: Vec::new(),
            fulfilled: false,
            tries: 0,
            config,
            last_plan_error: None,
        }
    }

    pub fn food(min: i32) -> Self {
        Self::new(GoalKind::Food { min }, GoalPriority::High)
    }

    pub fn drink(min: i32) -> Self {
        Self::new(GoalKind::Drink { min }, GoalPriority::High)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.configure(config);
        self
    }

    /// Applies to plans computed from now on.
    pub(crate) fn configure(&mut self, config: EngineConfig) {
        self.config = config;
        if self.tree.is_empty() {
            self.tree = ActionTree::new(config.action);
        }
    }

    pub(crate) fn assign_id(&mut self, id: GoalId) {
        self.id = id;
    }

    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn kind(&self) -> &GoalKind {
        &self.kind
    }

    pub fn priority(&self) -> GoalPriority {
        self.priority
    }

    pub fn state(&self) -> GoalState {
        self.state
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn is_recurring(&self) -> bool {
        self.kind.is_recurring()
    }

    pub fn prep_conditions(&self) -> &[Condition] {
        &self.prep
    }

    pub fn post_conditions(&self) -> &[Condition] {
        &self.post
    }

    /// Top-level actions, in execution order.
    pub fn actions(&self) -> &[ActionId] {
        &self.actions
    }

    pub fn tree(&self) -> &ActionTree {
        &self.tree
    }

    pub fn action(&self, index: usize) -> Option<&ActionNode> {
        self.actions.get(index).and_then(|id| self.tree.get(*id))
    }

    pub fn last_plan_error(&self) -> Option<&PlanError> {
        self.last_plan_error.as_ref()
    }

    fn all_actions_finished(&self) -> bool {
        self.actions
            .iter()
            .all(|id| self.tree.get(*id).map_or(true, ActionNode::is_finished))
    }

    /// Post conditions hold and every action has finished.
    pub fn is_fulfilled<W: PopWorldView>(
        &self,
        agent: W::Agent,
        world: &W,
        blackboard: &Blackboard,
    ) -> bool {
        self.fulfilled
            || (all_hold(&self.post, agent, world, blackboard) && self.all_actions_finished())
    }

    pub fn prep_holds<W: PopWorldView>(
        &self,
        agent: W::Agent,
        world: &W,
        blackboard: &Blackboard,
    ) -> bool {
        all_hold(&self.prep, agent, world, blackboard)
    }

    /// Not fulfilled, a plan exists (computed here when missing) and prep conditions hold.
    pub fn can_execute<W: PopWorldView>(
        &mut self,
        agent: W::Agent,
        world: &W,
        blackboard: &mut Blackboard,
    ) -> bool {
        if self.is_fulfilled(agent, world, blackboard) {
            return false;
        }
        if self.actions.is_empty() {
            self.compute_plan(agent, world, blackboard);
        }
        !self.actions.is_empty() && self.prep_holds(agent, world, blackboard)
    }

    fn compute_plan<W: PopWorldView>(
        &mut self,
        agent: W::Agent,
        world: &W,
        blackboard: &mut Blackboard,
    ) {
        match self.kind.plan(agent, world, &self.config) {
            Ok(kinds) => {
                self.last_plan_error = None;
                for kind in kinds {
                    let id = self.tree.insert(kind, None, agent, world, blackboard);
                    self.actions.push(id);
                }
                if !self.actions.is_empty() {
                    tracing::debug!(
                        agent = agent.stable_id(),
                        goal = %self.kind,
                        actions = self.actions.len(),
                        "goal planned"
                    );
                }
            }
            Err(err) => {
                if self.last_plan_error.as_ref() != Some(&err) {
                    tracing::error!(
                        agent = agent.stable_id(),
                        goal = %self.kind,
                        error = %err,
                        "goal cannot be planned"
                    );
                }
                self.last_plan_error = Some(err);
            }
        }
    }

    /// Advance the plan by one step. Returns `true` once the goal is fulfilled.
    pub fn execute<W: PopWorldMut>(
        &mut self,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
    ) -> bool {
        if self.state != GoalState::Active {
            tracing::debug!(agent = agent.stable_id(), goal = %self.kind, "goal activated");
            self.state = GoalState::Active;
        }

        let actions = self.actions.clone();
        for id in actions {
            let Some(state) = self.tree.get(id).map(ActionNode::state) else {
                continue;
            };
            match state {
                ActionState::Done => continue,
                ActionState::Inactive
                    if self.tree.already_satisfied(id, agent, &*world, blackboard) =>
                {
                    self.tree.finish(id, ctx, agent, blackboard);
                    continue;
                }
                ActionState::Active => {
                    if self.tree.update(id, ctx, agent, world, blackboard) {
                        continue;
                    }
                    if !self.tree.is_moving(id, agent, &*world) {
                        self.tries += 1;
                    }
                    break;
                }
                ActionState::Inactive => {
                    self.tree.execute(id, ctx, agent, world, blackboard);
                    break;
                }
            }
        }

        if self.is_fulfilled(agent, &*world, blackboard) {
            self.fulfilled = true;
            self.state = GoalState::Fulfilled;
            tracing::info!(
                agent = agent.stable_id(),
                goal = %self.kind,
                tries = self.tries,
                "goal fulfilled"
            );
            pop_tools::emit(
                blackboard,
                TraceEvent::new(ctx.tick, "goal.fulfilled")
                    .with_a(agent.stable_id())
                    .with_b(self.id.0),
            );
            return true;
        }

        if self.tries > self.config.goal.reset_after_tries {
            tracing::warn!(
                agent = agent.stable_id(),
                goal = %self.kind,
                tries = self.tries,
                "goal stalled past its retry budget, resetting"
            );
            self.reset(ctx, agent, &*world, blackboard);
        } else if !self.actions.is_empty() && self.all_actions_finished() {
            tracing::debug!(
                agent = agent.stable_id(),
                goal = %self.kind,
                "plan finished without fulfilling the goal, replanning"
            );
            self.reset(ctx, agent, &*world, blackboard);
        }
        false
    }

    /// Count a tick on which the goal was due but could not run. Resets the goal and returns
    /// `true` once the retry budget is spent.
    pub fn note_blocked<W: PopWorldView>(
        &mut self,
        ctx: &TickContext,
        agent: W::Agent,
        world: &W,
        blackboard: &mut Blackboard,
    ) -> bool {
        self.tries += 1;
        if self.tries <= self.config.goal.reset_after_tries {
            return false;
        }
        tracing::warn!(
            agent = agent.stable_id(),
            goal = %self.kind,
            tries = self.tries,
            "goal blocked past its retry budget, resetting"
        );
        self.reset(ctx, agent, world, blackboard);
        true
    }

    /// Drop the plan and its blackboard scopes.
    pub(crate) fn release(&mut self, entity: u64, blackboard: &mut Blackboard) {
        self.tree.clear(entity, blackboard);
        self.actions.clear();
    }

    /// Discard all progress and plan again from the current world state.
    pub fn reset<W: PopWorldView>(
        &mut self,
        ctx: &TickContext,
        agent: W::Agent,
        world: &W,
        blackboard: &mut Blackboard,
    ) {
        self.tree.clear(agent.stable_id(), blackboard);
        self.tree = ActionTree::new(self.config.action);
        self.actions.clear();
        self.fulfilled = false;
        self.tries = 0;
        self.state = GoalState::Inactive;
        let (prep, post) = self.kind.conditions();
        self.prep = prep;
        self.post = post;
        self.compute_plan(agent, world, blackboard);
        pop_tools::emit(
            blackboard,
            TraceEvent::new(ctx.tick, "goal.reset")
                .with_a(agent.stable_id())
                .with_b(self.id.0),
        );
    }
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("actions", &self.actions.len())
            .field("tries", &self.tries)
            .finish()
    }
}
