//! Per-pop goal scheduling.
//!
//! Goals are kept in priority order: [`PopGoalManager::add_goal`] inserts after every goal of
//! equal or higher [`GoalPriority`], so the list index is the only thing the per-tick scan looks
//! at. The scan executes the first goal that can run. Reaching an earlier goal while a later one
//! is in progress preempts the later one: its partial progress is reset.

use pop_core::{AgentId, Blackboard, DeterministicRng, Location, TickContext};
use pop_tools::TraceEvent;

use crate::config::EngineConfig;
use crate::goal::{Goal, GoalId, GoalKind, GoalPriority};
use crate::world::{Building, PopWorldMut, PopWorldView};

/// RNG stream used when picking a shelter site.
const SHELTER_STREAM: u64 = 0x5E17_7E12;
const SHELTER_ATTEMPTS: usize = 32;

#[derive(Debug)]
pub struct PopGoalManager<A: AgentId> {
    agent: A,
    goals: Vec<Goal>,
    /// The goal executed last and not yet fulfilled.
    in_progress: Option<GoalId>,
    next_goal_id: u64,
    config: EngineConfig,
}

impl<A: AgentId> PopGoalManager<A> {
    pub fn new(agent: A, config: EngineConfig) -> Self {
        Self {
            agent,
            goals: Vec::new(),
            in_progress: None,
            next_goal_id: 1,
            config,
        }
    }

    /// A manager holding the default needs of a pop.
    pub fn with_default_goals(agent: A, config: EngineConfig) -> Self {
        let mut manager = Self::new(agent, config);
        for goal in default_goals(&config) {
            manager.add_goal(goal);
        }
        manager
    }

    pub fn agent(&self) -> A {
        self.agent
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn goal(&self, id: GoalId) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id() == id)
    }

    pub fn in_progress(&self) -> Option<GoalId> {
        self.in_progress
    }

    fn index_of(&self, id: GoalId) -> Option<usize> {
        self.goals.iter().position(|g| g.id() == id)
    }

    /// Insert after every goal of equal or higher priority.
    pub fn add_goal(&mut self, mut goal: Goal) -> GoalId {
        let id = GoalId::from_raw(self.next_goal_id);
        self.next_goal_id += 1;
        goal.assign_id(id);
        goal.configure(self.config);
        let index = self
            .goals
            .iter()
            .position(|g| g.priority() < goal.priority())
            .unwrap_or(self.goals.len());
        tracing::debug!(
            agent = self.agent.stable_id(),
            goal = %goal.kind(),
            index,
            "goal added"
        );
        self.goals.insert(index, goal);
        id
    }

    pub fn remove_goal(&mut self, id: GoalId, blackboard: &mut Blackboard) -> Option<Goal> {
        let index = self.index_of(id)?;
        if self.in_progress == Some(id) {
            self.in_progress = None;
        }
        let mut goal = self.goals.remove(index);
        goal.release(self.agent.stable_id(), blackboard);
        Some(goal)
    }

    /// The first goal, in list order, that is not fulfilled.
    pub fn current_goal<W>(&self, world: &W, blackboard: &Blackboard) -> Option<&Goal>
    where
        W: PopWorldView<Agent = A>,
    {
        self.goals
            .iter()
            .find(|g| !g.is_fulfilled(self.agent, world, blackboard))
    }

    /// Like [`current_goal`](Self::current_goal), skipping background goals.
    pub fn active_foreground_goal<W>(&self, world: &W, blackboard: &Blackboard) -> Option<&Goal>
    where
        W: PopWorldView<Agent = A>,
    {
        self.goals.iter().find(|g| {
            g.priority() != GoalPriority::Background
                && !g.is_fulfilled(self.agent, world, blackboard)
        })
    }

    /// Drop fulfilled goals that will never re-arm.
    pub fn prune_fulfilled<W>(&mut self, world: &W, blackboard: &mut Blackboard) -> usize
    where
        W: PopWorldView<Agent = A>,
    {
        let done: Vec<GoalId> = self
            .goals
            .iter()
            .filter(|g| !g.is_recurring() && g.is_fulfilled(self.agent, world, blackboard))
            .map(Goal::id)
            .collect();
        for id in &done {
            self.remove_goal(*id, blackboard);
        }
        done.len()
    }

    /// Run one scheduling step. Returns the goal that was executed, if any.
    pub fn perform_goals<W>(
        &mut self,
        ctx: &TickContext,
        world: &mut W,
        blackboard: &mut Blackboard,
    ) -> Option<GoalId>
    where
        W: PopWorldMut<Agent = A>,
    {
        let agent = self.agent;
        self.rearm_recurring(ctx, &*world, blackboard);

        for index in 0..self.goals.len() {
            let id = self.goals[index].id();
            let tracked = self.in_progress == Some(id);

            if self.goals[index].can_execute(agent, &*world, blackboard) {
                if let Some(previous) = self.in_progress.filter(|p| *p != id) {
                    self.preempt(ctx, previous, index, &*world, blackboard);
                }
                let fulfilled = self.goals[index].execute(ctx, agent, world, blackboard);
                self.in_progress = (!fulfilled).then_some(id);
                return Some(id);
            }

            if tracked {
                if self.goals[index].is_fulfilled(agent, &*world, blackboard) {
                    self.in_progress = None;
                    continue;
                }
                if self.goals[index].note_blocked(ctx, agent, &*world, blackboard) {
                    self.in_progress = None;
                }
                return None;
            }
        }
        None
    }

    fn preempt<W>(
        &mut self,
        ctx: &TickContext,
        previous: GoalId,
        by_index: usize,
        world: &W,
        blackboard: &mut Blackboard,
    ) where
        W: PopWorldView<Agent = A>,
    {
        let agent = self.agent;
        let Some(previous_index) = self.index_of(previous) else {
            return;
        };
        tracing::warn!(
            agent = agent.stable_id(),
            goal = %self.goals[by_index].kind(),
            preempted = %self.goals[previous_index].kind(),
            "goal preempted by a higher-priority goal"
        );
        pop_tools::emit(
            blackboard,
            TraceEvent::new(ctx.tick, "goal.preempt")
                .with_a(by_index as u64)
                .with_b(previous_index as u64),
        );
        self.goals[previous_index].reset(ctx, agent, world, blackboard);
        self.in_progress = None;
    }

    fn rearm_recurring<W>(&mut self, ctx: &TickContext, world: &W, blackboard: &mut Blackboard)
    where
        W: PopWorldView<Agent = A>,
    {
        let agent = self.agent;
        for goal in &mut self.goals {
            if goal.is_recurring()
                && goal.is_fulfilled(agent, world, blackboard)
                && goal.prep_holds(agent, world, blackboard)
            {
                tracing::debug!(agent = agent.stable_id(), goal = %goal.kind(), "goal re-armed");
                goal.reset(ctx, agent, world, blackboard);
            }
        }
    }

    /// Queue a hut at a random free tile near the pop when it has nothing in the foreground.
    pub fn ensure_shelter_goal<W>(
        &mut self,
        ctx: &TickContext,
        world: &W,
        blackboard: &Blackboard,
    ) -> Option<GoalId>
    where
        W: PopWorldView<Agent = A>,
    {
        if self.active_foreground_goal(world, blackboard).is_some() {
            return None;
        }
        let here = world.location(self.agent)?;
        let radius = self.config.shelter_radius;
        let mut rng = ctx.rng_for_agent(self.agent, SHELTER_STREAM);
        let site = (0..SHELTER_ATTEMPTS)
            .map(|_| {
                let dx = rng.next_i32_in(-radius, radius);
                let dy = rng.next_i32_in(-radius, radius);
                here.offset(dx, dy)
            })
            .find(|l| buildable(world, *l))?;

        tracing::debug!(
            agent = self.agent.stable_id(),
            x = site.x,
            y = site.y,
            "no foreground goal, planning shelter"
        );
        Some(self.add_goal(Goal::new(
            GoalKind::Build {
                building: Building::hut(),
                location: site,
            },
            GoalPriority::Low,
        )))
    }
}

fn buildable<W: PopWorldView>(world: &W, location: Location) -> bool {
    world
        .tile(location)
        .is_some_and(|t| t.walkable && !t.has_building())
}

/// The needs every pop starts with: food and water, both high priority.
pub fn default_goals(config: &EngineConfig) -> Vec<Goal> {
    vec![
        Goal::food(config.food_threshold).with_config(*config),
        Goal::drink(config.water_threshold).with_config(*config),
    ]
}

/// One simulation step: every manager runs `perform_goals` once, in agent order. A pop left
/// without foreground work then gets a shelter goal when [`EngineConfig::seek_shelter`] is set.
pub fn tick_pops<W>(
    ctx: &TickContext,
    world: &mut W,
    blackboard: &mut Blackboard,
    managers: &mut [PopGoalManager<W::Agent>],
) where
    W: PopWorldMut,
{
    managers.sort_by_key(|m| m.agent.stable_id());
    for manager in managers.iter_mut() {
        manager.perform_goals(ctx, world, blackboard);
        if manager.config.seek_shelter {
            manager.ensure_shelter_goal(ctx, &*world, &*blackboard);
        }
    }
}
