//! Two-phase actions and the arena that owns them.
//!
//! Every action lives in an [`ActionTree`] slot addressed by [`ActionId`]. Children are owned by
//! the tree and listed on their parent; the parent link is a plain id, so the tree never holds
//! a cycle. Each node also owns a blackboard scope, allocated on insert and cleared when the
//! node is reset or removed.
//!
//! `execute` runs the per-tick state machine:
//!
//! 1. a `Done` action returns `true` and does nothing else;
//! 2. `retries` is bumped;
//! 3. an inactive action whose prep conditions fail is blocked. Past
//!    [`ActionRetryPolicy::finish_if_satisfied_after`] attempts it is finished outright when its
//!    post conditions already hold; past [`ActionRetryPolicy::reset_after`] it is reset;
//! 4. an active action is polled with `update`;
//! 5. otherwise the action is activated and `start`ed.
//!
//! Completion always re-checks post conditions before the node is marked `Done`.

mod kinds;

use std::borrow::Cow;

use pop_core::{AgentId, Blackboard, ScopeId, TickContext};
use pop_tools::TraceEvent;

use crate::condition::{all_hold, first_unmet, Condition};
use crate::config::ActionRetryPolicy;
use crate::world::{Activity, PopWorldMut, PopWorldView};

pub use kinds::{ActionKind, BuildAt, Consume, Craft, Gather, Harvest, LocateResource, MoveTo};
use kinds::NodeScopes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Inactive,
    Active,
    Done,
}

#[derive(Debug, Clone)]
pub struct ActionNode {
    name: Cow<'static, str>,
    kind: ActionKind,
    state: ActionState,
    prep: Vec<Condition>,
    post: Vec<Condition>,
    retries: u32,
    parent: Option<ActionId>,
    children: Vec<ActionId>,
    scope: ScopeId,
    activity_override: Option<Activity>,
}

impl ActionNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == ActionState::Done
    }

    pub fn prep_conditions(&self) -> &[Condition] {
        &self.prep
    }

    pub fn post_conditions(&self) -> &[Condition] {
        &self.post
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn parent(&self) -> Option<ActionId> {
        self.parent
    }

    pub fn children(&self) -> &[ActionId] {
        &self.children
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn activity_override(&self) -> Option<Activity> {
        self.activity_override
    }
}

/// Arena of action nodes for one goal.
#[derive(Debug, Clone, Default)]
pub struct ActionTree {
    slots: Vec<Option<ActionNode>>,
    free: Vec<usize>,
    policy: ActionRetryPolicy,
}

impl ActionTree {
    pub fn new(policy: ActionRetryPolicy) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ActionRetryPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ActionId) -> Option<&ActionNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: ActionId) -> Option<&mut ActionNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Override the activity label applied when the action starts (`None` leaves the pop's
    /// label alone).
    pub fn set_activity_override(&mut self, id: ActionId, activity: Option<Activity>) {
        if let Some(node) = self.node_mut(id) {
            node.activity_override = activity;
        }
    }

    /// Insert an action (and, for composites, its sub-actions) under `parent`.
    pub fn insert<W>(
        &mut self,
        kind: ActionKind,
        parent: Option<ActionId>,
        agent: W::Agent,
        world: &W,
        blackboard: &mut Blackboard,
    ) -> ActionId
    where
        W: PopWorldView,
    {
        let scope = blackboard.allocate_scope();
        let node = ActionNode {
            name: kind.name(),
            activity_override: kind.activity(),
            kind,
            state: ActionState::Inactive,
            prep: Vec::new(),
            post: Vec::new(),
            retries: 0,
            parent,
            children: Vec::new(),
            scope,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                ActionId(index)
            }
            None => {
                self.slots.push(Some(node));
                ActionId(self.slots.len() - 1)
            }
        };
        if let Some(parent) = parent.and_then(|p| self.node_mut(p)) {
            parent.children.push(id);
        }
        self.determine(id, agent, world, blackboard);
        id
    }

    /// (Re)compute a node's conditions and sub-actions.
    fn determine<W>(&mut self, id: ActionId, agent: W::Agent, world: &W, bb: &mut Blackboard)
    where
        W: PopWorldView,
    {
        let Some(scopes) = self.scopes(id) else {
            return;
        };
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let (prep, post) = node.kind.determine_conditions(scopes, world);
        node.prep = prep;
        node.post = post;
        let children = node.kind.determine_actions(scopes);
        for child in children {
            self.insert(child, Some(id), agent, world, bb);
        }
    }

    fn scopes(&self, id: ActionId) -> Option<NodeScopes> {
        let node = self.get(id)?;
        Some(NodeScopes {
            own: node.scope,
            parent: node.parent.and_then(|p| self.get(p)).map(|p| p.scope),
        })
    }

    /// Remove a node and its whole subtree, clearing their blackboard scopes.
    pub fn remove(&mut self, id: ActionId, entity: u64, blackboard: &mut Blackboard) {
        let Some(node) = self.slots.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        blackboard.clear_scope(entity, node.scope);
        self.free.push(id.0);
        if let Some(parent) = node.parent.and_then(|p| self.node_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in node.children {
            self.remove(child, entity, blackboard);
        }
    }

    /// Drop every node.
    pub fn clear(&mut self, entity: u64, blackboard: &mut Blackboard) {
        for node in self.slots.drain(..).flatten() {
            blackboard.clear_scope(entity, node.scope);
        }
        self.free.clear();
    }

    pub fn check_prep<W: PopWorldView>(
        &self,
        id: ActionId,
        agent: W::Agent,
        world: &W,
        bb: &Blackboard,
    ) -> bool {
        self.get(id)
            .is_some_and(|n| all_hold(&n.prep, agent, world, bb))
    }

    pub fn check_post<W: PopWorldView>(
        &self,
        id: ActionId,
        agent: W::Agent,
        world: &W,
        bb: &Blackboard,
    ) -> bool {
        self.get(id)
            .is_some_and(|n| all_hold(&n.post, agent, world, bb))
    }

    /// Post conditions exist and already hold.
    pub fn already_satisfied<W: PopWorldView>(
        &self,
        id: ActionId,
        agent: W::Agent,
        world: &W,
        bb: &Blackboard,
    ) -> bool {
        self.get(id)
            .is_some_and(|n| !n.post.is_empty() && all_hold(&n.post, agent, world, bb))
    }

    /// A movement action with moves still queued, or a composite whose running sub-action is
    /// moving. A move that has no path left to walk is stalled, not moving.
    pub fn is_moving<W: PopWorldView>(&self, id: ActionId, agent: W::Agent, world: &W) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        if node.kind.is_movement() {
            return world.has_pending_moves(agent);
        }
        node.children.iter().any(|c| {
            self.get(*c).is_some_and(|n| n.state == ActionState::Active)
                && self.is_moving(*c, agent, world)
        })
    }

    pub fn execute<W>(
        &mut self,
        id: ActionId,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
    ) -> bool
    where
        W: PopWorldMut,
    {
        let policy = self.policy;
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if node.state == ActionState::Done {
            return true;
        }
        node.retries += 1;
        let retries = node.retries;
        let state = node.state;

        if state != ActionState::Active && !self.check_prep(id, agent, &*world, blackboard) {
            if retries > policy.finish_if_satisfied_after
                && self.already_satisfied(id, agent, &*world, blackboard)
            {
                self.finish(id, ctx, agent, blackboard);
                return true;
            }
            if retries > policy.reset_after {
                let unmet = self
                    .get(id)
                    .and_then(|n| first_unmet(&n.prep, agent, &*world, blackboard))
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                tracing::warn!(
                    agent = agent.stable_id(),
                    action = %self.get(id).map_or("", |n| n.name()),
                    retries,
                    unmet = %unmet,
                    "action blocked past its retry budget, resetting"
                );
                pop_tools::emit(
                    blackboard,
                    TraceEvent::new(ctx.tick, "action.reset")
                        .with_a(agent.stable_id())
                        .with_b(id.0 as u64),
                );
                self.reset(id, agent, &*world, blackboard);
            }
            return false;
        }

        if state == ActionState::Active {
            return self.update(id, ctx, agent, world, blackboard);
        }

        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if let Some(activity) = node.activity_override {
            world.set_activity(agent, activity);
        }
        node.state = ActionState::Active;
        tracing::debug!(
            agent = agent.stable_id(),
            action = %node.name,
            retries,
            "action started"
        );
        if self.start(id, ctx, agent, world, blackboard) {
            return self.complete(id, ctx, agent, &*world, blackboard);
        }
        false
    }

    /// Poll an active action. Returns `true` once it is finished.
    pub fn update<W>(
        &mut self,
        id: ActionId,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
    ) -> bool
    where
        W: PopWorldMut,
    {
        let Some(node) = self.get(id) else {
            return false;
        };
        match node.state {
            ActionState::Done => return true,
            ActionState::Inactive => return false,
            ActionState::Active => {}
        }

        let progressed = if node.kind.is_composite() {
            self.update_composite(id, ctx, agent, world, blackboard)
        } else {
            let scopes = self.scopes(id);
            match (scopes, self.node_mut(id)) {
                (Some(scopes), Some(node)) => {
                    node.kind.update(ctx, agent, world, blackboard, scopes)
                }
                _ => false,
            }
        };
        progressed && self.complete(id, ctx, agent, &*world, blackboard)
    }

    fn start<W>(
        &mut self,
        id: ActionId,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
    ) -> bool
    where
        W: PopWorldMut,
    {
        if self.get(id).is_some_and(|n| n.kind.is_composite()) {
            return self.update_composite(id, ctx, agent, world, blackboard);
        }
        let scopes = self.scopes(id);
        match (scopes, self.node_mut(id)) {
            (Some(scopes), Some(node)) => node.kind.start(ctx, agent, world, blackboard, scopes),
            _ => false,
        }
    }

    /// Advance sub-actions left to right. Returns `true` when all of them are finished.
    fn update_composite<W>(
        &mut self,
        id: ActionId,
        ctx: &TickContext,
        agent: W::Agent,
        world: &mut W,
        blackboard: &mut Blackboard,
    ) -> bool
    where
        W: PopWorldMut,
    {
        let children = match self.get(id) {
            Some(node) => node.children.clone(),
            None => return false,
        };
        for child in &children {
            let Some(state) = self.get(*child).map(|n| n.state) else {
                continue;
            };
            match state {
                ActionState::Done => continue,
                ActionState::Active => {
                    if !self.update(*child, ctx, agent, world, blackboard) {
                        return false;
                    }
                }
                ActionState::Inactive => {
                    if self.already_satisfied(*child, agent, &*world, blackboard) {
                        self.finish(*child, ctx, agent, blackboard);
                        continue;
                    }
                    self.execute(*child, ctx, agent, world, blackboard);
                    break;
                }
            }
        }
        children
            .iter()
            .all(|c| self.get(*c).map_or(true, ActionNode::is_finished))
    }

    fn complete<W: PopWorldView>(
        &mut self,
        id: ActionId,
        ctx: &TickContext,
        agent: W::Agent,
        world: &W,
        blackboard: &mut Blackboard,
    ) -> bool {
        if !self.check_post(id, agent, world, blackboard) {
            return false;
        }
        self.finish(id, ctx, agent, blackboard);
        true
    }

    pub fn finish<A: AgentId>(
        &mut self,
        id: ActionId,
        ctx: &TickContext,
        agent: A,
        blackboard: &mut Blackboard,
    ) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.state = ActionState::Done;
        tracing::debug!(
            agent = agent.stable_id(),
            action = %node.name,
            retries = node.retries,
            "action finished"
        );
        pop_tools::emit(
            blackboard,
            TraceEvent::new(ctx.tick, "action.finish")
                .with_a(agent.stable_id())
                .with_b(id.0 as u64),
        );
    }

    /// Back to `Inactive` with zero retries; conditions and sub-actions are recomputed and the
    /// node's blackboard scope is cleared. Side effects already applied to the world stay.
    pub fn reset<W>(&mut self, id: ActionId, agent: W::Agent, world: &W, blackboard: &mut Blackboard)
    where
        W: PopWorldView,
    {
        let entity = agent.stable_id();
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.state = ActionState::Inactive;
        node.retries = 0;
        node.kind.reset();
        let scope = node.scope;
        let children = std::mem::take(&mut node.children);
        blackboard.clear_scope(entity, scope);
        for child in children {
            self.remove(child, entity, blackboard);
        }
        self.determine(id, agent, world, blackboard);
    }
}
