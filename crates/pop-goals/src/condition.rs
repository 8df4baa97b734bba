//! Invertible predicates over world, agent and blackboard state.

use std::borrow::Cow;
use std::fmt;

use pop_core::{AgentId, BbKey, Blackboard, Location, Scope, ScopeId};

use crate::world::{CompareOp, Item, ItemStack, PopWorldView, Stat};

/// Action-scope key under which a located target is published for sibling actions.
pub const TARGET_LOCATION: BbKey<Location> = BbKey::new(0x7A26_E700_0000_0001);

/// What the engine should make of a failed condition. Carried for diagnostics; the retry
/// budgets decide what actually happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureConsequence {
    #[default]
    Repeat,
    Abort,
    Continue,
}

/// A location an action refers to: known up front, or discovered at run time by a sibling and
/// published into the given action scope under [`TARGET_LOCATION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Fixed(Location),
    Discovered(ScopeId),
}

impl Target {
    pub fn resolve(self, entity: u64, blackboard: &Blackboard) -> Option<Location> {
        match self {
            Target::Fixed(location) => Some(location),
            Target::Discovered(action) => blackboard
                .get_in(Scope::Action { entity, action }, TARGET_LOCATION)
                .copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    /// The agent stands on the target.
    OnLocation(Target),
    /// The agent holds at least `amount` of the item.
    HasItems(ItemStack),
    /// A building with this name stands on the location.
    BuildingExists {
        building: Cow<'static, str>,
        location: Location,
    },
    /// The target tile still carries a matching resource.
    ResourceExists { resource: Item, target: Target },
    EntityProperty { stat: Stat, op: CompareOp, value: i32 },
    /// The resource index knows a location for the resource, within `max_distance` of the
    /// agent when given.
    BlackboardContainsLocation {
        resource: Item,
        max_distance: Option<u32>,
    },
    /// The target resolves to a location.
    TargetKnown(Target),
    HasPendingMoves,
    /// Every child holds.
    And(Vec<Condition>),
    /// At least one child holds.
    Or(Vec<Condition>),
    /// Exactly one child holds.
    ExclusiveSelector(Vec<Condition>),
    /// At least one child holds, tried in order.
    Selector(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    kind: ConditionKind,
    inverted: bool,
    failure_consequence: FailureConsequence,
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            inverted: false,
            failure_consequence: FailureConsequence::default(),
        }
    }

    pub fn on_location(target: Target) -> Self {
        Self::new(ConditionKind::OnLocation(target))
    }

    pub fn has_items(stack: ItemStack) -> Self {
        Self::new(ConditionKind::HasItems(stack))
    }

    pub fn building_exists(building: impl Into<Cow<'static, str>>, location: Location) -> Self {
        Self::new(ConditionKind::BuildingExists {
            building: building.into(),
            location,
        })
    }

    pub fn resource_exists(resource: Item, target: Target) -> Self {
        Self::new(ConditionKind::ResourceExists { resource, target })
    }

    pub fn entity_property(stat: Stat, op: CompareOp, value: i32) -> Self {
        Self::new(ConditionKind::EntityProperty { stat, op, value })
    }

    pub fn blackboard_contains_location(resource: Item, max_distance: Option<u32>) -> Self {
        Self::new(ConditionKind::BlackboardContainsLocation {
            resource,
            max_distance,
        })
    }

    pub fn target_known(target: Target) -> Self {
        Self::new(ConditionKind::TargetKnown(target))
    }

    pub fn has_pending_moves() -> Self {
        Self::new(ConditionKind::HasPendingMoves)
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::new(ConditionKind::And(conditions))
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::new(ConditionKind::Or(conditions))
    }

    pub fn exclusive_selector(conditions: Vec<Condition>) -> Self {
        Self::new(ConditionKind::ExclusiveSelector(conditions))
    }

    pub fn selector(conditions: Vec<Condition>) -> Self {
        Self::new(ConditionKind::Selector(conditions))
    }

    /// Fluent negation: flips the condition and hands it back.
    pub fn invert(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    pub fn with_consequence(mut self, consequence: FailureConsequence) -> Self {
        self.failure_consequence = consequence;
        self
    }

    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn failure_consequence(&self) -> FailureConsequence {
        self.failure_consequence
    }

    /// Add a child to a combinator. Leaf conditions are immutable; returns `false` for them.
    pub fn add_condition(&mut self, condition: Condition) -> bool {
        match &mut self.kind {
            ConditionKind::And(children)
            | ConditionKind::Or(children)
            | ConditionKind::ExclusiveSelector(children)
            | ConditionKind::Selector(children) => {
                children.push(condition);
                true
            }
            _ => false,
        }
    }

    /// `inverted XOR check()`.
    pub fn check_condition<W>(&self, agent: W::Agent, world: &W, blackboard: &Blackboard) -> bool
    where
        W: PopWorldView,
    {
        let outcome = self.check(agent, world, blackboard);
        tracing::trace!(condition = %self, outcome, inverted = self.inverted, "condition checked");
        self.inverted != outcome
    }

    fn check<W>(&self, agent: W::Agent, world: &W, blackboard: &Blackboard) -> bool
    where
        W: PopWorldView,
    {
        let entity = agent.stable_id();
        match &self.kind {
            ConditionKind::OnLocation(target) => {
                match (world.location(agent), target.resolve(entity, blackboard)) {
                    (Some(here), Some(there)) => here == there,
                    _ => false,
                }
            }
            ConditionKind::HasItems(stack) => world.quantity(agent, &stack.item) >= stack.amount,
            ConditionKind::BuildingExists { building, location } => world
                .tile(*location)
                .and_then(|tile| tile.building)
                .is_some_and(|b| b == *building),
            ConditionKind::ResourceExists { resource, target } => target
                .resolve(entity, blackboard)
                .and_then(|location| world.tile(location))
                .is_some_and(|tile| tile.holds(resource)),
            ConditionKind::EntityProperty { stat, op, value } => world
                .stat(agent, *stat)
                .is_some_and(|current| op.apply(current, *value)),
            ConditionKind::BlackboardContainsLocation {
                resource,
                max_distance,
            } => {
                let known = blackboard.get_resource_locations(&resource.key());
                match (max_distance, world.location(agent)) {
                    (None, _) => !known.is_empty(),
                    (Some(max), Some(here)) => {
                        known.iter().any(|l| world.distance(here, *l) <= *max)
                    }
                    (Some(_), None) => false,
                }
            }
            ConditionKind::TargetKnown(target) => target.resolve(entity, blackboard).is_some(),
            ConditionKind::HasPendingMoves => world.has_pending_moves(agent),
            ConditionKind::And(children) => children
                .iter()
                .all(|c| c.check_condition(agent, world, blackboard)),
            ConditionKind::Or(children) | ConditionKind::Selector(children) => children
                .iter()
                .any(|c| c.check_condition(agent, world, blackboard)),
            ConditionKind::ExclusiveSelector(children) => {
                let mut holding = 0usize;
                for child in children {
                    if child.check_condition(agent, world, blackboard) {
                        holding += 1;
                        if holding > 1 {
                            return false;
                        }
                    }
                }
                holding == 1
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            f.write_str("not ")?;
        }
        match &self.kind {
            ConditionKind::OnLocation(target) => write!(f, "on_location({target:?})"),
            ConditionKind::HasItems(stack) => write!(f, "has_items({stack})"),
            ConditionKind::BuildingExists { building, location } => {
                write!(f, "building_exists({building} @ {},{})", location.x, location.y)
            }
            ConditionKind::ResourceExists { resource, target } => {
                write!(f, "resource_exists({resource} @ {target:?})")
            }
            ConditionKind::EntityProperty { stat, op, value } => {
                write!(f, "{stat:?} {} {value}", op.symbol())
            }
            ConditionKind::BlackboardContainsLocation {
                resource,
                max_distance,
            } => write!(f, "knows_location({resource}, max={max_distance:?})"),
            ConditionKind::TargetKnown(target) => write!(f, "target_known({target:?})"),
            ConditionKind::HasPendingMoves => f.write_str("has_pending_moves"),
            ConditionKind::And(c) => write!(f, "and[{}]", c.len()),
            ConditionKind::Or(c) => write!(f, "or[{}]", c.len()),
            ConditionKind::ExclusiveSelector(c) => write!(f, "exclusive[{}]", c.len()),
            ConditionKind::Selector(c) => write!(f, "selector[{}]", c.len()),
        }
    }
}

/// All conditions hold (vacuously true for an empty list).
pub(crate) fn all_hold<W>(
    conditions: &[Condition],
    agent: W::Agent,
    world: &W,
    blackboard: &Blackboard,
) -> bool
where
    W: PopWorldView,
{
    conditions
        .iter()
        .all(|c| c.check_condition(agent, world, blackboard))
}

/// First condition that does not hold, for diagnostics.
pub(crate) fn first_unmet<'a, W>(
    conditions: &'a [Condition],
    agent: W::Agent,
    world: &W,
    blackboard: &Blackboard,
) -> Option<&'a Condition>
where
    W: PopWorldView,
{
    conditions
        .iter()
        .find(|c| !c.check_condition(agent, world, blackboard))
}
