//! Hierarchical goal/action execution for autonomous pops.
//!
//! Each pop owns a [`PopGoalManager`] holding goals in priority order. Once per tick the
//! manager picks the first executable goal, which advances its ordered plan of actions. Actions
//! are two-phase state machines (`start`, then `update` until done) gated by prep and post
//! conditions; composite actions drive their own sub-actions strictly left to right. Facts that
//! one action discovers (where the wood is) reach later actions through the shared
//! [`Blackboard`](pop_core::Blackboard).
//!
//! Nothing here blocks: waiting is expressed as `update` returning `false` on later ticks.
//! Expected failures are never errors, they are retried, and bounded retry budgets (see
//! [`EngineConfig`]) turn a stuck action or goal into a fresh plan.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod action;
pub mod condition;
pub mod config;
pub mod error;
pub mod goal;
pub mod manager;
pub mod world;

pub use action::{ActionId, ActionKind, ActionNode, ActionState, ActionTree};
pub use condition::{Condition, ConditionKind, FailureConsequence, Target, TARGET_LOCATION};
pub use config::{ActionRetryPolicy, EngineConfig, GoalRetryPolicy};
pub use error::PlanError;
pub use goal::{Goal, GoalId, GoalKind, GoalPriority, GoalState};
pub use manager::{default_goals, tick_pops, PopGoalManager};
pub use world::{
    Activity, Building, CompareOp, Item, ItemStack, Path, PopWorldMut, PopWorldView, Recipe,
    Stat, Tile,
};
