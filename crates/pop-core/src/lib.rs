//! Deterministic kernel primitives shared by the pop simulation crates.
//!
//! Nothing in here knows about goals or actions; it only provides the tick clock, agent
//! identity, the world seams and the shared blackboard the goal engine runs against.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod agent;
pub mod blackboard;
pub mod rng;
pub mod tick;
pub mod world;

pub use agent::AgentId;
pub use blackboard::{BbKey, Blackboard, Scope, ScopeId, RESOURCE_LOCATION_PREFIX};
pub use rng::{DeterministicRng, SplitMix64};
pub use tick::TickContext;
pub use world::{Location, WorldMut, WorldView};
