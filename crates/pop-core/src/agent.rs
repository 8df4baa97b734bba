use core::fmt::Debug;

/// Identity of one pop, as the host simulation hands it to the goal engine.
///
/// `stable_id` is the pop's identity everywhere outside the host's own types:
/// - entity and action scopes on the blackboard are keyed by it, so two pops must never share
///   an id while both are alive;
/// - `tick_pops` runs pops in ascending `stable_id` order;
/// - per-pop RNG streams (`TickContext::rng_for_agent`) and trace operands derive from it.
///
/// The id must not change while the pop lives; reusing the id of a removed pop hands the newcomer
/// its predecessor's memories.
pub trait AgentId: Copy + Ord + Eq + Debug {
    fn stable_id(self) -> u64;
}

impl AgentId for u64 {
    fn stable_id(self) -> u64 {
        self
    }
}

impl AgentId for u32 {
    fn stable_id(self) -> u64 {
        u64::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_ids_widen_without_changing_identity() {
        assert_eq!(7u32.stable_id(), 7u64.stable_id());
        assert_eq!(u32::MAX.stable_id(), u64::from(u32::MAX));
    }
}
