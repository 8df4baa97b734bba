use thiserror::Error;

/// Why a goal could not compute its action plan.
///
/// Plan errors never leave the goal that hit them: the goal logs the error, keeps an empty
/// plan, and tries again on a later tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no recipe produces `{0}`")]
    MissingRecipe(String),

    #[error("agent {0} is not present in the world")]
    UnknownAgent(u64),
}
