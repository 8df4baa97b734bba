//! Engine configuration: retry budgets and planning defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-action retry budget. `retries` counts `execute` calls since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRetryPolicy {
    /// Past this many blocked attempts, an action whose post-conditions already hold is
    /// finished without running.
    pub finish_if_satisfied_after: u32,

    /// Past this many blocked attempts, the action is reset and its conditions and
    /// sub-actions are recomputed.
    pub reset_after: u32,
}

impl Default for ActionRetryPolicy {
    fn default() -> Self {
        Self {
            finish_if_satisfied_after: 5,
            reset_after: 15,
        }
    }
}

/// Per-goal failure budget, independent of each action's own retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalRetryPolicy {
    /// The goal is reset once `tries` exceeds this.
    pub reset_after_tries: u32,
}

impl Default for GoalRetryPolicy {
    fn default() -> Self {
        Self {
            reset_after_tries: 20,
        }
    }
}

/// Engine configuration, usually loaded from YAML.
///
/// ```yaml
/// action:
///   finish_if_satisfied_after: 5
///   reset_after: 15
/// goal:
///   reset_after_tries: 20
/// locate_radius: 20
/// seek_shelter: true
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub action: ActionRetryPolicy,
    pub goal: GoalRetryPolicy,

    /// Search radius (tiles) used when locating resources.
    #[serde(default = "default_locate_radius")]
    pub locate_radius: u32,

    /// Food level below which the default food goal activates.
    #[serde(default = "default_threshold")]
    pub food_threshold: i32,

    /// Water level below which the default drink goal activates.
    #[serde(default = "default_threshold")]
    pub water_threshold: i32,

    /// Max offset (tiles, per axis) when picking a shelter site.
    #[serde(default = "default_shelter_radius")]
    pub shelter_radius: i32,

    /// `tick_pops` queues a shelter for pops left without foreground work.
    #[serde(default = "default_seek_shelter")]
    pub seek_shelter: bool,
}

fn default_locate_radius() -> u32 {
    20
}
fn default_threshold() -> i32 {
    70
}
fn default_shelter_radius() -> i32 {
    10
}
fn default_seek_shelter() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action: ActionRetryPolicy::default(),
            goal: GoalRetryPolicy::default(),
            locate_radius: default_locate_radius(),
            food_threshold: default_threshold(),
            water_threshold: default_threshold(),
            shelter_radius: default_shelter_radius(),
            seek_shelter: default_seek_shelter(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse engine config: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(content).context("Invalid engine config YAML")?;
        Ok(config)
    }
}
