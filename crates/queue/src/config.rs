// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgingConfig {
    /// Score added per second waited.
    pub weight: f64,
    pub max_bonus: f64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            weight: 0.01,
            max_bonus: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessConfig {
    pub project_weight_default: f64,
    /// Multiplies `max(0, recent_share - fair_share)` to get the penalty.
    pub penalty_scale: f64,
    /// Decay factor per dispatch for the recent-share EMA, in `(0, 1)`.
    pub share_decay: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            project_weight_default: 1.0,
            penalty_scale: 20.0,
            share_decay: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub aging: AgingConfig,
    pub fairness: FairnessConfig,
    /// Per-project queue size cap; `None` in the map falls back to this default.
    pub default_project_cap: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            aging: AgingConfig::default(),
            fairness: FairnessConfig::default(),
            default_project_cap: 500,
        }
    }
}
