// SPDX-License-Identifier: MIT

//! Effective-score math: `score = base_priority + aging_bonus(waiting_time)
//! - fairness_penalty(project_recent_share)`.
//!
//! Resolves the spec's fairness Open Question: `recent_share` is a decaying
//! exponential moving average of each project's share of recent dispatches,
//! and the penalty only ever *de-prioritizes* a project that is currently
//! consuming more than its fair share — it never blocks dispatch outright,
//! so the aging bonus still guarantees eventual dispatch (P2).

use std::collections::HashMap;

use poppo_core::ProjectId;

use crate::config::{AgingConfig, FairnessConfig};

pub fn aging_bonus(waiting_secs: f64, config: &AgingConfig) -> f64 {
    (config.weight * waiting_secs.max(0.0)).min(config.max_bonus)
}

/// Tracks each project's decaying share of recent dispatches, used to compute
/// the fairness penalty.
#[derive(Debug, Default)]
pub struct DispatchShareTracker {
    shares: HashMap<ProjectId, f64>,
}

impl DispatchShareTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per dispatch: the dispatched project's share moves toward
    /// 1.0, every other tracked project's share decays toward 0.
    pub fn record_dispatch(&mut self, project: &ProjectId, decay: f64) {
        for (p, share) in self.shares.iter_mut() {
            if p == project {
                *share = *share * decay + (1.0 - decay);
            } else {
                *share *= decay;
            }
        }
        self.shares.entry(project.clone()).or_insert(1.0 - decay);
    }

    pub fn recent_share(&self, project: &ProjectId) -> f64 {
        self.shares.get(project).copied().unwrap_or(0.0)
    }

    pub fn fairness_penalty(&self, project: &ProjectId, active_project_count: usize, weight: f64, config: &FairnessConfig) -> f64 {
        if active_project_count == 0 {
            return 0.0;
        }
        let fair_share = 1.0 / active_project_count as f64;
        let recent_share = self.recent_share(project);
        weight * (recent_share - fair_share).max(0.0) * config.penalty_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aging_bonus_grows_then_caps() {
        let config = AgingConfig {
            weight: 1.0,
            max_bonus: 10.0,
        };
        assert_eq!(aging_bonus(5.0, &config), 5.0);
        assert_eq!(aging_bonus(100.0, &config), 10.0);
    }

    #[test]
    fn a_project_hogging_dispatches_gets_penalized() {
        let mut tracker = DispatchShareTracker::new();
        let fairness = FairnessConfig::default();
        let hog = ProjectId::from("hog");
        let quiet = ProjectId::from("quiet");

        for _ in 0..20 {
            tracker.record_dispatch(&hog, fairness.share_decay);
        }
        tracker.record_dispatch(&quiet, fairness.share_decay);

        let hog_penalty = tracker.fairness_penalty(&hog, 2, 1.0, &fairness);
        let quiet_penalty = tracker.fairness_penalty(&quiet, 2, 1.0, &fairness);
        assert!(hog_penalty > quiet_penalty);
    }

    #[test]
    fn fair_share_never_penalized() {
        let tracker = DispatchShareTracker::new();
        let fairness = FairnessConfig::default();
        let project = ProjectId::from("p");
        assert_eq!(tracker.fairness_penalty(&project, 1, 1.0, &fairness), 0.0);
    }
}
