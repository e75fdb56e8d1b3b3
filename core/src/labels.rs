//! Lifecycle segment and heuristic churn label rules.
//!
//! Both are pure functions of the feature row. The churn label is a
//! training target only; it never leaves the trainer as a prediction.

use crate::config::LabelConfig;
use serde::{Deserialize, Serialize};

pub const VIP_MIN_VISITS: i64 = 20;
pub const NEW_MAX_VISITS: i64 = 2;
pub const GROWING_MAX_VISITS: i64 = 10; // exclusive

/// Coarse lifecycle segment, fully determined by visit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleSegment {
    New,
    Growing,
    Regular,
    #[serde(rename = "VIP")]
    Vip,
}

impl LifecycleSegment {
    pub const ALL: [LifecycleSegment; 4] = [Self::New, Self::Growing, Self::Regular, Self::Vip];

    /// Rules are checked in priority order: VIP, New, Growing, Regular.
    pub fn from_visit_count(visit_count: i64) -> Self {
        if visit_count >= VIP_MIN_VISITS {
            Self::Vip
        } else if visit_count <= NEW_MAX_VISITS {
            Self::New
        } else if visit_count < GROWING_MAX_VISITS {
            Self::Growing
        } else {
            Self::Regular
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Growing => "Growing",
            Self::Regular => "Regular",
            Self::Vip => "VIP",
        }
    }
}

impl std::fmt::Display for LifecycleSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inactivity threshold (days) after which a customer counts as churned.
pub fn churn_threshold_days(
    avg_days_between_visits: f64,
    segment: LifecycleSegment,
    cfg: &LabelConfig,
) -> f64 {
    let expected_interval = avg_days_between_visits.min(cfg.max_expected_interval_days);
    let base = (expected_interval * cfg.interval_multiplier)
        .clamp(cfg.min_threshold_days, cfg.max_threshold_days);
    match segment {
        LifecycleSegment::Vip => base * cfg.vip_threshold_factor,
        LifecycleSegment::New => base * cfg.new_threshold_factor,
        _ => base,
    }
}

/// Heuristic ground-truth label used for training.
pub fn is_churned(
    days_since_last_visit: f64,
    avg_days_between_visits: f64,
    visit_count: i64,
    tenure_days: f64,
    segment: LifecycleSegment,
    cfg: &LabelConfig,
) -> bool {
    let threshold = churn_threshold_days(avg_days_between_visits, segment, cfg);
    days_since_last_visit > threshold
        && visit_count >= cfg.min_visits
        && tenure_days > cfg.min_tenure_days
}
