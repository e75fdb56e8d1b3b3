//! Risk scorer and tagger.
//!
//! Tagging is an ordered rule table. Every rule whose predicate matches
//! overwrites the row's tag and level, so later rules take precedence
//! over earlier ones (this is NOT first-match-wins). CHURN_RISK_HIGH is
//! guarded by its predicate to rows still tagged NORMAL at that point.
//! A level-only escalation pass runs after the whole table.

use crate::{features::CustomerFeatureRow, labels::LifecycleSegment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTag {
    Normal,
    NewFollowup,
    NewAtRisk,
    ReactivationNeeded,
    GrowingDelayed,
    VipAttention,
    ChurnRiskHigh,
}

impl RiskTag {
    pub const ALL: [RiskTag; 7] = [
        Self::Normal,
        Self::NewFollowup,
        Self::NewAtRisk,
        Self::ReactivationNeeded,
        Self::GrowingDelayed,
        Self::VipAttention,
        Self::ChurnRiskHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::NewFollowup => "NEW_FOLLOWUP",
            Self::NewAtRisk => "NEW_AT_RISK",
            Self::ReactivationNeeded => "REACTIVATION_NEEDED",
            Self::GrowingDelayed => "GROWING_DELAYED",
            Self::VipAttention => "VIP_ATTENTION",
            Self::ChurnRiskHigh => "CHURN_RISK_HIGH",
        }
    }
}

impl std::fmt::Display for RiskTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability at or above which the level is raised to high.
pub const ESCALATE_AT: f64 = 0.6;
/// Probability at or below which the level is lowered to low.
pub const DEESCALATE_AT: f64 = 0.1;

/// One row of the tagging table.
pub struct TagRule {
    pub tag: RiskTag,
    pub level: RiskLevel,
    /// Receives the row and the tag assigned so far.
    pub applies: fn(&CustomerFeatureRow, RiskTag) -> bool,
}

/// Evaluated strictly in this order.
pub const TAG_RULES: [TagRule; 6] = [
    TagRule { tag: RiskTag::NewFollowup, level: RiskLevel::Medium, applies: new_followup },
    TagRule { tag: RiskTag::NewAtRisk, level: RiskLevel::High, applies: new_at_risk },
    TagRule { tag: RiskTag::ReactivationNeeded, level: RiskLevel::High, applies: reactivation_needed },
    TagRule { tag: RiskTag::GrowingDelayed, level: RiskLevel::Medium, applies: growing_delayed },
    TagRule { tag: RiskTag::VipAttention, level: RiskLevel::High, applies: vip_attention },
    TagRule { tag: RiskTag::ChurnRiskHigh, level: RiskLevel::High, applies: churn_risk_high },
];

fn new_followup(r: &CustomerFeatureRow, _: RiskTag) -> bool {
    r.segment == LifecycleSegment::New
        && (7.0..=20.0).contains(&r.tenure_days)
        && r.visit_count <= 2
}

fn new_at_risk(r: &CustomerFeatureRow, _: RiskTag) -> bool {
    r.segment == LifecycleSegment::New && r.days_since_last_visit >= 30.0 && r.tenure_days >= 30.0
}

fn reactivation_needed(r: &CustomerFeatureRow, _: RiskTag) -> bool {
    r.segment != LifecycleSegment::New && r.days_since_last_visit >= 60.0 && r.visit_count >= 3
}

fn growing_delayed(r: &CustomerFeatureRow, _: RiskTag) -> bool {
    r.segment == LifecycleSegment::Growing
        && r.days_since_last_visit >= 45.0
        && r.days_since_last_visit < 60.0
}

fn vip_attention(r: &CustomerFeatureRow, _: RiskTag) -> bool {
    r.segment == LifecycleSegment::Vip
        && (r.days_since_last_visit >= 30.0 || r.churn_probability >= 0.3)
}

// Only rows no earlier rule has tagged.
fn churn_risk_high(r: &CustomerFeatureRow, current: RiskTag) -> bool {
    current == RiskTag::Normal && r.churn_probability >= 0.7
}

/// Run the rule table and the escalation pass for one row.
pub fn evaluate(row: &CustomerFeatureRow) -> (RiskTag, RiskLevel) {
    let mut tag = RiskTag::Normal;
    let mut level = RiskLevel::Low;
    for rule in &TAG_RULES {
        if (rule.applies)(row, tag) {
            tag = rule.tag;
            level = rule.level;
        }
    }
    (tag, escalate(level, row.churn_probability))
}

/// Level-only adjustment from the model probability, independent of tag.
///
/// The two steps run in sequence, so low climbs through medium to high
/// and high drops through medium to low.
pub fn escalate(mut level: RiskLevel, churn_probability: f64) -> RiskLevel {
    if churn_probability >= ESCALATE_AT {
        if level == RiskLevel::Low {
            level = RiskLevel::Medium;
        }
        if level == RiskLevel::Medium {
            level = RiskLevel::High;
        }
    } else if churn_probability <= DEESCALATE_AT {
        if level == RiskLevel::High {
            level = RiskLevel::Medium;
        }
        if level == RiskLevel::Medium {
            level = RiskLevel::Low;
        }
    }
    level
}

/// Attach probabilities (clamped to [0, 1]) and evaluate tags for every row.
///
/// Panics if `probabilities` and `rows` differ in length.
pub fn apply_scores(rows: &mut [CustomerFeatureRow], probabilities: &[f64]) {
    assert_eq!(rows.len(), probabilities.len(), "one probability per row");
    for (row, p) in rows.iter_mut().zip(probabilities) {
        row.churn_probability = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        let (tag, level) = evaluate(row);
        row.churn_risk_tag = tag;
        row.risk_level = level;
    }
}

pub fn tag_counts(rows: &[CustomerFeatureRow]) -> BTreeMap<RiskTag, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.churn_risk_tag).or_insert(0) += 1;
    }
    counts
}

pub fn level_counts(rows: &[CustomerFeatureRow]) -> BTreeMap<RiskLevel, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.risk_level).or_insert(0) += 1;
    }
    counts
}

/// Log tag and level distributions at info level.
pub fn log_distribution(rows: &[CustomerFeatureRow]) {
    log::info!("Churn risk tags assigned:");
    for (tag, count) in tag_counts(rows) {
        log::info!("  {tag}: {count} customers");
    }
    for (level, count) in level_counts(rows) {
        log::info!("Risk level {level}: {count} customers");
    }
}
