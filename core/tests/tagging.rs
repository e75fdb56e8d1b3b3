//! Rule-table precedence and probability escalation.

mod common;

use churnguard_core::{
    labels::LifecycleSegment,
    tagging::{apply_scores, escalate, evaluate, tag_counts, RiskLevel, RiskTag},
};
use common::row;

#[test]
fn vip_recency_triggers_attention() {
    let r = row(25, 400, 40, 0.35);
    assert_eq!(r.segment, LifecycleSegment::Vip);
    assert_eq!(evaluate(&r), (RiskTag::VipAttention, RiskLevel::High));
}

#[test]
fn vip_probability_alone_triggers_attention() {
    let r = row(25, 400, 5, 0.3);
    assert_eq!(evaluate(&r).0, RiskTag::VipAttention);

    let calm = row(25, 400, 5, 0.29);
    assert_eq!(evaluate(&calm), (RiskTag::Normal, RiskLevel::Low));
}

#[test]
fn new_customer_in_first_weeks_gets_followup() {
    let r = row(1, 10, 3, 0.3);
    assert_eq!(r.segment, LifecycleSegment::New);
    assert_eq!(evaluate(&r), (RiskTag::NewFollowup, RiskLevel::Medium));
}

#[test]
fn lapsed_new_customer_is_at_risk() {
    let r = row(2, 45, 35, 0.3);
    assert_eq!(evaluate(&r), (RiskTag::NewAtRisk, RiskLevel::High));
}

#[test]
fn reactivation_excludes_new_segment() {
    let regular = row(12, 500, 90, 0.3);
    assert_eq!(evaluate(&regular), (RiskTag::ReactivationNeeded, RiskLevel::High));

    // New customers with a long gap land in NEW_AT_RISK instead.
    let new = row(2, 500, 90, 0.3);
    assert_eq!(evaluate(&new).0, RiskTag::NewAtRisk);
}

#[test]
fn growing_delay_window_is_half_open() {
    assert_eq!(evaluate(&row(5, 300, 45, 0.3)).0, RiskTag::GrowingDelayed);
    assert_eq!(evaluate(&row(5, 300, 59, 0.3)).0, RiskTag::GrowingDelayed);
    assert_eq!(evaluate(&row(5, 300, 60, 0.3)).0, RiskTag::ReactivationNeeded);
    assert_eq!(evaluate(&row(5, 300, 44, 0.3)).0, RiskTag::Normal);
}

#[test]
fn later_rules_overwrite_earlier_matches() {
    // Both REACTIVATION_NEEDED and VIP_ATTENTION match; the later one wins.
    let r = row(30, 600, 70, 0.2);
    assert_eq!(evaluate(&r), (RiskTag::VipAttention, RiskLevel::High));
}

#[test]
fn model_risk_only_tags_untagged_rows() {
    let quiet_regular = row(12, 500, 10, 0.8);
    assert_eq!(evaluate(&quiet_regular), (RiskTag::ChurnRiskHigh, RiskLevel::High));

    // Already GROWING_DELAYED: the tag stays, escalation raises the level.
    let delayed = row(5, 300, 50, 0.9);
    assert_eq!(evaluate(&delayed), (RiskTag::GrowingDelayed, RiskLevel::High));

    let below = row(12, 500, 10, 0.69);
    assert_eq!(evaluate(&below).0, RiskTag::Normal);
}

#[test]
fn escalation_cascades_to_the_extremes() {
    for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
        assert_eq!(escalate(level, 0.6), RiskLevel::High);
        assert_eq!(escalate(level, 0.95), RiskLevel::High);
        assert_eq!(escalate(level, 0.1), RiskLevel::Low);
        assert_eq!(escalate(level, 0.0), RiskLevel::Low);
    }
    assert_eq!(escalate(RiskLevel::Medium, 0.35), RiskLevel::Medium);
    assert_eq!(escalate(RiskLevel::Low, 0.59), RiskLevel::Low);
    assert_eq!(escalate(RiskLevel::High, 0.11), RiskLevel::High);

    // Untagged but moderately risky: level jumps to high while tag stays NORMAL.
    assert_eq!(evaluate(&row(12, 500, 10, 0.65)), (RiskTag::Normal, RiskLevel::High));
    // Low probability drops a rule-assigned high all the way to low.
    assert_eq!(evaluate(&row(2, 45, 35, 0.05)), (RiskTag::NewAtRisk, RiskLevel::Low));
    // NEW_FOLLOWUP starts at medium and is raised by a high probability.
    assert_eq!(evaluate(&row(1, 10, 3, 0.65)), (RiskTag::NewFollowup, RiskLevel::High));
}

#[test]
fn apply_scores_clamps_and_counts() {
    let mut rows = vec![
        row(12, 500, 10, 0.0),
        row(12, 500, 10, 0.0),
        row(25, 400, 40, 0.0),
    ];
    apply_scores(&mut rows, &[1.5, f64::NAN, 0.2]);

    assert_eq!(rows[0].churn_probability, 1.0);
    assert_eq!(rows[0].churn_risk_tag, RiskTag::ChurnRiskHigh);
    assert_eq!(rows[1].churn_probability, 0.0);
    assert_eq!(rows[1].churn_risk_tag, RiskTag::Normal);
    assert_eq!(rows[2].churn_risk_tag, RiskTag::VipAttention);

    let counts = tag_counts(&rows);
    assert_eq!(counts.get(&RiskTag::ChurnRiskHigh), Some(&1));
    assert_eq!(counts.get(&RiskTag::Normal), Some(&1));
    assert_eq!(counts.get(&RiskTag::VipAttention), Some(&1));
    assert_eq!(counts.values().sum::<usize>(), rows.len());
}

#[test]
fn tags_serialize_in_crm_format() {
    assert_eq!(
        serde_json::to_string(&RiskTag::ReactivationNeeded).unwrap(),
        "\"REACTIVATION_NEEDED\""
    );
    assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"medium\"");
    assert_eq!(serde_json::to_string(&LifecycleSegment::Vip).unwrap(), "\"VIP\"");
    for tag in RiskTag::ALL {
        assert_eq!(
            serde_json::to_string(&tag).unwrap(),
            format!("\"{}\"", tag.as_str())
        );
    }
}
