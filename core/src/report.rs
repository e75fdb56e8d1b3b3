//! Result envelopes and report rows returned by the orchestrator.

use crate::{
    config::ReportConfig,
    error::ChurnResult,
    features::CustomerFeatureRow,
    labels::LifecycleSegment,
    model::{CandidateReport, ModelKind, TrainedModel},
    segment_sync::ManagedSegment,
    store::{AssignedCustomer, SegmentUsage},
    tagging::{self, RiskLevel, RiskTag},
    types::{CustomerId, RunId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{success, timestamp, error?, ...body}`: what every orchestrator
/// operation returns instead of propagating an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: Option<T>,
}

impl<T> Outcome<T> {
    pub fn ok(body: T) -> Self {
        Self {
            success: true,
            timestamp: timestamp(),
            error: None,
            body: Some(body),
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            timestamp: timestamp(),
            error: Some(error.to_string()),
            body: None,
        }
    }

    /// Convert a result, logging the failure under `operation`.
    pub fn capture(operation: &str, result: ChurnResult<T>) -> Self {
        match result {
            Ok(body) => Self::ok(body),
            Err(e) => {
                log::error!("{operation} failed: {e}");
                Self::failed(e)
            }
        }
    }

    pub fn into_result(self) -> anyhow::Result<T> {
        match (self.success, self.body) {
            (true, Some(body)) => Ok(body),
            _ => Err(anyhow::anyhow!(
                "{}",
                self.error.unwrap_or_else(|| "unknown failure".into())
            )),
        }
    }
}

fn timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Churn summary for one lifecycle segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStat {
    pub segment: LifecycleSegment,
    pub total_customers: usize,
    pub churned: usize,
    pub avg_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskCustomer {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub shop_name: Option<String>,
    pub visit_count: i64,
    pub days_since_last_visit: f64,
    pub total_revenue: f64,
    pub churn_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub churn_probability: f64,
    pub churn_risk_tag: RiskTag,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: RunId,
    pub reference_date: NaiveDate,
    pub customers: usize,
    pub churn_rate: f64,
    pub best_model: ModelKind,
    pub candidates: Vec<CandidateReport>,
    pub segment_stats: Vec<SegmentStat>,
    pub high_risk_customers: Vec<HighRiskCustomer>,
    pub risk_tag_stats: BTreeMap<RiskTag, usize>,
    pub risk_level_stats: BTreeMap<RiskLevel, usize>,
    pub predictions: Vec<Prediction>,
}

impl AnalysisReport {
    /// Summarize scored and tagged rows.
    pub fn build(
        run_id: RunId,
        reference_date: NaiveDate,
        rows: &[CustomerFeatureRow],
        model: &TrainedModel,
        cfg: &ReportConfig,
    ) -> Self {
        let churned = rows.iter().filter(|r| r.is_churned).count();
        let churn_rate = if rows.is_empty() {
            0.0
        } else {
            churned as f64 / rows.len() as f64
        };

        Self {
            run_id,
            reference_date,
            customers: rows.len(),
            churn_rate,
            best_model: model.kind(),
            candidates: model.candidates.clone(),
            segment_stats: segment_stats(rows),
            high_risk_customers: high_risk(rows, cfg.high_risk_limit),
            risk_tag_stats: tagging::tag_counts(rows),
            risk_level_stats: tagging::level_counts(rows),
            predictions: rows
                .iter()
                .map(|r| Prediction {
                    customer_id: r.customer_id,
                    customer_name: r.customer_name.clone(),
                    churn_probability: r.churn_probability,
                    churn_risk_tag: r.churn_risk_tag,
                    risk_level: r.risk_level,
                })
                .collect(),
        }
    }
}

/// One entry per lifecycle segment present in `rows`.
fn segment_stats(rows: &[CustomerFeatureRow]) -> Vec<SegmentStat> {
    LifecycleSegment::ALL
        .iter()
        .filter_map(|&segment| {
            let members: Vec<_> = rows.iter().filter(|r| r.segment == segment).collect();
            if members.is_empty() {
                return None;
            }
            let total = members.len();
            Some(SegmentStat {
                segment,
                total_customers: total,
                churned: members.iter().filter(|r| r.is_churned).count(),
                avg_probability: members.iter().map(|r| r.churn_probability).sum::<f64>()
                    / total as f64,
            })
        })
        .collect()
}

/// Highest probabilities first; equal probabilities keep input order.
fn high_risk(rows: &[CustomerFeatureRow], limit: usize) -> Vec<HighRiskCustomer> {
    let mut ranked: Vec<&CustomerFeatureRow> = rows.iter().collect();
    ranked.sort_by(|a, b| b.churn_probability.total_cmp(&a.churn_probability));
    ranked
        .into_iter()
        .take(limit)
        .map(|r| HighRiskCustomer {
            customer_id: r.customer_id,
            customer_name: r.customer_name.clone(),
            phone_number: r.phone_number.clone(),
            shop_name: r.shop_name.clone(),
            visit_count: r.visit_count,
            days_since_last_visit: r.days_since_last_visit,
            total_revenue: r.total_revenue,
            churn_probability: r.churn_probability,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_customers: usize,
    pub churn_rate: f64,
    pub best_model: ModelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentUpdateCounts {
    pub removed_count: usize,
    pub assigned_count: usize,
    pub vip_attention_count: usize,
    pub churn_risk_high_count: usize,
}

/// Body of `update_churn_risk_segments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentUpdate {
    pub run_id: RunId,
    pub analysis_summary: AnalysisSummary,
    pub segment_updates: SegmentUpdateCounts,
    pub previous_assignments: BTreeMap<ManagedSegment, usize>,
    pub new_assignments: BTreeMap<ManagedSegment, usize>,
}

/// Body of `segment_statistics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStatistics {
    pub all_segments: Vec<SegmentUsage>,
    pub risk_segment_details: BTreeMap<ManagedSegment, Vec<AssignedCustomer>>,
}
