//! Feature builder: turns upstream customer facts into model-ready rows.
//!
//! Derived features (reference date = "today"):
//!   age_years               = (today − birthdate) / 365.25
//!   tenure_days             = today − created_at
//!   avg_days_between_visits = tenure_days / (visit_count + 1)
//!   visit_frequency         = visit_count / (tenure_days / 365 + 0.1)
//!   noshow/cancel/complete  = count / (total_reservations + 1)
//!
//! Missing or non-finite values never fail a run: day gaps fall back to
//! MISSING_DAYS and frequencies, rates and amounts to 0.

use crate::{
    config::LabelConfig,
    error::ChurnResult,
    labels::{self, LifecycleSegment},
    store::{CrmStore, CustomerFacts},
    tagging::{RiskLevel, RiskTag},
    types::CustomerId,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Fill value for day-gap features that cannot be computed.
pub const MISSING_DAYS: f64 = 9999.0;

const SECONDS_PER_DAY: i64 = 86_400;

/// One customer's features for a single run. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerFeatureRow {
    // Identity and demographics
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub shop_name: Option<String>,
    pub gender: Option<String>,
    pub marketing_consent: bool,
    pub channel_id: Option<i64>,
    // Raw aggregates
    pub visit_count: i64,
    pub total_revenue: f64,
    pub noshow_count: i64,
    pub total_reservations: i64,
    pub paid_reservations: i64,
    pub noshow_reservations: i64,
    pub cancelled_reservations: i64,
    pub avg_order_value: f64,
    pub total_sales_amount: f64,
    pub total_sales_count: i64,
    // Derived
    pub age: Option<f64>,
    pub tenure_days: f64,
    pub days_since_last_visit: f64,
    pub avg_days_between_visits: f64,
    pub visit_frequency: f64,
    pub noshow_rate: f64,
    pub cancellation_rate: f64,
    pub completion_rate: f64,
    // Rules and model outputs
    pub segment: LifecycleSegment,
    pub is_churned: bool,
    pub churn_probability: f64,
    pub churn_risk_tag: RiskTag,
    pub risk_level: RiskLevel,
}

pub struct FeatureBuilder<'a> {
    store: &'a CrmStore,
    label: &'a LabelConfig,
    reference_date: NaiveDate,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(store: &'a CrmStore, label: &'a LabelConfig, reference_date: NaiveDate) -> Self {
        Self {
            store,
            label,
            reference_date,
        }
    }

    /// One row per non-deleted customer, including customers with no
    /// reservations or sales.
    pub fn build(&self) -> ChurnResult<Vec<CustomerFeatureRow>> {
        let facts = self.store.load_customer_facts()?;
        let rows: Vec<_> = facts
            .iter()
            .map(|f| derive_row(f, self.reference_date, self.label))
            .collect();

        if !rows.is_empty() {
            let churned = rows.iter().filter(|r| r.is_churned).count();
            log::info!(
                "Churn ratio: {:.2}% ({churned}/{})",
                churned as f64 / rows.len() as f64 * 100.0,
                rows.len()
            );
        }
        Ok(rows)
    }
}

/// Compute every derived feature, the lifecycle segment and the training
/// label for one customer.
pub fn derive_row(
    facts: &CustomerFacts,
    reference_date: NaiveDate,
    label: &LabelConfig,
) -> CustomerFeatureRow {
    let today = reference_date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let visits = facts.visit_count as f64;

    let days_since = |text: &Option<String>| {
        text.as_deref()
            .and_then(parse_timestamp)
            .map(|ts| days_between(ts, today))
    };

    let days_since_last_visit = finite_or(days_since(&facts.recent_visit_date), MISSING_DAYS);
    let tenure = days_since(&facts.created_at);
    let age = days_since(&facts.birthdate)
        .map(|d| d / 365.25)
        .filter(|a| a.is_finite());

    let avg_days_between_visits = finite_or(tenure.map(|t| t / (visits + 1.0)), MISSING_DAYS);
    let visit_frequency = finite_or(tenure.map(|t| visits / (t / 365.0 + 0.1)), 0.0);
    let tenure_days = finite_or(tenure, 0.0);

    let denom = facts.total_reservations as f64 + 1.0;
    let rate = |n: i64| finite_or(Some(n as f64 / denom), 0.0);

    let segment = LifecycleSegment::from_visit_count(facts.visit_count);
    let is_churned = labels::is_churned(
        days_since_last_visit,
        avg_days_between_visits,
        facts.visit_count,
        tenure_days,
        segment,
        label,
    );

    CustomerFeatureRow {
        customer_id: facts.customer_id,
        customer_name: facts.customer_name.clone(),
        phone_number: facts.phone_number.clone(),
        shop_name: facts.shop_name.clone(),
        gender: facts.gender.clone(),
        marketing_consent: facts.marketing_consent,
        channel_id: facts.channel_id,
        visit_count: facts.visit_count,
        total_revenue: finite_or(Some(facts.total_revenue), 0.0),
        noshow_count: facts.noshow_count,
        total_reservations: facts.total_reservations,
        paid_reservations: facts.paid_reservations,
        noshow_reservations: facts.noshow_reservations,
        cancelled_reservations: facts.cancelled_reservations,
        avg_order_value: finite_or(facts.avg_order_value, 0.0),
        total_sales_amount: finite_or(facts.total_sales_amount, 0.0),
        total_sales_count: facts.total_sales_count,
        age,
        tenure_days,
        days_since_last_visit,
        avg_days_between_visits,
        visit_frequency,
        noshow_rate: rate(facts.noshow_reservations),
        cancellation_rate: rate(facts.cancelled_reservations),
        completion_rate: rate(facts.paid_reservations),
        segment,
        is_churned,
        churn_probability: 0.0,
        churn_risk_tag: RiskTag::Normal,
        risk_level: RiskLevel::Low,
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Whole days from `from` to `to`, floored (negative when `from` is later).
fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY) as f64
}

/// Lenient timestamp parsing; anything unrecognised is treated as missing.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts);
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.naive_local())
}
