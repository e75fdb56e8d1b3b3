//! Categorical encoding, imputation and standardization.

use crate::{
    error::{ChurnError, ChurnResult},
    features::CustomerFeatureRow,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Model input columns, in matrix order.
pub const FEATURE_COLUMNS: [&str; 17] = [
    "visit_count",
    "total_revenue",
    "days_since_last_visit",
    "tenure_days",
    "age",
    "noshow_count",
    "avg_days_between_visits",
    "visit_frequency",
    "avg_order_value",
    "total_sales_count",
    "noshow_rate",
    "cancellation_rate",
    "completion_rate",
    "marketing_consent",
    "gender",
    "channel_id",
    "segment",
];

/// Category used for a customer with no recorded gender.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Maps string categories to their index in the sorted class list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn transform(&self, column: &'static str, value: &str) -> ChurnResult<f64> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|i| i as f64)
            .map_err(|_| ChurnError::UnseenCategory {
                column,
                value: value.to_string(),
            })
    }
}

/// Everything needed to turn feature rows into a numeric matrix:
/// the two label encoders and the medians used to impute missing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEncoder {
    gender: LabelEncoder,
    segment: LabelEncoder,
    age_median: f64,
    channel_median: f64,
}

impl FeatureEncoder {
    pub fn fit(rows: &[CustomerFeatureRow]) -> Self {
        let gender = LabelEncoder::fit(rows.iter().map(gender_category));
        let segment = LabelEncoder::fit(rows.iter().map(|r| r.segment.as_str()));
        let age_median = median(rows.iter().filter_map(|r| r.age));
        let channel_median = median(rows.iter().filter_map(|r| r.channel_id.map(|c| c as f64)));
        Self {
            gender,
            segment,
            age_median,
            channel_median,
        }
    }

    pub fn gender_classes(&self) -> &[String] {
        self.gender.classes()
    }

    /// One row per customer, columns in FEATURE_COLUMNS order.
    pub fn transform(&self, rows: &[CustomerFeatureRow]) -> ChurnResult<Array2<f64>> {
        let mut x = Array2::<f64>::zeros((rows.len(), FEATURE_COLUMNS.len()));
        for (i, r) in rows.iter().enumerate() {
            let values = [
                r.visit_count as f64,
                r.total_revenue,
                r.days_since_last_visit,
                r.tenure_days,
                r.age.unwrap_or(self.age_median),
                r.noshow_count as f64,
                r.avg_days_between_visits,
                r.visit_frequency,
                r.avg_order_value,
                r.total_sales_count as f64,
                r.noshow_rate,
                r.cancellation_rate,
                r.completion_rate,
                if r.marketing_consent { 1.0 } else { 0.0 },
                self.gender.transform("gender", gender_category(r))?,
                r.channel_id.map(|c| c as f64).unwrap_or(self.channel_median),
                self.segment.transform("segment", r.segment.as_str())?,
            ];
            for (j, v) in values.into_iter().enumerate() {
                x[[i, j]] = v;
            }
        }
        Ok(x)
    }
}

fn gender_category(row: &CustomerFeatureRow) -> &str {
    row.gender.as_deref().unwrap_or(UNKNOWN_CATEGORY)
}

/// Median of the values, 0.0 when there are none.
pub fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Zero-mean, unit-variance scaling fit on a training matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Population standard deviation; constant columns get scale 1.
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_features = x.ncols();
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }
}
