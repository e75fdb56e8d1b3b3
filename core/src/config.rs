use serde::{Deserialize, Serialize};

use crate::segment_sync::ManagedSegment;

/// Hyper-parameters for the tree-ensemble candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub class_balanced: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 20,
            min_samples_leaf: 10,
            class_balanced: true,
        }
    }
}

/// Hyper-parameters for the linear candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// Inverse regularization strength (sklearn's `C`).
    pub inverse_regularization: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub class_balanced: bool,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            inverse_regularization: 0.1,
            max_iterations: 1000,
            tolerance: 1e-8,
            class_balanced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub forest: ForestConfig,
    pub logistic: LogisticConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            cv_folds: 5,
            forest: ForestConfig::default(),
            logistic: LogisticConfig::default(),
        }
    }
}

/// Constants of the heuristic churn label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub max_expected_interval_days: f64,
    pub interval_multiplier: f64,
    pub min_threshold_days: f64,
    pub max_threshold_days: f64,
    pub vip_threshold_factor: f64,
    pub new_threshold_factor: f64,
    pub min_visits: i64,
    pub min_tenure_days: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            max_expected_interval_days: 120.0,
            interval_multiplier: 2.5,
            min_threshold_days: 60.0,
            max_threshold_days: 180.0,
            vip_threshold_factor: 1.5,
            new_threshold_factor: 0.7,
            min_visits: 2,
            min_tenure_days: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub high_risk_limit: usize,
    /// Customers listed per managed tag in segment statistics.
    pub top_customers_per_segment: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            high_risk_limit: 30,
            top_customers_per_segment: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { busy_timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Bulk delete and the insert loop commit separately.
    #[default]
    TwoPhase,
    /// Delete and insert share one transaction.
    Atomic,
}

/// Display attributes for a managed CRM segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDisplay {
    pub tag: ManagedSegment,
    pub title: String,
    pub color_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub segments: Vec<SegmentDisplay>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::TwoPhase,
            segments: vec![
                SegmentDisplay {
                    tag: ManagedSegment::VipAttention,
                    title: "VIP customer pattern change".into(),
                    color_code: "#FF6B35".into(),
                },
                SegmentDisplay {
                    tag: ManagedSegment::ChurnRiskHigh,
                    title: "Model-predicted churn risk".into(),
                    color_code: "#DC143C".into(),
                },
            ],
        }
    }
}

impl SyncConfig {
    /// Display attributes for `tag`, falling back to the tag itself as title.
    pub fn display_for(&self, tag: ManagedSegment) -> SegmentDisplay {
        self.segments
            .iter()
            .find(|s| s.tag == tag)
            .cloned()
            .unwrap_or_else(|| SegmentDisplay {
                tag,
                title: tag.as_str().to_string(),
                color_code: "#808080".into(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    /// Master seed for every random stream in a run.
    pub seed: u64,
    pub model: ModelConfig,
    pub label: LabelConfig,
    pub report: ReportConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            model: ModelConfig::default(),
            label: LabelConfig::default(),
            report: ReportConfig::default(),
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ChurnConfig {
    /// Load from a JSON file. Missing sections keep their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ChurnConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let m = &self.model;
        if !(m.test_fraction > 0.0 && m.test_fraction < 1.0) {
            anyhow::bail!("model.test_fraction must be in (0, 1), got {}", m.test_fraction);
        }
        if m.cv_folds < 2 {
            anyhow::bail!("model.cv_folds must be >= 2, got {}", m.cv_folds);
        }
        if m.forest.n_trees == 0 {
            anyhow::bail!("model.forest.n_trees must be > 0");
        }
        if m.logistic.inverse_regularization <= 0.0 {
            anyhow::bail!("model.logistic.inverse_regularization must be > 0");
        }
        Ok(())
    }
}
