//! Churn classifiers: encoding, the two candidate model families and the
//! trainer that selects between them.

pub mod encoding;
pub mod forest;
pub mod logistic;
pub mod metrics;
mod trainer;

pub use encoding::{FeatureEncoder, LabelEncoder, StandardScaler, FEATURE_COLUMNS};
pub use trainer::{CandidateReport, ModelTrainer, TrainedModel};

use crate::{config::ModelConfig, error::ChurnResult, rng::StageRng};
use forest::RandomForest;
use logistic::LogisticRegression;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Candidate model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    TreeEnsemble,
    Linear,
}

impl ModelKind {
    /// Training order; on an AUC tie the earlier kind wins.
    pub const ALL: [ModelKind; 2] = [Self::TreeEnsemble, Self::Linear];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TreeEnsemble => "tree_ensemble",
            Self::Linear => "linear",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted classifier. The linear model carries its own scaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    TreeEnsemble(RandomForest),
    Linear {
        scaler: StandardScaler,
        model: LogisticRegression,
    },
}

impl Classifier {
    pub fn fit(
        kind: ModelKind,
        x: &Array2<f64>,
        y: &[bool],
        cfg: &ModelConfig,
        rng: &mut StageRng,
    ) -> ChurnResult<Self> {
        match kind {
            ModelKind::TreeEnsemble => Ok(Self::TreeEnsemble(RandomForest::fit(
                x,
                y,
                &cfg.forest,
                rng,
            )?)),
            ModelKind::Linear => {
                let scaler = StandardScaler::fit(x);
                let model = LogisticRegression::fit(&scaler.transform(x), y, &cfg.logistic)?;
                Ok(Self::Linear { scaler, model })
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::TreeEnsemble(_) => ModelKind::TreeEnsemble,
            Self::Linear { .. } => ModelKind::Linear,
        }
    }

    /// Positive-class probability for each row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        match self {
            Self::TreeEnsemble(forest) => forest.predict_proba(x),
            Self::Linear { scaler, model } => model.predict_proba(&scaler.transform(x)),
        }
    }
}
