use super::{
    metrics::{roc_auc, stratified_folds, stratified_split},
    Classifier, FeatureEncoder, ModelKind,
};
use crate::{
    config::ModelConfig,
    error::{ChurnError, ChurnResult},
    features::CustomerFeatureRow,
    rng::{RngBank, StageRng, StageSlot},
};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Minimum members of each class required to train.
pub const MIN_CLASS_SIZE: usize = 2;

/// Evaluation of one candidate family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub model: ModelKind,
    pub holdout_auc: f64,
    /// Mean AUC over the folds where it is defined.
    pub cv_auc: Option<f64>,
}

/// The selected classifier together with the encoder it was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub encoder: FeatureEncoder,
    pub classifier: Classifier,
    pub candidates: Vec<CandidateReport>,
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        self.classifier.kind()
    }

    pub fn report(&self) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.model == self.kind())
    }

    pub fn predict(&self, rows: &[CustomerFeatureRow]) -> ChurnResult<Vec<f64>> {
        let x = self.encoder.transform(rows)?;
        Ok(self.classifier.predict_proba(&x))
    }
}

pub struct ModelTrainer<'a> {
    cfg: &'a ModelConfig,
    rngs: RngBank,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(cfg: &'a ModelConfig, rngs: RngBank) -> Self {
        Self { cfg, rngs }
    }

    /// Fit every candidate on a stratified training split, score it on the
    /// holdout and by cross-validation, and keep the best holdout AUC.
    /// A failing candidate is logged and skipped.
    pub fn train(&self, rows: &[CustomerFeatureRow]) -> ChurnResult<TrainedModel> {
        let labels: Vec<bool> = rows.iter().map(|r| r.is_churned).collect();
        let positives = labels.iter().filter(|&&y| y).count();
        let negatives = labels.len() - positives;
        if positives < MIN_CLASS_SIZE || negatives < MIN_CLASS_SIZE {
            return Err(ChurnError::training(format!(
                "need at least {MIN_CLASS_SIZE} churned and {MIN_CLASS_SIZE} retained customers, \
                 got {positives} churned and {negatives} retained"
            )));
        }

        let encoder = FeatureEncoder::fit(rows);
        let x = encoder.transform(rows)?;

        let mut split_rng = self.rngs.for_stage(StageSlot::Split);
        let (train_idx, test_idx) =
            stratified_split(&labels, self.cfg.test_fraction, &mut split_rng);
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = pick(&labels, &train_idx);
        let x_test = x.select(Axis(0), &test_idx);
        let y_test = pick(&labels, &test_idx);
        log::info!(
            "Training on {} customers, holding out {}",
            train_idx.len(),
            test_idx.len()
        );

        let mut best: Option<(Classifier, f64)> = None;
        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for kind in ModelKind::ALL {
            match self.evaluate(kind, &x_train, &y_train, &x_test, &y_test) {
                Ok((classifier, report)) => {
                    log::info!(
                        "{kind}: AUC={:.4}, CV={}",
                        report.holdout_auc,
                        report
                            .cv_auc
                            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
                    );
                    // Strictly greater, so ties keep the earlier candidate.
                    if best
                        .as_ref()
                        .map_or(true, |(_, auc)| report.holdout_auc > *auc)
                    {
                        best = Some((classifier, report.holdout_auc));
                    }
                    candidates.push(report);
                }
                Err(e) => {
                    log::warn!("Candidate {kind} failed: {e}");
                    failures.push(format!("{kind}: {e}"));
                }
            }
        }

        let (classifier, auc) = best.ok_or_else(|| {
            ChurnError::training(format!("every candidate failed ({})", failures.join("; ")))
        })?;
        log::info!("Selected model: {} (AUC={auc:.4})", classifier.kind());
        Ok(TrainedModel {
            encoder,
            classifier,
            candidates,
        })
    }

    fn evaluate(
        &self,
        kind: ModelKind,
        x_train: &Array2<f64>,
        y_train: &[bool],
        x_test: &Array2<f64>,
        y_test: &[bool],
    ) -> ChurnResult<(Classifier, CandidateReport)> {
        let mut rng = self.rngs.for_stage(StageSlot::Forest);
        log::debug!("Fitting {kind} on the {} stream", rng.name);
        let classifier = Classifier::fit(kind, x_train, y_train, self.cfg, &mut rng)?;
        let holdout_auc = roc_auc(y_test, &classifier.predict_proba(x_test))
            .ok_or_else(|| ChurnError::training("holdout set is missing a class"))?;
        let cv_auc = self.cross_validate(kind, x_train, y_train)?;
        Ok((
            classifier,
            CandidateReport {
                model: kind,
                holdout_auc,
                cv_auc,
            },
        ))
    }

    /// Stratified k-fold AUC on the training split. Folds whose held-out
    /// part lacks a class are skipped; `None` when no fold is usable.
    fn cross_validate(
        &self,
        kind: ModelKind,
        x: &Array2<f64>,
        y: &[bool],
    ) -> ChurnResult<Option<f64>> {
        let positives = y.iter().filter(|&&v| v).count();
        let smallest_class = positives.min(y.len() - positives);
        let k = self.cfg.cv_folds.min(smallest_class);
        if k < 2 {
            log::debug!("Skipping cross-validation for {kind}: smallest class has {smallest_class}");
            return Ok(None);
        }

        let mut rng: StageRng = self.rngs.for_stage(StageSlot::CrossValidation);
        log::debug!("{k}-fold cross-validation for {kind} on the {} stream", rng.name);
        let folds = stratified_folds(y, k, &mut rng);
        let mut scores = Vec::with_capacity(k);
        for held_out in &folds {
            let mut in_fold = vec![false; y.len()];
            for &i in held_out {
                in_fold[i] = true;
            }
            let fit_idx: Vec<usize> = (0..y.len()).filter(|&i| !in_fold[i]).collect();
            let classifier = Classifier::fit(
                kind,
                &x.select(Axis(0), &fit_idx),
                &pick(y, &fit_idx),
                self.cfg,
                &mut rng,
            )?;
            let probs = classifier.predict_proba(&x.select(Axis(0), held_out));
            if let Some(auc) = roc_auc(&pick(y, held_out), &probs) {
                scores.push(auc);
            }
        }
        if scores.is_empty() {
            return Ok(None);
        }
        Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
    }
}

fn pick(labels: &[bool], idx: &[usize]) -> Vec<bool> {
    idx.iter().map(|&i| labels[i]).collect()
}
