//! Churn analysis orchestration: features, training, scoring and tagging.

use crate::{
    config::ChurnConfig,
    error::{ChurnError, ChurnResult},
    features::{CustomerFeatureRow, FeatureBuilder},
    model::{ModelTrainer, TrainedModel},
    report::{AnalysisReport, Outcome},
    rng::RngBank,
    store::CrmStore,
    tagging,
};
use chrono::NaiveDate;
use uuid::Uuid;

/// Runs the analysis pipeline against one store and keeps the most recently
/// trained model for later `predict` calls.
pub struct ChurnAnalyzer<'a> {
    store: &'a CrmStore,
    cfg: &'a ChurnConfig,
    reference_date: Option<NaiveDate>,
    trained: Option<TrainedModel>,
}

impl<'a> ChurnAnalyzer<'a> {
    pub fn new(store: &'a CrmStore, cfg: &'a ChurnConfig) -> Self {
        Self {
            store,
            cfg,
            reference_date: None,
            trained: None,
        }
    }

    /// Pin "today" instead of using the local date.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn trained_model(&self) -> Option<&TrainedModel> {
        self.trained.as_ref()
    }

    /// Full pipeline. Returns the report and the scored, tagged rows.
    pub fn analyze(&mut self) -> ChurnResult<(AnalysisReport, Vec<CustomerFeatureRow>)> {
        let run_id = Uuid::new_v4().to_string();
        let reference_date = self.reference_date();
        log::info!("[{run_id}] Starting churn analysis (reference date {reference_date})");

        let mut rows = FeatureBuilder::new(self.store, &self.cfg.label, reference_date).build()?;
        let trained =
            ModelTrainer::new(&self.cfg.model, RngBank::new(self.cfg.seed)).train(&rows)?;
        let probabilities = trained.predict(&rows)?;
        tagging::apply_scores(&mut rows, &probabilities);
        tagging::log_distribution(&rows);

        let report =
            AnalysisReport::build(run_id, reference_date, &rows, &trained, &self.cfg.report);
        log::info!(
            "[{}] Analysis complete: {} customers, churn rate {:.2}%, best model {}",
            report.run_id,
            report.customers,
            report.churn_rate * 100.0,
            report.best_model
        );
        self.trained = Some(trained);
        Ok((report, rows))
    }

    pub fn run_full_analysis(&mut self) -> Outcome<AnalysisReport> {
        Outcome::capture("Churn analysis", self.analyze().map(|(report, _)| report))
    }

    /// Churn probability per row from the model trained by the last
    /// successful analysis.
    pub fn predict(&self, rows: &[CustomerFeatureRow]) -> ChurnResult<Vec<f64>> {
        let trained = self.trained.as_ref().ok_or(ChurnError::UntrainedModel)?;
        trained.predict(rows)
    }

    /// Score and tag externally supplied rows in place.
    pub fn score(&self, rows: &mut [CustomerFeatureRow]) -> ChurnResult<()> {
        let probabilities = self.predict(rows)?;
        tagging::apply_scores(rows, &probabilities);
        Ok(())
    }
}
