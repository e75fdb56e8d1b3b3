//! Churn-risk segment maintenance: analysis followed by reconciliation.

use crate::{
    analyzer::ChurnAnalyzer,
    config::ChurnConfig,
    error::ChurnResult,
    report::{AnalysisSummary, Outcome, SegmentStatistics, SegmentUpdate, SegmentUpdateCounts},
    segment_sync::{ManagedSegment, SegmentSynchronizer},
    store::CrmStore,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub struct SegmentManager<'a> {
    store: &'a CrmStore,
    cfg: &'a ChurnConfig,
    analyzer: ChurnAnalyzer<'a>,
}

impl<'a> SegmentManager<'a> {
    pub fn new(store: &'a CrmStore, cfg: &'a ChurnConfig) -> Self {
        Self {
            store,
            cfg,
            analyzer: ChurnAnalyzer::new(store, cfg),
        }
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.analyzer = self.analyzer.with_reference_date(date);
        self
    }

    /// The analyzer, holding the model from the last update.
    pub fn analyzer(&self) -> &ChurnAnalyzer<'a> {
        &self.analyzer
    }

    pub fn update_churn_risk_segments(&mut self) -> Outcome<SegmentUpdate> {
        Outcome::capture("Segment update", self.update())
    }

    fn update(&mut self) -> ChurnResult<SegmentUpdate> {
        log::info!("Starting churn risk segment update");
        let (report, rows) = self.analyzer.analyze()?;

        let sync = SegmentSynchronizer::new(self.store, &self.cfg.sync);
        let previous = sync.current_assignments()?;
        let synced = sync.reconcile(&rows)?;

        let previous_assignments: BTreeMap<_, _> = previous
            .iter()
            .map(|(&segment, ids)| (segment, ids.len()))
            .collect();
        let new_assignments: BTreeMap<_, _> = ManagedSegment::ALL
            .iter()
            .map(|&segment| (segment, synced.target_count(segment)))
            .collect();
        for segment in ManagedSegment::ALL {
            log::info!(
                "{segment}: {} -> {}",
                previous_assignments.get(&segment).copied().unwrap_or(0),
                new_assignments[&segment]
            );
        }

        Ok(SegmentUpdate {
            run_id: report.run_id,
            analysis_summary: AnalysisSummary {
                total_customers: report.customers,
                churn_rate: report.churn_rate,
                best_model: report.best_model,
            },
            segment_updates: SegmentUpdateCounts {
                removed_count: synced.removed,
                assigned_count: synced.inserted,
                vip_attention_count: synced.target_count(ManagedSegment::VipAttention),
                churn_risk_high_count: synced.target_count(ManagedSegment::ChurnRiskHigh),
            },
            previous_assignments,
            new_assignments,
        })
    }

    pub fn segment_statistics(&self) -> Outcome<SegmentStatistics> {
        Outcome::capture("Segment statistics", self.statistics())
    }

    fn statistics(&self) -> ChurnResult<SegmentStatistics> {
        let all_segments = self.store.segment_usage()?;
        let mut risk_segment_details = BTreeMap::new();
        for segment in ManagedSegment::ALL {
            let top = self.store.top_customers_in_segment(
                segment.as_str(),
                self.cfg.report.top_customers_per_segment,
            )?;
            risk_segment_details.insert(segment, top);
        }
        Ok(SegmentStatistics {
            all_segments,
            risk_segment_details,
        })
    }
}
