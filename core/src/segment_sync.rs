//! Segment synchronizer.
//!
//! Reconciles computed risk tags against the two managed CRM segments by
//! wipe-and-reinsert: every managed assignment of the analyzed population is
//! removed, then the current targets are inserted. Repeated runs on
//! unchanged input converge to the same assignment set.
//!
//! In `SyncMode::TwoPhase` removal and insertion commit separately, so an
//! insertion failure leaves the removals in place and is reported as
//! `ChurnError::SegmentSync` with the number already removed.
//! `SyncMode::Atomic` runs both in one transaction.

use crate::{
    config::{SyncConfig, SyncMode},
    error::{ChurnError, ChurnResult},
    features::CustomerFeatureRow,
    store::CrmStore,
    tagging::RiskTag,
    types::{CustomerId, SegmentId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A CRM segment this crate creates and keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagedSegment {
    VipAttention,
    ChurnRiskHigh,
}

impl ManagedSegment {
    pub const ALL: [ManagedSegment; 2] = [Self::VipAttention, Self::ChurnRiskHigh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VipAttention => "VIP_ATTENTION",
            Self::ChurnRiskHigh => "CHURN_RISK_HIGH",
        }
    }

    /// The managed segment a risk tag maps to, if any.
    pub fn from_tag(tag: RiskTag) -> Option<Self> {
        match tag {
            RiskTag::VipAttention => Some(Self::VipAttention),
            RiskTag::ChurnRiskHigh => Some(Self::ChurnRiskHigh),
            _ => None,
        }
    }

    fn all_tags() -> [&'static str; 2] {
        Self::ALL.map(|m| m.as_str())
    }
}

impl std::fmt::Display for ManagedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer ids per managed segment.
pub type ManagedAssignments = BTreeMap<ManagedSegment, Vec<CustomerId>>;

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub removed: usize,
    pub inserted: usize,
    /// Customers that should now hold each managed segment.
    pub targets: ManagedAssignments,
}

impl SyncReport {
    pub fn target_count(&self, segment: ManagedSegment) -> usize {
        self.targets.get(&segment).map_or(0, Vec::len)
    }
}

pub struct SegmentSynchronizer<'a> {
    store: &'a CrmStore,
    cfg: &'a SyncConfig,
}

impl<'a> SegmentSynchronizer<'a> {
    pub fn new(store: &'a CrmStore, cfg: &'a SyncConfig) -> Self {
        Self { store, cfg }
    }

    /// Id of the definition for `segment`, created with the configured
    /// title and color on first use.
    pub fn get_or_create(&self, segment: ManagedSegment) -> ChurnResult<SegmentId> {
        let display = self.cfg.display_for(segment);
        self.store
            .get_or_create_segment(segment.as_str(), &display.title, &display.color_code)
    }

    /// Drop every managed-segment assignment held by `customer_ids`.
    pub fn remove_existing(&self, customer_ids: &[CustomerId]) -> ChurnResult<usize> {
        let removed = self
            .store
            .remove_assignments(customer_ids, &ManagedSegment::all_tags())?;
        log::info!("Removed {removed} existing managed segment assignments");
        Ok(removed)
    }

    /// Assign one customer. Returns false if the assignment already existed.
    pub fn assign(&self, customer_id: CustomerId, segment: ManagedSegment) -> ChurnResult<bool> {
        let segment_id = self.get_or_create(segment)?;
        Ok(self.store.insert_assignments(&[(customer_id, segment_id)])? == 1)
    }

    /// Current members of each managed segment.
    pub fn current_assignments(&self) -> ChurnResult<ManagedAssignments> {
        let mut out = ManagedAssignments::new();
        for segment in ManagedSegment::ALL {
            out.insert(segment, self.store.assigned_customers(segment.as_str())?);
        }
        Ok(out)
    }

    /// Replace the managed assignments of every row's customer with the
    /// segments implied by its current risk tag.
    pub fn reconcile(&self, rows: &[CustomerFeatureRow]) -> ChurnResult<SyncReport> {
        let mut targets = ManagedAssignments::new();
        let mut segment_ids = BTreeMap::new();
        for segment in ManagedSegment::ALL {
            targets.insert(segment, Vec::new());
            segment_ids.insert(segment, self.get_or_create(segment)?);
        }

        let mut pairs: Vec<(CustomerId, SegmentId)> = Vec::new();
        for row in rows {
            let Some(segment) = ManagedSegment::from_tag(row.churn_risk_tag) else {
                continue;
            };
            if let (Some(ids), Some(&segment_id)) =
                (targets.get_mut(&segment), segment_ids.get(&segment))
            {
                ids.push(row.customer_id);
                pairs.push((row.customer_id, segment_id));
            }
        }
        let customer_ids: Vec<CustomerId> = rows.iter().map(|r| r.customer_id).collect();

        let (removed, inserted) = match self.cfg.mode {
            SyncMode::TwoPhase => {
                let removed = self.remove_existing(&customer_ids)?;
                let inserted =
                    self.store
                        .insert_assignments(&pairs)
                        .map_err(|e| ChurnError::SegmentSync {
                            removed,
                            reason: e.to_string(),
                        })?;
                (removed, inserted)
            }
            SyncMode::Atomic => self
                .store
                .replace_assignments(&customer_ids, &ManagedSegment::all_tags(), &pairs)
                .map_err(|e| ChurnError::SegmentSync {
                    removed: 0,
                    reason: e.to_string(),
                })?,
        };
        log::info!("Segment sync complete: removed {removed}, assigned {inserted}");

        Ok(SyncReport {
            removed,
            inserted,
            targets,
        })
    }
}
