//! Churn-risk analysis for a salon CRM.
//!
//! Pipeline: `store` loads customer facts, `features` derives model inputs
//! and labels, `model` trains and selects a classifier, `tagging` assigns
//! risk tags and levels, and `segment_sync` reconciles the managed CRM
//! segments. `analyzer` and `segment_manager` are the entry points.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod features;
pub mod labels;
pub mod model;
pub mod report;
pub mod rng;
pub mod segment_manager;
pub mod segment_sync;
pub mod store;
pub mod tagging;
pub mod types;

pub use analyzer::ChurnAnalyzer;
pub use config::ChurnConfig;
pub use error::{ChurnError, ChurnResult};
pub use report::Outcome;
pub use segment_manager::SegmentManager;
pub use store::CrmStore;
