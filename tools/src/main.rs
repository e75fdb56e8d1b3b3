//! segment-runner: one-shot churn analysis and segment update for the CRM.
//!
//! Usage:
//!   segment-runner --db crm.db --migrate
//!   segment-runner --db crm.db --mode analyze --json
//!   segment-runner --db crm.db --config data/churn_config.json --reference-date 2025-06-30

use anyhow::{bail, Result};
use chrono::NaiveDate;
use churnguard_core::{
    report::{AnalysisReport, SegmentStatistics, SegmentUpdate},
    segment_sync::ManagedSegment,
    ChurnAnalyzer, ChurnConfig, CrmStore, Outcome, SegmentManager,
};
use std::env;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Analyze,
    Update,
    Stats,
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "analyze" => Ok(Self::Analyze),
            "update" => Ok(Self::Update),
            "stats" => Ok(Self::Stats),
            other => bail!("unknown mode '{other}' (expected analyze, update or stats)"),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config_path = flag_value(&args, "--config");
    let mode: Mode = flag_value(&args, "--mode").unwrap_or("update").parse()?;
    let reference_date = flag_value(&args, "--reference-date")
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()?;
    let migrate = args.iter().any(|a| a == "--migrate");
    let json = args.iter().any(|a| a == "--json");

    let cfg = match config_path {
        Some(path) => ChurnConfig::load(path)?,
        None => ChurnConfig::default(),
    };

    if !json {
        println!("segment-runner");
        println!("  db:        {db}");
        println!("  config:    {}", config_path.unwrap_or("(defaults)"));
        println!("  mode:      {mode:?}");
        println!("  seed:      {}", cfg.seed);
        println!();
    }

    let store = CrmStore::open(db, &cfg.store)?;
    if migrate {
        store.migrate()?;
        log::info!("Migrations applied to {db}");
    }

    let success = match mode {
        Mode::Analyze => {
            let mut analyzer = ChurnAnalyzer::new(&store, &cfg);
            if let Some(date) = reference_date {
                analyzer = analyzer.with_reference_date(date);
            }
            emit(&analyzer.run_full_analysis(), json, print_analysis)?
        }
        Mode::Update => {
            let mut manager = SegmentManager::new(&store, &cfg);
            if let Some(date) = reference_date {
                manager = manager.with_reference_date(date);
            }
            emit(&manager.update_churn_risk_segments(), json, print_update)?
        }
        Mode::Stats => {
            let manager = SegmentManager::new(&store, &cfg);
            emit(&manager.segment_statistics(), json, print_statistics)?
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Print an outcome as JSON or through `summary`. Returns its success flag.
fn emit<T: serde::Serialize>(outcome: &Outcome<T>, json: bool, summary: fn(&T)) -> Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        match (&outcome.body, &outcome.error) {
            (Some(body), _) if outcome.success => summary(body),
            (_, error) => {
                println!("=== FAILED ({}) ===", outcome.timestamp);
                println!("  {}", error.as_deref().unwrap_or("unknown failure"));
            }
        }
    }
    Ok(outcome.success)
}

fn print_analysis(report: &AnalysisReport) {
    println!("=== ANALYSIS SUMMARY ===");
    println!("  run_id:         {}", report.run_id);
    println!("  reference date: {}", report.reference_date);
    println!("  customers:      {}", report.customers);
    println!("  churn rate:     {:.2}%", report.churn_rate * 100.0);
    println!("  best model:     {}", report.best_model);
    for c in &report.candidates {
        let cv = c.cv_auc.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
        println!("    {:<14} AUC {:.4}  CV {cv}", c.model.as_str(), c.holdout_auc);
    }

    println!();
    println!("=== SEGMENTS ===");
    for s in &report.segment_stats {
        println!(
            "  {:<8} {:>5} customers | {:>5} churned | avg p {:.3}",
            s.segment.as_str(),
            s.total_customers,
            s.churned,
            s.avg_probability
        );
    }

    println!();
    println!("=== RISK TAGS ===");
    for (tag, count) in &report.risk_tag_stats {
        println!("  {:<20} {count}", tag.as_str());
    }
    for (level, count) in &report.risk_level_stats {
        println!("  level {:<14} {count}", level.as_str());
    }

    println!();
    println!("=== TOP {} AT RISK ===", report.high_risk_customers.len().min(10));
    for c in report.high_risk_customers.iter().take(10) {
        println!(
            "  #{:<6} {:<20} p={:.3} | {} visits | {:.0} days since last visit",
            c.customer_id,
            c.customer_name,
            c.churn_probability,
            c.visit_count,
            c.days_since_last_visit
        );
    }
}

fn print_update(update: &SegmentUpdate) {
    let summary = &update.analysis_summary;
    let counts = &update.segment_updates;
    println!("=== SEGMENT UPDATE ===");
    println!("  run_id:         {}", update.run_id);
    println!("  customers:      {}", summary.total_customers);
    println!("  churn rate:     {:.2}%", summary.churn_rate * 100.0);
    println!("  best model:     {}", summary.best_model);
    println!("  removed:        {}", counts.removed_count);
    println!("  assigned:       {}", counts.assigned_count);
    println!();
    for segment in ManagedSegment::ALL {
        let before = update.previous_assignments.get(&segment).copied().unwrap_or(0);
        let after = update.new_assignments.get(&segment).copied().unwrap_or(0);
        let delta = after as i64 - before as i64;
        println!("  {:<16} {before:>5} -> {after:>5} ({delta:+})", segment.as_str());
    }
}

fn print_statistics(stats: &SegmentStatistics) {
    println!("=== SEGMENT STATISTICS ===");
    for s in &stats.all_segments {
        println!(
            "  {:<20} {:>6}  {}",
            s.segment_tag, s.customer_count, s.segment_title
        );
    }
    for (segment, customers) in &stats.risk_segment_details {
        println!();
        println!("  top {segment}:");
        for c in customers {
            println!(
                "    #{:<6} {:<20} {} visits | revenue {:.0}",
                c.customer_id, c.customer_name, c.visit_count, c.total_revenue
            );
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
