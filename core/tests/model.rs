//! Encoding, metrics, training and model selection.

mod common;

use churnguard_core::{
    config::ModelConfig,
    error::ChurnError,
    features::FeatureBuilder,
    model::{
        metrics::{class_balanced_weights, roc_auc, stratified_folds, stratified_split},
        FeatureEncoder, LabelEncoder, ModelKind, ModelTrainer, StandardScaler, FEATURE_COLUMNS,
    },
    rng::{RngBank, StageSlot},
    tagging::{RiskLevel, RiskTag},
    ChurnAnalyzer, ChurnConfig,
};
use common::{reference_date, row, seeded_store};
use ndarray::array;

// ── Metrics ─────────────────────────────────────────────────────────────────

#[test]
fn auc_handles_order_ties_and_missing_classes() {
    let labels = [false, false, true, true];
    assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
    assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    assert_eq!(roc_auc(&labels, &[0.5; 4]), Some(0.5));
    // one positive ranked between the negatives
    assert_eq!(roc_auc(&[false, true, false], &[0.1, 0.5, 0.9]), Some(0.5));
    assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]), None);
}

#[test]
fn stratified_split_keeps_both_classes_on_each_side() {
    let labels: Vec<bool> = (0..50).map(|i| i % 10 == 0).collect(); // 5 positives
    let mut rng = RngBank::new(42).for_stage(StageSlot::Split);
    let (train, test) = stratified_split(&labels, 0.2, &mut rng);

    assert_eq!(train.len() + test.len(), labels.len());
    assert_eq!(test.len(), 10);
    assert_eq!(test.iter().filter(|&&i| labels[i]).count(), 1);
    assert!(train.iter().any(|&i| labels[i]));
    assert!(train.iter().all(|i| !test.contains(i)));
}

#[test]
fn stratified_split_is_reproducible() {
    let labels: Vec<bool> = (0..40).map(|i| i % 3 == 0).collect();
    let split = |seed| {
        let mut rng = RngBank::new(seed).for_stage(StageSlot::Split);
        stratified_split(&labels, 0.2, &mut rng)
    };
    assert_eq!(split(7), split(7));
}

#[test]
fn folds_partition_every_index() {
    let labels: Vec<bool> = (0..23).map(|i| i % 4 == 0).collect();
    let mut rng = RngBank::new(1).for_stage(StageSlot::CrossValidation);
    let folds = stratified_folds(&labels, 5, &mut rng);

    assert_eq!(folds.len(), 5);
    let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..23).collect::<Vec<_>>());
    for fold in &folds {
        assert!(fold.iter().any(|&i| labels[i]), "every fold holds a positive");
    }
}

#[test]
fn balanced_weights_equalize_class_mass() {
    let labels = [true, false, false, false];
    let (w_neg, w_pos) = class_balanced_weights(&labels);
    assert!((w_pos * 1.0 - w_neg * 3.0).abs() < 1e-12);
    assert!((w_pos - 2.0).abs() < 1e-12);
}

// ── Encoding ────────────────────────────────────────────────────────────────

#[test]
fn label_encoder_sorts_classes_and_rejects_unseen() {
    let enc = LabelEncoder::fit(["M", "F", "unknown", "F"]);
    assert_eq!(enc.classes(), ["F", "M", "unknown"]);
    assert_eq!(enc.transform("gender", "M").unwrap(), 1.0);
    assert!(matches!(
        enc.transform("gender", "X"),
        Err(ChurnError::UnseenCategory { column: "gender", .. })
    ));
}

#[test]
fn feature_encoder_imputes_missing_values() {
    let mut a = row(12, 500, 10, 0.0);
    a.age = Some(30.0);
    a.channel_id = Some(1);
    let mut b = row(12, 500, 10, 0.0);
    b.age = Some(50.0);
    b.channel_id = Some(3);
    let mut c = row(3, 500, 10, 0.0);
    c.age = None;
    c.channel_id = None;
    c.gender = None;

    let rows = vec![a, b, c];
    let enc = FeatureEncoder::fit(&rows);
    let x = enc.transform(&rows).unwrap();

    assert_eq!(x.dim(), (3, FEATURE_COLUMNS.len()));
    let col = |name: &str| FEATURE_COLUMNS.iter().position(|c| *c == name).unwrap();
    assert_eq!(x[[2, col("age")]], 40.0);
    assert_eq!(x[[2, col("channel_id")]], 2.0);
    assert_eq!(enc.gender_classes(), ["unknown"]);
}

#[test]
fn feature_encoder_rejects_segment_never_seen_in_training() {
    let training = vec![row(12, 500, 10, 0.0), row(15, 500, 10, 0.0)];
    let enc = FeatureEncoder::fit(&training);
    let vip = vec![row(25, 500, 10, 0.0)];
    assert!(matches!(
        enc.transform(&vip),
        Err(ChurnError::UnseenCategory { column: "segment", .. })
    ));
}

#[test]
fn scaler_standardizes_and_tolerates_constant_columns() {
    let x = array![[1.0, 5.0], [3.0, 5.0]];
    let scaled = StandardScaler::fit(&x).transform(&x);
    assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
}

// ── Training ────────────────────────────────────────────────────────────────

#[test]
fn training_requires_two_examples_per_class() {
    let mut rows: Vec<_> = (0..10).map(|_| row(12, 500, 10, 0.0)).collect();
    rows[0].is_churned = true;

    let cfg = ModelConfig::default();
    let err = ModelTrainer::new(&cfg, RngBank::new(42))
        .train(&rows)
        .unwrap_err();
    assert!(matches!(err, ChurnError::ModelTraining { .. }), "{err}");
}

#[test]
fn trainer_reports_both_candidates() {
    let store = seeded_store(160, 11);
    let cfg = ChurnConfig::default();
    let rows = FeatureBuilder::new(&store, &cfg.label, reference_date())
        .build()
        .unwrap();

    let trained = ModelTrainer::new(&cfg.model, RngBank::new(cfg.seed))
        .train(&rows)
        .unwrap();

    let kinds: Vec<ModelKind> = trained.candidates.iter().map(|c| c.model).collect();
    assert_eq!(kinds, ModelKind::ALL.to_vec());
    for c in &trained.candidates {
        assert!((0.0..=1.0).contains(&c.holdout_auc), "{c:?}");
        let cv = c.cv_auc.expect("cv defined on a balanced population");
        assert!((0.0..=1.0).contains(&cv));
    }
    let best = trained.report().expect("selected candidate is reported");
    assert!(trained
        .candidates
        .iter()
        .all(|c| c.holdout_auc <= best.holdout_auc));
    // The recency signal in the fixture is strong.
    assert!(best.holdout_auc > 0.8, "best AUC {}", best.holdout_auc);

    let probabilities = trained.predict(&rows).unwrap();
    assert_eq!(probabilities.len(), rows.len());
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
}

// ── Full analysis ───────────────────────────────────────────────────────────

#[test]
fn analysis_is_reproducible_for_a_fixed_seed() {
    let cfg = ChurnConfig::default();
    let run = |seed| {
        let store = seeded_store(160, seed);
        let mut analyzer = ChurnAnalyzer::new(&store, &cfg).with_reference_date(reference_date());
        let (report, _) = analyzer.analyze().unwrap();
        report
    };
    let a = run(3);
    let b = run(3);

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.best_model, b.best_model);
    assert_eq!(a.candidates, b.candidates);
    assert_eq!(a.predictions, b.predictions);
}

#[test]
fn analysis_report_is_consistent() {
    let store = seeded_store(200, 5);
    let cfg = ChurnConfig::default();
    let mut analyzer = ChurnAnalyzer::new(&store, &cfg).with_reference_date(reference_date());

    let outcome = analyzer.run_full_analysis();
    assert!(outcome.success, "{:?}", outcome.error);
    let report = outcome.into_result().unwrap();

    assert_eq!(report.customers, 200);
    assert_eq!(report.predictions.len(), 200);
    assert!(report.churn_rate > 0.0 && report.churn_rate < 1.0);
    assert_eq!(report.reference_date, reference_date());

    for p in &report.predictions {
        assert!((0.0..=1.0).contains(&p.churn_probability));
        assert!(RiskTag::ALL.contains(&p.churn_risk_tag));
        assert!(matches!(
            p.risk_level,
            RiskLevel::Low | RiskLevel::Medium | RiskLevel::High
        ));
    }
    assert_eq!(report.risk_tag_stats.values().sum::<usize>(), 200);
    assert_eq!(report.risk_level_stats.values().sum::<usize>(), 200);
    assert_eq!(
        report.segment_stats.iter().map(|s| s.total_customers).sum::<usize>(),
        200
    );

    let high = &report.high_risk_customers;
    assert_eq!(high.len(), cfg.report.high_risk_limit);
    assert!(high
        .windows(2)
        .all(|w| w[0].churn_probability >= w[1].churn_probability));
}

#[test]
fn predict_requires_a_trained_model() {
    let store = seeded_store(120, 9);
    let cfg = ChurnConfig::default();
    let mut analyzer = ChurnAnalyzer::new(&store, &cfg).with_reference_date(reference_date());

    let external = vec![row(12, 300, 20, 0.0), row(4, 200, 400, 0.0)];
    assert!(matches!(
        analyzer.predict(&external),
        Err(ChurnError::UntrainedModel)
    ));

    analyzer.analyze().unwrap();
    let probabilities = analyzer.predict(&external).unwrap();
    assert_eq!(probabilities.len(), 2);
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));

    let mut scored = external.clone();
    analyzer.score(&mut scored).unwrap();
    assert_eq!(scored[0].churn_probability, probabilities[0]);
}

#[test]
fn analysis_of_empty_store_fails_softly() {
    let store = common::empty_store();
    let cfg = ChurnConfig::default();
    let mut analyzer = ChurnAnalyzer::new(&store, &cfg).with_reference_date(reference_date());

    let outcome = analyzer.run_full_analysis();
    assert!(!outcome.success);
    assert!(outcome.body.is_none());
    assert!(outcome.error.is_some());
    assert!(analyzer.trained_model().is_none());
}
