//! Evaluation metric and stratified sampling.

use crate::rng::StageRng;

/// Area under the ROC curve via the Mann-Whitney U statistic, with tied
/// scores sharing their average rank. `None` when either class is absent.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    debug_assert_eq!(labels.len(), scores.len());
    let n_pos = labels.iter().filter(|&&y| y).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; the tie group i..=j shares their mean.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

/// Indices of each class, in input order. Returns (negatives, positives).
fn class_indices(labels: &[bool]) -> (Vec<usize>, Vec<usize>) {
    let mut neg = Vec::new();
    let mut pos = Vec::new();
    for (i, &y) in labels.iter().enumerate() {
        if y {
            pos.push(i);
        } else {
            neg.push(i);
        }
    }
    (neg, pos)
}

/// Stratified train/test split. Each class contributes roughly
/// `test_fraction` of its members to the test side, and any class with at
/// least two members keeps at least one on each side.
///
/// Returns (train, test), each sorted ascending.
pub fn stratified_split(
    labels: &[bool],
    test_fraction: f64,
    rng: &mut StageRng,
) -> (Vec<usize>, Vec<usize>) {
    let (neg, pos) = class_indices(labels);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for mut members in [neg, pos] {
        rng.shuffle(&mut members);
        let n = members.len();
        let mut n_test = (n as f64 * test_fraction).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        } else {
            n_test = 0;
        }
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Stratified k-fold assignment: each class is shuffled and dealt round-robin
/// across the folds. Returns the held-out indices of each fold, sorted.
pub fn stratified_folds(labels: &[bool], k: usize, rng: &mut StageRng) -> Vec<Vec<usize>> {
    let k = k.max(1);
    let (neg, pos) = class_indices(labels);
    let mut folds = vec![Vec::new(); k];
    for mut members in [neg, pos] {
        rng.shuffle(&mut members);
        for (i, idx) in members.into_iter().enumerate() {
            folds[i % k].push(idx);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

/// Per-class sample weights inversely proportional to class frequency:
/// `n / (2 * n_class)`. Returns (negative_weight, positive_weight).
pub fn class_balanced_weights(labels: &[bool]) -> (f64, f64) {
    let n = labels.len() as f64;
    let n_pos = labels.iter().filter(|&&y| y).count() as f64;
    let n_neg = n - n_pos;
    let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
    (weight(n_neg), weight(n_pos))
}

/// Sample weight for each label, balanced or uniform.
pub fn sample_weights(labels: &[bool], balanced: bool) -> Vec<f64> {
    if !balanced {
        return vec![1.0; labels.len()];
    }
    let (w_neg, w_pos) = class_balanced_weights(labels);
    labels
        .iter()
        .map(|&y| if y { w_pos } else { w_neg })
        .collect()
}
