//! Bagged CART ensemble (random forest) for binary classification.
//!
//! Each tree is grown on a bootstrap sample with Gini impurity, a random
//! subset of √p features per split, and sample weights equal to the class
//! weight times the bootstrap multiplicity. A leaf predicts the weighted
//! fraction of positives that reached it; the forest averages the trees.

use crate::{
    config::ForestConfig,
    error::{ChurnError, ChurnResult},
    model::metrics::sample_weights,
    rng::StageRng,
};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(
        x: &Array2<f64>,
        y: &[bool],
        cfg: &ForestConfig,
        rng: &mut StageRng,
    ) -> ChurnResult<Self> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(ChurnError::training(format!(
                "forest needs matching non-empty inputs, got {n} rows and {} labels",
                y.len()
            )));
        }
        let class_weights = sample_weights(y, cfg.class_balanced);
        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);

        let mut trees = Vec::with_capacity(cfg.n_trees);
        for _ in 0..cfg.n_trees {
            let mut counts = vec![0usize; n];
            for _ in 0..n {
                counts[rng.next_below(n)] += 1;
            }
            let weights: Vec<f64> = counts
                .iter()
                .zip(&class_weights)
                .map(|(&c, &w)| c as f64 * w)
                .collect();
            let rows: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

            let mut grower = TreeGrower {
                x,
                y,
                weights: &weights,
                cfg,
                max_features,
                nodes: Vec::new(),
            };
            grower.grow(rows, 0, rng);
            trees.push(DecisionTree {
                nodes: grower.nodes,
            });
        }
        log::debug!("Grew {} trees on {n} rows", trees.len());
        Ok(Self { trees })
    }

    /// Mean positive-class probability across trees, one per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        let n_trees = self.trees.len().max(1) as f64;
        x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect()
    }
}

struct TreeGrower<'a> {
    x: &'a Array2<f64>,
    y: &'a [bool],
    weights: &'a [f64],
    cfg: &'a ForestConfig,
    max_features: usize,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    cost: f64,
}

impl TreeGrower<'_> {
    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize, rng: &mut StageRng) -> usize {
        let (w_pos, w_total) = self.weighted_counts(&rows);
        let probability = if w_total > 0.0 { w_pos / w_total } else { 0.0 };
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { probability });

        let pure = w_pos <= 0.0 || w_pos >= w_total;
        if depth >= self.cfg.max_depth || rows.len() < self.cfg.min_samples_split || pure {
            return id;
        }
        let Some(split) = self.best_split(&rows, rng) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        let left = self.grow(left_rows, depth + 1, rng);
        let right = self.grow(right_rows, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn weighted_counts(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(pos, total), &i| {
            let w = self.weights[i];
            (if self.y[i] { pos + w } else { pos }, total + w)
        })
    }

    fn best_split(&self, rows: &[usize], rng: &mut StageRng) -> Option<SplitCandidate> {
        let min_leaf = self.cfg.min_samples_leaf.max(1);
        let (pos_total, w_total) = self.weighted_counts(rows);
        let features = rng.sample_indices(self.x.ncols(), self.max_features);

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = rows.to_vec();
        for feature in features {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let (mut w_left, mut pos_left) = (0.0, 0.0);
            for k in 0..sorted.len().saturating_sub(1) {
                let i = sorted[k];
                w_left += self.weights[i];
                if self.y[i] {
                    pos_left += self.weights[i];
                }
                let n_left = k + 1;
                if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                    continue;
                }
                let here = self.x[[i, feature]];
                let next = self.x[[sorted[k + 1], feature]];
                if here == next {
                    continue;
                }

                let w_right = w_total - w_left;
                let cost = w_left * gini(pos_left, w_left)
                    + w_right * gini(pos_total - pos_left, w_right);
                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        cost,
                    });
                }
            }
        }
        best
    }
}

fn gini(positive: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positive / total;
    2.0 * p * (1.0 - p)
}
