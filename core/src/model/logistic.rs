//! L2-regularized logistic regression fit by Newton's method (IRLS).
//!
//! Objective: Σ wᵢ·logloss(yᵢ, pᵢ) + ½·λ·‖β‖², with λ = 1 / C and the
//! intercept left unpenalized. Inputs are expected to be standardized.

use crate::{
    config::LogisticConfig,
    error::{ChurnError, ChurnResult},
    model::metrics::sample_weights,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Ridge added to the intercept's Hessian diagonal so an all-one-class
/// subset still yields a solvable system.
const INTERCEPT_JITTER: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    intercept: f64,
    coefficients: Array1<f64>,
}

impl LogisticRegression {
    pub fn fit(x: &Array2<f64>, y: &[bool], cfg: &LogisticConfig) -> ChurnResult<Self> {
        let (n, p) = x.dim();
        if n == 0 || n != y.len() {
            return Err(ChurnError::training(format!(
                "logistic regression needs matching non-empty inputs, got {n} rows and {} labels",
                y.len()
            )));
        }
        let lambda = 1.0 / cfg.inverse_regularization;
        let weights = sample_weights(y, cfg.class_balanced);
        let dim = p + 1;

        // beta[0] is the intercept.
        let mut beta = vec![0.0; dim];
        let mut converged = false;
        for iteration in 0..cfg.max_iterations {
            let mut gradient = vec![0.0; dim];
            let mut hessian = vec![vec![0.0; dim]; dim];

            for i in 0..n {
                let row = x.row(i);
                let z = beta[0] + (1..dim).map(|j| beta[j] * row[j - 1]).sum::<f64>();
                let prob = sigmoid(z);
                let target = if y[i] { 1.0 } else { 0.0 };
                let w = weights[i];
                let residual = w * (prob - target);
                let curvature = w * prob * (1.0 - prob);

                let feature = |j: usize| if j == 0 { 1.0 } else { row[j - 1] };
                for a in 0..dim {
                    let fa = feature(a);
                    gradient[a] += residual * fa;
                    for b in a..dim {
                        hessian[a][b] += curvature * fa * feature(b);
                    }
                }
            }
            for a in 0..dim {
                for b in 0..a {
                    let mirrored = hessian[b][a];
                    hessian[a][b] = mirrored;
                }
            }
            hessian[0][0] += INTERCEPT_JITTER;
            for j in 1..dim {
                gradient[j] += lambda * beta[j];
                hessian[j][j] += lambda;
            }

            let step = solve(hessian, gradient).ok_or_else(|| {
                ChurnError::training("logistic regression Hessian is singular")
            })?;
            let largest = step.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
            for (b, s) in beta.iter_mut().zip(&step) {
                *b -= s;
            }
            if !largest.is_finite() {
                return Err(ChurnError::training("logistic regression diverged"));
            }
            if largest < cfg.tolerance {
                log::debug!("Logistic regression converged after {} iterations", iteration + 1);
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!(
                "Logistic regression did not converge in {} iterations",
                cfg.max_iterations
            );
        }

        Ok(Self {
            intercept: beta[0],
            coefficients: Array1::from_vec(beta[1..].to_vec()),
        })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        x.dot(&self.coefficients)
            .iter()
            .map(|z| sigmoid(z + self.intercept))
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Gaussian elimination with partial pivoting. `None` if singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let delta = factor * a[col][k];
                a[row][k] -= delta;
            }
            let delta = factor * b[col];
            b[row] -= delta;
        }
    }
    let mut out = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / a[row][row];
    }
    Some(out)
}
