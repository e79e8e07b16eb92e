use std::collections::{BTreeMap, BTreeSet};

use crate::features::{build_matrix, parse_numeric_or_range, FeatureMatrix, BIAS_COLUMN};
use crate::table::Table;

/// Hand-tuned fallback weights used when no trained model is available.
pub const HEURISTIC_WEIGHTS: &[(&str, f64)] = &[
    (BIAS_COLUMN, 0.00),
    ("postings_90d", 0.22),
    ("postings_365d", 0.10),
    ("recency_1_over", 0.25),
    ("competitor_postings_30d", 0.18),
    ("census_index", 0.10),
    ("seasonality_index", 0.10),
    ("turnover_index", 0.08),
    ("credentialing_days", -0.04),
    ("beds", 0.03),
];

const MAX_NEWTON_ITERATIONS: usize = 25;
const RIDGE: f64 = 1e-6;

/// Stage one of the heuristic: the raw weighted linear combination,
/// before any normalization policy is applied.
pub fn raw_linear_score(matrix: &FeatureMatrix) -> Vec<f64> {
    let mut linear = vec![0.0; matrix.rows()];
    for (name, weight) in HEURISTIC_WEIGHTS {
        if let Some(column) = matrix.column(name) {
            for (acc, value) in linear.iter_mut().zip(column) {
                *acc += weight * value;
            }
        }
    }
    linear
}

/// Stage two: min-max normalization across the batch, clamped to [0, 1].
/// Scores are relative to the batch that produced them; re-running on a
/// different batch shifts every score even for unchanged facilities.
pub fn minmax_normalize(raw: &[f64]) -> Vec<f64> {
    let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    raw.iter()
        .map(|v| ((v - min) / (max - min + 1e-9)).clamp(0.0, 1.0))
        .collect()
}

/// Heuristic 0..1 score for every row of a facility table.
pub fn heuristic_score(table: &Table) -> Vec<f64> {
    let matrix = build_matrix(table);
    minmax_normalize(&raw_linear_score(&matrix))
}

/// Fits a logistic regression of `label_col` on the feature matrix.
/// Returns per-row probabilities and the coefficient map, or `None` when
/// the label has fewer than two distinct values or the fit degenerates;
/// the caller is expected to fall back to the heuristic.
pub fn fit_logit(table: &Table, label_col: &str) -> Option<(Vec<f64>, BTreeMap<String, f64>)> {
    let labels: Vec<f64> = (0..table.len())
        .map(|i| {
            table
                .get(i, label_col)
                .and_then(parse_numeric_or_range)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0)
        })
        .collect();

    let distinct: BTreeSet<u64> = labels.iter().map(|v| v.to_bits()).collect();
    if distinct.len() < 2 {
        return None;
    }

    let matrix = build_matrix(table);
    let beta = newton_fit(&matrix, &labels)?;

    let probabilities = predict(&matrix, &beta);
    let coefficients = matrix
        .names()
        .iter()
        .cloned()
        .zip(beta.iter().copied())
        .collect();
    Some((probabilities, coefficients))
}

/// Scores a fresh table with a persisted coefficient map. Coefficients
/// whose column is absent from the matrix are ignored.
pub fn apply_coefs(table: &Table, coefficients: &BTreeMap<String, f64>) -> Vec<f64> {
    let matrix = build_matrix(table);
    let mut z = vec![0.0; matrix.rows()];
    for (name, weight) in coefficients {
        if let Some(column) = matrix.column(name) {
            for (acc, value) in z.iter_mut().zip(column) {
                *acc += weight * value;
            }
        }
    }
    z.iter().map(|v| sigmoid(*v)).collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn predict(matrix: &FeatureMatrix, beta: &[f64]) -> Vec<f64> {
    let mut z = vec![0.0; matrix.rows()];
    for (j, (_, column)) in matrix.columns().enumerate() {
        for (acc, value) in z.iter_mut().zip(column) {
            *acc += beta[j] * value;
        }
    }
    z.iter().map(|v| sigmoid(*v)).collect()
}

/// Newton-Raphson iterations on the log-likelihood. A small ridge term
/// keeps the Hessian invertible on collinear features.
fn newton_fit(matrix: &FeatureMatrix, labels: &[f64]) -> Option<Vec<f64>> {
    let k = matrix.names().len();
    let n = matrix.rows();
    if n == 0 || k == 0 {
        return None;
    }

    let columns: Vec<&[f64]> = matrix.columns().map(|(_, c)| c).collect();
    let mut beta = vec![0.0; k];

    for _ in 0..MAX_NEWTON_ITERATIONS {
        let p = predict(matrix, &beta);
        let weights: Vec<f64> = p.iter().map(|p| p * (1.0 - p)).collect();

        let mut gradient = vec![0.0; k];
        for j in 0..k {
            for i in 0..n {
                gradient[j] += columns[j][i] * (labels[i] - p[i]);
            }
        }

        let mut hessian = vec![vec![0.0; k]; k];
        for j in 0..k {
            for l in j..k {
                let mut sum = 0.0;
                for i in 0..n {
                    sum += columns[j][i] * columns[l][i] * weights[i];
                }
                hessian[j][l] = sum;
                hessian[l][j] = sum;
            }
            hessian[j][j] += RIDGE;
        }

        let step = solve_linear(hessian, gradient)?;
        let mut largest = 0.0f64;
        for (b, d) in beta.iter_mut().zip(&step) {
            *b += d;
            largest = largest.max(d.abs());
        }
        if !largest.is_finite() {
            return None;
        }
        if largest < 1e-8 {
            break;
        }
    }

    Some(beta)
}

/// Gaussian elimination with partial pivoting; `None` on a singular
/// system.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| {
            a[x][col]
                .abs()
                .partial_cmp(&a[y][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for c in (row + 1)..n {
            sum -= a[row][c] * x[c];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}
