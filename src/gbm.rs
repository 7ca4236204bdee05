//! Gradient-boosted regression trees minimizing absolute error.
//!
//! Each round fits a depth-limited tree to the sign of the current residuals
//! (the negative L1 gradient) using histogram-binned split search, then
//! replaces every leaf value with the median residual of the rows that reached
//! it. Boosting stops early once the validation MAE has not improved for
//! `early_stopping_rounds` rounds and the ensemble is cut back to the best
//! round.

use crate::config::BoostingParams;
use crate::error::{Error, Result};
use crate::stats;
use linfa::traits::PredictInplace;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Bin upper bounds for one column; the last bound is +inf.
#[derive(Debug, Clone)]
struct BinMapper {
    upper: Vec<f64>,
}

impl BinMapper {
    fn fit(column: ArrayView1<f64>, max_bins: usize) -> Self {
        let mut values: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();

        let mut upper = Vec::new();
        if values.len() <= max_bins {
            for w in values.windows(2) {
                upper.push(0.5 * (w[0] + w[1]));
            }
        } else {
            for j in 1..max_bins {
                let pos = j * values.len() / max_bins;
                let cut = 0.5 * (values[pos - 1] + values[pos]);
                if upper.last().map_or(true, |&last| cut > last) {
                    upper.push(cut);
                }
            }
        }
        upper.push(f64::INFINITY);
        BinMapper { upper }
    }

    fn bin(&self, x: f64) -> u8 {
        // first bound >= x; never past the +inf bound
        self.upper.partition_point(|&u| u < x).min(self.upper.len() - 1) as u8
    }

    fn n_bins(&self) -> usize {
        self.upper.len()
    }
}

/// Column-major binned copy of a training matrix.
struct BinnedMatrix {
    columns: Vec<Vec<u8>>,
    mappers: Vec<BinMapper>,
}

impl BinnedMatrix {
    fn new(x: &Array2<f64>, max_bins: usize) -> Self {
        let mappers: Vec<BinMapper> = x.columns().into_iter().map(|c| BinMapper::fit(c, max_bins)).collect();
        let columns = x
            .columns()
            .into_iter()
            .zip(&mappers)
            .map(|(c, m)| c.iter().map(|&v| m.bin(v)).collect())
            .collect();
        BinnedMatrix { columns, mappers }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn add_gains(&self, gains: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                gains[*feature] += gain;
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }
}

struct SplitCandidate {
    feature: usize,
    bin: u8,
    gain: f64,
}

/// Grows one tree over a row sample.
struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    gradient: &'a [f64],
    residual: &'a [f64],
    features: &'a [usize],
    max_depth: usize,
    min_samples_leaf: usize,
    learning_rate: f64,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(&mut self, rows: &mut [usize], depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let split = if depth < self.max_depth {
            self.best_split(rows)
        } else {
            None
        };
        match split {
            Some(s) => {
                let bins = &self.binned.columns[s.feature];
                let mid = partition_rows(rows, |r| bins[r] <= s.bin);
                let (left_rows, right_rows) = rows.split_at_mut(mid);
                let left = self.grow(left_rows, depth + 1);
                let right = self.grow(right_rows, depth + 1);
                self.nodes[idx] = Node::Split {
                    feature: s.feature,
                    threshold: self.binned.mappers[s.feature].upper[s.bin as usize],
                    gain: s.gain,
                    left,
                    right,
                };
            }
            None => {
                let mut res: Vec<f64> = rows.iter().map(|&r| self.residual[r]).collect();
                let value = stats::median(&mut res).unwrap_or(0.0);
                self.nodes[idx] = Node::Leaf {
                    value: self.learning_rate * value,
                };
            }
        }
        idx
    }

    fn best_split(&self, rows: &[usize]) -> Option<SplitCandidate> {
        let n = rows.len();
        if n < 2 * self.min_samples_leaf {
            return None;
        }
        let total: f64 = rows.iter().map(|&r| self.gradient[r]).sum();
        let parent_score = total * total / n as f64;

        let mut best: Option<SplitCandidate> = None;
        for &f in self.features {
            let n_bins = self.binned.mappers[f].n_bins();
            if n_bins < 2 {
                continue;
            }
            let column = &self.binned.columns[f];
            let mut counts = vec![0usize; n_bins];
            let mut sums = vec![0.0f64; n_bins];
            for &r in rows {
                let b = column[r] as usize;
                counts[b] += 1;
                sums[b] += self.gradient[r];
            }

            let (mut left_n, mut left_sum) = (0usize, 0.0f64);
            for b in 0..n_bins - 1 {
                left_n += counts[b];
                left_sum += sums[b];
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf {
                    continue;
                }
                if right_n < self.min_samples_leaf {
                    break;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64
                    - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |c| gain > c.gain) {
                    best = Some(SplitCandidate {
                        feature: f,
                        bin: b as u8,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Moves rows satisfying `goes_left` to the front; returns how many did.
fn partition_rows(rows: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if goes_left(rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

fn sample_indices(n: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    if fraction < 1.0 {
        idx.shuffle(rng);
        idx.truncate(((n as f64 * fraction).ceil() as usize).clamp(1, n));
        idx.sort_unstable();
    }
    idx
}

fn mean_absolute_error(pred: &Array1<f64>, y: &Array1<f64>) -> f64 {
    (pred - y).mapv(f64::abs).mean().unwrap_or(f64::INFINITY)
}

/// Fitted ensemble. Prediction is `base_score + sum(tree outputs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

/// What a boosting run produced besides the ensemble.
#[derive(Debug, Clone)]
pub struct BoostingRun {
    pub model: GradientBoostedTrees,
    /// Rounds kept after early stopping.
    pub best_iteration: usize,
    /// Rounds actually boosted.
    pub rounds_run: usize,
    /// Validation MAE after each round.
    pub validation_curve: Vec<f64>,
}

impl GradientBoostedTrees {
    /// Boosts on `(x_train, y_train)` and early-stops on `(x_valid, y_valid)`.
    pub fn fit(
        params: &BoostingParams,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_valid: &Array2<f64>,
        y_valid: &Array1<f64>,
        seed: u64,
    ) -> Result<BoostingRun> {
        let n = x_train.nrows();
        if n == 0 || x_valid.nrows() == 0 {
            return Err(Error::Training("empty training or validation split".into()));
        }
        if x_train.ncols() != x_valid.ncols() || n != y_train.len() || x_valid.nrows() != y_valid.len() {
            return Err(Error::Training("feature matrix and target shapes disagree".into()));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let binned = BinnedMatrix::new(x_train, params.max_bins);
        let base_score = stats::median(&mut y_train.to_vec()).unwrap_or(0.0);
        let mut model = GradientBoostedTrees {
            base_score,
            n_features: x_train.ncols(),
            trees: Vec::new(),
        };

        let mut f_train = Array1::from_elem(n, base_score);
        let mut f_valid = Array1::from_elem(x_valid.nrows(), base_score);
        let mut best_mae = mean_absolute_error(&f_valid, y_valid);
        let mut best_iteration = 0;
        let mut stale_rounds = 0;
        let mut validation_curve = Vec::new();

        for round in 0..params.n_estimators {
            let residual: Vec<f64> = (y_train - &f_train).to_vec();
            let gradient: Vec<f64> = residual
                .iter()
                .map(|&r| if r > 0.0 { 1.0 } else if r < 0.0 { -1.0 } else { 0.0 })
                .collect();
            let mut rows = sample_indices(n, params.subsample, &mut rng);
            let features = sample_indices(model.n_features, params.colsample, &mut rng);

            let mut builder = TreeBuilder {
                binned: &binned,
                gradient: &gradient,
                residual: &residual,
                features: &features,
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf,
                learning_rate: params.learning_rate,
                nodes: Vec::new(),
            };
            builder.grow(&mut rows, 0);
            let tree = RegressionTree { nodes: builder.nodes };

            for (row, f) in x_train.outer_iter().zip(f_train.iter_mut()) {
                *f += tree.predict_row(row);
            }
            for (row, f) in x_valid.outer_iter().zip(f_valid.iter_mut()) {
                *f += tree.predict_row(row);
            }
            model.trees.push(tree);

            let mae = mean_absolute_error(&f_valid, y_valid);
            validation_curve.push(mae);
            if mae < best_mae - 1e-9 {
                best_mae = mae;
                best_iteration = round + 1;
                stale_rounds = 0;
            } else {
                stale_rounds += 1;
                if stale_rounds >= params.early_stopping_rounds {
                    debug!(round, best_iteration, "early stopping");
                    break;
                }
            }
        }

        let rounds_run = model.trees.len();
        model.trees.truncate(best_iteration);
        info!(
            rounds_run,
            best_iteration,
            validation_mae = best_mae,
            "boosting finished"
        );
        Ok(BoostingRun {
            model,
            best_iteration,
            rounds_run,
            validation_curve,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Total split gain per feature column, normalized to sum to 1 (all zero
    /// when the ensemble has no splits).
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut gains = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.add_gains(&mut gains);
        }
        let total: f64 = gains.iter().sum();
        if total > 0.0 {
            gains.iter_mut().for_each(|g| *g /= total);
        }
        gains
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

impl PredictInplace<Array2<f64>, Array1<f64>> for GradientBoostedTrees {
    fn predict_inplace<'a>(&'a self, x: &'a Array2<f64>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "the number of data points must match the number of output targets"
        );
        assert_eq!(x.ncols(), self.n_features, "feature column count mismatch");
        for (row, out) in x.outer_iter().zip(y.iter_mut()) {
            *out = self.predict_row(row);
        }
    }

    fn default_target(&self, x: &Array2<f64>) -> Array1<f64> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linfa::traits::Predict;
    use ndarray::array;

    fn params() -> BoostingParams {
        BoostingParams {
            n_estimators: 200,
            learning_rate: 0.2,
            max_depth: 3,
            min_samples_leaf: 2,
            subsample: 1.0,
            colsample: 1.0,
            early_stopping_rounds: 20,
            max_bins: 32,
        }
    }

    /// y = 10 for x0 <= 5, 20 above; x1 is noise.
    fn step_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { (i % 11) as f64 } else { ((i * 7) % 5) as f64 });
        let y = x.column(0).mapv(|v| if v <= 5.0 { 10.0 } else { 20.0 });
        (x, y)
    }

    #[test]
    fn bins_respect_thresholds() {
        let col = array![1.0, 2.0, 3.0, 3.0, 10.0];
        let m = BinMapper::fit(col.view(), 8);
        assert_eq!(m.upper, vec![1.5, 2.5, 6.5, f64::INFINITY]);
        assert_eq!(m.bin(1.0), 0);
        assert_eq!(m.bin(2.5), 1);
        assert_eq!(m.bin(3.0), 2);
        assert_eq!(m.bin(1e9), 3);

        let wide = Array1::from_iter((0..1000).map(|v| v as f64));
        let m = BinMapper::fit(wide.view(), 16);
        assert!(m.n_bins() <= 16);
    }

    #[test]
    fn learns_step_function() {
        let (x, y) = step_data(220);
        let (xv, yv) = step_data(55);
        let run = GradientBoostedTrees::fit(&params(), &x, &y, &xv, &yv, 7).unwrap();
        let pred: Array1<f64> = run.model.predict(&xv);
        let mae = mean_absolute_error(&pred, &yv);
        assert!(mae < 0.5, "mae {}", mae);
        let importance = run.model.feature_importance();
        assert!(importance[0] > 0.9, "{:?}", importance);
        assert_eq!(run.model.base_score(), 10.0);
        assert!(run.model.trees[0].n_leaves() >= 2);
    }

    #[test]
    fn early_stopping_keeps_best_round() {
        let (x, y) = step_data(220);
        let (xv, yv) = step_data(55);
        let run = GradientBoostedTrees::fit(&params(), &x, &y, &xv, &yv, 7).unwrap();
        assert!(run.rounds_run < 200);
        assert_eq!(run.model.n_trees(), run.best_iteration);
        let best = run.validation_curve[..run.best_iteration]
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(run.validation_curve[run.best_iteration - 1], best);
    }

    #[test]
    fn same_seed_same_model() {
        let (x, y) = step_data(120);
        let (xv, yv) = step_data(40);
        let mut p = params();
        p.subsample = 0.7;
        p.colsample = 0.5;
        let a = GradientBoostedTrees::fit(&p, &x, &y, &xv, &yv, 11).unwrap();
        let b = GradientBoostedTrees::fit(&p, &x, &y, &xv, &yv, 11).unwrap();
        assert_eq!(a.model, b.model);
    }

    #[test]
    fn empty_validation_fails() {
        let (x, y) = step_data(20);
        let xv = Array2::<f64>::zeros((0, 2));
        let yv = Array1::<f64>::zeros(0);
        let err = GradientBoostedTrees::fit(&params(), &x, &y, &xv, &yv, 1).unwrap_err();
        assert!(matches!(err, Error::Training(_)));
    }
}
