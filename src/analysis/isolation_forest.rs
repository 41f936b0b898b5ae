// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! One-dimensional Isolation Forest
//!
//! Trees are built once by [`IsolationForest::fit`] and never change
//! afterwards, so scoring is a pure function of the value.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{ScoringModel, Verdict};
use crate::error::{Error, Result};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Samples per tree; `None` means `min(256, n)`
    pub max_samples: Option<usize>,
    /// Expected share of anomalies in the training data
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_samples: None,
            contamination: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        split_value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build<R: Rng>(data: &[f64], sample_size: usize, rng: &mut R) -> Self {
        let sample: Vec<f64> = data.choose_multiple(rng, sample_size).cloned().collect();
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        Self {
            root: Self::build_node(&sample, 0, max_depth, rng),
        }
    }

    fn build_node<R: Rng>(data: &[f64], depth: usize, max_depth: usize, rng: &mut R) -> Node {
        if data.len() <= 1 || depth >= max_depth {
            return Node::Leaf { size: data.len() };
        }

        let min = data.iter().cloned().fold(f64::MAX, f64::min);
        let max = data.iter().cloned().fold(f64::MIN, f64::max);

        if (max - min).abs() < 1e-10 {
            return Node::Leaf { size: data.len() };
        }

        let split_value = rng.gen_range(min..max);

        let (left_data, right_data): (Vec<f64>, Vec<f64>) =
            data.iter().partition(|&&x| x < split_value);

        Node::Split {
            split_value,
            left: Box::new(Self::build_node(&left_data, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(&right_data, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, value: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;

        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    split_value,
                    left,
                    right,
                } => {
                    node = if value < *split_value { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Trained Isolation Forest over scalar readings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Fit a forest to training values.
    ///
    /// Each tree draws from its own RNG seeded from `params.seed`, so the
    /// result does not depend on how rayon schedules the trees.
    pub fn fit(data: &[f64], params: &ForestParams) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Model("cannot fit on empty training data".into()));
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(Error::Model("training data contains non-finite values".into()));
        }
        if params.n_trees == 0 {
            return Err(Error::Model("forest needs at least one tree".into()));
        }
        if !(params.contamination > 0.0 && params.contamination < 0.5) {
            return Err(Error::Model(format!(
                "contamination must be within (0, 0.5), got {}",
                params.contamination
            )));
        }

        let sample_size = params.max_samples.unwrap_or(256).clamp(1, data.len());

        let trees: Vec<IsolationTree> = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
                IsolationTree::build(data, sample_size, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            threshold: f64::INFINITY,
        };

        let mut scores: Vec<f64> = data.iter().map(|&x| forest.anomaly_score(x)).collect();
        scores.sort_by(|a, b| a.total_cmp(b));
        forest.threshold = quantile(&scores, 1.0 - params.contamination);

        Ok(forest)
    }

    /// Anomaly score in (0, 1]; higher is more isolated
    pub fn anomaly_score(&self, value: f64) -> f64 {
        let avg_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(value))
            .sum::<f64>()
            / self.trees.len() as f64;

        let normalizer = average_path_length(self.sample_size);
        if normalizer <= 0.0 {
            return 0.5;
        }
        2.0_f64.powf(-avg_depth / normalizer)
    }

    /// Scores above this are anomalous
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl ScoringModel for IsolationForest {
    fn score(&self, value: f64) -> Verdict {
        if !value.is_finite() || self.anomaly_score(value) > self.threshold {
            Verdict::Anomalous
        } else {
            Verdict::Normal
        }
    }

    fn kind(&self) -> &'static str {
        "isolation_forest"
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(min: f64, max: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(min..max)).collect()
    }

    #[test]
    fn test_fit_is_deterministic() {
        let data = uniform(-45.0, 45.0, 500, 1);
        let a = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        let b = IsolationForest::fit(&data, &ForestParams::default()).unwrap();

        assert_eq!(a.tree_count(), 50);
        assert_eq!(a.threshold(), b.threshold());
        for x in [-60.0, -10.0, 0.0, 12.5, 44.9, 90.0] {
            assert_eq!(a.anomaly_score(x), b.anomaly_score(x));
        }
    }

    #[test]
    fn test_score_is_pure() {
        let data = uniform(30.0, 90.0, 500, 2);
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        for x in [10.0, 60.0, 89.0, 200.0] {
            let first = forest.score(x);
            for _ in 0..10 {
                assert_eq!(forest.score(x), first);
            }
        }
    }

    #[test]
    fn test_outliers_score_higher_than_center() {
        let data = uniform(10.0, 50.0, 500, 3);
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        assert!(forest.anomaly_score(500.0) > forest.anomaly_score(30.0));
        assert!(forest.anomaly_score(-500.0) > forest.anomaly_score(30.0));
        assert_eq!(forest.score(30.0), Verdict::Normal);
        assert_eq!(forest.score(f64::NAN), Verdict::Anomalous);
    }

    #[test]
    fn test_contamination_bounds_flagged_share() {
        let data = uniform(-45.0, 45.0, 500, 4);
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        let flagged = data.iter().filter(|&&x| forest.score(x) == Verdict::Anomalous).count();
        assert!(flagged >= 1 && flagged <= 25, "flagged {}", flagged);
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(IsolationForest::fit(&[], &ForestParams::default()).is_err());
        assert!(IsolationForest::fit(&[1.0, f64::NAN], &ForestParams::default()).is_err());

        let params = ForestParams {
            contamination: 0.0,
            ..ForestParams::default()
        };
        assert!(IsolationForest::fit(&[1.0, 2.0], &params).is_err());
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), 0.0);
        assert_eq!(quantile(&sorted, 1.0), 4.0);
        assert!((quantile(&sorted, 0.9) - 3.6).abs() < 1e-12);
    }
}
