//! Isolation forest over a single standardised feature
//!
//! Anomalies are few and different, so random axis splits isolate them in
//! fewer steps than normal points. The anomaly score of `x` is
//! `2^(-E[h(x)] / c(psi))` where `h` is the path length in one tree and
//! `c(psi)` the average unsuccessful-search depth of a BST of `psi` nodes.
//!
//! Trees are grown in parallel with rayon; tree `i` draws from
//! `StdRng::seed_from_u64(seed + i)`, so a fit is reproducible.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Euler–Mascheroni constant.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Estimator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected outlier fraction of the training set, in (0, 0.5].
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
        min: f64,
        max: f64,
    },
    Split {
        split: f64,
        min: f64,
        max: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(samples: &mut [f64], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));

        if depth >= height_limit || samples.len() <= 1 || max - min <= f64::EPSILON {
            return Node::Leaf {
                size: samples.len(),
                min,
                max,
            };
        }

        // min <= split < max with `<=` going left keeps both children non-empty
        let split = rng.gen_range(min..max);
        let mid = partition(samples, split);
        let (lower, upper) = samples.split_at_mut(mid);

        Node::Split {
            split,
            min,
            max,
            left: Box::new(Node::build(lower, depth + 1, height_limit, rng)),
            right: Box::new(Node::build(upper, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(&self, x: f64, depth: usize) -> f64 {
        match self {
            Node::Leaf { size, min, max } => {
                if x < *min || x > *max {
                    depth as f64
                } else {
                    depth as f64 + average_path_length(*size)
                }
            }
            Node::Split {
                split,
                min,
                max,
                left,
                right,
            } => {
                // Outside the range this node ever saw: isolated right here
                if x < *min || x > *max {
                    depth as f64
                } else if x <= *split {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

/// Move values `<= split` to the front; returns their count.
fn partition(samples: &mut [f64], split: f64) -> usize {
    let mut mid = 0;
    for i in 0..samples.len() {
        if samples[i] <= split {
            samples.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

/// `c(n)`: average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted forest plus the decision threshold learned from its training set.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Fit on (already scaled) values. Returns `None` for an empty input.
    pub fn fit(values: &[f64], params: &ForestParams) -> Option<Self> {
        if values.is_empty() || params.n_trees == 0 {
            return None;
        }

        let psi = params.max_samples.clamp(1, values.len());
        let height_limit = (psi as f64).log2().ceil() as usize;

        let trees: Vec<Node> = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let mut sample: Vec<f64> = index::sample(&mut rng, values.len(), psi)
                    .into_iter()
                    .map(|idx| values[idx])
                    .collect();
                Node::build(&mut sample, 0, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size: psi,
            threshold: 1.0,
        };

        let mut training_scores: Vec<f64> = values.iter().map(|v| forest.score(*v)).collect();
        training_scores.sort_by(f64::total_cmp);
        forest.threshold = quantile(&training_scores, 1.0 - params.contamination);
        Some(forest)
    }

    /// Anomaly score in `(0, 1]`; higher is more anomalous.
    pub fn score(&self, x: f64) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(x, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / c)
    }

    /// Whether `x` falls in the outlier partition.
    pub fn is_outlier(&self, x: f64) -> bool {
        self.score(x) > self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Linearly interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) per Liu et al., about 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.05);
    }

    #[test]
    fn test_far_value_scores_higher_than_centre() {
        let values = clustered(200, 7);
        let forest = IsolationForest::fit(&values, &ForestParams::default()).unwrap();
        assert_eq!(forest.n_trees(), 100);
        assert!(forest.score(8.0) > forest.score(0.0));
        assert!(forest.is_outlier(8.0));
        assert!(!forest.is_outlier(0.0));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let values = clustered(64, 3);
        let a = IsolationForest::fit(&values, &ForestParams::default()).unwrap();
        let b = IsolationForest::fit(&values, &ForestParams::default()).unwrap();
        assert_eq!(a.threshold(), b.threshold());
        assert_eq!(a.score(0.37), b.score(0.37));
    }

    #[test]
    fn test_contamination_fraction_of_training_set() {
        let values = clustered(500, 11);
        let forest = IsolationForest::fit(&values, &ForestParams::default()).unwrap();
        let flagged = values.iter().filter(|v| forest.is_outlier(**v)).count();
        // Strict '>' against the 90th percentile: at most 10% flagged
        assert!(flagged > 0 && flagged <= 50, "flagged {flagged}");
    }

    #[test]
    fn test_constant_training_set() {
        let forest = IsolationForest::fit(&[5.0; 20], &ForestParams::default()).unwrap();
        assert!(!forest.is_outlier(5.0));
        assert!(forest.is_outlier(5.5));
    }

    #[test]
    fn test_quantile_interpolates() {
        assert!((quantile(&[0.0, 1.0, 2.0, 3.0, 4.0], 0.9) - 3.6).abs() < 1e-12);
    }
}
