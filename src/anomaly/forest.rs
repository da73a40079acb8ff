//! Isolation forest: unsupervised outlier detection by random partitioning.
//!
//! Points that are easy to isolate (short average path from root to leaf
//! across many random trees) score low and are labelled outliers. Scores
//! follow the usual convention `s(x) = -2^(-E[h(x)] / c(psi))`, so lower is
//! more abnormal, and the decision threshold is the contamination quantile of
//! the training scores.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::AnomalyLabel;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow<const D: usize>(
        data: &[[f64; D]],
        sample: Vec<usize>,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, sample, 0, max_depth, rng);
        tree
    }

    fn build<const D: usize>(
        &mut self,
        data: &[[f64; D]],
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if rows.len() <= 1 || depth >= max_depth {
            return id;
        }

        // Only features that still vary within this node can split it.
        let candidates: Vec<(usize, f64, f64)> = (0..D)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][f]), hi.max(data[r][f]))
                });
                (lo < hi).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] < threshold);

        let left = self.build(data, left_rows, depth + 1, max_depth, rng);
        let right = self.build(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length<const D: usize>(&self, point: &[f64; D]) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if point[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
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

/// Linear-interpolated percentile (`q` in 0..=100) of unsorted values.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Labels produced by one fit-and-predict pass, with the raw scores kept for logging.
#[derive(Debug, Clone)]
pub struct ForestOutcome {
    pub labels: Vec<AnomalyLabel>,
    pub scores: Vec<f64>,
    pub threshold: f64,
}

/// Fit a fresh forest on `data` and label every row. Nothing is retained.
pub fn fit_predict<const D: usize>(data: &[[f64; D]], params: &ForestParams) -> ForestOutcome {
    let n = data.len();
    if n == 0 {
        return ForestOutcome {
            labels: Vec::new(),
            scores: Vec::new(),
            threshold: 0.0,
        };
    }

    let sample_size = params.max_samples.min(n);
    let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;
    let mut rng = StdRng::seed_from_u64(params.seed);

    let trees: Vec<IsolationTree> = (0..params.n_estimators)
        .map(|_| {
            let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
            IsolationTree::grow(data, sample, max_depth, &mut rng)
        })
        .collect();

    let norm = average_path_length(sample_size);
    let scores: Vec<f64> = data
        .iter()
        .map(|point| {
            let mean_depth =
                trees.iter().map(|t| t.path_length(point)).sum::<f64>() / trees.len() as f64;
            if norm > 0.0 {
                -(2f64.powf(-mean_depth / norm))
            } else {
                -1.0
            }
        })
        .collect();

    let threshold = percentile(&scores, 100.0 * params.contamination);
    let labels = scores
        .iter()
        .map(|&s| {
            if s < threshold {
                AnomalyLabel::Outlier
            } else {
                AnomalyLabel::Normal
            }
        })
        .collect();

    ForestOutcome {
        labels,
        scores,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<[f64; 2]> {
        let mut data: Vec<[f64; 2]> = (0..200)
            .map(|i| {
                let jitter = ((i * 37) % 11) as f64 / 10.0 - 0.5;
                [jitter, (i as f64 / 100.0) - 1.0]
            })
            .collect();
        data[120] = [8.0, 0.2];
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244_770_920_119_917).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&values, 1.0) - 1.03).abs() < 1e-12);
    }

    #[test]
    fn test_isolates_obvious_outlier() {
        let data = cluster_with_outlier();
        let outcome = fit_predict(&data, &ForestParams::default());
        assert_eq!(outcome.labels[120], AnomalyLabel::Outlier);

        let lowest = outcome
            .scores
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(lowest, Some(120));
    }

    #[test]
    fn test_contamination_bounds_outlier_count() {
        let data = cluster_with_outlier();
        let outcome = fit_predict(&data, &ForestParams::default());
        let flagged = outcome
            .labels
            .iter()
            .filter(|l| **l == AnomalyLabel::Outlier)
            .count();
        // 1% of 200 rows lands between the 2nd and 3rd lowest score.
        assert!((1..=2).contains(&flagged), "flagged {}", flagged);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let data = cluster_with_outlier();
        let a = fit_predict(&data, &ForestParams::default());
        let b = fit_predict(&data, &ForestParams::default());
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_small_sample_grows_shallow_trees() {
        let data = [[0.0, 0.0], [1.0, 1.0], [-1.0, 0.5]];
        let outcome = fit_predict(&data, &ForestParams::default());
        assert_eq!(outcome.labels.len(), 3);
        assert!(outcome.scores.iter().all(|s| (-1.0..0.0).contains(s)));
    }
}
