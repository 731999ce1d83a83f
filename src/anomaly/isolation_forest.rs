use std::cmp::Ordering;

use ndarray::{ArrayView1, Axis};
use ndarray_rand::{RandomExt, SamplingStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assignment::{ANOMALY, AnomalyOutcome, NORMAL};
use crate::error::{EngineError, Result};
use crate::Matrix;

const ALGORITHM: &str = "Isolation Forest";
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    /// Subsample drawn for each tree, capped at the row count.
    pub max_samples: usize,
    /// Expected share of anomalies in (0, 0.5].
    pub contamination: f64,
    pub random_state: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            random_state: 42,
        }
    }
}

impl IsolationForestConfig {
    pub fn new(contamination: f64) -> Self {
        Self {
            contamination,
            ..Self::default()
        }
    }

    pub fn n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn validate(&self, n_rows: usize) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(EngineError::invalid(
                "contamination",
                self.contamination,
                "must be in (0, 0.5]",
            ));
        }
        if self.n_estimators == 0 {
            return Err(EngineError::invalid("n_estimators", self.n_estimators, "must be >= 1"));
        }
        if self.max_samples < 2 {
            return Err(EngineError::invalid("max_samples", self.max_samples, "must be >= 2"));
        }
        if n_rows < 2 {
            return Err(EngineError::InsufficientData { rows: n_rows, min_rows: 2 });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn path_length(&self, row: ArrayView1<f64>, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct IsolationForest {
    pub outcome: Option<AnomalyOutcome>,
    trees: Vec<Node>,
    sample_size: usize,
    n_features: usize,
    config: IsolationForestConfig,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Self {
        Self {
            outcome: None,
            trees: Vec::new(),
            sample_size: 0,
            n_features: 0,
            config,
        }
    }

    pub fn config(&self) -> &IsolationForestConfig {
        &self.config
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.ncols() == 0 {
            return Err(EngineError::InsufficientData {
                rows: x.nrows(),
                min_rows: 1,
            });
        }
        self.config.validate(x.nrows())?;

        let n = x.nrows();
        let sample_size = self.config.max_samples.min(n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.random_state);

        self.trees = (0..self.config.n_estimators)
            .map(|_| {
                let sample = x.sample_axis_using(
                    Axis(0),
                    sample_size,
                    SamplingStrategy::WithoutReplacement,
                    &mut rng,
                );
                let rows: Vec<usize> = (0..sample.nrows()).collect();
                build_tree(&sample, rows, 0, max_depth, &mut rng)
            })
            .collect();
        self.sample_size = sample_size;
        self.n_features = x.ncols();

        let scores = self.score_samples(x)?;
        let outcome = self.label(scores)?;
        debug!(
            n_anomalies = outcome.n_anomalies,
            threshold = outcome.threshold,
            "isolation forest fitted"
        );
        self.outcome = Some(outcome);

        Ok(())
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<AnomalyOutcome> {
        self.fit(x)?;
        self.outcome
            .clone()
            .ok_or_else(|| EngineError::degenerate(ALGORITHM, "fit produced no outcome"))
    }

    /// Normalized anomaly score `2^(-E[h(x)] / c(psi))`; values near 1 are
    /// isolated quickly, values well below 0.5 sit in dense regions.
    pub fn score_samples(&self, x: &Matrix) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(EngineError::Config(
                "IsolationForest not fitted. Call fit() first.".to_string(),
            ));
        }
        if x.ncols() != self.n_features {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let normalizer = average_path_length(self.sample_size).max(f64::MIN_POSITIVE);
        Ok(x.outer_iter()
            .map(|row| {
                let mean_path = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(row, 0))
                    .sum::<f64>()
                    / self.trees.len() as f64;
                2f64.powf(-mean_path / normalizer)
            })
            .collect())
    }

    /// Flags exactly `round(contamination * n)` top-scoring points, which can
    /// include ordinary points beyond a single obvious outlier.
    fn label(&self, scores: Vec<f64>) -> Result<AnomalyOutcome> {
        let n = scores.len();
        let (lo, hi) = scores
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        if hi - lo <= 1e-12 {
            return Err(EngineError::degenerate(
                ALGORITHM,
                "every point is equally easy to isolate",
            ));
        }

        let n_anomalies = ((self.config.contamination * n as f64).round() as usize).clamp(1, n);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

        let mut labels = vec![NORMAL; n];
        for &i in &order[..n_anomalies] {
            labels[i] = ANOMALY;
        }

        Ok(AnomalyOutcome {
            labels,
            threshold: scores[order[n_anomalies - 1]],
            scores,
            n_anomalies,
        })
    }
}

fn build_tree(
    sample: &Matrix,
    rows: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let splittable: Vec<(usize, f64, f64)> = (0..sample.ncols())
        .filter_map(|j| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(sample[[i, j]]), hi.max(sample[[i, j]]))
            });
            (hi > lo).then_some((j, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&i| sample[[i, feature]] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(sample, left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(sample, right, depth + 1, max_depth, rng)),
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
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
