//! Label conventions and per-algorithm outcomes.
//!
//! Clustering algorithms emit dense non-negative cluster ids plus [`NOISE`];
//! the anomaly scorer emits [`NORMAL`] / [`ANOMALY`] flags with a continuous
//! score. The two shapes only meet at the reporting boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{EngineError, Result};

/// Label reserved for DBSCAN noise points.
pub const NOISE: i32 = -1;
/// Label for points flagged by the anomaly scorer.
pub const ANOMALY: i32 = -1;
/// Label for points the anomaly scorer considers normal.
pub const NORMAL: i32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusteringOutcome {
    pub labels: Vec<i32>,
    pub n_clusters: usize,
    pub n_noise: usize,
}

impl ClusteringOutcome {
    pub fn from_labels(labels: Vec<i32>) -> Self {
        let clusters: BTreeSet<i32> = labels.iter().copied().filter(|&l| l >= 0).collect();
        let n_noise = labels.iter().filter(|&&l| l == NOISE).count();
        Self {
            n_clusters: clusters.len(),
            n_noise,
            labels,
        }
    }

    pub fn noise_pct(&self) -> f64 {
        percentage(self.n_noise, self.labels.len())
    }

    /// Point count per cluster id, indexed by label.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            if let Ok(idx) = usize::try_from(label) {
                if idx < sizes.len() {
                    sizes[idx] += 1;
                }
            }
        }
        sizes
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnomalyOutcome {
    pub labels: Vec<i32>,
    /// Normalized isolation score per point; higher is more anomalous.
    pub scores: Vec<f64>,
    /// Lowest score among the flagged points.
    pub threshold: f64,
    pub n_anomalies: usize,
}

impl AnomalyOutcome {
    pub fn anomaly_pct(&self) -> f64 {
        percentage(self.n_anomalies, self.labels.len())
    }

    pub fn is_anomaly(&self, idx: usize) -> bool {
        self.labels.get(idx) == Some(&ANOMALY)
    }

    pub fn anomaly_indices(&self) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == ANOMALY)
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Clustering(ClusteringOutcome),
    Anomaly(AnomalyOutcome),
}

impl Outcome {
    pub fn labels(&self) -> &[i32] {
        match self {
            Self::Clustering(c) => &c.labels,
            Self::Anomaly(a) => &a.labels,
        }
    }
}

/// Entity id to label mapping handed to reporting collaborators.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClusterAssignment(BTreeMap<String, i32>);

impl ClusterAssignment {
    pub fn from_parts(entity_ids: &[String], labels: &[i32]) -> Result<Self> {
        if entity_ids.len() != labels.len() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} labels", entity_ids.len()),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Self(
            entity_ids.iter().cloned().zip(labels.iter().copied()).collect(),
        ))
    }

    pub fn get(&self, entity_id: &str) -> Option<i32> {
        self.0.get(entity_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub(crate) fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
