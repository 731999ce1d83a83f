//! Cluster quality metrics.
//!
//! All metrics are pure functions of `(points, labels)`. Points labeled
//! [`NOISE`](crate::NOISE) are left out. When a metric is mathematically
//! undefined for the given partition the result is
//! [`MetricValue::NotApplicable`], never a placeholder number.

use std::collections::BTreeMap;

use ndarray::Axis;
use serde::{Serialize, Serializer};

use crate::assignment::{AnomalyOutcome, ClusteringOutcome};
use crate::distance::{euclidean, squared_euclidean};
use crate::error::{EngineError, Result};
use crate::{Matrix, Vector};

pub mod names {
    pub const SILHOUETTE: &str = "silhouette";
    pub const DAVIES_BOULDIN: &str = "davies_bouldin";
    pub const CALINSKI_HARABASZ: &str = "calinski_harabasz";
    pub const INERTIA: &str = "inertia";
    pub const N_CLUSTERS: &str = "n_clusters";
    pub const N_NOISE: &str = "n_noise";
    pub const NOISE_PCT: &str = "noise_pct";
    pub const N_ANOMALIES: &str = "n_anomalies";
    pub const ANOMALY_PCT: &str = "anomaly_pct";
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Value(f64),
    NotApplicable,
}

impl MetricValue {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::NotApplicable => None,
        }
    }

    pub fn is_applicable(self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Value(v)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::NotApplicable, Self::Value)
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::NotApplicable => serializer.serialize_str("n/a"),
        }
    }
}

/// Metric name to value, iterated in name order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QualityReport(BTreeMap<String, MetricValue>);

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<MetricValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.0.get(name).copied()
    }

    /// Numeric value of a metric, `None` when missing or not applicable.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Silhouette, Davies–Bouldin and Calinski–Harabasz over non-noise points.
pub fn clustering_report(x: &Matrix, labels: &[i32]) -> Result<QualityReport> {
    let mut report = QualityReport::new();
    report.insert(names::SILHOUETTE, silhouette_score(x, labels)?);
    report.insert(names::DAVIES_BOULDIN, davies_bouldin_score(x, labels)?);
    report.insert(names::CALINSKI_HARABASZ, calinski_harabasz_score(x, labels)?);
    Ok(report)
}

/// Cluster and noise counts followed by the noise-excluded quality metrics.
pub fn density_report(x: &Matrix, outcome: &ClusteringOutcome) -> Result<QualityReport> {
    let mut report = clustering_report(x, &outcome.labels)?;
    report.insert(names::N_CLUSTERS, outcome.n_clusters as f64);
    report.insert(names::N_NOISE, outcome.n_noise as f64);
    report.insert(names::NOISE_PCT, outcome.noise_pct());
    Ok(report)
}

pub fn anomaly_report(outcome: &AnomalyOutcome) -> QualityReport {
    let mut report = QualityReport::new();
    report.insert(names::N_ANOMALIES, outcome.n_anomalies as f64);
    report.insert(names::ANOMALY_PCT, outcome.anomaly_pct());
    report
}

/// Sum of squared distances from each point to its assigned centroid.
pub fn inertia(x: &Matrix, labels: &[i32], centroids: &Matrix) -> Result<f64> {
    check_labels(x, labels)?;
    if centroids.ncols() != x.ncols() {
        return Err(EngineError::DimensionMismatch {
            expected: format!("{} features", x.ncols()),
            actual: format!("{} features", centroids.ncols()),
        });
    }

    let mut total = 0.0;
    for (i, &label) in labels.iter().enumerate() {
        let k = usize::try_from(label)
            .ok()
            .filter(|&k| k < centroids.nrows())
            .ok_or_else(|| EngineError::DimensionMismatch {
                expected: format!("label in [0, {})", centroids.nrows()),
                actual: label.to_string(),
            })?;
        total += squared_euclidean(x.row(i), centroids.row(k));
    }
    Ok(total)
}

/// Mean of `(b - a) / max(a, b)` over all clustered points.
///
/// Needs at least two clusters with two or more points each; singleton
/// clusters contribute zero.
pub fn silhouette_score(x: &Matrix, labels: &[i32]) -> Result<MetricValue> {
    check_labels(x, labels)?;
    let clusters = group_by_label(labels);

    let non_trivial = clusters.values().filter(|members| members.len() >= 2).count();
    if non_trivial < 2 {
        return Ok(MetricValue::NotApplicable);
    }

    let mut total = 0.0;
    let mut count = 0usize;
    for (&label, members) in &clusters {
        for &i in members {
            count += 1;
            if members.len() < 2 {
                continue;
            }

            let a = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| euclidean(x.row(i), x.row(j)))
                .sum::<f64>()
                / (members.len() - 1) as f64;

            let b = clusters
                .iter()
                .filter(|&(&other, _)| other != label)
                .map(|(_, others)| {
                    others.iter().map(|&j| euclidean(x.row(i), x.row(j))).sum::<f64>()
                        / others.len() as f64
                })
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }

    Ok(MetricValue::Value(total / count as f64))
}

/// Average over clusters of the worst `(s_i + s_j) / d(c_i, c_j)` ratio.
/// Lower is better.
pub fn davies_bouldin_score(x: &Matrix, labels: &[i32]) -> Result<MetricValue> {
    check_labels(x, labels)?;
    let clusters = group_by_label(labels);
    if clusters.len() < 2 {
        return Ok(MetricValue::NotApplicable);
    }

    let centroids: Vec<Vector> = clusters.values().map(|m| centroid(x, m)).collect();
    let scatter: Vec<f64> = clusters
        .values()
        .zip(&centroids)
        .map(|(members, c)| {
            members
                .iter()
                .map(|&i| euclidean(x.row(i), c.view()))
                .sum::<f64>()
                / members.len() as f64
        })
        .collect();

    let k = centroids.len();
    let mut total = 0.0;
    for i in 0..k {
        let mut worst = 0.0_f64;
        for j in 0..k {
            if i == j {
                continue;
            }
            let d = euclidean(centroids[i].view(), centroids[j].view());
            if d <= 0.0 {
                return Ok(MetricValue::NotApplicable);
            }
            worst = worst.max((scatter[i] + scatter[j]) / d);
        }
        total += worst;
    }

    Ok(MetricValue::Value(total / k as f64))
}

/// Between-cluster over within-cluster dispersion, scaled by `(n - k) / (k - 1)`.
pub fn calinski_harabasz_score(x: &Matrix, labels: &[i32]) -> Result<MetricValue> {
    check_labels(x, labels)?;
    let clusters = group_by_label(labels);
    let n: usize = clusters.values().map(Vec::len).sum();
    let k = clusters.len();
    if k < 2 || k >= n {
        return Ok(MetricValue::NotApplicable);
    }

    let all: Vec<usize> = clusters.values().flatten().copied().collect();
    let overall = centroid(x, &all);

    let mut between = 0.0;
    let mut within = 0.0;
    for members in clusters.values() {
        let c = centroid(x, members);
        between += members.len() as f64 * squared_euclidean(c.view(), overall.view());
        within += members
            .iter()
            .map(|&i| squared_euclidean(x.row(i), c.view()))
            .sum::<f64>();
    }

    if within <= 0.0 {
        return Ok(MetricValue::NotApplicable);
    }

    Ok(MetricValue::Value(
        (between / (k - 1) as f64) / (within / (n - k) as f64),
    ))
}

fn check_labels(x: &Matrix, labels: &[i32]) -> Result<()> {
    if labels.len() != x.nrows() {
        return Err(EngineError::DimensionMismatch {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", labels.len()),
        });
    }
    Ok(())
}

/// Row indices per cluster label, noise excluded.
fn group_by_label(labels: &[i32]) -> BTreeMap<i32, Vec<usize>> {
    let mut clusters: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        if label >= 0 {
            clusters.entry(label).or_default().push(i);
        }
    }
    clusters
}

fn centroid(x: &Matrix, members: &[usize]) -> Vector {
    x.select(Axis(0), members)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Vector::zeros(x.ncols()))
}
