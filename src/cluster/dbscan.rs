use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::assignment::{ClusteringOutcome, NOISE, percentage};
use crate::distance::DistanceMetric;
use crate::error::{EngineError, Result};
use crate::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbscanConfig {
    /// Neighborhood radius.
    pub eps: f64,
    /// Neighborhood size, the point itself included, that makes a core point.
    pub min_samples: usize,
    pub metric: DistanceMetric,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
            metric: DistanceMetric::Euclidean,
        }
    }
}

impl DbscanConfig {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            ..Self::default()
        }
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self, n_rows: usize) -> Result<()> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(EngineError::invalid("eps", self.eps, "must be finite and > 0"));
        }
        if self.min_samples == 0 || self.min_samples > n_rows {
            return Err(EngineError::invalid(
                "min_samples",
                self.min_samples,
                format!("must be in [1, {n_rows}] for {n_rows} rows"),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct DBSCAN {
    pub labels: Option<Vec<i32>>,
    pub core_sample_indices: Option<Vec<usize>>,
    config: DbscanConfig,
}

impl DBSCAN {
    pub fn new(config: DbscanConfig) -> Self {
        Self {
            labels: None,
            core_sample_indices: None,
            config,
        }
    }

    pub fn config(&self) -> &DbscanConfig {
        &self.config
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(EngineError::InsufficientData {
                rows: x.nrows(),
                min_rows: 1,
            });
        }
        self.config.validate(x.nrows())?;

        let n_samples = x.nrows();
        let neighborhoods: Vec<Vec<usize>> =
            (0..n_samples).map(|i| self.region_query(x, i)).collect();
        let is_core: Vec<bool> = neighborhoods
            .iter()
            .map(|n| n.len() >= self.config.min_samples)
            .collect();

        let mut labels = vec![NOISE; n_samples];
        let mut current_cluster = 0;

        for seed in 0..n_samples {
            if !is_core[seed] || labels[seed] != NOISE {
                continue;
            }

            labels[seed] = current_cluster;
            let mut queue = VecDeque::from([seed]);

            // Only core points extend the cluster; border points are absorbed
            // by the first cluster that reaches them.
            while let Some(point) = queue.pop_front() {
                for &neighbor in &neighborhoods[point] {
                    if labels[neighbor] != NOISE {
                        continue;
                    }
                    labels[neighbor] = current_cluster;
                    if is_core[neighbor] {
                        queue.push_back(neighbor);
                    }
                }
            }

            current_cluster += 1;
        }

        self.labels = Some(labels);
        self.core_sample_indices = Some((0..n_samples).filter(|&i| is_core[i]).collect());

        Ok(())
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Vec<i32>> {
        self.fit(x)?;
        self.labels
            .clone()
            .ok_or_else(|| EngineError::degenerate("DBSCAN", "fit produced no labels"))
    }

    pub fn outcome(&self) -> Option<ClusteringOutcome> {
        self.labels.clone().map(ClusteringOutcome::from_labels)
    }

    /// Indices within `eps` of the given point, itself included.
    fn region_query(&self, x: &Matrix, point_idx: usize) -> Vec<usize> {
        (0..x.nrows())
            .filter(|&i| self.config.metric.distance(x.row(point_idx), x.row(i)) <= self.config.eps)
            .collect()
    }

    pub fn get_n_clusters(&self) -> Option<usize> {
        self.outcome().map(|o| o.n_clusters)
    }

    pub fn get_n_noise_points(&self) -> Option<usize> {
        self.labels
            .as_ref()
            .map(|labels| labels.iter().filter(|&&l| l == NOISE).count())
    }

    pub fn noise_pct(&self) -> Option<f64> {
        let total = self.labels.as_ref()?.len();
        self.get_n_noise_points().map(|n| percentage(n, total))
    }

    pub fn is_core_sample(&self, sample_idx: usize) -> Option<bool> {
        self.core_sample_indices
            .as_ref()
            .map(|core| core.binary_search(&sample_idx).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blob_truth, same_partition, two_blobs};
    use ndarray::array;

    #[test]
    fn test_dbscan_basic() {
        let x = array![
            [1.0, 1.0],
            [1.2, 1.1],
            [1.1, 1.2],
            [8.0, 8.0],
            [8.1, 8.1],
            [8.2, 7.9],
            [15.0, 1.0] // Outlier
        ];

        let mut dbscan = DBSCAN::new(DbscanConfig::new(1.0, 2));
        let labels = dbscan.fit_predict(&x).unwrap();

        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
        assert_eq!(dbscan.get_n_clusters(), Some(2));
        assert_eq!(dbscan.get_n_noise_points(), Some(1));
        assert!((dbscan.noise_pct().unwrap() - 100.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_dbscan_noise_detection() {
        let x = array![[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]];

        let mut dbscan = DBSCAN::new(DbscanConfig::new(1.0, 2));
        dbscan.fit(&x).unwrap();

        assert_eq!(dbscan.get_n_noise_points(), Some(x.nrows()));
        assert_eq!(dbscan.get_n_clusters(), Some(0));
    }

    #[test]
    fn test_dbscan_border_point() {
        // Point 3 has too few neighbors to be core but touches core point 2.
        let x = array![[0.0, 0.0], [0.5, 0.0], [1.0, 0.0], [1.9, 0.0], [10.0, 0.0]];

        let mut dbscan = DBSCAN::new(DbscanConfig::new(1.0, 3));
        let labels = dbscan.fit_predict(&x).unwrap();

        assert_eq!(labels, vec![0, 0, 0, 0, NOISE]);
        assert_eq!(dbscan.is_core_sample(2), Some(true));
        assert_eq!(dbscan.is_core_sample(3), Some(false));
    }

    #[test]
    fn test_dbscan_single_cluster() {
        let x = array![
            [1.0, 1.0],
            [1.1, 1.0],
            [1.0, 1.1],
            [1.1, 1.1],
            [1.2, 1.0],
            [1.0, 1.2]
        ];

        let mut dbscan = DBSCAN::new(DbscanConfig::new(0.5, 2));
        let labels = dbscan.fit_predict(&x).unwrap();

        assert_eq!(dbscan.get_n_clusters(), Some(1));
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_dbscan_manhattan_metric() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

        let config = DbscanConfig::new(1.5, 2).metric(DistanceMetric::Manhattan);
        let mut dbscan = DBSCAN::new(config);
        dbscan.fit(&x).unwrap();

        assert_eq!(dbscan.get_n_clusters(), Some(1));
    }

    #[test]
    fn test_dbscan_eps_too_small_then_spanning() {
        let x = two_blobs();

        let mut strict = DBSCAN::new(DbscanConfig::new(0.01, 5));
        strict.fit(&x).unwrap();
        assert_eq!(strict.get_n_clusters(), Some(0));
        assert_eq!(strict.get_n_noise_points(), Some(20));

        let mut loose = DBSCAN::new(DbscanConfig::new(2.0, 5));
        let labels = loose.fit_predict(&x).unwrap();
        assert_eq!(loose.get_n_clusters(), Some(2));
        assert_eq!(loose.get_n_noise_points(), Some(0));
        assert!(same_partition(&labels, &blob_truth()));
    }

    #[test]
    fn test_dbscan_noise_and_reachability_invariants() {
        let x = array![
            [0.0, 0.0],
            [0.3, 0.1],
            [0.1, 0.4],
            [0.6, 0.5],
            [1.2, 0.9],
            [3.0, 3.0],
            [3.2, 3.1],
            [3.1, 2.8],
            [6.0, 0.0]
        ];
        let config = DbscanConfig::new(0.6, 3);
        let mut dbscan = DBSCAN::new(config.clone());
        let labels = dbscan.fit_predict(&x).unwrap();

        for i in 0..x.nrows() {
            let neighbors: Vec<usize> = (0..x.nrows())
                .filter(|&j| config.metric.distance(x.row(i), x.row(j)) <= config.eps)
                .collect();
            if labels[i] == NOISE {
                // Noise is neither core nor adjacent to a core point.
                assert!(neighbors.len() < config.min_samples);
                assert!(!neighbors.iter().any(|&j| dbscan.is_core_sample(j) == Some(true)));
            } else if dbscan.is_core_sample(i) != Some(true) {
                assert!(neighbors.iter().any(|&j| {
                    dbscan.is_core_sample(j) == Some(true) && labels[j] == labels[i]
                }));
            }
        }
    }

    #[test]
    fn test_dbscan_invalid_params() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(DBSCAN::new(DbscanConfig::new(-1.0, 2)).fit(&x).is_err());
        assert!(DBSCAN::new(DbscanConfig::new(0.0, 2)).fit(&x).is_err());
        assert!(DBSCAN::new(DbscanConfig::new(f64::NAN, 2)).fit(&x).is_err());
        assert!(DBSCAN::new(DbscanConfig::new(1.0, 0)).fit(&x).is_err());
        assert!(DBSCAN::new(DbscanConfig::new(1.0, 3)).fit(&x).is_err());
    }

    #[test]
    fn test_dbscan_core_sample_check() {
        let x = array![[1.0, 1.0], [1.1, 1.0], [1.2, 1.0], [10.0, 10.0]];

        let mut dbscan = DBSCAN::new(DbscanConfig::new(0.5, 2));
        dbscan.fit(&x).unwrap();

        assert_eq!(dbscan.is_core_sample(0), Some(true));
        assert_eq!(dbscan.is_core_sample(1), Some(true));
        assert_eq!(dbscan.is_core_sample(3), Some(false));
    }
}
