//! Hyperparameter search.
//!
//! Both searches are lazy iterators yielding one [`SearchRecord`] per
//! candidate; [`select_best`] drains them and keeps the highest silhouette.
//! Candidates are validated as a whole before the first one runs.

use std::ops::RangeInclusive;

use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::{DBSCAN, DbscanConfig, KMeans, KMeansConfig};
use crate::config::EngineConfig;
use crate::distance::DistanceMetric;
use crate::error::{EngineError, Result};
use crate::metrics::{self, MetricValue, QualityReport, names};
use crate::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchRecord<P> {
    pub params: P,
    pub report: QualityReport,
}

impl<P> SearchRecord<P> {
    pub fn silhouette(&self) -> Option<f64> {
        self.report.value(names::SILHOUETTE)
    }
}

/// Every evaluated candidate plus the index of the winner, if any candidate
/// produced a computable silhouette.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchOutcome<P> {
    pub records: Vec<SearchRecord<P>>,
    pub best: Option<usize>,
}

impl<P> SearchOutcome<P> {
    pub fn best(&self) -> Option<&SearchRecord<P>> {
        self.best.and_then(|i| self.records.get(i))
    }

    pub fn found(&self) -> bool {
        self.best.is_some()
    }
}

pub type KSearchOutcome = SearchOutcome<usize>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ElbowPoint {
    pub k: usize,
    pub inertia: MetricValue,
    pub silhouette: MetricValue,
}

impl SearchOutcome<usize> {
    /// Inertia and silhouette keyed by k, in sweep order.
    pub fn elbow_table(&self) -> Vec<ElbowPoint> {
        self.records
            .iter()
            .map(|r| ElbowPoint {
                k: r.params,
                inertia: r.report.get(names::INERTIA).unwrap_or(MetricValue::NotApplicable),
                silhouette: r.report.get(names::SILHOUETTE).unwrap_or(MetricValue::NotApplicable),
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DbscanCandidate {
    pub eps: f64,
    pub min_samples: usize,
}

/// K-Means over an ascending range of k.
pub struct KSweep<'a> {
    x: &'a Matrix,
    base: KMeansConfig,
    ks: RangeInclusive<usize>,
}

impl<'a> KSweep<'a> {
    /// `base` supplies every setting except the cluster count.
    pub fn new(x: &'a Matrix, ks: RangeInclusive<usize>, base: &KMeansConfig) -> Result<Self> {
        if ks.is_empty() {
            return Err(EngineError::invalid(
                "k_range",
                format!("{}..={}", ks.start(), ks.end()),
                "must contain at least one k",
            ));
        }
        for k in ks.clone() {
            with_k(base, k).validate(x.nrows())?;
        }
        Ok(Self {
            x,
            base: base.clone(),
            ks,
        })
    }
}

impl Iterator for KSweep<'_> {
    type Item = Result<SearchRecord<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.ks.next()?;
        Some(evaluate_k(self.x, &self.base, k))
    }
}

/// DBSCAN over an eps-major grid of `(eps, min_samples)` pairs.
pub struct DbscanGrid<'a> {
    x: &'a Matrix,
    metric: DistanceMetric,
    candidates: std::vec::IntoIter<DbscanCandidate>,
}

impl<'a> DbscanGrid<'a> {
    pub fn new(
        x: &'a Matrix,
        eps_grid: &[f64],
        min_samples_grid: &[usize],
        metric: DistanceMetric,
    ) -> Result<Self> {
        if eps_grid.is_empty() || min_samples_grid.is_empty() {
            return Err(EngineError::invalid(
                "grid",
                format!("{} eps x {} min_samples", eps_grid.len(), min_samples_grid.len()),
                "both axes need at least one value",
            ));
        }

        let candidates: Vec<DbscanCandidate> = eps_grid
            .iter()
            .flat_map(|&eps| {
                min_samples_grid
                    .iter()
                    .map(move |&min_samples| DbscanCandidate { eps, min_samples })
            })
            .collect();
        for c in &candidates {
            DbscanConfig::new(c.eps, c.min_samples).validate(x.nrows())?;
        }

        Ok(Self {
            x,
            metric,
            candidates: candidates.into_iter(),
        })
    }
}

impl Iterator for DbscanGrid<'_> {
    type Item = Result<SearchRecord<DbscanCandidate>>;

    fn next(&mut self) -> Option<Self::Item> {
        let candidate = self.candidates.next()?;
        Some(evaluate_dbscan(self.x, candidate, self.metric))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.candidates.size_hint()
    }
}

/// Keeps every record and picks the highest silhouette; the earliest
/// candidate wins ties.
pub fn select_best<P>(
    records: impl IntoIterator<Item = Result<SearchRecord<P>>>,
) -> Result<SearchOutcome<P>> {
    let mut kept = Vec::new();
    let mut best: Option<(usize, f64)> = None;

    for record in records {
        let record = record?;
        if let Some(score) = record.silhouette() {
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((kept.len(), score));
            }
        }
        kept.push(record);
    }

    Ok(SearchOutcome {
        records: kept,
        best: best.map(|(i, _)| i),
    })
}

pub fn search_k(x: &Matrix, ks: RangeInclusive<usize>, base: &KMeansConfig) -> Result<KSearchOutcome> {
    let outcome = select_best(KSweep::new(x, ks, base)?)?;
    match outcome.best() {
        Some(best) => info!(k = best.params, silhouette = ?best.silhouette(), "k selection finished"),
        None => info!("k selection found no computable silhouette"),
    }
    Ok(outcome)
}

pub fn search_dbscan(
    x: &Matrix,
    eps_grid: &[f64],
    min_samples_grid: &[usize],
    metric: DistanceMetric,
) -> Result<SearchOutcome<DbscanCandidate>> {
    let outcome = select_best(DbscanGrid::new(x, eps_grid, min_samples_grid, metric)?)?;
    match outcome.best() {
        Some(best) => info!(
            eps = best.params.eps,
            min_samples = best.params.min_samples,
            silhouette = ?best.silhouette(),
            "dbscan grid search finished"
        ),
        None => info!("dbscan grid search found no valid configuration"),
    }
    Ok(outcome)
}

/// Both sweeps, keyed by the algorithm they tune.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchSummary {
    pub k: KSearchOutcome,
    pub dbscan: SearchOutcome<DbscanCandidate>,
}

/// Runs the K sweep and the DBSCAN grid over the ranges in `config.search`,
/// reusing the configured K-Means settings and DBSCAN metric.
pub fn search_configured(x: &Matrix, config: &EngineConfig) -> Result<SearchSummary> {
    let search = &config.search;
    // Validate both candidate sets before either sweep fits anything.
    let sweep = KSweep::new(x, search.k_range(), &config.kmeans)?;
    let grid = DbscanGrid::new(x, &search.eps_grid, &search.min_samples_grid, config.dbscan.metric)?;
    Ok(SearchSummary {
        k: select_best(sweep)?,
        dbscan: select_best(grid)?,
    })
}

fn with_k(base: &KMeansConfig, k: usize) -> KMeansConfig {
    KMeansConfig {
        n_clusters: k,
        ..base.clone()
    }
}

fn evaluate_k(x: &Matrix, base: &KMeansConfig, k: usize) -> Result<SearchRecord<usize>> {
    let mut kmeans = KMeans::new(with_k(base, k));
    let report = match kmeans.fit_predict(x) {
        Ok(labels) => {
            let mut report = metrics::clustering_report(x, &labels)?;
            report.insert(names::INERTIA, kmeans.inertia);
            report
        }
        Err(err) if err.is_degenerate() => {
            debug!(k, %err, "k-means candidate degenerate");
            unavailable(&[
                names::SILHOUETTE,
                names::DAVIES_BOULDIN,
                names::CALINSKI_HARABASZ,
                names::INERTIA,
            ])
        }
        Err(err) => return Err(err),
    };

    debug!(k, silhouette = ?report.value(names::SILHOUETTE), "k candidate evaluated");
    Ok(SearchRecord { params: k, report })
}

fn evaluate_dbscan(
    x: &Matrix,
    candidate: DbscanCandidate,
    metric: DistanceMetric,
) -> Result<SearchRecord<DbscanCandidate>> {
    let mut dbscan = DBSCAN::new(DbscanConfig::new(candidate.eps, candidate.min_samples).metric(metric));
    dbscan.fit(x)?;
    let outcome = dbscan
        .outcome()
        .ok_or_else(|| EngineError::degenerate("DBSCAN", "fit produced no labels"))?;
    let report = metrics::density_report(x, &outcome)?;

    debug!(
        eps = candidate.eps,
        min_samples = candidate.min_samples,
        n_clusters = outcome.n_clusters,
        n_noise = outcome.n_noise,
        "dbscan candidate evaluated"
    );
    Ok(SearchRecord {
        params: candidate,
        report,
    })
}

fn unavailable(metric_names: &[&str]) -> QualityReport {
    let mut report = QualityReport::new();
    for name in metric_names {
        report.insert(name, MetricValue::NotApplicable);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::two_blobs;
    use ndarray::array;

    #[test]
    fn test_k_selection_prefers_two_blobs() {
        let x = two_blobs();
        let outcome = search_k(&x, 2..=6, &KMeansConfig::default()).unwrap();

        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.best().unwrap().params, 2);

        let table = outcome.elbow_table();
        assert_eq!(table.iter().map(|p| p.k).collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
        let inertia: Vec<f64> = table.iter().filter_map(|p| p.inertia.value()).collect();
        assert_eq!(inertia.len(), 5);
        assert!(inertia[4] < inertia[0]);
    }

    #[test]
    fn test_k_range_validated_upfront() {
        let x = two_blobs();
        // k = 20 is invalid for 20 rows, so nothing runs.
        let err = KSweep::new(&x, 2..=20, &KMeansConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::InvalidHyperparameter { param: "n_clusters", .. }));

        #[allow(clippy::reversed_empty_ranges)]
        let empty = KSweep::new(&x, 5..=2, &KMeansConfig::default());
        assert!(empty.is_err());
    }

    #[test]
    fn test_k_sweep_is_lazy() {
        let x = two_blobs();
        let mut sweep = KSweep::new(&x, 2..=6, &KMeansConfig::default()).unwrap();
        let first = sweep.next().unwrap().unwrap();
        assert_eq!(first.params, 2);
        assert!(first.report.value(names::INERTIA).is_some());
    }

    #[test]
    fn test_dbscan_grid_finds_valid_configuration() {
        let x = two_blobs();
        let outcome = search_dbscan(&x, &[0.01, 2.0], &[5], DistanceMetric::Euclidean).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].silhouette(), None);
        let best = outcome.best().unwrap();
        assert_eq!(best.params, DbscanCandidate { eps: 2.0, min_samples: 5 });
        assert_eq!(best.report.value(names::N_CLUSTERS), Some(2.0));
    }

    #[test]
    fn test_dbscan_grid_reports_none_found() {
        let x = two_blobs();
        // Too strict gives all noise, too loose merges everything.
        let outcome =
            search_dbscan(&x, &[0.01, 100.0], &[5, 10], DistanceMetric::Euclidean).unwrap();

        assert_eq!(outcome.records.len(), 4);
        assert!(!outcome.found());
        assert!(outcome.best().is_none());
    }

    #[test]
    fn test_dbscan_grid_order_is_eps_major() {
        let x = two_blobs();
        let grid = DbscanGrid::new(&x, &[0.5, 1.0], &[3, 5], DistanceMetric::Euclidean).unwrap();
        let params: Vec<_> = grid.map(|r| r.unwrap().params).collect();
        assert_eq!(
            params,
            vec![
                DbscanCandidate { eps: 0.5, min_samples: 3 },
                DbscanCandidate { eps: 0.5, min_samples: 5 },
                DbscanCandidate { eps: 1.0, min_samples: 3 },
                DbscanCandidate { eps: 1.0, min_samples: 5 },
            ]
        );
    }

    #[test]
    fn test_dbscan_grid_validated_upfront() {
        let x = two_blobs();
        assert!(DbscanGrid::new(&x, &[0.5, -1.0], &[3], DistanceMetric::Euclidean).is_err());
        assert!(DbscanGrid::new(&x, &[0.5], &[3, 50], DistanceMetric::Euclidean).is_err());
        assert!(DbscanGrid::new(&x, &[], &[3], DistanceMetric::Euclidean).is_err());
    }

    #[test]
    fn test_search_configured_uses_configured_ranges() {
        let x = two_blobs();
        let mut config = EngineConfig::default();
        config.search.k_min = 2;
        config.search.k_max = 6;
        config.search.eps_grid = vec![0.01, 2.0];
        config.search.min_samples_grid = vec![5];

        let summary = search_configured(&x, &config).unwrap();
        assert_eq!(summary.k.records.len(), 5);
        assert_eq!(summary.k.best().unwrap().params, 2);
        assert_eq!(summary.dbscan.records.len(), 2);
        assert_eq!(summary.dbscan.best().unwrap().params.eps, 2.0);

        // k_max = 20 is out of range for 20 rows.
        config.search.k_max = 20;
        assert!(search_configured(&x, &config).is_err());
    }

    #[test]
    fn test_select_best_keeps_first_on_ties() {
        let record = |p: usize, s: f64| {
            let mut report = QualityReport::new();
            report.insert(names::SILHOUETTE, s);
            Ok(SearchRecord { params: p, report })
        };
        let outcome = select_best(vec![record(0, 0.5), record(1, 0.8), record(2, 0.8)]).unwrap();
        assert_eq!(outcome.best, Some(1));
    }

    #[test]
    fn test_degenerate_k_candidate_is_not_applicable() {
        // Three distinct positions cannot fill four clusters.
        let x = array![
            [0.0], [0.0], [0.0], [5.0], [5.0], [5.0], [9.0], [9.0], [9.0], [9.0]
        ];
        let outcome = search_k(&x, 2..=4, &KMeansConfig::default()).unwrap();
        let last = &outcome.records[2];
        assert_eq!(last.params, 4);
        assert_eq!(last.report.get(names::INERTIA), Some(MetricValue::NotApplicable));
        assert!(outcome.found());
    }
}
