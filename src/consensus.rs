//! Consensus orchestration.
//!
//! Runs the four detectors on one standardized matrix. Configuration errors
//! surface before anything runs; a detector that fails afterwards becomes a
//! failed entry and the others still report.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::anomaly::{IsolationForest, IsolationForestConfig};
use crate::assignment::{ClusterAssignment, ClusteringOutcome, Outcome};
use crate::cluster::{
    AgglomerativeClustering, DBSCAN, DbscanConfig, HierarchicalConfig, KMeans, KMeansConfig,
};
use crate::error::{EngineError, Result};
use crate::metrics::{self, QualityReport, names};
use crate::Matrix;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    KMeans,
    Dbscan,
    Hierarchical,
    IsolationForest,
}

impl AlgorithmKind {
    /// Report order.
    pub const ALL: [Self; 4] = [
        Self::KMeans,
        Self::Dbscan,
        Self::Hierarchical,
        Self::IsolationForest,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::KMeans => "K-Means",
            Self::Dbscan => "DBSCAN",
            Self::Hierarchical => "Hierarchical",
            Self::IsolationForest => "Isolation Forest",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub kmeans: KMeansConfig,
    pub dbscan: DbscanConfig,
    pub hierarchical: HierarchicalConfig,
    pub isolation_forest: IsolationForestConfig,
    pub parallel: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            kmeans: KMeansConfig::default(),
            dbscan: DbscanConfig::default(),
            hierarchical: HierarchicalConfig::default(),
            isolation_forest: IsolationForestConfig::default(),
            parallel: true,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self, n_rows: usize) -> Result<()> {
        self.kmeans.validate(n_rows)?;
        self.dbscan.validate(n_rows)?;
        self.hierarchical.validate(n_rows)?;
        self.isolation_forest.validate(n_rows)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsensusEntry {
    pub kind: AlgorithmKind,
    pub display_name: &'static str,
    pub outcome: Option<Outcome>,
    pub report: QualityReport,
    pub failure: Option<String>,
}

impl ConsensusEntry {
    fn succeeded(kind: AlgorithmKind, outcome: Outcome, report: QualityReport) -> Self {
        Self {
            kind,
            display_name: kind.display_name(),
            outcome: Some(outcome),
            report,
            failure: None,
        }
    }

    fn failed(kind: AlgorithmKind, reason: String) -> Self {
        Self {
            kind,
            display_name: kind.display_name(),
            outcome: None,
            report: QualityReport::new(),
            failure: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn labels(&self) -> Option<&[i32]> {
        self.outcome.as_ref().map(Outcome::labels)
    }

    /// Reporting record keyed by entity id. Failed entries carry no labels.
    pub fn envelope(&self, entity_ids: &[String]) -> Result<ReportEnvelope> {
        let labels = match self.labels() {
            Some(labels) => ClusterAssignment::from_parts(entity_ids, labels)?,
            None => ClusterAssignment::default(),
        };
        Ok(ReportEnvelope {
            display_name: self.display_name.to_string(),
            labels,
            metrics: self.report.clone(),
            status: if self.is_ok() { Status::Ok } else { Status::Failed },
            failure_reason: self.failure.clone(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportEnvelope {
    pub display_name: String,
    pub labels: ClusterAssignment,
    pub metrics: QualityReport,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One entry per detector, always in [`AlgorithmKind::ALL`] order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsensusResult {
    pub entries: Vec<ConsensusEntry>,
}

impl ConsensusResult {
    pub fn get(&self, kind: AlgorithmKind) -> Option<&ConsensusEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    pub fn n_succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_ok()).count()
    }

    pub fn envelopes(&self, entity_ids: &[String]) -> Result<Vec<ReportEnvelope>> {
        self.entries.iter().map(|e| e.envelope(entity_ids)).collect()
    }
}

pub fn run_consensus(x: &Matrix, config: &ConsensusConfig) -> Result<ConsensusResult> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(EngineError::InsufficientData {
            rows: x.nrows(),
            min_rows: 1,
        });
    }
    config.validate(x.nrows())?;

    let run = |kind| run_member(kind, x, config);
    let entries = if config.parallel {
        let ((kmeans, dbscan), (hierarchical, forest)) = rayon::join(
            || rayon::join(|| run(AlgorithmKind::KMeans), || run(AlgorithmKind::Dbscan)),
            || {
                rayon::join(
                    || run(AlgorithmKind::Hierarchical),
                    || run(AlgorithmKind::IsolationForest),
                )
            },
        );
        vec![kmeans, dbscan, hierarchical, forest]
    } else {
        AlgorithmKind::ALL.into_iter().map(run).collect()
    };

    let result = ConsensusResult { entries };
    info!(
        succeeded = result.n_succeeded(),
        total = result.entries.len(),
        parallel = config.parallel,
        "consensus finished"
    );
    Ok(result)
}

fn run_member(kind: AlgorithmKind, x: &Matrix, config: &ConsensusConfig) -> ConsensusEntry {
    match fit_member(kind, x, config) {
        Ok((outcome, report)) => ConsensusEntry::succeeded(kind, outcome, report),
        Err(err) => {
            warn!(algorithm = %kind, %err, "consensus member failed");
            ConsensusEntry::failed(kind, err.to_string())
        }
    }
}

fn fit_member(
    kind: AlgorithmKind,
    x: &Matrix,
    config: &ConsensusConfig,
) -> Result<(Outcome, QualityReport)> {
    match kind {
        AlgorithmKind::KMeans => {
            let mut kmeans = KMeans::new(config.kmeans.clone());
            let outcome = ClusteringOutcome::from_labels(kmeans.fit_predict(x)?);
            require_clusters(kind, &outcome)?;
            let mut report = metrics::clustering_report(x, &outcome.labels)?;
            report.insert(names::INERTIA, kmeans.inertia);
            Ok((Outcome::Clustering(outcome), report))
        }
        AlgorithmKind::Dbscan => {
            let mut dbscan = DBSCAN::new(config.dbscan.clone());
            let outcome = ClusteringOutcome::from_labels(dbscan.fit_predict(x)?);
            require_clusters(kind, &outcome)?;
            let report = metrics::density_report(x, &outcome)?;
            Ok((Outcome::Clustering(outcome), report))
        }
        AlgorithmKind::Hierarchical => {
            let mut hc = AgglomerativeClustering::new(config.hierarchical.clone());
            let outcome = ClusteringOutcome::from_labels(hc.fit_predict(x)?);
            require_clusters(kind, &outcome)?;
            let report = metrics::clustering_report(x, &outcome.labels)?;
            Ok((Outcome::Clustering(outcome), report))
        }
        AlgorithmKind::IsolationForest => {
            let mut forest = IsolationForest::new(config.isolation_forest.clone());
            let outcome = forest.fit_predict(x)?;
            let report = metrics::anomaly_report(&outcome);
            Ok((Outcome::Anomaly(outcome), report))
        }
    }
}

/// Comparative metrics need at least two clusters.
fn require_clusters(kind: AlgorithmKind, outcome: &ClusteringOutcome) -> Result<()> {
    match outcome.n_clusters {
        0 => Err(EngineError::degenerate(kind.display_name(), "every point is noise")),
        1 => Err(EngineError::degenerate(
            kind.display_name(),
            "all clustered points fall into a single cluster",
        )),
        _ => Ok(()),
    }
}
