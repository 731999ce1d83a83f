//! Unsupervised pattern detection over economic-group profiles.
//!
//! The pipeline builds a standardized [`FeatureMatrix`], projects it with
//! [`PCA`], and runs K-Means, DBSCAN, Ward clustering and an isolation forest
//! side by side through [`run_consensus`]. [`search`] sweeps K-Means and
//! DBSCAN hyperparameters by silhouette.

pub use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::{info, warn};

pub mod anomaly;
pub mod assignment;
pub mod cluster;
pub mod config;
pub mod consensus;
pub mod decomposition;
pub mod distance;
pub mod error;
pub mod metrics;
pub mod preprocessing;
pub mod projection;
pub mod search;

#[cfg(test)]
mod testing;

pub use anomaly::{IsolationForest, IsolationForestConfig};
pub use assignment::{
    ANOMALY, AnomalyOutcome, ClusterAssignment, ClusteringOutcome, NOISE, NORMAL, Outcome,
};
pub use cluster::{
    AgglomerativeClustering, DBSCAN, DbscanConfig, HierarchicalConfig, KMeans, KMeansConfig,
    Linkage, Merge,
};
pub use config::{DEFAULT_FEATURES, EngineConfig, SearchConfig};
pub use consensus::{
    AlgorithmKind, ConsensusConfig, ConsensusEntry, ConsensusResult, ReportEnvelope, Status,
    run_consensus,
};
pub use decomposition::PCA;
pub use distance::DistanceMetric;
pub use error::{EngineError, Result};
pub use metrics::{MetricValue, QualityReport};
pub use preprocessing::{FeatureMatrix, FeatureMatrixBuilder, RawTable, StandardizationParams};
pub use projection::{ProjectionPoint, prepare_projection};

pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;

/// Everything one pipeline run produces.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub matrix: FeatureMatrix,
    pub pca: PCA,
    /// Standardized rows in PCA space.
    pub projection: Matrix,
    pub consensus: ConsensusResult,
}

impl Analysis {
    /// PCA coordinates paired with one detector's labels.
    pub fn projection_for(&self, kind: AlgorithmKind) -> Result<Vec<ProjectionPoint>> {
        let entry = self
            .consensus
            .get(kind)
            .ok_or_else(|| EngineError::Config(format!("{kind} was not run")))?;
        let labels = entry.labels().ok_or_else(|| {
            EngineError::degenerate(
                kind.display_name(),
                entry.failure.clone().unwrap_or_default(),
            )
        })?;
        prepare_projection(&self.matrix.entity_ids, &self.projection, labels)
    }

    pub fn envelopes(&self) -> Result<Vec<ReportEnvelope>> {
        self.consensus.envelopes(&self.matrix.entity_ids)
    }
}

/// Builds the matrix, projects it and runs every detector.
///
/// Input and hyperparameter errors are returned before any algorithm runs.
pub fn analyze(table: &RawTable, config: &EngineConfig) -> Result<Analysis> {
    config.validate()?;

    let matrix = FeatureMatrixBuilder::new(config.features.iter().cloned())
        .min_rows(config.min_rows)
        .build(table)?;
    info!(
        rows = matrix.n_rows(),
        features = matrix.n_features(),
        dropped = matrix.dropped_rows,
        "feature matrix built"
    );

    let consensus_config = config.consensus();
    consensus_config.validate(matrix.n_rows())?;

    let n_components = if config.pca_components > matrix.n_features() {
        warn!(
            requested = config.pca_components,
            features = matrix.n_features(),
            "clamping PCA components to the feature count"
        );
        matrix.n_features()
    } else {
        config.pca_components
    };

    let mut pca = PCA::new().n_components(n_components);
    let projection = pca.fit_transform(&matrix.standardized)?;
    info!(
        components = n_components,
        explained = ?pca.explained_variance_fraction(),
        "pca fitted"
    );

    let consensus = run_consensus(&matrix.standardized, &consensus_config)?;

    Ok(Analysis {
        matrix,
        pca,
        projection,
        consensus,
    })
}
