//! Engine configuration.
//!
//! Every algorithm keeps its own typed record; `EngineConfig` bundles them
//! with the pipeline settings and loads from JSON. Absent fields fall back
//! to the defaults below.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::anomaly::IsolationForestConfig;
use crate::cluster::{DbscanConfig, HierarchicalConfig, KMeansConfig};
use crate::consensus::ConsensusConfig;
use crate::error::{EngineError, Result};
use crate::preprocessing::MIN_ROWS;

/// Group-profile columns used when the caller does not pick its own.
pub const DEFAULT_FEATURES: [&str; 21] = [
    "qtd_cnpjs",
    "razao_social_identica",
    "fantasia_identica",
    "cnae_identico",
    "contador_identico",
    "endereco_identico",
    "socios_compartilhados",
    "indice_interconexao",
    "perc_cnpjs_com_socios",
    "receita_maxima",
    "acima_limite_sn",
    "indice_risco_c115",
    "nivel_risco_c115_num",
    "total_indicios",
    "indice_risco_indicios",
    "contas_compartilhadas",
    "indice_risco_ccs",
    "nivel_risco_ccs_num",
    "score_inconsistencias_nfe",
    "indice_risco_pagamentos",
    "indice_risco_fat_func",
];

/// Candidate ranges for the hyperparameter sweeps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub k_min: usize,
    pub k_max: usize,
    pub eps_grid: Vec<f64>,
    pub min_samples_grid: Vec<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            eps_grid: vec![0.5, 1.0, 1.5],
            min_samples_grid: vec![3, 5, 10],
        }
    }
}

impl SearchConfig {
    pub fn k_range(&self) -> RangeInclusive<usize> {
        self.k_min..=self.k_max
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: Vec<String>,
    pub min_rows: usize,
    /// Requested PCA output dimensions; clamped to the feature count.
    pub pca_components: usize,
    pub kmeans: KMeansConfig,
    pub dbscan: DbscanConfig,
    pub hierarchical: HierarchicalConfig,
    pub isolation_forest: IsolationForestConfig,
    /// Run the consensus members on the rayon pool.
    pub parallel: bool,
    pub search: SearchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            features: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            min_rows: MIN_ROWS,
            pca_components: 3,
            kmeans: KMeansConfig::default(),
            dbscan: DbscanConfig::default(),
            hierarchical: HierarchicalConfig::default(),
            isolation_forest: IsolationForestConfig::default(),
            parallel: true,
            search: SearchConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that do not depend on the data.
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(EngineError::NoFeatureColumns);
        }
        if self.min_rows == 0 {
            return Err(EngineError::invalid("min_rows", self.min_rows, "must be >= 1"));
        }
        if self.pca_components == 0 {
            return Err(EngineError::invalid(
                "pca_components",
                self.pca_components,
                "must be >= 1",
            ));
        }
        Ok(())
    }

    pub fn consensus(&self) -> ConsensusConfig {
        ConsensusConfig {
            kmeans: self.kmeans.clone(),
            dbscan: self.dbscan.clone(),
            hierarchical: self.hierarchical.clone(),
            isolation_forest: self.isolation_forest.clone(),
            parallel: self.parallel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Linkage;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.features.len(), 21);
        assert_eq!(config.min_rows, 10);
        assert_eq!(config.kmeans.n_clusters, 3);
        assert_eq!(config.kmeans.n_init, 10);
        assert_eq!(config.dbscan.min_samples, 5);
        assert_eq!(config.hierarchical.linkage, Linkage::Ward);
        assert_eq!(config.isolation_forest.n_estimators, 100);
        assert_eq!(config.search.k_range(), 2..=10);
        assert!(config.parallel);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "features": ["qtd_cnpjs", "receita_maxima"],
            "kmeans": {"n_clusters": 4},
            "dbscan": {"eps": 1.2},
            "hierarchical": {"linkage": "average"},
            "parallel": false
        }"#;
        let config = EngineConfig::from_json_str(json).unwrap();

        assert_eq!(config.features, vec!["qtd_cnpjs", "receita_maxima"]);
        assert_eq!(config.kmeans.n_clusters, 4);
        assert_eq!(config.kmeans.max_iter, 300);
        assert_eq!(config.dbscan.eps, 1.2);
        assert_eq!(config.dbscan.min_samples, 5);
        assert_eq!(config.hierarchical.linkage, Linkage::Average);
        assert_eq!(config.isolation_forest.contamination, 0.1);
        assert!(!config.parallel);
        assert!(!config.consensus().parallel);
    }

    #[test]
    fn test_malformed_json() {
        let err = EngineConfig::from_json_str("{\"min_rows\": \"ten\"}").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(EngineConfig::from_json_str(r#"{"pca_components": 0}"#).is_err());
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"features": []}"#).unwrap_err(),
            EngineError::NoFeatureColumns
        ));
    }
}
