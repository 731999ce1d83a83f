use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::squared_euclidean;
use crate::error::{EngineError, Result};
use crate::Matrix;

/// Merge rule between two clusters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Minimum increase in total within-cluster variance.
    #[default]
    Ward,
    Complete,
    Average,
    Single,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalConfig {
    pub n_clusters: usize,
    pub linkage: Linkage,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            linkage: Linkage::Ward,
        }
    }
}

impl HierarchicalConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    pub fn linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn validate(&self, n_rows: usize) -> Result<()> {
        if self.n_clusters == 0 || self.n_clusters >= n_rows {
            return Err(EngineError::invalid(
                "n_clusters",
                self.n_clusters,
                format!("must be in [1, {n_rows}) for {n_rows} rows"),
            ));
        }
        Ok(())
    }
}

/// One step of the dendrogram. Ids below `n_samples` are original points,
/// merged clusters get `n_samples + step`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    /// Linkage distance; for Ward the increase in within-cluster sum of squares.
    pub cost: f64,
    pub size: usize,
}

#[derive(Clone, Debug)]
pub struct AgglomerativeClustering {
    pub labels: Option<Vec<i32>>,
    pub merges: Option<Vec<Merge>>,
    config: HierarchicalConfig,
}

struct Cluster {
    id: usize,
    size: usize,
    members: Vec<usize>,
}

impl AgglomerativeClustering {
    pub fn new(config: HierarchicalConfig) -> Self {
        Self {
            labels: None,
            merges: None,
            config,
        }
    }

    pub fn config(&self) -> &HierarchicalConfig {
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

        let n = x.nrows();
        let linkage = self.config.linkage;

        // Active clusters stay ordered by formation id, so a strict minimum
        // scan prefers the earliest-formed pair on ties.
        let mut active: Vec<Cluster> = (0..n)
            .map(|i| Cluster {
                id: i,
                size: 1,
                members: vec![i],
            })
            .collect();

        let mut dist = Matrix::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d2 = squared_euclidean(x.row(i), x.row(j));
                let d = match linkage {
                    Linkage::Ward => d2 / 2.0,
                    _ => d2.sqrt(),
                };
                dist[[i, j]] = d;
                dist[[j, i]] = d;
            }
        }
        // `slot[k]` is the distance-matrix row owned by `active[k]`.
        let mut slot: Vec<usize> = (0..n).collect();

        let mut merges = Vec::with_capacity(n - self.config.n_clusters);
        while active.len() > self.config.n_clusters {
            let mut best = (0, 1, f64::INFINITY);
            for a in 0..active.len() {
                for b in (a + 1)..active.len() {
                    let d = dist[[slot[a], slot[b]]];
                    if d < best.2 {
                        best = (a, b, d);
                    }
                }
            }
            let (a, b, cost) = best;

            let (sa, sb) = (slot[a], slot[b]);
            let (na, nb) = (active[a].size as f64, active[b].size as f64);
            for k in 0..active.len() {
                if k == a || k == b {
                    continue;
                }
                let sk = slot[k];
                let (dka, dkb) = (dist[[sk, sa]], dist[[sk, sb]]);
                let updated = match linkage {
                    Linkage::Ward => {
                        let nk = active[k].size as f64;
                        ((nk + na) * dka + (nk + nb) * dkb - nk * cost) / (nk + na + nb)
                    }
                    Linkage::Complete => dka.max(dkb),
                    Linkage::Average => (na * dka + nb * dkb) / (na + nb),
                    Linkage::Single => dka.min(dkb),
                };
                dist[[sk, sa]] = updated;
                dist[[sa, sk]] = updated;
            }

            let right = active.remove(b);
            slot.remove(b);
            let mut left = active.remove(a);
            slot.remove(a);

            merges.push(Merge {
                left: left.id,
                right: right.id,
                cost: cost.max(0.0),
                size: left.size + right.size,
            });

            left.id = n + merges.len() - 1;
            left.size += right.size;
            left.members.extend(right.members);
            active.push(left);
            slot.push(sa);
        }

        debug!(
            merges = merges.len(),
            clusters = active.len(),
            ?linkage,
            "agglomerative merging finished"
        );

        // Number clusters by the first row that belongs to each.
        let mut owner = vec![0usize; n];
        for (k, cluster) in active.iter().enumerate() {
            for &m in &cluster.members {
                owner[m] = k;
            }
        }
        let mut relabel = vec![None; active.len()];
        let mut next = 0;
        let labels = owner
            .iter()
            .map(|&k| {
                *relabel[k].get_or_insert_with(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();

        self.labels = Some(labels);
        self.merges = Some(merges);

        Ok(())
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Vec<i32>> {
        self.fit(x)?;
        self.labels
            .clone()
            .ok_or_else(|| EngineError::degenerate("Hierarchical", "fit produced no labels"))
    }
}
