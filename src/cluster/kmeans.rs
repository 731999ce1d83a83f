use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::squared_euclidean;
use crate::error::{EngineError, Result};
use crate::Matrix;

const ALGORITHM: &str = "K-Means";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    /// Independent restarts; the lowest-inertia run wins.
    pub n_init: usize,
    pub max_iter: usize,
    /// Largest centroid shift still counted as movement.
    pub tolerance: f64,
    pub random_state: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            random_state: 42,
        }
    }
}

impl KMeansConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
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
        if self.n_init == 0 {
            return Err(EngineError::invalid("n_init", self.n_init, "must be >= 1"));
        }
        if self.max_iter == 0 {
            return Err(EngineError::invalid("max_iter", self.max_iter, "must be >= 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(EngineError::invalid(
                "tolerance",
                self.tolerance,
                "must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct KMeans {
    pub cluster_centers: Option<Matrix>,
    pub labels: Option<Vec<i32>>,
    pub inertia: Option<f64>,
    pub n_iter: Option<usize>,
    config: KMeansConfig,
}

struct Run {
    centroids: Matrix,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self {
            cluster_centers: None,
            labels: None,
            inertia: None,
            n_iter: None,
            config,
        }
    }

    pub fn config(&self) -> &KMeansConfig {
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

        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let mut best: Option<Run> = None;

        for restart in 0..self.config.n_init {
            let run = self.single_run(x, &mut rng);
            debug!(restart, inertia = run.inertia, n_iter = run.n_iter, "k-means restart finished");
            // Strict comparison keeps the first of equally good restarts.
            if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        let best = best.ok_or_else(|| EngineError::degenerate(ALGORITHM, "no restart ran"))?;

        let mut used = vec![false; self.config.n_clusters];
        for &label in &best.labels {
            used[label] = true;
        }
        let non_empty = used.iter().filter(|&&u| u).count();
        if non_empty < self.config.n_clusters {
            return Err(EngineError::degenerate(
                ALGORITHM,
                format!(
                    "only {non_empty} of {} clusters are non-empty; the data has too few distinct points",
                    self.config.n_clusters
                ),
            ));
        }

        self.cluster_centers = Some(best.centroids);
        self.labels = Some(best.labels.iter().map(|&l| l as i32).collect());
        self.inertia = Some(best.inertia);
        self.n_iter = Some(best.n_iter);

        Ok(())
    }

    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Vec<i32>> {
        self.fit(x)?;
        self.labels
            .clone()
            .ok_or_else(|| EngineError::degenerate(ALGORITHM, "fit produced no labels"))
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<i32>> {
        let centroids = self.fitted_centers(x)?;
        Ok((0..x.nrows())
            .map(|i| nearest_centroid(x, i, centroids).0 as i32)
            .collect())
    }

    /// Euclidean distance from every row to every centroid.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let centroids = self.fitted_centers(x)?;
        Ok(Matrix::from_shape_fn((x.nrows(), centroids.nrows()), |(i, k)| {
            squared_euclidean(x.row(i), centroids.row(k)).sqrt()
        }))
    }

    fn fitted_centers(&self, x: &Matrix) -> Result<&Matrix> {
        let centroids = self
            .cluster_centers
            .as_ref()
            .ok_or_else(|| EngineError::Config("KMeans not fitted. Call fit() first.".to_string()))?;

        if x.ncols() != centroids.ncols() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} features", centroids.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(centroids)
    }

    fn single_run(&self, x: &Matrix, rng: &mut StdRng) -> Run {
        let mut centroids = self.initialize_centroids(x, rng);
        let mut labels = vec![usize::MAX; x.nrows()];
        let mut n_iter = 0;

        for iteration in 0..self.config.max_iter {
            n_iter = iteration + 1;

            let changed = assign(x, &centroids, &mut labels);
            if changed == 0 {
                break;
            }

            let updated = update_centroids(x, &labels, &centroids);
            let shift = max_centroid_shift(&centroids, &updated);
            centroids = updated;
            if shift < self.config.tolerance {
                break;
            }
        }

        // Final pass so labels agree with the returned centroids.
        assign(x, &centroids, &mut labels);
        let inertia = (0..x.nrows())
            .map(|i| squared_euclidean(x.row(i), centroids.row(labels[i])))
            .sum();

        Run {
            centroids,
            labels,
            inertia,
            n_iter,
        }
    }

    /// k-means++ seeding: each new centroid is drawn with probability
    /// proportional to its squared distance from the nearest chosen one.
    fn initialize_centroids(&self, x: &Matrix, rng: &mut StdRng) -> Matrix {
        let n = x.nrows();
        let k = self.config.n_clusters;
        let mut centroids = Matrix::zeros((k, x.ncols()));

        let first = rng.gen_range(0..n);
        centroids.row_mut(0).assign(&x.row(first));

        let mut closest: Vec<f64> = (0..n)
            .map(|i| squared_euclidean(x.row(i), centroids.row(0)))
            .collect();

        for c in 1..k {
            let idx = match WeightedIndex::new(&closest) {
                Ok(weights) => weights.sample(rng),
                // Every point coincides with a chosen centroid.
                Err(_) => rng.gen_range(0..n),
            };
            centroids.row_mut(c).assign(&x.row(idx));

            for (i, d) in closest.iter_mut().enumerate() {
                *d = d.min(squared_euclidean(x.row(i), centroids.row(c)));
            }
        }

        centroids
    }
}

fn nearest_centroid(x: &Matrix, i: usize, centroids: &Matrix) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for k in 0..centroids.nrows() {
        let d = squared_euclidean(x.row(i), centroids.row(k));
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

/// Assigns every row to its nearest centroid and returns how many labels changed.
fn assign(x: &Matrix, centroids: &Matrix, labels: &mut [usize]) -> usize {
    let mut changed = 0;
    for (i, label) in labels.iter_mut().enumerate() {
        let (closest, _) = nearest_centroid(x, i, centroids);
        if *label != closest {
            *label = closest;
            changed += 1;
        }
    }
    changed
}

fn update_centroids(x: &Matrix, labels: &[usize], previous: &Matrix) -> Matrix {
    let k = previous.nrows();
    let mut sums = Matrix::zeros(previous.raw_dim());
    let mut counts = vec![0usize; k];

    for (i, &label) in labels.iter().enumerate() {
        let mut row = sums.row_mut(label);
        row += &x.row(i);
        counts[label] += 1;
    }

    let mut centroids = previous.clone();
    let mut taken = vec![false; x.nrows()];
    for c in 0..k {
        if counts[c] > 0 {
            let mean = &sums.row(c) / counts[c] as f64;
            centroids.row_mut(c).assign(&mean);
        } else {
            // Move an empty cluster onto the point worst served by its centroid.
            let far = (0..x.nrows())
                .filter(|&i| !taken[i])
                .map(|i| (i, squared_euclidean(x.row(i), previous.row(labels[i]))))
                .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                    Some((_, bd)) if bd >= d => best,
                    _ => Some((i, d)),
                });
            if let Some((i, _)) = far {
                taken[i] = true;
                centroids.row_mut(c).assign(&x.row(i));
            }
        }
    }
    centroids
}

fn max_centroid_shift(old: &Matrix, new: &Matrix) -> f64 {
    (0..old.nrows())
        .map(|k| squared_euclidean(old.row(k), new.row(k)).sqrt())
        .fold(0.0, f64::max)
}
