use std::cmp::Ordering;

use ndarray::Axis;

use crate::error::{EngineError, Result};
use crate::{Matrix, Vector};

const MAX_SWEEPS: usize = 100;

#[derive(Clone, Debug)]
pub struct PCA {
    /// Principal axes, one per row, ordered by decreasing eigenvalue.
    pub components: Option<Matrix>,
    pub explained_variance: Option<Vector>,
    pub explained_variance_ratio: Option<Vector>,
    pub mean: Option<Vector>,
    n_components: usize,
}

impl PCA {
    pub fn new() -> Self {
        Self {
            components: None,
            explained_variance: None,
            explained_variance_ratio: None,
            mean: None,
            n_components: 2,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(EngineError::InsufficientData {
                rows: x.nrows(),
                min_rows: 1,
            });
        }

        let n_features = x.ncols();
        if self.n_components == 0 || self.n_components > n_features {
            return Err(EngineError::invalid(
                "n_components",
                self.n_components,
                format!("must be in [1, {n_features}]"),
            ));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or(EngineError::InsufficientData { rows: 0, min_rows: 1 })?;
        let x_centered = x - &mean.view().insert_axis(Axis(0));

        let denom = (x.nrows().saturating_sub(1)).max(1) as f64;
        let cov = x_centered.t().dot(&x_centered) / denom;

        let (eigenvalues, eigenvectors) = symmetric_eigen(&cov);

        // Stable sort keeps the original axis order among equal eigenvalues.
        let mut order: Vec<usize> = (0..n_features).collect();
        order.sort_by(|&a, &b| {
            eigenvalues[b]
                .partial_cmp(&eigenvalues[a])
                .unwrap_or(Ordering::Equal)
        });

        let total_variance: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();

        let mut components = Matrix::zeros((self.n_components, n_features));
        let mut explained_variance = Vector::zeros(self.n_components);
        for (i, &idx) in order.iter().take(self.n_components).enumerate() {
            let mut axis = eigenvectors.column(idx).to_owned();
            let pivot = axis
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                axis.mapv_inplace(|v| -v);
            }
            components.row_mut(i).assign(&axis);
            explained_variance[i] = eigenvalues[idx].max(0.0);
        }

        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Vector::zeros(self.n_components)
        };

        self.components = Some(components);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);
        self.mean = Some(mean);

        Ok(())
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let (components, mean) = self.fitted()?;

        if x.ncols() != mean.len() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} features", mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let x_centered = x - &mean.view().insert_axis(Axis(0));
        Ok(x_centered.dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn inverse_transform(&self, x: &Matrix) -> Result<Matrix> {
        let (components, mean) = self.fitted()?;

        if x.ncols() != components.nrows() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} components", components.nrows()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        Ok(x.dot(components) + &mean.view().insert_axis(Axis(0)))
    }

    /// Fraction of total variance captured by the selected components.
    pub fn explained_variance_fraction(&self) -> Option<f64> {
        self.explained_variance_ratio.as_ref().map(|r| r.sum())
    }

    fn fitted(&self) -> Result<(&Matrix, &Vector)> {
        match (self.components.as_ref(), self.mean.as_ref()) {
            (Some(components), Some(mean)) => Ok((components, mean)),
            _ => Err(EngineError::Config("PCA not fitted. Call fit() first.".to_string())),
        }
    }
}

impl Default for PCA {
    fn default() -> Self {
        Self::new()
    }
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
///
/// Returns eigenvalues in diagonal order and the matching eigenvectors as columns.
fn symmetric_eigen(matrix: &Matrix) -> (Vector, Matrix) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Matrix::eye(n);

    let scale = a.iter().map(|x| x * x).sum::<f64>().sqrt().max(f64::MIN_POSITIVE);

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in 0..n {
                if p != q {
                    off += a[[p, q]] * a[[p, q]];
                }
            }
        }
        if off.sqrt() <= 1e-14 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pca_basic() {
        let x = array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 7.0],
            [7.0, 8.0, 8.0],
            [10.0, 11.0, 13.0]
        ];

        let mut pca = PCA::new().n_components(2);
        let transformed = pca.fit_transform(&x).unwrap();

        assert_eq!(transformed.shape(), &[4, 2]);
        assert!(pca.components.is_some());
        assert!(pca.explained_variance.is_some());
        assert!(pca.mean.is_some());

        // Components are orthonormal
        let components = pca.components.as_ref().unwrap();
        let gram = components.dot(&components.t());
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_pca_reconstruction() {
        let x = array![[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];

        let mut pca = PCA::new().n_components(2);
        let transformed = pca.fit_transform(&x).unwrap();
        let reconstructed = pca.inverse_transform(&transformed).unwrap();

        let diff = &x - &reconstructed;
        let max_error = diff.mapv(|x| x.abs()).into_iter().fold(0.0, f64::max);
        assert!(max_error < 1e-10);
    }

    #[test]
    fn test_pca_explained_variance() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];

        let mut pca = PCA::new().n_components(1);
        pca.fit(&x).unwrap();

        // All variance lies on the diagonal direction
        assert!((pca.explained_variance_fraction().unwrap() - 1.0).abs() < 1e-10);
        let axis = pca.components.as_ref().unwrap().row(0).to_owned();
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((axis[0] - h).abs() < 1e-9 && (axis[1] - h).abs() < 1e-9);
    }

    #[test]
    fn test_pca_orders_by_eigenvalue() {
        // Second axis carries far more variance than the first
        let x = array![[0.0, -10.0], [1.0, 10.0], [0.0, 20.0], [1.0, -20.0]];
        let mut pca = PCA::new().n_components(2);
        pca.fit(&x).unwrap();

        let variance = pca.explained_variance.as_ref().unwrap();
        assert!(variance[0] > variance[1]);
        let first = pca.components.as_ref().unwrap().row(0).to_owned();
        assert!(first[1].abs() > 0.99);
    }

    #[test]
    fn test_pca_ties_keep_axis_order() {
        let x = array![[1.0, 0.0], [-1.0, 0.0], [0.0, 1.0], [0.0, -1.0]];
        let mut pca = PCA::new().n_components(2);
        pca.fit(&x).unwrap();

        let components = pca.components.as_ref().unwrap();
        assert!((components[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((components[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pca_deterministic() {
        let x = array![[1.0, 5.0, 2.0], [2.0, 3.0, 9.0], [4.0, 1.0, 3.0], [3.0, 3.0, 3.0]];
        let a = PCA::new().n_components(3).fit_transform(&x).unwrap();
        let b = PCA::new().n_components(3).fit_transform(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pca_invalid_components() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(PCA::new().n_components(5).fit(&x).is_err());
        assert!(PCA::new().n_components(0).fit(&x).is_err());
    }

    #[test]
    fn test_pca_transform_without_fit() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(PCA::new().transform(&x).is_err());
    }

    #[test]
    fn test_pca_dimension_mismatch() {
        let x_train = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [1.0, 0.0, 2.0]];
        let x_test = array![[1.0, 2.0], [3.0, 4.0]];

        let mut pca = PCA::new();
        pca.fit(&x_train).unwrap();

        assert!(pca.transform(&x_test).is_err());
    }

    #[test]
    fn test_pca_constant_data() {
        let x = array![[2.0, 2.0], [2.0, 2.0], [2.0, 2.0]];
        let mut pca = PCA::new().n_components(2);
        let projected = pca.fit_transform(&x).unwrap();
        assert_eq!(pca.explained_variance_fraction(), Some(0.0));
        assert!(projected.iter().all(|&v| v == 0.0));
    }
}
