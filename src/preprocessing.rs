use ndarray::Axis;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::{Matrix, Vector};

/// Minimum number of complete rows needed before any algorithm runs.
pub const MIN_ROWS: usize = 10;

/// Upstream table as handed over by the data-loading layer.
///
/// Missing cells are `None`; a row is kept only if every selected column is
/// present and finite.
#[derive(Clone, Debug, Default)]
pub struct RawTable {
    columns: Vec<String>,
    entity_ids: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl RawTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            entity_ids: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(
        &mut self,
        entity_id: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} columns", self.columns.len()),
                actual: format!("{} values", values.len()),
            });
        }
        self.entity_ids.push(entity_id.into());
        self.rows.push(values);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Per-column centering and scaling fitted once on the cleaned matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardizationParams {
    pub mean: Vector,
    /// Population standard deviation, with zero-variance columns replaced by 1.
    pub scale: Vector,
    pub constant: Vec<bool>,
}

impl StandardizationParams {
    pub fn fit(x: &Matrix) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(EngineError::InsufficientData {
                rows: x.nrows(),
                min_rows: 1,
            });
        }

        let mut mean = x
            .mean_axis(Axis(0))
            .ok_or(EngineError::InsufficientData { rows: 0, min_rows: 1 })?;
        let mut scale = x.std_axis(Axis(0), 0.0);
        let mut constant = vec![false; x.ncols()];

        for j in 0..x.ncols() {
            if scale[j] <= 1e-12 * mean[j].abs().max(1.0) {
                // Center on the shared value itself so the column becomes exactly zero.
                mean[j] = x[[0, j]];
                scale[j] = 1.0;
                constant[j] = true;
            }
        }

        Ok(Self {
            mean,
            scale,
            constant,
        })
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        if x.ncols() != self.mean.len() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} features", self.mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut result = x.clone();
        for mut row in result.axis_iter_mut(Axis(0)) {
            row -= &self.mean;
            row /= &self.scale;
        }
        Ok(result)
    }

    pub fn inverse_transform(&self, x: &Matrix) -> Result<Matrix> {
        if x.ncols() != self.mean.len() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{} features", self.mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut result = x.clone();
        for mut row in result.axis_iter_mut(Axis(0)) {
            row *= &self.scale;
            row += &self.mean;
        }
        Ok(result)
    }
}

/// Cleaned, standardized feature matrix keyed by entity id.
#[derive(Clone, Debug)]
pub struct FeatureMatrix {
    pub entity_ids: Vec<String>,
    pub columns: Vec<String>,
    pub raw: Matrix,
    pub standardized: Matrix,
    pub params: StandardizationParams,
    pub dropped_rows: usize,
}

impl FeatureMatrix {
    /// Standardizes an already-clean matrix.
    pub fn from_matrix(entity_ids: Vec<String>, columns: Vec<String>, raw: Matrix) -> Result<Self> {
        if entity_ids.len() != raw.nrows() || columns.len() != raw.ncols() {
            return Err(EngineError::DimensionMismatch {
                expected: format!("{}x{}", entity_ids.len(), columns.len()),
                actual: format!("{}x{}", raw.nrows(), raw.ncols()),
            });
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::Config(
                "feature matrix contains non-finite values".to_string(),
            ));
        }

        let params = StandardizationParams::fit(&raw)?;
        let standardized = params.transform(&raw)?;

        Ok(Self {
            entity_ids,
            columns,
            raw,
            standardized,
            params,
            dropped_rows: 0,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.standardized.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.standardized.ncols()
    }
}

/// Selects the feature columns, drops incomplete rows and standardizes.
#[derive(Clone, Debug)]
pub struct FeatureMatrixBuilder {
    candidates: Vec<String>,
    min_rows: usize,
}

impl FeatureMatrixBuilder {
    pub fn new<S: Into<String>>(candidates: impl IntoIterator<Item = S>) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            min_rows: MIN_ROWS,
        }
    }

    pub fn min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows.max(1);
        self
    }

    pub fn build(&self, table: &RawTable) -> Result<FeatureMatrix> {
        let selected: Vec<(String, usize)> = self
            .candidates
            .iter()
            .filter_map(|name| table.column_index(name).map(|idx| (name.clone(), idx)))
            .collect();

        if selected.is_empty() {
            return Err(EngineError::NoFeatureColumns);
        }

        let mut entity_ids = Vec::with_capacity(table.n_rows());
        let mut values = Vec::with_capacity(table.n_rows() * selected.len());

        'rows: for (id, row) in table.entity_ids.iter().zip(&table.rows) {
            let start = values.len();
            for &(_, idx) in &selected {
                match row[idx] {
                    Some(v) if v.is_finite() => values.push(v),
                    _ => {
                        values.truncate(start);
                        continue 'rows;
                    }
                }
            }
            entity_ids.push(id.clone());
        }

        let dropped_rows = table.n_rows() - entity_ids.len();
        if dropped_rows > 0 {
            warn!(dropped_rows, "dropped rows with missing feature values");
        }

        if entity_ids.len() < self.min_rows {
            return Err(EngineError::InsufficientData {
                rows: entity_ids.len(),
                min_rows: self.min_rows,
            });
        }

        let raw = Matrix::from_shape_vec((entity_ids.len(), selected.len()), values).map_err(
            |e| EngineError::DimensionMismatch {
                expected: format!("{}x{}", entity_ids.len(), selected.len()),
                actual: e.to_string(),
            },
        )?;
        let columns = selected.into_iter().map(|(name, _)| name).collect();

        let mut matrix = FeatureMatrix::from_matrix(entity_ids, columns, raw)?;
        matrix.dropped_rows = dropped_rows;

        debug!(
            rows = matrix.n_rows(),
            features = matrix.n_features(),
            "feature matrix standardized"
        );
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    fn table_with_gaps() -> RawTable {
        let mut table = RawTable::new(["a", "b", "label"]);
        for i in 0..12 {
            let b = if i == 3 { None } else { Some(i as f64 * 2.0) };
            table.push_row(format!("g{i}"), vec![Some(i as f64), b, Some(1.0)]).unwrap();
        }
        table
            .push_row("nan", vec![Some(f64::NAN), Some(1.0), Some(1.0)])
            .unwrap();
        table
    }

    #[test]
    fn test_builder_drops_incomplete_rows() {
        let table = table_with_gaps();
        let matrix = FeatureMatrixBuilder::new(["a", "b", "missing"])
            .build(&table)
            .unwrap();

        assert_eq!(matrix.columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(matrix.n_rows(), 11);
        assert_eq!(matrix.dropped_rows, 2);
        assert!(!matrix.entity_ids.contains(&"g3".to_string()));
        assert!(!matrix.entity_ids.contains(&"nan".to_string()));
        assert_eq!(matrix.entity_ids[0], "g0");
    }

    #[test]
    fn test_builder_insufficient_rows() {
        let table = table_with_gaps();
        let err = FeatureMatrixBuilder::new(["a", "b"])
            .min_rows(20)
            .build(&table)
            .unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { rows: 11, min_rows: 20 });
    }

    #[test]
    fn test_builder_no_columns() {
        let table = table_with_gaps();
        let err = FeatureMatrixBuilder::new(["x", "y"]).build(&table).unwrap_err();
        assert_eq!(err, EngineError::NoFeatureColumns);
    }

    #[test]
    fn test_push_row_dimension_mismatch() {
        let mut table = RawTable::new(["a", "b"]);
        assert!(table.push_row("x", vec![Some(1.0)]).is_err());
    }

    #[test]
    fn test_constant_column_becomes_zero() {
        let x = array![[0.1, 1.0], [0.1, 2.0], [0.1, 3.0]];
        let params = StandardizationParams::fit(&x).unwrap();
        let scaled = params.transform(&x).unwrap();

        assert!(params.constant[0]);
        assert!(!params.constant[1]);
        for i in 0..3 {
            assert_eq!(scaled[[i, 0]], 0.0);
        }
    }

    #[test]
    fn test_inverse_transform() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [4.0, 25.0]];
        let params = StandardizationParams::fit(&x).unwrap();
        let back = params.inverse_transform(&params.transform(&x).unwrap()).unwrap();
        let max_err = (&back - &x).mapv(f64::abs).fold(0.0_f64, |a, &b| a.max(b));
        assert!(max_err < 1e-10);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_standardized_columns_have_zero_mean_unit_std(
            rows in 2usize..40,
            seed in proptest::collection::vec(-1000.0f64..1000.0, 120),
            constant in -50.0f64..50.0,
        ) {
            let x = Matrix::from_shape_fn((rows, 3), |(i, j)| match j {
                0 => seed[i],
                1 => seed[i + 40] * 0.001 + seed[(i * 7) % 120],
                _ => constant,
            });
            let params = StandardizationParams::fit(&x).unwrap();
            let scaled = params.transform(&x).unwrap();
            let means = scaled.mean_axis(Axis(0)).unwrap();
            let stds = scaled.std_axis(Axis(0), 0.0);

            for j in 0..3 {
                prop_assert!(means[j].abs() < 1e-9, "column {} mean {}", j, means[j]);
                if params.constant[j] {
                    prop_assert!(scaled.column(j).iter().all(|&v| v == 0.0));
                } else {
                    prop_assert!((stds[j] - 1.0).abs() < 1e-9, "column {} std {}", j, stds[j]);
                }
            }
            prop_assert!(params.constant[2]);
        }
    }
}
