//! Packaging of projected coordinates for rendering.

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectionPoint {
    pub entity_id: String,
    pub coords: Vec<f64>,
    pub label: i32,
}

/// Pairs every projected row with its entity id and label, in row order.
/// Coordinates and labels pass through untouched.
pub fn prepare_projection(
    entity_ids: &[String],
    coords: &Matrix,
    labels: &[i32],
) -> Result<Vec<ProjectionPoint>> {
    let n = coords.nrows();
    if entity_ids.len() != n || labels.len() != n {
        return Err(EngineError::DimensionMismatch {
            expected: format!("{n} ids and labels"),
            actual: format!("{} ids, {} labels", entity_ids.len(), labels.len()),
        });
    }

    Ok(entity_ids
        .iter()
        .zip(coords.outer_iter())
        .zip(labels)
        .map(|((id, row), &label)| ProjectionPoint {
            entity_id: id.clone(),
            coords: row.to_vec(),
            label,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::NOISE;
    use crate::testing::entity_ids;
    use ndarray::array;

    #[test]
    fn test_preserves_order_and_values() {
        let coords = array![[1.5, -2.0], [0.0, 0.25], [3.0, 3.0]];
        let ids = entity_ids(3);
        let points = prepare_projection(&ids, &coords, &[1, 0, NOISE]).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].entity_id, "group-000");
        assert_eq!(points[0].coords, vec![1.5, -2.0]);
        assert_eq!(points[2].label, NOISE);
        assert_eq!(points[1].coords, vec![0.0, 0.25]);
    }

    #[test]
    fn test_three_dimensional() {
        let coords = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let points = prepare_projection(&entity_ids(2), &coords, &[0, 0]).unwrap();
        assert!(points.iter().all(|p| p.coords.len() == 3));
    }

    #[test]
    fn test_length_mismatch() {
        let coords = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(prepare_projection(&entity_ids(3), &coords, &[0, 1]).is_err());
        assert!(prepare_projection(&entity_ids(2), &coords, &[0]).is_err());
    }
}
