//! Shared fixtures for unit tests.

use ndarray::{Array, Axis, array, concatenate};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::Matrix;

/// Twenty 2-D points: rows 0..10 jittered around (0, 0), rows 10..20 around (10, 10).
pub(crate) fn two_blobs() -> Matrix {
    let mut rng = StdRng::seed_from_u64(7);
    let jitter = Uniform::new(-0.5, 0.5);
    let first = Array::random_using((10, 2), jitter, &mut rng);
    let second = Array::random_using((10, 2), jitter, &mut rng) + 10.0;
    concatenate![Axis(0), first, second]
}

/// The two blobs plus one far outlier at (1000, 1000) in the last row.
pub(crate) fn blobs_with_outlier() -> Matrix {
    concatenate![Axis(0), two_blobs(), array![[1000.0, 1000.0]]]
}

/// Ground-truth blob membership for [`two_blobs`].
pub(crate) fn blob_truth() -> Vec<usize> {
    (0..20).map(|i| i / 10).collect()
}

pub(crate) fn entity_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("group-{i:03}")).collect()
}

/// True when both label vectors describe the same partition up to renaming.
pub(crate) fn same_partition(a: &[i32], b: &[usize]) -> bool {
    a.len() == b.len()
        && (0..a.len()).all(|i| (0..a.len()).all(|j| (a[i] == a[j]) == (b[i] == b[j])))
}
