//! Dimensionality reduction.
//!
//! `PCA` projects standardized group vectors onto their top variance axes so
//! clusters can be drawn in two or three dimensions.
//!
//! # Examples
//!
//! ```rust
//! use groupscan::PCA;
//! use ndarray::array;
//!
//! let x = array![
//!     [1.0, 2.0, 3.0],
//!     [4.0, 5.0, 7.0],
//!     [7.0, 8.0, 8.0],
//!     [2.0, 1.0, 0.0]
//! ];
//!
//! let mut pca = PCA::new().n_components(2);
//! let transformed = pca.fit_transform(&x).unwrap();
//! assert_eq!(transformed.ncols(), 2);
//!
//! let captured = pca.explained_variance_fraction().unwrap();
//! assert!(captured > 0.0 && captured <= 1.0 + 1e-12);
//! ```

mod pca;

pub use pca::PCA;
