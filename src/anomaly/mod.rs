//! Anomaly scoring.
//!
//! `IsolationForest` grows randomized partition trees over subsamples of the
//! standardized matrix; points that isolate in few splits score high and the
//! top `contamination` share is flagged.
//!
//! # Examples
//!
//! ```rust
//! use groupscan::{IsolationForest, IsolationForestConfig, ANOMALY};
//! use ndarray::array;
//!
//! let x = array![
//!     [0.0, 0.1], [0.1, 0.0], [0.2, 0.1], [0.1, 0.2], [0.0, 0.0],
//!     [0.2, 0.2], [0.1, 0.1], [0.15, 0.05], [0.05, 0.15], [50.0, 50.0]
//! ];
//!
//! let mut forest = IsolationForest::new(IsolationForestConfig::new(0.1));
//! let outcome = forest.fit_predict(&x).unwrap();
//! assert_eq!(outcome.n_anomalies, 1);
//! assert_eq!(outcome.labels[9], ANOMALY);
//! ```

mod isolation_forest;

pub use isolation_forest::{IsolationForest, IsolationForestConfig};
