//! Clustering algorithms for economic-group profiles.
//!
//! This module provides:
//! - `KMeans`: partitional clustering with k-means++ seeding and restarts
//! - `DBSCAN`: density-based clustering with an explicit noise label
//! - `AgglomerativeClustering`: bottom-up merging, Ward linkage by default
//!
//! Every estimator takes its own config record, validated against the row
//! count before any work starts.
//!
//! # Examples
//!
//! ## K-Means Clustering
//! ```rust
//! use groupscan::{KMeans, KMeansConfig};
//! use ndarray::array;
//!
//! let x = array![
//!     [1.0, 1.0],
//!     [1.5, 2.0],
//!     [3.0, 4.0],
//!     [5.0, 7.0],
//!     [3.5, 5.0],
//!     [4.5, 5.0]
//! ];
//!
//! let mut kmeans = KMeans::new(KMeansConfig::new(2).max_iter(100));
//! let labels = kmeans.fit_predict(&x).unwrap();
//! assert!(labels.iter().all(|&l| l == 0 || l == 1));
//!
//! let inertia = kmeans.inertia.unwrap();
//! assert!(inertia >= 0.0);
//! ```
//!
//! ## DBSCAN Clustering
//! ```rust
//! use groupscan::{DBSCAN, DbscanConfig, NOISE};
//! use ndarray::array;
//!
//! let x = array![
//!     [1.0, 1.0],
//!     [1.2, 1.1],
//!     [1.1, 1.2],
//!     [8.0, 8.0],
//!     [8.1, 8.1],
//!     [8.2, 7.9],
//!     [15.0, 1.0] // Outlier
//! ];
//!
//! let mut dbscan = DBSCAN::new(DbscanConfig::new(1.0, 2));
//! let labels = dbscan.fit_predict(&x).unwrap();
//!
//! assert_eq!(dbscan.get_n_clusters(), Some(2));
//! assert_eq!(labels[6], NOISE);
//! ```
//!
//! ## Ward Clustering
//! ```rust
//! use groupscan::{AgglomerativeClustering, HierarchicalConfig, Linkage};
//! use ndarray::array;
//!
//! let x = array![[0.0, 0.0], [0.2, 0.1], [5.0, 5.0], [5.1, 4.9]];
//!
//! let config = HierarchicalConfig::new(2).linkage(Linkage::Ward);
//! let labels = AgglomerativeClustering::new(config).fit_predict(&x).unwrap();
//! assert_eq!(labels, vec![0, 0, 1, 1]);
//! ```

mod dbscan;
mod hierarchical;
mod kmeans;

pub use dbscan::{DBSCAN, DbscanConfig};
pub use hierarchical::{AgglomerativeClustering, HierarchicalConfig, Linkage, Merge};
pub use kmeans::{KMeans, KMeansConfig};
