//! # hubness-rs (hubness aware k-nearest neighbors)
//!
//! In high dimensional data some points, the *hubs*, occur in the k-nearest neighbor lists of
//! very many other points while others, the *anti-hubs*, occur in none. This crate computes the
//! neighbor sets and occurrence statistics of a dataset, and the secondary distances that
//! reduce hubness.
//!
//! For more information on the subject see:
//! * [Hubs in space](https://www.jmlr.org/papers/volume11/radovanovic10a/radovanovic10a.pdf)
//! * [Local and global scaling reduce hubs in space](https://www.jmlr.org/papers/volume13/schnitzer12a/schnitzer12a.pdf)
//!
//! ## Getting started
//!
//! ```rust
//! use hubness_rs::prelude::*;
//!
//! let points = vec![vec![0., 0.], vec![0., 1.], vec![1., 0.], vec![5., 5.]];
//! let ds = Dataset::from_dense(&points, &[0, 0, 1, 1]).unwrap();
//! let metric = CombinedMetric::by_name("euclidean").unwrap();
//!
//! // One time expensive all pairs computation.
//! let mut nsf = NeighborSetFinder::from_dataset(&ds).threads(2);
//! nsf.calculate_distances(&ds, &metric).unwrap();
//! nsf.calculate_neighbor_sets(2).unwrap();
//!
//! let stats = HubnessStats::from_finder(&nsf).unwrap();
//! assert_eq!(stats.k, 2);
//! ```
//!
//! ## Smaller neighborhoods
//! Neighbor lists are sorted, so the statistics for any smaller `k` follow from the prefixes.
//! ```rust
//! # use hubness_rs::prelude::*;
//! # let ds = Dataset::from_dense(&[vec![0.], vec![1.], vec![3.]], &[0, 1, 1]).unwrap();
//! # let metric = CombinedMetric::by_name("euclidean").unwrap();
//! # let mut nsf = NeighborSetFinder::from_dataset(&ds);
//! # nsf.calculate_distances(&ds, &metric).unwrap();
//! nsf.calculate_neighbor_sets(2).unwrap();
//! nsf.recalculate_stats_for_smaller_k(1).unwrap();
//! ```
//!
//! ## Secondary distances
//! ```rust
//! # use hubness_rs::prelude::*;
//! # let ds = Dataset::from_dense(&[vec![0.], vec![1.], vec![3.]], &[0, 1, 1]).unwrap();
//! # let metric = CombinedMetric::by_name("euclidean").unwrap();
//! # let mut nsf = NeighborSetFinder::from_dataset(&ds);
//! # nsf.calculate_distances(&ds, &metric).unwrap();
//! # nsf.calculate_neighbor_sets(2).unwrap();
//! let mp = MutualProximity::new().transform(&nsf).unwrap();
//! let ls = LocalScaling::new(1).transform(&nsf).unwrap();
//! ```
//!
//! ## BLAS support
//! The cosine metric runs on `ndarray`. Install `hubness-rs` w/ the `"blas"` feature to have
//! it use a BLAS backend.
#[cfg(feature = "blas")]
extern crate blas_src;
extern crate ndarray;
pub mod condition;
pub mod data;
mod error;
pub mod io;
mod matrix;
pub mod metric;
mod neighbors {
    pub mod finder;
    mod test;
}
pub mod prelude;
mod shared;
pub mod secondary;
pub mod stats;
pub mod utils;

pub use data::{Dataset, Instance, Normalization};
pub use error::Error;
pub use matrix::DistanceMatrix;
pub use neighbors::finder::NeighborSetFinder;
pub use secondary::{LocalScaling, MutualProximity, Nicdm, SecondaryDistance};
pub use shared::{SharedNeighborFinder, Weighting};

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::data::Dataset;
    use crate::metric::CombinedMetric;
    use crate::utils::create_rng;
    use crate::NeighborSetFinder;
    use rand::Rng;
    use rand_distr::StandardNormal;

    /// Gaussian points, labels assigned round robin.
    pub fn random_dataset(n: usize, dim: usize, n_classes: usize, seed: u64) -> Dataset {
        let mut rng = create_rng(seed);
        let points: Vec<Vec<f32>> = (0..n)
            .map(|_| (0..dim).map(|_| rng.sample(StandardNormal)).collect())
            .collect();
        let labels: Vec<i32> = (0..n).map(|i| (i % n_classes.max(1)) as i32).collect();
        Dataset::from_dense(&points, &labels).unwrap()
    }

    /// Finder w/ euclidean distances and neighbor sets of size `k`.
    pub fn random_finder(
        n: usize,
        dim: usize,
        n_classes: usize,
        k: usize,
        seed: u64,
    ) -> NeighborSetFinder {
        let ds = random_dataset(n, dim, n_classes, seed);
        let metric = CombinedMetric::by_name("euclidean").unwrap();
        let mut nsf = NeighborSetFinder::from_dataset(&ds).threads(2);
        nsf.calculate_distances(&ds, &metric).unwrap();
        nsf.calculate_neighbor_sets(k).unwrap();
        nsf
    }
}
