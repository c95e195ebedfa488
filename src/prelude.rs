//! Re-export of the public api of hubness-rs.
pub use crate::{
    condition::{ExperimentCondition, ExperimentConfig, SecondaryKind},
    data::{Dataset, FeatureSchema, Instance, Normalization, SparseVector},
    io::{DistanceCache, MatrixCacheKey},
    matrix::DistanceMatrix,
    metric::{CombinedMetric, Combination, Kernel, Metric},
    neighbors::finder::NeighborSetFinder,
    secondary::{LocalScaling, MutualProximity, Nicdm, SecondaryDistance, SharedNeighborDistance},
    shared::{SharedNeighborFinder, Weighting},
    stats::HubnessStats,
    Error, Result,
};
