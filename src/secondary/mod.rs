//! Secondary distances: a primary distance matrix rescaled with the local distance statistics
//! of every point, to counter the concentration of distances in high dimensional data.
use crate::matrix::DistanceMatrix;
use crate::neighbors::finder::NeighborSetFinder;
use crate::shared::{SharedNeighborFinder, Weighting};
use crate::utils::fork_join;
use crate::{Error, Result};

pub mod local_scaling;
pub mod mutual_proximity;
pub mod nicdm;

pub use local_scaling::LocalScaling;
pub use mutual_proximity::MutualProximity;
pub use nicdm::Nicdm;

/// Transforms the primary distances held by a [`NeighborSetFinder`] into a new matrix.
/// Smaller is closer in the output as well.
pub trait SecondaryDistance: Send + Sync {
    fn transform(&self, nsf: &NeighborSetFinder) -> Result<DistanceMatrix>;
    fn name(&self) -> String;
}

/// Shared neighbor distance as a secondary distance. Uses the neighbor sets of the finder.
#[derive(Debug, Clone, Copy)]
pub struct SharedNeighborDistance {
    pub weighting: Weighting,
    pub n_threads: usize,
}

impl SecondaryDistance for SharedNeighborDistance {
    fn transform(&self, nsf: &NeighborSetFinder) -> Result<DistanceMatrix> {
        let mut snf = SharedNeighborFinder::new(nsf)
            .weighting(self.weighting)
            .threads(self.n_threads);
        snf.count_shared_neighbors()?;
        snf.to_distance_matrix()
    }

    fn name(&self) -> String {
        match self.weighting {
            Weighting::None => "snn".to_string(),
            Weighting::Hubness { theta } => format!("simhub-in:{}", theta),
            Weighting::Purity { theta } => format!("simhub-pur:{}", theta),
        }
    }
}

/// Fill a new upper triangular matrix with `f(i, j, d(i, j))`, rows split over the workers.
/// A non finite output fails the whole transform.
pub(crate) fn map_pairs<F>(
    dm: &DistanceMatrix,
    n_threads: usize,
    f: F,
) -> Result<DistanceMatrix>
where
    F: Fn(usize, usize, f32) -> f32 + Send + Sync,
{
    let n = dm.len();
    let chunks = fork_join(n, n_threads, |range| {
        range
            .map(|i| {
                dm.row(i)
                    .iter()
                    .enumerate()
                    .map(|(o, &d)| {
                        let j = i + o + 1;
                        let value = f(i, j, d);
                        if value.is_finite() {
                            Ok(value)
                        } else {
                            Err(Error::NonFiniteDistance { i, j, value })
                        }
                    })
                    .collect::<Result<Vec<f32>>>()
            })
            .collect::<Result<Vec<_>>>()
    })?;
    DistanceMatrix::from_rows(chunks.into_iter().flat_map(|(_, rows)| rows).collect())
}

/// The primary distances of `nsf` and a check that its neighbor lists hold at least `k` entries.
pub(crate) fn distances_and_k(nsf: &NeighborSetFinder, k: usize) -> Result<&DistanceMatrix> {
    let dm = nsf.distances().ok_or(Error::MissingDistances)?;
    let current = nsf.k().ok_or(Error::NotComputed)?;
    if k == 0 || (k > current && current < nsf.len().saturating_sub(1)) {
        return Err(Error::InvalidK {
            k,
            reason: format!("neighbor sets hold {} neighbors", current),
        });
    }
    Ok(dm.as_ref())
}
