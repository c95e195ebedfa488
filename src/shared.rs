//! Shared neighbor similarity: the (weighted) size of the intersection of two k-NN sets.
use crate::matrix::DistanceMatrix;
use crate::neighbors::finder::NeighborSetFinder;
use crate::stats::reverse_neighbor_entropies;
use crate::utils::fork_join;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Contribution of a shared neighbor to the similarity of the pair sharing it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Weighting {
    /// Every shared neighbor counts 1.
    None,
    /// `(ln((n + 1) / (N_k(x) + 1)) / ln(n + 1))^theta`. Hubs occur in many lists, so sharing
    /// them says little and they are down-weighted. `theta = 0` is the unweighted count.
    Hubness { theta: f32 },
    /// `(1 - H(x) / ln(C))^theta` with `H(x)` the label entropy of the reverse neighbors of `x`
    /// and `C` the number of classes.
    Purity { theta: f32 },
}

impl Default for Weighting {
    fn default() -> Self {
        Weighting::None
    }
}

/// # Examples
///
/// ```
/// use hubness_rs::{DistanceMatrix, NeighborSetFinder, SharedNeighborFinder};
/// use std::sync::Arc;
///
/// let dm = DistanceMatrix::from_rows(vec![vec![1., 2., 3.], vec![1., 2.], vec![1.], vec![]]).unwrap();
/// let mut nsf = NeighborSetFinder::with_distances(vec![0, 0, 1, 1], Arc::new(dm)).unwrap();
/// nsf.calculate_neighbor_sets(2).unwrap();
///
/// let mut snf = SharedNeighborFinder::new(&nsf);
/// snf.count_shared_neighbors().unwrap();
/// assert!(snf.shared_count(0, 3) <= 2.);
/// ```
#[derive(Debug)]
pub struct SharedNeighborFinder<'a> {
    nsf: &'a NeighborSetFinder,
    weighting: Weighting,
    n_threads: usize,
    weights: Vec<f32>,
    similarities: Option<DistanceMatrix>,
}

impl<'a> SharedNeighborFinder<'a> {
    /// Shared neighbor counting on the neighbor sets currently held by `nsf`.
    pub fn new(nsf: &'a NeighborSetFinder) -> Self {
        SharedNeighborFinder {
            nsf,
            weighting: Weighting::None,
            n_threads: 1,
            weights: vec![],
            similarities: None,
        }
    }

    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    /// Per point contribution to the shared neighbor counts, in [0, 1].
    pub fn instance_weights(&self) -> Result<Vec<f32>> {
        let n = self.nsf.len();
        match self.weighting {
            Weighting::None => Ok(vec![1.; n]),
            Weighting::Hubness { theta } => {
                check_theta(theta)?;
                let norm = ((n + 1) as f64).ln();
                if n <= 1 {
                    return Ok(vec![1.; n]);
                }
                Ok(self
                    .nsf
                    .occurrences()
                    .iter()
                    .map(|o| {
                        let info = ((n + 1) as f64 / (*o as f64 + 1.)).ln() / norm;
                        info.powf(theta as f64) as f32
                    })
                    .collect())
            }
            Weighting::Purity { theta } => {
                check_theta(theta)?;
                let c = self.nsf.n_classes();
                if c <= 1 {
                    return Ok(vec![1.; n]);
                }
                let max_entropy = (c as f64).ln();
                Ok(reverse_neighbor_entropies(self.nsf)
                    .iter()
                    .map(|h| (1. - h / max_entropy).max(0.).powf(theta as f64) as f32)
                    .collect())
            }
        }
    }

    /// Compute the similarity of every pair. Row `i` is filled by walking the reverse
    /// neighbors of the neighbors of `i`.
    #[tracing::instrument(skip(self), fields(n = self.nsf.len(), weighting = ?self.weighting))]
    pub fn count_shared_neighbors(&mut self) -> Result<()> {
        let nsf = self.nsf;
        nsf.k().ok_or(Error::NotComputed)?;
        let start = Instant::now();
        let weights = self.instance_weights()?;
        let n = nsf.len();
        let k_neighbors = nsf.k_neighbors();
        let reverse = nsf.reverse_neighbors();

        let chunks = fork_join(n, self.n_threads, |range| {
            Ok(range
                .map(|i| {
                    let mut row = vec![0f32; n - i - 1];
                    for &m in &k_neighbors[i] {
                        for &j in reverse[m].iter().filter(|&&j| j > i) {
                            row[j - i - 1] += weights[m];
                        }
                    }
                    row
                })
                .collect::<Vec<_>>())
        })?;
        let rows = chunks.into_iter().flat_map(|(_, rows)| rows).collect();
        self.similarities = Some(DistanceMatrix::from_rows(rows)?);
        self.weights = weights;
        debug!("shared neighbors counted in {:?}", start.elapsed());
        Ok(())
    }

    /// Upper triangular similarity matrix.
    pub fn similarities(&self) -> Option<&DistanceMatrix> {
        self.similarities.as_ref()
    }

    /// Similarity of the pair `(i, j)`, `i != j`. 0 before counting.
    pub fn shared_count(&self, i: usize, j: usize) -> f32 {
        self.similarities
            .as_ref()
            .map(|s| s.get(i, j))
            .unwrap_or(0.)
    }

    /// Weights used in the last count.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Secondary distance `k - similarity`, min-max normalized to [0, 1].
    pub fn to_distance_matrix(&self) -> Result<DistanceMatrix> {
        let sim = self.similarities.as_ref().ok_or(Error::NotComputed)?;
        let k = self.nsf.k().ok_or(Error::NotComputed)? as f32;
        let rows = sim
            .rows()
            .iter()
            .map(|row| row.iter().map(|s| k - s).collect())
            .collect();
        let mut dm = DistanceMatrix::from_rows(rows)?;
        dm.normalize_min_max();
        Ok(dm)
    }
}

fn check_theta(theta: f32) -> Result<()> {
    if !(theta.is_finite() && theta >= 0.) {
        return Err(Error::Config(format!(
            "theta must be finite and non negative, got {}",
            theta
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::random_finder;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn brute_force(nsf: &NeighborSetFinder, i: usize, j: usize) -> f32 {
        nsf.neighbors(i)
            .iter()
            .filter(|m| nsf.neighbors(j).contains(m))
            .count() as f32
    }

    #[test]
    fn test_counts_match_intersection() {
        let nsf = random_finder(40, 5, 3, 6, 11);
        let mut snf = SharedNeighborFinder::new(&nsf).threads(3);
        snf.count_shared_neighbors().unwrap();
        for i in 0..40 {
            for j in (i + 1)..40 {
                let c = snf.shared_count(i, j);
                assert_eq!(c, brute_force(&nsf, i, j));
                assert!((0. ..=6.).contains(&c));
            }
        }
    }

    #[test]
    fn test_weighted_counts_sum_shared_weights() {
        let nsf = random_finder(40, 6, 3, 5, 17);
        for weighting in &[Weighting::Hubness { theta: 1. }, Weighting::Purity { theta: 1.5 }] {
            let mut snf = SharedNeighborFinder::new(&nsf).weighting(*weighting).threads(3);
            snf.count_shared_neighbors().unwrap();
            let w = snf.weights().to_vec();
            assert_eq!(w.len(), 40);
            for i in 0..40 {
                for j in (i + 1)..40 {
                    let expected: f32 = nsf
                        .neighbors(i)
                        .iter()
                        .filter(|m| nsf.neighbors(j).contains(m))
                        .map(|&m| w[m])
                        .sum();
                    assert_abs_diff_eq!(snf.shared_count(i, j), expected, epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_theta_zero_is_unweighted() {
        let nsf = random_finder(30, 4, 2, 5, 3);
        let mut plain = SharedNeighborFinder::new(&nsf);
        plain.count_shared_neighbors().unwrap();
        let mut weighted =
            SharedNeighborFinder::new(&nsf).weighting(Weighting::Hubness { theta: 0. });
        weighted.count_shared_neighbors().unwrap();
        assert_eq!(plain.similarities(), weighted.similarities());
    }

    #[test]
    fn test_hub_weights_decrease_with_occurrence() {
        let nsf = random_finder(50, 10, 2, 5, 5);
        let snf = SharedNeighborFinder::new(&nsf).weighting(Weighting::Hubness { theta: 1. });
        let w = snf.instance_weights().unwrap();
        let occ = nsf.occurrences();
        for a in 0..50 {
            assert!(w[a] >= 0. && w[a] <= 1.);
            for b in 0..50 {
                if occ[a] < occ[b] {
                    assert!(w[a] > w[b]);
                }
            }
        }
        assert!(SharedNeighborFinder::new(&nsf)
            .weighting(Weighting::Hubness { theta: -1. })
            .instance_weights()
            .is_err());
    }

    #[test]
    fn test_purity_weights() {
        let dm = DistanceMatrix::from_rows(vec![vec![1., 2., 3.], vec![1., 2.], vec![1.], vec![]])
            .unwrap();
        let mut nsf = NeighborSetFinder::with_distances(vec![0, 0, 1, 1], Arc::new(dm)).unwrap();
        nsf.calculate_neighbor_sets(1).unwrap();
        let snf = SharedNeighborFinder::new(&nsf).weighting(Weighting::Purity { theta: 1. });
        let w = snf.instance_weights().unwrap();
        // point 1 is the neighbor of 0 (label 0) and 2 (label 1)
        assert_abs_diff_eq!(w[1], 0.);
        assert_abs_diff_eq!(w[0], 1.);
    }

    #[test]
    fn test_to_distance_matrix() {
        let nsf = random_finder(25, 3, 2, 4, 8);
        let mut snf = SharedNeighborFinder::new(&nsf);
        assert!(snf.to_distance_matrix().is_err());
        snf.count_shared_neighbors().unwrap();
        let dm = snf.to_distance_matrix().unwrap();
        for (i, j, d) in dm.iter_upper() {
            assert!((0. ..=1.).contains(&d));
            if snf.shared_count(i, j) == 4. {
                assert_eq!(d, 0.);
            }
        }
    }

    #[test]
    fn test_requires_neighbor_sets() {
        let nsf = NeighborSetFinder::new(vec![0, 1, 0]);
        let mut snf = SharedNeighborFinder::new(&nsf);
        assert!(snf.count_shared_neighbors().is_err());
    }
}
