use super::{distances_and_k, map_pairs, SecondaryDistance};
use crate::matrix::DistanceMatrix;
use crate::neighbors::finder::NeighborSetFinder;
use crate::{Error, Result};

/// Local scaling: `1 - exp(-d(x, y)^2 / (sigma_x * sigma_y))` with `sigma_x` the distance from
/// `x` to its k-th nearest neighbor.
#[derive(Debug, Clone, Copy)]
pub struct LocalScaling {
    pub k: usize,
    pub n_threads: usize,
}

impl LocalScaling {
    pub fn new(k: usize) -> Self {
        LocalScaling { k, n_threads: 1 }
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    /// Distance of every point to its k-th nearest neighbor, or to its last one if the list is
    /// shorter.
    pub fn scales(&self, nsf: &NeighborSetFinder) -> Result<Vec<f32>> {
        let kth = self.k.checked_sub(1).ok_or_else(|| Error::InvalidK {
            k: self.k,
            reason: "k must be at least 1".to_string(),
        })?;
        Ok(nsf
            .k_distances()
            .iter()
            .map(|d| match d.get(kth) {
                Some(v) => *v,
                None => d.last().copied().unwrap_or(0.),
            })
            .collect())
    }
}

impl SecondaryDistance for LocalScaling {
    fn transform(&self, nsf: &NeighborSetFinder) -> Result<DistanceMatrix> {
        let dm = distances_and_k(nsf, self.k)?;
        let sigma = self.scales(nsf)?;
        map_pairs(dm, self.n_threads, |i, j, d| {
            let scale = sigma[i] as f64 * sigma[j] as f64;
            if scale > 0. {
                (1. - (-(d as f64).powi(2) / scale).exp()) as f32
            } else if d > 0. {
                1.
            } else {
                0.
            }
        })
    }

    fn name(&self) -> String {
        format!("ls:{}", self.k)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::random_finder;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    #[test]
    fn test_local_scaling() {
        let dm = DistanceMatrix::from_rows(vec![vec![1., 2., 4.], vec![1., 3.], vec![2.], vec![]])
            .unwrap();
        let mut nsf = NeighborSetFinder::with_distances(vec![0; 4], Arc::new(dm)).unwrap();
        nsf.calculate_neighbor_sets(2).unwrap();
        let ls = LocalScaling::new(2);
        // second neighbor distances: 0 -> 2, 1 -> 1, 2 -> 2, 3 -> 3
        assert_eq!(ls.scales(&nsf).unwrap(), vec![2., 1., 2., 3.]);
        let out = ls.transform(&nsf).unwrap();
        assert_abs_diff_eq!(out.get(0, 1), 1. - (-0.5f32).exp(), epsilon = 1e-6);
        assert_abs_diff_eq!(out.get(2, 3), 1. - (-4f32 / 6.).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_range_and_threads() {
        let nsf = random_finder(30, 5, 2, 6, 9);
        let a = LocalScaling::new(4).transform(&nsf).unwrap();
        let b = LocalScaling::new(4).threads(3).transform(&nsf).unwrap();
        assert_eq!(a, b);
        for (_, _, d) in a.iter_upper() {
            assert!((0. ..=1.).contains(&d));
        }
        assert!(LocalScaling::new(7).transform(&nsf).is_err());
    }

    #[test]
    fn test_zero_k() {
        let nsf = random_finder(10, 3, 2, 3, 2);
        match LocalScaling::new(0).scales(&nsf) {
            Err(Error::InvalidK { k, .. }) => assert_eq!(k, 0),
            _ => panic!("expected invalid k"),
        }
        assert!(LocalScaling::new(0).transform(&nsf).is_err());
    }
}
