use super::{distances_and_k, map_pairs, SecondaryDistance};
use crate::matrix::DistanceMatrix;
use crate::metric::MAX_DISTANCE;
use crate::neighbors::finder::NeighborSetFinder;
use crate::Result;

/// Non-iterative contextual dissimilarity measure: `d(x, y) / sqrt(mu_x * mu_y)` with `mu_x`
/// the mean distance from `x` to its k nearest neighbors. Pairs with a zero scale keep their
/// primary distance, results are capped at [`MAX_DISTANCE`].
#[derive(Debug, Clone, Copy)]
pub struct Nicdm {
    pub k: usize,
    pub n_threads: usize,
}

impl Nicdm {
    pub fn new(k: usize) -> Self {
        Nicdm { k, n_threads: 1 }
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    /// Mean distance of every point to its first k neighbors.
    pub fn scales(&self, nsf: &NeighborSetFinder) -> Vec<f64> {
        nsf.k_distances()
            .iter()
            .map(|d| {
                let d = &d[..self.k.min(d.len())];
                if d.is_empty() {
                    0.
                } else {
                    d.iter().map(|v| *v as f64).sum::<f64>() / d.len() as f64
                }
            })
            .collect()
    }
}

impl SecondaryDistance for Nicdm {
    fn transform(&self, nsf: &NeighborSetFinder) -> Result<DistanceMatrix> {
        let dm = distances_and_k(nsf, self.k)?;
        let mu = self.scales(nsf);
        map_pairs(dm, self.n_threads, |i, j, d| {
            let scale = (mu[i] * mu[j]).sqrt();
            if scale > 0. {
                (d as f64 / scale).min(MAX_DISTANCE as f64) as f32
            } else {
                d
            }
        })
    }

    fn name(&self) -> String {
        format!("nicdm:{}", self.k)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::{Dataset, FeatureSchema, Instance};
    use crate::metric::CombinedMetric;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    #[test]
    fn test_nicdm() {
        let dm = DistanceMatrix::from_rows(vec![vec![1., 2., 4.], vec![1., 3.], vec![2.], vec![]])
            .unwrap();
        let mut nsf = NeighborSetFinder::with_distances(vec![0; 4], Arc::new(dm)).unwrap();
        nsf.calculate_neighbor_sets(3).unwrap();
        let nicdm = Nicdm::new(2);
        let mu = nicdm.scales(&nsf);
        assert_eq!(mu, vec![1.5, 1., 1.5, 2.5]);
        let out = nicdm.transform(&nsf).unwrap();
        assert_abs_diff_eq!(out.get(0, 3), 4. / (1.5f32 * 2.5).sqrt(), epsilon = 1e-6);
        // k-NN order of point 0 stays, its scale is shared by all its pairs
        assert!(out.get(0, 1) < out.get(0, 2));
    }

    #[test]
    fn test_missing_values_stay_finite() {
        let mut ds = Dataset::new(FeatureSchema::with_sizes(1, 0, 1));
        for (x, nominal) in &[(0., "a"), (0.5, "a"), (f32::NAN, "a"), (f32::NAN, "b")] {
            ds.push(Instance {
                floats: vec![*x],
                nominals: vec![nominal.to_string()],
                ..Default::default()
            })
            .unwrap();
        }
        let metric = CombinedMetric::by_name("euclidean").unwrap();
        let mut nsf = NeighborSetFinder::from_dataset(&ds);
        nsf.calculate_distances(&ds, &metric).unwrap();
        nsf.calculate_neighbor_sets(1).unwrap();
        assert_eq!(nsf.distances().unwrap().get(0, 2), MAX_DISTANCE);

        let out = Nicdm::new(1).transform(&nsf).unwrap();
        // scales 0.5, 0.5, 1, 1
        assert_abs_diff_eq!(out.get(0, 1), 1.);
        assert_eq!(out.get(0, 2), MAX_DISTANCE);
        let mut again = NeighborSetFinder::with_distances(ds.labels(), Arc::new(out)).unwrap();
        again.calculate_neighbor_sets(1).unwrap();
        assert_eq!(again.neighbors(0), &[1]);
    }

    #[test]
    fn test_zero_scale_keeps_distance() {
        let dm = DistanceMatrix::from_rows(vec![vec![0., 3.], vec![3.], vec![]]).unwrap();
        let mut nsf = NeighborSetFinder::with_distances(vec![0; 3], Arc::new(dm)).unwrap();
        nsf.calculate_neighbor_sets(1).unwrap();
        let out = Nicdm::new(1).transform(&nsf).unwrap();
        assert_eq!(out.get(0, 1), 0.);
        assert_eq!(out.get(0, 2), 3.);
    }
}
