use crate::data::Dataset;
use crate::matrix::DistanceMatrix;
use crate::metric::Metric;
use crate::utils::fork_join;
use crate::{Error, Result};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, warn};

/// k-nearest neighbor sets of every point of a dataset and the neighbor occurrence
/// statistics derived from them.
///
/// Point identity is the position in the dataset. Neighbor lists are sorted by ascending
/// distance, ties are broken by ascending index.
///
/// # Examples
///
/// ```
/// use hubness_rs::{Dataset, NeighborSetFinder};
/// use hubness_rs::metric::CombinedMetric;
///
/// let ds = Dataset::from_dense(&[vec![0.], vec![1.], vec![2.], vec![3.], vec![10.]],
///                              &[0, 0, 1, 1, 1]).unwrap();
/// let metric = CombinedMetric::by_name("euclidean").unwrap();
///
/// let mut nsf = NeighborSetFinder::from_dataset(&ds).threads(2);
/// nsf.calculate_distances(&ds, &metric).unwrap();
/// nsf.calculate_neighbor_sets(1).unwrap();
/// assert_eq!(nsf.neighbors(3), &[2]);
/// // the point at 1 is nearest to both 0 and 2
/// assert_eq!(nsf.occurrences()[1], 2);
/// ```
#[derive(Debug, Clone)]
pub struct NeighborSetFinder {
    labels: Vec<i32>,
    n_classes: usize,
    distances: Option<Arc<DistanceMatrix>>,
    /// Neighborhood size of the current lists. `None` until computed.
    k: Option<usize>,
    k_neighbors: Vec<Vec<usize>>,
    k_distances: Vec<Vec<f32>>,
    /// How often a point occurs in the neighbor lists of the others, `N_k(x)`.
    occurrences: Vec<u32>,
    /// Occurrences in the lists of points with a different label.
    bad_occurrences: Vec<u32>,
    good_occurrences: Vec<u32>,
    /// `n x n_classes`, occurrences per label of the referencing point.
    class_occurrences: Vec<u32>,
    reverse_neighbors: OnceLock<Vec<Vec<usize>>>,
    n_threads: usize,
}

/// Output of one worker of the neighbor search.
struct ChunkNeighbors {
    neighbors: Vec<Vec<usize>>,
    distances: Vec<Vec<f32>>,
    occurrences: Vec<u32>,
    bad_occurrences: Vec<u32>,
}

impl NeighborSetFinder {
    /// # Arguments
    /// * `labels` - Class label per point, negative for noise / unlabeled.
    pub fn new(labels: Vec<i32>) -> Self {
        let n_classes = labels
            .iter()
            .filter(|l| **l >= 0)
            .map(|l| *l as usize + 1)
            .max()
            .unwrap_or(0);
        NeighborSetFinder {
            labels,
            n_classes,
            distances: None,
            k: None,
            k_neighbors: vec![],
            k_distances: vec![],
            occurrences: vec![],
            bad_occurrences: vec![],
            good_occurrences: vec![],
            class_occurrences: vec![],
            reverse_neighbors: OnceLock::new(),
            n_threads: 1,
        }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self::new(dataset.labels())
    }

    /// Finder on a pre-computed distance matrix.
    pub fn with_distances(labels: Vec<i32>, distances: Arc<DistanceMatrix>) -> Result<Self> {
        let mut nsf = Self::new(labels);
        nsf.set_distances(distances)?;
        Ok(nsf)
    }

    /// Number of worker threads for the heavy operations.
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    /// Accept a pre-computed distance matrix. Invalidates computed neighbor sets.
    pub fn set_distances(&mut self, distances: Arc<DistanceMatrix>) -> Result<()> {
        if distances.len() != self.labels.len() {
            return Err(Error::DimensionMismatch(format!(
                "distance matrix over {} points, finder over {} points",
                distances.len(),
                self.labels.len()
            )));
        }
        distances.validate_finite()?;
        self.distances = Some(distances);
        self.clear_neighbor_sets();
        Ok(())
    }

    /// Compute the distance matrix of `dataset` under `metric`.
    pub fn calculate_distances(&mut self, dataset: &Dataset, metric: &dyn Metric) -> Result<()> {
        if dataset.len() != self.labels.len() {
            return Err(Error::DimensionMismatch(format!(
                "dataset of {} points, finder over {} points",
                dataset.len(),
                self.labels.len()
            )));
        }
        let dm = DistanceMatrix::compute(dataset, metric, self.n_threads)?;
        self.distances = Some(Arc::new(dm));
        self.clear_neighbor_sets();
        Ok(())
    }

    fn clear_neighbor_sets(&mut self) {
        self.k = None;
        self.k_neighbors.clear();
        self.k_distances.clear();
        self.occurrences.clear();
        self.bad_occurrences.clear();
        self.good_occurrences.clear();
        self.class_occurrences.clear();
        self.reverse_neighbors = OnceLock::new();
    }

    fn effective_k(&self, k: usize) -> Result<usize> {
        if k == 0 {
            return Err(Error::InvalidK {
                k,
                reason: "k must be at least 1".to_string(),
            });
        }
        let n = self.len();
        if n > 0 && k > n - 1 {
            warn!(k, n, "k exceeds the number of other points, every point is a neighbor");
            return Ok(n - 1);
        }
        Ok(k.min(n))
    }

    /// Find the `k` nearest neighbors of every point and count neighbor occurrences.
    ///
    /// Points are split over the worker threads. Every worker counts the occurrences of its
    /// own lists in local arrays, these are summed after all workers joined.
    #[tracing::instrument(skip(self), fields(n = self.len(), threads = self.n_threads))]
    pub fn calculate_neighbor_sets(&mut self, k: usize) -> Result<()> {
        let k_eff = self.effective_k(k)?;
        let dm = self.distances.clone().ok_or(Error::MissingDistances)?;
        let n = self.len();
        let labels = &self.labels;
        let start = Instant::now();

        let chunks = fork_join(n, self.n_threads, |range| {
            let mut out = ChunkNeighbors {
                neighbors: Vec::with_capacity(range.len()),
                distances: Vec::with_capacity(range.len()),
                occurrences: vec![0; n],
                bad_occurrences: vec![0; n],
            };
            for i in range {
                let (nbs, dists) = nearest(&dm, i, k_eff)?;
                for &j in &nbs {
                    out.occurrences[j] += 1;
                    if labels[i] != labels[j] {
                        out.bad_occurrences[j] += 1;
                    }
                }
                out.neighbors.push(nbs);
                out.distances.push(dists);
            }
            Ok(out)
        })?;

        // single threaded reduction
        let mut occurrences = vec![0; n];
        let mut bad_occurrences = vec![0; n];
        let mut k_neighbors = Vec::with_capacity(n);
        let mut k_distances = Vec::with_capacity(n);
        for (_, chunk) in chunks {
            for (acc, local) in occurrences.iter_mut().zip(&chunk.occurrences) {
                *acc += local;
            }
            for (acc, local) in bad_occurrences.iter_mut().zip(&chunk.bad_occurrences) {
                *acc += local;
            }
            k_neighbors.extend(chunk.neighbors);
            k_distances.extend(chunk.distances);
        }

        self.k_neighbors = k_neighbors;
        self.k_distances = k_distances;
        self.good_occurrences = occurrences
            .iter()
            .zip(&bad_occurrences)
            .map(|(o, b)| o - b)
            .collect();
        self.occurrences = occurrences;
        self.bad_occurrences = bad_occurrences;
        self.class_occurrences = self.count_class_occurrences();
        self.reverse_neighbors = OnceLock::new();
        self.k = Some(k_eff);
        debug!(k = k_eff, "neighbor sets computed in {:?}", start.elapsed());
        Ok(())
    }

    /// Restrict the neighbor lists to their first `k` entries and recount the occurrence
    /// statistics from the restricted lists. No distances are looked at.
    pub fn recalculate_stats_for_smaller_k(&mut self, k: usize) -> Result<()> {
        let current = self.k.ok_or(Error::NotComputed)?;
        let k_eff = self.effective_k(k)?;
        if k_eff > current {
            return Err(Error::InvalidK {
                k,
                reason: format!(
                    "can only shrink neighbor sets of size {}, use grow to enlarge",
                    current
                ),
            });
        }
        for (nbs, dists) in self.k_neighbors.iter_mut().zip(self.k_distances.iter_mut()) {
            nbs.truncate(k_eff);
            dists.truncate(k_eff);
        }
        let (occurrences, bad_occurrences) = self.count_occurrences();
        self.good_occurrences = occurrences
            .iter()
            .zip(&bad_occurrences)
            .map(|(o, b)| o - b)
            .collect();
        self.occurrences = occurrences;
        self.bad_occurrences = bad_occurrences;
        self.class_occurrences = self.count_class_occurrences();
        self.reverse_neighbors = OnceLock::new();
        self.k = Some(k_eff);
        Ok(())
    }

    /// Move to neighborhood size `k`. Shrinking reuses the current lists, growing searches the
    /// known distances again.
    pub fn grow(&mut self, k: usize) -> Result<()> {
        let k_eff = self.effective_k(k)?;
        match self.k {
            Some(current) if k_eff <= current => self.recalculate_stats_for_smaller_k(k),
            _ => self.calculate_neighbor_sets(k),
        }
    }

    /// Independent copy restricted to neighborhood size `k`.
    pub fn sub_finder(&self, k: usize) -> Result<Self> {
        let mut sub = self.clone();
        sub.recalculate_stats_for_smaller_k(k)?;
        Ok(sub)
    }

    fn count_occurrences(&self) -> (Vec<u32>, Vec<u32>) {
        let n = self.len();
        let mut occurrences = vec![0; n];
        let mut bad_occurrences = vec![0; n];
        for (i, nbs) in self.k_neighbors.iter().enumerate() {
            for &j in nbs {
                occurrences[j] += 1;
                if self.labels[i] != self.labels[j] {
                    bad_occurrences[j] += 1;
                }
            }
        }
        (occurrences, bad_occurrences)
    }

    fn count_class_occurrences(&self) -> Vec<u32> {
        let c = self.n_classes;
        let mut class_occurrences = vec![0; self.len() * c];
        for (i, nbs) in self.k_neighbors.iter().enumerate() {
            let label = self.labels[i];
            if label < 0 {
                continue;
            }
            for &j in nbs {
                class_occurrences[j * c + label as usize] += 1;
            }
        }
        class_occurrences
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Current neighborhood size, `None` if no neighbor sets are computed.
    pub fn k(&self) -> Option<usize> {
        self.k
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn distances(&self) -> Option<&Arc<DistanceMatrix>> {
        self.distances.as_ref()
    }

    /// Sorted neighbor indices of point `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds or the neighbor sets are not computed yet.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.k_neighbors[i]
    }

    /// Distances that go with [`NeighborSetFinder::neighbors`].
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds or the neighbor sets are not computed yet.
    pub fn neighbor_distances(&self, i: usize) -> &[f32] {
        &self.k_distances[i]
    }

    pub fn k_neighbors(&self) -> &[Vec<usize>] {
        &self.k_neighbors
    }

    pub fn k_distances(&self) -> &[Vec<f32>] {
        &self.k_distances
    }

    pub fn occurrences(&self) -> &[u32] {
        &self.occurrences
    }

    pub fn bad_occurrences(&self) -> &[u32] {
        &self.bad_occurrences
    }

    pub fn good_occurrences(&self) -> &[u32] {
        &self.good_occurrences
    }

    /// Occurrences of point `i` per label of the referencing point, `N_{k,c}(i)`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds or the neighbor sets are not computed yet.
    pub fn class_occurrences(&self, i: usize) -> &[u32] {
        let c = self.n_classes;
        &self.class_occurrences[i * c..(i + 1) * c]
    }

    /// Distance to the k-th nearest neighbor. 0 if the point has no neighbors.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds or the neighbor sets are not computed yet.
    pub fn k_distance(&self, i: usize) -> f32 {
        self.k_distances[i].last().copied().unwrap_or(0.)
    }

    /// Mean distance to the neighbors, per point.
    pub fn mean_k_distances(&self) -> Vec<f32> {
        self.k_distances
            .iter()
            .map(|d| {
                if d.is_empty() {
                    0.
                } else {
                    (d.iter().map(|v| *v as f64).sum::<f64>() / d.len() as f64) as f32
                }
            })
            .collect()
    }

    /// Reverse neighbor lists: the points that have `i` in their neighbor list, ascending.
    /// Computed on first use.
    pub fn reverse_neighbors(&self) -> &[Vec<usize>] {
        self.reverse_neighbors.get_or_init(|| {
            let mut reverse: Vec<Vec<usize>> = self
                .occurrences
                .iter()
                .map(|o| Vec::with_capacity(*o as usize))
                .collect();
            for (i, nbs) in self.k_neighbors.iter().enumerate() {
                for &j in nbs {
                    reverse[j].push(i);
                }
            }
            reverse
        })
    }
}

/// The `k` nearest other points of `i`: bounded insertion over row and column of `i`.
/// Candidates are visited in ascending index order and only move in front of strictly larger
/// distances, which keeps ties in index order.
fn nearest(dm: &DistanceMatrix, i: usize, k: usize) -> Result<(Vec<usize>, Vec<f32>)> {
    let mut idx: Vec<usize> = Vec::with_capacity(k + 1);
    let mut dist: Vec<f32> = Vec::with_capacity(k + 1);
    if k == 0 {
        return Ok((idx, dist));
    }
    for j in (0..dm.len()).filter(|&j| j != i) {
        let d = dm.get(i, j);
        if !d.is_finite() {
            return Err(Error::NonFiniteDistance { i, j, value: d });
        }
        if dist.len() == k && d >= dist[k - 1] {
            continue;
        }
        let pos = dist.partition_point(|&x| x <= d);
        dist.insert(pos, d);
        idx.insert(pos, j);
        if dist.len() > k {
            dist.pop();
            idx.pop();
        }
    }
    Ok((idx, dist))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_nearest_ties() {
        let dm = DistanceMatrix::from_rows(vec![vec![1., 1., 0.5], vec![1., 1.], vec![1.], vec![]])
            .unwrap();
        let (idx, dist) = nearest(&dm, 0, 2).unwrap();
        assert_eq!(idx, vec![3, 1]);
        assert_eq!(dist, vec![0.5, 1.]);
        let (idx, _) = nearest(&dm, 2, 3).unwrap();
        assert_eq!(idx, vec![0, 1, 3]);
    }

    #[test]
    fn test_nearest_non_finite() {
        let mut dm = DistanceMatrix::zeros(3);
        dm.set(0, 2, f32::INFINITY);
        assert!(nearest(&dm, 0, 1).is_err());
    }

    #[test]
    fn test_requires_distances() {
        let mut nsf = NeighborSetFinder::new(vec![0, 1]);
        match nsf.calculate_neighbor_sets(1) {
            Err(Error::MissingDistances) => {}
            _ => panic!("expected missing distances"),
        }
        assert!(nsf.recalculate_stats_for_smaller_k(1).is_err());
    }

    #[test]
    #[should_panic]
    fn test_neighbors_before_calculation() {
        let nsf = NeighborSetFinder::with_distances(vec![0, 1], Arc::new(DistanceMatrix::zeros(2)))
            .unwrap();
        nsf.neighbors(0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let dm = Arc::new(DistanceMatrix::zeros(3));
        assert!(NeighborSetFinder::with_distances(vec![0, 1], dm).is_err());
    }
}
