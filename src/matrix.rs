use crate::data::Dataset;
use crate::metric::Metric;
use crate::utils::fork_join;
use crate::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Symmetric distance matrix with a zero diagonal. Only the upper triangle is stored:
/// row `i` holds the distances to the points `i + 1 .. n`.
///
/// # Examples
///
/// ```
/// use hubness_rs::DistanceMatrix;
/// let mut dm = DistanceMatrix::zeros(3);
/// dm.set(2, 0, 1.5);
/// assert_eq!(dm.get(0, 2), 1.5);
/// assert_eq!(dm.get(1, 1), 0.);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    rows: Vec<Vec<f32>>,
}

impl DistanceMatrix {
    pub fn zeros(n: usize) -> Self {
        DistanceMatrix {
            rows: (0..n).map(|i| vec![0.; n - i - 1]).collect(),
        }
    }

    /// Take ownership of upper triangular rows. Row `i` must hold `n - i - 1` values.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let n = rows.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n - i - 1 {
                return Err(Error::DimensionMismatch(format!(
                    "row {} of a {} point distance matrix has {} entries, expected {}",
                    i,
                    n,
                    row.len(),
                    n - i - 1
                )));
            }
        }
        Ok(DistanceMatrix { rows })
    }

    /// Upper triangle of a full square matrix. Only the entries above the diagonal are read.
    pub fn from_dense(dense: &Array2<f32>) -> Result<Self> {
        let (n, m) = dense.dim();
        if n != m {
            return Err(Error::DimensionMismatch(format!(
                "distance matrix is {} x {}",
                n, m
            )));
        }
        let rows = (0..n)
            .map(|i| ((i + 1)..n).map(|j| dense[[i, j]]).collect())
            .collect();
        Ok(DistanceMatrix { rows })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bytes needed for the distances of `n` points.
    pub fn required_bytes(n: usize) -> usize {
        n.saturating_mul(n.saturating_sub(1)) / 2 * std::mem::size_of::<f32>()
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        if i < j {
            self.rows[i][j - i - 1]
        } else if j < i {
            self.rows[j][i - j - 1]
        } else {
            0.
        }
    }

    /// # Panics
    ///
    /// Panics on the diagonal.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: f32) {
        assert_ne!(i, j, "the diagonal of a distance matrix is fixed at 0");
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        self.rows[i][j - i - 1] = v
    }

    /// Stored part of row `i`, distances to `i + 1 .. n`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.rows[i]
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// All distances of point `i`, including the zero on the diagonal.
    pub fn full_row(&self, i: usize) -> Vec<f32> {
        (0..self.len()).map(|j| self.get(i, j)).collect()
    }

    /// Iterate `(i, j, distance)` over the upper triangle.
    pub fn iter_upper(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().enumerate().map(move |(o, &d)| (i, i + o + 1, d)))
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let n = self.len();
        Array2::from_shape_fn((n, n), |(i, j)| self.get(i, j))
    }

    /// Fails on the first NaN or infinite entry.
    pub fn validate_finite(&self) -> Result<()> {
        match self.iter_upper().find(|(_, _, d)| !d.is_finite()) {
            Some((i, j, value)) => Err(Error::NonFiniteDistance { i, j, value }),
            None => Ok(()),
        }
    }

    /// Rescale all entries to [0, 1].
    pub fn normalize_min_max(&mut self) {
        let (min, max) = self
            .iter_upper()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, _, d)| {
                (lo.min(d), hi.max(d))
            });
        let range = max - min;
        for row in self.rows.iter_mut() {
            for d in row.iter_mut() {
                *d = if range > 0. { (*d - min) / range } else { 0. };
            }
        }
    }

    /// Compute all pairwise distances of `dataset`. Rows are split in `n_threads` contiguous
    /// ranges, one worker each.
    pub fn compute(dataset: &Dataset, metric: &dyn Metric, n_threads: usize) -> Result<Self> {
        Self::compute_with_limit(dataset, metric, n_threads, None)
    }

    /// As [`DistanceMatrix::compute`], but refuse to allocate more than `memory_limit` bytes.
    #[tracing::instrument(
        skip(dataset, metric),
        fields(n = dataset.len(), metric = %metric.name())
    )]
    pub fn compute_with_limit(
        dataset: &Dataset,
        metric: &dyn Metric,
        n_threads: usize,
        memory_limit: Option<usize>,
    ) -> Result<Self> {
        let n = dataset.len();
        if let Some(limit) = memory_limit {
            let required = Self::required_bytes(n);
            if required > limit {
                return Err(Error::MatrixTooLarge { n, required, limit });
            }
        }
        let start = Instant::now();
        let instances = &dataset.instances;
        let chunks = fork_join(n, n_threads, |range| {
            Ok(range
                .map(|i| {
                    ((i + 1)..n)
                        .map(|j| metric.distance(&instances[i], &instances[j]))
                        .collect::<Vec<f32>>()
                })
                .collect::<Vec<_>>())
        })?;
        let rows = chunks.into_iter().flat_map(|(_, rows)| rows).collect();
        debug!("distance matrix computed in {:?}", start.elapsed());
        Ok(DistanceMatrix { rows })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::CombinedMetric;
    use crate::test_utils::random_dataset;

    fn line() -> Dataset {
        Dataset::from_dense(
            &[vec![0.], vec![1.], vec![2.], vec![3.], vec![10.]],
            &[0, 0, 1, 1, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_get_set() {
        let mut dm = DistanceMatrix::zeros(4);
        dm.set(1, 3, 2.);
        dm.set(2, 0, 7.);
        assert_eq!(dm.get(3, 1), 2.);
        assert_eq!(dm.get(0, 2), 7.);
        assert_eq!(dm.row(1), &[0., 2.]);
        assert_eq!(dm.full_row(1), vec![0., 0., 0., 2.]);
        assert_eq!(dm.iter_upper().count(), 6);
    }

    #[test]
    #[should_panic]
    fn test_set_diagonal() {
        DistanceMatrix::zeros(2).set(1, 1, 1.);
    }

    #[test]
    fn test_from_rows_validates() {
        assert!(DistanceMatrix::from_rows(vec![vec![1., 2.], vec![3.], vec![]]).is_ok());
        assert!(DistanceMatrix::from_rows(vec![vec![1.], vec![3.], vec![]]).is_err());
        assert!(DistanceMatrix::from_rows(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_compute_line() {
        let metric = CombinedMetric::by_name("euclidean").unwrap();
        let dm = DistanceMatrix::compute(&line(), &metric, 1).unwrap();
        assert_eq!(dm.get(3, 4), 7.);
        assert_eq!(dm.get(0, 4), 10.);
        assert_eq!(dm.row(0), &[1., 2., 3., 10.]);
    }

    #[test]
    fn test_threads_agree() {
        let ds = random_dataset(57, 6, 3, 4);
        let metric = CombinedMetric::by_name("manhattan").unwrap();
        let single = DistanceMatrix::compute(&ds, &metric, 1).unwrap();
        let multi = DistanceMatrix::compute(&ds, &metric, 4).unwrap();
        assert_eq!(single, multi);
    }

    #[test]
    fn test_symmetric_zero_diagonal() {
        let ds = random_dataset(20, 3, 2, 9);
        let metric = CombinedMetric::by_name("euclidean").unwrap();
        let dm = DistanceMatrix::compute(&ds, &metric, 3).unwrap();
        let dense = dm.to_dense();
        for i in 0..20 {
            assert_eq!(dense[[i, i]], 0.);
            for j in 0..20 {
                assert_eq!(dense[[i, j]], dense[[j, i]]);
            }
        }
        assert_eq!(DistanceMatrix::from_dense(&dense).unwrap(), dm);
    }

    #[test]
    fn test_memory_limit() {
        let metric = CombinedMetric::by_name("euclidean").unwrap();
        let res = DistanceMatrix::compute_with_limit(&line(), &metric, 1, Some(16));
        match res {
            Err(Error::MatrixTooLarge { required, .. }) => assert_eq!(required, 40),
            _ => panic!("expected size check to fail"),
        }
        assert_eq!(DistanceMatrix::required_bytes(0), 0);
    }

    #[test]
    fn test_validate_and_normalize() {
        let mut dm = DistanceMatrix::from_rows(vec![vec![2., 4.], vec![6.], vec![]]).unwrap();
        assert!(dm.validate_finite().is_ok());
        dm.normalize_min_max();
        assert_eq!(dm.row(0), &[0., 0.5]);
        assert_eq!(dm.get(1, 2), 1.);
        dm.set(0, 1, f32::NAN);
        match dm.validate_finite() {
            Err(Error::NonFiniteDistance { i, j, .. }) => assert_eq!((i, j), (0, 1)),
            _ => panic!("expected non finite distance"),
        }
    }
}
