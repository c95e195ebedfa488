use super::{map_pairs, SecondaryDistance};
use crate::matrix::DistanceMatrix;
use crate::neighbors::finder::NeighborSetFinder;
use crate::utils::{create_rng, fork_join};
use crate::{Error, Result};
use rand::seq::index;
use statrs::distribution::{ContinuousCDF, Normal};
use std::time::Instant;
use tracing::{debug, warn};

/// Largest share of the other points used when the distance distribution is sampled.
pub const MAX_SAMPLE_FRACTION: f64 = 0.8;

/// Mutual Proximity under a Gaussian model of every point's distance distribution.
///
/// `MP(x, y) = P(X > d(x, y)) * P(Y > d(x, y))`: the chance that `y` is closer to `x` than a
/// random point is, and vice versa. The returned matrix holds `1 - MP`, so smaller stays closer.
///
/// # Examples
///
/// ```
/// use hubness_rs::{DistanceMatrix, MutualProximity};
/// let dm = DistanceMatrix::from_rows(vec![vec![1., 2., 9.], vec![1., 9.], vec![9.], vec![]]).unwrap();
/// let mp = MutualProximity::new().threads(2).transform_matrix(&dm).unwrap();
/// assert!(mp.get(0, 3) > mp.get(0, 1));
/// ```
#[derive(Debug, Clone)]
pub struct MutualProximity {
    n_threads: usize,
    /// Estimate the statistics from this many random distances per point.
    sample_size: Option<usize>,
    /// Seed of the sampling. If 0, randomness is seeded from the os.
    seed: u64,
}

impl Default for MutualProximity {
    fn default() -> Self {
        MutualProximity {
            n_threads: 1,
            sample_size: None,
            seed: 0,
        }
    }
}

/// Mean and standard deviation of the distances from one point to all others.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointStats {
    pub mean: f64,
    pub std: f64,
}

/// Single pass mean / variance (Welford).
#[derive(Debug, Default, Clone, Copy)]
struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn finish(&self) -> PointStats {
        let var = if self.n > 0 { self.m2 / self.n as f64 } else { 0. };
        PointStats {
            mean: self.mean,
            std: var.max(0.).sqrt(),
        }
    }
}

impl MutualProximity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads.max(1);
        self
    }

    /// Fast variant: estimate every point's mean and deviation from `sample_size` random
    /// distances, capped at 80% of the points.
    pub fn sampled(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn effective_sample_size(&self, n: usize) -> Option<usize> {
        self.sample_size.map(|s| {
            let cap = (MAX_SAMPLE_FRACTION * n as f64).floor() as usize;
            s.min(cap).min(n.saturating_sub(1)).max(1)
        })
    }

    /// Distance statistics of every point.
    pub fn point_stats(&self, dm: &DistanceMatrix) -> Result<Vec<PointStats>> {
        let n = dm.len();
        let sample_size = self.effective_sample_size(n);
        let seed = self.seed;
        let chunks = fork_join(n, self.n_threads, |range| {
            Ok(range
                .map(|i| {
                    let mut running = RunningStats::default();
                    match sample_size {
                        Some(s) if n > 1 => {
                            let point_seed = if seed == 0 {
                                0
                            } else {
                                seed.wrapping_add(i as u64 + 1)
                            };
                            let mut rng = create_rng(point_seed);
                            for o in index::sample(&mut rng, n - 1, s).iter() {
                                let j = if o >= i { o + 1 } else { o };
                                running.push(dm.get(i, j) as f64);
                            }
                        }
                        _ => {
                            for j in (0..n).filter(|&j| j != i) {
                                running.push(dm.get(i, j) as f64);
                            }
                        }
                    }
                    running.finish()
                })
                .collect::<Vec<_>>())
        })?;
        Ok(chunks.into_iter().flat_map(|(_, s)| s).collect())
    }

    /// Mutual proximity of a primary distance matrix.
    #[tracing::instrument(
        skip(self, dm),
        fields(n = dm.len(), sampled = self.sample_size.is_some())
    )]
    pub fn transform_matrix(&self, dm: &DistanceMatrix) -> Result<DistanceMatrix> {
        dm.validate_finite()?;
        let start = Instant::now();
        let stats = self.point_stats(dm)?;
        let degenerate = stats.iter().filter(|s| !(s.std > 0.)).count();
        if degenerate > 0 && dm.len() > 1 {
            warn!(
                degenerate,
                "points with zero distance variance, using a step function for them"
            );
        }
        let models = stats
            .iter()
            .map(|s| {
                if s.std > 0. {
                    Normal::new(s.mean, s.std)
                        .map(Some)
                        .map_err(|e| Error::Other(anyhow::anyhow!("{}", e)))
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let survival = |i: usize, d: f64| -> f64 {
            match &models[i] {
                Some(normal) => normal.sf(d),
                None => {
                    let mean = stats[i].mean;
                    if d < mean {
                        1.
                    } else if d > mean {
                        0.
                    } else {
                        0.5
                    }
                }
            }
        };
        let out = map_pairs(dm, self.n_threads, |i, j, d| {
            let d = d as f64;
            (1. - survival(i, d) * survival(j, d)) as f32
        })?;
        debug!("mutual proximity computed in {:?}", start.elapsed());
        Ok(out)
    }
}

impl SecondaryDistance for MutualProximity {
    fn transform(&self, nsf: &NeighborSetFinder) -> Result<DistanceMatrix> {
        let dm = nsf.distances().ok_or(Error::MissingDistances)?;
        self.transform_matrix(dm)
    }

    fn name(&self) -> String {
        match self.sample_size {
            Some(s) => format!("mp-gauss-sampled:{}", s),
            None => "mp-gauss".to_string(),
        }
    }
}
