//! One experimental condition: a dataset, the matrices derived from it and the neighbor sets
//! over them. All buffers are owned by the [`ExperimentCondition`] and freed together when it is
//! released or dropped, so a sweep over many conditions holds one condition in memory at a time.
use crate::data::{Dataset, Normalization};
use crate::io::DistanceCache;
use crate::matrix::DistanceMatrix;
use crate::metric::CombinedMetric;
use crate::neighbors::finder::NeighborSetFinder;
use crate::secondary::{
    LocalScaling, MutualProximity, Nicdm, SecondaryDistance, SharedNeighborDistance,
};
use crate::shared::Weighting;
use crate::stats::HubnessStats;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secondary distance applied on top of the primary metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SecondaryKind {
    None,
    SharedNeighbors { weighting: Weighting },
    MutualProximity { sample_size: Option<usize> },
    LocalScaling { k: usize },
    Nicdm { k: usize },
}

impl Default for SecondaryKind {
    fn default() -> Self {
        SecondaryKind::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Registry name, see [`crate::metric::float_metric`].
    pub metric: String,
    pub normalization: Normalization,
    pub k_min: usize,
    pub k_max: usize,
    pub n_threads: usize,
    pub secondary: SecondaryKind,
    /// Upper bound in bytes for a single distance matrix.
    pub memory_limit: Option<usize>,
    /// Seed of the sampled secondary distances. If 0, randomness is seeded from the os.
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            metric: "euclidean".to_string(),
            normalization: Normalization::None,
            k_min: 1,
            k_max: 10,
            n_threads: 1,
            secondary: SecondaryKind::None,
            memory_limit: None,
            seed: 0,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        CombinedMetric::by_name(&self.metric)?;
        if self.k_min == 0 || self.k_min > self.k_max {
            return Err(Error::Config(format!(
                "k range {}..={} is empty or starts at 0",
                self.k_min, self.k_max
            )));
        }
        if self.n_threads == 0 {
            return Err(Error::Config("n_threads should be at least 1".to_string()));
        }
        match self.secondary {
            SecondaryKind::LocalScaling { k } | SecondaryKind::Nicdm { k }
                if k == 0 || k > self.k_max =>
            {
                Err(Error::Config(format!(
                    "secondary neighborhood size {} not in 1..={}",
                    k, self.k_max
                )))
            }
            SecondaryKind::MutualProximity {
                sample_size: Some(0),
            } => Err(Error::Config("sample size should be at least 1".to_string())),
            _ => Ok(()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cfg: ExperimentConfig = bincode::deserialize(bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn secondary_distance(&self) -> Option<Box<dyn SecondaryDistance>> {
        let n_threads = self.n_threads;
        match self.secondary {
            SecondaryKind::None => None,
            SecondaryKind::SharedNeighbors { weighting } => Some(Box::new(SharedNeighborDistance {
                weighting,
                n_threads,
            })),
            SecondaryKind::MutualProximity { sample_size } => {
                let mut mp = MutualProximity::new().threads(n_threads).seed(self.seed);
                if let Some(s) = sample_size {
                    mp = mp.sampled(s);
                }
                Some(Box::new(mp))
            }
            SecondaryKind::LocalScaling { k } => {
                Some(Box::new(LocalScaling::new(k).threads(n_threads)))
            }
            SecondaryKind::Nicdm { k } => Some(Box::new(Nicdm::new(k).threads(n_threads))),
        }
    }
}

/// # Examples
///
/// ```
/// use hubness_rs::prelude::*;
///
/// let points: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, (i * i % 7) as f32]).collect();
/// let labels: Vec<i32> = (0..20).map(|i| i % 2).collect();
/// let ds = Dataset::from_dense(&points, &labels).unwrap();
///
/// let cfg = ExperimentConfig { k_min: 1, k_max: 5, n_threads: 2, ..Default::default() };
/// let mut condition = ExperimentCondition::new(cfg, ds).unwrap();
/// let stats = condition.sweep_k().unwrap();
/// assert_eq!(stats.len(), 5);
/// condition.release();
/// ```
#[derive(Debug)]
pub struct ExperimentCondition {
    config: ExperimentConfig,
    metric: CombinedMetric,
    dataset: Dataset,
    cache: Option<(DistanceCache, String)>,
    distances: Option<Arc<DistanceMatrix>>,
    finder: Option<NeighborSetFinder>,
    secondary: Option<Arc<DistanceMatrix>>,
}

impl ExperimentCondition {
    /// Validates `config` and normalizes the dataset.
    pub fn new(config: ExperimentConfig, mut dataset: Dataset) -> Result<Self> {
        config.validate()?;
        let metric = CombinedMetric::by_name(&config.metric)?;
        dataset.normalize(config.normalization);
        Ok(ExperimentCondition {
            config,
            metric,
            dataset,
            cache: None,
            distances: None,
            finder: None,
            secondary: None,
        })
    }

    /// Load and store the primary matrix in `cache` under `dataset_name`.
    pub fn cached(mut self, cache: DistanceCache, dataset_name: &str) -> Self {
        self.cache = Some((cache, dataset_name.to_string()));
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Primary distance matrix, computed on first use.
    pub fn distances(&mut self) -> Result<Arc<DistanceMatrix>> {
        if let Some(dm) = &self.distances {
            return Ok(dm.clone());
        }
        let n = self.dataset.len();
        if let Some(limit) = self.config.memory_limit {
            let required = DistanceMatrix::required_bytes(n);
            if required > limit {
                return Err(Error::MatrixTooLarge { n, required, limit });
            }
        }
        let dm = match &self.cache {
            Some((cache, name)) => cache.load_or_compute(
                name,
                &self.dataset,
                &self.metric,
                self.config.normalization,
                self.config.n_threads,
            )?,
            None => DistanceMatrix::compute(&self.dataset, &self.metric, self.config.n_threads)?,
        };
        let dm = Arc::new(dm);
        self.distances = Some(dm.clone());
        Ok(dm)
    }

    /// Neighbor sets on the primary distances with `k_max` neighbors.
    pub fn finder(&mut self) -> Result<&NeighborSetFinder> {
        if self.finder.is_none() {
            let dm = self.distances()?;
            let mut nsf = NeighborSetFinder::with_distances(self.dataset.labels(), dm)?
                .threads(self.config.n_threads);
            nsf.calculate_neighbor_sets(self.config.k_max)?;
            self.finder = Some(nsf);
        }
        self.finder.as_ref().ok_or(Error::NotComputed)
    }

    /// Hubness statistics on the primary distances for every k of the configured range,
    /// ascending. The neighbor sets are computed once for `k_max` and shrunk from there.
    pub fn sweep_k(&mut self) -> Result<Vec<HubnessStats>> {
        let nsf = self.finder()?.clone();
        sweep(nsf, self.config.k_min)
    }

    /// Secondary distance matrix, computed on first use. `None` if no secondary distance is
    /// configured.
    pub fn secondary_distances(&mut self) -> Result<Option<Arc<DistanceMatrix>>> {
        if let Some(dm) = &self.secondary {
            return Ok(Some(dm.clone()));
        }
        let secondary = match self.config.secondary_distance() {
            Some(s) => s,
            None => return Ok(None),
        };
        let dm = Arc::new(secondary.transform(self.finder()?)?);
        info!(secondary = %secondary.name(), "secondary distances computed");
        self.secondary = Some(dm.clone());
        Ok(Some(dm))
    }

    /// As [`ExperimentCondition::sweep_k`], on the secondary distances. Empty if no secondary
    /// distance is configured.
    pub fn secondary_sweep_k(&mut self) -> Result<Vec<HubnessStats>> {
        let dm = match self.secondary_distances()? {
            Some(dm) => dm,
            None => return Ok(vec![]),
        };
        let mut nsf = NeighborSetFinder::with_distances(self.dataset.labels(), dm)?
            .threads(self.config.n_threads);
        if nsf.len() < 2 {
            return Ok(vec![]);
        }
        nsf.calculate_neighbor_sets(self.config.k_max)?;
        sweep(nsf, self.config.k_min)
    }

    /// Free the matrices and neighbor sets. They are recomputed when asked for again.
    pub fn release(&mut self) {
        self.finder = None;
        self.secondary = None;
        self.distances = None;
        debug!("condition buffers released");
    }

    pub fn is_released(&self) -> bool {
        self.distances.is_none() && self.finder.is_none() && self.secondary.is_none()
    }
}

fn sweep(mut nsf: NeighborSetFinder, k_min: usize) -> Result<Vec<HubnessStats>> {
    if nsf.len() < 2 {
        warn!(n = nsf.len(), "not enough points for neighbor sets");
        return Ok(vec![]);
    }
    let k_hi = nsf.k().ok_or(Error::NotComputed)?;
    let mut stats = Vec::with_capacity(k_hi);
    for k in (k_min.min(k_hi)..=k_hi).rev() {
        nsf.recalculate_stats_for_smaller_k(k)?;
        stats.push(HubnessStats::from_finder(&nsf)?);
    }
    stats.reverse();
    Ok(stats)
}
