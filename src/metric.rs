//! Primary distances between instances.
//!
//! A [`CombinedMetric`] is put together from independent float, integer, nominal and sparse
//! sub-metrics. The distance matrix calls [`Metric::distance`] once for every pair and never
//! looks inside.
//!
//! ## Missing values
//! Non finite float values are treated as missing. Dimensions where either side is missing are
//! skipped. Two vectors that are missing altogether are at distance 0, a pair where only one side
//! is missing altogether is at [`MAX_DISTANCE`].
//!
//! ## Registry
//! ```
//! use hubness_rs::metric::{float_metric, CombinedMetric, Metric};
//! let m = float_metric("minkowski:3").unwrap();
//! assert_eq!(m.name(), "minkowski:3");
//! let combined = CombinedMetric::by_name("euclidean").unwrap();
//! ```
use crate::data::Instance;
use crate::{Error, Result};
use fnv::FnvHashMap as HashMap;
use ndarray::aview1;
use std::fmt::Debug;

/// Sentinel for pairs that can't be compared.
pub const MAX_DISTANCE: f32 = f32::MAX;

/// Marker of a missing nominal value.
pub const MISSING_NOMINAL: &str = "?";

/// Distance between two whole instances.
pub trait Metric: Send + Sync + Debug {
    fn distance(&self, a: &Instance, b: &Instance) -> f32;
    /// Name used as part of the cache key of persisted matrices.
    fn name(&self) -> String;
}

/// Distance between two dense vectors without missing values.
pub trait FloatMetric: Send + Sync + Debug {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32;
    fn name(&self) -> String;
}

pub trait SparseMetric: Send + Sync + Debug {
    fn dist(&self, a: &crate::data::SparseVector, b: &crate::data::SparseVector) -> f32;
    fn name(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl FloatMetric for Euclidean {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
    fn name(&self) -> String {
        "euclidean".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Manhattan;

impl FloatMetric for Manhattan {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }
    fn name(&self) -> String {
        "manhattan".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Chebyshev;

impl FloatMetric for Chebyshev {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0., f32::max)
    }
    fn name(&self) -> String {
        "chebyshev".to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Minkowski {
    pub p: f32,
}

impl FloatMetric for Minkowski {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs().powf(self.p))
            .sum::<f32>()
            .powf(1. / self.p)
    }
    fn name(&self) -> String {
        format!("minkowski:{}", self.p)
    }
}

/// 1 - cosine similarity. A zero vector is at distance 1 of everything but another zero vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl FloatMetric for Cosine {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        let (a, b) = (aview1(a), aview1(b));
        let norm = (a.dot(&a) * b.dot(&b)).sqrt();
        if norm == 0. {
            return if a.iter().chain(b.iter()).all(|v| *v == 0.) {
                0.
            } else {
                1.
            };
        }
        (1. - a.dot(&b) / norm).max(0.)
    }
    fn name(&self) -> String {
        "cosine".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCosine;

fn sparse_dot(a: &crate::data::SparseVector, b: &crate::data::SparseVector) -> f32 {
    let (mut i, mut j, mut dot) = (0, 0, 0.);
    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a.values[i] * b.values[j];
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

impl SparseMetric for SparseCosine {
    fn dist(&self, a: &crate::data::SparseVector, b: &crate::data::SparseVector) -> f32 {
        let norm = (sparse_dot(a, a) * sparse_dot(b, b)).sqrt();
        if norm == 0. {
            return if a.values.iter().chain(&b.values).all(|v| *v == 0.) {
                0.
            } else {
                1.
            };
        }
        (1. - sparse_dot(a, b) / norm).max(0.)
    }
    fn name(&self) -> String {
        "sparse-cosine".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SparseManhattan;

impl SparseMetric for SparseManhattan {
    fn dist(&self, a: &crate::data::SparseVector, b: &crate::data::SparseVector) -> f32 {
        let (mut i, mut j, mut d) = (0, 0, 0.);
        while i < a.len() || j < b.len() {
            let ai = a.indices.get(i).copied().unwrap_or(u32::MAX);
            let bj = b.indices.get(j).copied().unwrap_or(u32::MAX);
            if ai < bj {
                d += a.values[i].abs();
                i += 1;
            } else if bj < ai {
                d += b.values[j].abs();
                j += 1;
            } else {
                d += (a.values[i] - b.values[j]).abs();
                i += 1;
                j += 1;
            }
        }
        d
    }
    fn name(&self) -> String {
        "sparse-manhattan".to_string()
    }
}

/// Kernel over the float features. Its induced distance is
/// `sqrt(K(a, a) - 2 K(a, b) + K(b, b))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Linear,
    Polynomial { degree: i32, coef: f32 },
    Rbf { gamma: f32 },
}

impl Kernel {
    pub fn dot(&self, a: &[f32], b: &[f32]) -> f32 {
        match *self {
            Kernel::Linear => aview1(a).dot(&aview1(b)),
            Kernel::Polynomial { degree, coef } => (aview1(a).dot(&aview1(b)) + coef).powi(degree),
            Kernel::Rbf { gamma } => (-gamma * Euclidean.dist(a, b).powi(2)).exp(),
        }
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.dot(a, a) - 2. * self.dot(a, b) + self.dot(b, b))
            .max(0.)
            .sqrt()
    }

    fn name(&self) -> String {
        match self {
            Kernel::Linear => "kernel-linear".to_string(),
            Kernel::Polynomial { degree, coef } => format!("kernel-poly:{}:{}", degree, coef),
            Kernel::Rbf { gamma } => format!("kernel-rbf:{}", gamma),
        }
    }
}

/// How the distances of the sub-metrics are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    Sum,
    /// Root of the sum of squared component distances.
    Euclidean,
    Max,
}

impl Default for Combination {
    fn default() -> Self {
        Combination::Sum
    }
}

/// Float distance with the missing value policy applied.
pub fn float_distance_with_missing(metric: &dyn FloatMetric, a: &[f32], b: &[f32]) -> f32 {
    if a.iter().chain(b).all(|v| v.is_finite()) {
        return metric.dist(a, b);
    }
    let a_any = a.iter().any(|v| v.is_finite());
    let b_any = b.iter().any(|v| v.is_finite());
    match (a_any, b_any) {
        (false, false) => return 0.,
        (true, false) | (false, true) => return MAX_DISTANCE,
        _ => {}
    }
    let (fa, fb): (Vec<f32>, Vec<f32>) = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .unzip();
    if fa.is_empty() {
        return MAX_DISTANCE;
    }
    metric.dist(&fa, &fb)
}

/// Number of nominal features that differ. Missing values are skipped.
pub fn overlap_distance(a: &[String], b: &[String]) -> f32 {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.as_str() != MISSING_NOMINAL && y.as_str() != MISSING_NOMINAL)
        .filter(|(x, y)| x != y)
        .count() as f32
}

#[derive(Debug, Default)]
pub struct CombinedMetric {
    pub float: Option<Box<dyn FloatMetric>>,
    pub integer: Option<Box<dyn FloatMetric>>,
    /// Overlap distance on the nominal features.
    pub nominal: bool,
    pub sparse: Option<Box<dyn SparseMetric>>,
    /// Replaces the float metric if set.
    pub kernel: Option<Kernel>,
    pub combination: Combination,
}

impl CombinedMetric {
    /// Float features only.
    pub fn new(float: Box<dyn FloatMetric>) -> Self {
        CombinedMetric {
            float: Some(float),
            ..Default::default()
        }
    }

    /// Metric from a registry name. Dense names get Manhattan distance on integer and
    /// overlap distance on nominal features, sparse names only look at the sparse vectors.
    pub fn by_name(name: &str) -> Result<Self> {
        if let Ok(sparse) = sparse_metric(name) {
            return Ok(CombinedMetric {
                sparse: Some(sparse),
                ..Default::default()
            });
        }
        Ok(CombinedMetric {
            float: Some(float_metric(name)?),
            integer: Some(Box::new(Manhattan)),
            nominal: true,
            ..Default::default()
        })
    }

    pub fn integer(mut self, metric: Box<dyn FloatMetric>) -> Self {
        self.integer = Some(metric);
        self
    }

    pub fn nominal(mut self) -> Self {
        self.nominal = true;
        self
    }

    pub fn sparse(mut self, metric: Box<dyn SparseMetric>) -> Self {
        self.sparse = Some(metric);
        self
    }

    pub fn kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = Some(kernel);
        self
    }

    pub fn combination(mut self, combination: Combination) -> Self {
        self.combination = combination;
        self
    }

    fn components(&self, a: &Instance, b: &Instance) -> Vec<f32> {
        let mut parts = Vec::with_capacity(4);
        if let Some(kernel) = &self.kernel {
            parts.push(float_distance_with_missing(&KernelMetric(*kernel), &a.floats, &b.floats));
        } else if let Some(m) = &self.float {
            parts.push(float_distance_with_missing(m.as_ref(), &a.floats, &b.floats));
        }
        if let Some(m) = &self.integer {
            if !a.ints.is_empty() {
                let ia: Vec<f32> = a.ints.iter().map(|v| *v as f32).collect();
                let ib: Vec<f32> = b.ints.iter().map(|v| *v as f32).collect();
                parts.push(m.dist(&ia, &ib));
            }
        }
        if self.nominal && !a.nominals.is_empty() {
            parts.push(overlap_distance(&a.nominals, &b.nominals));
        }
        if let Some(m) = &self.sparse {
            match (&a.sparse, &b.sparse) {
                (Some(sa), Some(sb)) => parts.push(m.dist(sa, sb)),
                (None, None) => parts.push(0.),
                _ => parts.push(MAX_DISTANCE),
            }
        }
        parts
    }
}

impl Metric for CombinedMetric {
    fn distance(&self, a: &Instance, b: &Instance) -> f32 {
        let parts = self.components(a, b);
        let d = match self.combination {
            Combination::Sum => parts.iter().sum::<f32>(),
            Combination::Euclidean => parts.iter().map(|p| p * p).sum::<f32>().sqrt(),
            Combination::Max => parts.iter().copied().fold(0., f32::max),
        };
        if d.is_nan() {
            MAX_DISTANCE
        } else {
            d.min(MAX_DISTANCE)
        }
    }

    fn name(&self) -> String {
        let mut name = vec![];
        if let Some(k) = &self.kernel {
            name.push(k.name())
        } else if let Some(m) = &self.float {
            name.push(m.name())
        }
        if let Some(m) = &self.integer {
            name.push(format!("int-{}", m.name()))
        }
        if self.nominal {
            name.push("overlap".to_string())
        }
        if let Some(m) = &self.sparse {
            name.push(m.name())
        }
        let comb = match self.combination {
            Combination::Sum => "sum",
            Combination::Euclidean => "l2",
            Combination::Max => "max",
        };
        format!("{}_{}", name.join("+"), comb)
    }
}

#[derive(Debug)]
struct KernelMetric(Kernel);

impl FloatMetric for KernelMetric {
    fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        self.0.distance(a, b)
    }
    fn name(&self) -> String {
        self.0.name()
    }
}

type FloatFactory = fn() -> Box<dyn FloatMetric>;
type SparseFactory = fn() -> Box<dyn SparseMetric>;

fn float_registry() -> HashMap<&'static str, FloatFactory> {
    let mut reg: HashMap<&'static str, FloatFactory> = HashMap::default();
    reg.insert("euclidean", || Box::new(Euclidean) as Box<dyn FloatMetric>);
    reg.insert("l2", || Box::new(Euclidean) as Box<dyn FloatMetric>);
    reg.insert("manhattan", || Box::new(Manhattan) as Box<dyn FloatMetric>);
    reg.insert("l1", || Box::new(Manhattan) as Box<dyn FloatMetric>);
    reg.insert("chebyshev", || Box::new(Chebyshev) as Box<dyn FloatMetric>);
    reg.insert("cosine", || Box::new(Cosine) as Box<dyn FloatMetric>);
    reg
}

fn sparse_registry() -> HashMap<&'static str, SparseFactory> {
    let mut reg: HashMap<&'static str, SparseFactory> = HashMap::default();
    reg.insert("sparse-cosine", || Box::new(SparseCosine) as Box<dyn SparseMetric>);
    reg.insert("sparse-manhattan", || Box::new(SparseManhattan) as Box<dyn SparseMetric>);
    reg
}

/// Float metric by name. `minkowski:<p>` takes the exponent after the colon.
pub fn float_metric(name: &str) -> Result<Box<dyn FloatMetric>> {
    let name = name.trim().to_lowercase();
    if let Some(p) = name.strip_prefix("minkowski:") {
        let p: f32 = p
            .parse()
            .map_err(|_| Error::UnknownMetric(name.clone()))?;
        if !(p.is_finite() && p >= 1.) {
            return Err(Error::UnknownMetric(name));
        }
        return Ok(Box::new(Minkowski { p }));
    }
    float_registry()
        .get(name.as_str())
        .map(|f| f())
        .ok_or(Error::UnknownMetric(name))
}

pub fn sparse_metric(name: &str) -> Result<Box<dyn SparseMetric>> {
    let name = name.trim().to_lowercase();
    sparse_registry()
        .get(name.as_str())
        .map(|f| f())
        .ok_or(Error::UnknownMetric(name))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::SparseVector;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_float_metrics() {
        let a = [0., 0.];
        let b = [3., 4.];
        assert_abs_diff_eq!(Euclidean.dist(&a, &b), 5.);
        assert_abs_diff_eq!(Manhattan.dist(&a, &b), 7.);
        assert_abs_diff_eq!(Chebyshev.dist(&a, &b), 4.);
        assert_abs_diff_eq!(Minkowski { p: 2. }.dist(&a, &b), 5., epsilon = 1e-5);
        assert_abs_diff_eq!(Cosine.dist(&[1., 0.], &[0., 1.]), 1.);
        assert_abs_diff_eq!(Cosine.dist(&[1., 1.], &[2., 2.]), 0., epsilon = 1e-6);
        assert_abs_diff_eq!(Cosine.dist(&a, &a), 0.);
    }

    #[test]
    fn test_missing_values() {
        let m = Euclidean;
        // second dimension skipped
        assert_abs_diff_eq!(float_distance_with_missing(&m, &[0., f32::NAN], &[3., 1.]), 3.);
        let all_missing = [f32::NAN, f32::NAN];
        assert_eq!(float_distance_with_missing(&m, &all_missing, &all_missing), 0.);
        assert_eq!(
            float_distance_with_missing(&m, &all_missing, &[1., 2.]),
            MAX_DISTANCE
        );
        // no dimension present on both sides
        assert_eq!(
            float_distance_with_missing(&m, &[1., f32::NAN], &[f32::NAN, 2.]),
            MAX_DISTANCE
        );
    }

    #[test]
    fn test_sparse() {
        let a = SparseVector::from_pairs(vec![(0, 1.), (5, 2.)]);
        let b = SparseVector::from_pairs(vec![(5, 1.), (7, 3.)]);
        assert_abs_diff_eq!(SparseManhattan.dist(&a, &b), 1. + 1. + 3.);
        assert_abs_diff_eq!(SparseCosine.dist(&a, &a), 0., epsilon = 1e-6);
        let c = SparseVector::from_pairs(vec![(1, 1.)]);
        assert_abs_diff_eq!(SparseCosine.dist(&a, &c), 1.);
    }

    #[test]
    fn test_kernel_distance() {
        let a = [1., 2.];
        let b = [4., 6.];
        assert_abs_diff_eq!(Kernel::Linear.distance(&a, &b), 5., epsilon = 1e-4);
        assert_abs_diff_eq!(Kernel::Rbf { gamma: 1. }.distance(&a, &a), 0.);
    }

    #[test]
    fn test_combined() {
        let a = Instance {
            floats: vec![0., 0.],
            ints: vec![1],
            nominals: vec!["red".to_string()],
            ..Default::default()
        };
        let b = Instance {
            floats: vec![3., 4.],
            ints: vec![3],
            nominals: vec!["blue".to_string()],
            ..Default::default()
        };
        let m = CombinedMetric::by_name("euclidean").unwrap();
        assert_abs_diff_eq!(m.distance(&a, &b), 5. + 2. + 1.);
        let m = CombinedMetric::by_name("euclidean")
            .unwrap()
            .combination(Combination::Max);
        assert_abs_diff_eq!(m.distance(&a, &b), 5.);
        assert_eq!(m.name(), "euclidean+int-manhattan+overlap_max");
    }

    #[test]
    fn test_sentinel_saturates() {
        let m = CombinedMetric::by_name("euclidean").unwrap();
        let a = Instance::dense(vec![f32::NAN], 0);
        let b = Instance::dense(vec![1.], 0);
        assert_eq!(m.distance(&a, &b), MAX_DISTANCE);
    }

    #[test]
    fn test_registry() {
        assert!(float_metric("Euclidean").is_ok());
        assert!(float_metric("minkowski:0.5").is_err());
        assert!(float_metric("hamming").is_err());
        assert!(sparse_metric("sparse-cosine").is_ok());
        let m = CombinedMetric::by_name("sparse-manhattan").unwrap();
        assert!(m.float.is_none());
        match CombinedMetric::by_name("nope") {
            Err(Error::UnknownMetric(n)) => assert_eq!(n, "nope"),
            _ => panic!("expected unknown metric"),
        }
    }
}
