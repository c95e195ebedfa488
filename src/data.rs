//! Data points. Instances own their feature values, the [`Dataset`] owns the schema
//! that gives them a meaning. The position of an instance within the dataset is its
//! identity in every distance matrix and neighbor list of this crate.
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Class label of unlabeled / noise instances.
pub const NOISE_LABEL: i32 = -1;

/// Bag-of-words style vector. Indices are strictly ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build from (index, value) pairs in any order. Duplicate indices are summed.
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let mut sv = SparseVector::default();
        for (i, v) in pairs {
            match sv.indices.last() {
                Some(&last) if last == i => {
                    if let Some(l) = sv.values.last_mut() {
                        *l += v
                    }
                }
                _ => {
                    sv.indices.push(i);
                    sv.values.push(v);
                }
            }
        }
        sv
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// Names of the features, shared by all instances of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub float_names: Vec<String>,
    pub int_names: Vec<String>,
    pub nominal_names: Vec<String>,
}

impl FeatureSchema {
    /// Schema with generated names for the given number of float, integer and nominal features.
    pub fn with_sizes(n_float: usize, n_int: usize, n_nominal: usize) -> Self {
        FeatureSchema {
            float_names: (0..n_float).map(|i| format!("f{}", i)).collect(),
            int_names: (0..n_int).map(|i| format!("i{}", i)).collect(),
            nominal_names: (0..n_nominal).map(|i| format!("n{}", i)).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub floats: Vec<f32>,
    pub ints: Vec<i32>,
    pub nominals: Vec<String>,
    pub sparse: Option<SparseVector>,
    pub label: i32,
}

impl Instance {
    /// Float only instance.
    pub fn dense(floats: Vec<f32>, label: i32) -> Self {
        Instance {
            floats,
            label,
            ..Default::default()
        }
    }

    pub fn is_noise(&self) -> bool {
        self.label < 0
    }
}

/// How float features are rescaled before distances are computed. Part of the key under
/// which a persisted distance matrix is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Normalization {
    None,
    /// Every float feature to [0, 1].
    MinMax,
    /// Every float feature to zero mean, unit variance.
    Standardize,
    /// Term frequency - inverse document frequency on the sparse vectors.
    TfIdf,
}

impl Normalization {
    pub fn name(&self) -> &'static str {
        match self {
            Normalization::None => "no_norm",
            Normalization::MinMax => "minmax",
            Normalization::Standardize => "standardize",
            Normalization::TfIdf => "tfidf",
        }
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: FeatureSchema,
    pub instances: Vec<Instance>,
}

impl Dataset {
    pub fn new(schema: FeatureSchema) -> Self {
        Dataset {
            schema,
            instances: vec![],
        }
    }

    /// Dataset of float only points.
    ///
    /// # Examples
    ///
    /// ```
    /// use hubness_rs::Dataset;
    /// let ds = Dataset::from_dense(&[vec![0., 1.], vec![2., 3.]], &[0, 1]).unwrap();
    /// assert_eq!(ds.len(), 2);
    /// ```
    pub fn from_dense(points: &[Vec<f32>], labels: &[i32]) -> Result<Self> {
        if points.len() != labels.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} points but {} labels",
                points.len(),
                labels.len()
            )));
        }
        let dim = points.first().map(|p| p.len()).unwrap_or(0);
        let mut ds = Dataset::new(FeatureSchema::with_sizes(dim, 0, 0));
        for (p, &l) in points.iter().zip(labels) {
            ds.push(Instance::dense(p.clone(), l))?;
        }
        Ok(ds)
    }

    /// Append an instance. Its feature lengths have to match the schema.
    pub fn push(&mut self, instance: Instance) -> Result<()> {
        let s = &self.schema;
        if instance.floats.len() != s.float_names.len()
            || instance.ints.len() != s.int_names.len()
            || instance.nominals.len() != s.nominal_names.len()
        {
            return Err(Error::DimensionMismatch(format!(
                "instance has ({}, {}, {}) float/int/nominal features, schema expects ({}, {}, {})",
                instance.floats.len(),
                instance.ints.len(),
                instance.nominals.len(),
                s.float_names.len(),
                s.int_names.len(),
                s.nominal_names.len()
            )));
        }
        self.instances.push(instance);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn labels(&self) -> Vec<i32> {
        self.instances.iter().map(|i| i.label).collect()
    }

    /// Number of classes, i.e. the highest non noise label + 1.
    pub fn n_classes(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| !i.is_noise())
            .map(|i| i.label as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Rescale the features in place. Non finite (missing) values are left untouched and
    /// ignored while estimating the scaling.
    pub fn normalize(&mut self, normalization: Normalization) {
        match normalization {
            Normalization::None => {}
            Normalization::MinMax => self.normalize_min_max(),
            Normalization::Standardize => self.standardize(),
            Normalization::TfIdf => self.tf_idf(),
        }
    }

    fn normalize_min_max(&mut self) {
        let dim = self.schema.float_names.len();
        for d in 0..dim {
            let (min, max) = self
                .instances
                .iter()
                .map(|i| i.floats[d])
                .filter(|v| v.is_finite())
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let range = max - min;
            for inst in self.instances.iter_mut() {
                let v = &mut inst.floats[d];
                if v.is_finite() {
                    *v = if range > 0. { (*v - min) / range } else { 0. };
                }
            }
        }
    }

    fn standardize(&mut self) {
        let dim = self.schema.float_names.len();
        for d in 0..dim {
            let finite: Vec<f64> = self
                .instances
                .iter()
                .map(|i| i.floats[d] as f64)
                .filter(|v| v.is_finite())
                .collect();
            if finite.is_empty() {
                continue;
            }
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64;
            let std = var.sqrt();
            for inst in self.instances.iter_mut() {
                let v = &mut inst.floats[d];
                if v.is_finite() {
                    *v = if std > 0. {
                        ((*v as f64 - mean) / std) as f32
                    } else {
                        0.
                    };
                }
            }
        }
    }

    fn tf_idf(&mut self) {
        let n_docs = self.instances.iter().filter(|i| i.sparse.is_some()).count();
        if n_docs == 0 {
            return;
        }
        let mut doc_freq = fnv::FnvHashMap::<u32, usize>::default();
        for sv in self.instances.iter().filter_map(|i| i.sparse.as_ref()) {
            for (idx, v) in sv.iter() {
                if v != 0. {
                    *doc_freq.entry(idx).or_insert(0) += 1;
                }
            }
        }
        for sv in self.instances.iter_mut().filter_map(|i| i.sparse.as_mut()) {
            let total: f32 = sv.values.iter().sum();
            if total <= 0. {
                continue;
            }
            for (idx, v) in sv.indices.iter().zip(sv.values.iter_mut()) {
                let df = *doc_freq.get(idx).unwrap_or(&1) as f32;
                *v = (*v / total) * (n_docs as f32 / df).ln();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_push_validates_schema() {
        let mut ds = Dataset::new(FeatureSchema::with_sizes(2, 1, 0));
        assert!(ds.push(Instance::dense(vec![1., 2.], 0)).is_err());
        let inst = Instance {
            floats: vec![1., 2.],
            ints: vec![3],
            ..Default::default()
        };
        assert!(ds.push(inst).is_ok());
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_n_classes() {
        let ds =
            Dataset::from_dense(&[vec![0.], vec![1.], vec![2.]], &[0, 2, NOISE_LABEL]).unwrap();
        assert_eq!(ds.n_classes(), 3);
    }

    #[test]
    fn test_min_max() {
        let mut ds =
            Dataset::from_dense(&[vec![0., 5.], vec![10., 5.], vec![f32::NAN, 5.]], &[0, 0, 0])
                .unwrap();
        ds.normalize(Normalization::MinMax);
        assert_abs_diff_eq!(ds.instances[1].floats[0], 1.);
        assert!(ds.instances[2].floats[0].is_nan());
        assert_abs_diff_eq!(ds.instances[0].floats[1], 0.);
    }

    #[test]
    fn test_standardize() {
        let mut ds = Dataset::from_dense(&[vec![1.], vec![3.]], &[0, 1]).unwrap();
        ds.normalize(Normalization::Standardize);
        assert_abs_diff_eq!(ds.instances[0].floats[0], -1.);
        assert_abs_diff_eq!(ds.instances[1].floats[0], 1.);
    }

    #[test]
    fn test_sparse_from_pairs() {
        let sv = SparseVector::from_pairs(vec![(3, 1.), (1, 2.), (3, 0.5)]);
        assert_eq!(sv.indices, vec![1, 3]);
        assert_eq!(sv.values, vec![2., 1.5]);
    }

    #[test]
    fn test_tf_idf() {
        let mut ds = Dataset::new(FeatureSchema::default());
        for pairs in vec![vec![(0, 1.), (1, 1.)], vec![(0, 1.)]] {
            ds.push(Instance {
                sparse: Some(SparseVector::from_pairs(pairs)),
                ..Default::default()
            })
            .unwrap();
        }
        ds.normalize(Normalization::TfIdf);
        // term 0 occurs in every document
        let sv = ds.instances[0].sparse.as_ref().unwrap();
        assert_abs_diff_eq!(sv.values[0], 0.);
        assert_abs_diff_eq!(sv.values[1], 0.5 * 2f32.ln());
    }
}
