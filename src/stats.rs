//! Hubness statistics over neighbor occurrence arrays.
use crate::neighbors::finder::NeighborSetFinder;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

fn as_f64(occurrences: &[u32]) -> Vec<f64> {
    occurrences.iter().map(|o| *o as f64).collect()
}

/// Standardized central moment of order `order`. 0 for constant data.
fn standardized_moment(occurrences: &[u32], order: i32) -> f64 {
    if occurrences.is_empty() {
        return 0.;
    }
    let v = as_f64(occurrences);
    let mean = v.iter().mean();
    let std = v.iter().population_std_dev();
    if !(std > 0.) {
        return 0.;
    }
    v.iter().map(|x| ((x - mean) / std).powi(order)).sum::<f64>() / v.len() as f64
}

/// Skewness of the occurrence distribution. The usual measure of hubness: large positive
/// values mean a few points occur in very many neighbor lists.
///
/// # Examples
///
/// ```
/// use hubness_rs::stats::skewness;
/// assert_eq!(skewness(&[1, 1, 1, 1]), 0.);
/// assert!(skewness(&[0, 0, 0, 0, 5]) > 1.);
/// ```
pub fn skewness(occurrences: &[u32]) -> f64 {
    standardized_moment(occurrences, 3)
}

/// Excess kurtosis of the occurrence distribution. 0 for constant data.
pub fn kurtosis(occurrences: &[u32]) -> f64 {
    match standardized_moment(occurrences, 4) {
        m if m == 0. => 0.,
        m => m - 3.,
    }
}

/// Points that occur more than two standard deviations above the mean occurrence.
pub fn hubs(occurrences: &[u32]) -> Vec<usize> {
    if occurrences.is_empty() {
        return vec![];
    }
    let v = as_f64(occurrences);
    let threshold = v.iter().mean() + 2. * v.iter().population_std_dev();
    v.iter()
        .enumerate()
        .filter(|(_, o)| **o > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Points in no neighbor list at all (orphans).
pub fn anti_hubs(occurrences: &[u32]) -> Vec<usize> {
    occurrences
        .iter()
        .enumerate()
        .filter(|(_, o)| **o == 0)
        .map(|(i, _)| i)
        .collect()
}

/// Share of all occurrences that are label mismatches.
pub fn bad_hubness_ratio(occurrences: &[u32], bad_occurrences: &[u32]) -> f64 {
    let total: u64 = occurrences.iter().map(|o| *o as u64).sum();
    if total == 0 {
        return 0.;
    }
    bad_occurrences.iter().map(|o| *o as u64).sum::<u64>() as f64 / total as f64
}

/// Entropy (nats) of the labels among the reverse neighbors of every point. 0 for points
/// without labeled reverse neighbors.
pub fn reverse_neighbor_entropies(nsf: &NeighborSetFinder) -> Vec<f64> {
    (0..nsf.len())
        .map(|i| {
            let counts = nsf.class_occurrences(i);
            let total: u32 = counts.iter().sum();
            if total == 0 {
                return 0.;
            }
            counts
                .iter()
                .filter(|c| **c > 0)
                .map(|c| {
                    let p = *c as f64 / total as f64;
                    -p * p.ln()
                })
                .sum()
        })
        .collect()
}

/// Summary of the neighbor occurrence distribution at one neighborhood size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubnessStats {
    pub k: usize,
    pub skewness: f64,
    pub kurtosis: f64,
    pub max_occurrence: u32,
    pub n_hubs: usize,
    pub n_anti_hubs: usize,
    pub bad_hubness_ratio: f64,
}

impl HubnessStats {
    pub fn from_finder(nsf: &NeighborSetFinder) -> Result<Self> {
        let k = nsf.k().ok_or(Error::NotComputed)?;
        let occ = nsf.occurrences();
        Ok(HubnessStats {
            k,
            skewness: skewness(occ),
            kurtosis: kurtosis(occ),
            max_occurrence: occ.iter().copied().max().unwrap_or(0),
            n_hubs: hubs(occ).len(),
            n_anti_hubs: anti_hubs(occ).len(),
            bad_hubness_ratio: bad_hubness_ratio(occ, nsf.bad_occurrences()),
        })
    }
}
