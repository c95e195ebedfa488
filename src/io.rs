//! Persisted distance matrices.
//!
//! The text format has one line per point with the upper triangular part of its row,
//! `n - i - 1` values separated by commas (spaces are accepted on read). Values are written
//! in their shortest round-trip representation, so reading back gives the identical floats.
//! The last line of a matrix is therefore empty.
use crate::data::{Dataset, Normalization};
use crate::matrix::DistanceMatrix;
use crate::metric::Metric;
use crate::{Error, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn write_matrix<W: Write>(dm: &DistanceMatrix, writer: W) -> Result<()> {
    let mut w = BufWriter::new(writer);
    for row in dm.rows() {
        writeln!(w, "{}", row.iter().join(","))?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_matrix<R: Read>(reader: R) -> Result<DistanceMatrix> {
    let mut rows = vec![];
    for (line_nr, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f32>().map_err(|e| Error::Parse {
                    line: line_nr + 1,
                    msg: format!("{:?}: {}", s, e),
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        rows.push(row);
    }
    DistanceMatrix::from_rows(rows)
}

pub fn save_matrix<P: AsRef<Path>>(dm: &DistanceMatrix, path: P) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    write_matrix(dm, File::create(path)?)
}

pub fn load_matrix<P: AsRef<Path>>(path: P) -> Result<DistanceMatrix> {
    read_matrix(File::open(path)?)
}

/// Compact binary dump.
pub fn dump_matrix<P: AsRef<Path>>(dm: &DistanceMatrix, path: P) -> Result<()> {
    let blob = bincode::serialize(dm)?;
    let mut f = File::create(path)?;
    f.write_all(&blob)?;
    Ok(())
}

pub fn load_dump<P: AsRef<Path>>(path: P) -> Result<DistanceMatrix> {
    let mut f = File::open(path)?;
    let mut buf: Vec<u8> = vec![];
    f.read_to_end(&mut buf)?;
    let dm: DistanceMatrix = bincode::deserialize(&buf)?;
    // row lengths are not checked by serde
    DistanceMatrix::from_rows(dm.rows().to_vec())
}

/// Identifies a persisted matrix: the metric and the normalization it was computed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixCacheKey {
    pub metric: String,
    pub normalization: Normalization,
}

impl MatrixCacheKey {
    pub fn new(metric: &dyn Metric, normalization: Normalization) -> Self {
        MatrixCacheKey {
            metric: metric.name(),
            normalization,
        }
    }

    /// Directory segment, safe for file systems.
    pub fn path_segment(&self) -> String {
        let metric: String = self
            .metric
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}__{}", metric, self.normalization.name())
    }
}

/// Directory of persisted matrices, laid out as `<root>/<metric>__<normalization>/<dataset>.dmat`.
#[derive(Debug, Clone)]
pub struct DistanceCache {
    root: PathBuf,
}

impl DistanceCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DistanceCache {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, key: &MatrixCacheKey, dataset_name: &str) -> PathBuf {
        self.root
            .join(key.path_segment())
            .join(format!("{}.dmat", dataset_name))
    }

    /// Load the matrix of `dataset` if it was persisted before, otherwise compute and
    /// persist it. A persisted matrix of the wrong size is an error: the dataset order must be
    /// the one it was computed on.
    pub fn load_or_compute(
        &self,
        dataset_name: &str,
        dataset: &Dataset,
        metric: &dyn Metric,
        normalization: Normalization,
        n_threads: usize,
    ) -> Result<DistanceMatrix> {
        let key = MatrixCacheKey::new(metric, normalization);
        let path = self.path(&key, dataset_name);
        if path.exists() {
            debug!("loading distance matrix from {:?}", path);
            let dm = load_matrix(&path)?;
            if dm.len() != dataset.len() {
                return Err(Error::DimensionMismatch(format!(
                    "cached matrix {:?} has {} points, dataset has {}",
                    path,
                    dm.len(),
                    dataset.len()
                )));
            }
            return Ok(dm);
        }
        let dm = DistanceMatrix::compute(dataset, metric, n_threads)?;
        save_matrix(&dm, &path)?;
        debug!("distance matrix stored at {:?}", path);
        Ok(dm)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::CombinedMetric;
    use crate::test_utils::random_dataset;

    fn tmp_dir(name: &str) -> PathBuf {
        let mut tmp = std::env::temp_dir();
        tmp.push("hubness-rs");
        tmp.push(format!("{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    #[test]
    fn test_text_round_trip_exact() {
        let ds = random_dataset(23, 7, 2, 13);
        let metric = CombinedMetric::by_name("euclidean").unwrap();
        let dm = DistanceMatrix::compute(&ds, &metric, 2).unwrap();
        let mut buf = vec![];
        write_matrix(&dm, &mut buf).unwrap();
        let back = read_matrix(buf.as_slice()).unwrap();
        assert_eq!(back, dm);
    }

    #[test]
    fn test_read_spaces_and_errors() {
        let dm = read_matrix("1 2.5\n0.25\n\n".as_bytes()).unwrap();
        assert_eq!(dm.get(0, 2), 2.5);
        assert_eq!(dm.get(2, 1), 0.25);

        match read_matrix("1,x\n2\n\n".as_bytes()) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 1),
            _ => panic!("expected parse error"),
        }
        assert!(read_matrix("1,2\n\n\n".as_bytes()).is_err());
        assert!(read_matrix("".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_dump_and_cache() {
        let dir = tmp_dir("cache");
        let ds = random_dataset(15, 3, 2, 2);
        let metric = CombinedMetric::by_name("manhattan").unwrap();
        let cache = DistanceCache::new(&dir);

        let dm = cache
            .load_or_compute("toy", &ds, &metric, Normalization::MinMax, 2)
            .unwrap();
        let key = MatrixCacheKey::new(&metric, Normalization::MinMax);
        let path = cache.path(&key, "toy");
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("__minmax"));
        let again = cache
            .load_or_compute("toy", &ds, &metric, Normalization::MinMax, 1)
            .unwrap();
        assert_eq!(dm, again);

        let smaller = random_dataset(14, 3, 2, 2);
        assert!(cache
            .load_or_compute("toy", &smaller, &metric, Normalization::MinMax, 1)
            .is_err());

        let bin = dir.join("toy.bincode");
        dump_matrix(&dm, &bin).unwrap();
        assert_eq!(load_dump(&bin).unwrap(), dm);
    }
}
