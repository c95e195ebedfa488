use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Invalid neighborhood size k = {k}: {reason}")]
    InvalidK { k: usize, reason: String },
    #[error("Non-finite distance {value} between points {i} and {j}")]
    NonFiniteDistance { i: usize, j: usize, value: f32 },
    #[error("No distance matrix available, call calculate_distances first")]
    MissingDistances,
    #[error("Neighbor sets are not computed, call calculate_neighbor_sets first")]
    NotComputed,
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
    #[error("Distance matrix for {n} points needs {required} bytes, limit is {limit}")]
    MatrixTooLarge {
        n: usize,
        required: usize,
        limit: usize,
    },
    #[error("Could not parse line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("Worker for rows {start}..{end} failed: {source}")]
    Worker {
        start: usize,
        end: usize,
        source: Box<Error>,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    SerializationFailed(#[from] std::boxed::Box<bincode::ErrorKind>),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::InvalidK {
            k: 0,
            reason: "k must be at least 1".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Invalid neighborhood size k = 0: k must be at least 1"
        );

        let e = Error::Worker {
            start: 0,
            end: 10,
            source: Box::new(Error::NonFiniteDistance {
                i: 1,
                j: 2,
                value: f32::NAN,
            }),
        };
        assert!(e.to_string().starts_with("Worker for rows 0..10 failed"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_impl<T: Send + Sync + std::error::Error>() {}
        assert_impl::<Error>();
    }
}
