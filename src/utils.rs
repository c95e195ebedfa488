use crate::{Error, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;

/// Seeded rng. If seed == 0 the rng is seeded from the os.
pub fn create_rng(seed: u64) -> SmallRng {
    if seed == 0 {
        SmallRng::from_entropy()
    } else {
        SmallRng::seed_from_u64(seed)
    }
}

/// Split `0..n` in (at most) `n_chunks` contiguous ranges of near equal length.
/// The first `n % n_chunks` ranges get one extra element.
///
/// # Examples
///
/// ```
/// use hubness_rs::utils::partition;
/// assert_eq!(partition(5, 2), vec![0..3, 3..5]);
/// ```
pub fn partition(n: usize, n_chunks: usize) -> Vec<Range<usize>> {
    let n_chunks = n_chunks.max(1).min(n.max(1));
    let base = n / n_chunks;
    let rest = n % n_chunks;
    let mut ranges = Vec::with_capacity(n_chunks);
    let mut start = 0;
    for c in 0..n_chunks {
        let len = base + if c < rest { 1 } else { 0 };
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Fixed size worker pool for a single heavy operation.
pub fn thread_pool(n_threads: usize) -> Result<ThreadPool> {
    if n_threads == 0 {
        return Err(Error::Config("number of threads must be at least 1".to_string()));
    }
    Ok(ThreadPoolBuilder::new().num_threads(n_threads).build()?)
}

/// Fork-join over the chunks of `0..n`. Every chunk is handed to `f` on a worker of a pool
/// with `n_threads` threads, results are returned in chunk order. A failing chunk is logged
/// and fails the whole operation.
pub fn fork_join<T, F>(n: usize, n_threads: usize, f: F) -> Result<Vec<(Range<usize>, T)>>
where
    T: Send,
    F: Fn(Range<usize>) -> Result<T> + Send + Sync,
{
    use rayon::prelude::*;
    let chunks = partition(n, n_threads);

    let run = |range: Range<usize>| -> Result<(Range<usize>, T)> {
        match f(range.clone()) {
            Ok(t) => Ok((range, t)),
            Err(e) => {
                tracing::error!(start = range.start, end = range.end, "worker failed: {}", e);
                Err(Error::Worker {
                    start: range.start,
                    end: range.end,
                    source: Box::new(e),
                })
            }
        }
    };

    if n_threads <= 1 || chunks.len() <= 1 {
        return chunks.into_iter().map(&run).collect();
    }
    let pool = thread_pool(n_threads)?;
    pool.install(|| chunks.into_par_iter().map(&run).collect())
}
