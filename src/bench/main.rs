//! Times the heavy operations on gaussian data and prints the hubness per k.
//!
//! `bench [n] [dim] [k_max] [threads]`, log level through `RUST_LOG`.
use anyhow::Context;
use hubness_rs::prelude::*;
use hubness_rs::utils::create_rng;
use rand::Rng;
use rand_distr::StandardNormal;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hubness_rs=info,bench=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn arg(pos: usize, default: usize) -> anyhow::Result<usize> {
    match std::env::args().nth(pos) {
        Some(a) => a
            .parse()
            .with_context(|| format!("argument {} should be a number, got {:?}", pos, a)),
        None => Ok(default),
    }
}

fn gaussian(n: usize, dim: usize, seed: u64) -> Result<Dataset> {
    let mut rng = create_rng(seed);
    let points: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..dim).map(|_| rng.sample(StandardNormal)).collect())
        .collect();
    let labels: Vec<i32> = (0..n).map(|i| (i % 2) as i32).collect();
    Dataset::from_dense(&points, &labels)
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let n = arg(1, 2000)?;
    let dim = arg(2, 100)?;
    let k_max = arg(3, 10)?;
    let n_threads = arg(4, 4)?;

    let cfg = ExperimentConfig {
        k_min: 1,
        k_max,
        n_threads,
        secondary: SecondaryKind::MutualProximity { sample_size: None },
        seed: 1,
        ..Default::default()
    };
    let mut condition = ExperimentCondition::new(cfg, gaussian(n, dim, 1)?)?;

    let t0 = Instant::now();
    condition.distances()?;
    println!("distance matrix: {:?}", t0.elapsed());

    let t0 = Instant::now();
    let primary = condition.sweep_k()?;
    println!("neighbor sets + sweep: {:?}", t0.elapsed());

    let t0 = Instant::now();
    let secondary = condition.secondary_sweep_k()?;
    println!("mutual proximity + sweep: {:?}", t0.elapsed());

    println!("{:>4} {:>10} {:>10} {:>8}", "k", "skew", "skew mp", "max N_k");
    for (p, s) in primary.iter().zip(&secondary) {
        println!(
            "{:>4} {:>10.3} {:>10.3} {:>8}",
            p.k, p.skewness, s.skewness, p.max_occurrence
        );
    }
    condition.release();
    Ok(())
}
