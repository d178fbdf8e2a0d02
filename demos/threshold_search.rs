//! Example: searching the clustering threshold on synthetic mining data
//!
//! Run with: RUST_LOG=info cargo run --example threshold_search

use mining_clusters::synthetic::{generate, SyntheticConfig};
use mining_clusters::{run, OptimizerConfig, PipelineConfig};

fn main() -> mining_clusters::Result<()> {
    env_logger::init();

    let features = generate(&SyntheticConfig::default());
    let cache_dir = tempfile::tempdir()?;

    let config = PipelineConfig {
        cache_dir: cache_dir.path().to_path_buf(),
        optimizer: OptimizerConfig {
            population_size: 12,
            generations: 6,
            seed: Some(42),
            ..Default::default()
        },
        ..Default::default()
    };

    let report = run(&features, &config)?;

    println!("Pareto front ({} points):", report.front.len());
    for p in report.front.points() {
        println!(
            "  {:>8.0} m  unknown {:>6.3} km²  companion {:>6.3} km²",
            p.threshold, p.fitness.unknown_area, p.fitness.companion_area
        );
    }
    println!("Chosen threshold: {:.0} m", report.threshold);

    for (group, summaries) in &report.summaries {
        println!("{}: {} clusters", group, summaries.len());
        for s in summaries {
            println!(
                "  #{:<3} {:?} {:>6.3} km²  {:?}",
                s.cluster_id, s.class, s.area, s.commodities
            );
        }
    }
    Ok(())
}
