//! End-to-end runs over synthetic groups

use mining_clusters::synthetic::{generate, SyntheticConfig};
use mining_clusters::{run, ObjectivePartition, OptimizerConfig, PipelineConfig};
use std::collections::HashSet;

fn config(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        cache_dir: dir.to_path_buf(),
        optimizer: OptimizerConfig {
            population_size: 6,
            generations: 2,
            seed: Some(17),
            workers: 2,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_run_assigns_every_feature() {
    let dir = tempfile::tempdir().unwrap();
    let features = generate(&SyntheticConfig::default());
    let report = run(&features, &config(dir.path())).unwrap();

    assert!(report.failed_groups.is_empty());
    assert_eq!(report.assignments.len(), features.len());
    assert!(report.threshold >= 1_000.0 && report.threshold <= 15_000.0);

    let ids: HashSet<&str> = report.assignments.iter().map(|a| a.feature_id.as_str()).collect();
    assert_eq!(ids.len(), features.len());
    for a in &report.assignments {
        assert!(a.hierarchical_cluster.starts_with(&format!("{}-", a.group_key)));
        assert!(a.density_cluster.starts_with(&format!("{}-", a.group_key)));
    }

    assert!(dir.path().join("AUS.bin").exists());
    assert!(dir.path().join("CHL.bin").exists());

    let summarized: usize = report
        .summaries
        .values()
        .flat_map(|s| s.iter().map(|c| c.feature_ids.len()))
        .sum();
    assert_eq!(summarized, features.len());
}

#[test]
fn test_rerun_from_cache_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let features = generate(&SyntheticConfig::default());
    let cfg = config(dir.path());

    let first = run(&features, &cfg).unwrap();
    let second = run(&features, &cfg).unwrap();

    assert_eq!(first.front, second.front);
    assert_eq!(first.threshold, second.threshold);
    assert_eq!(first.assignments, second.assignments);
}

#[test]
fn test_density_objective() {
    let dir = tempfile::tempdir().unwrap();
    let features = generate(&SyntheticConfig { seed: 8, ..Default::default() });
    let cfg = PipelineConfig {
        objective_partition: ObjectivePartition::Density,
        ..config(dir.path())
    };
    let report = run(&features, &cfg).unwrap();
    assert!(!report.front.is_empty());
    for p in report.front.points() {
        for q in report.front.points() {
            assert!(!q.fitness.dominates(&p.fitness));
        }
    }
}
