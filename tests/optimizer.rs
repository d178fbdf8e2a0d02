//! Integration tests for the threshold search over real clustering fitness

use mining_clusters::synthetic::{generate, SyntheticConfig};
use mining_clusters::{
    find_elbow, group_features, optimize, prepare_groups, ClusterConfig, ClusterFitness, ObjectivePartition,
    OptimizerConfig, PipelineConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn test_scenario_fixed_group_front() {
    let dir = tempfile::tempdir().unwrap();
    let features = generate(&SyntheticConfig {
        group_keys: vec!["AUS".to_string()],
        seed: 5,
        ..Default::default()
    });
    let pipeline = PipelineConfig {
        cache_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let outcomes = prepare_groups(group_features(&features), &pipeline);
    assert!(outcomes.failed.is_empty());

    let cluster_config = ClusterConfig::default();
    let fitness = ClusterFitness::new(&outcomes.prepared, &cluster_config, ObjectivePartition::Hierarchical);
    let calls = AtomicUsize::new(0);

    let config = OptimizerConfig {
        lower_bound: 1_000.0,
        upper_bound: 15_000.0,
        population_size: 8,
        generations: 2,
        seed: Some(2024),
        workers: 4,
        ..Default::default()
    };
    let front = optimize(
        |t| {
            calls.fetch_add(1, Ordering::SeqCst);
            fitness.evaluate(t)
        },
        &config,
    )
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 8 * 3);
    assert!(!front.is_empty());
    for pair in front.points().windows(2) {
        assert!(pair[0].fitness.unknown_area < pair[1].fitness.unknown_area);
        assert!(pair[0].fitness.companion_area > pair[1].fitness.companion_area);
    }
    for p in front.points() {
        assert!(p.threshold >= 1_000.0 && p.threshold <= 15_000.0);
        assert_eq!(fitness.evaluate(p.threshold).unwrap(), p.fitness);
    }
}

#[test]
fn test_slow_fitness_still_terminates() {
    let config = OptimizerConfig {
        population_size: 4,
        generations: 3,
        seed: Some(1),
        workers: 2,
        ..Default::default()
    };
    let front = optimize(
        |t| {
            thread::sleep(Duration::from_millis(5));
            Ok(mining_clusters::FitnessVector::new(15_000.0 - t, t))
        },
        &config,
    )
    .unwrap();
    assert_eq!(front.history().len(), 16);
}

#[test]
fn test_elbow_lies_on_front() {
    let config = OptimizerConfig {
        population_size: 10,
        generations: 3,
        seed: Some(9),
        ..Default::default()
    };
    let front = optimize(
        |t| {
            let x = (t - 1_000.0) / 14_000.0;
            Ok(mining_clusters::FitnessVector::new((1.0 - x).powi(4), x))
        },
        &config,
    )
    .unwrap();
    if let Some(elbow) = find_elbow(&front) {
        assert!(front.points().contains(&elbow));
    }
}
