//! # Pipeline
//!
//! Multi-group orchestration: group features by key, build (or load) each
//! group's distance matrix, search the threshold over all groups at once and
//! assign final clusters.
//!
//! Groups are independent. A group whose matrix cannot be built is logged and
//! reported in [`GroupOutcomes::failed`]; the remaining groups carry on.
//!
//! ## Example
//!
//! ```rust
//! use mining_clusters::{run, synthetic, OptimizerConfig, PipelineConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let features = synthetic::generate(&synthetic::SyntheticConfig { seed: 3, ..Default::default() });
//!
//! let config = PipelineConfig {
//!     cache_dir: dir.path().to_path_buf(),
//!     optimizer: OptimizerConfig { population_size: 6, generations: 2, seed: Some(3), ..Default::default() },
//!     ..Default::default()
//! };
//! let report = run(&features, &config).unwrap();
//!
//! assert!(!report.front.is_empty());
//! assert_eq!(report.assignments.len(), features.len());
//! ```

use crate::clustering::{check_threshold, density_partition};
use crate::{
    compute_or_load, evaluate, find_elbow, optimize, summarize, ClusterConfig, ClusterError,
    ClusterResult, ClusterSummary, DistanceConfig, DistanceMatrix, Feature, FitnessVector,
    OptimizerConfig, ParetoFront, Partition, Result, SingleLinkage,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// Which partition the threshold search scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectivePartition {
    #[default]
    Hierarchical,
    Density,
}

/// Configuration for a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub distance: DistanceConfig,
    pub cluster: ClusterConfig,
    pub optimizer: OptimizerConfig,

    /// Directory holding one cached matrix per group. Default: "distance_cache"
    pub cache_dir: PathBuf,

    /// Partition scored during the search. Default: Hierarchical
    pub objective_partition: ObjectivePartition,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            distance: DistanceConfig::default(),
            cluster: ClusterConfig::default(),
            optimizer: OptimizerConfig::default(),
            cache_dir: PathBuf::from("distance_cache"),
            objective_partition: ObjectivePartition::default(),
        }
    }
}

/// Split features by `group_key`, keeping input order within each group.
pub fn group_features(features: &[Feature]) -> BTreeMap<String, Vec<Feature>> {
    let mut groups: BTreeMap<String, Vec<Feature>> = BTreeMap::new();
    for feature in features {
        groups
            .entry(feature.group_key.clone())
            .or_default()
            .push(feature.clone());
    }
    groups
}

// ============================================================================
// Prepared Groups
// ============================================================================

/// A group ready for clustering: its features, its matrix (absent below two
/// features) and the single-linkage tree built from that matrix.
#[derive(Debug, Clone)]
pub struct PreparedGroup {
    pub group_key: String,
    pub features: Vec<Feature>,
    pub matrix: Option<DistanceMatrix>,
    linkage: Option<SingleLinkage>,
}

impl PreparedGroup {
    /// Validate `matrix` and the feature attributes, then build the linkage tree.
    ///
    /// Attributes are checked here so that a bad record fails its own group
    /// instead of every later fitness evaluation.
    pub fn new(group_key: &str, features: Vec<Feature>, matrix: Option<DistanceMatrix>) -> Result<Self> {
        summarize(&Partition::singletons(&features), &features)?;
        let linkage = matrix.as_ref().map(SingleLinkage::from_matrix).transpose()?;
        Ok(Self {
            group_key: group_key.to_string(),
            features,
            matrix,
            linkage,
        })
    }

    pub fn hierarchical(&self, threshold: f64) -> Partition {
        match &self.linkage {
            Some(linkage) => linkage.partition(&self.features, threshold),
            None => Partition::singletons(&self.features),
        }
    }

    pub fn density(&self, threshold: f64, config: &ClusterConfig) -> Partition {
        density_partition(&self.features, self.matrix.as_ref(), threshold, config.min_neighbors)
    }

    /// Both partitions at `threshold`.
    pub fn cluster(&self, threshold: f64, config: &ClusterConfig) -> Result<ClusterResult> {
        check_cluster_args(threshold, config)?;
        Ok(ClusterResult {
            threshold,
            hierarchical: self.hierarchical(threshold),
            density: self.density(threshold, config),
        })
    }
}

fn check_cluster_args(threshold: f64, config: &ClusterConfig) -> Result<()> {
    check_threshold(threshold)?;
    if config.min_neighbors == 0 {
        return Err(ClusterError::config("min_neighbors must be at least 1"));
    }
    Ok(())
}

/// Result of preparing every group.
#[derive(Debug, Default)]
pub struct GroupOutcomes {
    pub prepared: Vec<PreparedGroup>,
    pub failed: Vec<(String, ClusterError)>,
}

/// Build or load the matrix of every group. Failures are isolated per group.
pub fn prepare_groups(groups: BTreeMap<String, Vec<Feature>>, config: &PipelineConfig) -> GroupOutcomes {
    let start = Instant::now();
    let total = groups.len();
    let mut outcomes = GroupOutcomes::default();

    for (group_key, features) in groups {
        let prepared = compute_or_load(&features, &group_key, &config.cache_dir, &config.distance)
            .and_then(|matrix| PreparedGroup::new(&group_key, features, matrix));
        match prepared {
            Ok(group) => outcomes.prepared.push(group),
            Err(e) => {
                warn!("[Pipeline] Group {} failed: {}", group_key, e);
                outcomes.failed.push((group_key, e));
            }
        }
    }

    info!(
        "[Pipeline] Prepared {}/{} groups in {}ms",
        outcomes.prepared.len(),
        total,
        start.elapsed().as_millis()
    );
    outcomes
}

// ============================================================================
// Fitness
// ============================================================================

/// Fitness of a threshold summed over a set of prepared groups.
pub struct ClusterFitness<'a> {
    groups: &'a [PreparedGroup],
    config: &'a ClusterConfig,
    partition: ObjectivePartition,
}

impl<'a> ClusterFitness<'a> {
    pub fn new(groups: &'a [PreparedGroup], config: &'a ClusterConfig, partition: ObjectivePartition) -> Self {
        Self { groups, config, partition }
    }

    pub fn evaluate(&self, threshold: f64) -> Result<FitnessVector> {
        check_cluster_args(threshold, self.config)?;
        self.groups
            .iter()
            .map(|group| {
                let partition = match self.partition {
                    ObjectivePartition::Hierarchical => group.hierarchical(threshold),
                    ObjectivePartition::Density => group.density(threshold, self.config),
                };
                evaluate(&partition, &group.features)
            })
            .sum()
    }
}

// ============================================================================
// Assignment
// ============================================================================

/// Final cluster labels of one feature. Labels are `"<group_key>-<id>"`, so
/// they are unique across groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub feature_id: String,
    pub group_key: String,
    pub hierarchical_cluster: String,
    pub density_cluster: String,
}

/// Cluster every prepared group at `threshold`.
pub fn assign_clusters(
    groups: &[PreparedGroup],
    threshold: f64,
    config: &ClusterConfig,
) -> Result<Vec<ClusterAssignment>> {
    let mut assignments = Vec::new();
    for group in groups {
        let result = group.cluster(threshold, config)?;
        for ((id, h), (_, d)) in result.hierarchical.iter().zip(result.density.iter()) {
            assignments.push(ClusterAssignment {
                feature_id: id.to_string(),
                group_key: group.group_key.clone(),
                hierarchical_cluster: format!("{}-{}", group.group_key, h),
                density_cluster: format!("{}-{}", group.group_key, d),
            });
        }
    }
    Ok(assignments)
}

// ============================================================================
// Run
// ============================================================================

/// A group that could not be prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedGroup {
    pub group_key: String,
    pub error: String,
}

/// Everything a full run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub front: ParetoFront,
    /// Threshold used for the assignments
    pub threshold: f64,
    pub assignments: Vec<ClusterAssignment>,
    /// Hierarchical cluster summaries at `threshold`, per group
    pub summaries: BTreeMap<String, Vec<ClusterSummary>>,
    pub failed_groups: Vec<FailedGroup>,
}

impl PipelineReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Group, prepare, search, pick a threshold and assign.
///
/// The threshold is the elbow of the front, or its first point (lowest
/// `unknown_area`) when the front is too small for an elbow.
pub fn run(features: &[Feature], config: &PipelineConfig) -> Result<PipelineReport> {
    config.optimizer.validate()?;
    let start = Instant::now();

    let outcomes = prepare_groups(group_features(features), config);
    if outcomes.prepared.is_empty() {
        return Err(ClusterError::integrity(format!(
            "no feature group could be prepared ({} failed)",
            outcomes.failed.len()
        )));
    }
    let groups = outcomes.prepared;

    let fitness = ClusterFitness::new(&groups, &config.cluster, config.objective_partition);
    let front = optimize(|t| fitness.evaluate(t), &config.optimizer)?;

    let threshold = find_elbow(&front)
        .or_else(|| front.points().first().copied())
        .map(|p| p.threshold)
        .ok_or_else(|| ClusterError::integrity("threshold search produced an empty front"))?;

    let assignments = assign_clusters(&groups, threshold, &config.cluster)?;
    let mut summaries = BTreeMap::new();
    for group in &groups {
        summaries.insert(group.group_key.clone(), summarize(&group.hierarchical(threshold), &group.features)?);
    }

    let failed_groups = outcomes
        .failed
        .into_iter()
        .map(|(group_key, e)| FailedGroup {
            group_key,
            error: e.to_string(),
        })
        .collect();

    info!(
        "[Pipeline] {} features in {} groups: front of {}, threshold {:.1}m, done in {}ms",
        features.len(),
        groups.len(),
        front.len(),
        threshold,
        start.elapsed().as_millis()
    );

    Ok(PipelineReport {
        front,
        threshold,
        assignments,
        summaries,
        failed_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Footprint, GeoPoint};

    fn square(id: &str, key: &str, lat: f64, lng: f64) -> Feature {
        Feature::polygon(
            id,
            key,
            Footprint::new(vec![
                GeoPoint::new(lat, lng),
                GeoPoint::new(lat, lng + 0.005),
                GeoPoint::new(lat + 0.005, lng + 0.005),
                GeoPoint::new(lat + 0.005, lng),
            ]),
        )
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            cache_dir: dir.to_path_buf(),
            optimizer: OptimizerConfig {
                population_size: 4,
                generations: 1,
                seed: Some(11),
                workers: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_group_features_keeps_order() {
        let features = vec![
            Feature::point("b1", "BRA", GeoPoint::new(-20.0, -44.0)),
            Feature::point("a1", "AUS", GeoPoint::new(-23.0, 119.0)),
            Feature::point("b2", "BRA", GeoPoint::new(-20.1, -44.0)),
        ];
        let groups = group_features(&features);
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["AUS", "BRA"]);
        let ids: Vec<&str> = groups["BRA"].iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn test_failed_group_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let degenerate = Feature::polygon(
            "bad",
            "XXX",
            Footprint::new(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001)]),
        );
        let features = vec![
            square("p1", "CHL", -24.0, -69.0),
            square("p2", "CHL", -24.01, -69.0),
            degenerate,
            Feature::point("ok", "XXX", GeoPoint::new(0.0, 0.1)),
        ];
        let outcomes = prepare_groups(group_features(&features), &config(dir.path()));
        assert_eq!(outcomes.prepared.len(), 1);
        assert_eq!(outcomes.failed.len(), 1);
        assert_eq!(outcomes.failed[0].0, "XXX");
        assert!(dir.path().join("CHL.bin").exists());
        assert!(!dir.path().join("XXX.bin").exists());
    }

    #[test]
    fn test_invalid_area_fails_its_group() {
        let dir = tempfile::tempdir().unwrap();
        let features = vec![
            square("p1", "CHL", -24.0, -69.0).with_area(5.0),
            square("neg", "PER", -14.0, -75.0).with_area(-1.0),
            square("nan", "BOL", -19.0, -66.0).with_area(f64::NAN),
        ];
        let outcomes = prepare_groups(group_features(&features), &config(dir.path()));
        let prepared: Vec<&str> = outcomes.prepared.iter().map(|g| g.group_key.as_str()).collect();
        assert_eq!(prepared, vec!["CHL"]);
        let failed: Vec<&str> = outcomes.failed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(failed, vec!["BOL", "PER"]);
        assert!(outcomes
            .failed
            .iter()
            .all(|(_, e)| matches!(e, ClusterError::DataIntegrity(_))));
    }

    #[test]
    fn test_run_survives_group_with_invalid_area() {
        let dir = tempfile::tempdir().unwrap();
        let features = vec![
            square("p1", "CHL", -24.0, -69.0).with_area(5.0),
            square("p2", "CHL", -24.3, -69.0).with_area(7.0),
            Feature::point("m1", "CHL", GeoPoint::new(-24.002, -69.002)).with_commodities(["Copper"]),
            square("bad", "PER", -14.0, -75.0).with_area(-1.0),
            square("good", "PER", -14.1, -75.0).with_area(3.0),
        ];
        let report = run(&features, &config(dir.path())).unwrap();
        assert_eq!(report.failed_groups.len(), 1);
        assert_eq!(report.failed_groups[0].group_key, "PER");
        assert!(report.assignments.iter().all(|a| a.group_key == "CHL"));
        assert_eq!(report.assignments.len(), 3);
        assert!(report.front.points().iter().any(|p| p.fitness != FitnessVector::ZERO));
        assert!(report.summaries.contains_key("CHL"));
        assert!(!report.summaries.contains_key("PER"));
    }

    #[test]
    fn test_singleton_group_clusters_alone() {
        let group = PreparedGroup::new("NAM", vec![Feature::point("solo", "NAM", GeoPoint::new(-22.5, 15.0))], None)
            .unwrap();
        let result = group.cluster(5_000.0, &ClusterConfig::default()).unwrap();
        assert_eq!(result.hierarchical.cluster_of("solo"), Some(1));
        assert_eq!(result.density.cluster_of("solo"), Some(1));
    }

    #[test]
    fn test_fitness_sums_groups() {
        let gold = |id: &str, key: &str, lat: f64| {
            Feature::point(id, key, GeoPoint::new(lat, 0.0)).with_commodities(["Gold"])
        };
        let groups: Vec<PreparedGroup> = [("A", 10.0), ("B", 20.0)]
            .iter()
            .map(|&(key, area)| {
                let features = vec![square(&format!("{}-p", key), key, 0.0, 0.0).with_area(area), gold("m", key, 1.0)];
                PreparedGroup::new(key, features, None).unwrap()
            })
            .collect();
        let cluster_config = ClusterConfig::default();
        let fitness = ClusterFitness::new(&groups, &cluster_config, ObjectivePartition::Hierarchical);
        assert_eq!(fitness.evaluate(1_000.0).unwrap(), FitnessVector::new(30.0, 0.0));
        assert!(fitness.evaluate(-1.0).is_err());
    }

    #[test]
    fn test_assignment_labels_are_global() {
        let features = vec![
            square("p1", "CHL", -24.0, -69.0),
            square("p2", "CHL", -24.001, -69.0),
            Feature::point("far", "CHL", GeoPoint::new(-20.0, -69.0)),
        ];
        let matrix = crate::compute_distance_matrix(&features, "CHL", &DistanceConfig::default()).unwrap();
        let group = PreparedGroup::new("CHL", features, matrix).unwrap();
        let rows = assign_clusters(&[group], 100.0, &ClusterConfig::default()).unwrap();
        let labels: Vec<&str> = rows.iter().map(|r| r.hierarchical_cluster.as_str()).collect();
        assert_eq!(labels, vec!["CHL-1", "CHL-1", "CHL-2"]);
        assert!(rows.iter().all(|r| r.group_key == "CHL"));
    }

    #[test]
    fn test_run_reports_failures_and_assigns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let features = vec![
            square("p1", "CHL", -24.0, -69.0).with_area(5.0),
            Feature::point("m1", "CHL", GeoPoint::new(-24.02, -69.0)).with_commodities(["Copper"]),
            Feature::polygon(
                "bad",
                "XXX",
                Footprint::new(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001)]),
            ),
            Feature::point("other", "XXX", GeoPoint::new(0.0, 0.1)),
        ];
        let report = run(&features, &config(dir.path())).unwrap();
        assert_eq!(report.assignments.len(), 2);
        assert_eq!(report.failed_groups.len(), 1);
        assert_eq!(report.failed_groups[0].group_key, "XXX");
        assert!(report.summaries.contains_key("CHL"));
        assert!(report.to_json().unwrap().contains("\"threshold\""));
    }

    #[test]
    fn test_run_rejects_bad_optimizer_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.optimizer.population_size = 1;
        let features = vec![square("p1", "CHL", -24.0, -69.0)];
        assert!(matches!(run(&features, &cfg), Err(ClusterError::Configuration(_))));
        assert!(!dir.path().join("CHL.bin").exists());
    }
}
