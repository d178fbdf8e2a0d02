//! # Clustering
//!
//! Two independent partitions of a feature group from one distance matrix:
//!
//! - **Hierarchical**: agglomerative single-linkage cut at height `threshold`.
//!   Features are joined transitively through chains of links no longer than
//!   the threshold, so a mining district connected by intermediate sites forms
//!   one cluster even when its endpoints are far apart.
//! - **Density**: DBSCAN with radius `threshold`. With the default
//!   `min_neighbors = 1` every feature is a core point and nothing is noise.
//!
//! Cluster ids are 1-based and assigned in order of first appearance in the
//! feature sequence. They carry no meaning across thresholds; only which
//! features share a cluster does.
//!
//! Features that have no row in the distance matrix (a singleton group, or a
//! feature added after the matrix was cached) get a cluster of their own.
//!
//! ## Example
//!
//! ```rust
//! use mining_clusters::{cluster, compute_distance_matrix, ClusterConfig, DistanceConfig, Feature, GeoPoint};
//!
//! let features = vec![Feature::point("solo", "NAM", GeoPoint::new(-22.5, 15.0))];
//! let matrix = compute_distance_matrix(&features, "NAM", &DistanceConfig::default()).unwrap();
//! assert!(matrix.is_none());
//!
//! let result = cluster(&features, None, 10_000.0, &ClusterConfig::default()).unwrap();
//! assert_eq!(result.hierarchical.cluster_of("solo"), Some(1));
//! assert_eq!(result.density.cluster_of("solo"), Some(1));
//! ```

use crate::{ClusterError, DistanceMatrix, Feature, Result, UnionFind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Configuration for the density-based partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Minimum neighbors (self included) within the radius for a feature to
    /// seed or extend a density cluster. Features below it that no cluster
    /// reaches become singleton clusters rather than noise.
    /// Default: 1
    pub min_neighbors: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { min_neighbors: 1 }
    }
}

// ============================================================================
// Partition
// ============================================================================

/// Assignment of every feature of a group to exactly one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    ids: Vec<String>,
    labels: Vec<u32>,
}

impl Partition {
    /// Build a partition over `features`. Features found in `matrix_ids`
    /// take the matching entry of `labels`; the rest get fresh clusters.
    /// Labels are renumbered by first appearance.
    fn project(features: &[Feature], matrix_ids: &[String], labels: &[u32]) -> Self {
        let index: HashMap<&str, usize> = matrix_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut renumber: HashMap<u32, u32> = HashMap::new();
        let mut next = 0u32;
        let mut out = Vec::with_capacity(features.len());

        for feature in features {
            let label = match index.get(feature.id.as_str()) {
                Some(&i) => *renumber.entry(labels[i]).or_insert_with(|| {
                    next += 1;
                    next
                }),
                None => {
                    next += 1;
                    next
                }
            };
            out.push(label);
        }

        Self {
            ids: features.iter().map(|f| f.id.clone()).collect(),
            labels: out,
        }
    }

    /// Every feature in a cluster of its own.
    pub fn singletons(features: &[Feature]) -> Self {
        Self::project(features, &[], &[])
    }

    /// Partition from explicit `(feature_id, cluster_id)` pairs. Ids must be
    /// unique.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let (ids, labels): (Vec<String>, Vec<u32>) =
            pairs.into_iter().map(|(id, label)| (id.into(), label)).unzip();
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(ClusterError::integrity(format!("feature '{}' appears twice in partition", dup)));
        }
        Ok(Self { ids, labels })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// `(feature_id, cluster_id)` pairs in feature order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.ids.iter().map(|s| s.as_str()).zip(self.labels.iter().copied())
    }

    pub fn cluster_of(&self, id: &str) -> Option<u32> {
        self.iter().find(|(fid, _)| *fid == id).map(|(_, label)| label)
    }

    /// Members of each cluster, keyed by cluster id.
    pub fn clusters(&self) -> BTreeMap<u32, Vec<&str>> {
        let mut clusters: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
        for (id, label) in self.iter() {
            clusters.entry(label).or_default().push(id);
        }
        clusters
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters().len()
    }

    pub fn to_map(&self) -> HashMap<String, u32> {
        self.iter().map(|(id, label)| (id.to_string(), label)).collect()
    }

    /// True if every cluster of `self` lies inside a single cluster of
    /// `coarser`. Partitions over different feature sets are never
    /// refinements of each other.
    pub fn is_refinement_of(&self, coarser: &Partition) -> bool {
        let theirs = coarser.to_map();
        if theirs.len() != self.len() {
            return false;
        }
        let mut image: HashMap<u32, u32> = HashMap::new();
        for (id, label) in self.iter() {
            let Some(&outer) = theirs.get(id) else {
                return false;
            };
            if *image.entry(label).or_insert(outer) != outer {
                return false;
            }
        }
        true
    }
}

/// Both partitions of one group at one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub threshold: f64,
    pub hierarchical: Partition,
    pub density: Partition,
}

// ============================================================================
// Single Linkage
// ============================================================================

/// Single-linkage dendrogram of one matrix, stored as its minimum spanning
/// tree. Cutting at height `t` keeps the tree edges of weight `<= t`, which
/// yields the same clusters as the full agglomeration.
#[derive(Debug, Clone)]
pub struct SingleLinkage {
    ids: Vec<String>,
    /// `(weight, a, b)` sorted by weight
    edges: Vec<(f64, usize, usize)>,
}

impl SingleLinkage {
    /// Validate the matrix and build its minimum spanning tree (Prim, O(n²)).
    pub fn from_matrix(matrix: &DistanceMatrix) -> Result<Self> {
        matrix.validate()?;
        let n = matrix.len();
        let mut edges = Vec::with_capacity(n.saturating_sub(1));

        if n > 0 {
            let mut in_tree = vec![false; n];
            let mut best = vec![f64::INFINITY; n];
            let mut parent = vec![usize::MAX; n];
            best[0] = 0.0;

            for _ in 0..n {
                let mut u = usize::MAX;
                for v in 0..n {
                    if !in_tree[v] && (u == usize::MAX || best[v] < best[u]) {
                        u = v;
                    }
                }
                in_tree[u] = true;
                if parent[u] != usize::MAX {
                    edges.push((best[u], parent[u], u));
                }
                let row = matrix.row(u);
                for v in 0..n {
                    if !in_tree[v] && row[v] < best[v] {
                        best[v] = row[v];
                        parent[v] = u;
                    }
                }
            }
        }

        edges.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            ids: matrix.ids().to_vec(),
            edges,
        })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Merge heights of the dendrogram in ascending order.
    pub fn merge_heights(&self) -> Vec<f64> {
        self.edges.iter().map(|e| e.0).collect()
    }

    /// Flat cluster labels (matrix order) for a cut at `threshold`.
    pub fn labels(&self, threshold: f64) -> Vec<u32> {
        let mut uf = UnionFind::new(self.ids.len());
        for &(w, a, b) in &self.edges {
            if w > threshold {
                break;
            }
            uf.union(a, b);
        }
        uf.labels()
    }

    /// Hierarchical partition of `features` at `threshold`.
    pub fn partition(&self, features: &[Feature], threshold: f64) -> Partition {
        Partition::project(features, &self.ids, &self.labels(threshold))
    }
}

// ============================================================================
// Density
// ============================================================================

/// DBSCAN labels (matrix order). Neighborhoods include the point itself and
/// every point at distance `<= radius`. Points reached by no core point get
/// singleton labels after all density clusters.
pub fn dbscan_labels(matrix: &DistanceMatrix, radius: f64, min_neighbors: usize) -> Vec<u32> {
    let n = matrix.len();
    let neighbors = |i: usize| -> Vec<usize> {
        matrix
            .row(i)
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d <= radius)
            .map(|(j, _)| j)
            .collect()
    };

    let mut labels: Vec<u32> = vec![0; n];
    let mut next = 0u32;
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if labels[seed] != 0 {
            continue;
        }
        let mut seed_neighbors = neighbors(seed);
        if seed_neighbors.len() < min_neighbors {
            continue;
        }

        next += 1;
        labels[seed] = next;
        queue.push_back(seed);

        // Points are labeled when queued, so each enters the queue at most once.
        while let Some(p) = queue.pop_front() {
            let p_neighbors = if p == seed { std::mem::take(&mut seed_neighbors) } else { neighbors(p) };
            if p_neighbors.len() < min_neighbors {
                continue;
            }
            for q in p_neighbors {
                if labels[q] == 0 {
                    labels[q] = next;
                    queue.push_back(q);
                }
            }
        }
    }

    for label in labels.iter_mut().filter(|l| **l == 0) {
        next += 1;
        *label = next;
    }
    labels
}

/// Density partition of `features`. The matrix is assumed valid; [`cluster`]
/// validates it.
pub fn density_partition(
    features: &[Feature],
    matrix: Option<&DistanceMatrix>,
    threshold: f64,
    min_neighbors: usize,
) -> Partition {
    match matrix {
        Some(m) => Partition::project(features, m.ids(), &dbscan_labels(m, threshold, min_neighbors)),
        None => Partition::singletons(features),
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Cluster one group at `threshold` (meters).
///
/// Fails with `DataIntegrity` if the matrix is malformed and with
/// `Configuration` if the threshold is negative or not finite.
pub fn cluster(
    features: &[Feature],
    matrix: Option<&DistanceMatrix>,
    threshold: f64,
    config: &ClusterConfig,
) -> Result<ClusterResult> {
    check_threshold(threshold)?;
    if config.min_neighbors == 0 {
        return Err(ClusterError::config("min_neighbors must be at least 1"));
    }

    let hierarchical = match matrix {
        Some(m) => SingleLinkage::from_matrix(m)?.partition(features, threshold),
        None => Partition::singletons(features),
    };
    let density = density_partition(features, matrix, threshold, config.min_neighbors);

    Ok(ClusterResult {
        threshold,
        hierarchical,
        density,
    })
}

pub(crate) fn check_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ClusterError::config(format!(
            "threshold must be a finite non-negative distance, got {}",
            threshold
        )));
    }
    Ok(())
}
