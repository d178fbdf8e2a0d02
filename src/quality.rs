//! # Cluster Quality
//!
//! Scores a partition by how much mined area ends up in ambiguous clusters.
//!
//! Points carry commodity data and polygons carry area; a cluster pools both
//! through its cluster id. Each cluster is classified by the distinct
//! commodities of its members:
//!
//! | Class | Commodities | Objective |
//! |-------|-------------|-----------|
//! | `Unknown` | none | area counts toward `unknown_area` |
//! | `SingleHost` | exactly one | none |
//! | `Companion` | more than one | area counts toward `companion_area` |
//!
//! Both objectives are minimized. A small threshold leaves polygons isolated
//! from the points that would explain them (high `unknown_area`); a large one
//! lumps unrelated deposits together (high `companion_area`).

use crate::geo_utils::geometry_bounds;
use crate::{Bounds, ClusterError, Feature, Partition, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Commodity classification of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterClass {
    Unknown,
    SingleHost,
    Companion,
}

impl ClusterClass {
    pub fn from_commodity_count(count: usize) -> Self {
        match count {
            0 => ClusterClass::Unknown,
            1 => ClusterClass::SingleHost,
            _ => ClusterClass::Companion,
        }
    }
}

/// Objectives for one partition, both minimized.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitnessVector {
    /// Area of clusters with no commodity information
    pub unknown_area: f64,
    /// Area of clusters hosting more than one commodity
    pub companion_area: f64,
}

impl FitnessVector {
    pub const ZERO: FitnessVector = FitnessVector {
        unknown_area: 0.0,
        companion_area: 0.0,
    };

    pub fn new(unknown_area: f64, companion_area: f64) -> Self {
        Self { unknown_area, companion_area }
    }

    pub fn objectives(&self) -> [f64; 2] {
        [self.unknown_area, self.companion_area]
    }

    /// Pareto dominance for minimization: no objective worse, at least one
    /// strictly better.
    pub fn dominates(&self, other: &FitnessVector) -> bool {
        let a = self.objectives();
        let b = other.objectives();
        a.iter().zip(&b).all(|(x, y)| x <= y) && a.iter().zip(&b).any(|(x, y)| x < y)
    }

    /// Objectives as shares of `total_area`. Zero total area yields zeros.
    pub fn normalized(&self, total_area: f64) -> Self {
        if total_area <= 0.0 {
            return Self::ZERO;
        }
        Self {
            unknown_area: self.unknown_area / total_area,
            companion_area: self.companion_area / total_area,
        }
    }
}

impl Add for FitnessVector {
    type Output = FitnessVector;

    fn add(self, rhs: FitnessVector) -> FitnessVector {
        FitnessVector {
            unknown_area: self.unknown_area + rhs.unknown_area,
            companion_area: self.companion_area + rhs.companion_area,
        }
    }
}

impl AddAssign for FitnessVector {
    fn add_assign(&mut self, rhs: FitnessVector) {
        *self = *self + rhs;
    }
}

impl Sum for FitnessVector {
    fn sum<I: Iterator<Item = FitnessVector>>(iter: I) -> Self {
        iter.fold(FitnessVector::ZERO, Add::add)
    }
}

/// Aggregated attributes of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: u32,
    pub feature_ids: Vec<String>,
    /// Summed area of members that carry one
    pub area: f64,
    /// Distinct commodities across members
    pub commodities: BTreeSet<String>,
    pub class: ClusterClass,
    /// Extent of the member geometries
    pub bounds: Option<Bounds>,
}

/// Split a delimited commodity list such as `"Gold, Copper;Zinc"`.
/// Entries are trimmed and empty entries dropped.
pub fn parse_commodity_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Summarize every cluster of `partition`, ordered by cluster id.
///
/// Every partition member must appear in `features`; features outside the
/// partition are ignored.
pub fn summarize(partition: &Partition, features: &[Feature]) -> Result<Vec<ClusterSummary>> {
    let by_id: HashMap<&str, &Feature> = features.iter().map(|f| (f.id.as_str(), f)).collect();
    let mut clusters: BTreeMap<u32, ClusterSummary> = BTreeMap::new();

    for (id, cluster_id) in partition.iter() {
        let feature = by_id.get(id).ok_or_else(|| {
            ClusterError::integrity(format!("partition member '{}' has no feature record", id))
        })?;

        let summary = clusters.entry(cluster_id).or_insert_with(|| ClusterSummary {
            cluster_id,
            feature_ids: Vec::new(),
            area: 0.0,
            commodities: BTreeSet::new(),
            class: ClusterClass::Unknown,
            bounds: None,
        });

        summary.feature_ids.push(id.to_string());
        if let Some(area) = feature.area {
            if !area.is_finite() || area < 0.0 {
                return Err(ClusterError::integrity(format!(
                    "feature '{}' has invalid area {}",
                    id, area
                )));
            }
            summary.area += area;
        }
        summary.commodities.extend(feature.commodities.iter().cloned());
        if let Some(b) = geometry_bounds(&feature.geometry) {
            summary.bounds = Some(match summary.bounds {
                Some(existing) => existing.union(&b),
                None => b,
            });
        }
    }

    Ok(clusters
        .into_values()
        .map(|mut s| {
            s.class = ClusterClass::from_commodity_count(s.commodities.len());
            s
        })
        .collect())
}

/// Fitness of a partition.
///
/// # Example
/// ```
/// use mining_clusters::{evaluate, Feature, FitnessVector, GeoPoint, Partition};
///
/// let features = vec![
///     Feature::point("mine", "GHA", GeoPoint::new(6.2, -1.7)).with_commodities(["Gold"]),
///     Feature::point("pit", "GHA", GeoPoint::new(6.2, -1.6)).with_area(12.0),
/// ];
/// let apart = Partition::from_pairs([("mine", 1), ("pit", 2)]).unwrap();
/// let together = Partition::from_pairs([("mine", 1), ("pit", 1)]).unwrap();
///
/// assert_eq!(evaluate(&apart, &features).unwrap(), FitnessVector::new(12.0, 0.0));
/// assert_eq!(evaluate(&together, &features).unwrap(), FitnessVector::ZERO);
/// ```
pub fn evaluate(partition: &Partition, features: &[Feature]) -> Result<FitnessVector> {
    Ok(fitness_of(&summarize(partition, features)?))
}

/// Fold cluster summaries into objectives.
pub fn fitness_of(summaries: &[ClusterSummary]) -> FitnessVector {
    summaries
        .iter()
        .map(|s| match s.class {
            ClusterClass::Unknown => FitnessVector::new(s.area, 0.0),
            ClusterClass::SingleHost => FitnessVector::ZERO,
            ClusterClass::Companion => FitnessVector::new(0.0, s.area),
        })
        .sum()
}

/// Total area carried by `features`, for [`FitnessVector::normalized`].
pub fn total_area(features: &[Feature]) -> f64 {
    features.iter().filter_map(|f| f.area).filter(|a| a.is_finite() && *a > 0.0).sum()
}
