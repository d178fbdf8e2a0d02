//! # Mining Clusters
//!
//! Identification of mining-impact clusters from point and polygon features.
//!
//! This library provides:
//! - Per-group geodesic distance matrices, computed in parallel and memoized on disk
//! - Single-linkage and density-based (DBSCAN) partitions cut at a distance threshold
//! - Cluster quality objectives (unknown-commodity area, companion-commodity area)
//! - NSGA-II search over the threshold, returning a Pareto front
//!
//! ## Features
//!
//! - **`parallel`** (default) - Enable parallel processing with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use mining_clusters::{cluster, compute_distance_matrix, DistanceConfig, ClusterConfig, Feature, GeoPoint};
//!
//! let features = vec![
//!     Feature::point("pit-a", "AUS", GeoPoint::new(-23.360, 119.730)),
//!     Feature::point("pit-b", "AUS", GeoPoint::new(-23.362, 119.735)),
//!     Feature::point("pit-c", "AUS", GeoPoint::new(-22.000, 118.000)),
//! ];
//!
//! let matrix = compute_distance_matrix(&features, "AUS", &DistanceConfig::default()).unwrap();
//! let result = cluster(&features, matrix.as_ref(), 5_000.0, &ClusterConfig::default()).unwrap();
//!
//! assert_eq!(result.hierarchical.num_clusters(), 2);
//! assert_eq!(result.density.num_clusters(), 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// Unified error handling
pub mod error;
pub use error::{ClusterError, Result};

// Geodesic distances between points and polygons
pub mod geo_utils;

// Union-Find used by the single-linkage cut
pub mod union_find;
pub use union_find::UnionFind;

// Distance matrix computation and on-disk memoization
pub mod distance;
pub use distance::{compute_distance_matrix, compute_or_load, DistanceConfig, DistanceMatrix};

// Hierarchical and density-based partitions
pub mod clustering;
pub use clustering::{cluster, ClusterConfig, ClusterResult, Partition, SingleLinkage};

// Cluster quality objectives
pub mod quality;
pub use quality::{evaluate, summarize, ClusterClass, ClusterSummary, FitnessVector};

// Pareto dominance, sorting and the elbow decision aid
pub mod pareto;
pub use pareto::{find_elbow, ParetoFront, ParetoPoint};

// NSGA-II threshold search
pub mod optimizer;
pub use optimizer::{optimize, OptimizerConfig, OptimizerState, ThresholdSearch};

// Multi-group orchestration
pub mod pipeline;
pub use pipeline::{
    assign_clusters, group_features, prepare_groups, run, ClusterAssignment, ClusterFitness,
    FailedGroup, GroupOutcomes, ObjectivePartition, PipelineConfig, PipelineReport, PreparedGroup,
};

// Seeded synthetic feature groups for demos and tests
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use mining_clusters::GeoPoint;
/// let point = GeoPoint::new(-23.36, 119.73); // Pilbara
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Convert to a `geo` point (x = longitude, y = latitude).
    pub fn to_geo(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// Polygon footprint of a mine: one exterior ring and optional holes.
///
/// Rings may be given open or closed; the closing vertex is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub exterior: Vec<GeoPoint>,
    #[serde(default)]
    pub interiors: Vec<Vec<GeoPoint>>,
}

impl Footprint {
    /// Footprint without holes.
    pub fn new(exterior: Vec<GeoPoint>) -> Self {
        Self { exterior, interiors: Vec::new() }
    }

    /// Footprint with holes.
    pub fn with_interiors(exterior: Vec<GeoPoint>, interiors: Vec<Vec<GeoPoint>>) -> Self {
        Self { exterior, interiors }
    }

    /// All rings, exterior first.
    pub fn rings(&self) -> impl Iterator<Item = &[GeoPoint]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(|r| r.as_slice()))
    }

    /// Convert to a `geo` polygon. `geo` closes the rings.
    pub fn to_geo(&self) -> geo::Polygon<f64> {
        let ring = |pts: &[GeoPoint]| {
            geo::LineString::from(
                pts.iter()
                    .map(|p| geo::Coord { x: p.longitude, y: p.latitude })
                    .collect::<Vec<_>>(),
            )
        };
        geo::Polygon::new(
            ring(&self.exterior),
            self.interiors.iter().map(|r| ring(r)).collect(),
        )
    }
}

/// Feature geometry. Pairwise distance dispatches on this tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(GeoPoint),
    Polygon(Footprint),
}

impl Geometry {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Geometry::Point(_) => DatasetKind::Point,
            Geometry::Polygon(_) => DatasetKind::Polygon,
        }
    }
}

/// Which source dataset a feature came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Mine locations carrying commodity data
    Point,
    /// Mining-area polygons carrying area
    Polygon,
}

/// Bounding box for a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Smallest bounds containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// An identifiable spatial object from one of the input datasets.
///
/// Points usually carry `commodities`, polygons usually carry `area`; a
/// cluster aggregates both through its cluster id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Unique, stable identifier
    pub id: String,
    /// Grouping key such as an ISO3 country code
    pub group_key: String,
    pub dataset_kind: DatasetKind,
    pub geometry: Geometry,
    /// Distinct commodities mined at this feature (empty = unknown)
    #[serde(default)]
    pub commodities: BTreeSet<String>,
    /// Area in the caller's unit (typically km²)
    #[serde(default)]
    pub area: Option<f64>,
}

impl Feature {
    /// Create a point feature.
    pub fn point(id: &str, group_key: &str, location: GeoPoint) -> Self {
        Self::new(id, group_key, Geometry::Point(location))
    }

    /// Create a polygon feature.
    pub fn polygon(id: &str, group_key: &str, footprint: Footprint) -> Self {
        Self::new(id, group_key, Geometry::Polygon(footprint))
    }

    fn new(id: &str, group_key: &str, geometry: Geometry) -> Self {
        Self {
            id: id.to_string(),
            group_key: group_key.to_string(),
            dataset_kind: geometry.kind(),
            geometry,
            commodities: BTreeSet::new(),
            area: None,
        }
    }

    /// Attach commodities. Each entry may itself be a delimited list such as
    /// `"Gold,Copper"`.
    pub fn with_commodities<I, S>(mut self, commodities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in commodities {
            self.commodities.extend(quality::parse_commodity_list(entry.as_ref()));
        }
        self
    }

    /// Attach an area.
    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Dedicated rayon pool with `workers` threads (`0` = one per available core).
#[cfg(feature = "parallel")]
pub(crate) fn thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| ClusterError::config(format!("cannot build worker pool: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lat: f64, lng: f64, size: f64) -> Footprint {
        Footprint::new(vec![
            GeoPoint::new(lat, lng),
            GeoPoint::new(lat, lng + size),
            GeoPoint::new(lat + size, lng + size),
            GeoPoint::new(lat + size, lng),
        ])
    }

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(-23.36, 119.73).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_feature_kind_follows_geometry() {
        let p = Feature::point("p", "CHL", GeoPoint::new(-24.27, -69.07));
        assert_eq!(p.dataset_kind, DatasetKind::Point);

        let poly = Feature::polygon("a", "CHL", square(-24.3, -69.1, 0.01)).with_area(1.2);
        assert_eq!(poly.dataset_kind, DatasetKind::Polygon);
        assert_eq!(poly.area, Some(1.2));
    }

    #[test]
    fn test_with_commodities_splits_lists() {
        let f = Feature::point("p", "PER", GeoPoint::new(-9.5, -77.0))
            .with_commodities(["Gold, Copper", "Copper", "Silver"]);
        assert_eq!(f.commodities.len(), 3);
        assert!(f.commodities.contains("Copper"));
    }

    #[test]
    fn test_footprint_to_geo_closes_ring() {
        let poly = square(0.0, 0.0, 1.0).to_geo();
        let ring = poly.exterior();
        assert_eq!(ring.0.first(), ring.0.last());
    }

    #[test]
    fn test_bounds_center() {
        let pts = vec![GeoPoint::new(10.0, 20.0), GeoPoint::new(12.0, 24.0)];
        let bounds = Bounds::from_points(&pts).unwrap();
        assert_eq!(bounds.center(), GeoPoint::new(11.0, 22.0));
        assert!(Bounds::from_points(&[]).is_none());

        let other = Bounds::from_points(&[GeoPoint::new(9.0, 25.0)]).unwrap();
        let merged = bounds.union(&other);
        assert_eq!((merged.min_lat, merged.max_lng), (9.0, 25.0));
        assert_eq!((merged.max_lat, merged.min_lng), (12.0, 20.0));
    }
}
