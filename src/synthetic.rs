//! Synthetic mining features for demos and tests.
//!
//! Each group gets a row of mining districts spaced well apart. A district
//! holds a handful of pit polygons around a center plus a few mine points
//! carrying commodities; some districts mix two commodities. Every group also
//! gets isolated polygons with no commodity point nearby, so small thresholds
//! leave area unexplained and large thresholds merge districts.
//!
//! Polygon areas are geodesic, in km².
//!
//! # Example
//!
//! ```rust
//! use mining_clusters::synthetic::{generate, SyntheticConfig};
//!
//! let config = SyntheticConfig::default();
//! let features = generate(&config);
//! assert_eq!(features.len(), config.feature_count());
//! ```

use crate::geo_utils::{meters_to_degrees, polygon_geodesic_area};
use crate::{Feature, Footprint, GeoPoint};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

const METERS_PER_DEG_LAT: f64 = 111_320.0;

const COMMODITIES: &[&str] = &["Gold", "Copper", "Iron ore", "Coal", "Nickel", "Lithium", "Zinc"];

/// Shape of a generated dataset.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// One group per key, e.g. ISO3 codes.
    pub group_keys: Vec<String>,
    pub districts_per_group: usize,
    pub polygons_per_district: usize,
    pub points_per_district: usize,
    /// Polygons per group with no mine point nearby.
    pub isolated_polygons: usize,
    /// Distance between neighboring district centers in meters.
    pub district_spacing_m: f64,
    /// Radius around a district center that holds its features, in meters.
    pub district_radius_m: f64,
    /// Probability that a district mixes two commodities.
    pub companion_probability: f64,
    /// RNG seed for deterministic reproduction.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            group_keys: vec!["AUS".to_string(), "CHL".to_string()],
            districts_per_group: 3,
            polygons_per_district: 4,
            points_per_district: 2,
            isolated_polygons: 2,
            district_spacing_m: 20_000.0,
            district_radius_m: 3_000.0,
            companion_probability: 0.4,
            seed: 42,
        }
    }
}

impl SyntheticConfig {
    /// Number of features [`generate`] produces.
    pub fn feature_count(&self) -> usize {
        let per_district = self.polygons_per_district + self.points_per_district;
        self.group_keys.len() * (self.districts_per_group * per_district + self.isolated_polygons)
    }
}

/// Point `north_m` and `east_m` meters away from `origin`.
fn offset(origin: &GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let latitude = origin.latitude + north_m / METERS_PER_DEG_LAT;
    GeoPoint::new(latitude, origin.longitude + meters_to_degrees(east_m, latitude))
}

/// Uniform point in a disk of `radius` meters.
fn scatter(rng: &mut StdRng, center: &GeoPoint, radius: f64) -> GeoPoint {
    let r = radius * rng.gen::<f64>().sqrt();
    let theta = rng.gen_range(0.0..2.0 * PI);
    offset(center, r * theta.sin(), r * theta.cos())
}

/// Irregular quadrilateral pit footprint around `center`.
fn pit(rng: &mut StdRng, center: &GeoPoint) -> Footprint {
    let rotation = rng.gen_range(0.0..PI / 2.0);
    let exterior = (0..4)
        .map(|k| {
            let angle = rotation + k as f64 * PI / 2.0;
            let r = rng.gen_range(150.0..450.0);
            offset(center, r * angle.sin(), r * angle.cos())
        })
        .collect();
    Footprint::new(exterior)
}

fn polygon_feature(id: String, key: &str, footprint: Footprint) -> Feature {
    let area_km2 = polygon_geodesic_area(&footprint) / 1_000_000.0;
    Feature::polygon(&id, key, footprint).with_area(area_km2)
}

/// Generate features, groups in `group_keys` order.
pub fn generate(config: &SyntheticConfig) -> Vec<Feature> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut features = Vec::with_capacity(config.feature_count());

    for (g, key) in config.group_keys.iter().enumerate() {
        let origin = GeoPoint::new(-30.0 + 6.0 * g as f64, 20.0 + 35.0 * g as f64);

        for d in 0..config.districts_per_group {
            let center = offset(&origin, 0.0, d as f64 * config.district_spacing_m);

            for k in 0..config.polygons_per_district {
                let site = scatter(&mut rng, &center, config.district_radius_m);
                features.push(polygon_feature(format!("{}-poly-{}-{}", key, d, k), key, pit(&mut rng, &site)));
            }

            let mut pair: Vec<&str> = COMMODITIES.choose_multiple(&mut rng, 2).copied().collect();
            if !rng.gen_bool(config.companion_probability.clamp(0.0, 1.0)) {
                pair.truncate(1);
            }
            for k in 0..config.points_per_district {
                let site = scatter(&mut rng, &center, config.district_radius_m);
                let commodity = pair[k % pair.len()];
                features.push(
                    Feature::point(&format!("{}-mine-{}-{}", key, d, k), key, site).with_commodities([commodity]),
                );
            }
        }

        for k in 0..config.isolated_polygons {
            let site = offset(
                &origin,
                (k as f64 + 1.0) * config.district_spacing_m,
                k as f64 * config.district_spacing_m,
            );
            features.push(polygon_feature(format!("{}-iso-{}", key, k), key, pit(&mut rng, &site)));
        }
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::{geodesic_distance, validate_geometry};
    use crate::{DatasetKind, Geometry};

    #[test]
    fn test_deterministic() {
        let config = SyntheticConfig::default();
        assert_eq!(generate(&config), generate(&config));

        let other = SyntheticConfig { seed: 7, ..Default::default() };
        assert_ne!(generate(&config), generate(&other));
    }

    #[test]
    fn test_counts_and_ids() {
        let config = SyntheticConfig::default();
        let features = generate(&config);
        assert_eq!(features.len(), config.feature_count());

        let mut ids: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), features.len());

        let points = features.iter().filter(|f| f.dataset_kind == DatasetKind::Point).count();
        assert_eq!(points, 2 * 3 * 2);
    }

    #[test]
    fn test_geometries_valid_with_area() {
        for f in generate(&SyntheticConfig::default()) {
            assert!(validate_geometry(&f.geometry).is_ok(), "{}", f.id);
            match f.dataset_kind {
                DatasetKind::Polygon => {
                    let area = f.area.unwrap();
                    assert!(area > 0.01 && area < 1.0, "{} area {}", f.id, area);
                }
                DatasetKind::Point => assert_eq!(f.commodities.len(), 1),
            }
        }
    }

    #[test]
    fn test_features_stay_in_district() {
        let config = SyntheticConfig::default();
        let origin = GeoPoint::new(-30.0, 20.0);
        for f in generate(&config).iter().filter(|f| f.id.starts_with("AUS-mine-1-")) {
            let Geometry::Point(p) = &f.geometry else {
                panic!("mine is not a point");
            };
            let center = offset(&origin, 0.0, config.district_spacing_m);
            assert!(geodesic_distance(p, &center) < config.district_radius_m * 1.05);
        }
    }
}
