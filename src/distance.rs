//! # Distance Matrices
//!
//! Full pairwise geodesic distance matrix for one feature group, memoized on
//! disk as one file per group key.
//!
//! ## Cache policy
//!
//! The cache is keyed by group key only. If `<cache_dir>/<group_key>.bin`
//! exists it is returned verbatim, even when the features of that group have
//! changed since it was written. Downstream analyses rely on this for
//! reproducibility; delete the file to force recomputation.
//!
//! ## Concurrency
//!
//! Each row is an independent task that reads the shared feature slice and
//! produces only its own row. Rows are collected in feature order. The first
//! failing row aborts the computation and nothing is written.

use crate::geo_utils::{pairwise_distance, validate_geometry};
use crate::{ClusterError, Feature, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Relative tolerance for symmetry checks on externally built matrices.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Configuration for distance matrix computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceConfig {
    /// Worker threads for row computation. `0` uses every available core.
    /// Ignored without the `parallel` feature.
    /// Default: 0
    pub workers: usize,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self { workers: 0 }
    }
}

/// Symmetric, zero-diagonal matrix of distances in meters between the
/// features of one group, labeled by feature id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    group_key: String,
    ids: Vec<String>,
    /// Row-major, `ids.len()²` entries
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Build a matrix from labeled rows. Only the shape is checked here; use
    /// [`DistanceMatrix::validate`] for the metric invariants.
    pub fn from_rows(group_key: &str, ids: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = ids.len();
        if rows.len() != n {
            return Err(ClusterError::integrity(format!(
                "matrix for '{}' has {} rows for {} ids",
                group_key,
                rows.len(),
                n
            )));
        }
        let mut values = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(ClusterError::integrity(format!(
                    "row {} of '{}' has {} columns, expected {}",
                    i,
                    group_key,
                    row.len(),
                    n
                )));
            }
            values.extend(row);
        }
        Ok(Self {
            group_key: group_key.to_string(),
            ids,
            values,
        })
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    /// Feature ids labeling rows and columns.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.len() + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.len();
        &self.values[i * n..(i + 1) * n]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|x| x == id)
    }

    /// Largest pairwise distance (0 for fewer than two features).
    pub fn max_distance(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Check the matrix is square, finite, non-negative, zero on the diagonal
    /// and symmetric.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if self.values.len() != n * n {
            return Err(ClusterError::integrity(format!(
                "matrix for '{}' has {} values for {} ids",
                self.group_key,
                self.values.len(),
                n
            )));
        }
        let mut seen = HashSet::with_capacity(n);
        if let Some(dup) = self.ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(ClusterError::integrity(format!(
                "duplicate id '{}' in matrix for '{}'",
                dup, self.group_key
            )));
        }
        for i in 0..n {
            if self.get(i, i) != 0.0 {
                return Err(ClusterError::integrity(format!(
                    "non-zero diagonal at '{}' in '{}'",
                    self.ids[i], self.group_key
                )));
            }
            for j in (i + 1)..n {
                let a = self.get(i, j);
                let b = self.get(j, i);
                if !a.is_finite() || !b.is_finite() || a < 0.0 || b < 0.0 {
                    return Err(ClusterError::integrity(format!(
                        "invalid distance between '{}' and '{}' in '{}': {} / {}",
                        self.ids[i], self.ids[j], self.group_key, a, b
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOLERANCE * a.abs().max(1.0) {
                    return Err(ClusterError::integrity(format!(
                        "matrix for '{}' is not symmetric at ('{}', '{}'): {} != {}",
                        self.group_key, self.ids[i], self.ids[j], a, b
                    )));
                }
            }
        }
        Ok(())
    }

    /// Read a cached matrix.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Write the matrix atomically: encode into a temporary file next to
    /// `path`, then link it into place.
    ///
    /// An existing file at `path` is never replaced. Returns `false` in that
    /// case and leaves the file as it was.
    pub fn save(&self, path: &Path) -> Result<bool> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let bytes = bincode::serialize(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(ClusterError::Io(e.error)),
        }
    }
}

/// Cache file for a group key. Characters outside `[A-Za-z0-9_-]` are
/// replaced so any key maps to a plain file name.
pub fn cache_path(cache_dir: &Path, group_key: &str) -> PathBuf {
    let name: String = group_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    cache_dir.join(format!("{}.bin", name))
}

/// Return the cached matrix for `group_key` if one exists, otherwise compute
/// it and persist it before returning.
///
/// Returns `Ok(None)` for groups with fewer than two features.
///
/// # Example
/// ```no_run
/// use mining_clusters::{compute_or_load, DistanceConfig, Feature, GeoPoint};
/// use std::path::Path;
///
/// let features = vec![
///     Feature::point("a", "ZMB", GeoPoint::new(-12.80, 28.21)),
///     Feature::point("b", "ZMB", GeoPoint::new(-12.55, 27.85)),
/// ];
/// let matrix = compute_or_load(&features, "ZMB", Path::new("cache"), &DistanceConfig::default())
///     .unwrap()
///     .unwrap();
/// assert_eq!(matrix.len(), 2);
/// ```
pub fn compute_or_load(
    features: &[Feature],
    group_key: &str,
    cache_dir: &Path,
    config: &DistanceConfig,
) -> Result<Option<DistanceMatrix>> {
    if features.len() < 2 {
        return Ok(None);
    }
    check_group(features, group_key)?;

    let path = cache_path(cache_dir, group_key);
    if path.exists() {
        let matrix = DistanceMatrix::load(&path)?;
        info!(
            "[Distance] Loaded cached {}x{} matrix for {} from {}",
            matrix.len(),
            matrix.len(),
            group_key,
            path.display()
        );
        return Ok(Some(matrix));
    }

    let matrix = build_matrix(features, group_key, config)?;
    if matrix.save(&path)? {
        debug!("[Distance] Cached matrix for {} at {}", group_key, path.display());
        return Ok(Some(matrix));
    }

    // Another writer cached this group first; its file is authoritative.
    debug!("[Distance] Cache for {} appeared at {}, loading it", group_key, path.display());
    DistanceMatrix::load(&path).map(Some)
}

/// Compute a group's matrix without touching the cache.
///
/// Returns `Ok(None)` for groups with fewer than two features.
pub fn compute_distance_matrix(
    features: &[Feature],
    group_key: &str,
    config: &DistanceConfig,
) -> Result<Option<DistanceMatrix>> {
    if features.len() < 2 {
        return Ok(None);
    }
    check_group(features, group_key)?;
    build_matrix(features, group_key, config).map(Some)
}

/// Every feature must carry `group_key` and a unique id.
fn check_group(features: &[Feature], group_key: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(features.len());
    for f in features {
        if f.group_key != group_key {
            return Err(ClusterError::integrity(format!(
                "feature '{}' belongs to group '{}', expected '{}'",
                f.id, f.group_key, group_key
            )));
        }
        if !seen.insert(f.id.as_str()) {
            return Err(ClusterError::integrity(format!(
                "duplicate feature id '{}' in group '{}'",
                f.id, group_key
            )));
        }
    }
    Ok(())
}

fn build_matrix(features: &[Feature], group_key: &str, config: &DistanceConfig) -> Result<DistanceMatrix> {
    let n = features.len();
    let start = Instant::now();
    info!(
        "[Distance] Computing {}x{} matrix for {} ({} pairs)",
        n,
        n,
        group_key,
        n * (n - 1) / 2
    );

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<f64>> = {
        use rayon::prelude::*;
        let pool = crate::thread_pool(config.workers)?;
        pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| compute_row(features, i))
                .collect::<Result<Vec<_>>>()
        })?
    };

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<f64>> = {
        let _ = config;
        (0..n)
            .map(|i| compute_row(features, i))
            .collect::<Result<Vec<_>>>()?
    };

    let ids = features.iter().map(|f| f.id.clone()).collect();
    let matrix = DistanceMatrix::from_rows(group_key, ids, rows)?;

    info!(
        "[Distance] Computed matrix for {} in {}ms",
        group_key,
        start.elapsed().as_millis()
    );
    Ok(matrix)
}

/// Distances from feature `i` to every feature of the group.
///
/// Each pair is evaluated with the lower index first so mirrored entries
/// are bit-identical.
fn compute_row(features: &[Feature], i: usize) -> Result<Vec<f64>> {
    let own = &features[i];
    validate_geometry(&own.geometry).map_err(|reason| ClusterError::computation(&own.id, reason))?;

    let mut row = Vec::with_capacity(features.len());
    for j in 0..features.len() {
        if i == j {
            row.push(0.0);
            continue;
        }
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        let d = pairwise_distance(&features[a].geometry, &features[b].geometry);
        if !d.is_finite() || d < 0.0 {
            return Err(ClusterError::computation(
                &own.id,
                format!("invalid distance {} to '{}'", d, features[j].id),
            ));
        }
        row.push(d);
    }
    Ok(row)
}
