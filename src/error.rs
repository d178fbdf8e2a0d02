//! Unified error type for distance, clustering and optimization stages.
//!
//! Degenerate input (a group with fewer than two features) is not an error:
//! it surfaces as `Ok(None)` from [`crate::distance::compute_or_load`] and as
//! trivial singleton partitions from [`crate::clustering::cluster`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Malformed geometry, malformed distance matrix, mixed group keys or a
    /// partition that does not match its feature table.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Invalid search bounds, population size, threshold or worker pool.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A parallel distance worker failed; the whole matrix is discarded.
    #[error("Distance computation failed for feature '{feature_id}': {reason}")]
    Computation { feature_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    pub fn integrity<S: Into<String>>(msg: S) -> Self {
        ClusterError::DataIntegrity(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        ClusterError::Configuration(msg.into())
    }

    pub fn computation<I: Into<String>, S: Into<String>>(feature_id: I, reason: S) -> Self {
        ClusterError::Computation {
            feature_id: feature_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for ClusterError {
    fn from(err: bincode::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}
