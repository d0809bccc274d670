//! Error types for snapshots, cloud providers and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from domain snapshots. Neither variant leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name:?} already exists in the snapshot")]
    AlreadyExists { kind: &'static str, name: String },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors returned through the cloud provider capability traits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudProviderError {
    #[error("not implemented")]
    NotImplemented,

    #[error("node group {0:?} not found")]
    NodeGroupNotFound(String),

    #[error("invalid node group size delta {0}")]
    InvalidDelta(i64),

    #[error("node group {group:?} size {size} outside of [{min}, {max}]")]
    SizeOutOfRange {
        group: String,
        size: i64,
        min: usize,
        max: usize,
    },

    #[error("node {node:?} does not belong to node group {group:?}")]
    NodeNotInGroup { node: String, group: String },
}

pub type CloudProviderResult<T> = Result<T, CloudProviderError>;

/// Errors loading scenario files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors aborting a scale-up estimation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimatorError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    CloudProvider(#[from] CloudProviderError),
}

pub type EstimatorResult<T> = Result<T, EstimatorError>;

/// Errors writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write csv report: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write json report: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;
