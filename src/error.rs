use std::fmt;
use thiserror::Error;

/// Which collaborator a connectivity failure originated from. The summary
/// aggregator degrades only on `Metrics` failures; `Cluster` failures stay
/// fatal everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Cluster,
    Metrics,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::Cluster => f.write_str("cluster"),
            SourceOrigin::Metrics => f.write_str("metrics"),
        }
    }
}

/// Failure taxonomy of the optimization engine.
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// Endpoint unreachable. Fatal for analyze/recommend; summarize downgrades
    /// it to degraded mode when the origin is the metrics source.
    #[error("{origin} source unreachable during {operation}: {message}")]
    Connectivity {
        origin: SourceOrigin,
        operation: String,
        message: String,
    },

    /// RBAC denial on a specific resource. Recovered per workload kind inside
    /// analyze; fatal at scope level.
    #[error("permission denied for {resource}: {message}")]
    Permission { resource: String, message: String },

    /// The source was reachable but the data needed for the computation does
    /// not exist.
    #[error("incomplete data for {subject}: {message}")]
    DataIncomplete { subject: String, message: String },

    /// Parameter validation failure, raised before any I/O.
    #[error("invalid parameters: {0}")]
    Validation(String),

    /// The caller's timeout expired; no partial results are returned.
    #[error("{operation} cancelled before completion")]
    Cancelled { operation: String },
}

impl OptimizeError {
    pub fn is_metrics_unavailable(&self) -> bool {
        matches!(
            self,
            OptimizeError::Connectivity {
                origin: SourceOrigin::Metrics,
                ..
            }
        )
    }
}

/// Error surface of the collaborator traits. The engine maps these into
/// `OptimizeError` with the operation context attached.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("endpoint unreachable: {0}")]
    Connectivity(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl SourceError {
    /// Only connectivity-class failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connectivity(_))
    }
}

pub(crate) fn map_source_err(
    origin: SourceOrigin,
    operation: &str,
    err: SourceError,
) -> OptimizeError {
    match err {
        SourceError::Connectivity(message) => OptimizeError::Connectivity {
            origin,
            operation: operation.to_string(),
            message,
        },
        SourceError::Permission(message) => OptimizeError::Permission {
            resource: operation.to_string(),
            message,
        },
        SourceError::NotFound(message) => OptimizeError::DataIncomplete {
            subject: operation.to_string(),
            message,
        },
    }
}
