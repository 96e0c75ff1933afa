//! Error type shared by the collector, the rate calculator and the facade.

use std::path::PathBuf;

use crate::collector::procfs::fields::{Field, ReadError};

/// Why a snapshot or a metric is unavailable.
///
/// Every metric call returns this instead of an overloaded zero, so callers
/// can tell "idle" (`Ok(0.0)`) from "could not measure" (`Err(_)`).
#[derive(Debug, Clone, PartialEq)]
pub enum MetricError {
    /// A pseudo-file is missing or unreadable.
    SourceUnavailable { path: PathBuf, reason: String },
    /// A pseudo-file is shorter than the expected field layout.
    FieldOutOfRange {
        path: PathBuf,
        field: Field,
        len: usize,
    },
    /// A pseudo-file value does not parse.
    Malformed { path: PathBuf, reason: String },
    /// A monotonic counter decreased between samples (reset or wraparound).
    CounterRegression,
    /// A computed denominator is zero.
    DivisionUndefined,
    /// The target process does not exist.
    ProcessGone(u32),
}

impl MetricError {
    /// Errors expected in normal operation: counters wrap, processes exit,
    /// and two samples taken too close together have nothing to divide by.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetricError::CounterRegression
                | MetricError::DivisionUndefined
                | MetricError::ProcessGone(_)
        )
    }
}

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::SourceUnavailable { path, reason } => {
                write!(f, "{} unavailable: {}", path.display(), reason)
            }
            MetricError::FieldOutOfRange { path, field, len } => write!(
                f,
                "{}: field {} out of range ({} values)",
                path.display(),
                field,
                len
            ),
            MetricError::Malformed { path, reason } => {
                write!(f, "{}: malformed: {}", path.display(), reason)
            }
            MetricError::CounterRegression => write!(f, "counter decreased between samples"),
            MetricError::DivisionUndefined => write!(f, "no elapsed ticks between samples"),
            MetricError::ProcessGone(pid) => write!(f, "process {} not found", pid),
        }
    }
}

impl std::error::Error for MetricError {}

impl From<ReadError> for MetricError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::NotFound(path) => MetricError::SourceUnavailable {
                path,
                reason: "not found".to_string(),
            },
            ReadError::PermissionDenied(path) => MetricError::SourceUnavailable {
                path,
                reason: "permission denied".to_string(),
            },
            ReadError::Malformed { path, reason } => MetricError::Malformed { path, reason },
            ReadError::OutOfRange { path, field, len } => {
                MetricError::FieldOutOfRange { path, field, len }
            }
        }
    }
}
