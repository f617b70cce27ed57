//! Error types for render_diff
//!
//! Two families of failure are kept apart:
//! - Policy failures: the comparison ran to completion and the images
//!   disagree beyond the fail threshold (`ImageDifference`).
//! - Faults: an image could not be decoded or written, or the inputs cannot
//!   be compared at all.
//!
//! All errors use the `thiserror` crate.

use crate::core_modules::statistics::ComparisonStatistics;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for render_diff operations.
pub type Result<T> = std::result::Result<T, CompareError>;

/// Top-level error type for a comparison.
#[derive(Error, Debug)]
pub enum CompareError {
    /// The images differ beyond the fail threshold and the caller asked for strict mode.
    ///
    /// The message is the fixed-layout report produced by [`crate::format_report`].
    #[error("{report}")]
    ImageDifference {
        report: String,
        statistics: ComparisonStatistics,
        diff_path: PathBuf,
    },

    /// A source image could not be opened or decoded.
    #[error("failed to load image {}: {source}", .path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An output image could not be encoded or written.
    #[error("failed to write image {}: {source}", .path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The directory receiving the diff artifact could not be created.
    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Candidate and baseline do not share the same dimensions.
    #[error("image dimensions differ: candidate {candidate:?}, baseline {baseline:?}")]
    DimensionMismatch {
        candidate: (u32, u32),
        baseline: (u32, u32),
    },

    /// A batch worker disappeared before answering.
    #[error("comparison worker failed: {0}")]
    Worker(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CompareError {
    /// Returns true for threshold violations, false for I/O and setup faults.
    pub fn is_policy_failure(&self) -> bool {
        matches!(self, CompareError::ImageDifference { .. })
    }

    /// Statistics attached to a policy failure.
    pub fn statistics(&self) -> Option<&ComparisonStatistics> {
        match self {
            CompareError::ImageDifference { statistics, .. } => Some(statistics),
            _ => None,
        }
    }
}

/// Errors raised while resolving configuration overrides.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key}: expected a finite number, got {value:?}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_failure_is_distinguished_from_faults() {
        let policy = CompareError::ImageDifference {
            report: "Failures:       3\n".to_string(),
            statistics: ComparisonStatistics::default(),
            diff_path: PathBuf::from("out/a_diff.png"),
        };
        assert!(policy.is_policy_failure());
        assert!(policy.statistics().is_some());
        assert_eq!(policy.to_string(), "Failures:       3\n");

        let mismatch = CompareError::DimensionMismatch {
            candidate: (4, 4),
            baseline: (4, 5),
        };
        assert!(!mismatch.is_policy_failure());
        assert_eq!(
            mismatch.to_string(),
            "image dimensions differ: candidate (4, 4), baseline (4, 5)"
        );
    }
}
