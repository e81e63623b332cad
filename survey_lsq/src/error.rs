//! Error type shared by every part of the adjustment engine.

use crate::dataset::{Axis, MeasurementType};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AdjustError>;

#[derive(Debug, Error)]
pub enum AdjustError {
    /// Unknown reweighting method name.
    #[error("invalid method '{0}', expected 'ordinary', 'weighted' or a robust estimator name")]
    InvalidMethod(String),

    #[error("invalid build strategy '{0}', expected 'speed' or 'memory-safe'")]
    InvalidStrategy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sigma configuration has no row named '{0}'")]
    UnknownSigmaConfig(String),

    #[error("unknown control point '{0}'")]
    UnknownPoint(String),

    #[error("unknown station '{0}'")]
    UnknownStation(String),

    #[error("control point id '{0}' appears more than once")]
    DuplicatePoint(String),

    #[error("station key '{0}' appears more than once")]
    DuplicateStation(String),

    #[error("point '{point}' has no {axis} coordinate required by the measurement")]
    MissingCoordinate { point: String, axis: Axis },

    #[error("measurement {kind} from '{station}' to '{target}' has non-positive sigma {sigma}")]
    InvalidSigma {
        station: String,
        target: String,
        kind: MeasurementType,
        sigma: f64,
    },

    #[error("dataset contains no measurement values")]
    EmptyDataset,

    #[error("pseudo-inverse failed: {0}")]
    PseudoInverse(String),

    #[error("adjustment aborted before any iteration succeeded")]
    NoSuccessfulIteration,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_method_lists_choices() {
        let msg = AdjustError::InvalidMethod("bogus".into()).to_string();
        assert!(msg.contains("bogus"));
        assert!(msg.contains("weighted"));
    }

    #[test]
    fn missing_coordinate_display() {
        let err = AdjustError::MissingCoordinate {
            point: "P1".into(),
            axis: Axis::Z,
        };
        assert_eq!(
            err.to_string(),
            "point 'P1' has no z coordinate required by the measurement"
        );
    }
}
