use thiserror::Error;

use crate::body::BodyId;

/// Errors surfaced by the room calibration core.
///
/// Transient sensor-stream conditions (non-finite samples, wrong target,
/// video before IMU) are not errors: those samples are simply dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    /// IMU data arrived from a second body while only one IMU is allowed.
    #[error("received IMU data from body {received}, but IMU {bound} is already bound and the single-IMU assumption is enabled")]
    SecondImu { bound: BodyId, received: BodyId },

    /// The tracking system reports more IMUs than the single-IMU assumption allows.
    #[error("{count} IMUs present system wide, but the single-IMU assumption is enabled")]
    MultipleImus { count: usize },

    /// A result query was made before calibration completed.
    #[error("room calibration is not complete")]
    NotComplete,

    #[error("invalid calibration config: {0}")]
    InvalidConfig(String),
}

impl CalibrationError {
    /// Misconfigured deployment rather than a caller mistake.
    pub fn is_configuration_violation(&self) -> bool {
        matches!(
            self,
            CalibrationError::SecondImu { .. } | CalibrationError::MultipleImus { .. }
        )
    }
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
