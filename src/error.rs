use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Per-trip calibration failures. None of these abort other trips.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Accelerometer file missing: {0}")]
    MissingAccelerometerFile(PathBuf),

    #[error("Gravity estimate needs at least {required} samples, got {available}")]
    DegenerateGravityEstimate { available: usize, required: usize },

    #[error("OBD speed required but {0} is absent or invalid")]
    MissingRequiredObd(PathBuf),

    #[error("No usable speed source in {0}")]
    MissingSpeedSource(PathBuf),

    #[error("GPS too sparse: average interval {average_ms:.0} ms exceeds {limit_ms:.0} ms")]
    InvalidGpsDensity { average_ms: f64, limit_ms: f64 },

    #[error("No accelerating period found in speed series")]
    NoAccelerationSegment,

    #[error("No accelerometer sample passed the angle gate")]
    NoGatedSamples,

    #[error("Cannot assemble basis: {0}")]
    DegenerateBasis(&'static str),

    #[error("Corrupt calibration cache {path}: {reason}")]
    CorruptCalibrationCache { path: PathBuf, reason: String },

    #[error("Smoothing fit failed: {0}")]
    SmoothingFailed(String),

    #[error("Malformed input {path} line {line}: {reason}")]
    MalformedInput {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Timestamps go backwards at sample {index}")]
    UnorderedTimestamps { index: usize },

    #[error("Calibration cancelled")]
    Cancelled,

    #[error("Calibration timed out")]
    TimedOut,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for calibration operations
pub type CalResult<T> = Result<T, CalibrationError>;

impl CalibrationError {
    /// Stable short name, used as a key when tallying batch outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            CalibrationError::MissingAccelerometerFile(_) => "missing_accelerometer_file",
            CalibrationError::DegenerateGravityEstimate { .. } => "degenerate_gravity_estimate",
            CalibrationError::MissingRequiredObd(_) => "missing_required_obd",
            CalibrationError::MissingSpeedSource(_) => "missing_speed_source",
            CalibrationError::InvalidGpsDensity { .. } => "invalid_gps_density",
            CalibrationError::NoAccelerationSegment => "no_acceleration_segment",
            CalibrationError::NoGatedSamples => "no_gated_samples",
            CalibrationError::DegenerateBasis(_) => "degenerate_basis",
            CalibrationError::CorruptCalibrationCache { .. } => "corrupt_calibration_cache",
            CalibrationError::SmoothingFailed(_) => "smoothing_failed",
            CalibrationError::MalformedInput { .. } => "malformed_input",
            CalibrationError::UnorderedTimestamps { .. } => "unordered_timestamps",
            CalibrationError::Cancelled => "cancelled",
            CalibrationError::TimedOut => "timed_out",
            CalibrationError::Io { .. } => "io",
        }
    }

    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> CalibrationError + '_ {
        move |source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> Self {
        CalibrationError::MalformedInput {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }
}
