use crate::error::{CalResult, CalibrationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const GRAVITY_OF_EARTH: f64 = 9.81; // m/s²

// ===== Trip file names =====
pub const ACC_FILE_NAME: &str = "raw_acc.txt";
pub const GPS_FILE_NAME: &str = "gps.txt";
pub const OBD_FILE_NAME: &str = "raw_obd.txt";
pub const CALIBRATION_FILE_NAME: &str = "calibration_para.txt";
pub const CALIBRATION_META_FILE_NAME: &str = "calibration_meta.json";
pub const GZIP_EXTENSION: &str = "gz";

/// What to do when accelerating periods exist but no sample survives the angle gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Use the `(1, 1, 1)` placeholder forward vector (legacy outputs)
    Placeholder,
    /// Skip the trip with `NoGatedSamples`
    Fail,
}

/// Exponential smoothing fit bounds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Tunables for one calibration run. Every field has a default, so a JSON
/// config file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Leading accelerometer samples used for the gravity fit
    pub gravity_window: usize,
    /// Minimum walk-back length for an accelerating period
    pub min_accelerate_count: usize,
    /// Accepted deviation from 90° between a sample and gravity
    pub angle_tolerance_deg: f64,
    /// Largest acceptable average GPS sampling interval
    pub max_gps_interval_ms: f64,
    pub fallback: FallbackPolicy,
    /// Also write the versioned `calibration_meta.json` sidecar
    pub write_metadata: bool,
    pub smoothing: SmoothingConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            gravity_window: 1000,
            min_accelerate_count: 2,
            angle_tolerance_deg: 1.0,
            max_gps_interval_ms: 5_000.0,
            fallback: FallbackPolicy::Placeholder,
            write_metadata: false,
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl CalibrationConfig {
    /// Load a JSON config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> CalResult<Self> {
        let text = fs::read_to_string(path).map_err(CalibrationError::io(path))?;
        serde_json::from_str(&text)
            .map_err(|e| CalibrationError::malformed(path, e.line(), e.to_string()))
    }
}

/// Paths of the sensor files inside one trip directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TripFiles {
    dir: PathBuf,
}

impl TripFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn accelerometer(&self) -> PathBuf {
        self.dir.join(ACC_FILE_NAME)
    }

    pub fn gps(&self) -> PathBuf {
        self.dir.join(GPS_FILE_NAME)
    }

    pub fn obd(&self) -> PathBuf {
        self.dir.join(OBD_FILE_NAME)
    }

    pub fn calibration(&self) -> PathBuf {
        self.dir.join(CALIBRATION_FILE_NAME)
    }

    pub fn metadata(&self) -> PathBuf {
        self.dir.join(CALIBRATION_META_FILE_NAME)
    }
}
