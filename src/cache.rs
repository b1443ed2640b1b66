//! Per-trip calibration memoization
//!
//! # File Format
//! `calibration_para.txt`: one line, 9 comma-separated floats, row-major
//! `[lateral; forward; vertical]`. No header, no version field.
//!
//! `calibration_meta.json` (opt-in): versioned sidecar describing how the
//! basis was obtained. The flat file stays the source of truth.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never observes a partial file.

use crate::basis::CalibrationBasis;
use crate::config::TripFiles;
use crate::error::{CalResult, CalibrationError};
use crate::types::{SpeedOrigin, BASIS_LEN};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whether `compute_or_load` read the file or ran the computation
#[derive(Clone, Debug, PartialEq)]
pub enum CacheOutcome<T> {
    Hit(CalibrationBasis),
    Miss(T),
}

impl<T: AsRef<CalibrationBasis>> CacheOutcome<T> {
    pub fn basis(&self) -> &CalibrationBasis {
        match self {
            CacheOutcome::Hit(basis) => basis,
            CacheOutcome::Miss(value) => value.as_ref(),
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit(_))
    }
}

#[derive(Clone, Debug)]
pub struct CalibrationCache {
    path: PathBuf,
}

impl CalibrationCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_trip(trip: &TripFiles) -> Self {
        Self::new(trip.calibration())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no file exists, `CorruptCalibrationCache` when it cannot be parsed
    pub fn load(&self) -> CalResult<Option<CalibrationBasis>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CalibrationError::io(&self.path)(e)),
        };
        String::from_utf8(bytes)
            .map_err(|e| e.to_string())
            .and_then(|text| CalibrationBasis::parse_line(&text))
            .map(Some)
            .map_err(|reason| CalibrationError::CorruptCalibrationCache {
                path: self.path.clone(),
                reason,
            })
    }

    pub fn store(&self, basis: &CalibrationBasis) -> CalResult<()> {
        let mut line = basis.to_line();
        line.push('\n');
        write_atomic(&self.path, line.as_bytes())
    }

    /// Return the stored basis unless `overwrite` is set or the file is
    /// missing or corrupt; otherwise run `compute` and persist its basis.
    /// A failing `compute` leaves the file untouched.
    pub fn compute_or_load<T, F>(&self, overwrite: bool, compute: F) -> CalResult<CacheOutcome<T>>
    where
        T: AsRef<CalibrationBasis>,
        F: FnOnce() -> CalResult<T>,
    {
        if !overwrite {
            match self.load() {
                Ok(Some(basis)) => {
                    log::debug!("{}: using cached calibration", self.path.display());
                    return Ok(CacheOutcome::Hit(basis));
                }
                Ok(None) => {}
                Err(e @ CalibrationError::CorruptCalibrationCache { .. }) => {
                    log::warn!("{}; recomputing", e);
                }
                Err(e) => return Err(e),
            }
        }

        let value = compute()?;
        self.store(value.as_ref())?;
        Ok(CacheOutcome::Miss(value))
    }
}

/// Versioned description of a computed calibration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetadata {
    pub format_version: u32,
    pub basis: [f64; BASIS_LEN],
    pub speed_origin: SpeedOrigin,
    pub gravity: [f64; 3],
    pub accelerating_periods: usize,
    pub gated_samples: usize,
    pub forward_fallback: bool,
    pub computed_at: String,
}

impl CalibrationMetadata {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn save(&self, path: &Path) -> CalResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CalibrationError::malformed(path, 0, e.to_string()))?;
        write_atomic(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> CalResult<Self> {
        let text = fs::read_to_string(path).map_err(CalibrationError::io(path))?;
        serde_json::from_str(&text)
            .map_err(|e| CalibrationError::malformed(path, e.line(), e.to_string()))
    }
}

/// Write to `<path>.tmp`, then rename over `path`
pub fn write_atomic(path: &Path, contents: &[u8]) -> CalResult<()> {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(CalibrationError::io(&tmp)(e));
    }
    fs::rename(&tmp, path).map_err(CalibrationError::io(path))
}
