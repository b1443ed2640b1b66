use crate::basis::CalibrationBasis;
use crate::cache::{CacheOutcome, CalibrationCache, CalibrationMetadata};
use crate::cancel::CancelToken;
use crate::config::{CalibrationConfig, TripFiles};
use crate::error::{CalResult, CalibrationError};
use crate::forward_axis::{ForwardAxisEstimator, ForwardEstimate};
use crate::gravity::GravityEstimator;
use crate::sample_store;
use crate::segments::SegmentDetector;
use crate::speed_source::SpeedSource;
use crate::types::{SpeedOrigin, Vec3};
use chrono::Utc;

/// Everything learned while computing one trip's basis
#[derive(Clone, Debug)]
pub struct CalibrationReport {
    pub basis: CalibrationBasis,
    pub gravity: Vec3,
    pub speed_origin: SpeedOrigin,
    pub accelerating_periods: usize,
    pub forward: ForwardEstimate,
}

impl AsRef<CalibrationBasis> for CalibrationReport {
    fn as_ref(&self) -> &CalibrationBasis {
        &self.basis
    }
}

impl CalibrationReport {
    pub fn metadata(&self) -> CalibrationMetadata {
        CalibrationMetadata {
            format_version: CalibrationMetadata::FORMAT_VERSION,
            basis: self.basis.to_values(),
            speed_origin: self.speed_origin,
            gravity: [self.gravity.x, self.gravity.y, self.gravity.z],
            accelerating_periods: self.accelerating_periods,
            gated_samples: self.forward.gated_samples,
            forward_fallback: self.forward.fallback,
            computed_at: Utc::now().to_rfc3339(),
        }
    }
}

pub type TripCalibration = CacheOutcome<CalibrationReport>;

/// Runs the full per-trip pipeline:
/// cache → load → gravity → speed → segments → forward → basis → persist
#[derive(Clone, Debug)]
pub struct TripCalibrator {
    config: CalibrationConfig,
    gravity: GravityEstimator,
    speed: SpeedSource,
    segments: SegmentDetector,
    forward: ForwardAxisEstimator,
}

impl TripCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            gravity: GravityEstimator::from_config(&config),
            speed: SpeedSource::from_config(&config),
            segments: SegmentDetector::from_config(&config),
            forward: ForwardAxisEstimator::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Compute the basis without touching the cache
    pub fn compute(
        &self,
        trip: &TripFiles,
        require_obd: bool,
        cancel: &CancelToken,
    ) -> CalResult<CalibrationReport> {
        let accel_path = trip.accelerometer();
        if sample_store::resolve(&accel_path).is_none() {
            return Err(CalibrationError::MissingAccelerometerFile(accel_path));
        }
        cancel.check()?;
        let accel = sample_store::read_accelerometer(&accel_path)?;

        cancel.check()?;
        let gravity = self.gravity.estimate(&accel, cancel)?;

        cancel.check()?;
        let speed = self.speed.select(trip, require_obd)?;

        cancel.check()?;
        let scan = self.segments.detect_series(&speed.series);
        if scan.is_empty() {
            return Err(CalibrationError::NoAccelerationSegment);
        }

        let forward = self
            .forward
            .estimate(&accel, &speed.series, &scan.periods, &gravity, cancel)?;
        cancel.check()?;

        let basis = CalibrationBasis::assemble(&gravity, &forward.vector)?;
        log::debug!(
            "{}: gravity=({:.3}, {:.3}, {:.3}) forward=({:.3}, {:.3}, {:.3}) via {:?}",
            trip.dir().display(),
            gravity.x,
            gravity.y,
            gravity.z,
            forward.vector.x,
            forward.vector.y,
            forward.vector.z,
            speed.origin
        );

        Ok(CalibrationReport {
            basis,
            gravity,
            speed_origin: speed.origin,
            accelerating_periods: scan.periods.len(),
            forward,
        })
    }

    /// Return the trip's stored basis, or compute and persist a new one
    pub fn compute_or_load(
        &self,
        trip: &TripFiles,
        require_obd: bool,
        overwrite: bool,
        cancel: &CancelToken,
    ) -> CalResult<TripCalibration> {
        let cache = CalibrationCache::for_trip(trip);
        let outcome =
            cache.compute_or_load(overwrite, || self.compute(trip, require_obd, cancel))?;

        if let CacheOutcome::Miss(report) = &outcome {
            // calibration_para.txt is already stored at this point
            if self.config.write_metadata {
                if let Err(e) = report.metadata().save(&trip.metadata()) {
                    log::warn!("{}: metadata not written: {}", trip.dir().display(), e);
                }
            }
        }
        Ok(outcome)
    }
}

impl Default for TripCalibrator {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("vcal_calibrator_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_accelerometer_is_reported_first() {
        let dir = scratch("no_acc");
        fs::write(dir.join("raw_obd.txt"), "timestamp,Speed\n1000,5km/h\n").unwrap();

        let err = TripCalibrator::default()
            .compute(&TripFiles::new(&dir), false, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CalibrationError::MissingAccelerometerFile(_)));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_flat_speed_has_no_segment() {
        let dir = scratch("flat");
        let mut acc = String::from("timestamp,sys_time,abs,x,y,z\n");
        for i in 0..20 {
            acc.push_str(&format!("{},{},{},0,0,9.81\n", i, i * 100, i));
        }
        fs::write(dir.join("raw_acc.txt"), acc).unwrap();
        fs::write(
            dir.join("raw_obd.txt"),
            "timestamp,Speed\n0,5km/h\n500,5km/h\n1000,5km/h\n",
        )
        .unwrap();

        let trip = TripFiles::new(&dir);
        let err = TripCalibrator::default()
            .compute_or_load(&trip, false, false, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CalibrationError::NoAccelerationSegment));
        assert!(!trip.calibration().exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_sidecar_failure_keeps_basis() {
        let dir = scratch("sidecar");
        let mut acc = String::from("timestamp,sys_time,abs,x,y,z\n");
        for i in 0..60 {
            let y = if i < 20 { 0.0 } else { 3.0 };
            acc.push_str(&format!("{},{},{},0,{},9.81\n", i, i * 100, i, y));
        }
        fs::write(dir.join("raw_acc.txt"), acc).unwrap();
        fs::write(
            dir.join("raw_obd.txt"),
            "timestamp,Speed\n2000,0km/h\n3000,1km/h\n4000,2km/h\n5000,3km/h\n",
        )
        .unwrap();
        let trip = TripFiles::new(&dir);
        // A directory where the sidecar should go makes its rename fail
        fs::create_dir_all(trip.metadata()).unwrap();

        let calibrator = TripCalibrator::new(CalibrationConfig {
            write_metadata: true,
            ..CalibrationConfig::default()
        });
        let outcome = calibrator
            .compute_or_load(&trip, false, false, &CancelToken::new())
            .unwrap();
        assert!(!outcome.is_hit());
        assert!(trip.calibration().exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
