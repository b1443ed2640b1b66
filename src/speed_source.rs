use crate::config::{CalibrationConfig, TripFiles};
use crate::error::{CalResult, CalibrationError};
use crate::sample_store;
use crate::types::{SpeedOrigin, SpeedSample, TimeSeries};

/// Speed series chosen for a trip, tagged with where it came from.
/// Values stay in the origin's unit (km/h for OBD, m/s for GPS).
#[derive(Clone, Debug)]
pub struct SpeedSelection {
    pub origin: SpeedOrigin,
    pub series: TimeSeries<SpeedSample>,
}

/// Picks OBD or GPS as the speed reference for a trip.
///
/// A structurally valid OBD file always wins. Without one, a trip that
/// demands OBD fails; otherwise GPS is used if it is dense enough.
#[derive(Clone, Debug)]
pub struct SpeedSource {
    max_gps_interval_ms: f64,
}

impl SpeedSource {
    pub fn new(max_gps_interval_ms: f64) -> Self {
        Self {
            max_gps_interval_ms,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.max_gps_interval_ms)
    }

    pub fn select(&self, trip: &TripFiles, require_obd: bool) -> CalResult<SpeedSelection> {
        let obd_path = trip.obd();
        if sample_store::obd_is_valid(&obd_path) {
            let series = sample_store::read_obd(&obd_path)?;
            log::debug!("{}: using OBD speed ({} samples)", trip.dir().display(), series.len());
            return Ok(SpeedSelection {
                origin: SpeedOrigin::Obd,
                series,
            });
        }

        if require_obd {
            return Err(CalibrationError::MissingRequiredObd(obd_path));
        }

        let series = sample_store::read_gps(&trip.gps())?
            .filter(|series| !series.is_empty())
            .ok_or_else(|| CalibrationError::MissingSpeedSource(trip.dir().to_path_buf()))?;
        self.check_gps_density(&series)?;
        log::debug!("{}: falling back to GPS speed ({} samples)", trip.dir().display(), series.len());

        Ok(SpeedSelection {
            origin: SpeedOrigin::Gps,
            series,
        })
    }

    /// Average interval (span / sample count) must not exceed the configured limit.
    pub fn check_gps_density(&self, series: &TimeSeries<SpeedSample>) -> CalResult<()> {
        let average_ms = series.average_interval_ms().unwrap_or(f64::INFINITY);
        if average_ms > self.max_gps_interval_ms {
            return Err(CalibrationError::InvalidGpsDensity {
                average_ms,
                limit_ms: self.max_gps_interval_ms,
            });
        }
        Ok(())
    }
}

impl Default for SpeedSource {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::{Path, PathBuf};

    const GPS_HEADER: &str = "timestamp,sys_time,lat,lon,speed,bearing,accuracy,provider\n";

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("vcal_speed_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_gps(dir: &Path, interval_ms: i64, count: i64) {
        let mut text = GPS_HEADER.to_string();
        for i in 0..count {
            text.push_str(&format!("{},{},37.0,-122.0,{},0,5,gps\n", i, i * interval_ms, i));
        }
        fs::write(dir.join("gps.txt"), text).unwrap();
    }

    #[test]
    fn test_prefers_valid_obd() {
        let dir = scratch("obd");
        fs::write(dir.join("raw_obd.txt"), "timestamp,Speed\n1000,5km/h\n2000,7km/h\n").unwrap();
        write_gps(&dir, 1000, 10);

        let selection = SpeedSource::default()
            .select(&TripFiles::new(&dir), false)
            .unwrap();
        assert_eq!(selection.origin, SpeedOrigin::Obd);
        assert_eq!(selection.series.speeds(), vec![5.0, 7.0]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_required_obd_missing() {
        let dir = scratch("required");
        write_gps(&dir, 1000, 10);

        let err = SpeedSource::default()
            .select(&TripFiles::new(&dir), true)
            .unwrap_err();
        assert_eq!(err.kind(), "missing_required_obd");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dense_gps_fallback() {
        let dir = scratch("dense");
        fs::write(dir.join("raw_obd.txt"), "timestamp,Speed\n").unwrap();
        write_gps(&dir, 1000, 10);

        let selection = SpeedSource::default()
            .select(&TripFiles::new(&dir), false)
            .unwrap();
        assert_eq!(selection.origin, SpeedOrigin::Gps);
        assert_eq!(selection.series.len(), 10);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_blank_obd_speed_yields_to_gps() {
        let dir = scratch("blank_obd");
        fs::write(dir.join("raw_obd.txt"), "timestamp,Speed\n1000,\n2000,\n").unwrap();
        write_gps(&dir, 1000, 10);

        let selection = SpeedSource::default()
            .select(&TripFiles::new(&dir), false)
            .unwrap();
        assert_eq!(selection.origin, SpeedOrigin::Gps);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_sparse_gps_rejected() {
        let dir = scratch("sparse");
        // 10 fixes spaced 10 s apart: 90 s span / 10 = 9 s average > 5 s
        write_gps(&dir, 10_000, 10);

        let err = SpeedSource::default()
            .select(&TripFiles::new(&dir), false)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidGpsDensity { .. }));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_no_speed_at_all() {
        let dir = scratch("none");
        let err = SpeedSource::default()
            .select(&TripFiles::new(&dir), false)
            .unwrap_err();
        assert_eq!(err.kind(), "missing_speed_source");
        fs::remove_dir_all(&dir).unwrap();
    }
}
