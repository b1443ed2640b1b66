//! Batch calibration over many trips.
//!
//! Trips are independent: each worker owns one trip directory at a time and
//! nothing is shared between them except the job queue, so a failing trip
//! only ever produces a `Skipped` outcome for itself.

use crate::cache::CacheOutcome;
use crate::calibrator::TripCalibrator;
use crate::cancel::CancelToken;
use crate::config::{TripFiles, ACC_FILE_NAME};
use crate::error::{CalResult, CalibrationError};
use crate::sample_store;
use chrono::Utc;
use crossbeam::channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Every directory under `root` (inclusive) holding an accelerometer
/// recording, plain or gzipped. Sorted for deterministic runs.
pub fn discover_trips(root: &Path) -> CalResult<Vec<PathBuf>> {
    let mut trips = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        if sample_store::resolve(&dir.join(ACC_FILE_NAME)).is_some() {
            trips.push(dir.clone());
        }
        let entries = fs::read_dir(&dir).map_err(CalibrationError::io(&dir))?;
        for entry in entries {
            let entry = entry.map_err(CalibrationError::io(&dir))?;
            let file_type = entry.file_type().map_err(CalibrationError::io(&entry.path()))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            }
        }
    }

    trips.sort();
    Ok(trips)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Computed,
    Cached,
    Skipped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripOutcome {
    pub trip: PathBuf,
    pub status: TripStatus,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    /// Forward axis came from the `(1, 1, 1)` placeholder
    pub forward_fallback: bool,
    pub elapsed_ms: u64,
}

impl TripOutcome {
    fn skipped(trip: PathBuf, error: &CalibrationError, elapsed: Duration) -> Self {
        TripOutcome {
            trip,
            status: TripStatus::Skipped,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            forward_fallback: false,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: String,
    pub elapsed_secs: f64,
    pub total: usize,
    pub computed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub forward_fallbacks: usize,
    pub skipped_by_kind: BTreeMap<String, usize>,
    pub outcomes: Vec<TripOutcome>,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<TripOutcome>, started_at: String, elapsed: Duration) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        let mut skipped_by_kind = BTreeMap::new();
        for kind in outcomes.iter().filter_map(|o| o.error_kind.as_ref()) {
            *skipped_by_kind.entry(kind.clone()).or_insert(0) += 1;
        }
        BatchSummary {
            started_at,
            elapsed_secs: elapsed.as_secs_f64(),
            total: outcomes.len(),
            computed: count(TripStatus::Computed),
            cached: count(TripStatus::Cached),
            skipped: count(TripStatus::Skipped),
            forward_fallbacks: outcomes.iter().filter(|o| o.forward_fallback).count(),
            skipped_by_kind,
            outcomes,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub require_obd: bool,
    pub overwrite: bool,
    pub workers: usize,
    pub trip_timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            require_obd: false,
            overwrite: false,
            workers: 1,
            trip_timeout: None,
        }
    }
}

pub struct BatchRunner {
    calibrator: TripCalibrator,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(calibrator: TripCalibrator, options: BatchOptions) -> Self {
        Self {
            calibrator,
            options,
        }
    }

    /// Calibrate one trip, folding any error into a `Skipped` outcome
    pub fn run_trip(&self, trip: &Path, cancel: &CancelToken) -> TripOutcome {
        let started = Instant::now();
        let token = cancel.child(self.options.trip_timeout);
        let files = TripFiles::new(trip);

        match self.calibrator.compute_or_load(
            &files,
            self.options.require_obd,
            self.options.overwrite,
            &token,
        ) {
            Ok(outcome) => {
                let (status, forward_fallback) = match &outcome {
                    CacheOutcome::Hit(_) => (TripStatus::Cached, false),
                    CacheOutcome::Miss(report) => (TripStatus::Computed, report.forward.fallback),
                };
                log::info!("{}: {:?}", trip.display(), status);
                TripOutcome {
                    trip: trip.to_path_buf(),
                    status,
                    error_kind: None,
                    error: None,
                    forward_fallback,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                log::warn!("{}: skipped ({})", trip.display(), e);
                TripOutcome::skipped(trip.to_path_buf(), &e, started.elapsed())
            }
        }
    }

    /// Calibrate all `trips` on a pool of worker threads. Outcomes come back
    /// in the order of `trips`.
    pub fn run(&self, trips: &[PathBuf], cancel: &CancelToken) -> BatchSummary {
        let started_at = Utc::now().to_rfc3339();
        let started = Instant::now();
        let workers = self.options.workers.max(1).min(trips.len().max(1));

        let (job_tx, job_rx) = channel::unbounded::<(usize, &PathBuf)>();
        for job in trips.iter().enumerate() {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, result_rx) = channel::unbounded::<(usize, TripOutcome)>();
        let scoped = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    for (index, trip) in job_rx.iter() {
                        let outcome = self.run_trip(trip, cancel);
                        if result_tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);
        if scoped.is_err() {
            log::error!("a calibration worker panicked");
        }

        let mut slots: Vec<Option<TripOutcome>> = vec![None; trips.len()];
        for (index, outcome) in result_rx.iter() {
            slots[index] = Some(outcome);
        }
        let outcomes = slots
            .into_iter()
            .zip(trips)
            .map(|(slot, trip)| {
                slot.unwrap_or_else(|| TripOutcome {
                    trip: trip.clone(),
                    status: TripStatus::Skipped,
                    error_kind: Some("worker_panic".to_string()),
                    error: Some("calibration worker panicked".to_string()),
                    forward_fallback: false,
                    elapsed_ms: 0,
                })
            })
            .collect();

        let summary = BatchSummary::from_outcomes(outcomes, started_at, started.elapsed());
        log::info!(
            "{} trips: {} computed, {} cached, {} skipped",
            summary.total,
            summary.computed,
            summary.cached,
            summary.skipped
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("vcal_batch_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_discover_nested_trips() {
        let root = scratch("discover");
        let a = root.join("car1").join("VehSenseData2018_03_20_19_56_59");
        let b = root.join("car2").join("VehSenseData2019_01_05_04_27_56");
        let empty = root.join("car3").join("nothing_here");
        for dir in [&a, &b, &empty] {
            fs::create_dir_all(dir).unwrap();
        }
        fs::write(a.join("raw_acc.txt"), "h\n").unwrap();
        fs::write(b.join("raw_acc.txt.gz"), "").unwrap();

        assert_eq!(discover_trips(&root).unwrap(), vec![a, b]);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_failures_stay_per_trip() {
        let root = scratch("failures");
        let missing_acc = root.join("trip_a");
        let no_speed = root.join("trip_b");
        fs::create_dir_all(&missing_acc).unwrap();
        fs::create_dir_all(&no_speed).unwrap();
        fs::write(
            no_speed.join("raw_acc.txt"),
            "timestamp,sys_time,abs,x,y,z\n0,0,0,0,0,9.81\n1,5,1,0,0,9.81\n",
        )
        .unwrap();

        let runner = BatchRunner::new(
            TripCalibrator::default(),
            BatchOptions {
                workers: 2,
                ..BatchOptions::default()
            },
        );
        let summary = runner.run(&[missing_acc.clone(), no_speed.clone()], &CancelToken::new());

        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.outcomes[0].trip, missing_acc);
        assert_eq!(
            summary.outcomes[0].error_kind.as_deref(),
            Some("missing_accelerometer_file")
        );
        assert_eq!(
            summary.outcomes[1].error_kind.as_deref(),
            Some("missing_speed_source")
        );
        assert_eq!(summary.skipped_by_kind.len(), 2);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_cancelled_batch_writes_nothing() {
        let root = scratch("cancelled");
        let trip = root.join("trip");
        fs::create_dir_all(&trip).unwrap();
        fs::write(
            trip.join("raw_acc.txt"),
            "timestamp,sys_time,abs,x,y,z\n0,0,0,0,0,9.81\n1,5,1,0,0,9.81\n",
        )
        .unwrap();

        let token = CancelToken::new();
        token.cancel();
        let summary = BatchRunner::new(TripCalibrator::default(), BatchOptions::default())
            .run(&[trip.clone()], &token);

        assert_eq!(summary.outcomes[0].error_kind.as_deref(), Some("cancelled"));
        assert!(!trip.join("calibration_para.txt").exists());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_summary_json() {
        let root = scratch("summary");
        let summary = BatchRunner::new(TripCalibrator::default(), BatchOptions::default())
            .run(&[], &CancelToken::new());
        let path = root.join("summary.json");
        summary.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"total\": 0"));

        fs::remove_dir_all(&root).unwrap();
    }
}
