//! Per-trip vehicle calibration: recover the rotation that takes phone
//! accelerometer readings into the vehicle frame (lateral, forward, vertical)
//! from the gravity estimate and the direction of acceleration while the
//! vehicle speeds up.

pub mod basis;
pub mod batch;
pub mod cache;
pub mod calibrator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod forward_axis;
pub mod gravity;
pub mod sample_store;
pub mod segments;
pub mod smoothing;
pub mod speed_source;
pub mod types;

pub use basis::CalibrationBasis;
pub use batch::{discover_trips, BatchOptions, BatchRunner, BatchSummary, TripOutcome, TripStatus};
pub use cache::{CacheOutcome, CalibrationCache};
pub use calibrator::{CalibrationReport, TripCalibration, TripCalibrator};
pub use cancel::CancelToken;
pub use config::{CalibrationConfig, FallbackPolicy, TripFiles};
pub use error::{CalResult, CalibrationError};
