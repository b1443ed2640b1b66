use crate::cancel::CancelToken;
use crate::config::{CalibrationConfig, GRAVITY_OF_EARTH};
use crate::error::CalResult;
use crate::smoothing::ExpSmoother;
use crate::types::{AccelData, TimeSeries, Vec3, AXIS_COUNT};

/// Estimates the constant gravity component on each accelerometer axis.
///
/// Only the leading window of the trip is used: the vehicle is assumed to
/// be at rest (or creeping) when recording starts, so the smoothed level of
/// each axis converges to gravity projected through the mount rotation.
#[derive(Clone, Debug)]
pub struct GravityEstimator {
    window: usize,
    smoother: ExpSmoother,
}

impl GravityEstimator {
    pub fn new(window: usize, smoother: ExpSmoother) -> Self {
        Self { window, smoother }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(
            config.gravity_window,
            ExpSmoother::from_config(&config.smoothing),
        )
    }

    pub fn estimate(&self, accel: &TimeSeries<AccelData>, cancel: &CancelToken) -> CalResult<Vec3> {
        let head = &accel.samples()[..accel.len().min(self.window)];

        let mut gravity = Vec3::zeros();
        for axis in 0..AXIS_COUNT {
            let values: Vec<f64> = head.iter().map(|s| s.axis(axis)).collect();
            let fit = self.smoother.fit(&values, cancel)?;
            log::debug!(
                "gravity axis {}: alpha={:.4} level={:.4} ({} samples)",
                axis,
                fit.alpha,
                fit.forecast(),
                values.len()
            );
            gravity[axis] = fit.forecast();
        }

        let deviation = (gravity.norm() - GRAVITY_OF_EARTH).abs();
        if deviation > 1.0 {
            log::warn!(
                "gravity magnitude {:.3} m/s² is {:.2} away from {}; trip may not start at rest",
                gravity.norm(),
                deviation,
                GRAVITY_OF_EARTH
            );
        }
        Ok(gravity)
    }
}

impl Default for GravityEstimator {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}
