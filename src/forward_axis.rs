//! Longitudinal axis estimation.
//!
//! While the car speeds up or slows down in a straight line, the transient
//! acceleration lies along the vehicle's forward axis, which on a level road
//! is perpendicular to gravity. Samples inside accelerating periods whose
//! direction sits within a small tolerance of 90° from gravity are gated in,
//! then three votes pick the forward direction:
//!
//! 1. dominant device axis (largest summed |component|)
//! 2. majority sign on that axis
//! 3. the agreeing sample closest to exactly 90° from gravity

use crate::cancel::CancelToken;
use crate::config::{CalibrationConfig, FallbackPolicy};
use crate::error::{CalResult, CalibrationError};
use crate::segments::AcceleratingPeriod;
use crate::types::{
    angle_between_deg, largest_axis, normalized, AccelData, SpeedSample, TimeSeries, Vec3,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Placeholder forward vector used when no sample survives the gate.
/// Not unit length.
pub const FALLBACK_FORWARD: [f64; 3] = [1.0, 1.0, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisSign {
    Positive,
    Negative,
}

impl AxisSign {
    pub fn matches(&self, value: f64) -> bool {
        match self {
            AxisSign::Positive => value > 0.0,
            AxisSign::Negative => value < 0.0,
        }
    }
}

/// Gravity-compensated sample that passed the angle gate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GatedSample {
    /// Unit direction of the compensated sample
    pub direction: Vec3,
    /// Angle to gravity in degrees
    pub angle_deg: f64,
}

impl GatedSample {
    pub fn own_axis(&self) -> usize {
        largest_axis(&self.direction)
    }
}

/// Forward vector plus how it was decided
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardEstimate {
    pub vector: Vec3,
    pub dominant_axis: Option<usize>,
    pub dominant_sign: Option<AxisSign>,
    pub gated_samples: usize,
    pub angle_deg: Option<f64>,
    /// True when `vector` is the `(1, 1, 1)` placeholder
    pub fallback: bool,
}

#[derive(Clone, Debug)]
pub struct ForwardAxisEstimator {
    angle_tolerance_deg: f64,
    fallback: FallbackPolicy,
}

impl ForwardAxisEstimator {
    pub fn new(angle_tolerance_deg: f64, fallback: FallbackPolicy) -> Self {
        Self {
            angle_tolerance_deg,
            fallback,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.angle_tolerance_deg, config.fallback)
    }

    pub fn estimate(
        &self,
        accel: &TimeSeries<AccelData>,
        speed: &TimeSeries<SpeedSample>,
        periods: &[AcceleratingPeriod],
        gravity: &Vec3,
        cancel: &CancelToken,
    ) -> CalResult<ForwardEstimate> {
        if periods.is_empty() {
            return Err(CalibrationError::NoAccelerationSegment);
        }

        let mut gated = Vec::new();
        for period in periods {
            cancel.check()?;
            for sample in &accel.samples()[Self::accel_range(accel, speed, period)] {
                let compensated = sample.vector() - gravity;
                if let Some(g) = self.gate(&compensated, gravity) {
                    gated.push(g);
                }
            }
        }

        let dominant_axis = match Self::vote_dominant_axis(&gated) {
            Some(axis) => axis,
            None => return self.fall_back(gated.len(), None, None),
        };
        let dominant_sign = Self::vote_sign(&gated, dominant_axis);
        log::debug!(
            "{} gated samples, dominant axis {} ({:?})",
            gated.len(),
            dominant_axis,
            dominant_sign
        );

        match Self::select_best(&gated, dominant_axis, dominant_sign) {
            Some(best) => Ok(ForwardEstimate {
                vector: best.direction,
                dominant_axis: Some(dominant_axis),
                dominant_sign: Some(dominant_sign),
                gated_samples: gated.len(),
                angle_deg: Some(best.angle_deg),
                fallback: false,
            }),
            None => self.fall_back(gated.len(), Some(dominant_axis), Some(dominant_sign)),
        }
    }

    /// Accelerometer index range covered by a speed-series period.
    /// Half-open: from the first sample at or after the run's first speed
    /// timestamp up to (excluding) the first sample at or after its last.
    pub fn accel_range(
        accel: &TimeSeries<AccelData>,
        speed: &TimeSeries<SpeedSample>,
        period: &AcceleratingPeriod,
    ) -> Range<usize> {
        let (from, to) = match (speed.get(period.peak_index), speed.get(period.start_index)) {
            (Some(from), Some(to)) => (from.timestamp, to.timestamp),
            _ => return 0..0,
        };
        let begin = accel.lower_bound(from);
        let end = accel.lower_bound(to).max(begin);
        begin..end
    }

    /// Accept a compensated sample when its angle to gravity is within tolerance of 90°
    pub fn gate(&self, compensated: &Vec3, gravity: &Vec3) -> Option<GatedSample> {
        let angle_deg = angle_between_deg(compensated, gravity)?;
        if (angle_deg - 90.0).abs() > self.angle_tolerance_deg {
            return None;
        }
        Some(GatedSample {
            direction: normalized(compensated)?,
            angle_deg,
        })
    }

    pub fn vote_dominant_axis(samples: &[GatedSample]) -> Option<usize> {
        if samples.is_empty() {
            return None;
        }
        let totals = samples
            .iter()
            .fold(Vec3::zeros(), |acc, s| acc + s.direction.abs());
        Some(largest_axis(&totals))
    }

    /// Majority sign among samples whose own largest axis is `axis`. Ties go positive.
    pub fn vote_sign(samples: &[GatedSample], axis: usize) -> AxisSign {
        let (positive, negative) = samples
            .iter()
            .filter(|s| s.own_axis() == axis)
            .fold((0usize, 0usize), |(p, n), s| {
                if s.direction[axis] > 0.0 {
                    (p + 1, n)
                } else if s.direction[axis] < 0.0 {
                    (p, n + 1)
                } else {
                    (p, n)
                }
            });
        if negative > positive {
            AxisSign::Negative
        } else {
            AxisSign::Positive
        }
    }

    /// Agreeing sample closest to 90° from gravity; the first one wins ties.
    pub fn select_best(samples: &[GatedSample], axis: usize, sign: AxisSign) -> Option<&GatedSample> {
        let mut best: Option<&GatedSample> = None;
        for sample in samples
            .iter()
            .filter(|s| s.own_axis() == axis && sign.matches(s.direction[axis]))
        {
            let off = (sample.angle_deg - 90.0).abs();
            if best.map_or(true, |b| off < (b.angle_deg - 90.0).abs()) {
                best = Some(sample);
            }
        }
        best
    }

    fn fall_back(
        &self,
        gated_samples: usize,
        dominant_axis: Option<usize>,
        dominant_sign: Option<AxisSign>,
    ) -> CalResult<ForwardEstimate> {
        match self.fallback {
            FallbackPolicy::Fail => Err(CalibrationError::NoGatedSamples),
            FallbackPolicy::Placeholder => {
                log::warn!(
                    "no usable forward sample ({} gated); using placeholder forward vector",
                    gated_samples
                );
                Ok(ForwardEstimate {
                    vector: Vec3::from(FALLBACK_FORWARD),
                    dominant_axis,
                    dominant_sign,
                    gated_samples,
                    angle_deg: None,
                    fallback: true,
                })
            }
        }
    }
}

impl Default for ForwardAxisEstimator {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gated(x: f64, y: f64, z: f64, angle_deg: f64) -> GatedSample {
        GatedSample {
            direction: Vec3::new(x, y, z).normalize(),
            angle_deg,
        }
    }

    fn speed_ramp(values: &[f64], start_ms: i64, step_ms: i64) -> TimeSeries<SpeedSample> {
        TimeSeries::new(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| SpeedSample::new(start_ms + i as i64 * step_ms, v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_dominant_axis_vote() {
        let samples = vec![
            gated(0.1, 0.9, 0.0, 90.0),
            gated(0.2, -0.8, 0.1, 90.0),
            gated(0.9, 0.1, 0.0, 90.0),
            gated(0.0, 0.7, 0.3, 90.0),
            gated(0.1, 0.95, 0.0, 90.0),
        ];
        assert_eq!(ForwardAxisEstimator::vote_dominant_axis(&samples), Some(1));
        assert_eq!(ForwardAxisEstimator::vote_dominant_axis(&[]), None);
    }

    #[test]
    fn test_sign_vote_majority_and_tie() {
        let samples = vec![
            gated(0.0, -1.0, 0.0, 90.0),
            gated(0.0, -0.9, 0.1, 90.0),
            gated(0.0, 1.0, 0.0, 90.0),
            // largest on x, ignored by the y vote
            gated(1.0, 0.2, 0.0, 90.0),
        ];
        assert_eq!(ForwardAxisEstimator::vote_sign(&samples, 1), AxisSign::Negative);
        assert_eq!(
            ForwardAxisEstimator::vote_sign(&samples[1..], 1),
            AxisSign::Positive
        );
    }

    #[test]
    fn test_best_sample_first_wins_ties() {
        let samples = vec![
            gated(0.0, 1.0, 0.1, 90.5),
            gated(0.1, 1.0, 0.0, 89.8),
            gated(0.0, 1.0, -0.1, 90.2),
            gated(0.0, -1.0, 0.0, 90.0),
        ];
        let best = ForwardAxisEstimator::select_best(&samples, 1, AxisSign::Positive).unwrap();
        // 89.8 and 90.2 are equally close; the earlier one is kept
        assert_eq!(*best, samples[1]);
    }

    #[test]
    fn test_gate_window() {
        let estimator = ForwardAxisEstimator::default();
        let gravity = Vec3::new(0.0, 0.0, 9.81);
        assert!(estimator.gate(&Vec3::new(0.0, 3.0, 0.0), &gravity).is_some());
        // tilted 5° out of the horizontal plane
        let tilted = Vec3::new(0.0, 5f64.to_radians().cos(), 5f64.to_radians().sin());
        assert!(estimator.gate(&tilted, &gravity).is_none());
        assert!(estimator.gate(&Vec3::zeros(), &gravity).is_none());
    }

    #[test]
    fn test_period_maps_to_accel_range() {
        let accel = TimeSeries::new(
            (0..100)
                .map(|i| AccelData::new(i * 100, 0.0, 0.0, 9.81))
                .collect(),
        )
        .unwrap();
        let speed = speed_ramp(&[0.0, 1.0, 2.0, 1.0], 2_000, 1_000);
        let period = AcceleratingPeriod {
            peak_index: 0,
            start_index: 2,
        };
        assert_eq!(ForwardAxisEstimator::accel_range(&accel, &speed, &period), 20..40);
    }

    #[test]
    fn test_estimate_forward_along_y() {
        let mut samples: Vec<AccelData> = (0..50)
            .map(|i| AccelData::new(i * 100, 0.0, 0.0, 9.81))
            .collect();
        samples.extend((50..100).map(|i| AccelData::new(i * 100, 0.0, 3.0, 9.81)));
        let accel = TimeSeries::new(samples).unwrap();
        let speed = speed_ramp(&[0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0], 5_000, 1_000);
        let periods = [AcceleratingPeriod {
            peak_index: 0,
            start_index: 4,
        }];

        let estimate = ForwardAxisEstimator::default()
            .estimate(
                &accel,
                &speed,
                &periods,
                &Vec3::new(0.0, 0.0, 9.81),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(!estimate.fallback);
        assert_eq!(estimate.dominant_axis, Some(1));
        assert_eq!(estimate.dominant_sign, Some(AxisSign::Positive));
        assert_abs_diff_eq!(estimate.vector, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_no_periods_is_an_error() {
        let accel = TimeSeries::new(vec![AccelData::new(0, 0.0, 0.0, 9.81)]).unwrap();
        let speed = speed_ramp(&[0.0, 0.0], 0, 1_000);
        let err = ForwardAxisEstimator::default()
            .estimate(&accel, &speed, &[], &Vec3::z(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CalibrationError::NoAccelerationSegment));
    }

    #[test]
    fn test_fallback_policies() {
        // Everything lines up with gravity: nothing passes the gate
        let accel = TimeSeries::new(
            (0..50)
                .map(|i| AccelData::new(i * 100, 0.0, 0.0, 12.0))
                .collect(),
        )
        .unwrap();
        let speed = speed_ramp(&[0.0, 1.0, 2.0, 3.0], 0, 1_000);
        let periods = [AcceleratingPeriod {
            peak_index: 0,
            start_index: 3,
        }];
        let gravity = Vec3::new(0.0, 0.0, 9.81);

        let estimate = ForwardAxisEstimator::default()
            .estimate(&accel, &speed, &periods, &gravity, &CancelToken::new())
            .unwrap();
        assert!(estimate.fallback);
        assert_eq!(estimate.vector, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(estimate.gated_samples, 0);

        let strict = ForwardAxisEstimator::new(1.0, FallbackPolicy::Fail);
        let err = strict
            .estimate(&accel, &speed, &periods, &gravity, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CalibrationError::NoGatedSamples));
    }
}
