use crate::config::CalibrationConfig;
use crate::types::{SpeedSample, TimeSeries};
use serde::{Deserialize, Serialize};

/// Run of increasing speed, as indices into the speed series.
///
/// `peak_index` is where the run begins (the walk-back end point) and
/// `start_index` is the local maximum that ends the forward scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratingPeriod {
    pub peak_index: usize,
    pub start_index: usize,
}

impl AcceleratingPeriod {
    pub fn count(&self) -> usize {
        self.start_index - self.peak_index
    }
}

/// Output of one scan
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentScan {
    pub periods: Vec<AcceleratingPeriod>,
    /// Longest accepted period, kept for diagnostics
    pub longest: Option<AcceleratingPeriod>,
}

impl SegmentScan {
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Finds accelerating periods in a speed series with a single left-to-right pass
#[derive(Clone, Debug)]
pub struct SegmentDetector {
    min_count: usize,
}

impl SegmentDetector {
    pub fn new(min_count: usize) -> Self {
        Self { min_count }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.min_accelerate_count)
    }

    pub fn detect_series(&self, series: &TimeSeries<SpeedSample>) -> SegmentScan {
        self.detect(&series.speeds())
    }

    pub fn detect(&self, speeds: &[f64]) -> SegmentScan {
        let mut scan = SegmentScan::default();
        let n = speeds.len();
        if n < 2 {
            return scan;
        }

        let mut i = 0;
        while i + 1 < n {
            // skip flat / decreasing stretch
            while i + 1 < n && speeds[i + 1] <= speeds[i] {
                i += 1;
            }
            if i + 1 >= n {
                break;
            }
            // climb the increasing run
            while i + 1 < n && speeds[i + 1] > speeds[i] {
                i += 1;
            }
            let start_index = i;

            // Walk back over non-decreasing samples so short plateaus
            // inside a run do not split it.
            let mut peak_index = start_index;
            while peak_index > 0 && speeds[peak_index - 1] <= speeds[peak_index] {
                peak_index -= 1;
            }

            let period = AcceleratingPeriod {
                peak_index,
                start_index,
            };
            if period.count() >= self.min_count {
                if scan.longest.map_or(true, |l| period.count() > l.count()) {
                    scan.longest = Some(period);
                }
                scan.periods.push(period);
            }

            i += 1;
        }

        if let Some(longest) = scan.longest {
            log::debug!(
                "{} accelerating periods, longest {}..{} ({} samples)",
                scan.periods.len(),
                longest.peak_index,
                longest.start_index,
                longest.count()
            );
        }
        scan
    }
}

impl Default for SegmentDetector {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}
