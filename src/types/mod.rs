pub mod linalg;

pub use linalg::*;

use crate::error::{CalResult, CalibrationError};
use serde::{Deserialize, Serialize};

/// Phone system time in milliseconds.
pub type Millis = i64;

/// Anything carrying a recording timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> Millis;
}

/// Raw accelerometer reading in the device frame (m/s²).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelData {
    pub timestamp: Millis,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelData {
    pub fn new(timestamp: Millis, x: f64, y: f64, z: f64) -> Self {
        Self { timestamp, x, y, z }
    }

    pub fn vector(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl Timestamped for AccelData {
    fn timestamp(&self) -> Millis {
        self.timestamp
    }
}

/// Scalar speed reading. Unit depends on where it came from, see [`SpeedOrigin`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub timestamp: Millis,
    pub speed: f64,
}

impl SpeedSample {
    pub fn new(timestamp: Millis, speed: f64) -> Self {
        Self { timestamp, speed }
    }
}

impl Timestamped for SpeedSample {
    fn timestamp(&self) -> Millis {
        self.timestamp
    }
}

/// Which recorder produced a speed series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedOrigin {
    /// OBD-II dongle, km/h
    Obd,
    /// Phone location provider, m/s
    Gps,
}

impl SpeedOrigin {
    pub fn unit(&self) -> &'static str {
        match self {
            SpeedOrigin::Obd => "km/h",
            SpeedOrigin::Gps => "m/s",
        }
    }

    /// Factor converting this origin's unit into km/h.
    pub fn to_kmh_factor(&self) -> f64 {
        match self {
            SpeedOrigin::Obd => 1.0,
            SpeedOrigin::Gps => 3.6,
        }
    }
}

/// Samples ordered by non-decreasing timestamp. Read-only once built.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries<T> {
    samples: Vec<T>,
}

impl<T: Timestamped> TimeSeries<T> {
    /// Build a series, rejecting timestamps that go backwards.
    /// Repeated timestamps are allowed.
    pub fn new(samples: Vec<T>) -> CalResult<Self> {
        if let Some(index) = samples
            .windows(2)
            .position(|pair| pair[1].timestamp() < pair[0].timestamp())
        {
            return Err(CalibrationError::UnorderedTimestamps { index: index + 1 });
        }
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.samples.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.samples.get(index)
    }

    pub fn timestamps(&self) -> Vec<Millis> {
        self.samples.iter().map(Timestamped::timestamp).collect()
    }

    /// First index whose timestamp is `>= t` (binary search).
    pub fn lower_bound(&self, t: Millis) -> usize {
        self.samples.partition_point(|s| s.timestamp() < t)
    }

    /// Milliseconds between first and last sample.
    pub fn span_ms(&self) -> Option<Millis> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some(last.timestamp() - first.timestamp()),
            _ => None,
        }
    }

    /// Span divided by sample count. This is the density measure used to
    /// reject sparse GPS recordings.
    pub fn average_interval_ms(&self) -> Option<f64> {
        self.span_ms()
            .map(|span| span as f64 / self.samples.len() as f64)
    }
}

impl TimeSeries<SpeedSample> {
    pub fn speeds(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.speed).collect()
    }
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
        }
    }
}
