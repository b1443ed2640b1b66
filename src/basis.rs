use crate::error::{CalResult, CalibrationError};
use crate::types::{normalized, Basis3, Vec3, AXIS_COUNT, BASIS_LEN};

/// Device-to-vehicle rotation, rows `[lateral, forward, vertical]`.
///
/// Multiplying a device-frame vector by this matrix yields its
/// (lateral, longitudinal, vertical) components in the vehicle frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationBasis {
    rows: Basis3,
}

impl CalibrationBasis {
    /// Normalize gravity and forward, then `lateral = forward × vertical`.
    /// Lateral is not renormalized; it is near unit when the inputs are
    /// near orthogonal.
    pub fn assemble(gravity: &Vec3, forward: &Vec3) -> CalResult<Self> {
        let vertical =
            normalized(gravity).ok_or(CalibrationError::DegenerateBasis("gravity vector has no length"))?;
        let forward =
            normalized(forward).ok_or(CalibrationError::DegenerateBasis("forward vector has no length"))?;
        let lateral = forward.cross(&vertical);
        Ok(Self::from_rows(&lateral, &forward, &vertical))
    }

    pub fn from_rows(lateral: &Vec3, forward: &Vec3, vertical: &Vec3) -> Self {
        Self {
            rows: Basis3::from_rows(&[lateral.transpose(), forward.transpose(), vertical.transpose()]),
        }
    }

    /// Rebuild from 9 row-major values
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.len() != BASIS_LEN {
            return None;
        }
        Some(Self {
            rows: Basis3::from_row_slice(values),
        })
    }

    pub fn matrix(&self) -> &Basis3 {
        &self.rows
    }

    pub fn lateral(&self) -> Vec3 {
        self.row(0)
    }

    pub fn forward(&self) -> Vec3 {
        self.row(1)
    }

    pub fn vertical(&self) -> Vec3 {
        self.row(2)
    }

    fn row(&self, index: usize) -> Vec3 {
        self.rows.row(index).transpose()
    }

    /// Row-major values, the on-disk order
    pub fn to_values(&self) -> [f64; BASIS_LEN] {
        let mut values = [0.0; BASIS_LEN];
        for r in 0..AXIS_COUNT {
            for c in 0..AXIS_COUNT {
                values[r * AXIS_COUNT + c] = self.rows[(r, c)];
            }
        }
        values
    }

    /// Re-express a device-frame vector in the vehicle frame
    pub fn apply(&self, device: &Vec3) -> Vec3 {
        self.rows * device
    }

    /// `lateral ≈ forward × vertical` within `tolerance`
    pub fn is_right_handed(&self, tolerance: f64) -> bool {
        (self.lateral() - self.forward().cross(&self.vertical())).norm() <= tolerance
    }

    /// Unit rows, pairwise orthogonal, within `tolerance`
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let rows = [self.lateral(), self.forward(), self.vertical()];
        let unit = rows.iter().all(|r| (r.norm() - 1.0).abs() <= tolerance);
        let orthogonal = (0..AXIS_COUNT).all(|a| {
            (a + 1..AXIS_COUNT).all(|b| rows[a].dot(&rows[b]).abs() <= tolerance)
        });
        unit && orthogonal
    }

    /// Single line, 9 comma-separated values, shortest round-trip formatting
    pub fn to_line(&self) -> String {
        self.to_values()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the flat calibration line. Anything but exactly 9 finite floats is rejected.
    pub fn parse_line(text: &str) -> Result<Self, String> {
        let values = text
            .trim()
            .split(',')
            .map(|cell| {
                let cell = cell.trim();
                cell.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| format!("'{}' is not a finite number", cell))
            })
            .collect::<Result<Vec<f64>, String>>()?;
        Self::from_values(&values)
            .ok_or_else(|| format!("expected {} values, found {}", BASIS_LEN, values.len()))
    }
}

impl AsRef<CalibrationBasis> for CalibrationBasis {
    fn as_ref(&self) -> &CalibrationBasis {
        self
    }
}

impl Default for CalibrationBasis {
    fn default() -> Self {
        Self {
            rows: Basis3::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ORTHONORMAL_TOLERANCE;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_flat_mount_basis() {
        let basis =
            CalibrationBasis::assemble(&Vec3::new(0.0, 0.0, 9.81), &Vec3::new(0.0, 1.0, 0.0))
                .unwrap();
        assert_abs_diff_eq!(basis.vertical(), Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_abs_diff_eq!(basis.forward(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(basis.lateral(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert!(basis.is_orthonormal(ORTHONORMAL_TOLERANCE));
        assert!(basis.is_right_handed(ORTHONORMAL_TOLERANCE));
    }

    #[test]
    fn test_tilted_mount_is_orthonormal() {
        // Phone pitched 30° about x: gravity spreads over y and z
        let angle = 30f64.to_radians();
        let gravity = Vec3::new(0.0, 9.81 * angle.sin(), 9.81 * angle.cos());
        let forward = Vec3::new(0.0, angle.cos(), -angle.sin());
        let basis = CalibrationBasis::assemble(&gravity, &forward).unwrap();

        assert!(basis.is_orthonormal(ORTHONORMAL_TOLERANCE));
        assert!(basis.is_right_handed(ORTHONORMAL_TOLERANCE));
        // Gravity lands purely on the vertical axis
        let v = basis.apply(&gravity);
        assert_abs_diff_eq!(v, Vec3::new(0.0, 0.0, 9.81), epsilon = 1e-9);
    }

    #[test]
    fn test_line_round_trip() {
        let angle = 0.3_f64;
        let basis = CalibrationBasis::assemble(
            &Vec3::new(0.1, 9.0 * angle.sin(), 9.0 * angle.cos()),
            &Vec3::new(0.0, angle.cos(), -angle.sin()),
        )
        .unwrap();
        let line = basis.to_line();
        assert_eq!(line.split(',').count(), 9);

        let parsed = CalibrationBasis::parse_line(&line).unwrap();
        for (a, b) in parsed.to_values().iter().zip(basis.to_values().iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(CalibrationBasis::parse_line("1,0,0,0,1,0,0,0").is_err());
        assert!(CalibrationBasis::parse_line("1,0,0,0,1,0,0,0,x").is_err());
        assert!(CalibrationBasis::parse_line("1,0,0,0,1,0,0,0,NaN").is_err());
        assert!(CalibrationBasis::parse_line("").is_err());
        let ok = CalibrationBasis::parse_line(" 1, 0, 0, 0, 1, 0, 0, 0, 1\n").unwrap();
        assert_eq!(ok, CalibrationBasis::default());
    }

    #[test]
    fn test_zero_gravity_rejected() {
        let err = CalibrationBasis::assemble(&Vec3::zeros(), &Vec3::y()).unwrap_err();
        assert!(matches!(err, CalibrationError::DegenerateBasis(_)));
        assert_eq!(err.kind(), "degenerate_basis");
        let err = CalibrationBasis::assemble(&Vec3::z(), &Vec3::zeros()).unwrap_err();
        assert!(matches!(err, CalibrationError::DegenerateBasis(_)));
    }
}
