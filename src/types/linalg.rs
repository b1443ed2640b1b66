//! Linear algebra type system for the calibration engine
//!
//! Thin aliases over nalgebra so every stage speaks the same
//! fixed-size vector and matrix types.

use nalgebra::{Matrix3, Vector3};

// ===== Dimensions =====
pub const AXIS_COUNT: usize = 3;
pub const BASIS_LEN: usize = AXIS_COUNT * AXIS_COUNT; // 9 values, row-major

// ===== Tolerances =====
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;
pub const MIN_NORM: f64 = 1e-9;

// ===== Vector / Matrix Types =====
pub type Vec3 = Vector3<f64>;
pub type Basis3 = Matrix3<f64>; // rows: lateral, forward, vertical

/// Angle between two vectors in degrees, `None` if either is (near) zero.
pub fn angle_between_deg(a: &Vec3, b: &Vec3) -> Option<f64> {
    let denom = a.norm() * b.norm();
    if denom < MIN_NORM {
        return None;
    }
    let cos = (a.dot(b) / denom).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// Index of the component with the largest magnitude. First axis wins ties.
pub fn largest_axis(v: &Vec3) -> usize {
    let mut best = 0;
    for axis in 1..AXIS_COUNT {
        if v[axis].abs() > v[best].abs() {
            best = axis;
        }
    }
    best
}

/// Unit-length copy of `v`, `None` when the norm is too small to divide by.
pub fn normalized(v: &Vec3) -> Option<Vec3> {
    let norm = v.norm();
    if norm < MIN_NORM || !norm.is_finite() {
        None
    } else {
        Some(v / norm)
    }
}
