//! Capacity estimation for finished half-cycles.
//!
//! The current is integrated over time with the trapezoid rule and the
//! result is scaled by the half-cycle duration.

use serde::Serialize;

/// Trapezoid integral of `y` over `x`; fewer than two points integrate to zero
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * 0.5 * (ys[0] + ys[1]))
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacityEstimate {
    /// Trapezoid integral of current over time (A·s)
    pub integrated_current: f64,
    /// Last minus first sample time (s)
    pub duration: f64,
    /// `integrated_current * duration`
    pub capacity: f64,
}

impl CapacityEstimate {
    pub fn from_series(time: &[f64], current: &[f64]) -> Self {
        let integrated_current = trapezoid(time, current);
        let duration = match (time.first(), time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };

        Self {
            integrated_current,
            duration,
            capacity: integrated_current * duration,
        }
    }
}
