//! Piecewise-linear lookup curves.
//!
//! Converters and generators carry efficiency curves (input power on X,
//! efficiency on Y), and the battery model uses built-in state-of-charge and
//! temperature curves. All of them share this representation: an ordered
//! list of breakpoints with linear interpolation between them and clamping
//! beyond the ends.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{ElecError, ElecResult};

/// An ordered piecewise-linear curve.
///
/// Breakpoints must be strictly increasing in X. Evaluation clamps to the
/// first/last Y outside the covered range, so a curve never extrapolates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    points: Vec<(f64, f64)>,
}

impl Curve {
    /// Build a curve from breakpoints.
    ///
    /// Fails unless at least two points are given and X values are strictly
    /// increasing.
    pub fn new(points: Vec<(f64, f64)>) -> ElecResult<Self> {
        if points.len() < 2 {
            return Err(ElecError::Spec(format!(
                "curve needs at least 2 points, got {}",
                points.len()
            )));
        }
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(ElecError::Spec(format!(
                    "curve X values must be strictly increasing ({} then {})",
                    pair[0].0, pair[1].0
                )));
            }
        }
        Ok(Self { points })
    }

    /// Build an efficiency curve: same as [`Curve::new`] plus the constraint
    /// that every Y lies in the open interval (0, 1).
    pub fn efficiency(points: Vec<(f64, f64)>) -> ElecResult<Self> {
        for &(x, y) in &points {
            if y <= 0.0 || y >= 1.0 {
                return Err(ElecError::Spec(format!(
                    "efficiency at {} W is {}, must be in (0, 1)",
                    x, y
                )));
            }
        }
        Self::new(points)
    }

    /// Evaluate the curve at `x`, clamping outside the breakpoint range.
    pub fn eval(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if x >= x0 && x <= x1 {
                let t = (x - x0) / (x1 - x0);
                return y0 + t * (y1 - y0);
            }
        }
        // Unreachable: x is inside [first.0, last.0] and the windows cover it
        last.1
    }

    /// The breakpoints of this curve.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

// =============================================================================
// Built-in battery tables
// =============================================================================

/// Terminal-voltage factor over state of charge (lead-acid style knee).
///
/// Multiplies the nominal voltage; 1.0 at full charge, collapsing sharply
/// below ~5% charge.
pub static BATT_SOC_VOLTS: Lazy<Curve> = Lazy::new(|| {
    Curve::new(vec![
        (0.00, 0.00),
        (0.025, 0.83),
        (0.05, 0.905),
        (0.10, 0.935),
        (0.20, 0.955),
        (0.40, 0.975),
        (0.70, 0.99),
        (1.00, 1.00),
    ])
    .expect("static battery SOC table")
});

/// Terminal-voltage factor over cell temperature (°C).
///
/// Cold cells sag; 1.0 at the 15 °C reference.
pub static BATT_TEMP_VOLTS: Lazy<Curve> = Lazy::new(|| {
    Curve::new(vec![
        (-90.0, 0.00),
        (-40.0, 0.50),
        (-20.0, 0.70),
        (0.0, 0.88),
        (15.0, 1.00),
        (50.0, 1.02),
        (90.0, 1.02),
    ])
    .expect("static battery temperature/voltage table")
});

/// Usable-capacity factor over cell temperature (°C).
///
/// Scales the rated capacity (specified at 15 °C).
pub static BATT_TEMP_CAPACITY: Lazy<Curve> = Lazy::new(|| {
    Curve::new(vec![
        (-90.0, 0.01),
        (-40.0, 0.30),
        (-20.0, 0.55),
        (0.0, 0.80),
        (15.0, 1.00),
        (50.0, 1.05),
        (90.0, 1.05),
    ])
    .expect("static battery temperature/capacity table")
});
