//! Cubic spline interpolation of tabulated yield functions.
//!
//! Yield functions are tabulated at a handful of rigidities per altitude.
//! The dose engine evaluates them on a much finer rigidity grid, so a
//! smooth interpolant with continuous curvature is used between knots.

use crate::error::DoseError;

/// A natural cubic spline interpolator for real-valued data.
///
/// Given $n$ data points $(x_i, y_i)$, constructs piecewise cubic polynomials
/// with continuous first and second derivatives and zero curvature at both
/// ends.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    /// Sorted x values (knots).
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot (computed during construction).
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Construct a natural cubic spline from data points.
    ///
    /// `xs` must be strictly increasing, `ys` must have the same length and
    /// at least two points are required.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, DoseError> {
        if xs.len() != ys.len() {
            return Err(DoseError::InvalidTable(format!(
                "spline needs equal numbers of x and y values, got {} and {}",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(DoseError::InvalidTable(
                "spline needs at least 2 data points".into(),
            ));
        }
        if let Some(i) = (1..xs.len()).find(|&i| !(xs[i] > xs[i - 1])) {
            return Err(DoseError::InvalidTable(format!(
                "spline knots must be strictly increasing at index {}",
                i
            )));
        }
        if xs.iter().chain(&ys).any(|v| !v.is_finite()) {
            return Err(DoseError::InvalidTable(
                "spline data must be finite".into(),
            ));
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Forward sweep (tridiagonal system for natural spline)
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            let slope_change = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * slope_change / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        // Back substitution
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(Self { xs, ys, y2s })
    }

    /// Knot range `(first, last)`.
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Evaluate the spline at `x`.
    ///
    /// Extrapolation beyond the data range uses the boundary polynomial.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();

        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] > x {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }

    /// Evaluate with `x` clamped to the knot range.
    pub fn evaluate_clamped(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        self.evaluate(x.clamp(lo, hi))
    }
}
