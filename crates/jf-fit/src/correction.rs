//! Functional forms of the residual jet correction.
//!
//! Two forms are provided: the standard two-parameter loglinear form and a
//! spline form with one parameter per knot. Both evaluate to a multiplicative
//! correction factor close to 1 over the fitted pt range.

use jf_core::{Correction, Error, Result};

/// Reference pt scale, in GeV, at which the loglinear form is anchored.
///
/// Shared with the default reference point of the external constraint.
pub const DEFAULT_REF_PT: f64 = 208.0;

/// Create a jet-correction object from a form label.
///
/// `"2p"` selects the standard two-parameter form; `"spline"` selects a
/// five-knot spline covering 30-1500 GeV. Any other label fails with
/// [`Error::UnknownCorrectionForm`].
pub fn create_correction(label: &str) -> Result<Box<dyn Correction>> {
    match label {
        "2p" => Ok(Box::new(Std2P::new())),
        "spline" => Ok(Box::new(SplineCorr::new(30.0, 1500.0, 5)?)),
        other => Err(Error::UnknownCorrectionForm(other.to_owned())),
    }
}

/// Standard L3Res correction with two parameters.
///
/// `corr(pt) = 1 + p0 + p1 * ln(pt / 208)`, so `p0` is the correction offset
/// at the reference scale and `p1` its logarithmic slope.
#[derive(Debug, Clone)]
pub struct Std2P {
    params: [f64; 2],
}

impl Std2P {
    /// Create with both parameters at zero (unit correction).
    pub fn new() -> Self {
        Self { params: [0.0; 2] }
    }
}

impl Default for Std2P {
    fn default() -> Self {
        Self::new()
    }
}

impl Correction for Std2P {
    fn eval(&self, pt: f64) -> f64 {
        1.0 + self.params[0] + self.params[1] * (pt / DEFAULT_REF_PT).ln()
    }

    fn set_params(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != 2 {
            return Err(Error::Validation(format!(
                "Std2P expects 2 parameters, got {}",
                params.len()
            )));
        }
        self.params.copy_from_slice(params);
        Ok(())
    }

    fn n_params(&self) -> usize {
        2
    }

    fn clone_box(&self) -> Box<dyn Correction> {
        Box::new(self.clone())
    }
}

/// L3Res correction based on a spline in `ln pt`.
///
/// Knots are placed uniformly in `ln pt` between `min_pt` and `max_pt`; each
/// parameter is the correction offset at its knot. Between knots the offset
/// is a cubic Hermite interpolant with central-difference slopes; outside the
/// knot range it is extrapolated linearly from the edge segment.
#[derive(Debug, Clone)]
pub struct SplineCorr {
    knots_x: Vec<f64>,
    values: Vec<f64>,
}

impl SplineCorr {
    /// Create a spline correction with `n_knots` knots covering
    /// `[min_pt, max_pt]`. All knot offsets start at zero.
    pub fn new(min_pt: f64, max_pt: f64, n_knots: usize) -> Result<Self> {
        if n_knots < 2 {
            return Err(Error::Validation(format!(
                "spline correction requires at least 2 knots, got {n_knots}"
            )));
        }
        if !(min_pt > 0.0 && max_pt > min_pt) {
            return Err(Error::Validation(format!(
                "invalid spline pt range [{min_pt}, {max_pt}]"
            )));
        }

        let (lo, hi) = (min_pt.ln(), max_pt.ln());
        let step = (hi - lo) / (n_knots - 1) as f64;
        let knots_x = (0..n_knots).map(|i| lo + step * i as f64).collect();

        Ok(Self { knots_x, values: vec![0.0; n_knots] })
    }

    /// Central-difference slope at knot `i` (one-sided at the edges).
    fn slope(&self, i: usize) -> f64 {
        let k = self.knots_x.len();
        let (a, b) = if i == 0 {
            (0, 1)
        } else if i == k - 1 {
            (k - 2, k - 1)
        } else {
            (i - 1, i + 1)
        };
        (self.values[b] - self.values[a]) / (self.knots_x[b] - self.knots_x[a])
    }

    /// Interpolated offset at `x = ln pt`.
    fn offset(&self, x: f64) -> f64 {
        let k = self.knots_x.len();

        // Linear extrapolation beyond the knot range, continuous in value
        // and slope at the edge knots.
        if x <= self.knots_x[0] {
            return self.values[0] + self.slope(0) * (x - self.knots_x[0]);
        }
        if x >= self.knots_x[k - 1] {
            return self.values[k - 1] + self.slope(k - 1) * (x - self.knots_x[k - 1]);
        }

        let i = match self.knots_x.binary_search_by(|v| v.partial_cmp(&x).unwrap()) {
            Ok(i) => return self.values[i],
            Err(i) => i - 1,
        };

        let h = self.knots_x[i + 1] - self.knots_x[i];
        let t = (x - self.knots_x[i]) / h;
        let (y0, y1) = (self.values[i], self.values[i + 1]);
        let (m0, m1) = (self.slope(i) * h, self.slope(i + 1) * h);

        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * y0 + h10 * m0 + h01 * y1 + h11 * m1
    }
}

impl Correction for SplineCorr {
    fn eval(&self, pt: f64) -> f64 {
        1.0 + self.offset(pt.ln())
    }

    fn set_params(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != self.values.len() {
            return Err(Error::Validation(format!(
                "spline correction expects {} parameters, got {}",
                self.values.len(),
                params.len()
            )));
        }
        self.values.copy_from_slice(params);
        Ok(())
    }

    fn n_params(&self) -> usize {
        self.values.len()
    }

    fn clone_box(&self) -> Box<dyn Correction> {
        Box::new(self.clone())
    }
}
