//! Chi-square goodness-of-fit probability.

use statrs::function::gamma::gamma_ur;

/// Upper-tail probability of a chi-square distribution with `ndf` degrees of
/// freedom exceeding `chi2`.
///
/// `p = Q(ndf/2, chi2/2)`, the regularized upper incomplete gamma function.
/// Returns `NaN` for `ndf <= 0` or a negative/NaN `chi2` instead of failing.
pub fn chi2_pvalue(chi2: f64, ndf: usize) -> f64 {
    if ndf == 0 || chi2.is_nan() || chi2 < 0.0 {
        return f64::NAN;
    }
    if chi2 == 0.0 {
        return 1.0;
    }
    if chi2.is_infinite() {
        return 0.0;
    }
    gamma_ur(ndf as f64 / 2.0, chi2 / 2.0)
}
