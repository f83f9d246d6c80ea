//! External constraint on the jet correction at a reference scale.

use jf_core::{Correction, Error, LossTerm, NuisanceView, Result};

use crate::correction::DEFAULT_REF_PT;

/// Prior on the correction value at a reference pt, acting as an artificial
/// one-point measurement.
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionConstraint {
    ref_pt: f64,
    target: f64,
    rel_unc: f64,
}

impl CorrectionConstraint {
    /// Create a constraint pinning `corr(ref_pt)` to `target` with relative
    /// uncertainty `rel_unc`.
    pub fn new(ref_pt: f64, target: f64, rel_unc: f64) -> Result<Self> {
        if !(rel_unc > 0.0) {
            return Err(Error::MalformedConstraint(format!(
                "relative uncertainty must be > 0, got {rel_unc}"
            )));
        }
        Ok(Self { ref_pt, target, rel_unc })
    }

    /// Parse a constraint from its text description.
    ///
    /// The description must be of the form
    /// `[<reference pt>,]<correction value>,<rel. uncertainty>`; with two
    /// tokens the reference pt defaults to 208 GeV. Any other token count or
    /// a non-numeric token fails with [`Error::MalformedConstraint`].
    pub fn parse(option_text: &str) -> Result<Self> {
        let malformed = || Error::MalformedConstraint(option_text.to_owned());

        let tokens: Vec<f64> = option_text
            .split(',')
            .map(|tok| tok.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| malformed())?;

        match tokens[..] {
            [value, rel_unc] => {
                Self::new(DEFAULT_REF_PT, value, rel_unc).map_err(|_| malformed())
            }
            [ref_pt, value, rel_unc] => Self::new(ref_pt, value, rel_unc).map_err(|_| malformed()),
            _ => Err(malformed()),
        }
    }

    /// Reference pt scale of the constraint.
    pub fn ref_pt(&self) -> f64 {
        self.ref_pt
    }

    /// Target correction value at the reference scale.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Relative uncertainty on the target value.
    pub fn rel_unc(&self) -> f64 {
        self.rel_unc
    }
}

impl LossTerm for CorrectionConstraint {
    fn chi2(&self, correction: &dyn Correction, _nuisances: &NuisanceView<'_>) -> f64 {
        let pull = (correction.eval(self.ref_pt) - self.target) / (self.target * self.rel_unc);
        pull * pull
    }

    fn ndf(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::Std2P;
    use approx::assert_relative_eq;
    use jf_core::NuisanceRegistry;

    #[test]
    fn test_parse_three_tokens() {
        let c = CorrectionConstraint::parse("208,1.02,0.01").unwrap();
        assert_eq!(c.ref_pt(), 208.0);
        assert_eq!(c.target(), 1.02);
        assert_eq!(c.rel_unc(), 0.01);
    }

    #[test]
    fn test_parse_two_tokens_uses_default_reference() {
        let c = CorrectionConstraint::parse("1.0,0.02").unwrap();
        assert_eq!(c.ref_pt(), DEFAULT_REF_PT);
        assert_eq!(c.target(), 1.0);
        assert_eq!(c.rel_unc(), 0.02);
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            CorrectionConstraint::parse("1.0"),
            Err(Error::MalformedConstraint(_))
        ));
        assert!(matches!(
            CorrectionConstraint::parse("a,b,c"),
            Err(Error::MalformedConstraint(_))
        ));
        assert!(matches!(
            CorrectionConstraint::parse("1.0,0.0"),
            Err(Error::MalformedConstraint(_))
        ));
        assert!(matches!(
            CorrectionConstraint::parse("1,2,3,4"),
            Err(Error::MalformedConstraint(_))
        ));
    }

    #[test]
    fn test_chi2_is_squared_relative_pull() {
        let c = CorrectionConstraint::new(208.0, 1.02, 0.01).unwrap();
        let mut corr = Std2P::new();
        corr.set_params(&[0.02, 0.0]).unwrap();

        let reg = NuisanceRegistry::new();
        let view = NuisanceView::new(&reg, &[]).unwrap();
        // corr(208) = 1.02 exactly: zero pull.
        assert_relative_eq!(c.chi2(&corr, &view), 0.0);

        corr.set_params(&[0.02 + 0.0102, 0.0]).unwrap();
        // One-sigma offset: unit chi2.
        assert_relative_eq!(c.chi2(&corr, &view), 1.0, epsilon = 1e-9);
        assert_eq!(c.ndf(), 1);
    }
}
