//! Capability traits for jetfit.
//!
//! These traits define the seams between the fit engine and its
//! collaborators: the functional form of the jet correction and the loss
//! contributors (analysis measurements and external constraints). The engine
//! only ever talks to these contracts, never to concrete analysis code.

use crate::error::Result;
use crate::nuisance::NuisanceView;
use crate::types::ResidualPoint;

/// Parametric functional form of the residual jet correction.
///
/// Implementations are cheap value types; the combined loss clones its
/// template once per evaluation and configures the clone from the POI block,
/// so contributors always see an immutable, fully configured correction.
pub trait Correction: Send + Sync {
    /// Evaluate the correction factor at the given jet pt.
    fn eval(&self, pt: f64) -> f64;

    /// Set the correction parameters. The slice length must equal
    /// [`n_params`](Self::n_params).
    fn set_params(&mut self, params: &[f64]) -> Result<()>;

    /// Number of free parameters of this form.
    fn n_params(&self) -> usize;

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Correction>;
}

impl Clone for Box<dyn Correction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A chi-square loss contributor sharing the engine's nuisance registry.
pub trait LossTerm: Send + Sync {
    /// Chi-square contribution for the given correction and nuisance values.
    fn chi2(&self, correction: &dyn Correction, nuisances: &NuisanceView<'_>) -> f64;

    /// Degrees of freedom contributed by this term.
    ///
    /// This is the term's own data-point count; the number of free fit
    /// parameters is never subtracted here.
    fn ndf(&self) -> usize;
}

/// A loss contributor wrapping analysis data.
pub trait Measurement: LossTerm {
    /// Restrict the leading-jet pt range used by the measurement.
    fn set_pt_range(&mut self, min_pt: f64, max_pt: f64);

    /// Data-to-simulation residuals for the given correction and nuisances.
    fn residuals(
        &self,
        correction: &dyn Correction,
        nuisances: &NuisanceView<'_>,
    ) -> Vec<ResidualPoint>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuisance::NuisanceRegistry;

    #[derive(Clone)]
    struct UnitCorrection;

    impl Correction for UnitCorrection {
        fn eval(&self, _pt: f64) -> f64 {
            1.0
        }

        fn set_params(&mut self, _params: &[f64]) -> Result<()> {
            Ok(())
        }

        fn n_params(&self) -> usize {
            0
        }

        fn clone_box(&self) -> Box<dyn Correction> {
            Box::new(self.clone())
        }
    }

    struct ConstTerm;

    impl LossTerm for ConstTerm {
        fn chi2(&self, correction: &dyn Correction, _nuisances: &NuisanceView<'_>) -> f64 {
            correction.eval(100.0)
        }

        fn ndf(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_trait_objects() {
        let reg = NuisanceRegistry::new();
        let view = NuisanceView::new(&reg, &[]).unwrap();
        let corr: Box<dyn Correction> = Box::new(UnitCorrection);
        let term = ConstTerm;
        assert_eq!(term.chi2(corr.as_ref(), &view), 1.0);
        assert_eq!(term.ndf(), 1);
    }
}
