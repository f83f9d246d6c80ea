//! Combined chi-square loss over measurements and constraints.

use std::sync::Arc;

use jf_core::{Correction, Error, LossTerm, NuisanceRegistry, NuisanceView, Result};

/// Aggregate chi-square objective over one or more loss contributors sharing
/// a parameter-of-interest block and a nuisance registry.
///
/// The parameter vector is the POI block (correction parameters) followed by
/// the nuisance block in registry order. Contributors never see the raw
/// vector: each evaluation configures a clone of the correction template from
/// the POI slice and hands every contributor that clone plus a
/// [`NuisanceView`], so evaluation is `&self` and safely reentrant.
pub struct CombinedLoss {
    correction: Box<dyn Correction>,
    registry: NuisanceRegistry,
    terms: Vec<Arc<dyn LossTerm>>,
}

impl CombinedLoss {
    /// Create an empty loss for the given correction form and registry.
    ///
    /// The registry must already hold every nuisance the contributors will
    /// look up; contributors register their nuisances against it during their
    /// own construction, before it is moved here.
    pub fn new(correction: Box<dyn Correction>, registry: NuisanceRegistry) -> Self {
        Self { correction, registry, terms: Vec::new() }
    }

    /// Append a loss contributor.
    pub fn add_term(&mut self, term: Arc<dyn LossTerm>) {
        self.terms.push(term);
    }

    /// Number of correction (POI) parameters.
    pub fn n_poi(&self) -> usize {
        self.correction.n_params()
    }

    /// Number of registered nuisance parameters.
    pub fn n_nuisances(&self) -> usize {
        self.registry.len()
    }

    /// Total parameter count: POI block plus nuisance block.
    pub fn n_params(&self) -> usize {
        self.n_poi() + self.n_nuisances()
    }

    /// The shared nuisance registry.
    pub fn registry(&self) -> &NuisanceRegistry {
        &self.registry
    }

    /// The correction template (unconfigured).
    pub fn correction(&self) -> &dyn Correction {
        self.correction.as_ref()
    }

    /// Total degrees of freedom: the sum of each contributor's own count.
    ///
    /// Not reduced by the number of free fit parameters; that reduction, if
    /// desired, is the caller's business when computing a p-value.
    pub fn ndf(&self) -> usize {
        self.terms.iter().map(|t| t.ndf()).sum()
    }

    /// Evaluate the total chi-square at the given parameter vector.
    pub fn evaluate(&self, params: &[f64]) -> Result<f64> {
        if params.len() != self.n_params() {
            return Err(Error::Validation(format!(
                "parameter vector length {} != {} (poi) + {} (nuisances)",
                params.len(),
                self.n_poi(),
                self.n_nuisances()
            )));
        }

        let n_poi = self.n_poi();
        let mut correction = self.correction.clone_box();
        correction.set_params(&params[..n_poi])?;
        let nuisances = NuisanceView::new(&self.registry, &params[n_poi..])?;

        Ok(self.terms.iter().map(|t| t.chi2(correction.as_ref(), &nuisances)).sum())
    }
}
