//! Fit driver: minimizer configuration, full fits, and profiled evaluation.

use std::collections::HashMap;

use jf_core::{Error, FitResult, Measurement, NuisanceView, ResidualPoint, Result, Variable};

use crate::loss::CombinedLoss;
use crate::minimizer::{MinimizerSession, VariableDef};
use crate::optimizer::{OptimizerConfig, Strategy};

/// Nuisance values accepted by residual computation: keyed by name or given
/// positionally in registry order.
#[derive(Debug, Clone)]
pub enum NuisanceValues {
    /// Name-keyed values; absent names default to 0.
    ByName(HashMap<String, f64>),
    /// Positional values, one per registered nuisance.
    Positional(Vec<f64>),
}

impl NuisanceValues {
    fn resolve(&self, loss: &CombinedLoss) -> Result<Vec<f64>> {
        let registry = loss.registry();
        match self {
            NuisanceValues::ByName(map) => {
                let mut values = vec![0.0; registry.len()];
                for (name, &value) in map {
                    values[registry.index_of(name)?] = value;
                }
                Ok(values)
            }
            NuisanceValues::Positional(values) => {
                if values.len() != registry.len() {
                    return Err(Error::Validation(format!(
                        "got {} nuisance values for {} registered nuisances",
                        values.len(),
                        registry.len()
                    )));
                }
                Ok(values.clone())
            }
        }
    }
}

/// Configures and drives a minimizer against a [`CombinedLoss`].
///
/// Supports full fits over all parameters and profiled evaluation where the
/// correction parameters are fixed and only nuisances are minimized. Each
/// call builds its own scoped minimizer session, so fits and evaluations may
/// be issued in any order.
pub struct FitEngine {
    loss: CombinedLoss,
    config: OptimizerConfig,
}

/// POI variables start at 0 with this step size, bounded to [-1, 1].
const POI_STEP: f64 = 1e-2;
const POI_BOUNDS: (f64, f64) = (-1.0, 1.0);

/// Nuisance variables start at 0 with unit step, bounded to [-5, 5].
const NUISANCE_STEP: f64 = 1.0;
const NUISANCE_BOUNDS: (f64, f64) = (-5.0, 5.0);

impl FitEngine {
    /// Create an engine with normal-accuracy minimizer settings and the
    /// chi-square error definition.
    pub fn new(loss: CombinedLoss) -> Self {
        Self { loss, config: OptimizerConfig::for_strategy(Strategy::Normal) }
    }

    /// Create an engine with a custom optimizer configuration.
    pub fn with_config(loss: CombinedLoss, config: OptimizerConfig) -> Self {
        Self { loss, config }
    }

    /// The combined loss driven by this engine.
    pub fn loss(&self) -> &CombinedLoss {
        &self.loss
    }

    /// Total degrees of freedom of the loss.
    pub fn ndf(&self) -> usize {
        self.loss.ndf()
    }

    fn session(&self, print_level: u8) -> MinimizerSession<'_> {
        let mut variables = Vec::with_capacity(self.loss.n_params());

        for i in 0..self.loss.n_poi() {
            variables.push(VariableDef::new(format!("p{i}"), 0.0, POI_STEP, POI_BOUNDS));
        }
        for i in 0..self.loss.n_nuisances() {
            let name = self.loss.registry().name_at(i).expect("registry index in range");
            variables.push(VariableDef::new(name, 0.0, NUISANCE_STEP, NUISANCE_BOUNDS));
        }

        MinimizerSession::new(&self.loss, variables, self.config.clone(), print_level)
    }

    /// Perform the fit with all parameters floating.
    pub fn fit(&self, print_level: u8) -> Result<FitResult> {
        let session = self.session(print_level);
        let outcome = session.minimize();

        let parameters = session
            .variables()
            .iter()
            .zip(outcome.values.iter().zip(outcome.errors.iter()))
            .map(|(var, (&value, &error))| Variable { name: var.name.clone(), value, error })
            .collect();

        FitResult::new(
            outcome.status,
            outcome.covariance_status,
            outcome.min_value,
            parameters,
            outcome.covariance,
        )
    }

    /// Profiled evaluation: chi-square minimized over nuisances at fixed
    /// correction parameters.
    ///
    /// With zero registered nuisances this degenerates to a direct objective
    /// evaluation with no minimizer run; the numeric result is identical to
    /// the degenerate profile.
    pub fn profile(&self, poi: &[f64]) -> Result<f64> {
        if poi.len() != self.loss.n_poi() {
            return Err(Error::Validation(format!(
                "got {} correction parameters, expected {}",
                poi.len(),
                self.loss.n_poi()
            )));
        }

        if self.loss.n_nuisances() == 0 {
            return self.evaluate(poi, &[]);
        }

        let mut session = self.session(0);
        for (i, &value) in poi.iter().enumerate() {
            session.set_value(i, value);
            session.fix(i);
        }

        Ok(session.minimize().min_value)
    }

    /// Direct evaluation of the combined loss, no minimization.
    pub fn evaluate(&self, poi: &[f64], nuisances: &[f64]) -> Result<f64> {
        let mut params = Vec::with_capacity(poi.len() + nuisances.len());
        params.extend_from_slice(poi);
        params.extend_from_slice(nuisances);
        self.loss.evaluate(&params)
    }

    /// Compute data-to-simulation residuals for a measurement.
    ///
    /// The engine only marshals parameters: it configures a correction clone
    /// from `poi`, resolves `nuisances` to a positional vector, and delegates
    /// to the measurement.
    pub fn compute_residuals(
        &self,
        measurement: &dyn Measurement,
        poi: &[f64],
        nuisances: &NuisanceValues,
    ) -> Result<Vec<ResidualPoint>> {
        let mut correction = self.loss.correction().clone_box();
        correction.set_params(poi)?;

        let values = nuisances.resolve(&self.loss)?;
        let view = NuisanceView::new(self.loss.registry(), &values)?;

        Ok(measurement.residuals(correction.as_ref(), &view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::CorrectionConstraint;
    use crate::correction::Std2P;
    use approx::assert_relative_eq;
    use jf_core::NuisanceRegistry;
    use std::sync::Arc;

    fn constraint_only_engine() -> FitEngine {
        let mut loss = CombinedLoss::new(Box::new(Std2P::new()), NuisanceRegistry::new());
        loss.add_term(Arc::new(CorrectionConstraint::new(208.0, 1.02, 0.01).unwrap()));
        FitEngine::new(loss)
    }

    #[test]
    fn test_degenerate_profile_equals_direct_evaluation() {
        let engine = constraint_only_engine();
        let poi = [0.005, -0.002];

        let profiled = engine.profile(&poi).unwrap();
        let direct = engine.evaluate(&poi, &[]).unwrap();
        assert_eq!(profiled, direct);
    }

    #[test]
    fn test_profile_rejects_wrong_poi_count() {
        let engine = constraint_only_engine();
        assert!(engine.profile(&[0.0]).is_err());
    }

    #[test]
    fn test_full_fit_satisfies_constraint() {
        let engine = constraint_only_engine();
        let result = engine.fit(0).unwrap();

        // The constraint pins corr(208) = 1 + p0 to 1.02; the slope is
        // unconstrained, so the minimum is flat in p1 and chi2 is 0.
        assert!(result.min_value() < 1e-5);
        assert_eq!(result.parameters().len(), 2);
        assert_eq!(result.parameters()[0].name, "p0");
        assert_relative_eq!(result.parameters()[0].value, 0.02, epsilon = 1e-4);
    }

    #[test]
    fn test_variable_naming_includes_nuisances() {
        let mut registry = NuisanceRegistry::new();
        registry.register("photon_scale");
        let mut loss = CombinedLoss::new(Box::new(Std2P::new()), registry);
        loss.add_term(Arc::new(CorrectionConstraint::new(208.0, 1.0, 0.05).unwrap()));
        let engine = FitEngine::new(loss);

        let result = engine.fit(0).unwrap();
        let names: Vec<&str> =
            result.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p0", "p1", "photon_scale"]);
    }
}
