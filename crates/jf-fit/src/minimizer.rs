//! Scoped minimizer session with Minuit-style variable bookkeeping.
//!
//! A session owns a variable table (name, start value, step size, bounds,
//! fixed flag) and borrows the combined loss for exactly one minimization.
//! Construction and teardown are paired by scope, so the objective borrow can
//! never outlive the minimizer on any exit path.

use nalgebra::DMatrix;

use jf_core::{CovarianceStatus, FitStatus, Result};

use crate::loss::CombinedLoss;
use crate::optimizer::{LbfgsOptimizer, ObjectiveFunction, OptimizerConfig};

/// One minimizer variable.
#[derive(Debug, Clone)]
pub struct VariableDef {
    /// Variable name.
    pub name: String,
    /// Starting value.
    pub start: f64,
    /// Initial step size; also scales the finite-difference gradient.
    pub step: f64,
    /// Box constraint (lower, upper).
    pub bounds: (f64, f64),
    /// Whether the variable is excluded from the search.
    pub fixed: bool,
}

impl VariableDef {
    /// Create a free variable.
    pub fn new(name: impl Into<String>, start: f64, step: f64, bounds: (f64, f64)) -> Self {
        Self { name: name.into(), start, step, bounds, fixed: false }
    }
}

/// Outcome of one minimization, in variable-declaration order.
#[derive(Debug, Clone)]
pub struct MinimizerOutcome {
    /// Minimization status.
    pub status: FitStatus,
    /// Covariance reliability grade.
    pub covariance_status: CovarianceStatus,
    /// Objective value at the minimum.
    pub min_value: f64,
    /// Final variable values.
    pub values: Vec<f64>,
    /// Parabolic uncertainties; zero for fixed variables.
    pub errors: Vec<f64>,
    /// Full covariance matrix, row-major; zero rows/columns for fixed
    /// variables.
    pub covariance: Vec<f64>,
}

/// Ceiling substituted for a non-finite chi-square.
///
/// The box constraints admit unphysical corners (e.g. a photon-scale offset
/// below -1) where the loss is NaN or infinite; those values break the line
/// search, while a large finite value lets it back off and recover.
const CHI2_CEILING: f64 = 1e30;

/// Objective adapter: evaluates the combined loss over the full variable
/// vector with a step-size-aware numerical gradient.
struct LossObjective<'a> {
    loss: &'a CombinedLoss,
    steps: Vec<f64>,
}

impl LossObjective<'_> {
    fn grad_eps(&self, i: usize) -> f64 {
        (self.steps[i] * 1e-3).max(1e-10)
    }
}

impl ObjectiveFunction for LossObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        let chi2 = self.loss.evaluate(params)?;
        Ok(if chi2.is_finite() { chi2 } else { CHI2_CEILING })
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];
        for i in 0..n {
            let eps = self.grad_eps(i);

            let mut params_plus = params.to_vec();
            params_plus[i] += eps;
            let f_plus = self.eval(&params_plus)?;

            let mut params_minus = params.to_vec();
            params_minus[i] -= eps;
            let f_minus = self.eval(&params_minus)?;

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }
        Ok(grad)
    }
}

/// A configured minimizer bound to one [`CombinedLoss`].
pub struct MinimizerSession<'a> {
    loss: &'a CombinedLoss,
    variables: Vec<VariableDef>,
    config: OptimizerConfig,
    print_level: u8,
}

impl<'a> MinimizerSession<'a> {
    /// Create a session over `loss` with the given variable table.
    pub fn new(
        loss: &'a CombinedLoss,
        variables: Vec<VariableDef>,
        config: OptimizerConfig,
        print_level: u8,
    ) -> Self {
        Self { loss, variables, config, print_level }
    }

    /// The variable table in declaration order.
    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    /// Force a variable's value.
    pub fn set_value(&mut self, idx: usize, value: f64) {
        self.variables[idx].start = value;
    }

    /// Exclude a variable from the search at its current value.
    pub fn fix(&mut self, idx: usize) {
        self.variables[idx].fixed = true;
    }

    /// Run the minimization.
    ///
    /// Non-convergence and aborted runs are reported through
    /// [`MinimizerOutcome::status`], never as an `Err`.
    pub fn minimize(&self) -> MinimizerOutcome {
        let n = self.variables.len();
        let start: Vec<f64> = self.variables.iter().map(|v| v.start).collect();
        let bounds: Vec<(f64, f64)> = self
            .variables
            .iter()
            .map(|v| if v.fixed { (v.start, v.start) } else { v.bounds })
            .collect();
        let steps: Vec<f64> = self.variables.iter().map(|v| v.step).collect();

        let objective = LossObjective { loss: self.loss, steps };
        let optimizer = LbfgsOptimizer::new(self.config.clone());

        let result = match optimizer.minimize(&objective, &start, &bounds) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("minimization aborted: {e}");
                // The final objective of an aborted run is whatever the
                // start point evaluates to.
                let start_clamped: Vec<f64> = start
                    .iter()
                    .zip(bounds.iter())
                    .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
                    .collect();
                let min_value = objective.eval(&start_clamped).unwrap_or(f64::NAN);
                return MinimizerOutcome {
                    status: FitStatus::Aborted,
                    covariance_status: CovarianceStatus::NotComputed,
                    min_value,
                    values: start_clamped,
                    errors: vec![0.0; n],
                    covariance: vec![0.0; n * n],
                };
            }
        };

        let status = if !result.fval.is_finite() {
            FitStatus::Invalid
        } else if result.converged {
            FitStatus::Converged
        } else {
            FitStatus::DidNotConverge
        };

        if self.print_level > 0 {
            log::info!(
                "minimization finished: {} (status {:?})",
                result,
                status
            );
        }

        let free: Vec<usize> =
            (0..n).filter(|&i| !self.variables[i].fixed).collect();

        let (covariance, errors, covariance_status) = if status == FitStatus::Invalid
            || free.is_empty()
        {
            (vec![0.0; n * n], vec![0.0; n], CovarianceStatus::NotComputed)
        } else {
            self.covariance_from_hessian(&objective, &result.parameters, &free)
        };

        MinimizerOutcome {
            status,
            covariance_status,
            min_value: result.fval,
            values: result.parameters,
            errors,
            covariance,
        }
    }

    /// Hessian over the free variables by forward differences of the
    /// gradient, then covariance `2 * error_def * H^{-1}`.
    fn covariance_from_hessian(
        &self,
        objective: &LossObjective<'_>,
        best: &[f64],
        free: &[usize],
    ) -> (Vec<f64>, Vec<f64>, CovarianceStatus) {
        let n = self.variables.len();
        let k = free.len();

        let hessian = match self.free_hessian(objective, best, free) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("Hessian computation failed: {e}");
                return (vec![0.0; n * n], vec![0.0; n], CovarianceStatus::NotComputed);
            }
        };

        let scale = 2.0 * self.config.error_def;
        let (cov_free, covariance_status) = match invert_hessian(&hessian, k) {
            Some((inv, grade)) => (inv * scale, grade),
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                let mut diag = DMatrix::zeros(k, k);
                for i in 0..k {
                    diag[(i, i)] = scale / hessian[(i, i)].abs().max(1e-12);
                }
                (diag, CovarianceStatus::NotComputed)
            }
        };

        // Embed the free-block covariance into the full matrix; fixed
        // variables keep zero rows and columns.
        let mut covariance = vec![0.0; n * n];
        let mut errors = vec![0.0; n];
        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate() {
                covariance[i * n + j] = cov_free[(a, b)];
            }
            let var = cov_free[(a, a)];
            errors[i] = if var.is_finite() && var > 0.0 { var.sqrt() } else { 0.0 };
        }

        (covariance, errors, covariance_status)
    }

    fn free_hessian(
        &self,
        objective: &LossObjective<'_>,
        best: &[f64],
        free: &[usize],
    ) -> Result<DMatrix<f64>> {
        let k = free.len();
        let grad_center = objective.gradient(best)?;

        let mut hessian = DMatrix::zeros(k, k);
        for (b, &j) in free.iter().enumerate() {
            let eps = 1e-4 * best[j].abs().max(1.0);

            let mut params_plus = best.to_vec();
            params_plus[j] += eps;
            let grad_plus = objective.gradient(&params_plus)?;

            for (a, &i) in free.iter().enumerate() {
                hessian[(a, b)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        // Symmetrise: H = (H + H^T) / 2
        let ht = hessian.transpose();
        hessian = (&hessian + &ht) * 0.5;

        Ok(hessian)
    }
}

/// Invert the Hessian, grading the path taken.
///
/// An undamped Cholesky solve grades `Accurate`; a solve that needed diagonal
/// damping grades `ForcedPosDef`; an LU fallback grades `Approximated`.
/// Returns `None` if every path fails or yields non-positive variances.
fn invert_hessian(hessian: &DMatrix<f64>, k: usize) -> Option<(DMatrix<f64>, CovarianceStatus)> {
    let identity = DMatrix::identity(k, k);

    if let Some(chol) = nalgebra::linalg::Cholesky::new(hessian.clone()) {
        return Some((chol.solve(&identity), CovarianceStatus::Accurate));
    }

    // Geometric diagonal damping, scaled to the Hessian diagonal.
    let diag_scale = (0..k).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);
    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;

    for _ in 0..9 {
        let next_damping = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        let add = next_damping - damping;
        for i in 0..k {
            h_damped[(i, i)] += add;
        }
        damping = next_damping;

        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            return Some((chol.solve(&identity), CovarianceStatus::ForcedPosDef));
        }
    }

    let cov = hessian.clone().lu().try_inverse()?;
    for i in 0..k {
        let v = cov[(i, i)];
        if !(v.is_finite() && v > 0.0) {
            return None;
        }
    }
    Some((cov, CovarianceStatus::Approximated))
}
