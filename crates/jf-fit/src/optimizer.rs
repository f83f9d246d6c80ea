//! Bounded quasi-Newton minimization.
//!
//! Thin wrapper around argmin's L-BFGS with box constraints handled by
//! clamping plus a projected-gradient heuristic. The fit engine never talks
//! to argmin directly; it goes through [`LbfgsOptimizer`].

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use jf_core::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Minimizer accuracy level.
///
/// Trades iteration budget and gradient tolerance for speed. The fit engine
/// runs at [`Strategy::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Loose tolerances, few iterations.
    Fast,
    /// Normal accuracy.
    #[default]
    Normal,
    /// Tight tolerances, large iteration budget.
    Thorough,
}

/// Configuration for the L-BFGS optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the gradient norm
    pub tol: f64,
    /// Number of corrections to approximate the inverse Hessian
    pub m: usize,
    /// Objective increase corresponding to one standard deviation.
    ///
    /// 1.0 is the chi-square convention.
    pub error_def: f64,
}

impl OptimizerConfig {
    /// Preset configuration for the given accuracy strategy.
    pub fn for_strategy(strategy: Strategy) -> Self {
        let (tol, max_iter) = match strategy {
            Strategy::Fast => (1e-4, 200),
            Strategy::Normal => (1e-5, 1000),
            Strategy::Thorough => (1e-7, 5000),
        };
        Self { max_iter, tol, m: 10, error_def: 1.0 }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::for_strategy(Strategy::Normal)
    }
}

/// Result of a single minimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at the minimum
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations
    pub n_fev: usize,
    /// Number of gradient evaluations
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Objective function contract for the optimizer.
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the objective at the given parameters.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at the given parameters (central differences if not
    /// overridden).
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];

        for i in 0..n {
            let eps = 1e-6 * params[i].abs().max(1.0);

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

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Adapter making an [`ObjectiveFunction`] consumable by argmin.
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    counts: Arc<FuncCounts>,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // At an active bound, a gradient component pointing further outside
        // would make the line search step into the flat clamped region; zero
        // it. A bound clamped to a point (fixed variable) zeroes both signs.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds.iter()).enumerate() {
            if x <= lo + EPS && g[i] > 0.0 {
                g[i] = 0.0;
            }
            if x >= hi - EPS && g[i] < 0.0 {
                g[i] = 0.0;
            }
        }

        Ok(g)
    }
}

/// L-BFGS optimizer with box constraints.
pub struct LbfgsOptimizer {
    config: OptimizerConfig,
}

impl LbfgsOptimizer {
    /// Create a new optimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize the objective from `init_params` within `bounds`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }

        let init_clamped = clamp_params(init_params, bounds);
        let counts = Arc::new(FuncCounts::default());
        let problem = ArgminProblem { objective, bounds, counts: counts.clone() };

        let linesearch = MoreThuenteLineSearch::new();
        // Argmin's default cost tolerance is ~machine epsilon, far stricter
        // than chi-square scales warrant.
        let tol_cost = (0.1 * self.config.tol).max(1e-12);
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerance: {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| Error::Validation(format!("invalid optimizer cost tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init_clamped).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Validation(format!("optimization failed: {e}")))?;

        let state = res.state();
        let best_unclamped = state
            .get_best_param()
            .ok_or_else(|| Error::Validation("no best parameters found".to_string()))?
            .clone();
        let best_params = clamp_params(&best_unclamped, bounds);
        let fval = state.get_best_cost();
        let n_iter = state.get_iter();

        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(OptimizationResult {
            parameters: best_params,
            fval,
            n_iter,
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            converged,
            message: termination.to_string(),
        })
    }
}

impl Default for LbfgsOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // f(x, y) = (x - 2)^2 + (y - 3)^2, minimum at (2, 3).
    struct QuadraticFunction;

    impl ObjectiveFunction for QuadraticFunction {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            let x = params[0];
            let y = params[1];
            Ok((x - 2.0).powi(2) + (y - 3.0).powi(2))
        }

        fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
            let x = params[0];
            let y = params[1];
            Ok(vec![2.0 * (x - 2.0), 2.0 * (y - 3.0)])
        }
    }

    #[test]
    fn test_quadratic_converges() {
        let optimizer = LbfgsOptimizer::default();
        let result = optimizer
            .minimize(&QuadraticFunction, &[0.0, 0.0], &[(-10.0, 10.0), (-10.0, 10.0)])
            .unwrap();

        assert!(result.converged, "should converge: {}", result.message);
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, 0.0, epsilon = 1e-6);
        assert!(result.n_fev > 0);
    }

    #[test]
    fn test_minimum_outside_bounds_lands_on_boundary() {
        // Unconstrained minimum (2, 3); constrained to x in [3, 5], y in [1, 2].
        let optimizer = LbfgsOptimizer::default();
        let result = optimizer
            .minimize(&QuadraticFunction, &[4.0, 1.5], &[(3.0, 5.0), (1.0, 2.0)])
            .unwrap();

        assert_relative_eq!(result.parameters[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_point_bounds_pin_a_variable() {
        // x clamped to exactly 1.5: only y moves.
        let optimizer = LbfgsOptimizer::default();
        let result = optimizer
            .minimize(&QuadraticFunction, &[1.5, 0.0], &[(1.5, 1.5), (-10.0, 10.0)])
            .unwrap();

        assert_relative_eq!(result.parameters[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, 0.25, epsilon = 1e-6);
    }

    // Numerical-gradient path: no gradient override.
    struct Rosenbrock;

    impl ObjectiveFunction for Rosenbrock {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            let x = params[0];
            let y = params[1];
            Ok((1.0 - x).powi(2) + 100.0 * (y - x.powi(2)).powi(2))
        }
    }

    #[test]
    fn test_rosenbrock_numerical_gradient() {
        let config = OptimizerConfig::for_strategy(Strategy::Thorough);
        let optimizer = LbfgsOptimizer::new(config);
        let result =
            optimizer.minimize(&Rosenbrock, &[0.0, 0.0], &[(-10.0, 10.0), (-10.0, 10.0)]).unwrap();

        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.parameters[1], 1.0, epsilon = 1e-3);
        assert!(result.fval < 1e-4);
    }

    #[test]
    fn test_strategy_presets_ordered() {
        let fast = OptimizerConfig::for_strategy(Strategy::Fast);
        let normal = OptimizerConfig::for_strategy(Strategy::Normal);
        let thorough = OptimizerConfig::for_strategy(Strategy::Thorough);
        assert!(fast.tol > normal.tol && normal.tol > thorough.tol);
        assert!(fast.max_iter < normal.max_iter && normal.max_iter < thorough.max_iter);
    }
}
