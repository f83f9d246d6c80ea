//! # jf-fit
//!
//! Fit engine for residual jet-energy ("L3Res") corrections.
//!
//! The engine composes a chi-square objective from balance measurements and
//! an optional external constraint on the correction, profiles nuisance
//! parameters, and wraps minimizer outcomes into round-trippable
//! [`FitResult`](jf_core::FitResult)s.

#![warn(clippy::all)]

pub mod constraint;
pub mod correction;
pub mod engine;
pub mod loss;
pub mod measurement;
pub mod minimizer;
pub mod optimizer;
pub mod pvalue;

pub use constraint::CorrectionConstraint;
pub use correction::{create_correction, SplineCorr, Std2P, DEFAULT_REF_PT};
pub use engine::{FitEngine, NuisanceValues};
pub use loss::CombinedLoss;
pub use measurement::{Method, PhotonJetMeasurement, PtBin};
pub use minimizer::{MinimizerOutcome, MinimizerSession, VariableDef};
pub use optimizer::{OptimizerConfig, Strategy};
pub use pvalue::chi2_pvalue;
