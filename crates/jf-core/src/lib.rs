//! # jf-core
//!
//! Core types, traits, and error handling for jetfit.
//!
//! This crate provides:
//! - Common error types
//! - Capability traits (Correction, LossTerm, Measurement)
//! - Nuisance-parameter bookkeeping
//! - Fit-result types and their serialized records

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod nuisance;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use nuisance::{NuisanceRegistry, NuisanceView};
pub use traits::{Correction, LossTerm, Measurement};
pub use types::{CovarianceStatus, FitRecord, FitResult, FitStatus, ResidualPoint, Variable};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
