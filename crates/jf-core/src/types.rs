//! Common data types for jetfit

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outcome status of a minimization run.
///
/// The integer codes are the stable wire values used by [`FitRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// Minimization converged.
    Converged,
    /// Minimization terminated without reaching convergence criteria.
    DidNotConverge,
    /// The reported minimum is not a valid objective value.
    Invalid,
    /// Minimization was aborted before completion.
    Aborted,
}

impl FitStatus {
    /// Stable integer code.
    pub fn code(self) -> i32 {
        match self {
            FitStatus::Converged => 0,
            FitStatus::DidNotConverge => 1,
            FitStatus::Invalid => 2,
            FitStatus::Aborted => 3,
        }
    }

    /// Decode from a stable integer code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(FitStatus::Converged),
            1 => Ok(FitStatus::DidNotConverge),
            2 => Ok(FitStatus::Invalid),
            3 => Ok(FitStatus::Aborted),
            other => Err(Error::SerializationMismatch(format!("unknown fit status code {other}"))),
        }
    }
}

/// Reliability grade of a reported covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceStatus {
    /// No covariance matrix was computed.
    NotComputed,
    /// Covariance from a non-definite Hessian inverse; treat as indicative.
    Approximated,
    /// Covariance from a Hessian that had to be damped to positive definite.
    ForcedPosDef,
    /// Covariance from a positive-definite Hessian.
    Accurate,
}

impl CovarianceStatus {
    /// Stable integer code.
    pub fn code(self) -> i32 {
        match self {
            CovarianceStatus::NotComputed => 0,
            CovarianceStatus::Approximated => 1,
            CovarianceStatus::ForcedPosDef => 2,
            CovarianceStatus::Accurate => 3,
        }
    }

    /// Decode from a stable integer code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(CovarianceStatus::NotComputed),
            1 => Ok(CovarianceStatus::Approximated),
            2 => Ok(CovarianceStatus::ForcedPosDef),
            3 => Ok(CovarianceStatus::Accurate),
            other => {
                Err(Error::SerializationMismatch(format!("unknown covariance status code {other}")))
            }
        }
    }
}

/// One fitted variable: name, best-fit value, and parabolic uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name as declared to the minimizer.
    pub name: String,
    /// Best-fit value.
    pub value: f64,
    /// Parabolic uncertainty. Zero for fixed variables.
    pub error: f64,
}

/// One point of a residual graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualPoint {
    /// Abscissa (photon or leading-jet pt).
    pub x: f64,
    /// Residual value.
    pub y: f64,
    /// Uncertainty of the residual value.
    pub y_err: f64,
}

/// Immutable record of a fit outcome.
///
/// Produced once by the fit engine and thereafter read-only. Can also be
/// reconstructed from a serialized [`FitRecord`] without ever running a
/// minimizer.
#[derive(Debug, Clone)]
pub struct FitResult {
    status: FitStatus,
    covariance_status: CovarianceStatus,
    min_value: f64,
    parameters: Vec<Variable>,
    /// Row-major, square, dimension == parameters.len().
    covariance: Vec<f64>,
}

impl FitResult {
    /// Assemble a fit result from minimizer-reported pieces.
    ///
    /// `covariance` is row-major with dimension `parameters.len()`.
    pub fn new(
        status: FitStatus,
        covariance_status: CovarianceStatus,
        min_value: f64,
        parameters: Vec<Variable>,
        covariance: Vec<f64>,
    ) -> Result<Self> {
        let n = parameters.len();
        if covariance.len() != n * n {
            return Err(Error::Validation(format!(
                "covariance length {} != {} x {}",
                covariance.len(),
                n,
                n
            )));
        }
        Ok(Self { status, covariance_status, min_value, parameters, covariance })
    }

    /// Minimization status.
    pub fn status(&self) -> FitStatus {
        self.status
    }

    /// Covariance-matrix status.
    pub fn covariance_status(&self) -> CovarianceStatus {
        self.covariance_status
    }

    /// Objective value at the minimum.
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    /// Fitted variables in minimizer-declaration order.
    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }

    /// Covariance-matrix element (i, j).
    pub fn covariance(&self, i: usize, j: usize) -> f64 {
        self.covariance[i * self.parameters.len() + j]
    }

    /// Serialize into the plain structured record stored in JSON files.
    pub fn serialize(&self) -> FitRecord {
        let n = self.parameters.len();
        let covariance_matrix =
            (0..n).map(|i| self.covariance[i * n..(i + 1) * n].to_vec()).collect();
        FitRecord {
            status: self.status.code(),
            covariance_status: self.covariance_status.code(),
            min_value: self.min_value,
            parameters: self.parameters.clone(),
            covariance_matrix,
        }
    }

    /// Reconstruct from a serialized record.
    ///
    /// The record is validated before use: status codes must be known, every
    /// covariance row must have the matrix dimension, and that dimension must
    /// equal the number of parameters. Violations fail with
    /// [`Error::SerializationMismatch`].
    pub fn from_record(record: FitRecord) -> Result<Self> {
        let status = FitStatus::from_code(record.status)?;
        let covariance_status = CovarianceStatus::from_code(record.covariance_status)?;

        let n = record.parameters.len();
        if record.covariance_matrix.len() != n {
            return Err(Error::SerializationMismatch(format!(
                "covariance matrix has {} rows for {} parameters",
                record.covariance_matrix.len(),
                n
            )));
        }
        let mut covariance = Vec::with_capacity(n * n);
        for (i, row) in record.covariance_matrix.iter().enumerate() {
            if row.len() != n {
                return Err(Error::SerializationMismatch(format!(
                    "covariance row {} has length {} (expected {})",
                    i,
                    row.len(),
                    n
                )));
            }
            covariance.extend_from_slice(row);
        }

        Ok(Self {
            status,
            covariance_status,
            min_value: record.min_value,
            parameters: record.parameters,
            covariance,
        })
    }
}

/// Plain structured record of a fit outcome, as persisted to JSON.
///
/// Field names and nesting are stable: this is exactly the structure produced
/// by [`FitResult::serialize`] and consumed by [`FitResult::from_record`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    /// [`FitStatus`] integer code.
    pub status: i32,
    /// [`CovarianceStatus`] integer code.
    pub covariance_status: i32,
    /// Objective value at the minimum.
    pub min_value: f64,
    /// Fitted variables in minimizer-declaration order.
    pub parameters: Vec<Variable>,
    /// Row-major covariance matrix.
    pub covariance_matrix: Vec<Vec<f64>>,
}
