//! Backend trait definitions for the dense linear algebra the simulator needs.
//!
//! The state-space builder, the frequency analyzer and the chain model only
//! talk to this trait. Matrix containers stay `nalgebra` types on both sides
//! of the seam; what is abstracted is the choice of decomposition.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Error type for backend operations.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Eigen decomposition of a general real square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenResult {
    /// Eigenvalues, complex conjugate pairs adjacent
    pub eigenvalues: Vec<Complex64>,
    /// Unit-norm eigenvectors as columns, in the same order as `eigenvalues`
    pub eigenvectors: DMatrix<Complex64>,
}

/// Results of the symmetric generalized problem K * phi = lambda * M * phi.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedEigenResult {
    /// Eigenvalues (lambda = omega^2), sorted ascending
    pub eigenvalues: Vec<f64>,
    /// Eigenvectors as columns (num_dofs x num_modes)
    pub eigenvectors: DMatrix<f64>,
}

/// Dense linear algebra operations used by the simulator.
///
/// Implementations must be free of hidden mutable state: identical inputs
/// give identical outputs.
pub trait LinearAlgebra: Send + Sync {
    /// Invert a square real matrix.
    fn invert(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, BackendError>;

    /// Solve `a * x = b` for a square complex matrix.
    fn solve_complex(
        &self,
        a: DMatrix<Complex64>,
        b: &DVector<Complex64>,
    ) -> Result<DVector<Complex64>, BackendError>;

    /// Eigenvalues and eigenvectors of a general (non-symmetric) real matrix.
    fn eigen(&self, matrix: &DMatrix<f64>) -> Result<EigenResult, BackendError>;

    /// Solve K * phi = lambda * M * phi for symmetric K and symmetric
    /// positive definite M.
    fn generalized_symmetric_eigen(
        &self,
        stiffness: &DMatrix<f64>,
        mass: &DMatrix<f64>,
    ) -> Result<GeneralizedEigenResult, BackendError>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}
