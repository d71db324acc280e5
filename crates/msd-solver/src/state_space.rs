//! First-order state-space form of a mechanical system.
//!
//! With the state ordered as `s = [v; x]` (velocities first, then
//! positions), M*ẍ + C*ẋ + K*x = f becomes
//!
//! ```text
//! ds/dt = A*s + B*f
//!
//!     | -M⁻¹C  -M⁻¹K |        | M⁻¹ |
//! A = |              |    B = |     |        C_out = I(2N)
//!     |   I      0   |        |  0  |
//! ```
//!
//! `B` carries one input column per DOF, so a per-DOF force vector is
//! applied as `B*f`. The single-input column `[M⁻¹·1; 0]` (unit force on
//! every DOF) is available from [`StateSpaceModel::unit_input`].

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::f64::consts::PI;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::backend::{EigenResult, LinearAlgebra, block_2x2, vconcat};
use crate::error::{MsdError, Result};
use crate::mechanical::MechanicalSystem;

/// Which half of the state vector an output refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Position,
    Velocity,
}

impl FromStr for OutputKind {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "position" => Ok(OutputKind::Position),
            "velocity" => Ok(OutputKind::Velocity),
            other => Err(MsdError::InvalidResultType(format!(
                "{:?} (expected \"position\" or \"velocity\")",
                other
            ))),
        }
    }
}

/// Eigenvalues and eigenvectors of the state matrix A.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalData {
    /// Complex eigenvalues of A; lightly damped modes appear as conjugate pairs
    pub eigenvalues: Vec<Complex64>,
    /// Eigenvectors as columns (2N × 2N), same order as `eigenvalues`
    pub eigenvectors: DMatrix<Complex64>,
}

impl From<EigenResult> for ModalData {
    fn from(result: EigenResult) -> Self {
        Self {
            eigenvalues: result.eigenvalues,
            eigenvectors: result.eigenvectors,
        }
    }
}

impl ModalData {
    /// Eigenvalues with positive imaginary part, i.e. one per oscillating mode,
    /// sorted by ascending imaginary part.
    fn oscillating(&self) -> Vec<Complex64> {
        let mut modes: Vec<Complex64> = self
            .eigenvalues
            .iter()
            .copied()
            .filter(|lambda| lambda.im > 1e-12)
            .collect();
        modes.sort_by(|a, b| a.im.total_cmp(&b.im));
        modes
    }

    /// Damped natural frequencies Im(λ)/2π in Hz, ascending.
    pub fn damped_frequencies_hz(&self) -> Vec<f64> {
        self.oscillating().iter().map(|l| l.im / (2.0 * PI)).collect()
    }

    /// Undamped natural frequencies |λ|/2π in Hz for the oscillating modes.
    pub fn natural_frequencies_hz(&self) -> Vec<f64> {
        self.oscillating().iter().map(|l| l.norm() / (2.0 * PI)).collect()
    }

    /// Modal damping ratios ζ = -Re(λ)/|λ|, in the order of
    /// [`natural_frequencies_hz`](Self::natural_frequencies_hz).
    pub fn damping_ratios(&self) -> Vec<f64> {
        self.oscillating().iter().map(|l| -l.re / l.norm()).collect()
    }

    /// Get eigenvector for a given eigenvalue index
    pub fn eigenvector(&self, index: usize) -> Option<DVector<Complex64>> {
        if index >= self.eigenvectors.ncols() {
            return None;
        }
        Some(self.eigenvectors.column(index).into_owned())
    }

    /// True if no eigenvalue has a positive real part beyond `tolerance`.
    pub fn is_stable(&self, tolerance: f64) -> bool {
        self.eigenvalues.iter().all(|l| l.re <= tolerance)
    }
}

/// The (A, B, C_out) triple derived from a [`MechanicalSystem`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpaceModel {
    num_dofs: usize,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c_out: DMatrix<f64>,
    modal: Option<ModalData>,
}

impl StateSpaceModel {
    /// Model of the zero-DOF system. Every matrix is 0×0.
    pub fn empty() -> Self {
        Self {
            num_dofs: 0,
            a: DMatrix::zeros(0, 0),
            b: DMatrix::zeros(0, 0),
            c_out: DMatrix::zeros(0, 0),
            modal: None,
        }
    }

    /// Assemble the state-space matrices.
    ///
    /// The eigen decomposition of A is attempted as well; if it fails the
    /// modal data is reported as unavailable instead of failing the build.
    ///
    /// # Errors
    /// Returns `MsdError::SingularMatrix` if the mass matrix has a
    /// non-positive diagonal entry or cannot be inverted. Nothing is built
    /// in that case.
    pub fn build(system: &MechanicalSystem, backend: &dyn LinearAlgebra) -> Result<Self> {
        let n = system.num_dofs();
        if n == 0 {
            return Ok(Self::empty());
        }

        if let Some((i, m)) = system
            .mass()
            .diagonal()
            .iter()
            .copied()
            .enumerate()
            .find(|&(_, m)| m <= 0.0)
        {
            return Err(MsdError::SingularMatrix(format!(
                "Mass diagonal entry {} must be positive, got {}",
                i, m
            )));
        }

        let m_inv = backend.invert(system.mass()).map_err(|err| {
            MsdError::SingularMatrix(format!("Mass matrix is not invertible: {}", err))
        })?;

        let neg_m_inv_c = -(&m_inv * system.damping());
        let neg_m_inv_k = -(&m_inv * system.stiffness());
        let a = block_2x2(
            &neg_m_inv_c,
            &neg_m_inv_k,
            &DMatrix::identity(n, n),
            &DMatrix::zeros(n, n),
        )?;
        let b = vconcat(&m_inv, &DMatrix::zeros(n, n))?;
        let c_out = DMatrix::identity(2 * n, 2 * n);

        let modal = match backend.eigen(&a) {
            Ok(result) => Some(ModalData::from(result)),
            Err(err) => {
                warn!(dofs = n, error = %err, "eigen decomposition of A unavailable");
                None
            }
        };

        debug!(dofs = n, backend = backend.name(), "state space rebuilt");

        Ok(Self {
            num_dofs: n,
            a,
            b,
            c_out,
            modal,
        })
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Length of the state vector (2N).
    pub fn state_len(&self) -> usize {
        2 * self.num_dofs
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn c_out(&self) -> &DMatrix<f64> {
        &self.c_out
    }

    /// `[M⁻¹·1; 0]`: the response to a unit force on every DOF.
    pub fn unit_input(&self) -> DVector<f64> {
        &self.b * DVector::from_element(self.num_dofs, 1.0)
    }

    /// Eigen data of A, `None` if the decomposition failed.
    pub fn modal(&self) -> Option<&ModalData> {
        self.modal.as_ref()
    }

    /// ds/dt = A*s + B*f
    pub fn derivative(&self, state: &DVector<f64>, force: &DVector<f64>) -> DVector<f64> {
        &self.a * state + &self.b * force
    }

    /// Index into the state vector of `dof`'s position or velocity.
    pub fn state_index(&self, dof: usize, kind: OutputKind) -> usize {
        match kind {
            OutputKind::Velocity => dof,
            OutputKind::Position => self.num_dofs + dof,
        }
    }

    /// Pack positions and velocities into a state vector `[v; x]`.
    pub fn encode(&self, position: &DVector<f64>, velocity: &DVector<f64>) -> DVector<f64> {
        let n = self.num_dofs;
        let mut state = DVector::zeros(2 * n);
        state.rows_mut(0, n).copy_from(velocity);
        state.rows_mut(n, n).copy_from(position);
        state
    }

    /// Decode a state vector through C_out into `(position, velocity)`.
    pub fn decode(&self, state: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let n = self.num_dofs;
        let y = &self.c_out * state;
        let velocity = y.rows(0, n).into_owned();
        let position = y.rows(n, n).into_owned();
        (position, velocity)
    }
}
