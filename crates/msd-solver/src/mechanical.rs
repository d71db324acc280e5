//! Second-order mechanical systems: M*ẍ + C*ẋ + K*x = f(t).
//!
//! A [`MechanicalSystem`] owns the three N×N matrices. Construction checks
//! shapes and finiteness only; invertibility of the mass matrix is checked
//! when the state space is built.

use nalgebra::DMatrix;
use std::f64::consts::PI;

use crate::error::{MsdError, Result};

/// Lumped mass-spring-damper system with N degrees of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct MechanicalSystem {
    mass: DMatrix<f64>,
    damping: DMatrix<f64>,
    stiffness: DMatrix<f64>,
}

/// Parameters of one single-DOF oscillator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    pub mass: f64,
    pub damping: f64,
    pub stiffness: f64,
}

impl Oscillator {
    /// Oscillator whose undamped natural frequency is `frequency_hz`.
    ///
    /// k = m * (2πf)²
    pub fn tuned(mass: f64, damping: f64, frequency_hz: f64) -> Self {
        let omega = 2.0 * PI * frequency_hz;
        Self {
            mass,
            damping,
            stiffness: mass * omega * omega,
        }
    }

    /// Undamped natural frequency in Hz.
    pub fn natural_frequency_hz(&self) -> f64 {
        (self.stiffness / self.mass).sqrt() / (2.0 * PI)
    }
}

fn check_matrix(name: &str, matrix: &DMatrix<f64>, n: usize) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(MsdError::config(format!(
            "{} matrix must be square, got {}x{}",
            name,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.nrows() != n {
        return Err(MsdError::config(format!(
            "{} matrix is {}x{} but the system has {} degrees of freedom",
            name,
            matrix.nrows(),
            matrix.ncols(),
            n
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(MsdError::config(format!(
            "{} matrix contains non-finite entries",
            name
        )));
    }
    Ok(())
}

impl MechanicalSystem {
    /// Create a system from mass, damping and stiffness matrices.
    ///
    /// # Errors
    /// Returns `MsdError::Configuration` if a matrix is not square, the
    /// sizes disagree, or an entry is NaN/infinite.
    pub fn new(
        mass: DMatrix<f64>,
        damping: DMatrix<f64>,
        stiffness: DMatrix<f64>,
    ) -> Result<Self> {
        let n = mass.nrows();
        check_matrix("Mass", &mass, n)?;
        check_matrix("Damping", &damping, n)?;
        check_matrix("Stiffness", &stiffness, n)?;
        Ok(Self {
            mass,
            damping,
            stiffness,
        })
    }

    /// The "not yet configured" system with zero degrees of freedom.
    pub fn empty() -> Self {
        Self {
            mass: DMatrix::zeros(0, 0),
            damping: DMatrix::zeros(0, 0),
            stiffness: DMatrix::zeros(0, 0),
        }
    }

    /// Create a system from dense row-major slices of length n*n.
    pub fn from_row_major(n: usize, mass: &[f64], damping: &[f64], stiffness: &[f64]) -> Result<Self> {
        let to_matrix = |name: &str, data: &[f64]| -> Result<DMatrix<f64>> {
            if data.len() != n * n {
                return Err(MsdError::config(format!(
                    "{} data has {} entries, expected {} for a {}x{} matrix",
                    name,
                    data.len(),
                    n * n,
                    n,
                    n
                )));
            }
            Ok(DMatrix::from_row_slice(n, n, data))
        };
        Self::new(
            to_matrix("Mass", mass)?,
            to_matrix("Damping", damping)?,
            to_matrix("Stiffness", stiffness)?,
        )
    }

    /// Single-DOF system.
    pub fn single_dof(oscillator: Oscillator) -> Result<Self> {
        Self::from_row_major(
            1,
            &[oscillator.mass],
            &[oscillator.damping],
            &[oscillator.stiffness],
        )
    }

    /// Primary mass on ground with a tuned mass damper mounted on top.
    ///
    /// DOF 0 is the primary mass, DOF 1 the absorber.
    pub fn tuned_mass_damper(primary: Oscillator, absorber: Oscillator) -> Result<Self> {
        let (m1, c1, k1) = (primary.mass, primary.damping, primary.stiffness);
        let (m2, c2, k2) = (absorber.mass, absorber.damping, absorber.stiffness);
        Self::from_row_major(
            2,
            &[m1, 0.0, 0.0, m2],
            &[c1 + c2, -c2, -c2, c2],
            &[k1 + k2, -k2, -k2, k2],
        )
    }

    /// Chain of point masses: an optional ground spring/damper on DOF 0 and
    /// one spring/damper pair between each pair of neighbours.
    ///
    /// `link_*` slices hold `masses.len() - 1` entries; missing entries count
    /// as zero.
    pub fn chain(
        masses: &[f64],
        ground_stiffness: f64,
        ground_damping: f64,
        link_stiffness: &[f64],
        link_damping: &[f64],
    ) -> Result<Self> {
        let n = masses.len();
        let mass = DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(masses));
        let mut stiffness = DMatrix::zeros(n, n);
        let mut damping = DMatrix::zeros(n, n);

        if n > 0 {
            stiffness[(0, 0)] += ground_stiffness;
            damping[(0, 0)] += ground_damping;
        }

        for i in 0..n.saturating_sub(1) {
            let k = link_stiffness.get(i).copied().unwrap_or(0.0);
            let c = link_damping.get(i).copied().unwrap_or(0.0);
            add_link(&mut stiffness, i, k);
            add_link(&mut damping, i, c);
        }

        Self::new(mass, damping, stiffness)
    }

    /// Number of degrees of freedom.
    pub fn num_dofs(&self) -> usize {
        self.mass.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.num_dofs() == 0
    }

    pub fn mass(&self) -> &DMatrix<f64> {
        &self.mass
    }

    pub fn damping(&self) -> &DMatrix<f64> {
        &self.damping
    }

    pub fn stiffness(&self) -> &DMatrix<f64> {
        &self.stiffness
    }

    /// Copy with the mass matrix replaced. The size must not change.
    pub fn with_mass(&self, mass: DMatrix<f64>) -> Result<Self> {
        check_matrix("Mass", &mass, self.num_dofs())?;
        Ok(Self {
            mass,
            ..self.clone()
        })
    }

    /// Copy with the damping matrix replaced. The size must not change.
    pub fn with_damping(&self, damping: DMatrix<f64>) -> Result<Self> {
        check_matrix("Damping", &damping, self.num_dofs())?;
        Ok(Self {
            damping,
            ..self.clone()
        })
    }

    /// Copy with the stiffness matrix replaced. The size must not change.
    pub fn with_stiffness(&self, stiffness: DMatrix<f64>) -> Result<Self> {
        check_matrix("Stiffness", &stiffness, self.num_dofs())?;
        Ok(Self {
            stiffness,
            ..self.clone()
        })
    }
}

/// Add the two-node stencil [[k, -k], [-k, k]] between DOF i and i+1.
fn add_link(matrix: &mut DMatrix<f64>, i: usize, value: f64) {
    if value == 0.0 {
        return;
    }
    matrix[(i, i)] += value;
    matrix[(i + 1, i + 1)] += value;
    matrix[(i, i + 1)] -= value;
    matrix[(i + 1, i)] -= value;
}
