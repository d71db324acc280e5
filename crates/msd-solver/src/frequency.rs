//! Frequency-domain analysis: Bode response, resonance and anti-resonance.
//!
//! The receptance H(ω) = Z(ω)⁻¹ with Z(ω) = K + jωC − ω²M is evaluated one
//! column at a time by solving Z·x = e_in, never by forming the inverse.
//! Samples where Z is singular are reported as gaps instead of errors.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::f64::consts::PI;
use std::str::FromStr;
use tracing::debug;

use crate::backend::LinearAlgebra;
use crate::error::{MsdError, Result};
use crate::mechanical::{MechanicalSystem, Oscillator};
use crate::state_space::{OutputKind, StateSpaceModel};

/// Which Bode curve a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodeQuantity {
    Magnitude,
    Phase,
}

impl FromStr for BodeQuantity {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "magnitude" => Ok(BodeQuantity::Magnitude),
            "phase" => Ok(BodeQuantity::Phase),
            other => Err(MsdError::InvalidResultType(format!(
                "{:?} (expected \"magnitude\" or \"phase\")",
                other
            ))),
        }
    }
}

/// One point of a Bode plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodeSample {
    pub frequency_hz: f64,
    pub magnitude: f64,
    /// Wrapped to (−180°, 180°]
    pub phase_deg: f64,
}

/// Magnitude and phase over a frequency grid. `None` marks a frequency at
/// which the impedance matrix was singular.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodeResponse {
    pub frequencies: Vec<f64>,
    pub magnitude: Vec<Option<f64>>,
    pub phase: Vec<Option<f64>>,
}

impl BodeResponse {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Defined samples only, gaps skipped.
    pub fn samples(&self) -> impl Iterator<Item = BodeSample> + '_ {
        self.frequencies
            .iter()
            .zip(self.magnitude.iter().zip(self.phase.iter()))
            .filter_map(|(&frequency_hz, (mag, phase))| {
                Some(BodeSample {
                    frequency_hz,
                    magnitude: (*mag)?,
                    phase_deg: (*phase)?,
                })
            })
    }

    pub fn quantity(&self, quantity: BodeQuantity) -> &[Option<f64>] {
        match quantity {
            BodeQuantity::Magnitude => &self.magnitude,
            BodeQuantity::Phase => &self.phase,
        }
    }
}

/// Single transfer-function value from the state-space form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferValue {
    pub real: f64,
    pub imag: f64,
    pub magnitude: f64,
    /// Radians, atan2(imag, real)
    pub phase_rad: f64,
}

impl From<Complex64> for TransferValue {
    fn from(h: Complex64) -> Self {
        Self {
            real: h.re,
            imag: h.im,
            magnitude: h.norm(),
            phase_rad: h.arg(),
        }
    }
}

/// Stateless analyzer borrowing the current system matrices.
#[derive(Clone, Copy)]
pub struct FrequencyAnalyzer<'a> {
    system: &'a MechanicalSystem,
    backend: &'a dyn LinearAlgebra,
}

impl std::fmt::Debug for FrequencyAnalyzer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyAnalyzer")
            .field("num_dofs", &self.system.num_dofs())
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl<'a> FrequencyAnalyzer<'a> {
    pub fn new(system: &'a MechanicalSystem, backend: &'a dyn LinearAlgebra) -> Self {
        Self { system, backend }
    }

    /// Z(ω) = K + jωC − ω²M
    pub fn impedance(&self, omega: f64) -> DMatrix<Complex64> {
        let m = self.system.mass();
        let c = self.system.damping();
        let k = self.system.stiffness();
        DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| {
            Complex64::new(k[(i, j)] - omega * omega * m[(i, j)], omega * c[(i, j)])
        })
    }

    /// Receptance H[output, input] at angular frequency `omega`, `Ok(None)`
    /// if Z(ω) is singular.
    ///
    /// # Errors
    /// `MsdError::Configuration` if a DOF index is out of range.
    pub fn receptance(
        &self,
        omega: f64,
        output_dof: usize,
        input_dof: usize,
    ) -> Result<Option<Complex64>> {
        self.check_dof("Output", output_dof)?;
        self.check_dof("Input", input_dof)?;

        let mut rhs = DVector::zeros(self.system.num_dofs());
        rhs[input_dof] = Complex64::new(1.0, 0.0);
        Ok(match self.backend.solve_complex(self.impedance(omega), &rhs) {
            Ok(x) if x[output_dof].is_finite() => Some(x[output_dof]),
            Ok(_) => {
                debug!(omega, "non-finite receptance, sample left as gap");
                None
            }
            Err(err) => {
                debug!(omega, error = %err, "singular impedance, sample left as gap");
                None
            }
        })
    }

    fn check_dof(&self, name: &str, index: usize) -> Result<()> {
        let n = self.system.num_dofs();
        if index >= n {
            return Err(MsdError::config(format!(
                "{} DOF {} out of range for {} degrees of freedom",
                name, index, n
            )));
        }
        Ok(())
    }

    /// Bode magnitude and phase (degrees) of H[output, input] at each
    /// frequency in Hz.
    ///
    /// # Errors
    /// `MsdError::Configuration` if a DOF index is out of range.
    pub fn bode_response(
        &self,
        frequencies_hz: &[f64],
        output_dof: usize,
        input_dof: usize,
    ) -> Result<BodeResponse> {
        if self.system.is_empty() {
            return Ok(BodeResponse::default());
        }
        self.check_dof("Output", output_dof)?;
        self.check_dof("Input", input_dof)?;

        let mut response = BodeResponse {
            frequencies: frequencies_hz.to_vec(),
            magnitude: Vec::with_capacity(frequencies_hz.len()),
            phase: Vec::with_capacity(frequencies_hz.len()),
        };
        for &f in frequencies_hz {
            let h = self.receptance(2.0 * PI * f, output_dof, input_dof)?;
            response.magnitude.push(h.map(|h| h.norm()));
            response.phase.push(h.map(|h| h.arg().to_degrees()));
        }
        Ok(response)
    }

    /// One Bode curve selected by name (`"magnitude"` or `"phase"`).
    pub fn bode_data(
        &self,
        frequencies_hz: &[f64],
        output_dof: usize,
        quantity: &str,
        input_dof: usize,
    ) -> Result<Vec<Option<f64>>> {
        let quantity: BodeQuantity = quantity.parse()?;
        let response = self.bode_response(frequencies_hz, output_dof, input_dof)?;
        Ok(response.quantity(quantity).to_vec())
    }

    /// Undamped natural frequencies in Hz from K·φ = λ·M·φ, ascending.
    ///
    /// Rigid-body modes (λ ≤ 0) are dropped. Returns an empty list if the
    /// eigenproblem cannot be solved.
    pub fn resonance_frequencies(&self) -> Vec<f64> {
        if self.system.is_empty() {
            return Vec::new();
        }
        let result = match self
            .backend
            .generalized_symmetric_eigen(self.system.stiffness(), self.system.mass())
        {
            Ok(result) => result,
            Err(err) => {
                debug!(error = %err, "resonance eigenproblem failed");
                return Vec::new();
            }
        };

        let scale = result
            .eigenvalues
            .iter()
            .fold(0.0_f64, |acc, l| acc.max(l.abs()));
        let mut freqs: Vec<f64> = result
            .eigenvalues
            .iter()
            .filter(|&&lambda| lambda > scale * 1e-12 && lambda.is_finite())
            .map(|lambda| lambda.sqrt() / (2.0 * PI))
            .collect();
        freqs.sort_by(f64::total_cmp);
        freqs
    }
}

/// Frequency of the smallest sampled magnitude between the first and last
/// resonance, further limited to `[min_hz, max_hz]`.
///
/// Needs at least two resonances. Gaps are skipped; `None` if no sample
/// lies inside the window.
pub fn anti_resonance(
    frequencies_hz: &[f64],
    magnitudes: &[Option<f64>],
    resonances_hz: &[f64],
    min_hz: f64,
    max_hz: f64,
) -> Option<f64> {
    if resonances_hz.len() < 2 {
        return None;
    }
    let low = resonances_hz[0].max(min_hz);
    let high = resonances_hz[resonances_hz.len() - 1].min(max_hz);

    frequencies_hz
        .iter()
        .zip(magnitudes.iter())
        .filter(|&(&f, _)| f >= low && f <= high)
        .filter_map(|(&f, mag)| mag.map(|m| (f, m)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(f, _)| f)
}

/// Analytic single-DOF receptance magnitude 1/|k − mω² + jcω| at each
/// frequency in Hz; `None` where the denominator vanishes.
pub fn single_dof_magnitude(frequencies_hz: &[f64], oscillator: Oscillator) -> Vec<Option<f64>> {
    frequencies_hz
        .iter()
        .map(|&f| {
            let omega = 2.0 * PI * f;
            let z = Complex64::new(
                oscillator.stiffness - oscillator.mass * omega * omega,
                oscillator.damping * omega,
            );
            let norm = z.norm();
            (norm > 0.0).then(|| 1.0 / norm)
        })
        .collect()
}

/// Transfer function from force input `input_dof` to the position or
/// velocity of `output_dof`, evaluated from the state-space form by
/// solving (jωI − A)·x = B·e_in.
///
/// `None` for out-of-range indices or a singular system.
pub fn state_space_transfer(
    model: &StateSpaceModel,
    backend: &dyn LinearAlgebra,
    omega: f64,
    input_dof: usize,
    output_dof: usize,
    kind: OutputKind,
) -> Option<TransferValue> {
    let n = model.num_dofs();
    if input_dof >= n || output_dof >= n {
        return None;
    }

    let size = model.state_len();
    let a = model.a();
    let lhs = DMatrix::from_fn(size, size, |i, j| {
        let diag = if i == j { omega } else { 0.0 };
        Complex64::new(-a[(i, j)], diag)
    });
    let rhs = model
        .b()
        .column(input_dof)
        .map(|v| Complex64::new(v, 0.0));

    match backend.solve_complex(lhs, &rhs) {
        Ok(x) => {
            let h = x[model.state_index(output_dof, kind)];
            h.is_finite().then(|| TransferValue::from(h))
        }
        Err(err) => {
            debug!(omega, error = %err, "state-space transfer solve failed");
            None
        }
    }
}
