//! Multi-mass chain: N point masses in a line, optionally grounded at the
//! first mass, connected by springs and dampers.
//!
//! Forces are accumulated with [`MultiMassChain::apply_force`] and consumed
//! by the next [`MultiMassChain::step`], which advances the state by one
//! fixed-size RK4 step (decimated to `time_step`) and clears them.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{LinearAlgebra, default_backend};
use crate::config::ChainConfig;
use crate::error::{MsdError, Result};
use crate::frequency::{TransferValue, state_space_transfer};
use crate::integrator::rk4_step;
use crate::mechanical::MechanicalSystem;
use crate::state_space::{OutputKind, StateSpaceModel};

/// A chain parameter given as one value for every element or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainParameter {
    Uniform(f64),
    PerElement(Vec<f64>),
}

impl ChainParameter {
    /// Reject empty lists and scalars that are non-finite or out of range.
    ///
    /// Scalars must be positive, or non-negative when `allow_zero` is set.
    /// List entries are not checked here; they are normalized on expansion.
    pub fn validate(&self, name: &str, allow_zero: bool) -> Result<()> {
        match self {
            ChainParameter::PerElement(values) if values.is_empty() => {
                Err(MsdError::config(format!("{} list must not be empty", name)))
            }
            ChainParameter::Uniform(value) if !value.is_finite() => {
                Err(MsdError::config(format!("{} must be finite, got {}", name, value)))
            }
            ChainParameter::Uniform(value) if *value < 0.0 || (!allow_zero && *value == 0.0) => {
                let bound = if allow_zero { "non-negative" } else { "positive" };
                Err(MsdError::config(format!("{} must be {}, got {}", name, bound, value)))
            }
            _ => Ok(()),
        }
    }

    /// Per-mass values. Non-finite entries repeat the previous value (1 for
    /// the first); non-positive values become 1.
    pub fn masses(&self, n: usize) -> Vec<f64> {
        match self {
            ChainParameter::Uniform(value) => {
                let value = if value.is_finite() && *value > 0.0 { *value } else { 1.0 };
                vec![value; n]
            }
            ChainParameter::PerElement(values) => fill_forward(values, n, 1.0)
                .into_iter()
                .map(|v| if v > 0.0 { v } else { 1.0 })
                .collect(),
        }
    }

    /// Split into the ground element on mass 0 and the `n - 1` links.
    ///
    /// A list with at least `n` entries carries the ground value first; a
    /// shorter list or a scalar describes links only. Negative values are
    /// clamped to zero.
    pub fn ground_and_links(&self, n: usize) -> (f64, Vec<f64>) {
        let links = n.saturating_sub(1);
        match self {
            ChainParameter::PerElement(values) if values.len() >= n && n > 0 => {
                let expanded: Vec<f64> = fill_forward(values, n, 0.0)
                    .into_iter()
                    .map(|v| v.max(0.0))
                    .collect();
                (expanded[0], expanded[1..].to_vec())
            }
            ChainParameter::PerElement(values) => (
                0.0,
                fill_forward(values, links, 0.0)
                    .into_iter()
                    .map(|v| v.max(0.0))
                    .collect(),
            ),
            ChainParameter::Uniform(value) => {
                let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
                (0.0, vec![value; links])
            }
        }
    }
}

impl From<f64> for ChainParameter {
    fn from(value: f64) -> Self {
        ChainParameter::Uniform(value)
    }
}

impl From<Vec<f64>> for ChainParameter {
    fn from(values: Vec<f64>) -> Self {
        ChainParameter::PerElement(values)
    }
}

/// First `len` entries of `values`; missing or non-finite entries take the
/// previous value, or `fallback` at index 0.
fn fill_forward(values: &[f64], len: usize, fallback: f64) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(len);
    for i in 0..len {
        let value = match values.get(i) {
            Some(v) if v.is_finite() => *v,
            _ => out.last().copied().unwrap_or(fallback),
        };
        out.push(value);
    }
    out
}

/// Assemble M, C and K for a chain configuration.
pub fn assemble_chain(config: &ChainConfig) -> Result<MechanicalSystem> {
    let n = config.num_masses;
    let masses = config.mass.masses(n);
    let (ground_k, link_k) = config.stiffness.ground_and_links(n);
    let (ground_c, link_c) = config.damping.ground_and_links(n);
    MechanicalSystem::chain(&masses, ground_k, ground_c, &link_k, &link_c)
}

/// Fixed-step chain simulator with an accumulating force buffer.
pub struct MultiMassChain {
    config: ChainConfig,
    backend: Box<dyn LinearAlgebra>,
    model: StateSpaceModel,
    positions: Vec<f64>,
    velocities: Vec<f64>,
    forces: Vec<f64>,
    last_time: Option<f64>,
}

impl std::fmt::Debug for MultiMassChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiMassChain")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("positions", &self.positions)
            .field("velocities", &self.velocities)
            .field("forces", &self.forces)
            .field("last_time", &self.last_time)
            .finish()
    }
}

impl MultiMassChain {
    /// Create a chain at rest.
    ///
    /// # Errors
    /// `MsdError::Configuration` if `config` does not validate.
    pub fn new(config: ChainConfig) -> Result<Self> {
        Self::with_backend(config, default_backend())
    }

    pub fn with_backend(config: ChainConfig, backend: Box<dyn LinearAlgebra>) -> Result<Self> {
        config.validate()?;
        let model = StateSpaceModel::build(&assemble_chain(&config)?, backend.as_ref())?;
        let n = config.num_masses;
        Ok(Self {
            config,
            backend,
            model,
            positions: vec![0.0; n],
            velocities: vec![0.0; n],
            forces: vec![0.0; n],
            last_time: None,
        })
    }

    pub fn num_masses(&self) -> usize {
        self.config.num_masses
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn model(&self) -> &StateSpaceModel {
        &self.model
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    /// Forces pending for the next step.
    pub fn forces(&self) -> &[f64] {
        &self.forces
    }

    /// Add `force` to the pending force on `index`. Out-of-range indices
    /// are ignored.
    pub fn apply_force(&mut self, index: usize, force: f64) {
        if let Some(slot) = self.forces.get_mut(index) {
            *slot += force;
        }
    }

    /// Advance by one RK4 step with the pending forces held constant.
    ///
    /// With `Some(time)` the step is the gap since the previous call, capped
    /// at `time_step` (zero on the first call). With `None` it is exactly
    /// `time_step`. A non-finite time integrates nothing and is not kept as
    /// the reference for the next gap. The force buffer is cleared either way.
    pub fn step(&mut self, time: Option<f64>) {
        let raw_dt = match time {
            Some(now) if now.is_finite() => self.last_time.map_or(0.0, |last| now - last),
            Some(_) => 0.0,
            None => self.config.time_step,
        };
        let dt = raw_dt.min(self.config.time_step);
        if let Some(now) = time.filter(|t| t.is_finite()) {
            self.last_time = Some(now);
        }

        if dt > 0.0 {
            let position = DVector::from_column_slice(&self.positions);
            let velocity = DVector::from_column_slice(&self.velocities);
            let force = DVector::from_column_slice(&self.forces);
            let state = self.model.encode(&position, &velocity);

            let model = &self.model;
            let rhs = |_t: f64, s: &DVector<f64>| model.derivative(s, &force);
            let next = rk4_step(&rhs, 0.0, &state, dt);

            let (position, velocity) = self.model.decode(&next);
            self.positions.copy_from_slice(position.as_slice());
            self.velocities.copy_from_slice(velocity.as_slice());
        }
        self.forces.fill(0.0);
    }

    /// Replace the mass parameter.
    pub fn set_mass(&mut self, mass: impl Into<ChainParameter>) -> Result<()> {
        self.set_parameters(Some(mass.into()), None, None)
    }

    /// Replace the damping parameter.
    pub fn set_damping(&mut self, damping: impl Into<ChainParameter>) -> Result<()> {
        self.set_parameters(None, Some(damping.into()), None)
    }

    /// Replace the stiffness parameter.
    pub fn set_stiffness(&mut self, stiffness: impl Into<ChainParameter>) -> Result<()> {
        self.set_parameters(None, None, Some(stiffness.into()))
    }

    /// Replace any subset of the parameters and rebuild the state space.
    ///
    /// Nothing changes if any of the given values is invalid.
    pub fn set_parameters(
        &mut self,
        mass: Option<ChainParameter>,
        damping: Option<ChainParameter>,
        stiffness: Option<ChainParameter>,
    ) -> Result<()> {
        let mut candidate = self.config.clone();
        if let Some(mass) = mass {
            candidate.mass = mass;
        }
        if let Some(damping) = damping {
            candidate.damping = damping;
        }
        if let Some(stiffness) = stiffness {
            candidate.stiffness = stiffness;
        }
        if candidate == self.config {
            return Ok(());
        }
        candidate.validate()?;

        let model = StateSpaceModel::build(&assemble_chain(&candidate)?, self.backend.as_ref())?;
        debug!(masses = candidate.num_masses, "chain parameters updated");
        self.config = candidate;
        self.model = model;
        Ok(())
    }

    /// Transfer function from a force on `input` to the position or
    /// velocity of `output` at angular frequency `omega`.
    ///
    /// `None` for out-of-range indices.
    pub fn transfer_function(
        &self,
        omega: f64,
        input: usize,
        output: usize,
        kind: OutputKind,
    ) -> Option<TransferValue> {
        state_space_transfer(&self.model, self.backend.as_ref(), omega, input, output, kind)
    }
}
