//! Tick-driven time-domain simulation of a mass-spring-damper system.
//!
//! The host calls [`MassSpringDamperSimulation::step`] with its own clock
//! (for example once per animation frame). The first call only establishes
//! the baseline; each later call integrates the wall-clock gap since the
//! previous call, clamped to `max_step`, in sub-steps of at most
//! `max_substep`. There is no internal timer: a host stops the simulation by
//! no longer calling `step`.
//!
//! # Example
//!
//! ```no_run
//! use msd_solver::{
//!     Amplitude, ForceConfig, MassSpringDamperSimulation, MechanicalSystem, Oscillator,
//!     SimulationConfig,
//! };
//!
//! # fn example() -> msd_solver::Result<()> {
//! let system = MechanicalSystem::single_dof(Oscillator::tuned(1.0, 0.1, 1.0))?;
//! let mut sim = MassSpringDamperSimulation::with_system(system, SimulationConfig::default())?;
//! sim.set_force(ForceConfig::sine(Amplitude::Uniform(1.0), 1.0))?;
//!
//! for frame in 0..60 {
//!     let out = sim.step(frame as f64 / 60.0);
//!     println!("x = {:.4}", out.position[0]);
//! }
//! # Ok(())
//! # }
//! ```

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::backend::{LinearAlgebra, default_backend};
use crate::config::SimulationConfig;
use crate::error::{MsdError, Result};
use crate::force::ForceConfig;
use crate::frequency::FrequencyAnalyzer;
use crate::integrator::integrate;
use crate::mechanical::MechanicalSystem;
use crate::state_space::{ModalData, OutputKind, StateSpaceModel};

/// Positions and velocities after a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub position: DVector<f64>,
    pub velocity: DVector<f64>,
}

/// Stateful simulator owning the mechanical system, its state-space model
/// and the `[v; x]` state vector.
pub struct MassSpringDamperSimulation {
    backend: Box<dyn LinearAlgebra>,
    config: SimulationConfig,
    system: MechanicalSystem,
    model: StateSpaceModel,
    state: DVector<f64>,
    force: ForceConfig,
    last_step_time: Option<f64>,
    elapsed: f64,
}

impl std::fmt::Debug for MassSpringDamperSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MassSpringDamperSimulation")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("num_dofs", &self.num_dofs())
            .field("state", &self.state)
            .field("force", &self.force)
            .field("last_step_time", &self.last_step_time)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl MassSpringDamperSimulation {
    /// Create an unconfigured simulation (zero degrees of freedom).
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_backend(MechanicalSystem::empty(), config, default_backend())
    }

    /// Create a simulation at rest for `system`.
    ///
    /// # Errors
    /// - `MsdError::Configuration` if `config` is invalid
    /// - `MsdError::SingularMatrix` if the mass matrix is not invertible
    pub fn with_system(system: MechanicalSystem, config: SimulationConfig) -> Result<Self> {
        Self::with_backend(system, config, default_backend())
    }

    /// Create a simulation using a specific linear algebra backend.
    pub fn with_backend(
        system: MechanicalSystem,
        config: SimulationConfig,
        backend: Box<dyn LinearAlgebra>,
    ) -> Result<Self> {
        config.validate()?;
        let model = StateSpaceModel::build(&system, backend.as_ref())?;
        let state = DVector::zeros(model.state_len());
        Ok(Self {
            backend,
            config,
            system,
            model,
            state,
            force: ForceConfig::None,
            last_step_time: None,
            elapsed: 0.0,
        })
    }

    pub fn num_dofs(&self) -> usize {
        self.system.num_dofs()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn system(&self) -> &MechanicalSystem {
        &self.system
    }

    pub fn model(&self) -> &StateSpaceModel {
        &self.model
    }

    /// Raw `[v; x]` state vector.
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    pub fn force(&self) -> &ForceConfig {
        &self.force
    }

    /// Simulated time since the last (re)initialization.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Eigen data of the state matrix, `None` when unavailable.
    pub fn modal(&self) -> Option<&ModalData> {
        self.model.modal()
    }

    /// Frequency-domain analyzer over the current matrices.
    pub fn analyzer(&self) -> FrequencyAnalyzer<'_> {
        FrequencyAnalyzer::new(&self.system, self.backend.as_ref())
    }

    /// Replace the mass matrix. The size must stay the same.
    ///
    /// On error nothing changes: the previous matrices and model stay valid.
    pub fn set_mass_matrix(&mut self, mass: DMatrix<f64>) -> Result<()> {
        let candidate = self.system.with_mass(mass)?;
        self.commit(candidate)
    }

    /// Replace the damping matrix. The size must stay the same.
    pub fn set_damping_matrix(&mut self, damping: DMatrix<f64>) -> Result<()> {
        let candidate = self.system.with_damping(damping)?;
        self.commit(candidate)
    }

    /// Replace the stiffness matrix. The size must stay the same.
    pub fn set_stiffness_matrix(&mut self, stiffness: DMatrix<f64>) -> Result<()> {
        let candidate = self.system.with_stiffness(stiffness)?;
        self.commit(candidate)
    }

    /// Replace all three matrices at once; the number of DOFs may change.
    ///
    /// When it does, the state is reset to rest and the clocks restart.
    pub fn set_matrices(
        &mut self,
        mass: DMatrix<f64>,
        damping: DMatrix<f64>,
        stiffness: DMatrix<f64>,
    ) -> Result<()> {
        let candidate = MechanicalSystem::new(mass, damping, stiffness)?;
        let n = candidate.num_dofs();
        if n != self.num_dofs() && n > 0 {
            self.force.validate(n).map_err(|err| {
                MsdError::config(format!("Current force does not fit the resized system: {}", err))
            })?;
        }
        self.commit(candidate)
    }

    fn commit(&mut self, candidate: MechanicalSystem) -> Result<()> {
        let model = StateSpaceModel::build(&candidate, self.backend.as_ref())?;
        let resized = model.num_dofs() != self.model.num_dofs();

        self.system = candidate;
        self.model = model;
        if resized {
            debug!(dofs = self.num_dofs(), "system resized, state reset");
            self.state = DVector::zeros(self.model.state_len());
            self.last_step_time = None;
            self.elapsed = 0.0;
        }
        Ok(())
    }

    /// Replace the force configuration.
    ///
    /// # Errors
    /// `MsdError::Configuration` if a per-DOF amplitude does not match the
    /// number of DOFs or a parameter is not finite.
    pub fn set_force(&mut self, force: ForceConfig) -> Result<()> {
        if self.num_dofs() > 0 {
            force.validate(self.num_dofs())?;
        }
        self.force = force;
        Ok(())
    }

    /// Force vector at the current simulated time.
    pub fn current_force(&self) -> DVector<f64> {
        self.force
            .force_at_time(self.elapsed, self.num_dofs(), self.config.impulse_window)
    }

    /// Reset the state to the given initial conditions (`None` = at rest)
    /// and restart both the wall-clock baseline and the simulated clock.
    pub fn reinitialize(
        &mut self,
        positions: Option<&[f64]>,
        velocities: Option<&[f64]>,
    ) -> Result<()> {
        let n = self.num_dofs();
        let to_vector = |name: &str, values: Option<&[f64]>| -> Result<DVector<f64>> {
            match values {
                None => Ok(DVector::zeros(n)),
                Some(v) if v.len() != n => Err(MsdError::config(format!(
                    "{} has {} entries but the system has {} degrees of freedom",
                    name,
                    v.len(),
                    n
                ))),
                Some(v) if v.iter().any(|x| !x.is_finite()) => Err(MsdError::config(format!(
                    "{} must be finite",
                    name
                ))),
                Some(v) => Ok(DVector::from_column_slice(v)),
            }
        };
        let position = to_vector("Initial positions", positions)?;
        let velocity = to_vector("Initial velocities", velocities)?;

        self.state = self.model.encode(&position, &velocity);
        self.last_step_time = None;
        self.elapsed = 0.0;
        Ok(())
    }

    /// Current positions and velocities, decoded through C_out.
    pub fn output(&self) -> StepOutput {
        let (position, velocity) = self.model.decode(&self.state);
        StepOutput { position, velocity }
    }

    /// Advance to wall-clock time `wall_time` and return the new output.
    ///
    /// The first call after construction or reinitialization only records
    /// the baseline. A clock that runs backwards counts as no elapsed time.
    pub fn step(&mut self, wall_time: f64) -> StepOutput {
        let dt = match self.last_step_time {
            Some(last) if wall_time.is_finite() => (wall_time - last).max(0.0),
            _ => 0.0,
        };
        if wall_time.is_finite() {
            self.last_step_time = Some(wall_time);
        }
        self.advance(dt)
    }

    /// Advance the simulated clock by `dt` (clamped to `max_step`).
    pub fn advance(&mut self, dt: f64) -> StepOutput {
        if self.num_dofs() == 0 {
            return self.output();
        }

        let mut dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        if dt > self.config.max_step {
            debug!(dt, max_step = self.config.max_step, "clamping large time step");
            dt = self.config.max_step;
        }
        if dt == 0.0 {
            return self.output();
        }

        let n = self.num_dofs();
        let model = &self.model;
        let force = &self.force;
        let window = self.config.impulse_window;
        let rhs = |t: f64, s: &DVector<f64>| model.derivative(s, &force.force_at_time(t, n, window));

        let outcome = integrate(&rhs, self.elapsed, &self.state, dt, &self.config);
        trace!(
            dt,
            accepted = outcome.accepted_steps,
            rejected = outcome.rejected_steps,
            "integrated tick"
        );

        self.state = outcome.state;
        self.elapsed += dt;
        self.output()
    }

    /// Integrate a copy of the current state across `times` and return the
    /// selected DOF's samples. The live state is left untouched.
    ///
    /// The first sample is the current state; the force is evaluated on the
    /// `times` axis.
    ///
    /// # Errors
    /// `MsdError::Configuration` if `which_mass` is out of range or `times`
    /// is not a finite, non-decreasing grid.
    pub fn time_history(
        &self,
        times: &[f64],
        which_mass: usize,
        kind: OutputKind,
    ) -> Result<Vec<f64>> {
        let n = self.num_dofs();
        if n == 0 || times.is_empty() {
            return Ok(Vec::new());
        }
        if which_mass >= n {
            return Err(MsdError::config(format!(
                "Mass index {} out of range for {} degrees of freedom",
                which_mass, n
            )));
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(MsdError::config(format!(
                "Time grid entries must be finite, got {}",
                t
            )));
        }

        let model = &self.model;
        let force = &self.force;
        let window = self.config.impulse_window;
        let rhs = |t: f64, s: &DVector<f64>| model.derivative(s, &force.force_at_time(t, n, window));
        let index = model.state_index(which_mass, kind);

        let mut state = self.state.clone();
        let mut samples = Vec::with_capacity(times.len());
        samples.push(state[index]);
        for pair in times.windows(2) {
            let dt = pair[1] - pair[0];
            if !(dt >= 0.0) {
                return Err(MsdError::config(format!(
                    "Time grid must be non-decreasing, got {} after {}",
                    pair[1], pair[0]
                )));
            }
            state = integrate(&rhs, pair[0], &state, dt, &self.config).state;
            samples.push(state[index]);
        }
        Ok(samples)
    }

    /// [`time_history`](Self::time_history) with the output kind given by
    /// name (`"position"` or `"velocity"`).
    pub fn time_history_by_name(
        &self,
        times: &[f64],
        which_mass: usize,
        kind: &str,
    ) -> Result<Vec<f64>> {
        let kind: OutputKind = kind.parse()?;
        self.time_history(times, which_mass, kind)
    }
}
