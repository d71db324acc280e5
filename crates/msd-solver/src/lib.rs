//! Lumped mass-spring-damper simulation.
//!
//! This crate builds linear state-space models from mass, damping and
//! stiffness matrices and evaluates them in the time domain (tick-driven
//! integration under external forcing) and in the frequency domain (Bode
//! response, resonance and anti-resonance detection, modal data). A lighter
//! fixed-step chain model covers the interactive "push a mass" use case.
//!
//! The state vector is always ordered `[velocity; position]`.

pub mod backend;
pub mod chain;
pub mod config;
pub mod error;
pub mod force;
pub mod frequency;
pub mod integrator;
pub mod mechanical;
pub mod simulation;
pub mod state_space;

pub use backend::{
    BackendError, EigenResult, GeneralizedEigenResult, LinearAlgebra, NativeBackend,
    default_backend,
};
pub use chain::{ChainParameter, MultiMassChain, assemble_chain};
pub use config::{ChainConfig, IntegrationMethod, SimulationConfig};
pub use error::{MsdError, Result};
pub use force::{Amplitude, ForceConfig, SineRamp};
pub use frequency::{
    BodeQuantity, BodeResponse, BodeSample, FrequencyAnalyzer, TransferValue, anti_resonance,
    single_dof_magnitude, state_space_transfer,
};
pub use integrator::{IntegrationOutcome, integrate, rk4_step};
pub use mechanical::{MechanicalSystem, Oscillator};
pub use simulation::{MassSpringDamperSimulation, StepOutput};
pub use state_space::{ModalData, OutputKind, StateSpaceModel};
