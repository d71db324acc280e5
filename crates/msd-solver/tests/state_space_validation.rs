//! Analytical validation of the time-domain simulator
//!
//! Test cases:
//! 1. Undamped 1 Hz oscillator released from x = 1 - validates position at
//!    quarter and half period for both integration schemes
//! 2. Undamped eigenvalues - validates ±jωₙ
//! 3. Damped free decay - validates the logarithmic decrement
//! 4. Step-size clamping - validates simulated time against wall time
//! 5. Singular mass - validates construction and setter rejection
//! 6. Impulse force - validates the impulse window on the frame clock

use msd_solver::{
    Amplitude, ForceConfig, IntegrationMethod, MassSpringDamperSimulation, MechanicalSystem,
    MsdError, Oscillator, OutputKind, SimulationConfig,
};
use nalgebra::DMatrix;
use std::f64::consts::PI;

const FRAME: f64 = 1.0 / 60.0;

fn one_hz_oscillator(config: SimulationConfig) -> MassSpringDamperSimulation {
    let system = MechanicalSystem::single_dof(Oscillator::tuned(1.0, 0.0, 1.0))
        .expect("valid single DOF system");
    let mut sim = MassSpringDamperSimulation::with_system(system, config)
        .expect("simulation should build");
    sim.reinitialize(Some(&[1.0]), None).expect("valid initial state");
    sim
}

/// Drive the simulation with 60 Hz frame times and record (elapsed, x).
fn run_frames(sim: &mut MassSpringDamperSimulation, frames: usize) -> Vec<(f64, f64)> {
    let mut trace = Vec::with_capacity(frames + 1);
    for i in 0..=frames {
        let out = sim.step(i as f64 * FRAME);
        trace.push((sim.elapsed(), out.position[0]));
    }
    trace
}

/// Test 1a: x(t) = cos(2πt), RK4 driven by animation frames
///
/// Expected: x(0.25) ≈ 0, x(0.5) ≈ −1 within 0.02
#[test]
fn test_one_hz_oscillator_rk4() {
    let mut sim = one_hz_oscillator(SimulationConfig::default());
    let trace = run_frames(&mut sim, 30);

    let (t_quarter, x_quarter) = trace[15];
    let (t_half, x_half) = trace[30];
    println!("RK4: x({:.4}) = {:.6}, x({:.4}) = {:.6}", t_quarter, x_quarter, t_half, x_half);

    assert!((t_half - 0.5).abs() < 1e-12, "elapsed should follow wall time");
    assert!(x_quarter.abs() < 0.02, "x(0.25) = {} should be ~0", x_quarter);
    assert!((x_half + 1.0).abs() < 0.02, "x(0.5) = {} should be ~-1", x_half);

    for (t, x) in &trace {
        let exact = (2.0 * PI * t).cos();
        assert!((x - exact).abs() < 1e-3, "x({}) = {} vs {}", t, x, exact);
    }
}

/// Test 1b: same scenario with the adaptive scheme
///
/// Expected: agreement with cos(2πt) within 1e-5
#[test]
fn test_one_hz_oscillator_dormand_prince() {
    let config = SimulationConfig {
        method: IntegrationMethod::DormandPrince,
        ..Default::default()
    };
    let mut sim = one_hz_oscillator(config);
    let trace = run_frames(&mut sim, 30);

    let (_, x_quarter) = trace[15];
    let (_, x_half) = trace[30];
    println!("DP45: x(0.25) = {:.3e}, x(0.5) = {:.8}", x_quarter, x_half);

    assert!(x_quarter.abs() < 1e-5, "x(0.25) = {}", x_quarter);
    assert!((x_half + 1.0).abs() < 1e-5, "x(0.5) = {}", x_half);
}

/// Test 1c: one large tick equals many small ticks up to integration error
#[test]
fn test_single_long_tick_matches_frames() {
    let mut frames = one_hz_oscillator(SimulationConfig::default());
    let mut single = one_hz_oscillator(SimulationConfig::default());

    run_frames(&mut frames, 30);
    single.step(0.0);
    let out = single.step(0.5);

    // five 0.1 s sub-steps against thirty frame-sized ones
    let diff = (out.position[0] - frames.output().position[0]).abs();
    assert!(diff < 5e-3, "long tick deviates by {}", diff);
}

/// Test 2: undamped eigenvalues are ±jωₙ
#[test]
fn test_undamped_eigenvalues() {
    let sim = one_hz_oscillator(SimulationConfig::default());
    let modal = sim.modal().expect("eigen data should be available");
    let omega_n = 2.0 * PI;

    assert_eq!(modal.eigenvalues.len(), 2);
    let mut imag: Vec<f64> = modal.eigenvalues.iter().map(|l| l.im).collect();
    imag.sort_by(f64::total_cmp);
    for lambda in &modal.eigenvalues {
        assert!(lambda.re.abs() < 1e-9, "Re(λ) = {}", lambda.re);
    }
    assert!((imag[0] + omega_n).abs() < 1e-9, "λ₁ = {}", imag[0]);
    assert!((imag[1] - omega_n).abs() < 1e-9, "λ₂ = {}", imag[1]);
}

/// Test 3: logarithmic decrement of a lightly damped oscillator
///
/// For ζ = 0.05, successive peaks one damped period apart shrink by
/// exp(−2πζ/√(1−ζ²)).
#[test]
fn test_damped_free_decay() {
    let zeta: f64 = 0.05;
    let omega_n = 2.0 * PI;
    let system = MechanicalSystem::single_dof(Oscillator {
        mass: 1.0,
        damping: 2.0 * zeta * omega_n,
        stiffness: omega_n * omega_n,
    })
    .unwrap();
    let config = SimulationConfig {
        method: IntegrationMethod::DormandPrince,
        ..Default::default()
    };
    let mut sim = MassSpringDamperSimulation::with_system(system, config).unwrap();

    let omega_d = omega_n * (1.0 - zeta * zeta).sqrt();
    let period = 2.0 * PI / omega_d;
    let times: Vec<f64> = (0..=200).map(|i| i as f64 * period / 100.0).collect();

    sim.reinitialize(Some(&[1.0]), Some(&[-zeta * omega_n])).unwrap();
    let x = sim.time_history(&times, 0, OutputKind::Position).unwrap();

    let ratio = x[200] / x[100];
    let expected = (-2.0 * PI * zeta / (1.0 - zeta * zeta).sqrt()).exp();
    println!("decay ratio {:.6}, expected {:.6}", ratio, expected);
    assert!((x[100] / x[0] - expected).abs() < 1e-5);
    assert!((ratio - expected).abs() < 1e-5);
}

/// Test 4: wall-clock gaps beyond `max_step` are clamped
#[test]
fn test_step_clamping_boundary() {
    let mut sim = one_hz_oscillator(SimulationConfig::default());
    sim.step(100.0);
    assert_eq!(sim.elapsed(), 0.0, "first call only sets the baseline");

    sim.step(110.0);
    assert!((sim.elapsed() - 10.0).abs() < 1e-12, "gap equal to max_step is kept");

    sim.step(150.0);
    assert!((sim.elapsed() - 20.0).abs() < 1e-12, "gap above max_step is clamped");

    let out = sim.step(150.0);
    assert!((sim.elapsed() - 20.0).abs() < 1e-12);
    assert!(out.position[0].is_finite());
}

/// Test 4b: a step force evaluated on the simulated clock
///
/// Under a unit step the undamped 1 Hz oscillator starting at rest
/// follows x = (1 − cos ωt)/k.
#[test]
fn test_step_response() {
    let system = MechanicalSystem::single_dof(Oscillator::tuned(1.0, 0.0, 1.0)).unwrap();
    let k = system.stiffness()[(0, 0)];
    let mut sim = MassSpringDamperSimulation::with_system(system, SimulationConfig::default())
        .unwrap();
    sim.set_force(ForceConfig::step(Amplitude::Uniform(1.0), 0.0))
        .unwrap();

    let trace = run_frames(&mut sim, 30);
    let (t, x) = trace[30];
    let exact = (1.0 - (2.0 * PI * t).cos()) / k;
    assert!((x - exact).abs() < 1e-4 * exact.abs().max(1.0), "x({}) = {} vs {}", t, x, exact);
}

/// Test 5: a singular mass matrix is rejected and leaves no model behind
#[test]
fn test_singular_mass_rejected() {
    let singular = MechanicalSystem::from_row_major(
        2,
        &[1.0, 1.0, 1.0, 1.0],
        &[0.0; 4],
        &[1.0, 0.0, 0.0, 1.0],
    )
    .expect("shapes are valid");

    let err = MassSpringDamperSimulation::with_system(singular, SimulationConfig::default())
        .expect_err("singular mass must fail");
    assert!(matches!(err, MsdError::SingularMatrix(_)), "got {:?}", err);

    let mut sim = one_hz_oscillator(SimulationConfig::default());
    let before = sim.model().clone();
    let err = sim
        .set_matrices(
            DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]),
            DMatrix::zeros(2, 2),
            DMatrix::identity(2, 2),
        )
        .expect_err("singular mass must fail");
    assert!(matches!(err, MsdError::SingularMatrix(_)));
    assert_eq!(sim.num_dofs(), 1);
    assert_eq!(sim.model(), &before);
    assert_eq!(sim.output().position[0], 1.0);
}

fn at_rest_with_impulse(impulse_window: f64) -> MassSpringDamperSimulation {
    let system = MechanicalSystem::single_dof(Oscillator::tuned(1.0, 0.0, 1.0)).unwrap();
    let config = SimulationConfig {
        impulse_window,
        ..Default::default()
    };
    let mut sim = MassSpringDamperSimulation::with_system(system, config).unwrap();
    // 0.105 s falls between the RK4 evaluation points of 60 Hz frames
    sim.set_force(ForceConfig::impulse(Amplitude::Uniform(10.0), 0.105))
        .unwrap();
    sim
}

/// Test 6a: a widened impulse window acts as a 0.1 s rectangular pulse
///
/// A 10 N pulse of duration τ = 0.1 s leaves the 1 Hz oscillator with
/// v ≈ F/(mω)·sin(ωτ) ≈ 0.93 m/s.
#[test]
fn test_impulse_with_widened_window_moves_mass() {
    let mut sim = at_rest_with_impulse(0.05);
    let trace = run_frames(&mut sim, 3);
    assert!(trace.iter().all(|&(_, x)| x == 0.0), "no force before the window opens");

    for i in 4..=12 {
        sim.step(i as f64 * FRAME);
    }
    let out = sim.output();
    println!("after impulse: x = {:.4}, v = {:.4}", out.position[0], out.velocity[0]);
    assert!(out.velocity[0] > 0.5, "v = {}", out.velocity[0]);
    assert!(out.position[0] > 0.02, "x = {}", out.position[0]);
    assert_eq!(sim.current_force()[0], 0.0, "window has closed");
}

/// Test 6b: with the default near-Dirac window the frame clock never lands
/// inside it and the mass stays at rest
#[test]
fn test_impulse_with_default_window_is_missed() {
    let mut sim = at_rest_with_impulse(SimulationConfig::default().impulse_window);
    let trace = run_frames(&mut sim, 30);
    for (t, x) in &trace {
        assert_eq!(*x, 0.0, "x({}) moved", t);
    }
    assert_eq!(sim.output().velocity[0], 0.0);
}

/// Configuration loaded from JSON drives the simulator
#[test]
fn test_json_configured_simulation() {
    let config = SimulationConfig::from_json_str(
        r#"{"method": "dormand_prince", "max_step": 0.25, "tolerance": 1e-10}"#,
    )
    .unwrap();
    let force: ForceConfig = serde_json::from_str(r#"{"type": "none"}"#).unwrap();

    let mut sim = one_hz_oscillator(config);
    sim.set_force(force).unwrap();
    sim.step(0.0);
    let out = sim.step(1.0);

    assert!((sim.elapsed() - 0.25).abs() < 1e-12);
    assert!(out.position[0].abs() < 1e-6, "x(0.25) = {}", out.position[0]);
}
