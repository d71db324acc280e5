//! Frequency-domain validation on a two-DOF tuned mass damper
//!
//! Primary: 1 kg, c = 0.1, tuned to 1 Hz. Absorber: 0.1 kg, c = 0.001,
//! tuned to 1 Hz. The driving-point receptance of the primary mass has two
//! resonances around 1 Hz and an anti-resonance at the absorber frequency
//! between them.

use msd_solver::{
    FrequencyAnalyzer, MassSpringDamperSimulation, MechanicalSystem, NativeBackend, Oscillator,
    OutputKind, SimulationConfig, anti_resonance, single_dof_magnitude, state_space_transfer,
};
use std::f64::consts::PI;

fn primary() -> Oscillator {
    Oscillator::tuned(1.0, 0.1, 1.0)
}

fn tmd_system() -> MechanicalSystem {
    MechanicalSystem::tuned_mass_damper(primary(), Oscillator::tuned(0.1, 0.001, 1.0))
        .expect("valid TMD system")
}

fn frequency_grid(min: f64, max: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| min + (max - min) * i as f64 / (count - 1) as f64)
        .collect()
}

#[test]
fn test_tmd_resonances_and_anti_resonance() {
    let system = tmd_system();
    let analyzer = FrequencyAnalyzer::new(&system, &NativeBackend);

    let resonances = analyzer.resonance_frequencies();
    println!("resonances: {:?}", resonances);
    assert_eq!(resonances.len(), 2, "two DOFs give two resonances");

    // Equal tuning, mass ratio μ = 0.1: (f/f₀)² = 1 + μ/2 ± sqrt(μ + μ²/4)
    let mu: f64 = 0.1;
    let spread = (mu + mu * mu / 4.0).sqrt();
    let f_low = (1.0 + mu / 2.0 - spread).sqrt();
    let f_high = (1.0 + mu / 2.0 + spread).sqrt();
    assert!((resonances[0] - f_low).abs() < 1e-9, "{} vs {}", resonances[0], f_low);
    assert!((resonances[1] - f_high).abs() < 1e-9, "{} vs {}", resonances[1], f_high);

    let freqs = frequency_grid(0.5, 1.5, 2001);
    let bode = analyzer.bode_response(&freqs, 0, 0).unwrap();
    assert_eq!(bode.len(), freqs.len());
    assert!(bode.magnitude.iter().all(|m| m.is_some()), "damped system has no gaps");

    let anti = anti_resonance(&freqs, &bode.magnitude, &resonances, 0.0, 10.0)
        .expect("anti-resonance between the two peaks");
    println!("anti-resonance: {:.4} Hz", anti);
    assert!(anti > resonances[0] && anti < resonances[1]);
    assert!((anti - 1.0).abs() < 0.01, "anti-resonance {} should sit near 1 Hz", anti);
}

#[test]
fn test_tmd_reduces_peak_response() {
    let system = tmd_system();
    let analyzer = FrequencyAnalyzer::new(&system, &NativeBackend);

    let freqs = frequency_grid(0.5, 1.5, 2001);
    let with_tmd = analyzer.bode_response(&freqs, 0, 0).unwrap();
    let without_tmd = single_dof_magnitude(&freqs, primary());

    let at_one_hz = freqs.iter().position(|&f| (f - 1.0).abs() < 1e-12).unwrap();
    let bare = without_tmd[at_one_hz].unwrap();
    let damped = with_tmd.magnitude[at_one_hz].unwrap();
    println!("|H(1 Hz)| without TMD {:.4}, with TMD {:.4}", bare, damped);
    assert!(damped < 0.1 * bare);
}

#[test]
fn test_bode_is_idempotent() {
    let sim = MassSpringDamperSimulation::with_system(tmd_system(), SimulationConfig::default())
        .unwrap();
    let freqs = frequency_grid(0.1, 3.0, 300);

    let first = sim.analyzer().bode_response(&freqs, 1, 0).unwrap();
    let second = sim.analyzer().bode_response(&freqs, 1, 0).unwrap();
    assert_eq!(first, second);

    let phase = sim.analyzer().bode_data(&freqs, 1, "phase", 0).unwrap();
    assert_eq!(phase, first.phase);
    for p in phase.iter().flatten() {
        assert!(*p > -180.0 - 1e-9 && *p <= 180.0 + 1e-9, "phase {} not wrapped", p);
    }
}

#[test]
fn test_modal_frequencies_match_resonances() {
    let sim = MassSpringDamperSimulation::with_system(tmd_system(), SimulationConfig::default())
        .unwrap();
    let modal = sim.modal().expect("eigen data should be available");
    let resonances = sim.analyzer().resonance_frequencies();

    let natural = modal.natural_frequencies_hz();
    assert_eq!(natural.len(), 2);
    for (f_modal, f_res) in natural.iter().zip(resonances.iter()) {
        // Light damping shifts |λ|/2π only slightly from the undamped value
        assert!((f_modal - f_res).abs() < 5e-3, "{} vs {}", f_modal, f_res);
    }
    assert!(modal.is_stable(1e-9));
    assert!(modal.damping_ratios().iter().all(|&z| z > 0.0 && z < 0.1));
}

#[test]
fn test_state_space_transfer_agrees_with_bode() {
    let system = tmd_system();
    let sim =
        MassSpringDamperSimulation::with_system(system.clone(), SimulationConfig::default())
            .unwrap();
    let analyzer = FrequencyAnalyzer::new(&system, &NativeBackend);

    for f in [0.3, 0.9, 1.0, 1.2, 2.0] {
        let bode = analyzer.bode_response(&[f], 0, 0).unwrap();
        let tf = state_space_transfer(
            sim.model(),
            &NativeBackend,
            2.0 * PI * f,
            0,
            0,
            OutputKind::Position,
        )
        .unwrap();
        let mag = bode.magnitude[0].unwrap();
        assert!((tf.magnitude - mag).abs() < 1e-9 * mag.max(1.0), "f = {}", f);
        assert!((tf.phase_rad.to_degrees() - bode.phase[0].unwrap()).abs() < 1e-6);
    }
}
