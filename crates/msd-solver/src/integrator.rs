//! Explicit Runge-Kutta integration over one tick interval.
//!
//! The right-hand side is any `Fn(t, &state) -> dstate/dt`. Two schemes are
//! available:
//!
//! - **RK4**: the interval is split into equal sub-steps no longer than
//!   `max_substep`.
//! - **Dormand-Prince 5(4)**: adaptive sub-steps from the embedded error
//!   estimate, never longer than `max_substep` and never shorter than
//!   `min_substep`.
//!
//! Both are synchronous and bounded: the number of right-hand-side
//! evaluations is at most proportional to `duration / min_substep`.

use nalgebra::DVector;
use tracing::trace;

use crate::config::{IntegrationMethod, SimulationConfig};

/// Result of integrating across one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationOutcome {
    /// State at the end of the interval
    pub state: DVector<f64>,
    /// Number of accepted sub-steps
    pub accepted_steps: usize,
    /// Number of rejected sub-steps (adaptive scheme only)
    pub rejected_steps: usize,
}

/// One classic RK4 step of size `h` starting at time `t`.
pub fn rk4_step<F>(f: &F, t: f64, state: &DVector<f64>, h: f64) -> DVector<f64>
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    let k1 = f(t, state);
    let k2 = f(t + h / 2.0, &(state + &k1 * (h / 2.0)));
    let k3 = f(t + h / 2.0, &(state + &k2 * (h / 2.0)));
    let k4 = f(t + h, &(state + &k3 * h));
    state + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0)
}

/// Integrate from `t0` over `duration` with the configured scheme.
pub fn integrate<F>(
    f: &F,
    t0: f64,
    state: &DVector<f64>,
    duration: f64,
    config: &SimulationConfig,
) -> IntegrationOutcome
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    if duration.is_nan() || duration <= 0.0 || state.is_empty() {
        return IntegrationOutcome {
            state: state.clone(),
            accepted_steps: 0,
            rejected_steps: 0,
        };
    }

    match config.method {
        IntegrationMethod::Rk4 => integrate_rk4(f, t0, state, duration, config.max_substep),
        IntegrationMethod::DormandPrince => integrate_dormand_prince(f, t0, state, duration, config),
    }
}

fn integrate_rk4<F>(
    f: &F,
    t0: f64,
    state: &DVector<f64>,
    duration: f64,
    max_substep: f64,
) -> IntegrationOutcome
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    let num_steps = ((duration / max_substep).ceil() as usize).max(1);
    let h = duration / num_steps as f64;

    let mut x = state.clone();
    for i in 0..num_steps {
        x = rk4_step(f, t0 + i as f64 * h, &x, h);
    }

    IntegrationOutcome {
        state: x,
        accepted_steps: num_steps,
        rejected_steps: 0,
    }
}

// Dormand-Prince 5(4) tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th order weights (also the last stage, FSAL)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 5th minus 4th order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

fn integrate_dormand_prince<F>(
    f: &F,
    t0: f64,
    state: &DVector<f64>,
    duration: f64,
    config: &SimulationConfig,
) -> IntegrationOutcome
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    let t_end = t0 + duration;
    let tol = config.tolerance;

    let mut t = t0;
    let mut x = state.clone();
    let mut h = config.max_substep.min(duration);
    let mut k1 = f(t, &x);
    let mut accepted = 0usize;
    let mut rejected = 0usize;

    loop {
        let remaining = t_end - t;
        if remaining <= f64::EPSILON * t_end.abs().max(1.0) {
            break;
        }
        h = h.min(remaining).min(config.max_substep);

        let k2 = f(t + C2 * h, &(&x + &k1 * (A21 * h)));
        let k3 = f(t + C3 * h, &(&x + (&k1 * A31 + &k2 * A32) * h));
        let k4 = f(
            t + C4 * h,
            &(&x + (&k1 * A41 + &k2 * A42 + &k3 * A43) * h),
        );
        let k5 = f(
            t + C5 * h,
            &(&x + (&k1 * A51 + &k2 * A52 + &k3 * A53 + &k4 * A54) * h),
        );
        let k6 = f(
            t + h,
            &(&x + (&k1 * A61 + &k2 * A62 + &k3 * A63 + &k4 * A64 + &k5 * A65) * h),
        );
        let x_next = &x + (&k1 * B1 + &k3 * B3 + &k4 * B4 + &k5 * B5 + &k6 * B6) * h;
        let k7 = f(t + h, &x_next);

        let err = (&k1 * E1 + &k3 * E3 + &k4 * E4 + &k5 * E5 + &k6 * E6 + &k7 * E7) * h;
        let err_norm = err
            .iter()
            .zip(x.iter().zip(x_next.iter()))
            .map(|(e, (a, b))| e.abs() / (tol + tol * a.abs().max(b.abs())))
            .fold(0.0_f64, f64::max);

        let at_floor = h <= config.min_substep;
        if err_norm <= 1.0 || at_floor {
            t += h;
            x = x_next;
            k1 = k7;
            accepted += 1;
        } else {
            rejected += 1;
            trace!(t, h, err_norm, "rejected adaptive sub-step");
        }

        let factor = if err_norm > 0.0 && err_norm.is_finite() {
            (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
        } else if err_norm == 0.0 {
            MAX_FACTOR
        } else {
            MIN_FACTOR
        };
        h = (h * factor).clamp(config.min_substep, config.max_substep);
    }

    IntegrationOutcome {
        state: x,
        accepted_steps: accepted,
        rejected_steps: rejected,
    }
}
