//! External forcing f(t).
//!
//! Each force type carries only the fields it needs. The force vector has
//! one entry per DOF and is applied through the state-space input matrix.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{MsdError, Result};

/// Force amplitude: the same value on every DOF, or one value per DOF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amplitude {
    Uniform(f64),
    PerDof(Vec<f64>),
}

impl Default for Amplitude {
    fn default() -> Self {
        Amplitude::Uniform(1.0)
    }
}

impl Amplitude {
    /// Amplitude vector for an `n`-DOF system.
    ///
    /// A `PerDof` amplitude shorter than `n` is zero-padded; callers that
    /// need strictness use [`validate`](Self::validate) first.
    pub fn vector(&self, n: usize) -> DVector<f64> {
        match self {
            Amplitude::Uniform(value) => DVector::from_element(n, *value),
            Amplitude::PerDof(values) => {
                DVector::from_fn(n, |i, _| values.get(i).copied().unwrap_or(0.0))
            }
        }
    }

    /// Check the amplitude against an `n`-DOF system.
    pub fn validate(&self, n: usize) -> Result<()> {
        match self {
            Amplitude::Uniform(value) if !value.is_finite() => Err(MsdError::config(
                "Force amplitude must be finite",
            )),
            Amplitude::PerDof(values) if values.len() != n => Err(MsdError::config(format!(
                "Force amplitude has {} entries but the system has {} degrees of freedom",
                values.len(),
                n
            ))),
            Amplitude::PerDof(values) if values.iter().any(|v| !v.is_finite()) => Err(
                MsdError::config("Force amplitude entries must be finite"),
            ),
            _ => Ok(()),
        }
    }
}

/// Raised-cosine fade-in applied to a sine force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SineRamp {
    /// Time at which the ramp starts
    #[serde(default)]
    pub start: f64,
    /// Time the ramp takes to reach full amplitude
    pub duration: f64,
}

impl SineRamp {
    /// 0 before `start`, 0.5·(1 − cos(π·elapsed/duration)) while ramping,
    /// 1 afterwards. A non-positive or non-finite duration disables the ramp.
    pub fn scale(&self, t: f64) -> f64 {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return 1.0;
        }
        let start = if self.start.is_finite() { self.start } else { 0.0 };
        let elapsed = t - start;
        if elapsed <= 0.0 {
            0.0
        } else if elapsed < self.duration {
            0.5 * (1.0 - (PI * elapsed / self.duration).cos())
        } else {
            1.0
        }
    }
}

/// Configuration of the external force.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ForceConfig {
    /// No external force.
    #[default]
    None,
    /// Constant force inside `[onset, release]`; a missing bound is open.
    Step {
        #[serde(default)]
        amplitude: Amplitude,
        #[serde(default)]
        onset: Option<f64>,
        #[serde(default)]
        release: Option<f64>,
    },
    /// Near-Dirac pulse active only within the impulse window around `at`.
    Impulse {
        #[serde(default)]
        amplitude: Amplitude,
        at: f64,
    },
    /// amplitude · sin(2π·f·t) · ramp(t)
    Sine {
        #[serde(default)]
        amplitude: Amplitude,
        frequency_hz: f64,
        #[serde(default)]
        ramp: Option<SineRamp>,
    },
}

impl ForceConfig {
    pub fn step(amplitude: Amplitude, onset: f64) -> Self {
        ForceConfig::Step {
            amplitude,
            onset: Some(onset),
            release: None,
        }
    }

    pub fn impulse(amplitude: Amplitude, at: f64) -> Self {
        ForceConfig::Impulse { amplitude, at }
    }

    pub fn sine(amplitude: Amplitude, frequency_hz: f64) -> Self {
        ForceConfig::Sine {
            amplitude,
            frequency_hz,
            ramp: None,
        }
    }

    pub fn amplitude(&self) -> Option<&Amplitude> {
        match self {
            ForceConfig::None => None,
            ForceConfig::Step { amplitude, .. }
            | ForceConfig::Impulse { amplitude, .. }
            | ForceConfig::Sine { amplitude, .. } => Some(amplitude),
        }
    }

    /// Check the configuration against an `n`-DOF system.
    pub fn validate(&self, n: usize) -> Result<()> {
        if let Some(amplitude) = self.amplitude() {
            amplitude.validate(n)?;
        }
        match self {
            ForceConfig::Sine { frequency_hz, .. } if !frequency_hz.is_finite() => {
                Err(MsdError::config("Sine force frequency must be finite"))
            }
            ForceConfig::Impulse { at, .. } if !at.is_finite() => {
                Err(MsdError::config("Impulse time must be finite"))
            }
            _ => Ok(()),
        }
    }

    /// Force vector (length `n`) at time `t`.
    pub fn force_at_time(&self, t: f64, n: usize, impulse_window: f64) -> DVector<f64> {
        match self {
            ForceConfig::None => DVector::zeros(n),
            ForceConfig::Step {
                amplitude,
                onset,
                release,
            } => {
                let after_onset = onset.is_none_or(|t1| t >= t1);
                let before_release = release.is_none_or(|t2| t <= t2);
                if after_onset && before_release {
                    amplitude.vector(n)
                } else {
                    DVector::zeros(n)
                }
            }
            ForceConfig::Impulse { amplitude, at } => {
                if (t - at).abs() < impulse_window {
                    amplitude.vector(n)
                } else {
                    DVector::zeros(n)
                }
            }
            ForceConfig::Sine {
                amplitude,
                frequency_hz,
                ramp,
            } => {
                let ramp_scale = ramp.map_or(1.0, |r| r.scale(t));
                let scaled = (2.0 * PI * frequency_hz * t).sin() * ramp_scale;
                amplitude.vector(n) * scaled
            }
        }
    }
}
