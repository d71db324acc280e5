//! Simulation configuration.
//!
//! All configuration structs derive serde and fill missing fields from
//! their `Default`, so a partial JSON document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::chain::ChainParameter;
use crate::error::{MsdError, Result};

/// ODE scheme used to advance the state between two ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Classic 4th-order Runge-Kutta with equal sub-steps ≤ `max_substep`
    #[default]
    Rk4,
    /// Adaptive Dormand-Prince 5(4) with step size ≤ `max_substep`
    DormandPrince,
}

/// Time-domain simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Largest wall-clock gap integrated in one `step` call; longer pauses
    /// are clamped to this value
    pub max_step: f64,
    /// Largest integration sub-step
    pub max_substep: f64,
    /// Integration scheme
    pub method: IntegrationMethod,
    /// Local error tolerance (adaptive scheme only)
    pub tolerance: f64,
    /// Smallest sub-step the adaptive scheme may shrink to
    pub min_substep: f64,
    /// Half-width of the window in which an impulse force is active
    pub impulse_window: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_step: 10.0,
            max_substep: 0.1,
            method: IntegrationMethod::Rk4,
            tolerance: 1e-8,
            min_substep: 1e-6,
            impulse_window: 1e-6,
        }
    }
}

impl SimulationConfig {
    /// Check that every limit is finite and positive.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("max_step", self.max_step),
            ("max_substep", self.max_substep),
            ("tolerance", self.tolerance),
            ("min_substep", self.min_substep),
            ("impulse_window", self.impulse_window),
        ];
        for (name, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(MsdError::config(format!(
                    "{} must be finite and positive, got {}",
                    name, value
                )));
            }
        }
        if self.min_substep > self.max_substep {
            return Err(MsdError::config(format!(
                "min_substep ({}) exceeds max_substep ({})",
                self.min_substep, self.max_substep
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Settings of the multi-mass chain model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub mass: ChainParameter,
    pub damping: ChainParameter,
    pub stiffness: ChainParameter,
    pub num_masses: usize,
    /// Fixed integration step; longer wall-clock gaps are decimated to it
    pub time_step: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            mass: ChainParameter::Uniform(1.0),
            damping: ChainParameter::Uniform(0.2),
            stiffness: ChainParameter::Uniform(1.0),
            num_masses: 3,
            time_step: 0.02,
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_masses == 0 {
            return Err(MsdError::config("Chain needs at least one mass"));
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(MsdError::config(format!(
                "time_step must be finite and positive, got {}",
                self.time_step
            )));
        }
        self.mass.validate("Mass", false)?;
        self.damping.validate("Damping", true)?;
        self.stiffness.validate("Stiffness", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_step, 10.0);
        assert_eq!(config.max_substep, 0.1);
        assert_eq!(config.method, IntegrationMethod::Rk4);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            SimulationConfig::from_json_str(r#"{"max_step": 0.5, "method": "dormand_prince"}"#)
                .unwrap();
        assert_eq!(config.max_step, 0.5);
        assert_eq!(config.method, IntegrationMethod::DormandPrince);
        assert_eq!(config.max_substep, 0.1);
    }

    #[test]
    fn rejects_non_positive_limits() {
        let err = SimulationConfig::from_json_str(r#"{"max_substep": 0.0}"#).unwrap_err();
        assert!(matches!(err, MsdError::Configuration(_)));

        let err = SimulationConfig::from_json_str(r#"{"max_substep": 0.01, "min_substep": 0.1}"#)
            .unwrap_err();
        assert!(err.to_string().contains("min_substep"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = SimulationConfig::from_json_str("{invalid json").unwrap_err();
        assert!(matches!(err, MsdError::Json(_)));
    }

    #[test]
    fn load_reads_file() {
        let path = unique_temp_file("msd_config_load", "config.json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create temp directory");
        }
        fs::write(&path, r#"{"impulse_window": 0.001}"#).expect("write config");

        let config = SimulationConfig::load(&path).expect("load should succeed");
        assert_eq!(config.impulse_window, 0.001);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let path = unique_temp_file("msd_config_missing", "missing.json");
        let err = SimulationConfig::load(&path).expect_err("missing file should fail");
        match err {
            MsdError::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected I/O error, got {:?}", other),
        }
    }

    #[test]
    fn chain_config_from_json() {
        let config: ChainConfig =
            serde_json::from_str(r#"{"mass": [1.0, 2.0], "num_masses": 2}"#).unwrap();
        assert_eq!(config.mass, ChainParameter::PerElement(vec![1.0, 2.0]));
        assert_eq!(config.damping, ChainParameter::Uniform(0.2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn chain_config_rejects_zero_masses() {
        let config = ChainConfig {
            num_masses: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    fn unique_temp_file(prefix: &str, filename: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("{prefix}_{pid}_{nanos}"))
            .join(filename)
    }
}
