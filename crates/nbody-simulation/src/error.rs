//! Errors surfaced by simulators and the facade

use nbody_physics::ConfigError;
use thiserror::Error;

use crate::RunState;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(ConfigError),

    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("cannot {operation} while {state}")]
    StateViolation {
        operation: &'static str,
        state: RunState,
    },

    #[error("out of resources: {0}")]
    ResourceExhaustion(String),

    #[error("device error: {0}")]
    Device(String),
}

impl From<ConfigError> for SimulationError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::BufferSize { expected, actual } => {
                SimulationError::SizeMismatch { expected, actual }
            }
            other => SimulationError::InvalidConfig(other),
        }
    }
}

impl SimulationError {
    /// Errors after which the caller may retry with a different backend.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            SimulationError::DeviceUnavailable(_) | SimulationError::ResourceExhaustion(_)
        )
    }
}
