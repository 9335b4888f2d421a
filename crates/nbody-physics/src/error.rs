//! Configuration and dataset validation errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("body count must be greater than zero")]
    NoBodies,

    #[error("time step must be positive and finite, got {0}")]
    TimeStep(f32),

    #[error("softening length must be positive and finite, got {0}")]
    Softening(f32),

    #[error("damping must lie in (0, 1], got {0}")]
    Damping(f32),

    #[error("{name} is out of range: {value}")]
    Scale { name: &'static str, value: f32 },

    #[error("body {index} has invalid mass {mass}")]
    Mass { index: usize, mass: f32 },

    #[error("buffer holds {actual} floats, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("buffer length {len} is not a multiple of {stride}")]
    Stride { len: usize, stride: usize },

    #[error("range {min}..{max} is not within 0..{count}")]
    Range { min: usize, max: usize, count: usize },

    #[error("random distribution bounds {min}..{max} are invalid")]
    Distribution { min: f32, max: f32 },
}
