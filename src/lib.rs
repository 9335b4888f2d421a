//! # N-Body
//!
//! The engine that drives a simulation facade from a frame loop, and the
//! preferences it is configured from.

pub mod engine;
pub mod preferences;

pub use engine::*;
pub use preferences::*;
