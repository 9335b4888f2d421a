//! # N-Body Simulation
//!
//! Simulators that advance an N-body dataset on a single CPU thread, a rayon
//! worker pool or a wgpu compute device, and the facade that owns one of them
//! and hot-swaps backends without losing the dataset.

pub mod backend;
pub mod cpu;
pub mod devices;
pub mod error;
pub mod facade;
pub mod gpu;
pub mod meter;
pub mod params;
pub mod simulation;

pub use devices::*;
pub use error::*;
pub use facade::*;
pub use meter::*;
pub use params::*;
pub use simulation::*;
