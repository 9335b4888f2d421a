//! # N-Body Physics
//!
//! Body storage, simulation properties, initial-condition generation and the
//! softened gravity kernel shared by every compute backend.

pub mod body;
pub mod error;
pub mod forces;
pub mod generator;
pub mod properties;

pub use body::*;
pub use error::*;
pub use forces::*;
pub use generator::*;
pub use properties::*;
