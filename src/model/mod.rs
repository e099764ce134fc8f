//! The sequence model: layers, optimizer, and the training loop.

pub mod adam;
pub mod dense;
pub mod lstm;
pub mod network;
pub mod trainer;

pub use adam::*;
pub use dense::*;
pub use lstm::*;
pub use network::*;
pub use trainer::*;
