//! Mathematical utilities: activation kernels for the network layers.

pub mod activations;

pub use activations::*;
