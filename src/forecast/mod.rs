//! Multi-horizon forecasting.

pub mod forecaster;

pub use forecaster::*;
