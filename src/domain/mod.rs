//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the observation record and its fixed feature layout
//! - fitted normalization state (`NormalizationState`, `FeatureRange`)
//! - forecast horizons and result types
//! - training configuration and diagnostics

pub mod types;

pub use types::*;
