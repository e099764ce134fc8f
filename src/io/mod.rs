//! Input/output: durable state and exports.
//!
//! - CSV observation store with skip-and-report ingest (`store`)
//! - fitted artifact JSON read/write (`artifacts`)
//! - CSV exports for downstream consumption (`export`)

pub mod artifacts;
pub mod export;
pub mod store;

pub use artifacts::*;
pub use export::*;
pub use store::*;
