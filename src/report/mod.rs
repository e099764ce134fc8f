//! Human-readable run summaries and forecast tables.

pub mod format;

pub use format::{format_forecast_table, format_run_summary};
