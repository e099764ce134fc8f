//! `gold-forecast` library crate.
//!
//! The binary (`goldf`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., future daemon, notebooks, etc.)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod io;
pub mod math;
pub mod model;
pub mod prep;
pub mod report;
