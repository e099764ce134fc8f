//! Data acquisition: live market quotes and synthetic histories.

pub mod feed;
pub mod sample;

pub use feed::*;
pub use sample::*;
