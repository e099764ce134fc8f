//! Feature preparation: unit-jump correction, min/max scaling, and
//! supervised window construction.

pub mod normalize;
pub mod windows;

pub use normalize::*;
pub use windows::*;
