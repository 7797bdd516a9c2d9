//! Reduction policy and pyramid construction.
//!
//! Oversized images are first brought under a pixel budget by plain stride
//! subsampling ([`ReductionDecision`]); the pyramid is then built on that base
//! by repeated smoothed halving ([`Pyramid`]).

mod builder;
mod reduction;

pub use builder::{level_dimensions, Pyramid, DEFAULT_MIN_SIZE};
pub use reduction::{reduction_factor, ReductionDecision};
