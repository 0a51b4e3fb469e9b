//! Data Models
//!
//! Result types produced by an analysis run.

pub mod analysis;

pub use analysis::*;
