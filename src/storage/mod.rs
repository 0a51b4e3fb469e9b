//! Storage Layer
//!
//! JSON configuration loading. Analyses themselves are never persisted.

pub mod config;

pub use config::*;
