//! Drift Core
//!
//! Shared data model, configuration and error types for the drift
//! detection engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
