//! Greenlight core crate - shared types, configuration, and errors for the
//! confirmation engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{GreenlightError, Result};
pub use types::*;
