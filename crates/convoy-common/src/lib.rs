//! Common types for convoy: data model, errors, configuration and telemetry

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;
pub mod yaml;

pub use config::ReconcilerConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
