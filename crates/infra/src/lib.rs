//! Infrastructure layer: Postgres adapters, job queue, configuration.

pub mod config;
pub mod jobs;
pub mod postgres;

pub use config::{ConfigError, PipelineConfig};
