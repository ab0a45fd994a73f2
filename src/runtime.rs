//! Process-level plumbing: configuration, telemetry, the health/metrics
//! HTTP surface, and the runner wiring signal handling.

pub mod config;
pub mod health;
pub mod runner;
pub mod telemetry;

pub use config::{ExporterConfig, ExporterConfigBuilder, ExporterConfigParams};
pub use health::{HealthServer, HealthState};
pub use runner::Runner;
pub use telemetry::{init_tracing, Telemetry};
