//! ---
//! cosim_section: "01-core-functionality"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Shared primitives and utilities for the driver runtime."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
//! Core shared primitives for the WT-COSIM workspace.
//! This crate exposes configuration loading, tracing setup, and step timing
//! utilities consumed by the driver and the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{
    AppConfig, ChannelConfig, EngineConfig, InputConfig, LoadedAppConfig, LoggingConfig,
    OutputConfig, RunConfig, TelemetryConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{StepTimer, StepTimingHistogram, StepTimingSummary};
