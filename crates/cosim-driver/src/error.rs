//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Error taxonomy for the co-simulation driver."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use cosim_engine::EngineError;
use thiserror::Error;

use crate::state::DriverState;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid driver transition from {from} to {to}")]
    InvalidTransition { from: DriverState, to: DriverState },
    #[error("invalid driver configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("telemetry recorder failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to serialise run report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Whether the run failed because the engine library could not be located.
    pub fn is_library_not_found(&self) -> bool {
        matches!(self, DriverError::Engine(err) if err.is_library_not_found())
    }
}
