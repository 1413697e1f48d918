//! ---
//! cosim_section: "02-engine-boundary"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Error taxonomy for engine boundary calls."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no engine library matching '{marker}' found in {}", .directory.display())]
    LibraryNotFound { directory: PathBuf, marker: String },
    #[error("failed to open engine library {}: {source}", .path.display())]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("engine library is missing symbol `{name}`: {source}")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("engine refused to create an instance (max_turbines={max_turbines}, environment_tag={environment_tag})")]
    InstantiationFailed {
        max_turbines: i32,
        environment_tag: i32,
    },
    #[error("engine instance is not available for `{0}`")]
    NoInstance(&'static str),
    #[error("input file {} does not exist", .0.display())]
    InputNotFound(PathBuf),
    #[error("engine initialisation failed: {0}")]
    InitializationFailed(String),
    #[error("string argument contains an interior NUL byte: {0:?}")]
    InvalidString(String),
    #[error("path is not valid UTF-8: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("span position {0} is outside the normalised blade length [0, 1]")]
    InvalidSpan(f64),
    #[error("persistence of {} failed: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error means the engine library itself could not be located.
    pub fn is_library_not_found(&self) -> bool {
        matches!(self, EngineError::LibraryNotFound { .. })
    }
}
