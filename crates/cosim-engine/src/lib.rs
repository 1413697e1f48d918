//! ---
//! cosim_section: "02-engine-boundary"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Engine boundary module exports and shared exchange types."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
//! Narrow, typed interface over the wind-turbine simulation engine.
//!
//! Everything above this crate talks to the engine through
//! [`SimulationEngine`]. The only implementation that crosses the foreign
//! boundary is [`LibraryEngine`], which resolves the engine's exported
//! symbols once when the shared library is opened. Raw `double` buffers never
//! leave [`ffi`]; callers see [`LoadVector`], [`ControlVector`] and
//! [`WindSample`] instead.

pub mod discovery;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod types;

pub use discovery::{locate_library, prepend_search_path, LIBRARY_MARKER};
pub use engine::SimulationEngine;
pub use error::{EngineError, Result};
pub use ffi::LibraryEngine;
pub use types::{
    ControlVector, ExportRequest, GlobalPosition, InstanceOptions, LoadVector, NamedVariable,
    PowerLawWind, ProjectInput, TurbineIndex, VariablePosition, WindSample,
};
