//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Driver crate exports."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
//! Co-simulation driver for a stateful wind-turbine engine.
//!
//! [`SimulationDriver`] walks the engine through instantiate, load and
//! initialise, runs the per-step protocol (advance, queries, controller,
//! control write-back, observation), then stores the project, exports results
//! and unloads the engine exactly once.

pub mod controller;
pub mod driver;
pub mod error;
pub mod observer;
pub mod recorder;
pub mod report;
pub mod session;
pub mod state;
pub mod telemetry;

pub use controller::{ControllerAdapter, EngineController};
pub use driver::{DriverSettings, SimulationDriver};
pub use error::{DriverError, Result};
pub use observer::{status_line, termination_message, ConsoleObserver, NullObserver, StepObserver};
pub use recorder::TelemetryRecorder;
pub use report::{PersistenceStatus, RunMode, RunOutcome, RunReport};
pub use session::EngineSession;
pub use state::DriverState;
pub use telemetry::{StepObservation, TelemetryChannels, TurbineTelemetry};
