//! ---
//! cosim_section: "02-engine-boundary"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Fixed-size exchange structures passed across the engine boundary."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Identifies one turbine within a (possibly multi-turbine) simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurbineIndex(pub i32);

impl TurbineIndex {
    /// The single turbine driven by the co-simulation loop.
    pub const PRIMARY: TurbineIndex = TurbineIndex(0);

    pub fn get(self) -> i32 {
        self.0
    }
}

impl Default for TurbineIndex {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl fmt::Display for TurbineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tower-bottom loads: three force and three moment components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadVector {
    pub force_x: f64,
    pub force_y: f64,
    pub force_z: f64,
    pub moment_x: f64,
    pub moment_y: f64,
    pub moment_z: f64,
}

impl LoadVector {
    pub const LEN: usize = 6;

    pub fn from_raw(raw: [f64; Self::LEN]) -> Self {
        let [force_x, force_y, force_z, moment_x, moment_y, moment_z] = raw;
        Self {
            force_x,
            force_y,
            force_z,
            moment_x,
            moment_y,
            moment_z,
        }
    }

    pub fn to_raw(&self) -> [f64; Self::LEN] {
        [
            self.force_x,
            self.force_y,
            self.force_z,
            self.moment_x,
            self.moment_y,
            self.moment_z,
        ]
    }
}

/// Actuator commands produced by the turbine controller.
///
/// Slot order matches the engine's control-variable buffer: generator torque,
/// yaw angle, then the three blade pitch demands. Only torque and the first
/// pitch slot are interpreted by the driver; the rest are passed through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlVector {
    pub generator_torque: f64,
    pub yaw_angle: f64,
    pub pitch_blade_1: f64,
    pub pitch_blade_2: f64,
    pub pitch_blade_3: f64,
}

impl ControlVector {
    pub const LEN: usize = 5;

    pub fn from_raw(raw: [f64; Self::LEN]) -> Self {
        let [generator_torque, yaw_angle, pitch_blade_1, pitch_blade_2, pitch_blade_3] = raw;
        Self {
            generator_torque,
            yaw_angle,
            pitch_blade_1,
            pitch_blade_2,
            pitch_blade_3,
        }
    }

    pub fn to_raw(&self) -> [f64; Self::LEN] {
        [
            self.generator_torque,
            self.yaw_angle,
            self.pitch_blade_1,
            self.pitch_blade_2,
            self.pitch_blade_3,
        ]
    }

    /// Commanded torque (slot 0).
    pub fn torque(&self) -> f64 {
        self.generator_torque
    }

    /// Commanded pitch (slot 2).
    pub fn pitch(&self) -> f64 {
        self.pitch_blade_1
    }
}

/// Inflow velocity components at a global coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub u: f64,
    pub v: f64,
    pub w: f64,
}

impl WindSample {
    pub const LEN: usize = 3;

    pub fn from_raw(raw: [f64; Self::LEN]) -> Self {
        let [u, v, w] = raw;
        Self { u, v, w }
    }

    pub fn to_raw(&self) -> [f64; Self::LEN] {
        [self.u, self.v, self.w]
    }
}

/// Global coordinate in metres used for wind probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GlobalPosition {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Where along the turbine a named variable is sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariablePosition {
    /// Rotor- or turbine-level scalar; the position argument is ignored.
    Global,
    /// Normalised blade-length fraction in `[0, 1]`.
    Span(f64),
}

impl VariablePosition {
    /// Validated spanwise position.
    pub fn span(fraction: f64) -> Result<Self> {
        if fraction.is_finite() && (0.0..=1.0).contains(&fraction) {
            Ok(VariablePosition::Span(fraction))
        } else {
            Err(EngineError::InvalidSpan(fraction))
        }
    }

    /// Value passed in the engine's position argument.
    pub fn as_raw(&self) -> f64 {
        match self {
            VariablePosition::Global => 0.0,
            VariablePosition::Span(fraction) => *fraction,
        }
    }
}

/// Key into the engine's runtime telemetry. No schema is declared up front;
/// the engine resolves the name at query time.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVariable {
    name: String,
    position: VariablePosition,
}

impl NamedVariable {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: VariablePosition::Global,
        }
    }

    pub fn at_span(name: impl Into<String>, fraction: f64) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            position: VariablePosition::span(fraction)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> VariablePosition {
        self.position
    }
}

/// Arguments for instance creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOptions {
    pub max_turbines: i32,
    pub environment_tag: i32,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            max_turbines: 1,
            environment_tag: 32,
        }
    }
}

/// The single input loaded into a fresh instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectInput {
    /// A full project file including turbine and simulation definitions.
    Project(PathBuf),
    /// A bare simulation-definition file.
    SimDefinition(PathBuf),
}

impl ProjectInput {
    pub fn path(&self) -> &Path {
        match self {
            ProjectInput::Project(path) | ProjectInput::SimDefinition(path) => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProjectInput::Project(_) => "project",
            ProjectInput::SimDefinition(_) => "sim-definition",
        }
    }
}

/// Request for the engine's time-series export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Engine export format selector; `0` writes the plain-text tabular format.
    pub format_code: i32,
    pub directory: PathBuf,
    pub base_name: String,
    /// Variable-name filter; empty exports every recorded channel.
    pub filter: String,
}

impl ExportRequest {
    pub const ASCII: i32 = 0;

    pub fn ascii(directory: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            format_code: Self::ASCII,
            directory: directory.into(),
            base_name: base_name.into(),
            filter: String::new(),
        }
    }
}

/// Steady power-law inflow override applied before initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLawWind {
    pub windspeed: f64,
    #[serde(default)]
    pub horizontal_angle: f64,
    #[serde(default)]
    pub vertical_angle: f64,
    #[serde(default)]
    pub shear_exponent: f64,
    pub reference_height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_vector_slots_follow_engine_layout() {
        let control = ControlVector::from_raw([4.2e6, 0.0, 7.5, 7.6, 7.7]);
        assert_eq!(control.torque(), 4.2e6);
        assert_eq!(control.pitch(), 7.5);
        assert_eq!(control.to_raw()[4], 7.7);
    }

    #[test]
    fn load_vector_keeps_force_then_moment_order() {
        let loads = LoadVector::from_raw([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(loads.force_z, 3.0);
        assert_eq!(loads.moment_x, 4.0);
        assert_eq!(loads.to_raw(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn span_positions_must_lie_on_the_blade() {
        assert!(VariablePosition::span(0.85).is_ok());
        assert!(VariablePosition::span(0.0).is_ok());
        assert!(VariablePosition::span(1.0).is_ok());
        assert!(matches!(
            VariablePosition::span(1.2),
            Err(EngineError::InvalidSpan(_))
        ));
        assert!(VariablePosition::span(f64::NAN).is_err());
    }

    #[test]
    fn global_variables_send_zero_position() {
        let rpm = NamedVariable::global("Rotational Speed [rpm]");
        assert_eq!(rpm.position().as_raw(), 0.0);
        let aoa = NamedVariable::at_span("Angle of Attack", 0.85).unwrap();
        assert_eq!(aoa.position().as_raw(), 0.85);
    }

    #[test]
    fn project_input_exposes_its_path() {
        let input = ProjectInput::SimDefinition(PathBuf::from("demo.sim"));
        assert_eq!(input.path(), Path::new("demo.sim"));
        assert_eq!(input.kind(), "sim-definition");
    }
}
