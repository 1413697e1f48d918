//! ---
//! cosim_section: "05-test-harness"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Scripted simulation engine and call journal."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
//! In-process stand-in for the shared-library engine.
//!
//! [`ScriptedEngine`] implements [`SimulationEngine`] with deterministic
//! outputs derived from its step counter and records every call in an
//! [`EngineJournal`] that tests keep after the engine has been moved into the
//! driver. Failures are injected through [`EngineScript`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cosim_engine::{
    ControlVector, EngineError, ExportRequest, GlobalPosition, InstanceOptions, LoadVector,
    NamedVariable, PowerLawWind, ProjectInput, Result, SimulationEngine, TurbineIndex, WindSample,
};
use parking_lot::Mutex;
use tracing::trace;

pub const DEFAULT_TIMESTEP: f64 = 0.05;
pub const ROTOR_SPEED_RPM: f64 = 12.1;
pub const WIND_U: f64 = 11.4;

/// One recorded engine call, in invocation order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    CreateInstance(InstanceOptions),
    SetLogFile(PathBuf),
    SetOmpThreads(u32),
    Load(ProjectInput),
    SetTimestepSize(f64),
    SetRampupTime(f64),
    SetPowerLawWind(PowerLawWind),
    InitializeSimulation,
    Advance { step: u64, accepted: bool },
    RunFullSimulation { accepted: bool },
    TowerBottomLoads(TurbineIndex),
    CustomData { name: String, position: f64, turbine: TurbineIndex },
    Windspeed(GlobalPosition),
    AdvanceController { turbine: TurbineIndex, output: ControlVector },
    SetControlVars { control: ControlVector, turbine: TurbineIndex },
    StoreProject(PathBuf),
    ExportResults(ExportRequest),
    Unload,
}

impl EngineCall {
    /// Calls that are only legal between initialisation and unload.
    pub fn is_step_call(&self) -> bool {
        matches!(
            self,
            EngineCall::Advance { .. }
                | EngineCall::RunFullSimulation { .. }
                | EngineCall::TowerBottomLoads(_)
                | EngineCall::CustomData { .. }
                | EngineCall::Windspeed(_)
                | EngineCall::AdvanceController { .. }
                | EngineCall::SetControlVars { .. }
        )
    }
}

#[derive(Debug, Default)]
struct JournalInner {
    calls: Vec<EngineCall>,
    protocol_violations: Vec<String>,
}

/// Shared, cloneable view of everything a [`ScriptedEngine`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct EngineJournal {
    inner: Arc<Mutex<JournalInner>>,
}

impl EngineJournal {
    fn record(&self, call: EngineCall) {
        trace!(?call, "scripted engine call");
        self.inner.lock().calls.push(call);
    }

    fn violation(&self, message: String) {
        self.inner.lock().protocol_violations.push(message);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn unload_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Unload))
    }

    pub fn advance_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Advance { .. }))
    }

    pub fn control_writes(&self) -> Vec<ControlVector> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::SetControlVars { control, .. } => Some(*control),
                _ => None,
            })
            .collect()
    }

    pub fn controller_outputs(&self) -> Vec<ControlVector> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::AdvanceController { output, .. } => Some(*output),
                _ => None,
            })
            .collect()
    }

    /// Whether any call matching `predicate` was recorded.
    pub fn contains(&self, predicate: impl Fn(&EngineCall) -> bool) -> bool {
        self.count(predicate) > 0
    }

    /// Calls made outside the lifecycle window that permits them.
    pub fn protocol_violations(&self) -> Vec<String> {
        self.inner.lock().protocol_violations.clone()
    }
}

/// Failure injection and output shaping for a [`ScriptedEngine`].
#[derive(Debug, Clone)]
pub struct EngineScript {
    /// `create_instance` fails.
    pub fail_instantiation: bool,
    /// `initialize_simulation` fails.
    pub fail_initialization: bool,
    /// 0-based advance call that returns `false`.
    pub fail_advance_at: Option<u64>,
    /// `run_full_simulation` returns `false`.
    pub fail_full_simulation: bool,
    pub fail_store: bool,
    pub fail_export: bool,
    pub fail_unload: bool,
    /// Load checks that the input path is an existing file, like the engine does.
    pub require_existing_input: bool,
    pub timestep: f64,
    pub wind: WindSample,
}

impl Default for EngineScript {
    fn default() -> Self {
        Self {
            fail_instantiation: false,
            fail_initialization: false,
            fail_advance_at: None,
            fail_full_simulation: false,
            fail_store: false,
            fail_export: false,
            fail_unload: false,
            require_existing_input: false,
            timestep: DEFAULT_TIMESTEP,
            wind: WindSample {
                u: WIND_U,
                v: 0.0,
                w: 0.0,
            },
        }
    }
}

impl EngineScript {
    pub fn fail_advance_at(mut self, step: u64) -> Self {
        self.fail_advance_at = Some(step);
        self
    }

    pub fn fail_instantiation(mut self) -> Self {
        self.fail_instantiation = true;
        self
    }

    pub fn fail_initialization(mut self) -> Self {
        self.fail_initialization = true;
        self
    }

    pub fn fail_full_simulation(mut self) -> Self {
        self.fail_full_simulation = true;
        self
    }

    pub fn fail_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    pub fn fail_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    pub fn fail_unload(mut self) -> Self {
        self.fail_unload = true;
        self
    }

    pub fn require_existing_input(mut self) -> Self {
        self.require_existing_input = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Instantiated,
    Loaded,
    Initialized,
    Unloaded,
}

/// Deterministic engine whose outputs are functions of the committed step count.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: EngineScript,
    journal: EngineJournal,
    phase: Phase,
    steps: u64,
    advances: u64,
    timestep: f64,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new(EngineScript::default())
    }
}

impl ScriptedEngine {
    pub fn new(script: EngineScript) -> Self {
        let timestep = script.timestep;
        Self {
            script,
            journal: EngineJournal::default(),
            phase: Phase::Empty,
            steps: 0,
            advances: 0,
            timestep,
        }
    }

    pub fn journal(&self) -> EngineJournal {
        self.journal.clone()
    }

    /// Successful advances so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated time after the committed steps.
    pub fn elapsed_time(&self) -> f64 {
        self.steps as f64 * self.timestep
    }

    /// Controller output for the current step count.
    pub fn control_for_step(step: u64) -> ControlVector {
        let step = step as f64;
        ControlVector {
            generator_torque: 40_000.0 + 10.0 * step,
            yaw_angle: 0.0,
            pitch_blade_1: 0.1 * step,
            pitch_blade_2: 0.1 * step,
            pitch_blade_3: 0.1 * step,
        }
    }

    fn require(&self, allowed: &[Phase], call: &str) {
        if !allowed.contains(&self.phase) {
            self.journal
                .violation(format!("{call} called while {:?}", self.phase));
        }
    }

    fn require_stepping(&self, call: &str) {
        self.require(&[Phase::Initialized], call);
    }
}

impl SimulationEngine for ScriptedEngine {
    fn create_instance(&mut self, options: InstanceOptions) -> Result<()> {
        self.journal.record(EngineCall::CreateInstance(options));
        self.require(&[Phase::Empty], "create_instance");
        if self.script.fail_instantiation {
            return Err(EngineError::InstantiationFailed {
                max_turbines: options.max_turbines,
                environment_tag: options.environment_tag,
            });
        }
        self.phase = Phase::Instantiated;
        Ok(())
    }

    fn set_log_file(&mut self, path: &Path) -> Result<()> {
        self.journal.record(EngineCall::SetLogFile(path.to_path_buf()));
        self.require(&[Phase::Instantiated], "set_log_file");
        Ok(())
    }

    fn set_omp_threads(&mut self, threads: u32) -> Result<()> {
        self.journal.record(EngineCall::SetOmpThreads(threads));
        self.require(&[Phase::Instantiated], "set_omp_threads");
        Ok(())
    }

    fn load(&mut self, input: &ProjectInput) -> Result<()> {
        self.journal.record(EngineCall::Load(input.clone()));
        self.require(&[Phase::Instantiated], "load");
        if self.phase != Phase::Instantiated {
            return Err(EngineError::NoInstance("load"));
        }
        if self.script.require_existing_input && !input.path().is_file() {
            return Err(EngineError::InputNotFound(input.path().to_path_buf()));
        }
        self.phase = Phase::Loaded;
        Ok(())
    }

    fn set_timestep_size(&mut self, seconds: f64) -> Result<()> {
        self.journal.record(EngineCall::SetTimestepSize(seconds));
        self.require(&[Phase::Loaded], "set_timestep_size");
        self.timestep = seconds;
        Ok(())
    }

    fn set_rampup_time(&mut self, seconds: f64) -> Result<()> {
        self.journal.record(EngineCall::SetRampupTime(seconds));
        self.require(&[Phase::Loaded], "set_rampup_time");
        Ok(())
    }

    fn set_power_law_wind(&mut self, wind: &PowerLawWind) -> Result<()> {
        self.journal.record(EngineCall::SetPowerLawWind(*wind));
        self.require(&[Phase::Loaded], "set_power_law_wind");
        self.script.wind = WindSample {
            u: wind.windspeed,
            v: 0.0,
            w: 0.0,
        };
        Ok(())
    }

    fn initialize_simulation(&mut self) -> Result<()> {
        self.journal.record(EngineCall::InitializeSimulation);
        self.require(&[Phase::Loaded], "initialize_simulation");
        if self.script.fail_initialization {
            return Err(EngineError::InitializationFailed(
                "scripted initialisation failure".into(),
            ));
        }
        self.phase = Phase::Initialized;
        Ok(())
    }

    fn advance_turbine_simulation(&mut self) -> bool {
        self.require_stepping("advance_turbine_simulation");
        let step = self.advances;
        self.advances += 1;
        let accepted =
            self.phase == Phase::Initialized && self.script.fail_advance_at != Some(step);
        self.journal.record(EngineCall::Advance { step, accepted });
        if accepted {
            self.steps += 1;
        }
        accepted
    }

    fn run_full_simulation(&mut self) -> bool {
        self.require_stepping("run_full_simulation");
        let accepted = self.phase == Phase::Initialized && !self.script.fail_full_simulation;
        self.journal
            .record(EngineCall::RunFullSimulation { accepted });
        accepted
    }

    fn tower_bottom_loads(&mut self, turbine: TurbineIndex) -> LoadVector {
        self.journal.record(EngineCall::TowerBottomLoads(turbine));
        self.require_stepping("tower_bottom_loads");
        let step = self.steps as f64;
        LoadVector {
            force_x: 1_000.0 + step,
            force_y: 10.0,
            force_z: -5_000.0,
            moment_x: 200.0,
            moment_y: 50_000.0 + step,
            moment_z: 0.0,
        }
    }

    fn custom_data(&mut self, variable: &NamedVariable, turbine: TurbineIndex) -> Result<f64> {
        self.journal.record(EngineCall::CustomData {
            name: variable.name().to_owned(),
            position: variable.position().as_raw(),
            turbine,
        });
        self.require_stepping("custom_data");
        if variable.name().contains('\0') {
            return Err(EngineError::InvalidString(variable.name().to_owned()));
        }
        let value = match variable.name() {
            "Time [s]" => self.elapsed_time(),
            "Rotational Speed [rpm]" => ROTOR_SPEED_RPM,
            name if name.starts_with("Angle of Attack") => {
                5.0 + variable.position().as_raw() + 0.01 * self.steps as f64
            }
            _ => 0.0,
        };
        Ok(value)
    }

    fn windspeed(&mut self, position: GlobalPosition) -> WindSample {
        self.journal.record(EngineCall::Windspeed(position));
        self.require_stepping("windspeed");
        self.script.wind
    }

    fn advance_controller(&mut self, turbine: TurbineIndex) -> ControlVector {
        self.require_stepping("advance_controller");
        let output = Self::control_for_step(self.steps);
        self.journal
            .record(EngineCall::AdvanceController { turbine, output });
        output
    }

    fn set_control_vars(&mut self, control: &ControlVector, turbine: TurbineIndex) {
        self.journal.record(EngineCall::SetControlVars {
            control: *control,
            turbine,
        });
        self.require_stepping("set_control_vars");
    }

    fn store_project(&mut self, path: &Path) -> Result<()> {
        self.journal.record(EngineCall::StoreProject(path.to_path_buf()));
        self.require(&[Phase::Initialized], "store_project");
        if self.script.fail_store {
            return Err(EngineError::Persistence {
                path: path.to_path_buf(),
                reason: "scripted store failure".into(),
            });
        }
        Ok(())
    }

    fn export_results(&mut self, request: &ExportRequest) -> Result<()> {
        self.journal.record(EngineCall::ExportResults(request.clone()));
        self.require(&[Phase::Initialized], "export_results");
        if self.script.fail_export {
            return Err(EngineError::Persistence {
                path: request.directory.join(&request.base_name),
                reason: "scripted export failure".into(),
            });
        }
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        self.journal.record(EngineCall::Unload);
        if matches!(self.phase, Phase::Empty | Phase::Unloaded) {
            self.journal
                .violation(format!("unload called while {:?}", self.phase));
            return Err(EngineError::NoInstance("closeInstance"));
        }
        self.phase = Phase::Unloaded;
        if self.script.fail_unload {
            return Err(EngineError::Persistence {
                path: PathBuf::new(),
                reason: "scripted unload failure".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn initialised(script: EngineScript) -> ScriptedEngine {
        let mut engine = ScriptedEngine::new(script);
        engine.create_instance(InstanceOptions::default()).unwrap();
        engine
            .load(&ProjectInput::Project(PathBuf::from("sample.qpr")))
            .unwrap();
        engine.initialize_simulation().unwrap();
        engine
    }

    #[test]
    fn time_tracks_committed_steps() {
        let mut engine = initialised(EngineScript::default());
        let time = NamedVariable::global("Time [s]");
        assert!(engine.advance_turbine_simulation());
        assert!(engine.advance_turbine_simulation());
        let value = engine.custom_data(&time, TurbineIndex::PRIMARY).unwrap();
        assert!((value - 2.0 * DEFAULT_TIMESTEP).abs() < 1e-12);
        assert!(engine.journal().protocol_violations().is_empty());
    }

    #[test]
    fn scripted_advance_failure() {
        let mut engine = initialised(EngineScript::default().fail_advance_at(1));
        assert!(engine.advance_turbine_simulation());
        assert!(!engine.advance_turbine_simulation());
        assert_eq!(engine.steps(), 1);
    }

    #[test]
    fn missing_input_is_rejected_when_required() {
        let mut engine = ScriptedEngine::new(EngineScript::default().require_existing_input());
        engine.create_instance(InstanceOptions::default()).unwrap();
        let err = engine
            .load(&ProjectInput::Project(PathBuf::from("/nonexistent/sample.qpr")))
            .unwrap_err();
        assert!(matches!(err, EngineError::InputNotFound(_)));

        let file = NamedTempFile::new().unwrap();
        engine
            .load(&ProjectInput::Project(file.path().to_path_buf()))
            .unwrap();
    }

    #[test]
    fn step_calls_before_initialisation_are_flagged() {
        let mut engine = ScriptedEngine::default();
        assert!(!engine.advance_turbine_simulation());
        assert_eq!(engine.journal().protocol_violations().len(), 1);
    }

    #[test]
    fn double_unload_is_an_error() {
        let mut engine = initialised(EngineScript::default());
        engine.unload().unwrap();
        assert!(engine.unload().is_err());
        assert_eq!(engine.journal().unload_count(), 2);
    }
}
