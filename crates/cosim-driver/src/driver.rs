//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Simulation driver: lifecycle, step loop and finalization."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use cosim_common::{AppConfig, StepTimingHistogram};
use cosim_engine::{
    EngineError, ExportRequest, InstanceOptions, PowerLawWind, ProjectInput, SimulationEngine,
    TurbineIndex,
};
use cosim_logging::{
    cosim_debug, cosim_info, cosim_warn, log_lifecycle_event, LifecycleOutcome, LogContext,
};

use crate::controller::ControllerAdapter;
use crate::error::{DriverError, Result};
use crate::observer::StepObserver;
use crate::report::{PersistenceStatus, RunMode, RunOutcome, RunReport};
use crate::session::EngineSession;
use crate::state::DriverState;
use crate::telemetry::{StepObservation, TelemetryChannels};

/// Resolved, validated inputs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub instance: InstanceOptions,
    pub engine_log_file: Option<PathBuf>,
    pub omp_threads: Option<u32>,
    pub input: ProjectInput,
    pub iterations: u64,
    pub timestep: Option<f64>,
    pub rampup_time: Option<f64>,
    pub power_law_wind: Option<PowerLawWind>,
    pub turbine: TurbineIndex,
    pub channels: TelemetryChannels,
    pub output_project: PathBuf,
    pub export: ExportRequest,
}

impl DriverSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let input = config
            .input
            .project_input()
            .map_err(|err| DriverError::Config(format!("{err:#}")))?;
        let channels = TelemetryChannels::from_config(&config.telemetry)?;
        Ok(Self {
            instance: config.engine.instance_options(),
            engine_log_file: config.engine.log_file.clone(),
            omp_threads: config.engine.omp_threads,
            input,
            iterations: config.run.iterations,
            timestep: config.run.timestep,
            rampup_time: config.run.rampup_time,
            power_law_wind: config.run.power_law_wind,
            turbine: TurbineIndex::PRIMARY,
            channels,
            output_project: config.output.project.clone(),
            export: ExportRequest {
                format_code: ExportRequest::ASCII,
                directory: config.output.results_directory.clone(),
                base_name: config.output.results_name.clone(),
                filter: config.output.results_filter.clone(),
            },
        })
    }
}

/// Drives one engine instance through its lifecycle.
///
/// The driver is generic over the engine, so the same code runs against the
/// shared library and against scripted test engines. A driver performs a
/// single run; calling [`run`](Self::run) again fails with
/// [`DriverError::InvalidTransition`].
pub struct SimulationDriver<C, O> {
    settings: DriverSettings,
    controller: C,
    observer: O,
    timing: StepTimingHistogram,
    state: DriverState,
    run_id: String,
    failure_report: Option<RunReport>,
}

impl<C, O: StepObserver> SimulationDriver<C, O> {
    pub fn new(settings: DriverSettings, controller: C, observer: O) -> Self {
        Self {
            settings,
            controller,
            observer,
            timing: StepTimingHistogram::default(),
            state: DriverState::default(),
            run_id: format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")),
            failure_report: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn timing(&self) -> &StepTimingHistogram {
        &self.timing
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Report of a run that failed before the step loop, if any.
    pub fn failure_report(&self) -> Option<&RunReport> {
        self.failure_report.as_ref()
    }

    /// Runs the configured number of driver-controlled iterations.
    pub fn run<E>(&mut self, engine: E) -> Result<RunReport>
    where
        E: SimulationEngine,
        C: ControllerAdapter<E>,
    {
        self.execute(engine, RunMode::Stepped)
    }

    /// Lets the engine run the whole simulation in one call.
    pub fn run_batch<E>(&mut self, engine: E) -> Result<RunReport>
    where
        E: SimulationEngine,
        C: ControllerAdapter<E>,
    {
        self.execute(engine, RunMode::Batch)
    }

    fn execute<E>(&mut self, mut engine: E, mode: RunMode) -> Result<RunReport>
    where
        E: SimulationEngine,
        C: ControllerAdapter<E>,
    {
        self.state.check(DriverState::Instantiated)?;
        let clock = Instant::now();
        let mut report = RunReport::begin(
            &self.run_id,
            mode,
            &self.settings.input,
            self.settings.iterations,
        );

        if let Err(err) = engine.create_instance(self.settings.instance) {
            self.lifecycle(
                "instantiate",
                "engine.instantiate",
                &err.to_string(),
                LifecycleOutcome::Fault,
            );
            let err = DriverError::from(err);
            self.keep_failure(report, clock, &err);
            return Err(err);
        }
        let mut session = EngineSession::new(engine);
        self.state.transition(DriverState::Instantiated)?;
        self.lifecycle(
            "instantiate",
            "engine.instantiate",
            "engine instance created",
            LifecycleOutcome::Success,
        );

        if let Err(err) = self.prepare(session.engine_mut()) {
            self.lifecycle(
                self.state.as_str(),
                "engine.prepare",
                &err.to_string(),
                LifecycleOutcome::Fault,
            );
            self.release(session, &mut report);
            self.keep_failure(report, clock, &err);
            return Err(err);
        }

        self.state.transition(DriverState::Running)?;
        let loop_result = match mode {
            RunMode::Stepped => self.step_loop(session.engine_mut(), &mut report),
            RunMode::Batch => self.batch(session.engine_mut(), &mut report),
        };
        if let Err(err) = loop_result {
            self.lifecycle(
                "running",
                "driver.loop",
                &err.to_string(),
                LifecycleOutcome::Fault,
            );
            report.outcome = RunOutcome::Aborted;
            report.error = Some(err.to_string());
        }
        if let Err(err) = self.observer.finish() {
            self.observer_failed(None, &err, &mut report);
        }

        self.state.transition(DriverState::Finalized)?;
        self.persist(session.engine_mut(), &mut report);
        self.release(session, &mut report);

        report.finished_at = Utc::now();
        report.wall_time = clock.elapsed();
        report.step_timing = self.timing.summary();
        cosim_info!(
            context = self.context("finalize"),
            "run finished: {:?} after {} of {} iterations",
            report.outcome,
            report.completed_iterations,
            report.requested_iterations
        );
        Ok(report)
    }

    fn keep_failure(&mut self, mut report: RunReport, clock: Instant, err: &DriverError) {
        report.outcome = RunOutcome::Failed;
        report.error = Some(err.to_string());
        report.finished_at = Utc::now();
        report.wall_time = clock.elapsed();
        self.failure_report = Some(report);
    }

    /// Observation is a side effect: failures are recorded and the loop goes on.
    fn observer_failed(&self, iteration: Option<u64>, err: &DriverError, report: &mut RunReport) {
        report.observer_failures += 1;
        let context = match iteration {
            Some(iteration) => self.context("running").with_iteration(iteration),
            None => self.context("finalize"),
        };
        if report.observer_error.is_none() {
            cosim_warn!(context = context, "observer failed, continuing: {}", err);
            report.observer_error = Some(err.to_string());
        } else {
            cosim_debug!(context = context, "observer failed again: {}", err);
        }
    }

    /// Instantiated → Loaded → Initialized, applying optional settings on the way.
    fn prepare<E: SimulationEngine>(&mut self, engine: &mut E) -> Result<()> {
        let settings = &self.settings;
        if let Some(path) = &settings.engine_log_file {
            engine.set_log_file(path)?;
        }
        if let Some(threads) = settings.omp_threads {
            engine.set_omp_threads(threads)?;
        }

        engine.load(&settings.input)?;
        self.state.transition(DriverState::Loaded)?;
        log_lifecycle_event(
            Some(&self.context("load")),
            "engine.load",
            &format!(
                "{} loaded from {}",
                settings.input.kind(),
                settings.input.path().display()
            ),
            LifecycleOutcome::Success,
        );

        if let Some(seconds) = settings.timestep {
            engine.set_timestep_size(seconds)?;
        }
        if let Some(seconds) = settings.rampup_time {
            engine.set_rampup_time(seconds)?;
        }
        if let Some(wind) = &settings.power_law_wind {
            engine.set_power_law_wind(wind)?;
        }

        engine.initialize_simulation()?;
        self.state.transition(DriverState::Initialized)?;
        log_lifecycle_event(
            Some(&self.context("initialize")),
            "engine.initialize",
            "simulation initialised",
            LifecycleOutcome::Success,
        );
        Ok(())
    }

    fn step_loop<E>(&mut self, engine: &mut E, report: &mut RunReport) -> Result<()>
    where
        E: SimulationEngine,
        C: ControllerAdapter<E>,
    {
        self.state.ensure_running()?;
        let turbine = self.settings.turbine;
        for iteration in 0..self.settings.iterations {
            let _timer = self.timing.start();

            if !engine.advance_turbine_simulation() {
                report.terminated_at = Some(iteration);
                report.outcome = RunOutcome::TerminatedEarly;
                log_lifecycle_event(
                    Some(&self.context("running").with_iteration(iteration)),
                    "engine.advance",
                    "engine reported a failed step; leaving the loop",
                    LifecycleOutcome::Degraded,
                );
                if let Err(err) = self.observer.on_terminated(iteration) {
                    self.observer_failed(Some(iteration), &err, report);
                }
                return Ok(());
            }

            let loads = engine.tower_bottom_loads(turbine);
            let telemetry = self.settings.channels.sample(engine, turbine)?;
            let extra = self.settings.channels.sample_extra(engine, turbine)?;
            let wind = engine.windspeed(self.settings.channels.wind_probe());
            let control = self.controller.advance(engine, turbine);
            engine.set_control_vars(&control, turbine);
            report.completed_iterations = iteration + 1;

            let observation = StepObservation {
                iteration,
                loads,
                telemetry,
                wind,
                control,
                extra,
            };
            if let Err(err) = self.observer.on_step(&observation) {
                self.observer_failed(Some(iteration), &err, report);
            }
        }
        cosim_debug!(
            context = self.context("running"),
            "completed {} iterations",
            report.completed_iterations
        );
        Ok(())
    }

    fn batch<E: SimulationEngine>(
        &mut self,
        engine: &mut E,
        report: &mut RunReport,
    ) -> Result<()> {
        self.state.ensure_running()?;
        let ok = {
            let _timer = self.timing.start();
            engine.run_full_simulation()
        };
        if ok {
            self.lifecycle(
                "running",
                "engine.run_full",
                "full simulation completed",
                LifecycleOutcome::Success,
            );
        } else {
            report.outcome = RunOutcome::TerminatedEarly;
            self.lifecycle(
                "running",
                "engine.run_full",
                "engine stopped the full simulation early",
                LifecycleOutcome::Degraded,
            );
        }
        Ok(())
    }

    /// Store then export; failures are recorded and never stop the release.
    fn persist<E: SimulationEngine>(&self, engine: &mut E, report: &mut RunReport) {
        let stored = engine.store_project(&self.settings.output_project);
        self.persistence_event("engine.store_project", &stored);
        report.project = Some(PersistenceStatus::from_result(
            self.settings.output_project.clone(),
            &stored,
        ));

        let export = &self.settings.export;
        let exported = engine.export_results(export);
        self.persistence_event("engine.export_results", &exported);
        report.results = Some(PersistenceStatus::from_result(
            export.directory.join(&export.base_name),
            &exported,
        ));
    }

    fn release<E: SimulationEngine>(&mut self, session: EngineSession<E>, report: &mut RunReport) {
        match session.release() {
            Ok(()) => self.lifecycle(
                "release",
                "engine.release",
                "engine unloaded",
                LifecycleOutcome::Success,
            ),
            Err(err) => {
                self.lifecycle(
                    "release",
                    "engine.release",
                    &err.to_string(),
                    LifecycleOutcome::Degraded,
                );
                report.release_error = Some(err.to_string());
            }
        }
        if let Err(err) = self.state.transition(DriverState::Released) {
            cosim_warn!(context = self.context("release"), "{}", err);
            self.state = DriverState::Released;
        }
    }

    fn persistence_event(&self, event: &str, result: &std::result::Result<(), EngineError>) {
        match result {
            Ok(()) => self.lifecycle("finalize", event, "written", LifecycleOutcome::Success),
            Err(err) => {
                self.lifecycle("finalize", event, &err.to_string(), LifecycleOutcome::Degraded)
            }
        }
    }

    fn lifecycle(&self, phase: &str, event: &str, message: &str, outcome: LifecycleOutcome) {
        log_lifecycle_event(Some(&self.context(phase)), event, message, outcome);
    }

    fn context<'a>(&'a self, phase: &'a str) -> LogContext<'a> {
        LogContext::new()
            .with_run(&self.run_id)
            .with_turbine(self.settings.turbine.get())
            .with_phase(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_testharness::{EngineCall, EngineScript, ScriptedEngine};

    use crate::controller::EngineController;
    use crate::observer::NullObserver;

    fn settings(iterations: u64) -> DriverSettings {
        let mut config = AppConfig::default();
        config.run.iterations = iterations;
        DriverSettings::from_config(&config).unwrap()
    }

    #[test]
    fn settings_follow_the_sample_defaults() {
        let settings = DriverSettings::from_config(&AppConfig::default()).unwrap();
        assert_eq!(settings.iterations, 500);
        assert_eq!(settings.instance, InstanceOptions::default());
        assert_eq!(settings.export.format_code, ExportRequest::ASCII);
        assert_eq!(settings.export.base_name, "NREL_5MW_Sample_results");
        assert_eq!(
            settings.output_project,
            PathBuf::from("./NREL_5MW_Sample_completed.qpr")
        );
    }

    #[test]
    fn settings_reject_conflicting_inputs() {
        let mut config = AppConfig::default();
        config.input.sim_definition = Some(PathBuf::from("def.sim"));
        assert!(matches!(
            DriverSettings::from_config(&config),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn pre_load_settings_and_overrides_are_ordered() {
        let mut config = AppConfig::default();
        config.run.iterations = 1;
        config.engine.log_file = Some(PathBuf::from("engine.log"));
        config.engine.omp_threads = Some(4);
        config.run.timestep = Some(0.025);
        config.run.rampup_time = Some(10.0);
        let settings = DriverSettings::from_config(&config).unwrap();

        let engine = ScriptedEngine::default();
        let journal = engine.journal();
        let mut driver = SimulationDriver::new(settings, EngineController, NullObserver);
        driver.run(engine).unwrap();

        let calls = journal.calls();
        let position = |wanted: &EngineCall| calls.iter().position(|call| call == wanted);
        let load = calls
            .iter()
            .position(|call| matches!(call, EngineCall::Load(_)))
            .unwrap();
        assert!(position(&EngineCall::SetLogFile(PathBuf::from("engine.log"))).unwrap() < load);
        assert!(position(&EngineCall::SetOmpThreads(4)).unwrap() < load);
        let init = position(&EngineCall::InitializeSimulation).unwrap();
        let timestep = position(&EngineCall::SetTimestepSize(0.025)).unwrap();
        assert!(load < timestep && timestep < init);
        assert!(position(&EngineCall::SetRampupTime(10.0)).unwrap() < init);
        assert!(journal.protocol_violations().is_empty());
    }

    #[test]
    fn second_run_is_an_invalid_transition() {
        let mut driver = SimulationDriver::new(settings(2), EngineController, NullObserver);
        driver.run(ScriptedEngine::default()).unwrap();
        assert_eq!(driver.state(), DriverState::Released);

        let engine = ScriptedEngine::default();
        let journal = engine.journal();
        let err = driver.run(engine).unwrap_err();
        assert!(matches!(err, DriverError::InvalidTransition { .. }));
        assert!(journal.calls().is_empty());
    }

    #[test]
    fn batch_mode_skips_the_step_loop() {
        let engine = ScriptedEngine::default();
        let journal = engine.journal();
        let mut driver = SimulationDriver::new(settings(10), EngineController, NullObserver);
        let report = driver.run_batch(engine).unwrap();
        assert_eq!(report.mode, RunMode::Batch);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(journal.advance_count(), 0);
        assert_eq!(
            journal.count(|call| matches!(call, EngineCall::RunFullSimulation { .. })),
            1
        );
        assert!(report.persisted());
        assert_eq!(journal.unload_count(), 1);
    }

    #[test]
    fn failed_batch_is_an_early_termination() {
        let engine = ScriptedEngine::new(EngineScript::default().fail_full_simulation());
        let journal = engine.journal();
        let mut driver = SimulationDriver::new(settings(10), EngineController, NullObserver);
        let report = driver.run_batch(engine).unwrap();
        assert_eq!(report.outcome, RunOutcome::TerminatedEarly);
        assert!(journal.contains(|call| matches!(call, EngineCall::StoreProject(_))));
        assert_eq!(journal.unload_count(), 1);
    }

    #[test]
    fn initialisation_failure_releases_without_persisting() {
        let engine = ScriptedEngine::new(EngineScript::default().fail_initialization());
        let journal = engine.journal();
        let mut driver = SimulationDriver::new(settings(5), EngineController, NullObserver);
        let err = driver.run(engine).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Engine(cosim_engine::EngineError::InitializationFailed(_))
        ));
        assert_eq!(journal.advance_count(), 0);
        assert!(!journal.contains(|call| matches!(call, EngineCall::StoreProject(_))));
        assert_eq!(journal.unload_count(), 1);
        assert_eq!(driver.state(), DriverState::Released);
    }

    #[test]
    fn unload_failure_is_recorded_not_raised() {
        let engine = ScriptedEngine::new(EngineScript::default().fail_unload());
        let mut driver = SimulationDriver::new(settings(1), EngineController, NullObserver);
        let report = driver.run(engine).unwrap();
        assert!(report.release_error.is_some());
        assert_eq!(report.outcome, RunOutcome::Completed);
    }
}
