//! ---
//! cosim_section: "02-engine-boundary"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Call surface of the simulation engine."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::path::Path;

use crate::error::Result;
use crate::types::{
    ControlVector, ExportRequest, GlobalPosition, InstanceOptions, LoadVector, NamedVariable,
    PowerLawWind, ProjectInput, TurbineIndex, WindSample,
};

/// Operations exposed by a stateful, non-reentrant simulation engine.
///
/// Every method takes `&mut self`: the engine is owned by exactly one driver
/// and calls into it are serialised by construction. Lifecycle calls report
/// failure through `Result`; per-step queries return plain values because the
/// engine offers no status for them.
///
/// The required call order is
///
/// 1. [`create_instance`](Self::create_instance)
/// 2. [`load`](Self::load)
/// 3. [`initialize_simulation`](Self::initialize_simulation)
/// 4. per step: [`advance_turbine_simulation`](Self::advance_turbine_simulation),
///    queries, [`advance_controller`](Self::advance_controller),
///    [`set_control_vars`](Self::set_control_vars)
/// 5. [`store_project`](Self::store_project), [`export_results`](Self::export_results)
/// 6. [`unload`](Self::unload)
pub trait SimulationEngine {
    fn create_instance(&mut self, options: InstanceOptions) -> Result<()>;

    /// Engine-side log file. Only valid between instantiation and load.
    fn set_log_file(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// OpenMP worker count. Only valid between instantiation and load.
    fn set_omp_threads(&mut self, _threads: u32) -> Result<()> {
        Ok(())
    }

    fn load(&mut self, input: &ProjectInput) -> Result<()>;

    /// Overrides the loaded timestep size in seconds. Only valid before initialisation.
    fn set_timestep_size(&mut self, _seconds: f64) -> Result<()> {
        Ok(())
    }

    /// Overrides the loaded ramp-up duration in seconds. Only valid before initialisation.
    fn set_rampup_time(&mut self, _seconds: f64) -> Result<()> {
        Ok(())
    }

    /// Replaces the loaded inflow with a steady power-law profile. Only valid before initialisation.
    fn set_power_law_wind(&mut self, _wind: &PowerLawWind) -> Result<()> {
        Ok(())
    }

    fn initialize_simulation(&mut self) -> Result<()>;

    /// Advances every turbine by one internal step. `false` ends the run.
    fn advance_turbine_simulation(&mut self) -> bool;

    /// Runs the remaining simulation in one call. `false` means the engine stopped early.
    fn run_full_simulation(&mut self) -> bool;

    fn tower_bottom_loads(&mut self, turbine: TurbineIndex) -> LoadVector;

    fn custom_data(&mut self, variable: &NamedVariable, turbine: TurbineIndex) -> Result<f64>;

    fn windspeed(&mut self, position: GlobalPosition) -> WindSample;

    fn advance_controller(&mut self, turbine: TurbineIndex) -> ControlVector;

    fn set_control_vars(&mut self, control: &ControlVector, turbine: TurbineIndex);

    fn store_project(&mut self, path: &Path) -> Result<()>;

    fn export_results(&mut self, request: &ExportRequest) -> Result<()>;

    /// Releases every engine resource. Callers must invoke this at most once.
    fn unload(&mut self) -> Result<()>;
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for Box<E> {
    fn create_instance(&mut self, options: InstanceOptions) -> Result<()> {
        (**self).create_instance(options)
    }

    fn set_log_file(&mut self, path: &Path) -> Result<()> {
        (**self).set_log_file(path)
    }

    fn set_omp_threads(&mut self, threads: u32) -> Result<()> {
        (**self).set_omp_threads(threads)
    }

    fn load(&mut self, input: &ProjectInput) -> Result<()> {
        (**self).load(input)
    }

    fn set_timestep_size(&mut self, seconds: f64) -> Result<()> {
        (**self).set_timestep_size(seconds)
    }

    fn set_rampup_time(&mut self, seconds: f64) -> Result<()> {
        (**self).set_rampup_time(seconds)
    }

    fn set_power_law_wind(&mut self, wind: &PowerLawWind) -> Result<()> {
        (**self).set_power_law_wind(wind)
    }

    fn initialize_simulation(&mut self) -> Result<()> {
        (**self).initialize_simulation()
    }

    fn advance_turbine_simulation(&mut self) -> bool {
        (**self).advance_turbine_simulation()
    }

    fn run_full_simulation(&mut self) -> bool {
        (**self).run_full_simulation()
    }

    fn tower_bottom_loads(&mut self, turbine: TurbineIndex) -> LoadVector {
        (**self).tower_bottom_loads(turbine)
    }

    fn custom_data(&mut self, variable: &NamedVariable, turbine: TurbineIndex) -> Result<f64> {
        (**self).custom_data(variable, turbine)
    }

    fn windspeed(&mut self, position: GlobalPosition) -> WindSample {
        (**self).windspeed(position)
    }

    fn advance_controller(&mut self, turbine: TurbineIndex) -> ControlVector {
        (**self).advance_controller(turbine)
    }

    fn set_control_vars(&mut self, control: &ControlVector, turbine: TurbineIndex) {
        (**self).set_control_vars(control, turbine)
    }

    fn store_project(&mut self, path: &Path) -> Result<()> {
        (**self).store_project(path)
    }

    fn export_results(&mut self, request: &ExportRequest) -> Result<()> {
        (**self).export_results(request)
    }

    fn unload(&mut self) -> Result<()> {
        (**self).unload()
    }
}
