//! ---
//! cosim_section: "02-engine-boundary"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Shared-library engine binding over the exported C interface."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
//! Binding to the engine's exported C functions.
//!
//! Symbols are resolved once in [`LibraryEngine::open`] and cached as plain
//! function pointers next to the [`Library`] that owns them, so they never
//! outlive the mapping. All `unsafe` in the workspace lives in this module.

use std::ffi::{c_char, c_double, c_int, CString};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, info, warn};

use crate::engine::SimulationEngine;
use crate::error::{EngineError, Result};
use crate::types::{
    ControlVector, ExportRequest, GlobalPosition, InstanceOptions, LoadVector, NamedVariable,
    PowerLawWind, ProjectInput, TurbineIndex, WindSample,
};

type CreateInstanceFn = unsafe extern "C" fn(c_int, c_int) -> bool;
type StrFn = unsafe extern "C" fn(*const c_char);
type IntFn = unsafe extern "C" fn(c_int);
type DoubleFn = unsafe extern "C" fn(c_double);
type VoidFn = unsafe extern "C" fn();
type BoolFn = unsafe extern "C" fn() -> bool;
type BufferAtNumFn = unsafe extern "C" fn(*mut c_double, c_int);
type WindspeedFn = unsafe extern "C" fn(c_double, c_double, c_double, *mut c_double);
type CustomDataFn = unsafe extern "C" fn(*const c_char, c_double, c_int) -> c_double;
type ExportResultsFn = unsafe extern "C" fn(c_int, *const c_char, *const c_char, *const c_char);
type PowerLawWindFn = unsafe extern "C" fn(c_double, c_double, c_double, c_double, c_double);

#[derive(Clone, Copy)]
struct Symbols {
    set_library_path: StrFn,
    create_instance: CreateInstanceFn,
    set_log_file: StrFn,
    set_omp_num_threads: IntFn,
    load_project: StrFn,
    load_sim_definition: StrFn,
    set_timestep_size: DoubleFn,
    set_rampup_time: DoubleFn,
    set_power_law_wind: PowerLawWindFn,
    initialize_simulation: VoidFn,
    advance_turbine_simulation: BoolFn,
    run_full_simulation: BoolFn,
    get_tower_bottom_loads_at_num: BufferAtNumFn,
    get_custom_data_at_num: CustomDataFn,
    get_windspeed: WindspeedFn,
    advance_controller_at_num: BufferAtNumFn,
    set_control_vars_at_num: BufferAtNumFn,
    store_project: StrFn,
    export_results: ExportResultsFn,
    close_instance: VoidFn,
}

/// Resolve `name` to a copied function pointer.
///
/// # Safety
///
/// `T` must match the exported function's C signature.
unsafe fn resolve<T: Copy>(library: &Library, name: &'static str) -> Result<T> {
    let mut symbol = Vec::with_capacity(name.len() + 1);
    symbol.extend_from_slice(name.as_bytes());
    symbol.push(0);
    library
        .get::<T>(&symbol)
        .map(|sym| *sym)
        .map_err(|source| EngineError::MissingSymbol { name, source })
}

impl Symbols {
    unsafe fn load(library: &Library) -> Result<Self> {
        Ok(Self {
            set_library_path: resolve(library, "setLibraryPath")?,
            create_instance: resolve(library, "createInstance")?,
            set_log_file: resolve(library, "setLogFile")?,
            set_omp_num_threads: resolve(library, "setOmpNumThreads")?,
            load_project: resolve(library, "loadProject")?,
            load_sim_definition: resolve(library, "loadSimDefinition")?,
            set_timestep_size: resolve(library, "setTimestepSize")?,
            set_rampup_time: resolve(library, "setRampupTime")?,
            set_power_law_wind: resolve(library, "setPowerLawWind")?,
            initialize_simulation: resolve(library, "initializeSimulation")?,
            advance_turbine_simulation: resolve(library, "advanceTurbineSimulation")?,
            run_full_simulation: resolve(library, "runFullSimulation")?,
            get_tower_bottom_loads_at_num: resolve(library, "getTowerBottomLoads_at_num")?,
            get_custom_data_at_num: resolve(library, "getCustomData_at_num")?,
            get_windspeed: resolve(library, "getWindspeed")?,
            advance_controller_at_num: resolve(library, "advanceController_at_num")?,
            set_control_vars_at_num: resolve(library, "setControlVars_at_num")?,
            store_project: resolve(library, "storeProject")?,
            export_results: resolve(library, "exportResults")?,
            close_instance: resolve(library, "closeInstance")?,
        })
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| EngineError::InvalidString(value.to_owned()))
}

fn c_path(path: &Path) -> Result<CString> {
    let text = path
        .to_str()
        .ok_or_else(|| EngineError::InvalidPath(path.to_path_buf()))?;
    c_string(text)
}

/// Engine backed by a dynamically loaded shared library.
///
/// The engine is not reentrant, so the type is neither `Send` nor `Sync`.
pub struct LibraryEngine {
    path: PathBuf,
    symbols: Symbols,
    instance_open: bool,
    // Field order matters: the library must be dropped after every use of `symbols`.
    _library: Library,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for LibraryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryEngine")
            .field("path", &self.path)
            .field("instance_open", &self.instance_open)
            .finish_non_exhaustive()
    }
}

impl LibraryEngine {
    /// Map the library at `path` and resolve every engine entry point.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: loading runs the library's initialisers; the engine library
        // has no initialiser side effects beyond its own globals.
        let library = unsafe { Library::new(&path) }.map_err(|source| EngineError::LibraryOpen {
            path: path.clone(),
            source,
        })?;
        // SAFETY: the aliases above mirror the engine's exported C header.
        let symbols = unsafe { Symbols::load(&library)? };

        let library_path = c_path(&path)?;
        // SAFETY: pointer valid for the duration of the call; the engine copies it.
        unsafe { (symbols.set_library_path)(library_path.as_ptr()) };

        info!(library = %path.display(), "engine library loaded");
        Ok(Self {
            path,
            symbols,
            instance_open: false,
            _library: library,
            _not_send: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_instance(&self) -> bool {
        self.instance_open
    }

    fn require_instance(&self, operation: &'static str) -> Result<()> {
        if self.instance_open {
            Ok(())
        } else {
            Err(EngineError::NoInstance(operation))
        }
    }

    fn prepare_output(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl SimulationEngine for LibraryEngine {
    fn create_instance(&mut self, options: InstanceOptions) -> Result<()> {
        // SAFETY: plain integer arguments.
        let created = unsafe {
            (self.symbols.create_instance)(options.max_turbines, options.environment_tag)
        };
        if !created {
            return Err(EngineError::InstantiationFailed {
                max_turbines: options.max_turbines,
                environment_tag: options.environment_tag,
            });
        }
        self.instance_open = true;
        Ok(())
    }

    fn set_log_file(&mut self, path: &Path) -> Result<()> {
        self.require_instance("setLogFile")?;
        Self::prepare_output(path)?;
        let path = c_path(path)?;
        // SAFETY: NUL-terminated string alive for the call.
        unsafe { (self.symbols.set_log_file)(path.as_ptr()) };
        Ok(())
    }

    fn set_omp_threads(&mut self, threads: u32) -> Result<()> {
        self.require_instance("setOmpNumThreads")?;
        let threads = c_int::try_from(threads).unwrap_or(c_int::MAX);
        // SAFETY: plain integer argument.
        unsafe { (self.symbols.set_omp_num_threads)(threads) };
        Ok(())
    }

    fn load(&mut self, input: &ProjectInput) -> Result<()> {
        self.require_instance("load")?;
        let path = input.path();
        if !path.is_file() {
            return Err(EngineError::InputNotFound(path.to_path_buf()));
        }
        let raw = c_path(path)?;
        let loader = match input {
            ProjectInput::Project(_) => self.symbols.load_project,
            ProjectInput::SimDefinition(_) => self.symbols.load_sim_definition,
        };
        debug!(kind = input.kind(), path = %path.display(), "loading engine input");
        // SAFETY: NUL-terminated string alive for the call.
        unsafe { loader(raw.as_ptr()) };
        Ok(())
    }

    fn set_timestep_size(&mut self, seconds: f64) -> Result<()> {
        self.require_instance("setTimestepSize")?;
        // SAFETY: plain float argument.
        unsafe { (self.symbols.set_timestep_size)(seconds) };
        Ok(())
    }

    fn set_rampup_time(&mut self, seconds: f64) -> Result<()> {
        self.require_instance("setRampupTime")?;
        // SAFETY: plain float argument.
        unsafe { (self.symbols.set_rampup_time)(seconds) };
        Ok(())
    }

    fn set_power_law_wind(&mut self, wind: &PowerLawWind) -> Result<()> {
        self.require_instance("setPowerLawWind")?;
        // SAFETY: plain float arguments.
        unsafe {
            (self.symbols.set_power_law_wind)(
                wind.windspeed,
                wind.horizontal_angle,
                wind.vertical_angle,
                wind.shear_exponent,
                wind.reference_height,
            )
        };
        Ok(())
    }

    fn initialize_simulation(&mut self) -> Result<()> {
        self.require_instance("initializeSimulation")?;
        // SAFETY: no arguments; instance exists.
        unsafe { (self.symbols.initialize_simulation)() };
        Ok(())
    }

    fn advance_turbine_simulation(&mut self) -> bool {
        if !self.instance_open {
            warn!("advance requested without an engine instance");
            return false;
        }
        // SAFETY: no arguments; instance exists.
        unsafe { (self.symbols.advance_turbine_simulation)() }
    }

    fn run_full_simulation(&mut self) -> bool {
        if !self.instance_open {
            warn!("full run requested without an engine instance");
            return false;
        }
        // SAFETY: no arguments; instance exists.
        unsafe { (self.symbols.run_full_simulation)() }
    }

    fn tower_bottom_loads(&mut self, turbine: TurbineIndex) -> LoadVector {
        let mut raw = [0.0_f64; LoadVector::LEN];
        if self.instance_open {
            // SAFETY: the engine writes exactly six doubles.
            unsafe { (self.symbols.get_tower_bottom_loads_at_num)(raw.as_mut_ptr(), turbine.get()) };
        }
        LoadVector::from_raw(raw)
    }

    fn custom_data(&mut self, variable: &NamedVariable, turbine: TurbineIndex) -> Result<f64> {
        self.require_instance("getCustomData_at_num")?;
        let name = c_string(variable.name())?;
        // SAFETY: NUL-terminated string alive for the call.
        let value = unsafe {
            (self.symbols.get_custom_data_at_num)(
                name.as_ptr(),
                variable.position().as_raw(),
                turbine.get(),
            )
        };
        Ok(value)
    }

    fn windspeed(&mut self, position: GlobalPosition) -> WindSample {
        let mut raw = [0.0_f64; WindSample::LEN];
        if self.instance_open {
            // SAFETY: the engine writes exactly three doubles.
            unsafe {
                (self.symbols.get_windspeed)(position.x, position.y, position.z, raw.as_mut_ptr())
            };
        }
        WindSample::from_raw(raw)
    }

    fn advance_controller(&mut self, turbine: TurbineIndex) -> ControlVector {
        let mut raw = [0.0_f64; ControlVector::LEN];
        if self.instance_open {
            // SAFETY: the engine writes exactly five doubles.
            unsafe { (self.symbols.advance_controller_at_num)(raw.as_mut_ptr(), turbine.get()) };
        }
        ControlVector::from_raw(raw)
    }

    fn set_control_vars(&mut self, control: &ControlVector, turbine: TurbineIndex) {
        if !self.instance_open {
            warn!("control write requested without an engine instance");
            return;
        }
        let mut raw = control.to_raw();
        // SAFETY: the engine reads exactly five doubles.
        unsafe { (self.symbols.set_control_vars_at_num)(raw.as_mut_ptr(), turbine.get()) };
    }

    fn store_project(&mut self, path: &Path) -> Result<()> {
        self.require_instance("storeProject")?;
        let raw = c_path(path)?;
        let store = self.symbols.store_project;
        // SAFETY: NUL-terminated string alive for the call.
        write_fresh(path, || unsafe { store(raw.as_ptr()) })
    }

    fn export_results(&mut self, request: &ExportRequest) -> Result<()> {
        self.require_instance("exportResults")?;
        std::fs::create_dir_all(&request.directory)?;
        // The engine concatenates directory and file name verbatim.
        let mut directory = request
            .directory
            .to_str()
            .ok_or_else(|| EngineError::InvalidPath(request.directory.clone()))?
            .to_owned();
        if !directory.ends_with(['/', '\\']) {
            directory.push('/');
        }
        let directory = c_string(&directory)?;
        let base_name = c_string(&request.base_name)?;
        let filter = c_string(&request.filter)?;
        // SAFETY: NUL-terminated strings alive for the call.
        unsafe {
            (self.symbols.export_results)(
                request.format_code,
                directory.as_ptr(),
                base_name.as_ptr(),
                filter.as_ptr(),
            )
        };
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        if !self.instance_open {
            return Err(EngineError::NoInstance("closeInstance"));
        }
        // SAFETY: no arguments; called once per instance.
        unsafe { (self.symbols.close_instance)() };
        self.instance_open = false;
        info!(library = %self.path.display(), "engine instance closed");
        Ok(())
    }
}

/// Runs a foreign writer that reports nothing and checks it produced `path`.
///
/// A file left by an earlier run is removed first, so only a file written
/// by `write` counts as success.
fn write_fresh(path: &Path, write: impl FnOnce()) -> Result<()> {
    LibraryEngine::prepare_output(path)?;
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    write();
    if !path.is_file() {
        return Err(EngineError::Persistence {
            path: path.to_path_buf(),
            reason: "engine did not write the file".to_owned(),
        });
    }
    Ok(())
}

impl Drop for LibraryEngine {
    fn drop(&mut self) {
        if self.instance_open {
            warn!("engine dropped with an open instance; closing");
            // SAFETY: instance still open and the library is still mapped.
            unsafe { (self.symbols.close_instance)() };
            self.instance_open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opening_a_non_library_fails_cleanly() {
        let dir = tempdir().unwrap();
        let fake = dir.path().join("libQBladeFake.so");
        std::fs::write(&fake, b"not an elf").unwrap();
        let err = LibraryEngine::open(&fake).unwrap_err();
        assert!(matches!(err, EngineError::LibraryOpen { .. }));
    }

    #[test]
    fn stale_output_does_not_count_as_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("completed.qpr");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"previous run").unwrap();

        let err = write_fresh(&path, || {}).unwrap_err();
        assert!(matches!(err, EngineError::Persistence { .. }));
        assert!(!path.exists());

        write_fresh(&path, || std::fs::write(&path, b"this run").unwrap()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"this run");
    }

    #[test]
    fn interior_nul_is_rejected_before_the_call() {
        assert!(matches!(
            c_string("Time\0[s]"),
            Err(EngineError::InvalidString(_))
        ));
        assert_eq!(c_string("Time [s]").unwrap().as_bytes(), b"Time [s]");
    }
}
