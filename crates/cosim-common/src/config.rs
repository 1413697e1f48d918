//! ---
//! cosim_section: "01-core-functionality"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Run configuration model and loader."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use cosim_engine::{GlobalPosition, InstanceOptions, NamedVariable, PowerLawWind, ProjectInput};
use indexmap::IndexMap;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_search_dir() -> PathBuf {
    PathBuf::from("../")
}

fn default_max_turbines() -> i32 {
    InstanceOptions::default().max_turbines
}

fn default_environment_tag() -> i32 {
    InstanceOptions::default().environment_tag
}

fn default_project() -> Option<PathBuf> {
    Some(PathBuf::from("./NREL_5MW_Sample.qpr"))
}

fn default_iterations() -> u64 {
    500
}

fn default_rotor_speed_channel() -> String {
    "Rotational Speed [rpm]".to_owned()
}

fn default_time_channel() -> String {
    "Time [s]".to_owned()
}

fn default_aoa_channel() -> String {
    "Angle of Attack at 0.25c (at section) BLD_1 [deg]".to_owned()
}

fn default_aoa_span() -> f64 {
    0.85
}

fn default_wind_probe() -> GlobalPosition {
    GlobalPosition::new(-50.0, 0.0, 100.0)
}

fn default_output_project() -> PathBuf {
    PathBuf::from("./NREL_5MW_Sample_completed.qpr")
}

fn default_results_directory() -> PathBuf {
    PathBuf::from("./")
}

fn default_results_name() -> String {
    "NREL_5MW_Sample_results".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for a co-simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "COSIM_CONFIG";

    /// Load configuration from disk, respecting the `COSIM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Like [`AppConfig::load_with_source`] but falls back to defaults when no
    /// candidate exists. A file that exists but fails to parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        let env_override = std::env::var(Self::ENV_CONFIG_PATH)
            .map(|value| !value.trim().is_empty())
            .unwrap_or(false);
        if env_override || candidates.iter().any(|c| c.as_ref().exists()) {
            return Self::load_with_source(candidates);
        }
        debug!("no configuration file found; using built-in defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let mut config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_relative_to(base)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Rebase every relative path in the configuration onto `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) -> Result<()> {
        let rebase = |path: &mut PathBuf| -> Result<()> {
            if path.is_relative() {
                let resolved = path
                    .absolutize_from(base)
                    .with_context(|| format!("unable to resolve {}", path.display()))?
                    .into_owned();
                *path = resolved;
            }
            Ok(())
        };

        if let Some(library) = self.engine.library.as_mut() {
            rebase(library)?;
        }
        rebase(&mut self.engine.search_dir)?;
        if let Some(log_file) = self.engine.log_file.as_mut() {
            rebase(log_file)?;
        }
        if let Some(project) = self.input.project.as_mut() {
            rebase(project)?;
        }
        if let Some(sim) = self.input.sim_definition.as_mut() {
            rebase(sim)?;
        }
        rebase(&mut self.output.project)?;
        rebase(&mut self.output.results_directory)?;
        if let Some(csv) = self.output.telemetry_csv.as_mut() {
            rebase(csv)?;
        }
        if let Some(report) = self.output.report.as_mut() {
            rebase(report)?;
        }
        rebase(&mut self.logging.directory)?;
        Ok(())
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.input.project_input()?;
        self.run.validate()?;
        self.telemetry.validate()?;
        if self.output.results_name.trim().is_empty() {
            return Err(anyhow!("output.results_name must not be empty"));
        }
        if self.engine.max_turbines < 1 {
            return Err(anyhow!("engine.max_turbines must be at least 1"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where the engine library lives and how its instance is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit library file. Skips the directory scan when set.
    #[serde(default)]
    pub library: Option<PathBuf>,
    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,
    #[serde(default = "default_max_turbines")]
    pub max_turbines: i32,
    #[serde(default = "default_environment_tag")]
    pub environment_tag: i32,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub omp_threads: Option<u32>,
}

impl EngineConfig {
    pub fn instance_options(&self) -> InstanceOptions {
        InstanceOptions {
            max_turbines: self.max_turbines,
            environment_tag: self.environment_tag,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library: None,
            search_dir: default_search_dir(),
            max_turbines: default_max_turbines(),
            environment_tag: default_environment_tag(),
            log_file: None,
            omp_threads: None,
        }
    }
}

/// Exactly one of `project` or `sim_definition` must be set. The sample
/// project is only assumed when the whole `[input]` table is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub project: Option<PathBuf>,
    #[serde(default)]
    pub sim_definition: Option<PathBuf>,
}

impl InputConfig {
    pub fn project_input(&self) -> Result<ProjectInput> {
        match (&self.project, &self.sim_definition) {
            (Some(project), None) => Ok(ProjectInput::Project(project.clone())),
            (None, Some(sim)) => Ok(ProjectInput::SimDefinition(sim.clone())),
            (Some(_), Some(_)) => Err(anyhow!(
                "input.project and input.sim_definition are mutually exclusive"
            )),
            (None, None) => Err(anyhow!(
                "one of input.project or input.sim_definition is required"
            )),
        }
    }

    /// Replace the configured input, clearing the other variant.
    pub fn set(&mut self, input: ProjectInput) {
        match input {
            ProjectInput::Project(path) => {
                self.project = Some(path);
                self.sim_definition = None;
            }
            ProjectInput::SimDefinition(path) => {
                self.project = None;
                self.sim_definition = Some(path);
            }
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            sim_definition: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Timestep override in seconds, applied after load.
    #[serde(default)]
    pub timestep: Option<f64>,
    /// Ramp-up duration override in seconds, applied after load.
    #[serde(default)]
    pub rampup_time: Option<f64>,
    #[serde(default)]
    pub power_law_wind: Option<PowerLawWind>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(dt) = self.timestep {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(anyhow!("run.timestep must be a positive number of seconds"));
            }
        }
        if let Some(rampup) = self.rampup_time {
            if !(rampup.is_finite() && rampup >= 0.0) {
                return Err(anyhow!("run.rampup_time must not be negative"));
            }
        }
        if let Some(wind) = &self.power_law_wind {
            if !(wind.reference_height.is_finite() && wind.reference_height > 0.0) {
                return Err(anyhow!(
                    "run.power_law_wind.reference_height must be positive"
                ));
            }
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            timestep: None,
            rampup_time: None,
            power_law_wind: None,
        }
    }
}

/// Extra engine variable sampled every step and written to the telemetry CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub variable: String,
    #[serde(default)]
    pub span: Option<f64>,
}

impl ChannelConfig {
    pub fn named_variable(&self) -> Result<NamedVariable> {
        match self.span {
            None => Ok(NamedVariable::global(self.variable.clone())),
            Some(span) => NamedVariable::at_span(self.variable.clone(), span)
                .with_context(|| format!("invalid span for channel '{}'", self.variable)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_rotor_speed_channel")]
    pub rotor_speed: String,
    #[serde(default = "default_time_channel")]
    pub elapsed_time: String,
    #[serde(default = "default_aoa_channel")]
    pub angle_of_attack: String,
    #[serde(default = "default_aoa_span")]
    pub angle_of_attack_span: f64,
    #[serde(default = "default_wind_probe")]
    pub wind_probe: GlobalPosition,
    #[serde(default)]
    pub channels: IndexMap<String, ChannelConfig>,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        NamedVariable::at_span(self.angle_of_attack.clone(), self.angle_of_attack_span)
            .context("telemetry.angle_of_attack_span")?;
        for (label, channel) in &self.channels {
            if label.trim().is_empty() {
                return Err(anyhow!("telemetry channel labels must not be empty"));
            }
            channel.named_variable()?;
        }
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            rotor_speed: default_rotor_speed_channel(),
            elapsed_time: default_time_channel(),
            angle_of_attack: default_aoa_channel(),
            angle_of_attack_span: default_aoa_span(),
            wind_probe: default_wind_probe(),
            channels: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Completed project written by the engine after the loop.
    #[serde(default = "default_output_project")]
    pub project: PathBuf,
    #[serde(default = "default_results_directory")]
    pub results_directory: PathBuf,
    #[serde(default = "default_results_name")]
    pub results_name: String,
    #[serde(default)]
    pub results_filter: String,
    #[serde(default)]
    pub telemetry_csv: Option<PathBuf>,
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            project: default_output_project(),
            results_directory: default_results_directory(),
            results_name: default_results_name(),
            results_filter: String::new(),
            telemetry_csv: None,
            report: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
