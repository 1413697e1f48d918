//! ---
//! cosim_section: "06-entrypoint"
//! cosim_subsection: "binary"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Binary entrypoint for the co-simulation driver."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};
use cosim_common::{init_tracing, AppConfig, EngineConfig, LoadedAppConfig, LogFormat};
use cosim_driver::{
    ConsoleObserver, DriverSettings, EngineController, RunMode, RunReport, SimulationDriver,
    TelemetryRecorder,
};
use cosim_engine::{
    locate_library, prepend_search_path, EngineError, LibraryEngine, ProjectInput, LIBRARY_MARKER,
};
use tracing::{error, info, warn};

/// Exit status for unusable configuration or arguments.
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("WT-COSIM ", env!("CARGO_PKG_VERSION")),
    about = "Couple a wind-turbine simulation engine to its controller, step by step",
    long_about = None
)]
#[command(group(ArgGroup::new("input").args(["project", "sim_definition"])))]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Engine shared library to load")]
    library: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory scanned for the engine library when --library is absent"
    )]
    search_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Project file to simulate")]
    project: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Simulation definition file to simulate")]
    sim_definition: Option<PathBuf>,

    #[arg(long, help = "Number of co-simulation iterations")]
    iterations: Option<u64>,

    #[arg(long, value_enum, help = "Console log format")]
    log_format: Option<CliLogFormat>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Pretty,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Json => LogFormat::StructuredJson,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    #[command(about = "Drive the simulation one step at a time (default)")]
    Run,
    #[command(about = "Let the engine run the whole simulation in one call")]
    Batch,
    #[command(about = "Print the engine library that would be loaded and exit")]
    Locate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("WT-COSIM {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "cosim-run aborted");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let LoadedAppConfig {
        mut config,
        source,
    } = load_config(&cli)?;
    apply_overrides(&cli, &mut config)?;
    init_tracing("cosim-run", &config.logging)?;
    match &source {
        Some(path) => info!(config = %path.display(), "configuration loaded"),
        None => info!("no configuration file; using built-in defaults"),
    }

    let library = match resolve_library(&config.engine) {
        Ok(path) => path,
        Err(err) if err.is_library_not_found() => {
            error!(error = %err, "engine library not found");
            println!(
                "No matching {marker}*.dll or {marker}*.so files found in the specified directory: {}",
                display_dir(&config.engine).display(),
                marker = LIBRARY_MARKER,
            );
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    let command = cli.command.unwrap_or(Commands::Run);
    if command == Commands::Locate {
        println!("{}", library.display());
        return Ok(ExitCode::SUCCESS);
    }
    let mode = match command {
        Commands::Batch => RunMode::Batch,
        _ => RunMode::Stepped,
    };

    let settings = DriverSettings::from_config(&config)?;
    if let Err(err) = simulate(&config, settings, &library, mode) {
        // Engine-side failures are reported but do not change the exit status.
        error!(error = %err, "co-simulation failed");
        eprintln!("co-simulation failed: {err:#}");
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(cli: &Cli) -> Result<LoadedAppConfig> {
    match &cli.config {
        Some(path) => AppConfig::load_with_source(&[path]),
        None => AppConfig::load_or_default(&[
            PathBuf::from("cosim.toml"),
            PathBuf::from("configs/cosim.toml"),
        ]),
    }
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) -> Result<()> {
    if let Some(library) = &cli.library {
        config.engine.library = Some(library.clone());
    }
    if let Some(dir) = &cli.search_dir {
        config.engine.search_dir = dir.clone();
    }
    if let Some(project) = &cli.project {
        config.input.set(ProjectInput::Project(project.clone()));
    }
    if let Some(definition) = &cli.sim_definition {
        config.input.set(ProjectInput::SimDefinition(definition.clone()));
    }
    if let Some(iterations) = cli.iterations {
        config.run.iterations = iterations;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    config
        .validate()
        .context("configuration invalid after command-line overrides")
}

/// Explicit library path wins; otherwise scan the search directory.
fn resolve_library(engine: &EngineConfig) -> std::result::Result<PathBuf, EngineError> {
    match &engine.library {
        Some(path) if path.is_file() => Ok(path.clone()),
        Some(path) => Err(EngineError::LibraryNotFound {
            directory: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            marker: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| LIBRARY_MARKER.to_owned()),
        }),
        None => locate_library(&engine.search_dir),
    }
}

fn display_dir(engine: &EngineConfig) -> PathBuf {
    let dir = match &engine.library {
        Some(path) => path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        None => engine.search_dir.clone(),
    };
    std::path::absolute(&dir).unwrap_or(dir)
}

fn simulate(
    config: &AppConfig,
    settings: DriverSettings,
    library: &Path,
    mode: RunMode,
) -> Result<()> {
    println!("Using shared library file: {}", library.display());
    if let Some(dir) = library.parent() {
        prepend_search_path(dir)
            .with_context(|| format!("unable to add {} to the search path", dir.display()))?;
    }
    let engine = LibraryEngine::open(library)?;

    let recorder = match &config.output.telemetry_csv {
        Some(path) => Some(
            TelemetryRecorder::<File>::create(path, settings.channels.extra_labels())
                .with_context(|| format!("unable to create telemetry file {}", path.display()))?,
        ),
        None => None,
    };
    let console = ConsoleObserver::stdout(config.telemetry.angle_of_attack_span);
    let mut driver = SimulationDriver::new(settings, EngineController, (console, recorder));
    info!(run_id = %driver.run_id(), library = %library.display(), ?mode, "starting co-simulation");

    let result = match mode {
        RunMode::Stepped => driver.run(engine),
        RunMode::Batch => driver.run_batch(engine),
    };
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(report) = driver.failure_report() {
                write_report(report, config.output.report.as_deref());
            }
            return Err(err.into());
        }
    };
    info!(
        outcome = ?report.outcome,
        completed = report.completed_iterations,
        persisted = report.persisted(),
        observer_failures = report.observer_failures,
        "co-simulation finished"
    );
    write_report(&report, config.output.report.as_deref());
    Ok(())
}

fn write_report(report: &RunReport, path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if let Err(err) = report.write_json(path) {
        warn!(path = %path.display(), error = %err, "failed to write run report");
    }
}
