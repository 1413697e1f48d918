//! ---
//! cosim_section: "15-testing"
//! cosim_subsection: "integration-tests"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Configuration file to driver artifacts workflow tests."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use cosim_common::AppConfig;
use cosim_driver::{
    ConsoleObserver, DriverSettings, EngineController, SimulationDriver, TelemetryRecorder,
};
use cosim_engine::ProjectInput;
use cosim_testharness::{EngineCall, EngineScript, ScriptedEngine};
use tempfile::tempdir;

fn read(path: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let full = Path::new(manifest_dir).join("..").join(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

#[test]
fn example_configuration_parses() {
    let config: AppConfig = read("configs/cosim.example.toml")
        .parse()
        .expect("example config is valid");
    assert_eq!(config.run.iterations, 500);
    assert_eq!(config.engine.environment_tag, 32);
    let labels: Vec<_> = config.telemetry.channels.keys().cloned().collect();
    assert_eq!(labels, vec!["azimuth", "cl_tip"]);
    assert_eq!(config.telemetry.channels["cl_tip"].span, Some(0.95));
}

#[test]
fn relative_paths_resolve_against_the_config_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("cosim.toml");
    fs::write(
        &config_path,
        r#"
[input]
sim_definition = "defs/turbine.sim"

[output]
project = "out/completed.qpr"
results_directory = "out"
"#,
    )
    .unwrap();

    let loaded = AppConfig::load_with_source(&[&config_path]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(config_path.as_path()));
    let config = loaded.config;
    match config.input.project_input().unwrap() {
        ProjectInput::SimDefinition(path) => {
            assert_eq!(path, dir.path().join("defs/turbine.sim"))
        }
        other => panic!("unexpected input {other:?}"),
    }
    assert_eq!(config.output.project, dir.path().join("out/completed.qpr"));
    assert_eq!(config.output.results_directory, dir.path().join("out"));
}

#[test]
fn configured_run_writes_telemetry_and_report() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("sample.qpr"), b"project").unwrap();
    let config_path = dir.path().join("cosim.toml");
    fs::write(
        &config_path,
        r#"
[input]
project = "sample.qpr"

[run]
iterations = 5
timestep = 0.1

[telemetry.channels.azimuth]
variable = "Azimuthal Angle Blade 1 [deg]"

[output]
telemetry_csv = "artifacts/telemetry.csv"
report = "artifacts/report.json"
"#,
    )
    .unwrap();

    let config = AppConfig::load(&[&config_path]).unwrap();
    let settings = DriverSettings::from_config(&config).unwrap();
    let csv_path = config.output.telemetry_csv.clone().unwrap();
    let recorder = TelemetryRecorder::create(&csv_path, settings.channels.extra_labels()).unwrap();
    let console = ConsoleObserver::new(Vec::new(), config.telemetry.angle_of_attack_span);

    let engine = ScriptedEngine::new(EngineScript::default().require_existing_input());
    let journal = engine.journal();
    let mut driver = SimulationDriver::new(settings, EngineController, (console, Some(recorder)))
        .with_run_id("workflow");
    let report = driver.run(engine).unwrap();
    let report_path = config.output.report.clone().unwrap();
    report.write_json(&report_path).unwrap();

    assert!(journal.contains(|call| matches!(call, EngineCall::SetTimestepSize(dt) if *dt == 0.1)));

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].ends_with(",azimuth"));
    let last_time: f64 = lines[5].split(',').nth(1).unwrap().parse().unwrap();
    assert!((last_time - 0.5).abs() < 1e-9);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["run_id"], "workflow");
    assert_eq!(json["outcome"], "completed");
    assert_eq!(json["completed_iterations"], 5);
    assert_eq!(json["project"]["succeeded"], true);
    assert_eq!(json["step_timing"]["samples"], 5);
}
