//! ---
//! cosim_section: "01-core-functionality"
//! cosim_subsection: "integration-tests"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Environment override for the configuration file location."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fs;

use cosim_common::{AppConfig, LogFormat};
use tempfile::tempdir;

// Kept as the only test in this binary: it mutates the process environment.
#[test]
fn env_override_takes_precedence_over_candidates() {
    let dir = tempdir().unwrap();
    let candidate = dir.path().join("candidate.toml");
    fs::write(&candidate, "[run]\niterations = 7\n").unwrap();
    let override_path = dir.path().join("override.toml");
    fs::write(
        &override_path,
        "[run]\niterations = 3\n\n[logging]\nformat = \"structured-json\"\ndirectory = \"logs\"\n",
    )
    .unwrap();

    std::env::set_var(AppConfig::ENV_CONFIG_PATH, &override_path);
    let loaded = AppConfig::load_or_default(&[&candidate]);
    std::env::remove_var(AppConfig::ENV_CONFIG_PATH);

    let loaded = loaded.unwrap();
    assert_eq!(loaded.source.as_deref(), Some(override_path.as_path()));
    assert_eq!(loaded.config.run.iterations, 3);
    assert_eq!(loaded.config.logging.format, LogFormat::StructuredJson);
    assert_eq!(loaded.config.logging.directory, dir.path().join("logs"));

    let fallback = AppConfig::load_or_default(&[&candidate]).unwrap();
    assert_eq!(fallback.config.run.iterations, 7);
}
