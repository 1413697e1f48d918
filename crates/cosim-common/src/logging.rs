//! ---
//! cosim_section: "01-core-functionality"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Tracing subscriber setup for the driver process."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "COSIM_LOG";

type Guards = (WorkerGuard, WorkerGuard);

static GUARDS: OnceCell<Guards> = OnceCell::new();

/// Available console log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured-json" | "json" => Ok(LogFormat::StructuredJson),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Install the process-wide subscriber.
///
/// `COSIM_LOG` wins over `RUST_LOG`; both fall back to `info`. Console
/// events go to stderr so stdout carries only status lines. Every event is
/// also appended as JSON to a daily file under `config.directory`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let file_name = log_file_name(config.file_prefix.as_deref(), service_name);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, file_name));
    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = GUARDS.set((file_guard, stderr_guard));

    let console = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .json()
            .with_writer(stderr_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(stderr_writer)
            .boxed(),
    };
    let file = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    // A subscriber installed earlier (tests, embedding tools) is kept.
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(console)
        .with(file)
        .try_init();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "logging ready"
    );
    Ok(())
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring {LOG_ENV}={directive:?} ({err}); logging at info");
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// `{prefix}-{service}.log`; the prefix defaults to the service name.
fn log_file_name(prefix: Option<&str>, service_name: &str) -> String {
    format!("{}-{}.log", prefix.unwrap_or(service_name), service_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_format_parses_aliases() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::StructuredJson);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn log_file_name_defaults_prefix_to_service() {
        assert_eq!(log_file_name(None, "cosim-run"), "cosim-run-cosim-run.log");
        assert_eq!(log_file_name(Some("nrel"), "cosim-run"), "nrel-cosim-run.log");
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("test".into()),
        };
        init_tracing("cosim-test", &config).unwrap();
        assert!(config.directory.is_dir());
    }
}
