//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Run report summarising one co-simulation."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cosim_common::StepTimingSummary;
use cosim_engine::{EngineError, ProjectInput};
use serde::Serialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Driver-controlled step loop.
    Stepped,
    /// One engine call running the whole simulation.
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The engine reported a failed advance; not an error.
    TerminatedEarly,
    /// An engine query failed mid-loop.
    Aborted,
    /// Instantiation, load or initialisation failed; nothing was persisted.
    Failed,
}

/// Result of one best-effort persistence step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceStatus {
    pub target: PathBuf,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PersistenceStatus {
    pub fn from_result(target: PathBuf, result: &std::result::Result<(), EngineError>) -> Self {
        Self {
            target,
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub input: ProjectInput,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub wall_time: Duration,
    pub requested_iterations: u64,
    pub completed_iterations: u64,
    /// Iteration whose advance failed, when the loop ended early.
    pub terminated_at: Option<u64>,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub project: Option<PersistenceStatus>,
    pub results: Option<PersistenceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_error: Option<String>,
    /// Number of observer notifications that failed; the loop kept going.
    pub observer_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observer_error: Option<String>,
    pub step_timing: Option<StepTimingSummary>,
}

impl RunReport {
    pub fn begin(run_id: &str, mode: RunMode, input: &ProjectInput, iterations: u64) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_owned(),
            mode,
            input: input.clone(),
            started_at: now,
            finished_at: now,
            wall_time: Duration::ZERO,
            requested_iterations: iterations,
            completed_iterations: 0,
            terminated_at: None,
            outcome: RunOutcome::Completed,
            error: None,
            project: None,
            results: None,
            release_error: None,
            observer_failures: 0,
            observer_error: None,
            step_timing: None,
        }
    }

    /// Whether both engine artifacts were written.
    pub fn persisted(&self) -> bool {
        [&self.project, &self.results]
            .into_iter()
            .all(|status| matches!(status, Some(s) if s.succeeded))
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn serialises_outcome_and_wall_time() {
        let mut report = RunReport::begin(
            "run-test",
            RunMode::Stepped,
            &ProjectInput::Project(PathBuf::from("sample.qpr")),
            10,
        );
        report.outcome = RunOutcome::TerminatedEarly;
        report.terminated_at = Some(3);
        report.wall_time = Duration::from_millis(1500);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "terminated_early");
        assert_eq!(value["terminated_at"], 3);
        assert_eq!(value["wall_time"], 1.5);
        assert_eq!(value["input"]["project"], "sample.qpr");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn persisted_requires_both_artifacts() {
        let mut report = RunReport::begin(
            "run-test",
            RunMode::Batch,
            &ProjectInput::Project(PathBuf::from("sample.qpr")),
            0,
        );
        assert!(!report.persisted());
        report.project = Some(PersistenceStatus::from_result("a.qpr".into(), &Ok(())));
        report.results = Some(PersistenceStatus::from_result(
            "results".into(),
            &Err(EngineError::NoInstance("exportResults")),
        ));
        assert!(!report.persisted());
        assert!(report.results.as_ref().unwrap().error.is_some());
    }

    #[test]
    fn write_json_creates_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        RunReport::begin(
            "run-test",
            RunMode::Stepped,
            &ProjectInput::SimDefinition(PathBuf::from("def.sim")),
            5,
        )
        .write_json(&path)
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"sim_definition\": \"def.sim\""));
    }
}
