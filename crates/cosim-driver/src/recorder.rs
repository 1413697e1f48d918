//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "CSV recorder for per-step observations."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use csv::Writer;

use crate::error::{DriverError, Result};
use crate::observer::StepObserver;
use crate::telemetry::StepObservation;

const FIXED_COLUMNS: [&str; 18] = [
    "iteration",
    "time_s",
    "rotor_speed_rpm",
    "angle_of_attack_deg",
    "wind_u",
    "wind_v",
    "wind_w",
    "generator_torque",
    "yaw_angle",
    "pitch_blade_1",
    "pitch_blade_2",
    "pitch_blade_3",
    "tower_force_x",
    "tower_force_y",
    "tower_force_z",
    "tower_moment_x",
    "tower_moment_y",
    "tower_moment_z",
];

/// Appends one CSV row per committed iteration.
pub struct TelemetryRecorder<W: Write> {
    writer: Writer<W>,
    extra_labels: Vec<String>,
    rows: u64,
}

impl TelemetryRecorder<File> {
    pub fn create<'a>(
        path: &Path,
        extra_labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Self::from_writer(File::create(path)?, extra_labels)
    }
}

impl<W: Write> TelemetryRecorder<W> {
    pub fn from_writer<'a>(
        inner: W,
        extra_labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let extra_labels: Vec<String> = extra_labels.into_iter().map(str::to_owned).collect();
        let mut writer = Writer::from_writer(inner);
        let header = FIXED_COLUMNS
            .iter()
            .copied()
            .chain(extra_labels.iter().map(String::as_str));
        writer.write_record(header)?;
        Ok(Self {
            writer,
            extra_labels,
            rows: 0,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| DriverError::Io(err.into_error()))
    }
}

impl<W: Write> StepObserver for TelemetryRecorder<W> {
    fn on_step(&mut self, observation: &StepObservation) -> Result<()> {
        let mut record = Vec::with_capacity(FIXED_COLUMNS.len() + self.extra_labels.len());
        record.push(observation.iteration.to_string());
        let telemetry = &observation.telemetry;
        let numeric = [
            telemetry.elapsed_time_s,
            telemetry.rotor_speed_rpm,
            telemetry.angle_of_attack_deg,
        ]
        .into_iter()
        .chain(observation.wind.to_raw())
        .chain(observation.control.to_raw())
        .chain(observation.loads.to_raw());
        record.extend(numeric.map(|value| value.to_string()));
        for label in &self.extra_labels {
            let value = observation.extra.get(label).copied().unwrap_or(f64::NAN);
            record.push(value.to_string());
        }
        self.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    fn on_terminated(&mut self, _iteration: u64) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
