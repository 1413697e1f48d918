//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Per-step observers and the console status line."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::io::{self, Write};

use crate::error::Result;
use crate::telemetry::StepObservation;

/// Side-effect sink notified after every committed iteration.
pub trait StepObserver {
    fn on_step(&mut self, observation: &StepObservation) -> Result<()>;

    /// Called once when an advance fails at `iteration` (0-based).
    fn on_terminated(&mut self, iteration: u64) -> Result<()>;

    /// Called once after the loop, before persistence.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Both halves are always notified; the first error is returned.
impl<A: StepObserver, B: StepObserver> StepObserver for (A, B) {
    fn on_step(&mut self, observation: &StepObservation) -> Result<()> {
        let first = self.0.on_step(observation);
        first.and(self.1.on_step(observation))
    }

    fn on_terminated(&mut self, iteration: u64) -> Result<()> {
        let first = self.0.on_terminated(iteration);
        first.and(self.1.on_terminated(iteration))
    }

    fn finish(&mut self) -> Result<()> {
        let first = self.0.finish();
        first.and(self.1.finish())
    }
}

impl<O: StepObserver> StepObserver for Option<O> {
    fn on_step(&mut self, observation: &StepObservation) -> Result<()> {
        match self {
            Some(inner) => inner.on_step(observation),
            None => Ok(()),
        }
    }

    fn on_terminated(&mut self, iteration: u64) -> Result<()> {
        match self {
            Some(inner) => inner.on_terminated(iteration),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            Some(inner) => inner.finish(),
            None => Ok(()),
        }
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step(&mut self, _observation: &StepObservation) -> Result<()> {
        Ok(())
    }

    fn on_terminated(&mut self, _iteration: u64) -> Result<()> {
        Ok(())
    }
}

/// Writes one human-readable status line per step.
#[derive(Debug)]
pub struct ConsoleObserver<W: Write> {
    writer: W,
    aoa_span: f64,
}

impl ConsoleObserver<io::Stdout> {
    pub fn stdout(aoa_span: f64) -> Self {
        Self::new(io::stdout(), aoa_span)
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(writer: W, aoa_span: f64) -> Self {
        Self { writer, aoa_span }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> StepObserver for ConsoleObserver<W> {
    fn on_step(&mut self, observation: &StepObservation) -> Result<()> {
        writeln!(self.writer, "{}", status_line(observation, self.aoa_span))?;
        Ok(())
    }

    fn on_terminated(&mut self, iteration: u64) -> Result<()> {
        writeln!(self.writer, "{}", termination_message(iteration))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn termination_message(iteration: u64) -> String {
    format!("Simulation failed at timestep {iteration}. Exiting loop.")
}

/// Formats the status line: elapsed time, first wind component, generator
/// torque, rotor speed, collective pitch and angle of attack.
pub fn status_line(observation: &StepObservation, aoa_span: f64) -> String {
    format!(
        "Time: {:.2}    Windspeed: {:.2}   Torque: {}     RPM: {:.2}    Pitch: {:.2}    AoA at {}%: {:.2}",
        observation.telemetry.elapsed_time_s,
        observation.wind.u,
        scientific(observation.control.torque(), 4),
        observation.telemetry.rotor_speed_rpm,
        observation.control.pitch(),
        (aoa_span * 100.0).round() as i64,
        observation.telemetry.angle_of_attack_deg,
    )
}

/// Scientific notation with a signed, two-digit exponent (`1.2345e+04`).
fn scientific(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let formatted = format!("{value:.precision$e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_engine::{ControlVector, LoadVector, WindSample};
    use indexmap::IndexMap;

    use crate::telemetry::TurbineTelemetry;

    fn observation() -> StepObservation {
        StepObservation {
            iteration: 0,
            loads: LoadVector::default(),
            telemetry: TurbineTelemetry {
                rotor_speed_rpm: 11.873,
                elapsed_time_s: 0.05,
                angle_of_attack_deg: 6.4321,
            },
            wind: WindSample {
                u: 11.4,
                v: 0.0,
                w: 0.0,
            },
            control: ControlVector {
                generator_torque: 43093.55,
                yaw_angle: 0.0,
                pitch_blade_1: 0.5,
                pitch_blade_2: 0.5,
                pitch_blade_3: 0.5,
            },
            extra: IndexMap::new(),
        }
    }

    #[test]
    fn scientific_uses_signed_two_digit_exponent() {
        assert_eq!(scientific(43093.55, 4), "4.3094e+04");
        assert_eq!(scientific(0.00012, 2), "1.20e-04");
        assert_eq!(scientific(0.0, 4), "0.0000e+00");
        assert_eq!(scientific(f64::NAN, 4), "nan");
    }

    #[test]
    fn status_line_reports_all_fields() {
        let line = status_line(&observation(), 0.85);
        assert_eq!(
            line,
            "Time: 0.05    Windspeed: 11.40   Torque: 4.3094e+04     RPM: 11.87    Pitch: 0.50    AoA at 85%: 6.43"
        );
    }

    #[test]
    fn console_observer_writes_lines_and_termination() {
        let mut console = ConsoleObserver::new(Vec::new(), 0.85);
        console.on_step(&observation()).unwrap();
        console.on_terminated(3).unwrap();
        console.finish().unwrap();
        let text = String::from_utf8(console.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Time: 0.05"));
        assert_eq!(lines[1], "Simulation failed at timestep 3. Exiting loop.");
    }

    struct Broken;

    impl StepObserver for Broken {
        fn on_step(&mut self, _observation: &StepObservation) -> Result<()> {
            Err(io::Error::other("broken pipe").into())
        }

        fn on_terminated(&mut self, _iteration: u64) -> Result<()> {
            Err(io::Error::other("broken pipe").into())
        }
    }

    #[test]
    fn pair_notifies_both_halves_when_the_first_fails() {
        let mut pair = (Broken, ConsoleObserver::new(Vec::new(), 0.85));
        assert!(pair.on_step(&observation()).is_err());
        assert!(pair.on_terminated(1).is_err());
        assert!(pair.finish().is_ok());
        let text = String::from_utf8(pair.1.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
