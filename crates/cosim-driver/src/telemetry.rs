//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Typed per-step telemetry read from named engine variables."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use cosim_common::TelemetryConfig;
use cosim_engine::{
    ControlVector, EngineError, GlobalPosition, LoadVector, NamedVariable, SimulationEngine,
    TurbineIndex, WindSample,
};
use indexmap::IndexMap;
use serde::Serialize;

/// Scalar turbine quantities the driver reads every step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TurbineTelemetry {
    pub rotor_speed_rpm: f64,
    pub elapsed_time_s: f64,
    pub angle_of_attack_deg: f64,
}

/// Everything gathered during one successful iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepObservation {
    pub iteration: u64,
    pub loads: LoadVector,
    pub telemetry: TurbineTelemetry,
    pub wind: WindSample,
    pub control: ControlVector,
    /// Extra configured channels, in configuration order.
    pub extra: IndexMap<String, f64>,
}

/// Named-variable keys and the wind probe, resolved once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryChannels {
    rotor_speed: NamedVariable,
    elapsed_time: NamedVariable,
    angle_of_attack: NamedVariable,
    wind_probe: GlobalPosition,
    extra: IndexMap<String, NamedVariable>,
}

impl TelemetryChannels {
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, EngineError> {
        let mut extra = IndexMap::with_capacity(config.channels.len());
        for (label, channel) in &config.channels {
            let variable = match channel.span {
                Some(span) => NamedVariable::at_span(channel.variable.clone(), span)?,
                None => NamedVariable::global(channel.variable.clone()),
            };
            extra.insert(label.clone(), checked(variable)?);
        }
        Ok(Self {
            rotor_speed: checked(NamedVariable::global(config.rotor_speed.clone()))?,
            elapsed_time: checked(NamedVariable::global(config.elapsed_time.clone()))?,
            angle_of_attack: checked(NamedVariable::at_span(
                config.angle_of_attack.clone(),
                config.angle_of_attack_span,
            )?)?,
            wind_probe: config.wind_probe,
            extra,
        })
    }

    pub fn wind_probe(&self) -> GlobalPosition {
        self.wind_probe
    }

    pub fn angle_of_attack(&self) -> &NamedVariable {
        &self.angle_of_attack
    }

    pub fn extra_labels(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }

    /// Reads the three mandatory channels. Each query is independent.
    pub fn sample<E: SimulationEngine + ?Sized>(
        &self,
        engine: &mut E,
        turbine: TurbineIndex,
    ) -> Result<TurbineTelemetry, EngineError> {
        Ok(TurbineTelemetry {
            rotor_speed_rpm: engine.custom_data(&self.rotor_speed, turbine)?,
            elapsed_time_s: engine.custom_data(&self.elapsed_time, turbine)?,
            angle_of_attack_deg: engine.custom_data(&self.angle_of_attack, turbine)?,
        })
    }

    pub fn sample_extra<E: SimulationEngine + ?Sized>(
        &self,
        engine: &mut E,
        turbine: TurbineIndex,
    ) -> Result<IndexMap<String, f64>, EngineError> {
        let mut values = IndexMap::with_capacity(self.extra.len());
        for (label, variable) in &self.extra {
            values.insert(label.clone(), engine.custom_data(variable, turbine)?);
        }
        Ok(values)
    }
}

/// Engine keys travel as C strings, so an interior NUL is rejected up front.
fn checked(variable: NamedVariable) -> Result<NamedVariable, EngineError> {
    if variable.name().contains('\0') {
        return Err(EngineError::InvalidString(variable.name().to_owned()));
    }
    Ok(variable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_common::ChannelConfig;
    use cosim_engine::{InstanceOptions, VariablePosition};
    use cosim_testharness::ScriptedEngine;

    #[test]
    fn defaults_match_the_sample_channels() {
        let channels = TelemetryChannels::from_config(&TelemetryConfig::default()).unwrap();
        assert_eq!(channels.wind_probe(), GlobalPosition::new(-50.0, 0.0, 100.0));
        assert_eq!(
            channels.angle_of_attack().position(),
            VariablePosition::Span(0.85)
        );
        assert_eq!(channels.extra_labels().count(), 0);
    }

    #[test]
    fn rejects_keys_with_interior_nul() {
        let mut config = TelemetryConfig::default();
        config.rotor_speed = "Rotational\0Speed".into();
        assert!(matches!(
            TelemetryChannels::from_config(&config),
            Err(EngineError::InvalidString(_))
        ));
    }

    #[test]
    fn extra_channels_keep_configuration_order() {
        let mut config = TelemetryConfig::default();
        for label in ["pitch_rate", "azimuth", "cl"] {
            config.channels.insert(
                label.into(),
                ChannelConfig {
                    variable: format!("{label} [-]"),
                    span: None,
                },
            );
        }
        let channels = TelemetryChannels::from_config(&config).unwrap();
        let labels: Vec<_> = channels.extra_labels().collect();
        assert_eq!(labels, vec!["pitch_rate", "azimuth", "cl"]);

        let mut engine = ScriptedEngine::default();
        engine.create_instance(InstanceOptions::default()).unwrap();
        let values = channels
            .sample_extra(&mut engine, TurbineIndex::PRIMARY)
            .unwrap();
        assert_eq!(values.keys().map(String::as_str).collect::<Vec<_>>(), labels);
    }
}
