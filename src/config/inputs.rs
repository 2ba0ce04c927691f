// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Local I/O input configuration
//!
//! Settings of the expansion card inputs monitored next to the Modbus
//! poller: a 0-10 V analog input, a 4-20 mA analog input and an
//! opto-isolated digital input.

use serde::{Deserialize, Serialize};

use crate::config_store::Derive;
use crate::error::ConfigValidationError;
use crate::preprocessing::filters::{MAX_CUTOFF_HZ, MIN_CUTOFF_HZ};
use crate::threshold::{AlertEdge, ThresholdConfig};

/// Lower end of the nominal voltage input range, in volts
pub const VOLTAGE_IN_LOW: f64 = 0.0;
/// Upper end of the nominal voltage input range, in volts
pub const VOLTAGE_IN_HIGH: f64 = 10.0;
/// Lower end of the nominal current loop range, in amperes
pub const CURRENT_IN_LOW: f64 = 0.004;
/// Upper end of the nominal current loop range, in amperes
pub const CURRENT_IN_HIGH: f64 = 0.020;

/// Calibration, scaling, filtering and alarms of one analog input.
///
/// The scaled value is `map(calibrated, nominal_low, nominal_high,
/// sensor_low, sensor_high)`, so `sensor_low` / `sensor_high` are the
/// engineering values reported at the two ends of the nominal range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogChannelConfig {
    pub cal_gain: f64,
    pub cal_offset: f64,
    pub sensor_low: f64,
    pub sensor_high: f64,
    /// Low-pass filter cutoff in Hz
    pub sensor_fc: f64,
    /// Alarm on the scaled value, reported on falling transitions by default
    pub low: ThresholdConfig,
    /// Alarm on the scaled value, reported on rising transitions by default
    pub high: ThresholdConfig,
    /// Loop fault detection on the calibrated current (current input only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_low: Option<ThresholdConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_high: Option<ThresholdConfig>,
}

impl AnalogChannelConfig {
    /// Defaults of the 0-10 V input
    pub fn voltage() -> Self {
        Self {
            cal_gain: 1.0,
            cal_offset: 0.0,
            sensor_low: VOLTAGE_IN_LOW,
            sensor_high: VOLTAGE_IN_HIGH,
            sensor_fc: 1.0,
            low: ThresholdConfig::new(2.0, 1.0, AlertEdge::Below),
            high: ThresholdConfig::new(8.0, 1.0, AlertEdge::Above),
            fault_low: None,
            fault_high: None,
        }
    }

    /// Defaults of the 4-20 mA input
    pub fn current() -> Self {
        Self {
            cal_gain: 1.0,
            cal_offset: 0.0,
            sensor_low: CURRENT_IN_LOW,
            sensor_high: CURRENT_IN_HIGH,
            sensor_fc: 1.0,
            low: ThresholdConfig::new(0.008, 0.002, AlertEdge::Below),
            high: ThresholdConfig::new(0.016, 0.002, AlertEdge::Above),
            fault_low: Some(ThresholdConfig::new(
                CURRENT_IN_LOW - 0.000125,
                0.000125,
                AlertEdge::Both,
            )),
            fault_high: Some(ThresholdConfig::new(
                CURRENT_IN_HIGH + 0.000875,
                0.000875,
                AlertEdge::Both,
            )),
        }
    }

    /// `field` prefixes reported field names, e.g. `inputs.voltage`
    pub fn validate(&self, field: &str) -> Result<(), ConfigValidationError> {
        for (name, value) in [
            ("cal_gain", self.cal_gain),
            ("cal_offset", self.cal_offset),
            ("sensor_low", self.sensor_low),
            ("sensor_high", self.sensor_high),
        ] {
            if !value.is_finite() {
                return Err(ConfigValidationError::new(
                    format!("{}.{}", field, name),
                    "value must be finite",
                ));
            }
        }
        if !(MIN_CUTOFF_HZ..=MAX_CUTOFF_HZ).contains(&self.sensor_fc) {
            return Err(ConfigValidationError::new(
                format!("{}.sensor_fc", field),
                format!(
                    "cutoff {} Hz outside {}..={} Hz",
                    self.sensor_fc, MIN_CUTOFF_HZ, MAX_CUTOFF_HZ
                ),
            ));
        }
        self.low.validate(&format!("{}.low", field))?;
        self.high.validate(&format!("{}.high", field))?;
        if let Some(fault) = &self.fault_low {
            fault.validate(&format!("{}.fault_low", field))?;
        }
        if let Some(fault) = &self.fault_high {
            fault.validate(&format!("{}.fault_high", field))?;
        }
        Ok(())
    }
}

impl Derive for AnalogChannelConfig {}

/// Which transitions of the digital input raise an `io_in` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

impl EdgeType {
    pub fn accepts(self, previous: bool, current: bool) -> bool {
        match self {
            EdgeType::None => false,
            EdgeType::Rising => !previous && current,
            EdgeType::Falling => previous && !current,
            EdgeType::Both => previous != current,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitalInputConfig {
    /// Mark events for immediate delivery
    pub immediate: bool,
    pub edge: EdgeType,
}

impl Derive for DigitalInputConfig {}

/// Local inputs section of the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// ADC sampling period in milliseconds
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    #[serde(default = "AnalogChannelConfig::voltage")]
    pub voltage: AnalogChannelConfig,

    #[serde(default = "AnalogChannelConfig::current")]
    pub current: AnalogChannelConfig,

    #[serde(default)]
    pub digital: DigitalInputConfig,
}

fn default_sample_period_ms() -> u64 {
    10
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_period_ms: default_sample_period_ms(),
            voltage: AnalogChannelConfig::voltage(),
            current: AnalogChannelConfig::current(),
            digital: DigitalInputConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalogChannelConfig::voltage().validate("inputs.voltage").is_ok());
        assert!(AnalogChannelConfig::current().validate("inputs.current").is_ok());
    }

    #[test]
    fn cutoff_range_is_enforced() {
        let mut config = AnalogChannelConfig::voltage();
        config.sensor_fc = 0.0;
        assert_eq!(
            config.validate("inputs.voltage").unwrap_err().field,
            "inputs.voltage.sensor_fc"
        );
        config.sensor_fc = 50.5;
        assert!(config.validate("inputs.voltage").is_err());
        config.sensor_fc = 50.0;
        assert!(config.validate("inputs.voltage").is_ok());
    }

    #[test]
    fn fault_hysteresis_is_checked() {
        let mut config = AnalogChannelConfig::current();
        if let Some(fault) = config.fault_high.as_mut() {
            fault.hysteresis = -1.0;
        }
        assert_eq!(
            config.validate("inputs.current").unwrap_err().field,
            "inputs.current.fault_high.hysteresis"
        );
    }

    #[test]
    fn edges() {
        assert!(EdgeType::Rising.accepts(false, true));
        assert!(!EdgeType::Rising.accepts(true, false));
        assert!(EdgeType::Falling.accepts(true, false));
        assert!(EdgeType::Both.accepts(true, false));
        assert!(!EdgeType::Both.accepts(true, true));
        assert!(!EdgeType::None.accepts(false, true));
    }

    #[test]
    fn missing_channels_take_their_own_defaults() {
        let inputs: InputsConfig = serde_yml::from_str("enabled: true\n").unwrap();
        assert!(inputs.enabled);
        assert_eq!(inputs.voltage, AnalogChannelConfig::voltage());
        assert_eq!(inputs.current, AnalogChannelConfig::current());
        assert_eq!(inputs.sample_period_ms, 10);
    }
}
