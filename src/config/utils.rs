// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Schema output and the validation rules the JSON schema cannot express.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::debug;

use super::Config;

/// Output the embedded JSON schema to the console.
///
/// Called for the `--show-config-schema` flag.
///
/// ```bash
/// ./rust_fieldbus_monitor --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    println!("{}", config_schema_pretty()?);
    Ok(())
}

/// Embedded JSON schema, pretty-printed
pub fn config_schema_pretty() -> Result<String> {
    let schema_str = include_str!("../../resources/config.schema.json");
    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;
    serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")
}

/// Validates the configuration against rules that aren't covered by the
/// JSON schema.
///
/// # Validation Rules
///
/// - **Register names**: non-empty and unique across the slots
/// - **Descriptors**: server id, timeout, poll interval, finite scale and
///   offset, threshold hysteresis
/// - **Bus**: inter-message delay bound
/// - **Inputs**: calibration values, filter cutoff range, thresholds
/// - **Poller**: tick period of at least one millisecond
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let mut names = HashSet::new();
    for (index, register) in config.registers.iter().enumerate() {
        if register.name.trim().is_empty() {
            anyhow::bail!("Register #{} has an empty name", index);
        }
        if !names.insert(register.name.as_str()) {
            anyhow::bail!("Duplicate register name: {}", register.name);
        }
        register
            .descriptor
            .validate()
            .with_context(|| format!("Invalid register '{}'", register.name))?;
    }

    config
        .bus
        .settings
        .validate()
        .context("Invalid bus settings")?;

    if config.poller.tick_ms == 0 {
        anyhow::bail!("Poller tick period must be at least 1 ms");
    }

    config
        .inputs
        .voltage
        .validate("inputs.voltage")
        .context("Invalid voltage input")?;
    config
        .inputs
        .current
        .validate("inputs.current")
        .context("Invalid current input")?;
    if config.inputs.sample_period_ms == 0 {
        anyhow::bail!("Input sample period must be at least 1 ms");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = Config::default();
        config.registers[1].name = config.registers[0].name.clone();
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("Duplicate register name"));
    }

    #[test]
    fn descriptor_errors_name_the_register() {
        let mut config = Config::default();
        config.registers[2].descriptor.server_id = 0;
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("modbus3"));
        assert!(format!("{:#}", err).contains("id"));
    }

    #[test]
    fn input_cutoff_is_checked() {
        let mut config = Config::default();
        config.inputs.current.sensor_fc = 0.0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn schema_is_valid_json() {
        let pretty = config_schema_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        assert!(value["properties"]["registers"].is_object());
    }
}
