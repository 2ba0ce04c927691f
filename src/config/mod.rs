// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the field bus monitor
//!
//! This module loads, validates and applies the configuration of the
//! monitor. The configuration is backed by a YAML file and validated
//! against an embedded JSON schema before it is deserialized.
//!
//! ## Configuration Structure
//!
//! - `bus`: transport and line settings of the Modbus master
//! - `poller`: scheduler tick period
//! - `registers`: the named poll slots
//! - `inputs`: local analog and digital inputs
//!
//! ## Usage
//!
//! ```no_run
//! use rust_fieldbus_monitor::config::{BaudRate, Config};
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("/dev/ttyS1".to_string()), // Serial device
//!     Some(BaudRate::B9600),          // Baud rate
//!     None,                           // Transport
//! );
//!
//! println!("Polling {} slot(s)", config.registers.len());
//! ```

pub mod inputs;
pub mod modbus;
pub mod registers;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::config_store::Derive;

pub use inputs::{AnalogChannelConfig, DigitalInputConfig, EdgeType, InputsConfig};
pub use modbus::{BaudRate, BusConfig, BusSettings, Parity, TransportKind};
pub use registers::{PollerConfig, RegisterSlotConfig};
pub use utils::{output_config_schema, validate_specific_rules};

/// Number of poll slots in the default configuration
pub const DEFAULT_SLOT_COUNT: usize = 3;

/// Root configuration structure.
///
/// Every section falls back to its defaults when it is missing from the
/// file, so a minimal configuration only lists the registers to poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Modbus master transport and line settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Poll loop settings
    #[serde(default)]
    pub poller: PollerConfig,

    /// Poll slots, polled in declaration order
    #[serde(default = "default_registers")]
    pub registers: Vec<RegisterSlotConfig>,

    /// Local I/O inputs
    #[serde(default)]
    pub inputs: InputsConfig,
}

fn default_registers() -> Vec<RegisterSlotConfig> {
    RegisterSlotConfig::defaults(DEFAULT_SLOT_COUNT)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            poller: PollerConfig::default(),
            registers: default_registers(),
            inputs: InputsConfig::default(),
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// A missing file is created with the default configuration. A file
    /// failing schema or rule validation produces a `.sample.yaml` file next
    /// to it and an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let mut config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };
        config.refresh_derived();

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line overrides.
    ///
    /// Only provided values replace what the file contains.
    ///
    /// # Parameters
    ///
    /// * `device` - Serial device of the RTU transport
    /// * `baud` - Line speed
    /// * `transport` - Transport kind
    pub fn apply_args(
        &mut self,
        device: Option<String>,
        baud: Option<BaudRate>,
        transport: Option<TransportKind>,
    ) {
        if let Some(device) = device {
            debug!("Overriding serial device from command line: {}", device);
            self.bus.device = device;
        }
        if let Some(baud) = baud {
            debug!("Overriding baud rate from command line: {}", baud);
            self.bus.settings.baud = baud;
        }
        if let Some(transport) = transport {
            debug!("Overriding transport from command line: {:?}", transport);
            self.bus.transport = transport;
        }
    }
}

impl Derive for Config {
    fn refresh_derived(&mut self) {
        for register in &mut self.registers {
            register.refresh_derived();
        }
    }
}
