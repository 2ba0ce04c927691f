// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus master bus configuration
//!
//! This module defines the structures describing the shared field bus the
//! poller talks through. Two levels exist:
//!
//! - [`BusConfig`]: how to open the transport (serial RTU, TCP or simulated),
//!   read once at start-up
//! - [`BusSettings`]: line parameters that can be changed at runtime through
//!   a [`ConfigStore`](crate::config_store::ConfigStore); a commit makes the
//!   poller reconfigure the transport before its next tick

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config_store::Derive;
use crate::error::ConfigValidationError;

/// Largest accepted inter-message delay in milliseconds
pub const MAX_INTER_MESSAGE_DELAY_MS: u32 = 10_000;

/// Kind of transport used to reach the field devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Modbus RTU over a serial line (RS-485)
    Rtu,
    /// Modbus TCP
    Tcp,
    /// In-memory simulated bus for testing and development
    Mock,
}

/// Serial baud rates supported by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 8] = [
        BaudRate::B1200,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    pub fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .iter()
            .copied()
            .find(|rate| rate.bits_per_second() == value)
            .ok_or_else(|| format!("unsupported baud rate {}", value))
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value.bits_per_second()
    }
}

impl FromStr for BaudRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid baud rate '{}'", s))?;
        BaudRate::try_from(value)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

/// Serial parity, the line always uses 8 data bits and 1 stop bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Even,
}

/// Runtime-adjustable line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub baud: BaudRate,
    pub parity: Parity,
    /// Idle time inserted between two transactions, in milliseconds
    #[serde(rename = "imd")]
    pub inter_message_delay_ms: u32,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            baud: BaudRate::B38400,
            parity: Parity::None,
            inter_message_delay_ms: 0,
        }
    }
}

impl BusSettings {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.inter_message_delay_ms > MAX_INTER_MESSAGE_DELAY_MS {
            return Err(ConfigValidationError::new(
                "imd",
                format!(
                    "inter-message delay {} ms exceeds {} ms",
                    self.inter_message_delay_ms, MAX_INTER_MESSAGE_DELAY_MS
                ),
            ));
        }
        Ok(())
    }
}

impl Derive for BusSettings {}

/// Bus configuration.
///
/// # Example
///
/// ```
/// use rust_fieldbus_monitor::config::{BusConfig, TransportKind};
///
/// let bus = BusConfig::default();
/// assert_eq!(bus.transport, TransportKind::Rtu);
/// assert_eq!(bus.settings.baud.bits_per_second(), 38400);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Transport used to reach the devices
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    /// Serial device path, used by the RTU transport
    #[serde(default = "default_device")]
    pub device: String,

    /// `host:port` of the Modbus TCP gateway, used by the TCP transport
    #[serde(default = "default_tcp_address")]
    pub tcp_address: String,

    /// Line settings, adjustable at runtime
    #[serde(flatten)]
    pub settings: BusSettings,
}

fn default_transport() -> TransportKind {
    TransportKind::Rtu
}

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_tcp_address() -> String {
    "127.0.0.1:502".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            device: default_device(),
            tcp_address: default_tcp_address(),
            settings: BusSettings::default(),
        }
    }
}
