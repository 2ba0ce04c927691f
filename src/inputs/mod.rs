// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Local I/O inputs
//!
//! Besides the remote Modbus registers, the device monitors its own
//! expansion card inputs:
//!
//! - a 0-10 V analog input and a 4-20 mA analog input ([`analog`])
//! - an opto-isolated digital input ([`digital`])
//!
//! The [`InputMonitor`](monitor::InputMonitor) samples them through an
//! [`AnalogSampler`], raises alerts on threshold transitions and keeps an
//! [`InputTelemetry`] snapshot for readers.

pub mod analog;
pub mod digital;
pub mod monitor;

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

pub use analog::{AnalogChannel, AnalogReading, ChannelKind};
pub use digital::DigitalInput;
pub use monitor::{InputMonitor, InputsHandle};

/// One acquisition of every input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// 12-bit ADC counts of the voltage input
    pub voltage_counts: u16,
    /// 12-bit ADC counts of the current input
    pub current_counts: u16,
    /// Raw level of the digital input pin (inverted by the optocoupler)
    pub digital_pin_high: bool,
}

impl Default for RawSample {
    fn default() -> Self {
        Self {
            voltage_counts: 0,
            current_counts: 0,
            digital_pin_high: true,
        }
    }
}

/// Source of raw input samples
pub trait AnalogSampler: Send {
    fn sample(&mut self) -> Result<RawSample>;
}

/// Sampler returning whatever was last set, clones share the same value
#[derive(Debug, Clone, Default)]
pub struct SimulatedSampler {
    current: Arc<Mutex<RawSample>>,
}

impl SimulatedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sample: RawSample) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = sample;
    }
}

impl AnalogSampler for SimulatedSampler {
    fn sample(&mut self) -> Result<RawSample> {
        Ok(*self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Latest evaluated state of the local inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputTelemetry {
    pub voltage: AnalogReading,
    pub current: AnalogReading,
    pub digital: bool,
    /// Number of samples processed since start
    pub samples: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Telemetry shared between the monitor task and its readers
pub type SharedTelemetry = Arc<RwLock<InputTelemetry>>;
