// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sampling loop of the local inputs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::RwLock;
use tokio::time::{self, MissedTickBehavior};

use super::analog::{AnalogChannel, ChannelKind};
use super::digital::DigitalInput;
use super::{AnalogSampler, InputTelemetry, SharedTelemetry};
use crate::config::inputs::{AnalogChannelConfig, DigitalInputConfig, InputsConfig};
use crate::config_store::ConfigStore;
use crate::error::ConfigValidationError;
use crate::sinks::AlertSink;

/// Samples the inputs at a fixed period and publishes telemetry.
pub struct InputMonitor {
    sampler: Box<dyn AnalogSampler>,
    voltage: AnalogChannel,
    current: AnalogChannel,
    digital: DigitalInput,
    telemetry: SharedTelemetry,
    sample_period: Duration,
    samples: u64,
}

impl InputMonitor {
    pub fn new(
        config: &InputsConfig,
        sampler: Box<dyn AnalogSampler>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let sample_period = Duration::from_millis(config.sample_period_ms.max(1));
        let period_s = sample_period.as_secs_f64();
        Self {
            sampler,
            voltage: AnalogChannel::new(
                ChannelKind::Voltage,
                config.voltage.clone(),
                period_s,
                alerts.clone(),
            ),
            current: AnalogChannel::new(
                ChannelKind::Current,
                config.current.clone(),
                period_s,
                alerts.clone(),
            ),
            digital: DigitalInput::new(config.digital.clone(), alerts),
            telemetry: Arc::new(RwLock::new(InputTelemetry::default())),
            sample_period,
            samples: 0,
        }
    }

    /// Configuration access for other tasks
    pub fn handle(&self) -> InputsHandle {
        InputsHandle {
            voltage: self.voltage.store().clone(),
            current: self.current.store().clone(),
            digital: self.digital.store().clone(),
        }
    }

    pub fn telemetry(&self) -> SharedTelemetry {
        self.telemetry.clone()
    }

    /// Take one sample, evaluate every input and refresh the telemetry
    pub async fn step(&mut self) -> Result<InputTelemetry> {
        let raw = self
            .sampler
            .sample()
            .context("Failed to sample local inputs")?;

        self.voltage.push_sample(raw.voltage_counts);
        self.current.push_sample(raw.current_counts);
        let digital = self.digital.update(raw.digital_pin_high);
        self.samples += 1;

        let snapshot = InputTelemetry {
            voltage: self.voltage.evaluate(),
            current: self.current.evaluate(),
            digital,
            samples: self.samples,
            updated_at: Some(Utc::now()),
        };
        *self.telemetry.write().await = snapshot.clone();
        Ok(snapshot)
    }

    /// Sample every period until `running` is cleared
    pub async fn run(mut self, running: Arc<AtomicBool>) -> Result<()> {
        info!(
            "Input monitor started, sampling every {:?}",
            self.sample_period
        );
        let mut interval = time::interval(self.sample_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while running.load(Ordering::SeqCst) {
            interval.tick().await;
            if let Err(e) = self.step().await {
                warn!("Input sampling failed: {:#}", e);
            }
        }

        info!("Input monitor stopped after {} sample(s)", self.samples);
        Ok(())
    }
}

/// Validated configuration writes for the local inputs
#[derive(Clone)]
pub struct InputsHandle {
    pub voltage: Arc<ConfigStore<AnalogChannelConfig>>,
    pub current: Arc<ConfigStore<AnalogChannelConfig>>,
    pub digital: Arc<ConfigStore<DigitalInputConfig>>,
}

impl InputsHandle {
    pub fn update_voltage<F>(&self, stage: F) -> Result<(), ConfigValidationError>
    where
        F: FnOnce(&mut AnalogChannelConfig),
    {
        self.voltage
            .update(stage, |config| config.validate("inputs.voltage"))
    }

    pub fn update_current<F>(&self, stage: F) -> Result<(), ConfigValidationError>
    where
        F: FnOnce(&mut AnalogChannelConfig),
    {
        self.current
            .update(stage, |config| config.validate("inputs.current"))
    }

    pub fn update_digital<F>(&self, stage: F) -> Result<(), ConfigValidationError>
    where
        F: FnOnce(&mut DigitalInputConfig),
    {
        self.digital.update(stage, |_| Ok(()))
    }
}
