// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Analog input channels
//!
//! Each channel smooths raw 12-bit ADC samples with an exponential moving
//! average, then on evaluation:
//!
//! 1. maps the average from ADC counts to the input's electrical full scale
//! 2. applies the calibration `(raw + cal_offset) * cal_gain`
//! 3. feeds the optional loop fault comparators with the calibrated value
//! 4. maps the calibrated value from the nominal range to the sensor range
//! 5. feeds the low/high alarm comparators with the scaled value

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::config::inputs::{
    AnalogChannelConfig, CURRENT_IN_HIGH, CURRENT_IN_LOW, VOLTAGE_IN_HIGH, VOLTAGE_IN_LOW,
};
use crate::config_store::ConfigStore;
use crate::preprocessing::ExponentialMovingAverage;
use crate::sinks::{alerting_comparator, retune_comparator, AlertSink};
use crate::threshold::{ThresholdComparator, ThresholdConfig, ThresholdState};

/// Highest ADC reading
pub const ADC_MAX_COUNTS: u16 = 4095;

/// Voltage at full ADC scale on the 0-10 V input (divider 10k / 4.7k on 3.3 V)
pub const VOLTAGE_IN_FULL_SCALE: f64 = 3.3 * (10000.0 + 4700.0) / 4700.0;
/// Loop current at full ADC scale on the 4-20 mA input (100 Ω shunt on 3.3 V)
pub const CURRENT_IN_FULL_SCALE: f64 = 3.3 / 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Voltage,
    Current,
}

impl ChannelKind {
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Voltage => "voltage",
            ChannelKind::Current => "current",
        }
    }

    fn full_scale(self) -> f64 {
        match self {
            ChannelKind::Voltage => VOLTAGE_IN_FULL_SCALE,
            ChannelKind::Current => CURRENT_IN_FULL_SCALE,
        }
    }

    fn nominal_range(self) -> (f64, f64) {
        match self {
            ChannelKind::Voltage => (VOLTAGE_IN_LOW, VOLTAGE_IN_HIGH),
            ChannelKind::Current => (CURRENT_IN_LOW, CURRENT_IN_HIGH),
        }
    }

    /// Alert channel name of one of the channel's comparators
    pub fn event(self, suffix: &str) -> String {
        let prefix = match self {
            ChannelKind::Voltage => "io_v",
            ChannelKind::Current => "io_a",
        };
        format!("{}{}", prefix, suffix)
    }
}

/// Linear re-mapping of `x` from one range onto another
pub fn map_range(x: f64, in_low: f64, in_high: f64, out_low: f64, out_high: f64) -> f64 {
    (x - in_low) * (out_high - out_low) / (in_high - in_low) + out_low
}

/// Result of one channel evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnalogReading {
    /// Value in sensor units
    pub value: f64,
    /// Calibrated electrical value (volts or amperes)
    pub calibrated: f64,
    pub low: ThresholdState,
    pub high: ThresholdState,
    /// Calibrated value below the fault-low band
    pub fault_low: bool,
    /// Calibrated value above the fault-high band
    pub fault_high: bool,
}

/// One analog input with its filter and comparators.
pub struct AnalogChannel {
    kind: ChannelKind,
    store: Arc<ConfigStore<AnalogChannelConfig>>,
    applied_generation: u64,
    config: AnalogChannelConfig,
    filter: ExponentialMovingAverage,
    low: ThresholdComparator,
    high: ThresholdComparator,
    fault_low: Option<ThresholdComparator>,
    fault_high: Option<ThresholdComparator>,
    alerts: Arc<dyn AlertSink>,
}

impl AnalogChannel {
    pub fn new(
        kind: ChannelKind,
        config: AnalogChannelConfig,
        sample_period_s: f64,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let store = Arc::new(ConfigStore::new(config.clone()));
        let mut channel = Self {
            kind,
            applied_generation: store.generation(),
            store,
            filter: ExponentialMovingAverage::from_cutoff(config.sensor_fc, sample_period_s),
            low: alerting_comparator(&kind.event("low"), &config.low, alerts.clone()),
            high: alerting_comparator(&kind.event("high"), &config.high, alerts.clone()),
            fault_low: None,
            fault_high: None,
            config,
            alerts,
        };
        channel.sync_faults();
        channel
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn store(&self) -> &Arc<ConfigStore<AnalogChannelConfig>> {
        &self.store
    }

    /// Feed one raw ADC reading into the filter, returns the new average
    pub fn push_sample(&mut self, counts: u16) -> f64 {
        self.filter.push(f64::from(counts.min(ADC_MAX_COUNTS)))
    }

    /// Scale the filtered value and run the comparators
    pub fn evaluate(&mut self) -> AnalogReading {
        self.sync_config();

        let average = self.filter.average().unwrap_or(0.0);
        let raw = map_range(
            average,
            0.0,
            f64::from(ADC_MAX_COUNTS),
            0.0,
            self.kind.full_scale(),
        );
        let calibrated = (raw + self.config.cal_offset) * self.config.cal_gain;

        let fault_low = self
            .fault_low
            .as_mut()
            .map(|c| c.evaluate(calibrated) == ThresholdState::BelowThreshold)
            .unwrap_or(false);
        let fault_high = self
            .fault_high
            .as_mut()
            .map(|c| c.evaluate(calibrated) == ThresholdState::AboveThreshold)
            .unwrap_or(false);

        let (nominal_low, nominal_high) = self.kind.nominal_range();
        let value = map_range(
            calibrated,
            nominal_low,
            nominal_high,
            self.config.sensor_low,
            self.config.sensor_high,
        );

        AnalogReading {
            value,
            calibrated,
            low: self.low.evaluate(value),
            high: self.high.evaluate(value),
            fault_low,
            fault_high,
        }
    }

    fn sync_config(&mut self) {
        let generation = self.store.generation();
        if generation == self.applied_generation {
            return;
        }
        self.applied_generation = generation;
        self.config = self.store.snapshot();
        debug!(
            "Retuning {} input: fc {} Hz, low {}, high {}",
            self.kind.name(),
            self.config.sensor_fc,
            self.config.low.threshold,
            self.config.high.threshold
        );

        self.filter.set_cutoff(self.config.sensor_fc);
        retune_comparator(
            &mut self.low,
            &self.kind.event("low"),
            &self.config.low,
            self.alerts.clone(),
        );
        retune_comparator(
            &mut self.high,
            &self.kind.event("high"),
            &self.config.high,
            self.alerts.clone(),
        );
        self.sync_faults();
    }

    fn sync_faults(&mut self) {
        sync_optional(
            &mut self.fault_low,
            &self.kind.event("fltlow"),
            self.config.fault_low.as_ref(),
            &self.alerts,
        );
        sync_optional(
            &mut self.fault_high,
            &self.kind.event("flthigh"),
            self.config.fault_high.as_ref(),
            &self.alerts,
        );
    }
}

fn sync_optional(
    comparator: &mut Option<ThresholdComparator>,
    channel: &str,
    config: Option<&ThresholdConfig>,
    alerts: &Arc<dyn AlertSink>,
) {
    let Some(config) = config else {
        *comparator = None;
        return;
    };
    match comparator.as_mut() {
        Some(existing) => retune_comparator(existing, channel, config, alerts.clone()),
        None => *comparator = Some(alerting_comparator(channel, config, alerts.clone())),
    }
}
