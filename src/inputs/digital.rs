// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Opto-isolated digital input with edge events

use std::sync::Arc;

use crate::config::inputs::DigitalInputConfig;
use crate::config_store::ConfigStore;
use crate::sinks::{AlertEvent, AlertSink};
use crate::threshold::ThresholdState;

/// Alert channel raised on accepted edges
pub const DIGITAL_INPUT_EVENT: &str = "io_in";

pub struct DigitalInput {
    store: Arc<ConfigStore<DigitalInputConfig>>,
    /// Last logical level, `None` until the first sample
    value: Option<bool>,
    alerts: Arc<dyn AlertSink>,
}

impl DigitalInput {
    pub fn new(config: DigitalInputConfig, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            store: Arc::new(ConfigStore::new(config)),
            value: None,
            alerts,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore<DigitalInputConfig>> {
        &self.store
    }

    /// Logical input level, low before the first sample
    pub fn value(&self) -> bool {
        self.value.unwrap_or(false)
    }

    /// Update from the raw pin level and return the logical level.
    ///
    /// The optocoupler inverts the signal: an energized input pulls the pin
    /// low. The first sample only seeds the level and never counts as an
    /// edge.
    pub fn update(&mut self, pin_high: bool) -> bool {
        let value = !pin_high;
        let Some(previous) = self.value.replace(value) else {
            return value;
        };
        let config = self.store.snapshot();
        if config.edge.accepts(previous, value) {
            let state = if value {
                ThresholdState::AboveThreshold
            } else {
                ThresholdState::BelowThreshold
            };
            self.alerts.alert(
                AlertEvent::new(DIGITAL_INPUT_EVENT, state, f64::from(u8::from(value)))
                    .immediate(config.immediate),
            );
        }
        value
    }
}
