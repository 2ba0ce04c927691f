// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hysteretic threshold detection
//!
//! A [`ThresholdComparator`] holds one of two states and only changes state
//! when a sample leaves the dead band `threshold ± hysteresis`:
//!
//! ```text
//!            Above ──(sample < threshold - hysteresis)──▶ Below
//!            Below ──(sample > threshold + hysteresis)──▶ Above
//! ```
//!
//! The optional callback fires once per transition, never for samples that
//! leave the state unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigValidationError;

/// Side of the threshold the comparator currently reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdState {
    #[default]
    AboveThreshold,
    BelowThreshold,
}

impl ThresholdState {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdState::AboveThreshold => "above",
            ThresholdState::BelowThreshold => "below",
        }
    }
}

impl fmt::Display for ThresholdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition callback, receives the sample that caused the transition.
pub type ThresholdCallback = Box<dyn FnMut(f64, ThresholdState) + Send>;

/// Two-state comparator with a symmetric dead band.
pub struct ThresholdComparator {
    threshold: f64,
    hysteresis: f64,
    state: ThresholdState,
    callback: Option<ThresholdCallback>,
}

impl ThresholdComparator {
    /// New comparator in the `AboveThreshold` state with no hysteresis
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            hysteresis: 0.0,
            state: ThresholdState::AboveThreshold,
            callback: None,
        }
    }

    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.set_hysteresis(hysteresis);
        self
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Negative or NaN values are clamped to zero
    pub fn set_hysteresis(&mut self, hysteresis: f64) {
        self.hysteresis = if hysteresis > 0.0 { hysteresis } else { 0.0 };
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(f64, ThresholdState) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn hysteresis(&self) -> f64 {
        self.hysteresis
    }

    pub fn state(&self) -> ThresholdState {
        self.state
    }

    /// Feed one sample and return the resulting state.
    ///
    /// A NaN sample compares false against both band edges and never causes
    /// a transition.
    pub fn evaluate(&mut self, sample: f64) -> ThresholdState {
        let next = match self.state {
            ThresholdState::AboveThreshold if sample < self.threshold - self.hysteresis => {
                ThresholdState::BelowThreshold
            }
            ThresholdState::BelowThreshold if sample > self.threshold + self.hysteresis => {
                ThresholdState::AboveThreshold
            }
            current => current,
        };

        if next != self.state {
            self.state = next;
            if let Some(callback) = self.callback.as_mut() {
                callback(sample, next);
            }
        }
        self.state
    }
}

impl fmt::Debug for ThresholdComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdComparator")
            .field("threshold", &self.threshold)
            .field("hysteresis", &self.hysteresis)
            .field("state", &self.state)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Which transitions of a comparator produce an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEdge {
    /// Alert when the value drops below the band
    Below,
    /// Alert when the value rises above the band
    Above,
    /// Alert on both transitions (raise and clear)
    #[default]
    Both,
}

impl AlertEdge {
    pub fn accepts(self, state: ThresholdState) -> bool {
        match self {
            AlertEdge::Below => state == ThresholdState::BelowThreshold,
            AlertEdge::Above => state == ThresholdState::AboveThreshold,
            AlertEdge::Both => true,
        }
    }
}

/// Configuration of a hysteresis alarm.
///
/// The comparator runs whether or not `enabled` is set so that its state is
/// always current; `enabled` only gates the alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub hysteresis: f64,
    pub alert: AlertEdge,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.0,
            hysteresis: 0.0,
            alert: AlertEdge::Both,
        }
    }
}

impl ThresholdConfig {
    pub fn new(threshold: f64, hysteresis: f64, alert: AlertEdge) -> Self {
        Self {
            enabled: false,
            threshold,
            hysteresis,
            alert,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether a transition into `state` must be reported
    pub fn should_alert(&self, state: ThresholdState) -> bool {
        self.enabled && self.alert.accepts(state)
    }

    /// `field` prefixes the reported field name
    pub fn validate(&self, field: &str) -> Result<(), ConfigValidationError> {
        if !self.threshold.is_finite() {
            return Err(ConfigValidationError::new(
                format!("{}.threshold", field),
                "threshold must be finite",
            ));
        }
        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            return Err(ConfigValidationError::new(
                format!("{}.hysteresis", field),
                "hysteresis must be a finite non-negative number",
            ));
        }
        Ok(())
    }

    /// A comparator tuned to this configuration, without callback
    pub fn comparator(&self) -> ThresholdComparator {
        ThresholdComparator::new(self.threshold).with_hysteresis(self.hysteresis)
    }
}
