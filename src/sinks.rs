// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Outbound sinks for batches and alerts
//!
//! The engine hands its output to two collaborators:
//!
//! - a [`PublishSink`] receiving each [`AggregatedBatch`] of poll results
//! - an [`AlertSink`] receiving an [`AlertEvent`] for every reported
//!   threshold transition
//!
//! [`LogSink`] writes both as JSON lines through the `log` facade and
//! [`ChannelSink`] forwards them to tokio channels for an uplink task.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::polling::aggregator::AggregatedBatch;
use crate::threshold::{ThresholdComparator, ThresholdConfig, ThresholdState};

/// Receives aggregated poll results
pub trait PublishSink: Send + Sync {
    fn publish(&self, batch: &AggregatedBatch) -> Result<()>;
}

/// Receives threshold transitions
pub trait AlertSink: Send + Sync {
    fn alert(&self, event: AlertEvent);
}

/// A reported transition of a monitored channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    /// Slot name or local input event name (`io_vlow`, `io_in`, ...)
    pub channel: String,
    pub state: ThresholdState,
    /// Sample that caused the transition
    pub value: f64,
    /// Deliver without waiting for the next batch
    pub immediate: bool,
}

impl AlertEvent {
    pub fn new(channel: impl Into<String>, state: ThresholdState, value: f64) -> Self {
        Self {
            channel: channel.into(),
            state,
            value,
            immediate: false,
        }
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

/// Comparator for `config` whose transitions are reported to `alerts` under
/// `channel`, subject to the config's enable flag and alert edge.
pub fn alerting_comparator(
    channel: &str,
    config: &ThresholdConfig,
    alerts: Arc<dyn AlertSink>,
) -> ThresholdComparator {
    let mut comparator = config.comparator();
    retune_comparator(&mut comparator, channel, config, alerts);
    comparator
}

/// Apply a new configuration to an existing comparator, keeping its state
pub fn retune_comparator(
    comparator: &mut ThresholdComparator,
    channel: &str,
    config: &ThresholdConfig,
    alerts: Arc<dyn AlertSink>,
) {
    comparator.set_threshold(config.threshold);
    comparator.set_hysteresis(config.hysteresis);
    let channel = channel.to_string();
    let config = config.clone();
    comparator.set_callback(move |value, state| {
        if config.should_alert(state) {
            alerts.alert(AlertEvent::new(channel.clone(), state, value).immediate(true));
        }
    });
}

/// Writes batches and alerts to the log as JSON lines
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PublishSink for LogSink {
    fn publish(&self, batch: &AggregatedBatch) -> Result<()> {
        let line = serde_json::to_string(batch).context("Failed to serialize poll batch")?;
        info!("publish {}", line);
        Ok(())
    }
}

impl AlertSink for LogSink {
    fn alert(&self, event: AlertEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => info!("alert {}", line),
            Err(e) => warn!("Failed to serialize alert for {}: {}", event.channel, e),
        }
    }
}

/// Forwards batches and alerts to unbounded tokio channels
#[derive(Debug, Clone)]
pub struct ChannelSink {
    batches: mpsc::UnboundedSender<AggregatedBatch>,
    alerts: mpsc::UnboundedSender<AlertEvent>,
}

impl ChannelSink {
    /// Sink plus the receiving ends for batches and alerts
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<AggregatedBatch>,
        mpsc::UnboundedReceiver<AlertEvent>,
    ) {
        let (batches, batch_rx) = mpsc::unbounded_channel();
        let (alerts, alert_rx) = mpsc::unbounded_channel();
        (Self { batches, alerts }, batch_rx, alert_rx)
    }
}

impl PublishSink for ChannelSink {
    fn publish(&self, batch: &AggregatedBatch) -> Result<()> {
        self.batches
            .send(batch.clone())
            .map_err(|_| anyhow::anyhow!("Batch receiver has been dropped"))
    }
}

impl AlertSink for ChannelSink {
    fn alert(&self, event: AlertEvent) {
        if self.alerts.send(event).is_err() {
            warn!("Alert receiver has been dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::TransportStatus;
    use crate::polling::aggregator::PollResult;
    use crate::threshold::AlertEdge;

    #[test]
    fn comparator_reports_only_enabled_edges() {
        let (sink, _batches, mut alerts) = ChannelSink::new();
        let config = ThresholdConfig::new(2.0, 1.0, AlertEdge::Below).enabled(true);
        let mut comparator = alerting_comparator("io_vlow", &config, Arc::new(sink));

        comparator.evaluate(0.5);
        comparator.evaluate(5.0);

        let event = alerts.try_recv().unwrap();
        assert_eq!(event.channel, "io_vlow");
        assert_eq!(event.state, ThresholdState::BelowThreshold);
        assert_eq!(event.value, 0.5);
        assert!(alerts.try_recv().is_err());
    }

    #[test]
    fn retune_keeps_state() {
        let (sink, _batches, mut alerts) = ChannelSink::new();
        let sink: Arc<dyn AlertSink> = Arc::new(sink);
        let config = ThresholdConfig::new(10.0, 0.0, AlertEdge::Both).enabled(true);
        let mut comparator = alerting_comparator("temp", &config, sink.clone());
        comparator.evaluate(5.0);
        assert!(alerts.try_recv().is_ok());

        let disabled = ThresholdConfig::new(20.0, 1.0, AlertEdge::Both);
        retune_comparator(&mut comparator, "temp", &disabled, sink);
        assert_eq!(comparator.state(), ThresholdState::BelowThreshold);
        assert_eq!(comparator.threshold(), 20.0);
        comparator.evaluate(30.0);
        assert_eq!(comparator.state(), ThresholdState::AboveThreshold);
        assert!(alerts.try_recv().is_err());
    }

    #[test]
    fn channel_sink_forwards_batches() {
        let (sink, mut batches, _alerts) = ChannelSink::new();
        let batch = AggregatedBatch::new(vec![PollResult::success("modbus1", 1.0)], 3);
        sink.publish(&batch).unwrap();
        assert_eq!(batches.try_recv().unwrap(), batch);
    }

    #[test]
    fn channel_sink_reports_dropped_receiver() {
        let (sink, batches, _alerts) = ChannelSink::new();
        drop(batches);
        let batch = AggregatedBatch::new(vec![PollResult::failure("modbus1", TransportStatus::Timeout)], 0);
        assert!(sink.publish(&batch).is_err());
    }

    #[test]
    fn log_sink_accepts_everything() {
        let batch = AggregatedBatch::new(vec![PollResult::success("modbus2", -4.5)], 9);
        assert!(LogSink.publish(&batch).is_ok());
        LogSink.alert(AlertEvent::new("io_in", ThresholdState::AboveThreshold, 1.0));
    }
}
