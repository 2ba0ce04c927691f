// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_fieldbus_monitor::config::{Config, TransportKind};
use rust_fieldbus_monitor::daemon::Daemon;
use rust_fieldbus_monitor::inputs::{RawSample, SimulatedSampler};
use rust_fieldbus_monitor::modbus::SimulatedBus;
use rust_fieldbus_monitor::register::FunctionKind;
use rust_fieldbus_monitor::sinks::ChannelSink;

fn mock_config() -> Config {
    let mut config = Config::default();
    config.bus.transport = TransportKind::Mock;
    config.poller.tick_ms = 20;
    config.registers[0].descriptor.enabled = true;
    config.registers[0].descriptor.function = FunctionKind::HoldingRegister;
    config
}

#[tokio::test]
async fn test_daemon_polls_and_stops() -> Result<()> {
    let config = mock_config();
    let bus = SimulatedBus::new();
    bus.set_register(1, FunctionKind::HoldingRegister, 0, 42);
    let (sink, mut batches, _alerts) = ChannelSink::new();
    let sink = Arc::new(sink);

    let mut daemon = Daemon::new();
    daemon
        .launch_with(
            &config,
            Box::new(bus.clone()),
            Box::new(SimulatedSampler::new()),
            sink.clone(),
            sink,
        )
        .await?;
    assert!(daemon.poller().is_some());
    assert!(daemon.inputs().is_none());

    let batch = tokio::time::timeout(Duration::from_secs(5), batches.recv())
        .await?
        .expect("poller dropped its sink");
    assert_eq!(batch.results[0].slot_name, "modbus1");
    assert_eq!(batch.results[0].value, 42.0);

    daemon.shutdown();
    assert!(!daemon.is_running());
    tokio::time::timeout(Duration::from_secs(3), daemon.join()).await??;
    Ok(())
}

#[tokio::test]
async fn test_daemon_runs_input_monitor_when_enabled() -> Result<()> {
    let mut config = mock_config();
    config.inputs.enabled = true;
    let sampler = SimulatedSampler::new();
    sampler.set(RawSample {
        voltage_counts: 1000,
        current_counts: 1000,
        digital_pin_high: false,
    });
    let (sink, _batches, _alerts) = ChannelSink::new();
    let sink = Arc::new(sink);

    let mut daemon = Daemon::new();
    daemon
        .launch_with(
            &config,
            Box::new(SimulatedBus::new()),
            Box::new(sampler),
            sink.clone(),
            sink,
        )
        .await?;

    let telemetry = daemon.telemetry().expect("input monitor not started");
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        let snapshot = telemetry.read().await;
        assert!(snapshot.samples > 0);
        assert!(snapshot.digital);
        assert!(snapshot.updated_at.is_some());
    }

    let inputs = daemon.inputs().expect("input handle missing");
    assert!(inputs.update_current(|c| c.sensor_fc = -1.0).is_err());

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_launch_with_mock_transport() -> Result<()> {
    let config = mock_config();
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let names: Vec<_> = daemon
        .poller()
        .map(|p| p.slot_names().map(str::to_string).collect())
        .unwrap_or_default();
    assert_eq!(names, ["modbus1", "modbus2", "modbus3"]);
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
