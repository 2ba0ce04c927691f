// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::inputs::{AnalogSampler, InputMonitor, InputsHandle, SharedTelemetry, SimulatedSampler};
use crate::modbus::{create_transport, ModbusTransport};
use crate::polling::{PollScheduler, PollerHandle, SystemClock};
use crate::sinks::{AlertSink, LogSink, PublishSink};

/// Grace period given to each task on shutdown
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);
/// How often the heartbeat checks the running flag
const HEARTBEAT_POLL: Duration = Duration::from_millis(250);

/// Represents the set of background tasks of the monitor
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    poller: Option<PollerHandle>,
    inputs: Option<InputsHandle>,
    telemetry: Option<SharedTelemetry>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            poller: None,
            inputs: None,
            telemetry: None,
        }
    }

    /// Launch all configured tasks with the transport named in the
    /// configuration and log based sinks
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let transport = create_transport(&config.bus).context("Failed to create transport")?;
        let sink = Arc::new(LogSink);
        self.launch_with(
            config,
            transport,
            Box::new(SimulatedSampler::new()),
            sink.clone(),
            sink,
        )
        .await
    }

    /// Launch all configured tasks with explicit collaborators
    pub async fn launch_with(
        &mut self,
        config: &Config,
        transport: Box<dyn ModbusTransport>,
        sampler: Box<dyn AnalogSampler>,
        publisher: Arc<dyn PublishSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<()> {
        self.start_poller(config, transport, publisher, alerts.clone())?;

        if config.inputs.enabled {
            self.start_input_monitor(config, sampler, alerts)?;
        }

        self.start_heartbeat()?;

        Ok(())
    }

    /// Start the Modbus poll loop
    fn start_poller(
        &mut self,
        config: &Config,
        transport: Box<dyn ModbusTransport>,
        publisher: Arc<dyn PublishSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<()> {
        let enabled = config
            .registers
            .iter()
            .filter(|r| r.descriptor.enabled)
            .count();
        info!(
            "Starting Modbus poller: {:?} transport, {} slot(s), {} enabled",
            config.bus.transport,
            config.registers.len(),
            enabled
        );

        let scheduler = PollScheduler::from_config(config, transport, publisher, alerts);
        self.poller = Some(scheduler.handle());

        let period = Duration::from_millis(config.poller.tick_ms);
        let task = tokio::spawn(scheduler.run(
            Arc::new(SystemClock::new()),
            period,
            self.running.clone(),
        ));

        self.tasks.push(task);
        Ok(())
    }

    /// Start the local input sampling task
    fn start_input_monitor(
        &mut self,
        config: &Config,
        sampler: Box<dyn AnalogSampler>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<()> {
        info!(
            "Starting input monitor, sample period {} ms",
            config.inputs.sample_period_ms
        );

        let monitor = InputMonitor::new(&config.inputs, sampler, alerts);
        self.inputs = Some(monitor.handle());
        self.telemetry = Some(monitor.telemetry());

        let task = tokio::spawn(monitor.run(self.running.clone()));
        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let telemetry = self.telemetry.clone();
        let task = tokio::spawn(async move {
            let mut elapsed = HEARTBEAT_PERIOD;
            while running.load(Ordering::SeqCst) {
                if elapsed >= HEARTBEAT_PERIOD {
                    elapsed = Duration::ZERO;
                    match &telemetry {
                        Some(telemetry) => {
                            let samples = telemetry.read().await.samples;
                            debug!("Daemon heartbeat: running, {} input sample(s)", samples);
                        }
                        None => debug!("Daemon heartbeat: running"),
                    }
                }
                time::sleep(HEARTBEAT_POLL).await;
                elapsed += HEARTBEAT_POLL;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Configuration client of the running poller
    pub fn poller(&self) -> Option<&PollerHandle> {
        self.poller.as_ref()
    }

    /// Configuration client of the input monitor, when inputs are enabled
    pub fn inputs(&self) -> Option<&InputsHandle> {
        self.inputs.as_ref()
    }

    /// Latest input telemetry, when inputs are enabled
    pub fn telemetry(&self) -> Option<SharedTelemetry> {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete.
    ///
    /// Each task gets a few seconds to notice the cleared flag and is
    /// aborted when it does not finish in time.
    pub async fn join(self) -> Result<()> {
        for mut task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => log::error!("Task failed: {:#}", e),
                Ok(Err(e)) => log::error!("Task panicked: {}", e),
                Err(_) => {
                    warn!("Task did not stop within {:?}, aborting", JOIN_TIMEOUT);
                    task.abort();
                }
            }
        }
        Ok(())
    }
}
