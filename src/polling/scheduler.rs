// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poll scheduler
//!
//! The [`PollScheduler`] owns the transport and a fixed arena of poll slots.
//! Every tick it walks the slots in declaration order and, for each enabled
//! slot whose interval has elapsed:
//!
//! 1. reads `word_count` words, bounded by the slot's timeout
//! 2. decodes them and feeds the slot's threshold comparator
//! 3. pushes a [`PollResult`] (success or failure) to the aggregator
//!
//! Transactions are strictly sequential on the shared bus. A failed slot
//! never stops the pass: the scheduler yields to the runtime and moves on to
//! the next slot.
//!
//! Slot descriptors and bus settings live in [`ConfigStore`]s. The scheduler
//! takes a snapshot of each descriptor per tick and reconfigures the
//! transport when the bus settings generation changes, so commits made by a
//! [`PollerHandle`] are picked up on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::time::{self, MissedTickBehavior};

use super::aggregator::{PollResult, ResultAggregator};
use super::clock::Clock;
use crate::config::modbus::BusSettings;
use crate::config::Config;
use crate::config_store::ConfigStore;
use crate::error::{ConfigValidationError, TransportError};
use crate::modbus::{ModbusTransport, TransportStatus};
use crate::register::{decode, RegisterDescriptor};
use crate::sinks::{alerting_comparator, retune_comparator, AlertSink, PublishSink};
use crate::threshold::{ThresholdComparator, ThresholdState};

/// Index of a slot in the scheduler arena
pub type SlotId = usize;

/// Lifecycle of a slot within one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Due,
    Polling,
}

/// Per-slot counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStatistics {
    pub attempts: u64,
    pub failures: u64,
}

struct Slot {
    name: String,
    store: Arc<ConfigStore<RegisterDescriptor>>,
    state: SlotState,
    last_poll_s: u64,
    comparator: Option<ThresholdComparator>,
    threshold_generation: Option<u64>,
    stats: SlotStatistics,
}

impl Slot {
    fn sync_threshold(
        &mut self,
        descriptor: &RegisterDescriptor,
        generation: u64,
        alerts: &Arc<dyn AlertSink>,
    ) {
        if self.threshold_generation == Some(generation) {
            return;
        }
        self.threshold_generation = Some(generation);

        let Some(config) = descriptor.threshold.as_ref() else {
            self.comparator = None;
            return;
        };
        match self.comparator.as_mut() {
            Some(comparator) => retune_comparator(comparator, &self.name, config, alerts.clone()),
            None => {
                self.comparator = Some(alerting_comparator(&self.name, config, alerts.clone()))
            }
        }
    }
}

/// Drives the poll slots against one shared transport.
pub struct PollScheduler {
    slots: Vec<Slot>,
    transport: Box<dyn ModbusTransport>,
    bus: Arc<ConfigStore<BusSettings>>,
    bus_generation: u64,
    inter_message_delay: Duration,
    aggregator: ResultAggregator,
    publisher: Arc<dyn PublishSink>,
    alerts: Arc<dyn AlertSink>,
}

impl PollScheduler {
    pub fn new(
        transport: Box<dyn ModbusTransport>,
        bus: Arc<ConfigStore<BusSettings>>,
        publisher: Arc<dyn PublishSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let settings = bus.snapshot();
        Self {
            slots: Vec::new(),
            transport,
            bus_generation: bus.generation(),
            bus,
            inter_message_delay: Duration::from_millis(u64::from(settings.inter_message_delay_ms)),
            aggregator: ResultAggregator::new(),
            publisher,
            alerts,
        }
    }

    /// Scheduler with the bus settings and slots declared in `config`
    pub fn from_config(
        config: &Config,
        transport: Box<dyn ModbusTransport>,
        publisher: Arc<dyn PublishSink>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let bus = Arc::new(ConfigStore::new(config.bus.settings.clone()));
        let mut scheduler = Self::new(transport, bus, publisher, alerts);
        for register in &config.registers {
            scheduler.add_slot(&register.name, register.descriptor.clone());
        }
        scheduler
    }

    /// Append a slot, polled after every slot added before it
    pub fn add_slot(&mut self, name: &str, descriptor: RegisterDescriptor) -> SlotId {
        self.slots.push(Slot {
            name: name.to_string(),
            store: Arc::new(ConfigStore::new(descriptor)),
            state: SlotState::Idle,
            last_poll_s: 0,
            comparator: None,
            threshold_generation: None,
            stats: SlotStatistics::default(),
        });
        self.slots.len() - 1
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_id(&self, name: &str) -> Option<SlotId> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    pub fn slot_state(&self, id: SlotId) -> Option<SlotState> {
        self.slots.get(id).map(|slot| slot.state)
    }

    pub fn statistics(&self, id: SlotId) -> Option<SlotStatistics> {
        self.slots.get(id).map(|slot| slot.stats)
    }

    /// Current state of the slot's threshold comparator, if it has one
    pub fn threshold_state(&self, id: SlotId) -> Option<ThresholdState> {
        self.slots
            .get(id)
            .and_then(|slot| slot.comparator.as_ref())
            .map(ThresholdComparator::state)
    }

    /// Configuration access for other tasks
    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            bus: self.bus.clone(),
            slots: self
                .slots
                .iter()
                .map(|slot| (slot.name.clone(), slot.store.clone()))
                .collect(),
        }
    }

    /// Run one scheduling pass at uptime `now_s` and return the number of
    /// transactions issued.
    pub async fn tick(&mut self, now_s: u64) -> usize {
        self.apply_bus_settings().await;

        let mut attempted = 0;
        for index in 0..self.slots.len() {
            let generation = self.slots[index].store.generation();
            let descriptor = self.slots[index].store.snapshot();
            let slot = &mut self.slots[index];
            if !descriptor.enabled {
                slot.state = SlotState::Idle;
                continue;
            }
            slot.sync_threshold(&descriptor, generation, &self.alerts);
            if now_s.saturating_sub(slot.last_poll_s) < u64::from(descriptor.poll_interval_s) {
                continue;
            }
            slot.state = SlotState::Due;
            slot.last_poll_s = now_s;

            if attempted > 0 && !self.inter_message_delay.is_zero() {
                time::sleep(self.inter_message_delay).await;
            }

            let result =
                poll_slot(self.transport.as_mut(), &mut self.slots[index], &descriptor).await;
            attempted += 1;
            let failed = !result.status.is_success();
            self.aggregator.push(result);
            if failed {
                tokio::task::yield_now().await;
            }
        }

        if let Some(batch) = self.aggregator.take_if_due(now_s) {
            if let Err(e) = self.publisher.publish(&batch) {
                warn!("Failed to publish {} poll result(s): {}", batch.len(), e);
            }
        }
        attempted
    }

    /// Tick every `period` until `running` is cleared
    pub async fn run(
        mut self,
        clock: Arc<dyn Clock>,
        period: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        info!(
            "Modbus poller started with {} slot(s), tick every {:?}",
            self.slots.len(),
            period
        );
        let mut interval = time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while running.load(Ordering::SeqCst) {
            interval.tick().await;
            let now = clock.uptime_secs();
            let polled = self.tick(now).await;
            if polled > 0 {
                debug!("Tick at {} s polled {} slot(s)", now, polled);
            }
        }

        info!("Modbus poller stopped");
        Ok(())
    }

    async fn apply_bus_settings(&mut self) {
        let generation = self.bus.generation();
        if generation == self.bus_generation {
            return;
        }
        self.bus_generation = generation;
        let settings = self.bus.snapshot();
        self.inter_message_delay =
            Duration::from_millis(u64::from(settings.inter_message_delay_ms));
        match self.transport.reconfigure(&settings).await {
            Ok(()) => info!(
                "Bus reconfigured: {} baud, parity {:?}, inter-message delay {} ms",
                settings.baud, settings.parity, settings.inter_message_delay_ms
            ),
            Err(e) => error!("Failed to reconfigure bus: {}", e),
        }
    }
}

async fn poll_slot(
    transport: &mut dyn ModbusTransport,
    slot: &mut Slot,
    descriptor: &RegisterDescriptor,
) -> PollResult {
    slot.state = SlotState::Polling;
    slot.stats.attempts += 1;

    let timeout = Duration::from_millis(u64::from(descriptor.timeout_ms));
    let read = transport.read(
        descriptor.function,
        descriptor.server_id,
        descriptor.address,
        descriptor.word_count(),
        timeout,
    );
    let outcome = match time::timeout(timeout, read).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TransportError::Timeout(timeout)),
    };

    let result = match outcome {
        Ok(words) => match decode(&words, descriptor) {
            Ok(value) => {
                debug!("Slot '{}' read {:04X?} -> {}", slot.name, words, value);
                if let Some(comparator) = slot.comparator.as_mut() {
                    comparator.evaluate(value);
                }
                PollResult::success(slot.name.as_str(), value)
            }
            Err(e) => {
                warn!("Slot '{}' returned an unusable response: {}", slot.name, e);
                PollResult::failure(slot.name.as_str(), TransportStatus::MalformedResponse)
            }
        },
        Err(e) => {
            warn!(
                "Slot '{}' (server {}, address {}) failed: {}",
                slot.name, descriptor.server_id, descriptor.address, e
            );
            PollResult::failure(slot.name.as_str(), TransportStatus::from(&e))
        }
    };

    if !result.status.is_success() {
        slot.stats.failures += 1;
    }
    slot.state = SlotState::Idle;
    result
}

/// Configuration client for a running scheduler.
///
/// Writes go through each store's validated commit; the scheduler observes
/// them on its next tick.
#[derive(Clone)]
pub struct PollerHandle {
    bus: Arc<ConfigStore<BusSettings>>,
    slots: Vec<(String, Arc<ConfigStore<RegisterDescriptor>>)>,
}

impl PollerHandle {
    pub fn bus_settings(&self) -> &Arc<ConfigStore<BusSettings>> {
        &self.bus
    }

    pub fn slot(&self, name: &str) -> Option<&Arc<ConfigStore<RegisterDescriptor>>> {
        self.slots
            .iter()
            .find(|(slot_name, _)| slot_name == name)
            .map(|(_, store)| store)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_str())
    }

    /// Edit and commit the descriptor of slot `name`
    pub fn update_slot<F>(&self, name: &str, stage: F) -> Result<(), ConfigValidationError>
    where
        F: FnOnce(&mut RegisterDescriptor),
    {
        let store = self
            .slot(name)
            .ok_or_else(|| ConfigValidationError::new("name", format!("unknown slot '{}'", name)))?;
        store.update(stage, RegisterDescriptor::validate)
    }

    /// Edit and commit the bus settings
    pub fn update_bus<F>(&self, stage: F) -> Result<(), ConfigValidationError>
    where
        F: FnOnce(&mut BusSettings),
    {
        self.bus.update(stage, BusSettings::validate)
    }
}
