// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated Modbus bus
//!
//! [`SimulatedBus`] answers reads from an in-memory register map. It is used
//! by the test-suite and by `transport: mock` to run the poller without
//! hardware. Handles are cheap clones sharing the same map, so a test keeps
//! one handle to script values and faults while the poller owns another.
//!
//! - unknown addresses answer with exception 0x02 (illegal data address)
//! - an injected fault is returned for every read touching its address until
//!   cleared
//! - an optional response delay lets tests exercise timeouts

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::ModbusTransport;
use crate::config::modbus::BusSettings;
use crate::error::TransportError;
use crate::register::FunctionKind;

/// One read as seen by the simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub function: FunctionKind,
    pub server_id: u8,
    pub address: u16,
    pub count: u16,
}

#[derive(Default)]
struct BusState {
    registers: HashMap<(u8, FunctionKind, u16), u16>,
    faults: HashMap<(u8, u16), TransportError>,
    delay: Option<Duration>,
    reads: Vec<ReadRecord>,
    applied_settings: Vec<BusSettings>,
}

/// In-memory Modbus bus shared between handles.
#[derive(Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_register(&self, server_id: u8, function: FunctionKind, address: u16, value: u16) {
        self.lock()
            .registers
            .insert((server_id, function, address), value);
    }

    /// Store consecutive words starting at `start`
    pub fn set_registers(&self, server_id: u8, function: FunctionKind, start: u16, values: &[u16]) {
        let mut state = self.lock();
        for (address, value) in (start..).zip(values) {
            state.registers.insert((server_id, function, address), *value);
        }
    }

    /// Fail every read of `server_id` covering `address` with `error`
    pub fn inject_fault(&self, server_id: u8, address: u16, error: TransportError) {
        self.lock().faults.insert((server_id, address), error);
    }

    pub fn clear_fault(&self, server_id: u8, address: u16) {
        self.lock().faults.remove(&(server_id, address));
    }

    /// Delay every response, `None` answers immediately
    pub fn set_response_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads.len()
    }

    pub fn reads(&self) -> Vec<ReadRecord> {
        self.lock().reads.clone()
    }

    /// Bus settings received through `reconfigure`, oldest first
    pub fn applied_settings(&self) -> Vec<BusSettings> {
        self.lock().applied_settings.clone()
    }

    fn answer(
        &self,
        function: FunctionKind,
        server_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut state = self.lock();
        state.reads.push(ReadRecord {
            function,
            server_id,
            address,
            count,
        });

        let mut words = Vec::with_capacity(usize::from(count));
        for offset in 0..count {
            let item = address.wrapping_add(offset);
            if let Some(error) = state.faults.get(&(server_id, item)) {
                return Err(error.clone());
            }
            match state.registers.get(&(server_id, function, item)) {
                Some(&value) if function.is_bit_access() => words.push(u16::from(value != 0)),
                Some(&value) => words.push(value),
                None => return Err(TransportError::Exception(0x02)),
            }
        }
        Ok(words)
    }
}

#[async_trait]
impl ModbusTransport for SimulatedBus {
    async fn read(
        &mut self,
        function: FunctionKind,
        server_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                // the request still reached the device
                let _ = self.answer(function, server_id, address, count);
                return Err(TransportError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }
        let result = self.answer(function, server_id, address, count);
        debug!(
            "Simulated read server {} function 0x{:02X} address {} count {}: {:?}",
            server_id,
            function.code(),
            address,
            count,
            result
        );
        result
    }

    async fn reconfigure(&mut self, settings: &BusSettings) -> Result<(), TransportError> {
        self.lock().applied_settings.push(settings.clone());
        Ok(())
    }
}
