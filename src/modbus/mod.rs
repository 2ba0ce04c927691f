// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus master transports
//!
//! This module abstracts the shared field bus behind the [`ModbusTransport`]
//! trait so the poller does not care how the words reach it.
//!
//! ## Implementations
//!
//! - [`RtuTransport`]: Modbus RTU over a serial line (tokio-serial)
//! - [`TcpTransport`]: Modbus TCP gateway
//! - [`SimulatedBus`]: in-memory register map with scripted faults
//!
//! Coils and discrete inputs are returned as one word per bit (0 or 1) so the
//! decoder handles every function the same way.

pub mod client;
pub mod simulated;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::modbus::{BusConfig, BusSettings, TransportKind};
use crate::error::TransportError;
use crate::register::FunctionKind;

pub use client::{RtuTransport, TcpTransport};
pub use simulated::SimulatedBus;

/// Request/response access to remote registers.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Read `count` consecutive items starting at `address`.
    ///
    /// The implementation should give up after `timeout`; the poller also
    /// enforces that deadline around the call.
    async fn read(
        &mut self,
        function: FunctionKind,
        server_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError>;

    /// Apply new line settings, called after a bus settings commit
    async fn reconfigure(&mut self, settings: &BusSettings) -> Result<(), TransportError>;
}

/// Outcome code attached to every poll result.
///
/// The numeric codes follow the usual Modbus master convention: `0x00` for
/// success, the device's exception code for exceptions, and `0xE0..` for
/// failures detected by the master itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum TransportStatus {
    Success,
    Exception(u8),
    NotConnected,
    MalformedResponse,
    Timeout,
    Io,
    InvalidSettings,
}

impl TransportStatus {
    pub fn code(self) -> u8 {
        match self {
            TransportStatus::Success => 0x00,
            TransportStatus::Exception(code) => code,
            TransportStatus::NotConnected => 0xE0,
            TransportStatus::MalformedResponse => 0xE1,
            TransportStatus::Timeout => 0xE2,
            TransportStatus::Io => 0xE3,
            TransportStatus::InvalidSettings => 0xE4,
        }
    }

    pub fn is_success(self) -> bool {
        self == TransportStatus::Success
    }
}

impl From<TransportStatus> for u8 {
    fn from(status: TransportStatus) -> Self {
        status.code()
    }
}

impl From<&TransportError> for TransportStatus {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => TransportStatus::Timeout,
            TransportError::Exception(code) => TransportStatus::Exception(*code),
            TransportError::Io(_) => TransportStatus::Io,
            TransportError::NotConnected(_) => TransportStatus::NotConnected,
            TransportError::InvalidSettings(_) => TransportStatus::InvalidSettings,
        }
    }
}

/// Create the transport selected by the bus configuration.
///
/// Serial and TCP transports connect lazily on their first read, so this
/// never blocks on I/O.
pub fn create_transport(config: &BusConfig) -> Result<Box<dyn ModbusTransport>> {
    match config.transport {
        TransportKind::Rtu => Ok(Box::new(RtuTransport::new(
            &config.device,
            config.settings.clone(),
        ))),
        TransportKind::Tcp => {
            let address = config
                .tcp_address
                .parse()
                .with_context(|| format!("Invalid Modbus TCP address '{}'", config.tcp_address))?;
            Ok(Box::new(TcpTransport::new(address)))
        }
        TransportKind::Mock => Ok(Box::new(SimulatedBus::new())),
    }
}
