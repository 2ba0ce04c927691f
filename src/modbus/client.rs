// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus RTU and TCP client transports built on tokio-modbus
//!
//! Both transports open their connection on the first read and drop it after
//! an I/O failure or a timeout, so the next read starts from a clean frame.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use super::ModbusTransport;
use crate::config::modbus::{BusSettings, Parity};
use crate::error::TransportError;
use crate::register::FunctionKind;

/// Modbus RTU master on a serial port, 8 data bits, 1 stop bit.
pub struct RtuTransport {
    device: String,
    settings: BusSettings,
    context: Option<Context>,
}

impl RtuTransport {
    pub fn new(device: &str, settings: BusSettings) -> Self {
        Self {
            device: device.to_string(),
            settings,
            context: None,
        }
    }

    fn open(&self) -> Result<Context, TransportError> {
        let parity = match self.settings.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
        };
        let builder = tokio_serial::new(&self.device, self.settings.baud.bits_per_second())
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(parity);
        let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            TransportError::NotConnected(format!("cannot open {}: {}", self.device, e))
        })?;
        info!(
            "Opened Modbus RTU line {} at {} baud, parity {:?}",
            self.device, self.settings.baud, self.settings.parity
        );
        Ok(tokio_modbus::client::rtu::attach(port))
    }
}

#[async_trait]
impl ModbusTransport for RtuTransport {
    async fn read(
        &mut self,
        function: FunctionKind,
        server_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        if self.context.is_none() {
            self.context = Some(self.open()?);
        }
        let Some(context) = self.context.as_mut() else {
            return Err(TransportError::NotConnected(self.device.clone()));
        };
        let result =
            read_with_deadline(context, function, server_id, address, count, timeout).await;
        if drops_connection(&result) {
            debug!("Dropping RTU context on {} after failure", self.device);
            self.context = None;
        }
        result
    }

    async fn reconfigure(&mut self, settings: &BusSettings) -> Result<(), TransportError> {
        info!(
            "Reconfiguring {}: {} baud, parity {:?}, inter-message delay {} ms",
            self.device, settings.baud, settings.parity, settings.inter_message_delay_ms
        );
        self.settings = settings.clone();
        // the port is reopened with the new settings on the next read
        self.context = None;
        Ok(())
    }
}

/// Modbus TCP master.
pub struct TcpTransport {
    address: SocketAddr,
    context: Option<Context>,
}

impl TcpTransport {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            context: None,
        }
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn read(
        &mut self,
        function: FunctionKind,
        server_id: u8,
        address: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        if self.context.is_none() {
            let connect = tokio_modbus::client::tcp::connect(self.address);
            let context = match time::timeout(timeout, connect).await {
                Ok(Ok(context)) => context,
                Ok(Err(e)) => {
                    return Err(TransportError::NotConnected(format!(
                        "{}: {}",
                        self.address, e
                    )))
                }
                Err(_) => return Err(TransportError::Timeout(timeout)),
            };
            info!("Connected to Modbus TCP gateway {}", self.address);
            self.context = Some(context);
        }
        let Some(context) = self.context.as_mut() else {
            return Err(TransportError::NotConnected(self.address.to_string()));
        };
        let result =
            read_with_deadline(context, function, server_id, address, count, timeout).await;
        if drops_connection(&result) {
            debug!("Dropping TCP connection to {} after failure", self.address);
            self.context = None;
        }
        result
    }

    async fn reconfigure(&mut self, _settings: &BusSettings) -> Result<(), TransportError> {
        debug!("Serial line settings do not apply to Modbus TCP, ignoring");
        Ok(())
    }
}

fn drops_connection(result: &Result<Vec<u16>, TransportError>) -> bool {
    matches!(
        result,
        Err(TransportError::Io(_)) | Err(TransportError::Timeout(_))
    )
}

async fn read_with_deadline(
    context: &mut Context,
    function: FunctionKind,
    server_id: u8,
    address: u16,
    count: u16,
    timeout: Duration,
) -> Result<Vec<u16>, TransportError> {
    match time::timeout(timeout, read_items(context, function, server_id, address, count)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

async fn read_items(
    context: &mut Context,
    function: FunctionKind,
    server_id: u8,
    address: u16,
    count: u16,
) -> Result<Vec<u16>, TransportError> {
    context.set_slave(Slave(server_id));
    let response = match function {
        FunctionKind::Coil => context
            .read_coils(address, count)
            .await
            .map(|r| r.map(bits_to_words)),
        FunctionKind::DiscreteInput => context
            .read_discrete_inputs(address, count)
            .await
            .map(|r| r.map(bits_to_words)),
        FunctionKind::InputRegister => context.read_input_registers(address, count).await,
        FunctionKind::HoldingRegister => context.read_holding_registers(address, count).await,
    };

    match response {
        Ok(Ok(words)) => Ok(words),
        Ok(Err(exception)) => {
            warn!(
                "Server {} answered function 0x{:02X} at {} with {:?}",
                server_id,
                function.code(),
                address,
                exception
            );
            Err(TransportError::Exception(exception_code(exception)))
        }
        Err(e) => Err(TransportError::Io(e.to_string())),
    }
}

fn bits_to_words(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}

fn exception_code(exception: ExceptionCode) -> u8 {
    u8::from(exception)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coil_bits_become_words() {
        assert_eq!(bits_to_words(vec![true, false, true]), vec![1, 0, 1]);
    }

    #[test]
    fn exception_codes_match_protocol() {
        assert_eq!(exception_code(ExceptionCode::IllegalFunction), 0x01);
        assert_eq!(exception_code(ExceptionCode::IllegalDataAddress), 0x02);
        assert_eq!(exception_code(ExceptionCode::ServerDeviceFailure), 0x04);
        assert_eq!(exception_code(ExceptionCode::ServerDeviceBusy), 0x06);
        assert_eq!(exception_code(ExceptionCode::GatewayTargetDevice), 0x0B);
        assert_eq!(exception_code(ExceptionCode::Custom(0x42)), 0x42);
    }

    #[tokio::test]
    async fn tcp_read_without_gateway_fails_cleanly() {
        // port 1 on localhost is closed on any sane test host
        let mut transport = TcpTransport::new("127.0.0.1:1".parse().unwrap());
        let result = transport
            .read(
                FunctionKind::HoldingRegister,
                1,
                0,
                1,
                Duration::from_millis(500),
            )
            .await;
        assert!(matches!(
            result,
            Err(TransportError::NotConnected(_)) | Err(TransportError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn rtu_open_failure_reports_not_connected() {
        let mut transport = RtuTransport::new("/dev/does-not-exist-0", BusSettings::default());
        let result = transport
            .read(
                FunctionKind::InputRegister,
                1,
                0,
                1,
                Duration::from_millis(100),
            )
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected(_))));
    }
}
