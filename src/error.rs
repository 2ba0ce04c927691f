// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types shared by the polling engine
//!
//! Three families of failures exist and none of them is allowed to stop the
//! poll loop:
//!
//! - [`DecodeError`]: a decoder was handed the wrong number of words
//! - [`TransportError`]: the bus transaction failed (timeout, exception, I/O)
//! - [`ConfigValidationError`]: a configuration write was rejected before commit

use std::time::Duration;

use thiserror::Error;

/// Failure of the register decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The word slice length does not match the descriptor's word count
    #[error("Malformed input: expected {expected} word(s), got {actual}")]
    MalformedInput { expected: usize, actual: usize },
}

/// Failure of a single bus transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response before the per-slot deadline
    #[error("Response timed out after {0:?}")]
    Timeout(Duration),
    /// The remote device answered with a Modbus exception code
    #[error("Device answered with exception code 0x{0:02X}")]
    Exception(u8),
    /// Serial or socket failure, framing or CRC error
    #[error("Transport I/O failure: {0}")]
    Io(String),
    /// The transport could not be opened
    #[error("Transport not connected: {0}")]
    NotConnected(String),
    /// Bus settings cannot be applied to this transport
    #[error("Invalid bus settings: {0}")]
    InvalidSettings(String),
}

/// A configuration write rejected at commit time.
///
/// The active configuration is untouched when this error is returned.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid value for '{field}': {reason}")]
pub struct ConfigValidationError {
    /// Name of the offending field
    pub field: String,
    /// Human readable reason
    pub reason: String,
}

impl ConfigValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
