// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust field bus monitor library
//!
//! Polls remote Modbus devices over a shared bus, decodes their registers
//! into engineering values, watches them with hysteretic thresholds and
//! publishes the results in batches. The same device also samples its local
//! analog and digital inputs.

pub mod config;
pub mod config_store;
pub mod daemon;
pub mod error;
pub mod inputs;
pub mod modbus;
pub mod polling;
pub mod preprocessing;
pub mod register;
pub mod sinks;
pub mod threshold;
