// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).
//! Signal preprocessing module
//!
//! This module smooths the locally sampled analog inputs before they are
//! scaled and compared against their alarm thresholds.

pub mod filters;

pub use filters::ExponentialMovingAverage;
