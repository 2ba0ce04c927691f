// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic polling of remote registers
//!
//! - [`scheduler`]: the poll loop and its slot arena
//! - [`aggregator`]: batching of results for the publish sink
//! - [`clock`]: coarse uptime sources, real or manual

pub mod aggregator;
pub mod clock;
pub mod scheduler;

pub use aggregator::{AggregatedBatch, PollResult, ResultAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{PollScheduler, PollerHandle, SlotId, SlotState, SlotStatistics};
