// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Batching of poll results
//!
//! The poller pushes one [`PollResult`] per attempt. At the end of each tick
//! it asks the [`ResultAggregator`] for a batch; a batch is only produced
//! when results are pending and no batch was emitted during the same second.
//!
//! A batch serializes to the uplink payload:
//!
//! ```json
//! {"modbus":[{"name":"modbus1","result":0,"value":21.5},{"name":"modbus2","result":226}]}
//! ```
//!
//! `value` is only present for successful reads.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::modbus::TransportStatus;

/// Outcome of one poll attempt
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub slot_name: String,
    pub status: TransportStatus,
    /// Decoded and scaled value, meaningless unless `status` is success
    pub value: f64,
}

impl PollResult {
    pub fn success(slot_name: impl Into<String>, value: f64) -> Self {
        Self {
            slot_name: slot_name.into(),
            status: TransportStatus::Success,
            value,
        }
    }

    pub fn failure(slot_name: impl Into<String>, status: TransportStatus) -> Self {
        Self {
            slot_name: slot_name.into(),
            status,
            value: 0.0,
        }
    }
}

impl Serialize for PollResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let success = self.status.is_success();
        let mut state =
            serializer.serialize_struct("PollResult", if success { 3 } else { 2 })?;
        state.serialize_field("name", &self.slot_name)?;
        state.serialize_field("result", &self.status.code())?;
        if success {
            state.serialize_field("value", &self.value)?;
        } else {
            state.skip_field("value")?;
        }
        state.end()
    }
}

/// Results collected since the previous emission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedBatch {
    #[serde(rename = "modbus")]
    pub results: Vec<PollResult>,
    /// Poller uptime second in which the batch was emitted
    #[serde(skip)]
    pub emitted_at: u64,
}

impl AggregatedBatch {
    pub fn new(results: Vec<PollResult>, emitted_at: u64) -> Self {
        Self {
            results,
            emitted_at,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Collects poll results and emits them at most once per second
#[derive(Debug, Default)]
pub struct ResultAggregator {
    pending: Vec<PollResult>,
    last_emission: Option<u64>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: PollResult) {
        self.pending.push(result);
    }

    pub fn pending(&self) -> &[PollResult] {
        &self.pending
    }

    /// Drain pending results if any exist and `now_s` differs from the last
    /// emission second
    pub fn take_if_due(&mut self, now_s: u64) -> Option<AggregatedBatch> {
        if self.pending.is_empty() || self.last_emission == Some(now_s) {
            return None;
        }
        self.last_emission = Some(now_s);
        Some(AggregatedBatch::new(std::mem::take(&mut self.pending), now_s))
    }
}
