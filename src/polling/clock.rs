// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Coarse uptime sources for the poller

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Seconds elapsed since the poller started
pub trait Clock: Send + Sync {
    fn uptime_secs(&self) -> u64;
}

/// Monotonic clock started at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

/// Clock advanced by hand, clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(start_secs)),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn uptime_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
