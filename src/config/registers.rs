// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poller and register slot configuration

use serde::{Deserialize, Serialize};

use crate::config_store::Derive;
use crate::register::RegisterDescriptor;

/// Poll loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Scheduler tick period in milliseconds.
    ///
    /// Slot intervals are expressed in whole seconds, the tick only bounds
    /// how late a due slot can be picked up.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

/// A named poll slot.
///
/// The descriptor fields sit next to `name` in the YAML file:
///
/// ```yaml
/// registers:
///   - name: tank_level
///     enabled: true
///     id: 3
///     function: input_register
///     address: 10
///     type: int16
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSlotConfig {
    /// Name reported in published results, unique across the slots
    pub name: String,

    #[serde(flatten)]
    pub descriptor: RegisterDescriptor,
}

impl RegisterSlotConfig {
    pub fn new(name: impl Into<String>, descriptor: RegisterDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }

    /// Default slots `modbus1`..`modbus{count}`, all disabled
    pub fn defaults(count: usize) -> Vec<Self> {
        (1..=count)
            .map(|i| Self::new(format!("modbus{}", i), RegisterDescriptor::default()))
            .collect()
    }
}

impl Derive for RegisterSlotConfig {
    fn refresh_derived(&mut self) {
        self.descriptor.refresh_derived();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{FunctionKind, ValueType};

    #[test]
    fn flattened_slot_from_yaml() {
        let yaml = "name: tank_level\nenabled: true\nid: 3\nfunction: input_register\naddress: 10\ntype: int32\n";
        let mut slot: RegisterSlotConfig = serde_yml::from_str(yaml).unwrap();
        slot.refresh_derived();
        assert_eq!(slot.name, "tank_level");
        assert!(slot.descriptor.enabled);
        assert_eq!(slot.descriptor.server_id, 3);
        assert_eq!(slot.descriptor.function, FunctionKind::InputRegister);
        assert_eq!(slot.descriptor.value_type, ValueType::Int32);
        assert_eq!(slot.descriptor.word_count(), 2);
        assert_eq!(slot.descriptor.timeout_ms, 2000);
    }

    #[test]
    fn default_slots() {
        let slots = RegisterSlotConfig::defaults(3);
        let names: Vec<_> = slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["modbus1", "modbus2", "modbus3"]);
        assert!(slots.iter().all(|s| !s.descriptor.enabled));
    }
}
