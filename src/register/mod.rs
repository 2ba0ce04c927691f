// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Remote register descriptors
//!
//! A [`RegisterDescriptor`] tells the poller how to read one quantity from a
//! field device: which Modbus function and address to query, how many words
//! come back, and how to turn those words into an engineering value.
//!
//! The user-settable fields (`value_type`, `mask`, `shift`, ...) are stored
//! alongside a [`DecodeLayout`] derived from them. The layout is recomputed by
//! [`RegisterDescriptor::refresh_derived`] every time a descriptor is
//! committed through a [`ConfigStore`](crate::config_store::ConfigStore), so
//! the decoder never sees a layout that disagrees with the value type.
//!
//! ## YAML representation
//!
//! ```yaml
//! enabled: true
//! id: 1
//! timeout: 2000
//! poll: 1
//! function: holding_register
//! address: 100
//! type: float32_cdab
//! mask: 65535
//! shift: 0
//! scale: 1.0
//! offset: 0.0
//! ```

pub mod decode;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config_store::Derive;
use crate::error::ConfigValidationError;
use crate::threshold::ThresholdConfig;

pub use decode::decode;

/// Highest unicast server address allowed on a Modbus serial line
pub const MAX_SERVER_ID: u8 = 247;

/// Largest meaningful right shift for a 16-bit field
pub const MAX_SHIFT: u8 = 15;

/// Modbus read function used to fetch a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Function 0x01
    Coil,
    /// Function 0x02
    DiscreteInput,
    /// Function 0x04
    InputRegister,
    /// Function 0x03
    HoldingRegister,
}

impl FunctionKind {
    /// Modbus function code on the wire
    pub fn code(self) -> u8 {
        match self {
            FunctionKind::Coil => 0x01,
            FunctionKind::DiscreteInput => 0x02,
            FunctionKind::HoldingRegister => 0x03,
            FunctionKind::InputRegister => 0x04,
        }
    }

    /// True for the single-bit functions (coils and discrete inputs)
    pub fn is_bit_access(self) -> bool {
        matches!(self, FunctionKind::Coil | FunctionKind::DiscreteInput)
    }
}

/// Byte order of a 32-bit float spread over two registers.
///
/// `A B` are the high and low bytes of the first word, `C D` those of the
/// second word. The variant names the order in which those bytes form the
/// big-endian IEEE-754 representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatEndian {
    Abcd,
    Badc,
    Cdab,
    Dcba,
}

/// Interpretation of the raw register words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32(FloatEndian),
    /// Unsigned bit field extracted with mask and shift
    Bits,
}

impl ValueType {
    /// Every supported value type, in configuration order
    pub const ALL: [ValueType; 9] = [
        ValueType::Int16,
        ValueType::Uint16,
        ValueType::Int32,
        ValueType::Uint32,
        ValueType::Float32(FloatEndian::Abcd),
        ValueType::Float32(FloatEndian::Badc),
        ValueType::Float32(FloatEndian::Cdab),
        ValueType::Float32(FloatEndian::Dcba),
        ValueType::Bits,
    ];

    /// Configuration name of the type
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Int16 => "int16",
            ValueType::Uint16 => "uint16",
            ValueType::Int32 => "int32",
            ValueType::Uint32 => "uint32",
            ValueType::Float32(FloatEndian::Abcd) => "float32_abcd",
            ValueType::Float32(FloatEndian::Badc) => "float32_badc",
            ValueType::Float32(FloatEndian::Cdab) => "float32_cdab",
            ValueType::Float32(FloatEndian::Dcba) => "float32_dcba",
            ValueType::Bits => "bits",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == s)
            .ok_or_else(|| format!("unknown register value type '{}'", s))
    }
}

impl TryFrom<String> for ValueType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.as_str().to_string()
    }
}

/// Decode parameters derived from a descriptor's value type, mask and shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeLayout {
    /// Number of 16-bit words to read (1 or 2)
    pub word_count: u16,
    pub is_signed: bool,
    pub is_float: bool,
    /// Bits OR-ed into a 16-bit field whose sign bit is set
    pub sign_extend_mask: u32,
    /// Sign bit of the extracted field, 0 when sign extension does not apply
    pub sign_test_bit: u32,
}

impl DecodeLayout {
    /// Compute the layout for a value type and bit field.
    ///
    /// `shift` is expected to be already clamped to [`MAX_SHIFT`].
    pub fn derive(value_type: ValueType, mask: u16, shift: u8) -> Self {
        match value_type {
            ValueType::Int16 => {
                let (sign_test_bit, sign_extend_mask) = sign_bits(mask, shift);
                Self {
                    word_count: 1,
                    is_signed: true,
                    is_float: false,
                    sign_extend_mask,
                    sign_test_bit,
                }
            }
            ValueType::Uint16 | ValueType::Bits => Self {
                word_count: 1,
                ..Self::default()
            },
            ValueType::Int32 => Self {
                word_count: 2,
                is_signed: true,
                ..Self::default()
            },
            ValueType::Uint32 => Self {
                word_count: 2,
                ..Self::default()
            },
            ValueType::Float32(_) => Self {
                word_count: 2,
                is_signed: true,
                is_float: true,
                ..Self::default()
            },
        }
    }
}

/// Sign bit and extension mask of the field `mask >> shift`.
///
/// The field's top set bit is its sign bit. A field narrower than two bits
/// (or an empty mask) carries no sign.
fn sign_bits(mask: u16, shift: u8) -> (u32, u32) {
    let field = mask >> shift.min(MAX_SHIFT);
    let leading = field.leading_zeros();
    if leading < 15 {
        let sign_position = 15 - leading;
        (1u32 << sign_position, u32::MAX << sign_position)
    } else {
        (0, 0)
    }
}

/// How to read and interpret one remote register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterDescriptor {
    /// Disabled slots are skipped by the poller
    pub enabled: bool,

    /// Modbus server (slave) address
    #[serde(rename = "id")]
    pub server_id: u8,

    /// Response deadline for a single transaction
    #[serde(rename = "timeout")]
    pub timeout_ms: u32,

    /// Minimum number of seconds between two polls
    #[serde(rename = "poll")]
    pub poll_interval_s: u32,

    pub function: FunctionKind,

    /// Zero-based protocol address
    pub address: u16,

    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Bits kept from the first word (16-bit types only)
    pub mask: u16,

    /// Right shift applied after masking, clamped to 15 on commit
    pub shift: u8,

    pub scale: f64,
    pub offset: f64,

    /// Optional hysteresis alarm evaluated on the decoded value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<ThresholdConfig>,

    #[serde(skip)]
    layout: DecodeLayout,
}

impl Default for RegisterDescriptor {
    fn default() -> Self {
        let mut descriptor = Self {
            enabled: false,
            server_id: 1,
            timeout_ms: 2000,
            poll_interval_s: 1,
            function: FunctionKind::Coil,
            address: 0,
            value_type: ValueType::Uint16,
            mask: 0xFFFF,
            shift: 0,
            scale: 1.0,
            offset: 0.0,
            threshold: None,
            layout: DecodeLayout::default(),
        };
        descriptor.refresh_derived();
        descriptor
    }
}

impl RegisterDescriptor {
    /// Build an enabled descriptor with the derived layout already computed.
    pub fn new(
        server_id: u8,
        function: FunctionKind,
        address: u16,
        value_type: ValueType,
    ) -> Self {
        let mut descriptor = Self {
            enabled: true,
            server_id,
            function,
            address,
            value_type,
            ..Self::default()
        };
        descriptor.refresh_derived();
        descriptor
    }

    /// Derived decode layout, consistent with the last committed value type
    pub fn layout(&self) -> &DecodeLayout {
        &self.layout
    }

    /// Number of words read from the device
    pub fn word_count(&self) -> u16 {
        self.layout.word_count
    }

    /// Check the user-settable fields.
    ///
    /// `shift` is not checked here: out-of-range values are clamped when the
    /// derived fields are refreshed.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server_id == 0 || self.server_id > MAX_SERVER_ID {
            return Err(ConfigValidationError::new(
                "id",
                format!(
                    "server id {} outside 1..={}",
                    self.server_id, MAX_SERVER_ID
                ),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigValidationError::new(
                "timeout",
                "timeout must be greater than zero",
            ));
        }
        if self.poll_interval_s == 0 {
            return Err(ConfigValidationError::new(
                "poll",
                "poll interval must be at least one second",
            ));
        }
        if !self.scale.is_finite() {
            return Err(ConfigValidationError::new("scale", "scale must be finite"));
        }
        if !self.offset.is_finite() {
            return Err(ConfigValidationError::new(
                "offset",
                "offset must be finite",
            ));
        }
        if let Some(threshold) = &self.threshold {
            threshold.validate("threshold")?;
        }
        Ok(())
    }
}

impl Derive for RegisterDescriptor {
    fn refresh_derived(&mut self) {
        self.shift = self.shift.min(MAX_SHIFT);
        self.layout = DecodeLayout::derive(self.value_type, self.mask, self.shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_names_round_trip() {
        for value_type in ValueType::ALL {
            let parsed: ValueType = value_type.as_str().parse().unwrap();
            assert_eq!(parsed, value_type);
        }
        assert!("float64".parse::<ValueType>().is_err());
    }

    #[test]
    fn defaults_match_an_unconfigured_slot() {
        let descriptor = RegisterDescriptor::default();
        assert!(!descriptor.enabled);
        assert_eq!(descriptor.server_id, 1);
        assert_eq!(descriptor.timeout_ms, 2000);
        assert_eq!(descriptor.poll_interval_s, 1);
        assert_eq!(descriptor.function, FunctionKind::Coil);
        assert_eq!(descriptor.value_type, ValueType::Uint16);
        assert_eq!(descriptor.mask, 0xFFFF);
        assert_eq!(descriptor.word_count(), 1);
    }

    #[test]
    fn layout_follows_value_type() {
        let int16 = DecodeLayout::derive(ValueType::Int16, 0xFFFF, 0);
        assert_eq!(int16.word_count, 1);
        assert!(int16.is_signed);
        assert_eq!(int16.sign_test_bit, 0x8000);
        assert_eq!(int16.sign_extend_mask, 0xFFFF_8000);

        let float = DecodeLayout::derive(ValueType::Float32(FloatEndian::Cdab), 0xFFFF, 0);
        assert_eq!(float.word_count, 2);
        assert!(float.is_float);
        assert_eq!(float.sign_test_bit, 0);

        let uint32 = DecodeLayout::derive(ValueType::Uint32, 0x00FF, 4);
        assert_eq!(uint32.word_count, 2);
        assert!(!uint32.is_signed);
    }

    #[test]
    fn sign_bit_tracks_narrow_fields() {
        // 4-bit field in bits 4..8
        let layout = DecodeLayout::derive(ValueType::Int16, 0x00F0, 4);
        assert_eq!(layout.sign_test_bit, 0x8);
        assert_eq!(layout.sign_extend_mask, 0xFFFF_FFF8);

        // single bit fields carry no sign
        let single = DecodeLayout::derive(ValueType::Int16, 0x0001, 0);
        assert_eq!(single.sign_test_bit, 0);
        assert_eq!(single.sign_extend_mask, 0);

        let empty = DecodeLayout::derive(ValueType::Int16, 0x0000, 0);
        assert_eq!(empty.sign_test_bit, 0);
    }

    #[test]
    fn refresh_clamps_shift() {
        let mut descriptor = RegisterDescriptor::new(1, FunctionKind::InputRegister, 0, ValueType::Bits);
        descriptor.shift = 40;
        descriptor.refresh_derived();
        assert_eq!(descriptor.shift, MAX_SHIFT);
    }

    #[test]
    fn refresh_updates_word_count_after_type_change() {
        let mut descriptor =
            RegisterDescriptor::new(3, FunctionKind::HoldingRegister, 10, ValueType::Int16);
        descriptor.value_type = ValueType::Int32;
        assert_eq!(descriptor.word_count(), 1);
        descriptor.refresh_derived();
        assert_eq!(descriptor.word_count(), 2);
    }

    #[test]
    fn validation_rejects_bad_fields() {
        let valid = RegisterDescriptor::new(1, FunctionKind::HoldingRegister, 0, ValueType::Uint16);
        assert!(valid.validate().is_ok());

        let mut bad = valid.clone();
        bad.server_id = 0;
        assert_eq!(bad.validate().unwrap_err().field, "id");

        let mut bad = valid.clone();
        bad.server_id = 248;
        assert!(bad.validate().is_err());

        let mut bad = valid.clone();
        bad.timeout_ms = 0;
        assert_eq!(bad.validate().unwrap_err().field, "timeout");

        let mut bad = valid.clone();
        bad.poll_interval_s = 0;
        assert_eq!(bad.validate().unwrap_err().field, "poll");

        let mut bad = valid;
        bad.scale = f64::NAN;
        assert_eq!(bad.validate().unwrap_err().field, "scale");
    }

    #[test]
    fn yaml_uses_short_field_names() {
        let yaml = "enabled: true\nid: 7\nfunction: input_register\naddress: 12\ntype: float32_badc\nscale: 0.5\n";
        let mut descriptor: RegisterDescriptor = serde_yml::from_str(yaml).unwrap();
        descriptor.refresh_derived();
        assert!(descriptor.enabled);
        assert_eq!(descriptor.server_id, 7);
        assert_eq!(descriptor.function, FunctionKind::InputRegister);
        assert_eq!(descriptor.value_type, ValueType::Float32(FloatEndian::Badc));
        assert_eq!(descriptor.word_count(), 2);
        assert_eq!(descriptor.timeout_ms, 2000);
        assert_eq!(descriptor.scale, 0.5);
    }
}
