// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Raw register words to engineering values

use super::{FloatEndian, RegisterDescriptor, ValueType, MAX_SHIFT};
use crate::error::DecodeError;

/// Decode the words read for `descriptor` into a scaled value.
///
/// The result is `raw * scale + offset` where `raw` depends on the value type:
///
/// - `Uint16` / `Bits`: `(words[0] & mask) >> shift`
/// - `Int16`: the same field, sign-extended from its top bit
/// - `Uint32` / `Int32`: `words[0]` is the high word
/// - `Float32`: the four bytes permuted per the endian variant
///
/// # Errors
///
/// [`DecodeError::MalformedInput`] when `words.len()` differs from the
/// descriptor's word count.
pub fn decode(words: &[u16], descriptor: &RegisterDescriptor) -> Result<f64, DecodeError> {
    let layout = descriptor.layout();
    let expected = usize::from(layout.word_count);
    if words.len() != expected {
        return Err(DecodeError::MalformedInput {
            expected,
            actual: words.len(),
        });
    }

    let raw = match descriptor.value_type {
        ValueType::Uint16 | ValueType::Bits => {
            f64::from(extract_field(words[0], descriptor.mask, descriptor.shift))
        }
        ValueType::Int16 => {
            let mut field = extract_field(words[0], descriptor.mask, descriptor.shift);
            if field & layout.sign_test_bit != 0 {
                field |= layout.sign_extend_mask;
            }
            f64::from(field as i32)
        }
        ValueType::Uint32 => f64::from(join_words(words[0], words[1])),
        ValueType::Int32 => f64::from(join_words(words[0], words[1]) as i32),
        ValueType::Float32(endian) => f64::from(f32::from_bits(float_bits(
            words[0], words[1], endian,
        ))),
    };

    Ok(raw * descriptor.scale + descriptor.offset)
}

/// `(word & mask) >> shift`, widened to 32 bits
pub fn extract_field(word: u16, mask: u16, shift: u8) -> u32 {
    u32::from(word & mask) >> shift.min(MAX_SHIFT)
}

/// High word first
pub fn join_words(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// IEEE-754 bit pattern assembled from two words in the given byte order
pub fn float_bits(first: u16, second: u16, endian: FloatEndian) -> u32 {
    let [a, b] = first.to_be_bytes();
    let [c, d] = second.to_be_bytes();
    let bytes = match endian {
        FloatEndian::Abcd => [a, b, c, d],
        FloatEndian::Badc => [b, a, d, c],
        FloatEndian::Cdab => [c, d, a, b],
        FloatEndian::Dcba => [d, c, b, a],
    };
    u32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::Derive;
    use crate::register::FunctionKind;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn descriptor(value_type: ValueType, mask: u16, shift: u8) -> RegisterDescriptor {
        let mut descriptor =
            RegisterDescriptor::new(1, FunctionKind::HoldingRegister, 0, value_type);
        descriptor.mask = mask;
        descriptor.shift = shift;
        descriptor.refresh_derived();
        descriptor
    }

    #[test]
    fn uint16_mask_scale_and_offset() {
        let mut d = descriptor(ValueType::Uint16, 0x00FF, 0);
        d.scale = 2.0;
        d.offset = 1.0;
        assert_eq!(decode(&[0x1234], &d).unwrap(), 105.0);
    }

    #[test]
    fn int16_full_mask_minimum() {
        let d = descriptor(ValueType::Int16, 0xFFFF, 0);
        assert_eq!(decode(&[0x8000], &d).unwrap(), -32768.0);
        assert_eq!(decode(&[0xFFFF], &d).unwrap(), -1.0);
        assert_eq!(decode(&[0x7FFF], &d).unwrap(), 32767.0);
    }

    #[test]
    fn int16_narrow_field_is_sign_extended() {
        // nibble 0xE in bits 8..12 is -2 as a 4-bit two's complement value
        let d = descriptor(ValueType::Int16, 0x0F00, 8);
        assert_eq!(decode(&[0xAE55], &d).unwrap(), -2.0);
        assert_eq!(decode(&[0xA355], &d).unwrap(), 3.0);
    }

    #[test]
    fn empty_mask_reads_zero() {
        let d = descriptor(ValueType::Int16, 0x0000, 0);
        assert_eq!(decode(&[0xFFFF], &d).unwrap(), 0.0);
        let d = descriptor(ValueType::Bits, 0x0000, 3);
        assert_eq!(decode(&[0xFFFF], &d).unwrap(), 0.0);
    }

    #[test]
    fn bits_extracts_single_flag() {
        let d = descriptor(ValueType::Bits, 0x0010, 4);
        assert_eq!(decode(&[0x0013], &d).unwrap(), 1.0);
        assert_eq!(decode(&[0x0003], &d).unwrap(), 0.0);
    }

    #[test]
    fn thirty_two_bit_integers_take_high_word_first() {
        let d = descriptor(ValueType::Uint32, 0xFFFF, 0);
        assert_eq!(decode(&[0x0001, 0x0002], &d).unwrap(), 65538.0);
        assert_eq!(decode(&[0xFFFF, 0xFFFF], &d).unwrap(), 4294967295.0);

        let d = descriptor(ValueType::Int32, 0xFFFF, 0);
        assert_eq!(decode(&[0xFFFF, 0xFFFE], &d).unwrap(), -2.0);
    }

    #[test]
    fn thirty_two_bit_types_ignore_mask() {
        let d = descriptor(ValueType::Uint32, 0x000F, 2);
        assert_eq!(decode(&[0x0000, 0x1234], &d).unwrap(), 4660.0);
    }

    #[test]
    fn float_byte_orders() {
        // 1.5f32 == 0x3FC00000
        let abcd = descriptor(ValueType::Float32(FloatEndian::Abcd), 0xFFFF, 0);
        assert_relative_eq!(decode(&[0x3FC0, 0x0000], &abcd).unwrap(), 1.5);

        let cdab = descriptor(ValueType::Float32(FloatEndian::Cdab), 0xFFFF, 0);
        assert_relative_eq!(decode(&[0x0000, 0x3FC0], &cdab).unwrap(), 1.5);

        let badc = descriptor(ValueType::Float32(FloatEndian::Badc), 0xFFFF, 0);
        assert_relative_eq!(decode(&[0xC03F, 0x0000], &badc).unwrap(), 1.5);

        let dcba = descriptor(ValueType::Float32(FloatEndian::Dcba), 0xFFFF, 0);
        assert_relative_eq!(decode(&[0x0000, 0xC03F], &dcba).unwrap(), 1.5);
    }

    #[test]
    fn wrong_word_count_is_reported() {
        let d = descriptor(ValueType::Float32(FloatEndian::Abcd), 0xFFFF, 0);
        assert_eq!(
            decode(&[0x3FC0], &d),
            Err(DecodeError::MalformedInput {
                expected: 2,
                actual: 1
            })
        );
        let d = descriptor(ValueType::Uint16, 0xFFFF, 0);
        assert!(decode(&[], &d).is_err());
        assert!(decode(&[1, 2], &d).is_err());
    }

    proptest! {
        #[test]
        fn unsigned_field_round_trips(value in any::<u16>(), mask in any::<u16>(), shift in 0u8..=15) {
            let d = descriptor(ValueType::Uint16, mask, shift);
            let decoded = decode(&[value], &d).unwrap();
            prop_assert_eq!(decoded, f64::from((value & mask) >> shift));
        }

        #[test]
        fn int16_negative_iff_sign_bit_set(value in any::<u16>()) {
            let d = descriptor(ValueType::Int16, 0xFFFF, 0);
            let decoded = decode(&[value], &d).unwrap();
            prop_assert_eq!(decoded < 0.0, value & 0x8000 != 0);
        }

        #[test]
        fn int16_sign_follows_field_top_bit(
            value in any::<u16>(),
            mask in any::<u16>(),
            shift in 0u8..=15,
        ) {
            let d = descriptor(ValueType::Int16, mask, shift);
            let field = extract_field(value, mask, shift);
            let decoded = decode(&[value], &d).unwrap();
            prop_assert_eq!(decoded < 0.0, field & d.layout().sign_test_bit != 0);
        }

        #[test]
        fn int16_contiguous_field_round_trips(
            width in 2u32..=16,
            position_seed in any::<u32>(),
            value_seed in any::<i32>(),
            noise in any::<u16>(),
        ) {
            let position = position_seed % (17 - width);
            let field_mask = ((1u32 << width) - 1) as u16;
            let mask = field_mask << position;
            let span = 1i32 << width;
            let expected = value_seed.rem_euclid(span) - span / 2;
            let word = (noise & !mask) | (((expected as u16) & field_mask) << position);

            let d = descriptor(ValueType::Int16, mask, position as u8);
            prop_assert_eq!(decode(&[word], &d).unwrap(), f64::from(expected));
        }

        #[test]
        fn float_orders_are_byte_permutations(first in any::<u16>(), second in any::<u16>()) {
            let reference = |w0: u16, w1: u16| float_bits(w0, w1, FloatEndian::Abcd);
            prop_assert_eq!(
                float_bits(first, second, FloatEndian::Badc),
                reference(first.swap_bytes(), second.swap_bytes())
            );
            prop_assert_eq!(
                float_bits(first, second, FloatEndian::Cdab),
                reference(second, first)
            );
            prop_assert_eq!(
                float_bits(first, second, FloatEndian::Dcba),
                reference(second.swap_bytes(), first.swap_bytes())
            );

            let cdab = descriptor(ValueType::Float32(FloatEndian::Cdab), 0xFFFF, 0);
            let abcd = descriptor(ValueType::Float32(FloatEndian::Abcd), 0xFFFF, 0);
            let swapped = decode(&[first, second], &cdab).unwrap();
            let plain = decode(&[second, first], &abcd).unwrap();
            prop_assert_eq!(swapped.to_bits(), plain.to_bits());
        }
    }
}
