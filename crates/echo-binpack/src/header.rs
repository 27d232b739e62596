// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Negotiated integer widths and the header that carries them.
//!
//! Layout:
//!
//! ```text
//! byte 0:  bit 0 = custom widths follow, bits 1..7 reserved (zero)
//! byte 1:  bits 0-1 refId | bits 2-3 array length | bits 4-5 string length | bits 6-7 array buffer length
//! ```
//!
//! Selectors are `00` = absent, `01` = 1 byte, `10` = 2 bytes, `11` = 4 bytes.
//! Byte 1 is only present when the widths differ from [`Widths::WIRE_DEFAULT`].

use serde::{Deserialize, Serialize};

use crate::codec::{Reader, Writer};
use crate::error::CodecError;
use crate::storage::IntWidth;

/// Header bit announcing the custom-widths byte.
pub const HEADER_CUSTOM_WIDTHS: u8 = 0b0000_0001;

/// Provisional maximum assumed for string and array buffer lengths.
///
/// Widths for those prefixes never go below what this value needs, which
/// keeps them at two bytes unless a payload is actually longer.
pub const PROVISIONAL_LENGTH_MAX: u64 = 600;

/// Widths of every variable-size integer on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Widths {
    /// Width of reference ids.
    pub ref_id: IntWidth,
    /// Width of variable array length prefixes.
    pub array_length: IntWidth,
    /// Width of string length prefixes.
    pub string_length: IntWidth,
    /// Width of array buffer length prefixes.
    pub array_buffer_length: IntWidth,
}

impl Widths {
    /// Widths assumed when the header carries no custom-widths byte.
    pub const WIRE_DEFAULT: Self = Self {
        ref_id: IntWidth::Null,
        array_length: IntWidth::U8,
        string_length: IntWidth::U16,
        array_buffer_length: IntWidth::U16,
    };

    /// Pack into the custom-widths byte.
    pub const fn pack(self) -> u8 {
        self.ref_id.selector()
            | (self.array_length.selector() << 2)
            | (self.string_length.selector() << 4)
            | (self.array_buffer_length.selector() << 6)
    }

    /// Unpack the custom-widths byte.
    pub const fn unpack(byte: u8) -> Self {
        Self {
            ref_id: IntWidth::from_selector(byte),
            array_length: IntWidth::from_selector(byte >> 2),
            string_length: IntWidth::from_selector(byte >> 4),
            array_buffer_length: IntWidth::from_selector(byte >> 6),
        }
    }
}

impl Default for Widths {
    fn default() -> Self {
        Self::WIRE_DEFAULT
    }
}

/// Largest values observed while flattening, used to negotiate [`Widths`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WidthStats {
    /// Largest reference id written, `None` if no reference id is written.
    pub max_ref_id: Option<u64>,
    /// Largest variable array length, `None` if the payload has no variable arrays.
    pub max_array_length: Option<u64>,
    /// Longest string payload in bytes.
    pub max_string_length: u64,
    /// Longest array buffer payload in bytes.
    pub max_array_buffer_length: u64,
}

impl WidthStats {
    /// Pick the narrowest widths covering these maxima.
    pub fn negotiate(&self) -> Result<Widths, CodecError> {
        let fit = |what: &'static str, value: u64| {
            IntWidth::for_max(value).ok_or(CodecError::WidthOverflow {
                what,
                value,
                width: IntWidth::U32,
            })
        };
        Ok(Widths {
            ref_id: match self.max_ref_id {
                Some(max) => fit("reference id", max)?,
                None => Widths::WIRE_DEFAULT.ref_id,
            },
            array_length: match self.max_array_length {
                Some(max) => fit("array length", max)?,
                None => Widths::WIRE_DEFAULT.array_length,
            },
            string_length: fit(
                "string length",
                self.max_string_length.max(PROVISIONAL_LENGTH_MAX),
            )?,
            array_buffer_length: fit(
                "array buffer length",
                self.max_array_buffer_length.max(PROVISIONAL_LENGTH_MAX),
            )?,
        })
    }
}

/// Write the header for `widths`: one byte, plus the custom-widths byte when needed.
pub fn write_header(writer: &mut Writer, widths: Widths) {
    if widths == Widths::WIRE_DEFAULT {
        writer.write_u8(0);
    } else {
        writer.write_u8(HEADER_CUSTOM_WIDTHS);
        writer.write_u8(widths.pack());
    }
}

/// Read a header written by [`write_header`].
pub fn read_header(reader: &mut Reader<'_>) -> Result<Widths, CodecError> {
    let flags = reader.read_u8()?;
    if flags & !HEADER_CUSTOM_WIDTHS != 0 {
        return Err(CodecError::UnsupportedHeader(flags));
    }
    if flags & HEADER_CUSTOM_WIDTHS == 0 {
        Ok(Widths::WIRE_DEFAULT)
    } else {
        Ok(Widths::unpack(reader.read_u8()?))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn default_widths_use_one_byte() {
        let mut w = Writer::new(true);
        write_header(&mut w, Widths::WIRE_DEFAULT);
        assert_eq!(w.into_vec(), vec![0]);
    }

    #[test]
    fn custom_widths_pack_at_documented_offsets() {
        let widths = Widths {
            ref_id: IntWidth::U8,
            array_length: IntWidth::U16,
            string_length: IntWidth::U16,
            array_buffer_length: IntWidth::U32,
        };
        assert_eq!(widths.pack(), 0b11_10_10_01);

        let mut w = Writer::new(true);
        write_header(&mut w, widths);
        let bytes = w.into_vec();
        assert_eq!(bytes, vec![HEADER_CUSTOM_WIDTHS, 0b11_10_10_01]);
        assert_eq!(read_header(&mut Reader::new(&bytes, true)).unwrap(), widths);
    }

    #[test]
    fn reserved_header_bits_are_rejected() {
        let bytes = [0b10];
        assert!(matches!(
            read_header(&mut Reader::new(&bytes, true)),
            Err(CodecError::UnsupportedHeader(0b10))
        ));
    }

    #[test]
    fn negotiation_keeps_defaults_for_small_payloads() {
        let stats = WidthStats {
            max_ref_id: None,
            max_array_length: Some(12),
            max_string_length: 40,
            max_array_buffer_length: 0,
        };
        assert_eq!(stats.negotiate().unwrap(), Widths::WIRE_DEFAULT);
    }

    #[test]
    fn negotiation_widens_when_needed() {
        let stats = WidthStats {
            max_ref_id: Some(300),
            max_array_length: Some(256),
            max_string_length: 70_000,
            max_array_buffer_length: 10,
        };
        let widths = stats.negotiate().unwrap();
        assert_eq!(widths.ref_id, IntWidth::U16);
        assert_eq!(widths.array_length, IntWidth::U16);
        assert_eq!(widths.string_length, IntWidth::U32);
        assert_eq!(widths.array_buffer_length, IntWidth::U16);
    }
}
