// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage type table and integer width selectors.
//!
//! [`StorageType`] is the closed set of primitive wire types. The discriminant
//! order matters: object fields are emitted sorted by `(storage type, name id)`,
//! so same-width fields end up next to each other.
//!
//! [`IntWidth`] selects how many bytes a length prefix, reference id or index
//! occupies. It maps onto the 2-bit selectors of the custom-widths header byte.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Primitive wire types.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Signed 8-bit integer.
    Int8 = 1,
    /// Signed 16-bit integer.
    Int16 = 2,
    /// Signed 32-bit integer.
    Int32 = 3,
    /// Unsigned 8-bit integer.
    Uint8 = 4,
    /// Unsigned 16-bit integer.
    Uint16 = 5,
    /// Unsigned 32-bit integer.
    Uint32 = 6,
    /// IEEE-754 single precision float.
    Float32 = 7,
    /// IEEE-754 double precision float.
    Float64 = 8,
    /// Array container (variable-length array or tuple).
    Array = 9,
    /// Object container.
    Object = 10,
    /// Length-prefixed UTF-8 string.
    String = 11,
    /// Single byte, non-zero is `true`.
    Bool = 12,
    /// 16-byte UUID, all zeroes meaning "absent".
    Uuid = 13,
    /// 16-byte asset UUID; subject to asset-link resolution and asset loading.
    AssetUuid = 14,
    /// Length-prefixed raw bytes.
    ArrayBuffer = 15,
    /// Zero-width value.
    Null = 16,
    /// Reference to an object whose structure is picked from a set of variants.
    UnionArray = 17,
}

impl StorageType {
    /// Every storage type in wire order.
    pub const ALL: [Self; 17] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Float32,
        Self::Float64,
        Self::Array,
        Self::Object,
        Self::String,
        Self::Bool,
        Self::Uuid,
        Self::AssetUuid,
        Self::ArrayBuffer,
        Self::Null,
        Self::UnionArray,
    ];

    /// Byte length of a fixed-width type, `None` for length-prefixed and structural types.
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::Uint8 | Self::Bool => Some(1),
            Self::Int16 | Self::Uint16 => Some(2),
            Self::Int32 | Self::Uint32 | Self::Float32 => Some(4),
            Self::Float64 => Some(8),
            Self::Uuid | Self::AssetUuid => Some(16),
            Self::Null => Some(0),
            Self::String | Self::ArrayBuffer | Self::Array | Self::Object | Self::UnionArray => {
                None
            }
        }
    }

    /// `true` for types that describe containers rather than leaf values.
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Array | Self::Object | Self::UnionArray)
    }

    /// `true` for the integer types.
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Uint8 | Self::Uint16 | Self::Uint32
        )
    }

    /// Inclusive integer range for integer types.
    pub const fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            Self::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::Uint8 => Some((0, u8::MAX as i64)),
            Self::Uint16 => Some((0, u16::MAX as i64)),
            Self::Uint32 => Some((0, u32::MAX as i64)),
            _ => None,
        }
    }

    /// Schema-document name of the type (`"uint8"`, `"asset_uuid"`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Array => "array",
            Self::Object => "object",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Uuid => "uuid",
            Self::AssetUuid => "asset_uuid",
            Self::ArrayBuffer => "array_buffer",
            Self::Null => "null",
            Self::UnionArray => "union_array",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown storage type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage type `{0}`")]
pub struct UnknownStorageType(pub String);

impl FromStr for StorageType {
    type Err = UnknownStorageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| UnknownStorageType(s.to_owned()))
    }
}

/// Width of an unsigned integer used for lengths, reference ids and indices.
///
/// The discriminant is the 2-bit selector stored in the custom-widths byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntWidth {
    /// Zero bytes; every value reads back as `0`.
    Null = 0,
    /// One byte.
    U8 = 1,
    /// Two bytes.
    U16 = 2,
    /// Four bytes.
    U32 = 3,
}

impl IntWidth {
    /// Narrowest width able to hold `max`.
    ///
    /// Uses `ceil(bits(max) / 8)` bytes, rounded up to 0, 1, 2 or 4. Returns
    /// `None` when `max` needs more than four bytes.
    pub const fn for_max(max: u64) -> Option<Self> {
        let bits = u64::BITS - max.leading_zeros();
        match bits.div_ceil(8) {
            0 => Some(Self::Null),
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            3 | 4 => Some(Self::U32),
            _ => None,
        }
    }

    /// Number of bytes this width occupies on the wire.
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Null => 0,
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Largest value representable at this width.
    pub const fn max_value(self) -> u64 {
        match self {
            Self::Null => 0,
            Self::U8 => u8::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
        }
    }

    /// Storage type with the same byte layout.
    pub const fn storage_type(self) -> StorageType {
        match self {
            Self::Null => StorageType::Null,
            Self::U8 => StorageType::Uint8,
            Self::U16 => StorageType::Uint16,
            Self::U32 => StorageType::Uint32,
        }
    }

    /// 2-bit header selector.
    pub const fn selector(self) -> u8 {
        self as u8
    }

    /// Inverse of [`selector`](Self::selector); only the low two bits are used.
    pub const fn from_selector(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Null,
            1 => Self::U8,
            2 => Self::U16,
            _ => Self::U32,
        }
    }

    /// Width needed for an index into a list of `len` entries, used by enums
    /// (1-based, so the largest stored value is `len`) and unions.
    pub fn for_len(len: usize) -> Self {
        u64::try_from(len)
            .ok()
            .and_then(Self::for_max)
            .unwrap_or(Self::U32)
    }
}

impl fmt::Display for IntWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "null",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_for_max_picks_narrowest() {
        assert_eq!(IntWidth::for_max(0), Some(IntWidth::Null));
        assert_eq!(IntWidth::for_max(1), Some(IntWidth::U8));
        assert_eq!(IntWidth::for_max(255), Some(IntWidth::U8));
        assert_eq!(IntWidth::for_max(256), Some(IntWidth::U16));
        assert_eq!(IntWidth::for_max(600), Some(IntWidth::U16));
        assert_eq!(IntWidth::for_max(65_536), Some(IntWidth::U32));
        assert_eq!(IntWidth::for_max(u64::from(u32::MAX)), Some(IntWidth::U32));
        assert_eq!(IntWidth::for_max(u64::from(u32::MAX) + 1), None);
    }

    #[test]
    fn selector_round_trips() {
        for width in [IntWidth::Null, IntWidth::U8, IntWidth::U16, IntWidth::U32] {
            assert_eq!(IntWidth::from_selector(width.selector()), width);
        }
    }

    #[test]
    fn storage_names_parse_back() {
        for ty in StorageType::ALL {
            assert_eq!(ty.name().parse::<StorageType>(), Ok(ty));
        }
        assert!("uint64".parse::<StorageType>().is_err());
    }

    #[test]
    fn wire_order_follows_discriminants() {
        assert!(StorageType::Array < StorageType::String);
        assert!(StorageType::Uint8 < StorageType::Float32);
        assert_eq!(StorageType::Int8 as u8, 1);
        assert_eq!(StorageType::Null as u8, 16);
    }
}
