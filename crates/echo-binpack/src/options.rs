// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-call codec options.

use serde::{Deserialize, Serialize};

use crate::header::Widths;
use crate::schema::{NameIds, Schema};

/// Default for [`CodecOptions::max_array_elements`].
pub const DEFAULT_MAX_ARRAY_ELEMENTS: u32 = 1 << 20;

/// Wire-level switches shared by the encoder and the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodecOptions {
    /// Byte order of every multi-byte scalar.
    pub little_endian: bool,
    /// Write (and expect) the header byte carrying negotiated widths.
    pub use_header_byte: bool,
    /// Widths used when there is no header byte to carry them.
    pub widths: Widths,
    /// Most variable-array elements one decode accepts, summed over all arrays.
    pub max_array_elements: u32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            little_endian: true,
            use_header_byte: true,
            widths: Widths::WIRE_DEFAULT,
            max_array_elements: DEFAULT_MAX_ARRAY_ELEMENTS,
        }
    }
}

/// Everything both sides of a call must agree on.
#[derive(Clone, Copy, Debug)]
pub struct ComposerOptions<'a> {
    /// Structure of the root object.
    pub schema: &'a Schema,
    /// Field name ids.
    pub name_ids: &'a NameIds,
    /// Wire switches.
    pub options: CodecOptions,
}

impl<'a> ComposerOptions<'a> {
    /// Options with default wire switches.
    pub fn new(schema: &'a Schema, name_ids: &'a NameIds) -> Self {
        Self::with_options(schema, name_ids, CodecOptions::default())
    }

    /// Options with explicit wire switches.
    pub const fn with_options(
        schema: &'a Schema,
        name_ids: &'a NameIds,
        options: CodecOptions,
    ) -> Self {
        Self {
            schema,
            name_ids,
            options,
        }
    }

    /// Same schema and names, different byte order.
    pub const fn little_endian(mut self, little_endian: bool) -> Self {
        self.options.little_endian = little_endian;
        self
    }

    /// Same schema and names, different element limit for decoding.
    pub const fn max_array_elements(mut self, max_array_elements: u32) -> Self {
        self.options.max_array_elements = max_array_elements;
        self
    }

    /// Same schema and names, header byte switched on or off.
    pub const fn use_header_byte(mut self, use_header_byte: bool) -> Self {
        self.options.use_header_byte = use_header_byte;
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::storage::IntWidth;

    #[test]
    fn options_fill_defaults_from_partial_json() {
        let opts: CodecOptions = serde_json::from_str(r#"{ "littleEndian": false }"#).unwrap();
        assert!(!opts.little_endian);
        assert!(opts.use_header_byte);
        assert_eq!(opts.widths, Widths::WIRE_DEFAULT);
        assert_eq!(opts.max_array_elements, DEFAULT_MAX_ARRAY_ELEMENTS);

        let opts: CodecOptions = serde_json::from_str(
            r#"{ "useHeaderByte": false, "widths": { "refId": "u16" }, "maxArrayElements": 8 }"#,
        )
        .unwrap();
        assert!(!opts.use_header_byte);
        assert_eq!(opts.widths.ref_id, IntWidth::U16);
        assert_eq!(opts.widths.array_length, IntWidth::U8);
        assert_eq!(opts.max_array_elements, 8);
    }
}
