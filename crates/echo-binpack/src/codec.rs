// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Low-level value codec: one storage-typed value at a time.
//!
//! [`Writer`] and [`Reader`] own byte order and the length prefixes of
//! variable-length types. Everything structural lives above this layer.

use uuid::Uuid;

use crate::error::CodecError;
use crate::header::Widths;
use crate::storage::{IntWidth, StorageType};
use crate::value::Value;

/// Append-only byte sink with a fixed byte order.
#[derive(Debug)]
pub struct Writer {
    buf: Vec<u8>,
    little_endian: bool,
}

macro_rules! put_scalar {
    ($self:ident, $value:expr) => {{
        let v = $value;
        if $self.little_endian {
            $self.buf.extend_from_slice(&v.to_le_bytes());
        } else {
            $self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }};
}

impl Writer {
    /// Create a writer.
    pub fn new(little_endian: bool) -> Self {
        Self {
            buf: Vec::new(),
            little_endian,
        }
    }

    /// Create a writer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize, little_endian: bool) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            little_endian,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write an unsigned integer at `width`.
    ///
    /// `what` names the quantity for the overflow error.
    #[allow(clippy::cast_possible_truncation)] // Range-checked against the width first
    pub fn write_uint(
        &mut self,
        width: IntWidth,
        value: u64,
        what: &'static str,
    ) -> Result<(), CodecError> {
        if value > width.max_value() {
            return Err(CodecError::WidthOverflow { what, value, width });
        }
        match width {
            IntWidth::Null => {}
            IntWidth::U8 => self.write_u8(value as u8),
            IntWidth::U16 => put_scalar!(self, value as u16),
            IntWidth::U32 => put_scalar!(self, value as u32),
        }
        Ok(())
    }

    /// Write a length-prefixed payload.
    fn write_prefixed(
        &mut self,
        width: IntWidth,
        bytes: &[u8],
        what: &'static str,
    ) -> Result<(), CodecError> {
        self.write_uint(width, bytes.len() as u64, what)?;
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write one leaf value that has already been coerced to `ty`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )] // Values are range-checked during coercion
    pub fn write_leaf(
        &mut self,
        ty: StorageType,
        value: &Value,
        widths: &Widths,
    ) -> Result<(), CodecError> {
        match (ty, value) {
            (StorageType::Null, _) => {}
            (StorageType::Int8, Value::Int(v)) => self.write_u8(*v as i8 as u8),
            (StorageType::Int16, Value::Int(v)) => put_scalar!(self, *v as i16),
            (StorageType::Int32, Value::Int(v)) => put_scalar!(self, *v as i32),
            (StorageType::Uint8, Value::Int(v)) => self.write_u8(*v as u8),
            (StorageType::Uint16, Value::Int(v)) => put_scalar!(self, *v as u16),
            (StorageType::Uint32, Value::Int(v)) => put_scalar!(self, *v as u32),
            (StorageType::Float32, Value::Float(v)) => put_scalar!(self, *v as f32),
            (StorageType::Float64, Value::Float(v)) => put_scalar!(self, *v),
            (StorageType::Bool, Value::Bool(v)) => self.write_u8(u8::from(*v)),
            (StorageType::Uuid | StorageType::AssetUuid, Value::Uuid(u)) => {
                self.write_bytes(u.as_bytes());
            }
            (StorageType::Uuid | StorageType::AssetUuid, Value::Null) => {
                self.write_bytes(Uuid::nil().as_bytes());
            }
            (StorageType::String, Value::String(s)) => {
                self.write_prefixed(widths.string_length, s.as_bytes(), "string length")?;
            }
            (StorageType::ArrayBuffer, Value::Bytes(b)) => {
                self.write_prefixed(widths.array_buffer_length, b, "array buffer length")?;
            }
            (ty, value) => {
                return Err(CodecError::TypeMismatch {
                    path: String::from("<leaf>"),
                    expected: ty.to_string(),
                    found: value.kind_name(),
                });
            }
        }
        Ok(())
    }

    /// Consume the writer and return the buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a byte slice with a fixed byte order.
#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    little_endian: bool,
}

macro_rules! get_scalar {
    ($self:ident, $ty:ty) => {{
        const N: usize = core::mem::size_of::<$ty>();
        let chunk = $self.take(N)?;
        let mut raw = [0u8; N];
        raw.copy_from_slice(chunk);
        if $self.little_endian {
            <$ty>::from_le_bytes(raw)
        } else {
            <$ty>::from_be_bytes(raw)
        }
    }};
}

impl<'a> Reader<'a> {
    /// Create a reader over `bytes`.
    pub fn new(bytes: &'a [u8], little_endian: bool) -> Self {
        Self {
            bytes,
            offset: 0,
            little_endian,
        }
    }

    /// Current read offset.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let eof = || CodecError::UnexpectedEof {
            offset: self.offset,
            needed: len,
        };
        let end = self.offset.checked_add(len).ok_or_else(eof)?;
        let out = self.bytes.get(self.offset..end).ok_or_else(eof)?;
        self.offset = end;
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Read an unsigned integer at `width`. A [`IntWidth::Null`] width reads nothing and yields `0`.
    pub fn read_uint(&mut self, width: IntWidth) -> Result<u64, CodecError> {
        Ok(match width {
            IntWidth::Null => 0,
            IntWidth::U8 => u64::from(self.read_u8()?),
            IntWidth::U16 => u64::from(get_scalar!(self, u16)),
            IntWidth::U32 => u64::from(get_scalar!(self, u32)),
        })
    }

    fn read_len(&mut self, width: IntWidth) -> Result<usize, CodecError> {
        let len = self.read_uint(width)?;
        usize::try_from(len).map_err(|_| CodecError::UnexpectedEof {
            offset: self.offset,
            needed: usize::MAX,
        })
    }

    /// Read one leaf value of type `ty`.
    ///
    /// An all-zero UUID reads back as [`Value::Null`].
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_leaf(&mut self, ty: StorageType, widths: &Widths) -> Result<Value, CodecError> {
        Ok(match ty {
            StorageType::Int8 => Value::Int(i64::from(self.read_u8()? as i8)),
            StorageType::Int16 => Value::Int(i64::from(get_scalar!(self, i16))),
            StorageType::Int32 => Value::Int(i64::from(get_scalar!(self, i32))),
            StorageType::Uint8 => Value::Int(i64::from(self.read_u8()?)),
            StorageType::Uint16 => Value::Int(i64::from(get_scalar!(self, u16))),
            StorageType::Uint32 => Value::Int(i64::from(get_scalar!(self, u32))),
            StorageType::Float32 => Value::Float(f64::from(get_scalar!(self, f32))),
            StorageType::Float64 => Value::Float(get_scalar!(self, f64)),
            StorageType::Bool => Value::Bool(self.read_u8()? != 0),
            StorageType::Uuid | StorageType::AssetUuid => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(self.take(16)?);
                let uuid = Uuid::from_bytes(raw);
                if uuid.is_nil() {
                    Value::Null
                } else {
                    Value::Uuid(uuid)
                }
            }
            StorageType::String => {
                let len = self.read_len(widths.string_length)?;
                let offset = self.offset;
                let bytes = self.take(len)?;
                let s = core::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { offset })?;
                Value::String(s.to_owned())
            }
            StorageType::ArrayBuffer => {
                let len = self.read_len(widths.array_buffer_length)?;
                Value::Bytes(self.take(len)?.to_vec())
            }
            StorageType::Null | StorageType::Array | StorageType::Object | StorageType::UnionArray => {
                Value::Null
            }
        })
    }
}
