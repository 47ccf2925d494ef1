//! Local instances and live views over plain byte buffers.
//!
//! A [`StructInstance`] owns a buffer of exactly the layout's size;
//! [`StructRef`] / [`StructMut`] are live borrowed views used for nested
//! access. No copies are taken on nested navigation.

use crate::error::{Error, Result};
use crate::layout::field::Field;
use crate::layout::ty::{Scalar, TypeDesc};
use crate::layout::value::{
    decode_enum, decode_scalar, encode_scalar, enum_raw_for, read_bits, write_bits, Value,
};
use crate::layout::StructType;

/// An owned, fixed-size instance of a finalized layout.
#[derive(Debug, Clone)]
pub struct StructInstance {
    ty: StructType,
    buf: Vec<u8>,
}

impl StructInstance {
    /// Zero-initialized instance.
    pub fn new(ty: &StructType) -> Self {
        StructInstance {
            ty: ty.clone(),
            buf: vec![0; ty.size()],
        }
    }

    /// Adopt an existing buffer. The buffer must be exactly the layout size.
    pub fn from_bytes(ty: &StructType, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != ty.size() {
            return Err(Error::InvalidValue(format!(
                "buffer of {} bytes for {} (size {})",
                bytes.len(),
                ty.name(),
                ty.size()
            )));
        }
        Ok(StructInstance {
            ty: ty.clone(),
            buf: bytes,
        })
    }

    pub fn ty(&self) -> &StructType {
        &self.ty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_ref(&self) -> StructRef<'_> {
        StructRef {
            ty: self.ty.clone(),
            bytes: &self.buf,
        }
    }

    pub fn as_mut(&mut self) -> StructMut<'_> {
        StructMut {
            ty: self.ty.clone(),
            bytes: &mut self.buf,
        }
    }

    pub fn get(&self, field: &str) -> Result<Value<'_>> {
        self.as_ref().into_get(field)
    }

    pub fn set(&mut self, field: &str, value: Value<'_>) -> Result<()> {
        self.as_mut().set(field, value)
    }
}

/// Read-only live view over a structure's bytes.
#[derive(Debug)]
pub struct StructRef<'a> {
    pub(crate) ty: StructType,
    pub(crate) bytes: &'a [u8],
}

impl<'a> StructRef<'a> {
    pub fn ty(&self) -> &StructType {
        &self.ty
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn get(&self, field: &str) -> Result<Value<'_>> {
        let field = self.ty.field(field)?;
        get_field(field, self.bytes)
    }

    /// Like [`get`](Self::get) but keeps the full view lifetime, so nested
    /// views may outlive this handle.
    pub fn into_get(self, field: &str) -> Result<Value<'a>> {
        let field = self.ty.field(field)?;
        get_field(field, self.bytes)
    }
}

/// Mutable live view over a structure's bytes.
#[derive(Debug)]
pub struct StructMut<'a> {
    pub(crate) ty: StructType,
    pub(crate) bytes: &'a mut [u8],
}

impl StructMut<'_> {
    pub fn ty(&self) -> &StructType {
        &self.ty
    }

    pub fn get(&self, field: &str) -> Result<Value<'_>> {
        let field = self.ty.field(field)?;
        get_field(field, self.bytes)
    }

    pub fn set(&mut self, field: &str, value: Value<'_>) -> Result<()> {
        let field = self.ty.field(field)?.clone();
        set_field(&field, self.bytes, value)
    }
}

/// Indexable live view over a fixed array field.
#[derive(Debug)]
pub struct ArrayRef<'a> {
    elem: TypeDesc,
    elem_size: usize,
    len: usize,
    bytes: &'a [u8],
}

impl<'a> ArrayRef<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elem(&self) -> &TypeDesc {
        &self.elem
    }

    pub fn at(&self, index: usize) -> Result<Value<'a>> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        let span = &self.bytes[index * self.elem_size..(index + 1) * self.elem_size];
        element_value(&self.elem, span)
    }
}

/// A pointer field's value: the slot's address plus lazy element addressing.
///
/// Holds no borrow of the source buffer; dereferencing is the remote layer's
/// job, this side only does the address arithmetic.
#[derive(Debug, Clone)]
pub struct PointerRef {
    address: u64,
    elem: TypeDesc,
}

impl PointerRef {
    pub(crate) fn new(address: u64, elem: TypeDesc) -> Self {
        PointerRef { address, elem }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    pub fn elem(&self) -> &TypeDesc {
        &self.elem
    }

    /// `address + index * sizeof(elem)`, computed on demand.
    pub fn element_address(&self, index: usize) -> Result<u64> {
        if self.address == 0 {
            return Err(Error::NullPointerDeref);
        }
        let elem_size = self.elem.resolve_deep()?.layout_size()?;
        Ok(self.address + (index as u64) * (elem_size as u64))
    }
}

pub(crate) fn get_field<'a>(field: &Field, bytes: &'a [u8]) -> Result<Value<'a>> {
    let off = field.offset;
    match field.ty() {
        TypeDesc::Scalar(s) => Ok(decode_scalar(*s, &bytes[off..off + s.size()])),
        TypeDesc::Bits { bit_offset, width } => {
            Ok(Value::UInt(read_bits(bytes[off], *bit_offset, *width)))
        }
        TypeDesc::Enum(e) => {
            let span = &bytes[off..off + e.backing().size()];
            Ok(Value::Enum(decode_enum(e, span)?))
        }
        TypeDesc::Struct(st) => Ok(Value::Struct(StructRef {
            ty: st.clone(),
            bytes: &bytes[off..off + st.size()],
        })),
        TypeDesc::Array { elem, len } => {
            let elem_size = elem.layout_size()?;
            let span = &bytes[off..off + elem_size * len];
            if let TypeDesc::Scalar(s) = **elem
                && s.is_char_like()
            {
                return Ok(Value::Str(field.codec().decode(span)?));
            }
            Ok(Value::Array(ArrayRef {
                elem: (**elem).clone(),
                elem_size,
                len: *len,
                bytes: span,
            }))
        }
        TypeDesc::Pointer(elem) => {
            let addr = decode_scalar(Scalar::U64, &bytes[off..off + 8]).as_u64()?;
            Ok(Value::Pointer(PointerRef::new(addr, (**elem).clone())))
        }
        TypeDesc::Deferred(d) => Err(Error::UnlinkedType(d.name().to_string())),
    }
}

pub(crate) fn set_field(field: &Field, bytes: &mut [u8], value: Value<'_>) -> Result<()> {
    let off = field.offset;
    match field.ty() {
        TypeDesc::Scalar(s) => encode_scalar(*s, &value, &mut bytes[off..off + s.size()]),
        TypeDesc::Bits { bit_offset, width } => {
            bytes[off] = write_bits(bytes[off], *bit_offset, *width, value.as_u64()?);
            Ok(())
        }
        TypeDesc::Enum(e) => {
            let raw = enum_raw_for(e, &value)?;
            let backing = e.backing();
            encode_scalar(
                backing,
                &Value::Int(raw),
                &mut bytes[off..off + backing.size()],
            )
        }
        TypeDesc::Struct(st) => {
            let Value::Struct(src) = value else {
                return Err(Error::ReadOnlyViolation(format!(
                    "nested struct '{}' only accepts assignment from a live view",
                    field.name()
                )));
            };
            if src.bytes.len() != st.size() {
                return Err(Error::ReadOnlyViolation(format!(
                    "nested struct assignment size mismatch: {} into {}",
                    src.bytes.len(),
                    st.size()
                )));
            }
            bytes[off..off + st.size()].copy_from_slice(src.bytes);
            Ok(())
        }
        TypeDesc::Array { elem, len } => {
            let elem_size = elem.layout_size()?;
            let span_len = elem_size * len;
            let data = match value {
                Value::Str(s) => field.codec().encode(&s)?,
                Value::Bytes(b) => b,
                other => {
                    return Err(Error::InvalidValue(format!(
                        "array field '{}' takes str or bytes, got {}",
                        field.name(),
                        other.kind()
                    )));
                }
            };
            if data.len() > span_len {
                return Err(Error::InvalidValue(format!(
                    "{} bytes into array field '{}' of {} bytes",
                    data.len(),
                    field.name(),
                    span_len
                )));
            }
            // Left-aligned; trailing bytes stay untouched.
            bytes[off..off + data.len()].copy_from_slice(&data);
            Ok(())
        }
        TypeDesc::Pointer(_) => {
            let addr = value.as_u64()?;
            bytes[off..off + 8].copy_from_slice(&addr.to_le_bytes());
            Ok(())
        }
        TypeDesc::Deferred(d) => Err(Error::UnlinkedType(d.name().to_string())),
    }
}

fn element_value<'a>(elem: &TypeDesc, span: &'a [u8]) -> Result<Value<'a>> {
    match elem {
        TypeDesc::Scalar(s) => Ok(decode_scalar(*s, span)),
        TypeDesc::Enum(e) => Ok(Value::Enum(decode_enum(e, span)?)),
        TypeDesc::Struct(st) => Ok(Value::Struct(StructRef {
            ty: st.clone(),
            bytes: span,
        })),
        TypeDesc::Array { elem, len } => {
            let elem_size = elem.layout_size()?;
            Ok(Value::Array(ArrayRef {
                elem: (**elem).clone(),
                elem_size,
                len: *len,
                bytes: span,
            }))
        }
        TypeDesc::Pointer(elem) => {
            let addr = decode_scalar(Scalar::U64, span).as_u64()?;
            Ok(Value::Pointer(PointerRef::new(addr, (**elem).clone())))
        }
        TypeDesc::Bits { bit_offset, width } => {
            Ok(Value::UInt(read_bits(span[0], *bit_offset, *width)))
        }
        TypeDesc::Deferred(d) => Err(Error::UnlinkedType(d.name().to_string())),
    }
}
