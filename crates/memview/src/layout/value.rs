//! Runtime values and the leaf encode/decode logic shared by local buffers
//! and remote views.

use encoding_rs::{SHIFT_JIS, UTF_8};

use crate::error::{Error, Result};
use crate::layout::instance::{ArrayRef, PointerRef, StructRef};
use crate::layout::ty::{EnumType, Scalar};

/// Text encoding for char-like arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    ShiftJis,
}

/// What to do with malformed byte sequences while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidText {
    /// Replace malformed sequences with U+FFFD.
    #[default]
    Lossy,
    /// Fail the access with [`Error::InvalidValue`].
    Strict,
}

/// Decode policy for nul-terminated char arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextCodec {
    pub encoding: TextEncoding,
    pub on_invalid: InvalidText,
}

impl TextCodec {
    pub const fn new(encoding: TextEncoding, on_invalid: InvalidText) -> Self {
        TextCodec {
            encoding,
            on_invalid,
        }
    }

    pub fn shift_jis() -> Self {
        TextCodec::new(TextEncoding::ShiftJis, InvalidText::Lossy)
    }

    /// Decode up to the first nul byte.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let enc = match self.encoding {
            TextEncoding::Utf8 => UTF_8,
            TextEncoding::ShiftJis => SHIFT_JIS,
        };
        let (decoded, _, had_errors) = enc.decode(&bytes[..len]);
        if had_errors && self.on_invalid == InvalidText::Strict {
            return Err(Error::InvalidValue(format!(
                "malformed {:?} text",
                self.encoding
            )));
        }
        Ok(decoded.into_owned())
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let enc = match self.encoding {
            TextEncoding::Utf8 => UTF_8,
            TextEncoding::ShiftJis => SHIFT_JIS,
        };
        let (encoded, _, had_errors) = enc.encode(text);
        if had_errors && self.on_invalid == InvalidText::Strict {
            return Err(Error::InvalidValue(format!(
                "text not representable in {:?}",
                self.encoding
            )));
        }
        Ok(encoded.into_owned())
    }
}

/// An enum field's value: the raw backing number plus its symbolic name when
/// one is mapped. Unmapped values pass through with `name == None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub raw: i64,
    pub name: Option<String>,
}

impl EnumValue {
    pub fn is(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

/// A value read from, or written into, a structure field.
///
/// Leaf variants are owned; `Struct` and `Array` are live borrowed views over
/// the underlying bytes.
#[derive(Debug)]
pub enum Value<'a> {
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Struct(StructRef<'a>),
    Array(ArrayRef<'a>),
    Pointer(PointerRef),
}

impl Value<'_> {
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Value::UInt(v) => Ok(*v),
            Value::Int(v) => Ok(*v as u64),
            Value::Pointer(p) => Ok(p.address()),
            other => Err(Error::InvalidValue(format!(
                "expected integer, got {}",
                other.kind()
            ))),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::UInt(v) => Ok(*v as i64),
            Value::Int(v) => Ok(*v),
            Value::Enum(e) => Ok(e.raw),
            other => Err(Error::InvalidValue(format!(
                "expected integer, got {}",
                other.kind()
            ))),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::UInt(v) => Ok(*v as f64),
            Value::Int(v) => Ok(*v as f64),
            other => Err(Error::InvalidValue(format!(
                "expected float, got {}",
                other.kind()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(Error::InvalidValue(format!(
                "expected string, got {}",
                other.kind()
            ))),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::UInt(_) => "uint",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Pointer(_) => "pointer",
        }
    }
}

/// Decode a scalar from little-endian bytes. `bytes` must be exactly the
/// scalar's size.
pub(crate) fn decode_scalar(scalar: Scalar, bytes: &[u8]) -> Value<'static> {
    debug_assert_eq!(bytes.len(), scalar.size());
    match scalar {
        Scalar::U8 | Scalar::Char => Value::UInt(bytes[0] as u64),
        Scalar::I8 => Value::Int(bytes[0] as i8 as i64),
        Scalar::U16 => Value::UInt(u16::from_le_bytes([bytes[0], bytes[1]]) as u64),
        Scalar::I16 => Value::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
        Scalar::U32 => {
            Value::UInt(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64)
        }
        Scalar::I32 => {
            Value::Int(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
        }
        Scalar::U64 => Value::UInt(u64::from_le_bytes(eight(bytes))),
        Scalar::I64 => Value::Int(i64::from_le_bytes(eight(bytes))),
        Scalar::F32 => {
            Value::Float(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64)
        }
        Scalar::F64 => Value::Float(f64::from_le_bytes(eight(bytes))),
    }
}

fn eight(bytes: &[u8]) -> [u8; 8] {
    [
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]
}

/// Encode a value into a scalar span, little-endian. Integer values wrap on
/// truncation, matching raw memory semantics.
pub(crate) fn encode_scalar(scalar: Scalar, value: &Value<'_>, out: &mut [u8]) -> Result<()> {
    debug_assert_eq!(out.len(), scalar.size());
    match scalar {
        Scalar::U8 | Scalar::Char => out[0] = value.as_u64()? as u8,
        Scalar::I8 => out[0] = value.as_i64()? as u8,
        Scalar::U16 => out.copy_from_slice(&(value.as_u64()? as u16).to_le_bytes()),
        Scalar::I16 => out.copy_from_slice(&(value.as_i64()? as i16).to_le_bytes()),
        Scalar::U32 => out.copy_from_slice(&(value.as_u64()? as u32).to_le_bytes()),
        Scalar::I32 => out.copy_from_slice(&(value.as_i64()? as i32).to_le_bytes()),
        Scalar::U64 => out.copy_from_slice(&value.as_u64()?.to_le_bytes()),
        Scalar::I64 => out.copy_from_slice(&value.as_i64()?.to_le_bytes()),
        Scalar::F32 => out.copy_from_slice(&(value.as_f64()? as f32).to_le_bytes()),
        Scalar::F64 => out.copy_from_slice(&value.as_f64()?.to_le_bytes()),
    }
    Ok(())
}

/// Read `width` bits starting at `bit_offset` from a single byte.
pub(crate) fn read_bits(byte: u8, bit_offset: u8, width: u8) -> u64 {
    let mask = bit_mask(width);
    ((byte as u64) >> bit_offset) & mask
}

/// Read-modify-write of `width` bits inside a single byte.
pub(crate) fn write_bits(byte: u8, bit_offset: u8, width: u8, value: u64) -> u8 {
    let mask = bit_mask(width);
    let cleared = (byte as u64) & !(mask << bit_offset);
    (cleared | ((value & mask) << bit_offset)) as u8
}

fn bit_mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Decode an enum field from its backing scalar span.
pub(crate) fn decode_enum(ty: &EnumType, bytes: &[u8]) -> Result<EnumValue> {
    let raw = decode_scalar(ty.backing(), bytes).as_i64()?;
    Ok(EnumValue {
        raw,
        name: ty.name_of(raw).map(str::to_owned),
    })
}

/// Resolve an enum set-value (symbolic name or raw number) to its backing
/// number.
pub(crate) fn enum_raw_for(ty: &EnumType, value: &Value<'_>) -> Result<i64> {
    match value {
        Value::Str(name) => ty.value_of(name).ok_or_else(|| {
            Error::InvalidValue(format!("enum {} has no variant '{}'", ty.name(), name))
        }),
        other => other.as_i64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip_i32() {
        let mut buf = [0u8; 4];
        encode_scalar(Scalar::I32, &Value::Int(-1234), &mut buf).unwrap();
        assert_eq!(decode_scalar(Scalar::I32, &buf).as_i64().unwrap(), -1234);
    }

    #[test]
    fn test_scalar_truncation_wraps() {
        let mut buf = [0u8; 1];
        encode_scalar(Scalar::U8, &Value::UInt(0x1FF), &mut buf).unwrap();
        assert_eq!(buf[0], 0xFF);
    }

    #[test]
    fn test_bits_read_write() {
        let byte = write_bits(0b0000_0000, 2, 3, 0b101);
        assert_eq!(byte, 0b0001_0100);
        assert_eq!(read_bits(byte, 2, 3), 0b101);
        // Neighboring bits untouched.
        let byte = write_bits(0b1111_1111, 2, 3, 0);
        assert_eq!(byte, 0b1110_0011);
    }

    #[test]
    fn test_codec_decodes_to_nul() {
        let codec = TextCodec::default();
        let s = codec.decode(b"abc\0def").unwrap();
        assert_eq!(s, "abc");
    }

    #[test]
    fn test_codec_strict_rejects_bad_utf8() {
        let codec = TextCodec::new(TextEncoding::Utf8, InvalidText::Strict);
        assert!(codec.decode(&[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn test_codec_shift_jis() {
        // "ハロ" in Shift-JIS
        let codec = TextCodec::shift_jis();
        let s = codec.decode(&[0x83, 0x6E, 0x83, 0x8D, 0x00]).unwrap();
        assert_eq!(s, "ハロ");
    }
}
