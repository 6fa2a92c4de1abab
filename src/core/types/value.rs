//! Typed memory values used by the scanner and the CLI

use super::address::parse_u64;
use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scan target or a value read back from the process, little-endian on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MemoryValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    String(String),
    WideString(String),
}

macro_rules! decode_le {
    ($bytes:expr, $ty:ty, $variant:ident) => {{
        const N: usize = std::mem::size_of::<$ty>();
        $bytes
            .get(..N)
            .and_then(|b| <[u8; N]>::try_from(b).ok())
            .map(|b| MemoryValue::$variant(<$ty>::from_le_bytes(b)))
    }};
}

impl MemoryValue {
    /// Encoded length in bytes
    pub fn size(&self) -> usize {
        match self {
            MemoryValue::I8(_) | MemoryValue::U8(_) => 1,
            MemoryValue::I16(_) | MemoryValue::U16(_) => 2,
            MemoryValue::I32(_) | MemoryValue::U32(_) | MemoryValue::F32(_) => 4,
            MemoryValue::I64(_) | MemoryValue::U64(_) | MemoryValue::F64(_) => 8,
            MemoryValue::Bytes(b) => b.len(),
            MemoryValue::String(s) => s.len(),
            MemoryValue::WideString(s) => s.encode_utf16().count() * 2,
        }
    }

    /// Converts the value to little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MemoryValue::I8(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I16(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U8(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U16(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::F32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::F64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::Bytes(b) => b.clone(),
            MemoryValue::String(s) => s.as_bytes().to_vec(),
            MemoryValue::WideString(s) => s.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    /// Creates a value from bytes based on the specified type.
    ///
    /// Variable-length types consume the whole slice.
    pub fn from_bytes(bytes: &[u8], value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::I8 => decode_le!(bytes, i8, I8),
            ValueType::I16 => decode_le!(bytes, i16, I16),
            ValueType::I32 => decode_le!(bytes, i32, I32),
            ValueType::I64 => decode_le!(bytes, i64, I64),
            ValueType::U8 => decode_le!(bytes, u8, U8),
            ValueType::U16 => decode_le!(bytes, u16, U16),
            ValueType::U32 => decode_le!(bytes, u32, U32),
            ValueType::U64 => decode_le!(bytes, u64, U64),
            ValueType::F32 => decode_le!(bytes, f32, F32),
            ValueType::F64 => decode_le!(bytes, f64, F64),
            ValueType::Bytes => Some(MemoryValue::Bytes(bytes.to_vec())),
            ValueType::String => String::from_utf8(bytes.to_vec())
                .ok()
                .map(MemoryValue::String),
            ValueType::WideString => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).ok().map(MemoryValue::WideString)
            }
        }
    }

    /// Parses user text into a value of the given type.
    ///
    /// Integers accept decimal or `0x` hex; byte arrays accept hex pairs
    /// separated by whitespace.
    pub fn parse(text: &str, value_type: ValueType) -> MemoryResult<Self> {
        let text = text.trim();
        let bad = |reason: &str| MemoryError::parse_error(text, reason);

        macro_rules! int {
            ($ty:ty, $variant:ident) => {{
                let is_hex = text.starts_with("0x") || text.starts_with("0X");
                if is_hex {
                    let raw = parse_u64(text).map_err(|_| bad("invalid hex number"))?;
                    let bits = std::mem::size_of::<$ty>() * 8;
                    if bits < 64 && raw >> bits != 0 {
                        return Err(bad("value out of range"));
                    }
                    Ok(MemoryValue::$variant(raw as $ty))
                } else {
                    text.parse::<$ty>()
                        .map(MemoryValue::$variant)
                        .map_err(|e| bad(&e.to_string()))
                }
            }};
        }

        match value_type {
            ValueType::I8 => int!(i8, I8),
            ValueType::I16 => int!(i16, I16),
            ValueType::I32 => int!(i32, I32),
            ValueType::I64 => int!(i64, I64),
            ValueType::U8 => int!(u8, U8),
            ValueType::U16 => int!(u16, U16),
            ValueType::U32 => int!(u32, U32),
            ValueType::U64 => int!(u64, U64),
            ValueType::F32 => text
                .parse::<f32>()
                .map(MemoryValue::F32)
                .map_err(|e| bad(&e.to_string())),
            ValueType::F64 => text
                .parse::<f64>()
                .map(MemoryValue::F64)
                .map_err(|e| bad(&e.to_string())),
            ValueType::Bytes => {
                let compact: String = text.split_whitespace().collect();
                let bytes = hex::decode(compact).map_err(|e| bad(&e.to_string()))?;
                if bytes.is_empty() {
                    return Err(bad("empty byte pattern"));
                }
                Ok(MemoryValue::Bytes(bytes))
            }
            ValueType::String => Ok(MemoryValue::String(text.to_string())),
            ValueType::WideString => Ok(MemoryValue::WideString(text.to_string())),
        }
    }

    /// Numeric view used for ordered comparisons
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MemoryValue::I8(v) => Some(*v as f64),
            MemoryValue::I16(v) => Some(*v as f64),
            MemoryValue::I32(v) => Some(*v as f64),
            MemoryValue::I64(v) => Some(*v as f64),
            MemoryValue::U8(v) => Some(*v as f64),
            MemoryValue::U16(v) => Some(*v as f64),
            MemoryValue::U32(v) => Some(*v as f64),
            MemoryValue::U64(v) => Some(*v as f64),
            MemoryValue::F32(v) => Some(*v as f64),
            MemoryValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Exact integer view, `None` for floats and variable-length values
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            MemoryValue::I8(v) => Some(*v as i128),
            MemoryValue::I16(v) => Some(*v as i128),
            MemoryValue::I32(v) => Some(*v as i128),
            MemoryValue::I64(v) => Some(*v as i128),
            MemoryValue::U8(v) => Some(*v as i128),
            MemoryValue::U16(v) => Some(*v as i128),
            MemoryValue::U32(v) => Some(*v as i128),
            MemoryValue::U64(v) => Some(*v as i128),
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            MemoryValue::I8(_) => ValueType::I8,
            MemoryValue::I16(_) => ValueType::I16,
            MemoryValue::I32(_) => ValueType::I32,
            MemoryValue::I64(_) => ValueType::I64,
            MemoryValue::U8(_) => ValueType::U8,
            MemoryValue::U16(_) => ValueType::U16,
            MemoryValue::U32(_) => ValueType::U32,
            MemoryValue::U64(_) => ValueType::U64,
            MemoryValue::F32(_) => ValueType::F32,
            MemoryValue::F64(_) => ValueType::F64,
            MemoryValue::Bytes(_) => ValueType::Bytes,
            MemoryValue::String(_) => ValueType::String,
            MemoryValue::WideString(_) => ValueType::WideString,
        }
    }
}

/// Type tag for [`MemoryValue`], as named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bytes,
    String,
    WideString,
}

impl ValueType {
    /// Fixed width in bytes, `None` for variable-length types
    pub fn size(&self) -> Option<usize> {
        match self {
            ValueType::I8 | ValueType::U8 => Some(1),
            ValueType::I16 | ValueType::U16 => Some(2),
            ValueType::I32 | ValueType::U32 | ValueType::F32 => Some(4),
            ValueType::I64 | ValueType::U64 | ValueType::F64 => Some(8),
            ValueType::Bytes | ValueType::String | ValueType::WideString => None,
        }
    }

    /// True for fixed-width numeric types
    pub fn is_numeric(&self) -> bool {
        self.size().is_some()
    }
}

impl std::str::FromStr for ValueType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "i8" => ValueType::I8,
            "i16" => ValueType::I16,
            "i32" => ValueType::I32,
            "i64" => ValueType::I64,
            "u8" => ValueType::U8,
            "u16" => ValueType::U16,
            "u32" => ValueType::U32,
            "u64" => ValueType::U64,
            "f32" | "float" => ValueType::F32,
            "f64" | "double" => ValueType::F64,
            "bytes" => ValueType::Bytes,
            "string" | "utf8" => ValueType::String,
            "widestring" | "utf16" => ValueType::WideString,
            other => return Err(MemoryError::parse_error(other, "unknown value type")),
        })
    }
}

impl fmt::Display for MemoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryValue::I8(v) => write!(f, "{}", v),
            MemoryValue::I16(v) => write!(f, "{}", v),
            MemoryValue::I32(v) => write!(f, "{}", v),
            MemoryValue::I64(v) => write!(f, "{}", v),
            MemoryValue::U8(v) => write!(f, "{}", v),
            MemoryValue::U16(v) => write!(f, "{}", v),
            MemoryValue::U32(v) => write!(f, "{}", v),
            MemoryValue::U64(v) => write!(f, "{}", v),
            MemoryValue::F32(v) => write!(f, "{}", v),
            MemoryValue::F64(v) => write!(f, "{}", v),
            MemoryValue::Bytes(b) => write!(f, "{}", hex::encode_upper(b)),
            MemoryValue::String(s) | MemoryValue::WideString(s) => write!(f, "\"{}\"", s),
        }
    }
}
