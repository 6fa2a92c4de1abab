//! Reading typed values out of a buffer and writing edited text back

use super::kind::NodeKind;
use super::layout::SubField;
use crate::core::types::{Address, MemoryError, MemoryResult, MemoryValue, ValueType};
use crate::memory::MemoryBuffer;
use crate::process::ProcessHandle;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Interpreted contents of a leaf node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeValue {
    /// Raw bits shown as hex, with the width in bytes
    Hex { value: u64, width: usize },
    Signed(i64),
    Unsigned(u64),
    Bool(bool),
    Float(f32),
    Double(f64),
    /// Vector and matrix components in memory order
    Floats(Vec<f32>),
    Text(String),
    Pointer(Address),
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Hex { value, width } => write!(f, "{:0w$X}", value, w = width * 2),
            NodeValue::Signed(v) => write!(f, "{}", v),
            NodeValue::Unsigned(v) => write!(f, "{}", v),
            NodeValue::Bool(v) => write!(f, "{}", v),
            NodeValue::Float(v) => write!(f, "{:.3}", v),
            NodeValue::Double(v) => write!(f, "{:.3}", v),
            NodeValue::Floats(values) => {
                let parts: Vec<String> = values.iter().map(|v| format!("{:.3}", v)).collect();
                write!(f, "({})", parts.join(", "))
            }
            NodeValue::Text(text) => write!(f, "{:?}", text),
            NodeValue::Pointer(address) => write!(f, "{}", address),
        }
    }
}

/// Reads the value of a node stored at `offset` in `buffer`.
///
/// Returns `None` for kinds whose contents are other nodes (embedded
/// classes and arrays). Pointer-like kinds yield the pointer itself; what
/// it points to is left to the evaluator.
pub fn read_value(
    kind: &NodeKind,
    buffer: &MemoryBuffer,
    offset: usize,
    pointer_size: usize,
) -> MemoryResult<Option<NodeValue>> {
    let value = match kind {
        NodeKind::Hex8 => hex(buffer.read_scalar::<u8>(offset)? as u64, 1),
        NodeKind::Hex16 => hex(buffer.read_scalar::<u16>(offset)? as u64, 2),
        NodeKind::Hex32 => hex(buffer.read_scalar::<u32>(offset)? as u64, 4),
        NodeKind::Hex64 => hex(buffer.read_scalar::<u64>(offset)?, 8),
        NodeKind::Int8 => NodeValue::Signed(buffer.read_scalar::<i8>(offset)? as i64),
        NodeKind::Int16 => NodeValue::Signed(buffer.read_scalar::<i16>(offset)? as i64),
        NodeKind::Int32 => NodeValue::Signed(buffer.read_scalar::<i32>(offset)? as i64),
        NodeKind::Int64 => NodeValue::Signed(buffer.read_scalar::<i64>(offset)?),
        NodeKind::UInt8 => NodeValue::Unsigned(buffer.read_scalar::<u8>(offset)? as u64),
        NodeKind::UInt16 => NodeValue::Unsigned(buffer.read_scalar::<u16>(offset)? as u64),
        NodeKind::UInt32 => NodeValue::Unsigned(buffer.read_scalar::<u32>(offset)? as u64),
        NodeKind::UInt64 => NodeValue::Unsigned(buffer.read_scalar::<u64>(offset)?),
        NodeKind::Bool => NodeValue::Bool(buffer.read_scalar::<u8>(offset)? != 0),
        NodeKind::Float => NodeValue::Float(buffer.read_scalar::<f32>(offset)?),
        NodeKind::Double => NodeValue::Double(buffer.read_scalar::<f64>(offset)?),
        NodeKind::Vector2
        | NodeKind::Vector3
        | NodeKind::Vector4
        | NodeKind::Matrix3x3
        | NodeKind::Matrix3x4
        | NodeKind::Matrix4x4 => {
            let values = (0..kind.float_count())
                .map(|i| buffer.read_scalar::<f32>(offset + i * 4))
                .collect::<MemoryResult<Vec<_>>>()?;
            NodeValue::Floats(values)
        }
        NodeKind::Utf8Text { length } => {
            NodeValue::Text(decode_utf8(buffer.read_bytes(offset, *length)?))
        }
        NodeKind::Utf16Text { length } => {
            NodeValue::Text(decode_utf16(buffer.read_bytes(offset, length.saturating_mul(2))?))
        }
        NodeKind::BitField(field) => {
            let bytes = buffer.read_bytes(offset, field.size())?;
            hex(field.extract(bytes)?, field.size())
        }
        NodeKind::Utf8TextPtr
        | NodeKind::Utf16TextPtr
        | NodeKind::Pointer
        | NodeKind::FunctionPtr
        | NodeKind::ClassPtr { .. }
        | NodeKind::VTable { .. } => NodeValue::Pointer(pointer_at(buffer, offset, pointer_size)?),
        NodeKind::ClassInstance { .. }
        | NodeKind::ClassPtrArray { .. }
        | NodeKind::ClassInstanceArray { .. } => return Ok(None),
    };
    Ok(Some(value))
}

/// Reads a pointer of the given width
pub(crate) fn pointer_at(
    buffer: &MemoryBuffer,
    offset: usize,
    pointer_size: usize,
) -> MemoryResult<Address> {
    let raw = match pointer_size {
        4 => buffer.read_scalar::<u32>(offset)? as u64,
        _ => buffer.read_scalar::<u64>(offset)?,
    };
    Ok(Address::new(raw))
}

/// Text up to the first NUL, invalid sequences replaced
pub(crate) fn decode_utf8(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

pub(crate) fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn hex(value: u64, width: usize) -> NodeValue {
    NodeValue::Hex { value, width }
}

/// Bytes to store for an edited field, and where they go relative to the
/// node's offset.
///
/// Validates the text against the field's grammar without touching
/// anything: integers take decimal or `0x` hex (hex gives the raw bits and
/// must fit the width), hex and pointer kinds read bare text as hex,
/// floats take decimal only, and bools take `true`, `false`, `1` or `0`.
pub fn encode_text(
    kind: &NodeKind,
    field: SubField,
    text: &str,
    buffer: &MemoryBuffer,
    offset: usize,
    pointer_size: usize,
) -> MemoryResult<(usize, Vec<u8>)> {
    let text = text.trim();

    let bytes = match (kind, field) {
        (NodeKind::Hex8, SubField::Value) => bare_hex(text, 1)?,
        (NodeKind::Hex16, SubField::Value) => bare_hex(text, 2)?,
        (NodeKind::Hex32, SubField::Value) => bare_hex(text, 4)?,
        (NodeKind::Hex64, SubField::Value) => bare_hex(text, 8)?,
        (NodeKind::Int8, SubField::Value) => number(text, ValueType::I8)?,
        (NodeKind::Int16, SubField::Value) => number(text, ValueType::I16)?,
        (NodeKind::Int32, SubField::Value) => number(text, ValueType::I32)?,
        (NodeKind::Int64, SubField::Value) => number(text, ValueType::I64)?,
        (NodeKind::UInt8, SubField::Value) => number(text, ValueType::U8)?,
        (NodeKind::UInt16, SubField::Value) => number(text, ValueType::U16)?,
        (NodeKind::UInt32, SubField::Value) => number(text, ValueType::U32)?,
        (NodeKind::UInt64, SubField::Value) => number(text, ValueType::U64)?,
        (NodeKind::Bool, SubField::Value) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => vec![1],
            "false" | "0" => vec![0],
            _ => return Err(MemoryError::parse_error(text, "expected true, false, 1 or 0")),
        },
        (NodeKind::Float, SubField::Value) => decimal_f32(text)?.to_le_bytes().to_vec(),
        (NodeKind::Double, SubField::Value) => {
            reject_hex(text)?;
            let value: f64 = text
                .parse()
                .map_err(|_| MemoryError::parse_error(text, "expected a decimal number"))?;
            if !value.is_finite() {
                return Err(MemoryError::parse_error(text, "value is not a finite double"));
            }
            value.to_le_bytes().to_vec()
        }
        (_, SubField::Component(index)) if index < kind.float_count() => {
            return Ok((index * 4, decimal_f32(text)?.to_le_bytes().to_vec()));
        }
        (_, SubField::Value) if kind.float_count() > 0 => {
            let parts: Vec<&str> = text
                .trim_start_matches('(')
                .trim_end_matches(')')
                .split(',')
                .collect();
            if parts.len() != kind.float_count() {
                return Err(MemoryError::parse_error(
                    text,
                    format!("expected {} comma-separated values", kind.float_count()),
                ));
            }
            let mut bytes = Vec::with_capacity(parts.len() * 4);
            for part in parts {
                bytes.extend_from_slice(&decimal_f32(part.trim())?.to_le_bytes());
            }
            bytes
        }
        (NodeKind::Utf8Text { length }, SubField::Value) => {
            pad_text(text, text.as_bytes().to_vec(), *length)?
        }
        (NodeKind::Utf16Text { length }, SubField::Value) => {
            let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
            pad_text(text, bytes, length.saturating_mul(2))?
        }
        (
            NodeKind::Pointer
            | NodeKind::FunctionPtr
            | NodeKind::Utf8TextPtr
            | NodeKind::Utf16TextPtr
            | NodeKind::ClassPtr { .. }
            | NodeKind::VTable { .. },
            SubField::Value,
        ) => bare_hex(text, pointer_size)?,
        (NodeKind::ClassPtrArray { count, .. }, SubField::Element(index)) if index < *count => {
            return Ok((index * pointer_size, bare_hex(text, pointer_size)?));
        }
        (NodeKind::BitField(bits), SubField::Value) => {
            let current = buffer.read_bytes(offset, bits.size())?;
            bits.insert(current, parse_integer(text)?)
                .map_err(|_| MemoryError::parse_error(text, format!("does not fit in {} bits", bits.bits())))?
        }
        (NodeKind::BitField(bits), SubField::Member(index)) => {
            let current = buffer.read_bytes(offset, bits.size())?;
            bits.insert_member(current, index, parse_integer(text)?)
                .map_err(|e| match e {
                    MemoryError::InvalidNode(reason) => MemoryError::InvalidNode(reason),
                    _ => MemoryError::parse_error(text, "value does not fit the member"),
                })?
        }
        (kind, field) => {
            return Err(MemoryError::InvalidNode(format!(
                "{:?} of {} is not editable as text",
                field,
                kind.type_name()
            )))
        }
    };

    Ok((0, bytes))
}

/// Parses `text` for a field and writes it through to the target.
///
/// On a parse error nothing is written and the buffer keeps its bytes.
pub fn write_value_text(
    kind: &NodeKind,
    field: SubField,
    text: &str,
    buffer: &mut MemoryBuffer,
    offset: usize,
    handle: &ProcessHandle,
) -> MemoryResult<()> {
    let pointer_size = handle.pointer_size();
    let (relative, bytes) = match encode_text(kind, field, text, buffer, offset, pointer_size) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!("Rejected edit of {} to {:?}: {}", kind.type_name(), text, err);
            return Err(err);
        }
    };

    buffer.commit(handle, offset + relative, &bytes)?;
    debug!(
        "Wrote {} bytes for {} at {}",
        bytes.len(),
        kind.type_name(),
        buffer.address() + (offset + relative)
    );
    Ok(())
}

fn number(text: &str, value_type: ValueType) -> MemoryResult<Vec<u8>> {
    Ok(MemoryValue::parse(text, value_type)?.to_bytes())
}

fn reject_hex(text: &str) -> MemoryResult<()> {
    if text.starts_with("0x") || text.starts_with("0X") {
        return Err(MemoryError::parse_error(text, "floating point fields take decimal input"));
    }
    Ok(())
}

/// Finite `f32`; out-of-range input such as `1e40` is rejected, not saturated
fn decimal_f32(text: &str) -> MemoryResult<f32> {
    reject_hex(text)?;
    let value: f32 = text
        .parse()
        .map_err(|_| MemoryError::parse_error(text, "expected a decimal number"))?;
    if !value.is_finite() {
        return Err(MemoryError::parse_error(text, "value is not a finite float"));
    }
    Ok(value)
}

/// Decimal or `0x` hex, unsigned
fn parse_integer(text: &str) -> MemoryResult<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => text.parse::<u64>(),
    }
    .map_err(|_| MemoryError::parse_error(text, "expected a decimal or 0x-prefixed number"))
}

/// Hex with an optional `0x` prefix, fitting in `width` bytes
fn bare_hex(text: &str, width: usize) -> MemoryResult<Vec<u8>> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let value = u64::from_str_radix(digits, 16)
        .map_err(|_| MemoryError::parse_error(text, "expected a hexadecimal number"))?;
    if width < 8 && value >> (width * 8) != 0 {
        return Err(MemoryError::parse_error(
            text,
            format!("does not fit in {} bytes", width),
        ));
    }
    Ok(value.to_le_bytes()[..width.min(8)].to_vec())
}

fn pad_text(text: &str, mut bytes: Vec<u8>, capacity: usize) -> MemoryResult<Vec<u8>> {
    if bytes.len() > capacity {
        return Err(MemoryError::parse_error(
            text,
            format!("longer than the {}-byte field", capacity),
        ));
    }
    bytes.resize(capacity, 0);
    Ok(bytes)
}
