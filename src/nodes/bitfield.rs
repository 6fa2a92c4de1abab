//! Bit-level fields packed into a few bytes

use crate::core::types::{MemoryError, MemoryResult};
use serde::Serialize;
use tracing::warn;

/// Named run of bits inside a [`BitField`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitMember {
    pub name: String,
    /// Position of the lowest bit, counted from bit 0 of the first byte
    pub shift: u32,
    pub width: u32,
}

impl BitMember {
    fn mask(&self) -> u64 {
        mask(self.width) << self.shift
    }
}

/// A field of 1 to 64 bits that occupies `ceil(bits / 8)` bytes.
///
/// Reads and writes go through masks, so bits beyond `bits` in the last
/// byte and bits owned by other members are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitField {
    bits: u32,
    members: Vec<BitMember>,
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl BitField {
    pub fn new(bits: u32) -> MemoryResult<Self> {
        check_bits(bits)?;
        Ok(BitField {
            bits,
            members: Vec::new(),
        })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Bytes occupied, bits rounded up
    pub fn size(&self) -> usize {
        self.bits.div_ceil(8) as usize
    }

    pub fn members(&self) -> &[BitMember] {
        &self.members
    }

    /// Adds a named run of bits. It must lie inside the field.
    pub fn add_member(&mut self, name: impl Into<String>, shift: u32, width: u32) -> MemoryResult<()> {
        let name = name.into();
        if width == 0 || shift.checked_add(width).map_or(true, |end| end > self.bits) {
            return Err(MemoryError::InvalidNode(format!(
                "member {} ({} bits at {}) does not fit in {} bits",
                name, width, shift, self.bits
            )));
        }
        self.members.push(BitMember { name, shift, width });
        Ok(())
    }

    /// Changes the width; members that no longer fit are dropped.
    pub(crate) fn set_bits(&mut self, bits: u32) -> MemoryResult<()> {
        check_bits(bits)?;
        self.bits = bits;
        self.members.retain(|member| {
            let fits = member.shift + member.width <= bits;
            if !fits {
                warn!("Dropping bit member {} outside {} bits", member.name, bits);
            }
            fits
        });
        Ok(())
    }

    /// The field's value from its little-endian bytes
    pub fn extract(&self, bytes: &[u8]) -> MemoryResult<u64> {
        Ok(self.raw(bytes)? & mask(self.bits))
    }

    /// One member's value
    pub fn extract_member(&self, bytes: &[u8], index: usize) -> MemoryResult<u64> {
        let member = self.member(index)?;
        Ok((self.raw(bytes)? >> member.shift) & mask(member.width))
    }

    /// New bytes with the whole field set to `value`, bits past `bits` kept
    pub fn insert(&self, bytes: &[u8], value: u64) -> MemoryResult<Vec<u8>> {
        self.merge(bytes, mask(self.bits), value)
    }

    /// New bytes with one member set to `value`, every other bit kept
    pub fn insert_member(&self, bytes: &[u8], index: usize, value: u64) -> MemoryResult<Vec<u8>> {
        let member = self.member(index)?;
        if value > mask(member.width) {
            return Err(MemoryError::parse_error(
                value.to_string(),
                format!("does not fit in {} bits", member.width),
            ));
        }
        self.merge(bytes, member.mask(), value << member.shift)
    }

    /// Byte range `(offset, len)` covered by a member, relative to the field
    pub fn member_span(&self, index: usize) -> MemoryResult<(usize, usize)> {
        let member = self.member(index)?;
        let first = (member.shift / 8) as usize;
        let last = ((member.shift + member.width - 1) / 8) as usize;
        Ok((first, last - first + 1))
    }

    fn member(&self, index: usize) -> MemoryResult<&BitMember> {
        self.members
            .get(index)
            .ok_or_else(|| MemoryError::InvalidNode(format!("no bit member #{}", index)))
    }

    fn raw(&self, bytes: &[u8]) -> MemoryResult<u64> {
        let size = self.size();
        let bytes = bytes
            .get(..size)
            .ok_or_else(|| MemoryError::out_of_bounds(0, size, bytes.len()))?;
        let mut raw = [0u8; 8];
        raw[..size].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn merge(&self, bytes: &[u8], field_mask: u64, value: u64) -> MemoryResult<Vec<u8>> {
        if value & !field_mask != 0 {
            return Err(MemoryError::parse_error(
                format!("{:#x}", value),
                format!("does not fit in {} bits", self.bits),
            ));
        }
        let merged = (self.raw(bytes)? & !field_mask) | value;
        Ok(merged.to_le_bytes()[..self.size()].to_vec())
    }
}

fn check_bits(bits: u32) -> MemoryResult<()> {
    if (1..=64).contains(&bits) {
        Ok(())
    } else {
        Err(MemoryError::InvalidNode(format!(
            "bit field width {} outside 1..=64",
            bits
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_rounds_up() {
        assert_eq!(BitField::new(1).unwrap().size(), 1);
        assert_eq!(BitField::new(8).unwrap().size(), 1);
        assert_eq!(BitField::new(9).unwrap().size(), 2);
        assert_eq!(BitField::new(64).unwrap().size(), 8);
        assert!(BitField::new(0).is_err());
        assert!(BitField::new(65).is_err());
    }

    #[test]
    fn test_member_write_keeps_neighbours() {
        let mut field = BitField::new(12).unwrap();
        field.add_member("low", 0, 3).unwrap();
        field.add_member("mid", 3, 6).unwrap();
        field.add_member("high", 9, 3).unwrap();

        let bytes = [0xFF, 0xFF];
        let updated = field.insert_member(&bytes, 1, 0).unwrap();
        assert_eq!(field.extract_member(&updated, 0).unwrap(), 0b111);
        assert_eq!(field.extract_member(&updated, 1).unwrap(), 0);
        assert_eq!(field.extract_member(&updated, 2).unwrap(), 0b111);
        // Bits 12..16 lie outside the field and keep their value.
        assert_eq!(updated[1] & 0xF0, 0xF0);
    }

    #[test]
    fn test_whole_field_write_masks() {
        let field = BitField::new(4).unwrap();
        let updated = field.insert(&[0xA0], 0x5).unwrap();
        assert_eq!(updated, vec![0xA5]);
        assert_eq!(field.extract(&updated).unwrap(), 0x5);
        assert!(field.insert(&[0], 0x10).is_err());
    }

    #[test]
    fn test_member_bounds() {
        let mut field = BitField::new(8).unwrap();
        assert!(field.add_member("x", 6, 3).is_err());
        assert!(field.add_member("x", 0, 0).is_err());
        field.add_member("flag", 7, 1).unwrap();
        assert!(field.insert_member(&[0], 0, 2).is_err());
        assert_eq!(field.member_span(0).unwrap(), (0, 1));
    }

    #[test]
    fn test_shrinking_drops_members() {
        let mut field = BitField::new(16).unwrap();
        field.add_member("a", 0, 4).unwrap();
        field.add_member("b", 10, 4).unwrap();
        field.set_bits(8).unwrap();
        assert_eq!(field.members().len(), 1);
        assert_eq!(field.size(), 1);
    }

    #[test]
    fn test_short_input() {
        let field = BitField::new(16).unwrap();
        assert!(matches!(
            field.extract(&[1]),
            Err(MemoryError::OutOfBounds { .. })
        ));
    }
}
