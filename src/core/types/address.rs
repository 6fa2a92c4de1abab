//! Target-process address type with hex parsing and wrapping arithmetic

use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// An address in the target process.
///
/// Always 64 bits wide so one type covers both 32- and 64-bit targets.
/// Ordering is unsigned; offsets applied through [`Address::offset`] are
/// signed and wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl Address {
    pub const fn new(value: u64) -> Self {
        Address(value)
    }

    pub const fn null() -> Self {
        Address(0)
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Rounds up to the next multiple of `alignment` (0 leaves it as is)
    pub const fn align_up(&self, alignment: u64) -> Self {
        if alignment == 0 || self.0 % alignment == 0 {
            return *self;
        }
        Address(self.0.wrapping_add(alignment - self.0 % alignment))
    }

    /// Applies a signed offset, wrapping on overflow
    pub const fn offset(&self, offset: i64) -> Self {
        Address(self.0.wrapping_add(offset as u64))
    }

    /// Adds an unsigned size, returning `None` on overflow
    pub fn checked_add(&self, size: u64) -> Option<Self> {
        self.0.checked_add(size).map(Address)
    }

    /// Distance from `base` to `self`, if `self >= base`
    pub fn distance_from(&self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    /// Truncates the address to the given pointer width in bytes
    pub const fn truncate(&self, pointer_size: usize) -> Self {
        if pointer_size >= 8 {
            *self
        } else {
            Address(self.0 & ((1u64 << (pointer_size * 8)) - 1))
        }
    }

    /// Returns the raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for Address {
    type Output = Address;

    fn add(self, rhs: u64) -> Address {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Add<usize> for Address {
    type Output = Address;

    fn add(self, rhs: usize) -> Address {
        Address(self.0.wrapping_add(rhs as u64))
    }
}

impl Sub<u64> for Address {
    type Output = Address;

    fn sub(self, rhs: u64) -> Address {
        Address(self.0.wrapping_sub(rhs))
    }
}

/// Parses a number the way the editing surface accepts it: `0x`/`0X`/`$`
/// prefixed text is hex, anything containing hex letters is hex, plain
/// digits are decimal.
pub fn parse_u64(s: &str) -> MemoryResult<u64> {
    let s = s.trim();

    let value = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(rest, 16)
    } else if let Some(rest) = s.strip_prefix('$') {
        u64::from_str_radix(rest, 16)
    } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
        u64::from_str_radix(s, 16)
    } else {
        s.parse::<u64>()
    };

    value.map_err(|_| MemoryError::InvalidAddress(s.to_string()))
}

impl FromStr for Address {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_u64(s).map(Address::new)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Address::new(value as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_prefixes_and_bare_hex() {
        let cases = [
            ("0x7FF6A000", 0x7FF6_A000),
            ("0XBEEF", 0xBEEF),
            ("$400000", 0x40_0000),
            ("cafe", 0xCAFE),
            ("1c", 0x1C),
            ("256", 256),
        ];
        for (text, expected) in cases {
            assert_eq!(text.parse::<Address>().unwrap(), Address::new(expected), "{}", text);
        }
        assert!("0x".parse::<Address>().is_err());
        assert!("12g4".parse::<Address>().is_err());
    }

    #[test]
    fn test_arithmetic_wraps() {
        let top = Address::new(u64::MAX - 1);
        assert_eq!(top + 3u64, Address::new(1));
        assert_eq!(Address::null() - 1u64, Address::new(u64::MAX));
        assert_eq!(Address::new(0x40).offset(-0x50), Address::new(u64::MAX - 0xF));
        assert_eq!(top.checked_add(2), None);
        assert_eq!(Address::new(0x2010).distance_from(Address::new(0x2000)), Some(0x10));
        assert_eq!(Address::new(0x1FFF).distance_from(Address::new(0x2000)), None);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(Address::new(0x7003).align_up(8), Address::new(0x7008));
        assert_eq!(Address::new(0x7008).align_up(8), Address::new(0x7008));
        assert_eq!(Address::new(0x7003).align_up(0), Address::new(0x7003));
    }

    #[test]
    fn test_kernel_half_sorts_high() {
        let mut addresses = vec![
            Address::new(0xFFFF_8000_0000_0000),
            Address::new(0x1000),
            Address::new(0x7FFF_FFFF_0000),
        ];
        addresses.sort();
        assert_eq!(addresses[0], Address::new(0x1000));
        assert_eq!(addresses[2], Address::new(0xFFFF_8000_0000_0000));
    }

    #[test]
    fn test_truncate_to_pointer_width() {
        let wide = Address::new(0x0000_7FF6_DEAD_0010);
        assert_eq!(wide.truncate(4), Address::new(0xDEAD_0010));
        assert_eq!(wide.truncate(8), wide);
    }

    #[test]
    fn test_formatting_is_zero_padded() {
        let addr = Address::new(0x7FF6_1234);
        assert_eq!(addr.to_string(), "0x000000007FF61234");
        assert_eq!(format!("{:x}", addr), "0x000000007ff61234");
        assert_eq!(serde_json::to_string(&addr).unwrap(), "2146832948");
    }
}
