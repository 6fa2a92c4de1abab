//! Client-side copy of one contiguous range of remote memory
//!
//! A [`MemoryBuffer`] is filled by a single remote read and then answers
//! every scalar and byte query locally, so one evaluation pass sees one
//! consistent snapshot. Nothing invalidates it behind the caller's back:
//! [`MemoryBuffer::reload`] is the only way its bytes change to match the
//! target again.

use crate::core::types::{Address, MemoryError, MemoryResult};
use crate::process::ProcessHandle;
use std::ops::Range;
use tracing::debug;

/// Fixed-size little-endian value stored in a buffer
pub trait Scalar: Copy + Send + Sync + 'static {
    const SIZE: usize;

    /// Decodes from exactly `SIZE` bytes
    fn from_le(bytes: &[u8]) -> Self;

    /// Encodes into exactly `SIZE` bytes
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Bytes of `[address, address + len)` as read at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBuffer {
    address: Address,
    bytes: Vec<u8>,
    pointer_size: usize,
}

impl MemoryBuffer {
    /// Wraps bytes that were obtained elsewhere
    pub fn from_bytes(address: Address, bytes: Vec<u8>, pointer_size: usize) -> Self {
        MemoryBuffer {
            address,
            bytes,
            pointer_size,
        }
    }

    /// A zero-filled buffer that has not been read yet
    pub fn zeroed(address: Address, size: usize, pointer_size: usize) -> Self {
        Self::from_bytes(address, vec![0; size], pointer_size)
    }

    /// Reads `size` bytes at `address` with one remote call
    pub fn load(handle: &ProcessHandle, address: Address, size: usize) -> MemoryResult<Self> {
        let bytes = handle.read_bytes(address, size)?;
        debug!("Loaded {} bytes at {}", size, address);
        Ok(Self::from_bytes(address, bytes, handle.pointer_size()))
    }

    /// Re-reads the same range. The old bytes stay in place if the read fails.
    pub fn reload(&mut self, handle: &ProcessHandle) -> MemoryResult<()> {
        self.replace(handle, self.address, self.bytes.len())
    }

    /// Re-reads with a new size. The old contents survive a failed read.
    pub fn resize(&mut self, handle: &ProcessHandle, size: usize) -> MemoryResult<()> {
        self.replace(handle, self.address, size)
    }

    fn replace(&mut self, handle: &ProcessHandle, address: Address, size: usize) -> MemoryResult<()> {
        let bytes = handle.read_bytes(address, size)?;
        self.address = address;
        self.bytes = bytes;
        self.pointer_size = handle.pointer_size();
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether `[address, address + size)` lies inside the buffer
    pub fn covers(&self, address: Address, size: usize) -> bool {
        self.offset_of(address)
            .map(|offset| self.range(offset, size).is_ok())
            .unwrap_or(false)
    }

    /// Offset of a remote address inside the buffer
    pub fn offset_of(&self, address: Address) -> Option<usize> {
        address
            .distance_from(self.address)
            .map(|d| d as usize)
            .filter(|&d| d <= self.bytes.len())
    }

    fn range(&self, offset: usize, size: usize) -> MemoryResult<Range<usize>> {
        offset
            .checked_add(size)
            .filter(|&end| end <= self.bytes.len())
            .map(|end| offset..end)
            .ok_or_else(|| MemoryError::out_of_bounds(offset, size, self.bytes.len()))
    }

    pub fn read_scalar<T: Scalar>(&self, offset: usize) -> MemoryResult<T> {
        let range = self.range(offset, T::SIZE)?;
        Ok(T::from_le(&self.bytes[range]))
    }

    /// Updates the cached copy only
    pub fn write_scalar<T: Scalar>(&mut self, offset: usize, value: T) -> MemoryResult<()> {
        let range = self.range(offset, T::SIZE)?;
        value.write_le(&mut self.bytes[range]);
        Ok(())
    }

    pub fn read_bytes(&self, offset: usize, size: usize) -> MemoryResult<&[u8]> {
        let range = self.range(offset, size)?;
        Ok(&self.bytes[range])
    }

    /// Updates the cached copy only
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> MemoryResult<()> {
        let range = self.range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Reads a target-width pointer
    pub fn read_pointer(&self, offset: usize) -> MemoryResult<Address> {
        let raw = match self.pointer_size {
            4 => self.read_scalar::<u32>(offset)? as u64,
            _ => self.read_scalar::<u64>(offset)?,
        };
        Ok(Address::new(raw))
    }

    /// Writes `data` to the target at `offset`, then mirrors it locally.
    ///
    /// Nothing changes locally if the bounds check or the remote write fails.
    pub fn commit(&mut self, handle: &ProcessHandle, offset: usize, data: &[u8]) -> MemoryResult<()> {
        let range = self.range(offset, data.len())?;
        handle.write(self.address + offset, data)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProcessArchitecture;
    use crate::memory::regions::{Protection, RegionType};
    use crate::process::{AccessMode, SnapshotBackend};

    fn target() -> (SnapshotBackend, ProcessHandle) {
        let image = SnapshotBackend::new(ProcessArchitecture::X64);
        image
            .map(
                Address::new(0x1000),
                (0u8..64).collect(),
                Protection::READ_WRITE,
                RegionType::Private,
            )
            .unwrap();
        let handle =
            ProcessHandle::from_backends(7, Box::new(image.clone()), None, AccessMode::Native);
        (image, handle)
    }

    #[test]
    fn test_load_and_read_scalars() {
        let (_, handle) = target();
        let buffer = MemoryBuffer::load(&handle, Address::new(0x1000), 16).unwrap();

        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.read_scalar::<u8>(3).unwrap(), 3);
        assert_eq!(buffer.read_scalar::<u16>(0).unwrap(), 0x0100);
        assert_eq!(buffer.read_scalar::<u32>(4).unwrap(), 0x0706_0504);
        assert_eq!(buffer.read_pointer(8).unwrap(), Address::new(0x0F0E_0D0C_0B0A_0908));
    }

    #[test]
    fn test_scalar_bounds() {
        let (_, handle) = target();
        let mut buffer = MemoryBuffer::load(&handle, Address::new(0x1000), 8).unwrap();
        let before = buffer.clone();

        assert!(matches!(
            buffer.read_scalar::<u32>(5),
            Err(MemoryError::OutOfBounds { .. })
        ));
        assert!(buffer.write_scalar::<u64>(1, 0).is_err());
        assert!(buffer.write_bytes(usize::MAX, &[1]).is_err());
        assert_eq!(buffer, before);

        assert!(buffer.read_scalar::<u32>(4).is_ok());
    }

    #[test]
    fn test_local_writes_do_not_touch_target() {
        let (image, handle) = target();
        let mut buffer = MemoryBuffer::load(&handle, Address::new(0x1000), 8).unwrap();

        buffer.write_scalar::<i16>(0, -2).unwrap();
        assert_eq!(buffer.read_scalar::<i16>(0).unwrap(), -2);
        assert_eq!(image.peek(Address::new(0x1000), 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_commit_writes_through() {
        let (image, handle) = target();
        let mut buffer = MemoryBuffer::load(&handle, Address::new(0x1000), 8).unwrap();

        buffer.commit(&handle, 2, &[0xAA, 0xBB]).unwrap();
        assert_eq!(buffer.read_bytes(2, 2).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(image.peek(Address::new(0x1002), 2).unwrap(), vec![0xAA, 0xBB]);

        assert!(buffer.commit(&handle, 7, &[1, 2]).is_err());
        assert_eq!(image.peek(Address::new(0x1007), 1).unwrap(), vec![7]);
    }

    #[test]
    fn test_reload_keeps_old_bytes_on_failure() {
        let (image, handle) = target();
        let mut buffer = MemoryBuffer::load(&handle, Address::new(0x1000), 4).unwrap();

        image.poke(Address::new(0x1000), &[9]).unwrap();
        assert_eq!(buffer.read_scalar::<u8>(0).unwrap(), 0);
        buffer.reload(&handle).unwrap();
        assert_eq!(buffer.read_scalar::<u8>(0).unwrap(), 9);

        // Growing past the end of the mapping fails and changes nothing.
        assert!(buffer.resize(&handle, 0x100).is_err());
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.read_scalar::<u8>(0).unwrap(), 9);

        buffer.resize(&handle, 32).unwrap();
        assert_eq!(buffer.len(), 32);
    }

    #[test]
    fn test_covers_and_offset_of() {
        let buffer = MemoryBuffer::zeroed(Address::new(0x2000), 0x10, 8);
        assert!(buffer.covers(Address::new(0x2000), 0x10));
        assert!(buffer.covers(Address::new(0x2008), 8));
        assert!(!buffer.covers(Address::new(0x2008), 9));
        assert!(!buffer.covers(Address::new(0x1FFF), 1));
        assert_eq!(buffer.offset_of(Address::new(0x2004)), Some(4));
    }

    #[test]
    fn test_float_scalars() {
        let mut buffer = MemoryBuffer::zeroed(Address::null(), 12, 4);
        buffer.write_scalar(0, 1.5f32).unwrap();
        buffer.write_scalar(4, -0.25f64).unwrap();
        assert_eq!(buffer.read_scalar::<f32>(0).unwrap(), 1.5);
        assert_eq!(buffer.read_scalar::<f64>(4).unwrap(), -0.25);
        assert_eq!(buffer.read_pointer(0).unwrap(), Address::new(0x3FC0_0000));
    }
}
