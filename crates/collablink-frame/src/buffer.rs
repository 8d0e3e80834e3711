use crate::error::{FrameError, Result};

/// Hard cap on a single buffer allocation: 80 MiB.
pub const MAX_BUFFER_CAPACITY: usize = 80 * 1024 * 1024;

/// An owned, fixed-capacity byte buffer with an addressable sub-range.
///
/// This is the unit of currency between the session layer and its
/// collaborators: payloads are narrowed with [`DataBuffer::set_range`]
/// instead of being copied. The capacity is fixed at construction — callers
/// that outgrow a buffer allocate a new one.
#[derive(Debug)]
pub struct DataBuffer {
    data: Box<[u8]>,
    range_offset: usize,
    range_length: usize,
}

impl DataBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    ///
    /// The visible range initially covers the whole capacity. Fails for a
    /// zero capacity or one above [`MAX_BUFFER_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_BUFFER_CAPACITY {
            return Err(FrameError::InvalidCapacity {
                capacity,
                max: MAX_BUFFER_CAPACITY,
            });
        }
        Ok(Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            range_offset: 0,
            range_length: capacity,
        })
    }

    /// Build a buffer holding a copy of `bytes`, range covering all of it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = Self::new(bytes.len())?;
        buf.data.copy_from_slice(bytes);
        Ok(buf)
    }

    /// Length of the visible range.
    pub fn size(&self) -> usize {
        self.range_length
    }

    /// Start of the visible range within the allocation.
    pub fn offset(&self) -> usize {
        self.range_offset
    }

    /// Total allocated capacity.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Narrow (or move) the visible range.
    ///
    /// Fails unless `offset + size <= capacity`.
    pub fn set_range(&mut self, offset: usize, size: usize) -> Result<()> {
        let within = offset
            .checked_add(size)
            .is_some_and(|end| end <= self.data.len());
        if !within {
            return Err(FrameError::RangeOutOfBounds {
                offset,
                size,
                capacity: self.data.len(),
            });
        }
        self.range_offset = offset;
        self.range_length = size;
        Ok(())
    }

    /// The visible range as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range_offset..self.range_offset + self.range_length]
    }

    /// The visible range as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.range_offset..self.range_offset + self.range_length]
    }
}
