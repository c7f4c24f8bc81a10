//! Position-tracking reads over a byte slice, used for the RIFF container
//! and the VP8 frame header.
//!
//! Every read is bounds checked; running off the end of the slice is a
//! [`DecodeError::BitStreamError`].

use byteorder_lite::{ByteOrder, LittleEndian};
use core::fmt;

use crate::DecodeError;

/// A cursor over a byte slice. Reads advance the position.
#[derive(Clone)]
pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The whole underlying slice, independent of the position.
    #[inline]
    pub(crate) fn get_ref(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub(crate) fn stream_position(&self) -> u64 {
        self.pos as u64
    }

    /// The bytes from the current position to the end.
    #[inline]
    pub(crate) fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    #[inline]
    pub(crate) fn seek_from_start(&mut self, pos: u64) -> Result<u64, DecodeError> {
        let pos = usize::try_from(pos).map_err(|_| DecodeError::BitStreamError)?;
        if pos > self.data.len() {
            return Err(DecodeError::BitStreamError);
        }
        self.pos = pos;
        Ok(self.pos as u64)
    }

    /// Borrows the next `n` bytes without copying.
    #[inline]
    pub(crate) fn take_slice(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::BitStreamError)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    #[inline]
    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        buf.copy_from_slice(self.take_slice(buf.len())?);
        Ok(())
    }

    #[inline]
    pub(crate) fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(LittleEndian::read_u16(self.take_slice(2)?))
    }

    #[inline]
    pub(crate) fn read_u24_le(&mut self) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u24(self.take_slice(3)?))
    }

    #[inline]
    pub(crate) fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u32(self.take_slice(4)?))
    }
}

impl fmt::Debug for SliceReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceReader")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .finish()
    }
}
