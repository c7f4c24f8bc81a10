//! LSB-first bit reader for the VP8L lossless bitstream.

use super::api::DecodeError;

/// Reads bits least-significant first from a byte slice.
///
/// Up to 64 bits are buffered. [`BitReader::fill`] tops the buffer up;
/// [`BitReader::consume`] fails once the buffered bits run out, which is how a
/// truncated stream surfaces.
#[derive(Debug, Clone)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    nbits: u8,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            nbits: 0,
        }
    }

    /// Pulls bytes into the buffer until it holds more than 56 bits or the input ends.
    #[inline]
    pub(crate) fn fill(&mut self) {
        while self.nbits <= 56 {
            let Some(&byte) = self.data.get(self.pos) else {
                break;
            };
            self.buffer |= u64::from(byte) << self.nbits;
            self.nbits += 8;
            self.pos += 1;
        }
    }

    /// Number of bits currently buffered.
    #[inline]
    pub(crate) fn nbits(&self) -> u8 {
        self.nbits
    }

    /// The low `num` buffered bits, without consuming them.
    #[inline]
    pub(crate) fn peek(&self, num: u8) -> u64 {
        debug_assert!(num < 64);
        self.buffer & ((1u64 << num) - 1)
    }

    /// The whole buffer, without consuming anything.
    #[inline]
    pub(crate) fn peek_full(&self) -> u64 {
        self.buffer
    }

    #[inline]
    pub(crate) fn consume(&mut self, num: u8) -> Result<(), DecodeError> {
        if self.nbits < num {
            return Err(DecodeError::BitStreamError);
        }
        self.buffer >>= num;
        self.nbits -= num;
        Ok(())
    }

    /// Reads an unsigned value of `num` bits (at most 32).
    #[inline]
    pub(crate) fn read_bits<T: TryFrom<u32>>(&mut self, num: u8) -> Result<T, DecodeError> {
        debug_assert!(num <= 32);
        if self.nbits < num {
            self.fill();
        }
        let value = self.peek(num) as u32;
        self.consume(num)?;
        T::try_from(value).map_err(|_| DecodeError::BitStreamError)
    }

    #[inline]
    pub(crate) fn read_flag(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_bits::<u8>(1)? == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_lsb_first() {
        // 0b1010_1100, 0b0000_0011
        let mut reader = BitReader::new(&[0xAC, 0x03]);
        assert_eq!(reader.read_bits::<u8>(2).unwrap(), 0b00);
        assert_eq!(reader.read_bits::<u8>(3).unwrap(), 0b011);
        assert!(reader.read_flag().unwrap());
        assert_eq!(reader.read_bits::<u16>(4).unwrap(), 0b1110);
        assert_eq!(reader.read_bits::<u8>(6).unwrap(), 0);
    }

    #[test]
    fn test_reads_across_refills() {
        let data: [u8; 12] = [0xFF; 12];
        let mut reader = BitReader::new(&data);
        for _ in 0..3 {
            assert_eq!(reader.read_bits::<u32>(32).unwrap(), u32::MAX);
        }
        assert!(reader.read_bits::<u8>(1).is_err());
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let mut reader = BitReader::new(&[0x01]);
        assert!(reader.read_bits::<u16>(9).is_err());

        let mut reader = BitReader::new(&[]);
        reader.fill();
        assert_eq!(reader.nbits(), 0);
        assert!(matches!(reader.consume(1), Err(DecodeError::BitStreamError)));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut reader = BitReader::new(&[0b0110_1001]);
        reader.fill();
        assert_eq!(reader.peek(4), 0b1001);
        assert_eq!(reader.peek_full() & 0xFF, 0b0110_1001);
        reader.consume(4).unwrap();
        assert_eq!(reader.peek(4), 0b0110);
    }
}
