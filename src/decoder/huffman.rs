//! Canonical Huffman decoding tables for the VP8L lossless format.
//!
//! Codes of up to [`PRIMARY_TABLE_BITS`] bits resolve with a single lookup.
//! Longer codes store the subtable offset in the primary entry and finish in
//! the secondary table.

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodeError;
use super::bit_reader::BitReader;

const MAX_ALLOWED_CODE_LENGTH: usize = 15;
const PRIMARY_TABLE_BITS: u8 = 10;
const MAX_SECONDARY_TABLE_SIZE: usize = 4096;

/// A table slot: the code length plus either a symbol or a subtable offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct HuffmanEntry {
    value: u16,
    length: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum HuffmanTreeInner {
    Single(u16),
    Tree {
        table_mask: u16,
        primary_table: Vec<HuffmanEntry>,
        secondary_table: Vec<HuffmanEntry>,
    },
}

/// Huffman tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct HuffmanTree(HuffmanTreeInner);

impl Default for HuffmanTree {
    fn default() -> Self {
        Self(HuffmanTreeInner::Single(0))
    }
}

impl HuffmanTree {
    /// Builds a tree from per-symbol code lengths, 0 meaning unused.
    pub(crate) fn build_implicit(code_lengths: &[u16]) -> Result<Self, DecodeError> {
        let mut histogram = [0usize; MAX_ALLOWED_CODE_LENGTH + 1];
        let mut num_symbols = 0;
        for &length in code_lengths {
            let length = usize::from(length);
            if length > MAX_ALLOWED_CODE_LENGTH {
                return Err(DecodeError::HuffmanError);
            }
            histogram[length] += 1;
            if length != 0 {
                num_symbols += 1;
            }
        }

        match num_symbols {
            0 => return Err(DecodeError::HuffmanError),
            1 => {
                let symbol = code_lengths
                    .iter()
                    .position(|&length| length != 0)
                    .ok_or(DecodeError::HuffmanError)?;
                return Ok(Self::build_single_node(symbol as u16));
            }
            _ => {}
        }

        let mut max_length = MAX_ALLOWED_CODE_LENGTH;
        while max_length > 1 && histogram[max_length] == 0 {
            max_length -= 1;
        }

        // Kraft sum must be exactly one.
        let mut offsets = [0usize; MAX_ALLOWED_CODE_LENGTH + 1];
        let mut codespace_used = 0usize;
        offsets[1] = histogram[0];
        for i in 1..max_length {
            offsets[i + 1] = offsets[i] + histogram[i];
            codespace_used = (codespace_used << 1) + histogram[i];
        }
        codespace_used = (codespace_used << 1) + histogram[max_length];
        if codespace_used != 1 << max_length {
            return Err(DecodeError::HuffmanError);
        }

        // symbols ordered by (length, index)
        let mut next_index = offsets;
        let mut sorted_symbols = vec![0u16; code_lengths.len()];
        for (symbol, &length) in code_lengths.iter().enumerate() {
            let length = usize::from(length);
            sorted_symbols[next_index[length]] = symbol as u16;
            next_index[length] += 1;
        }

        let table_bits = (max_length as u8).min(PRIMARY_TABLE_BITS);
        let table_size = 1usize << table_bits;
        let table_mask = table_size - 1;
        let mut primary_table = vec![HuffmanEntry::default(); table_size];

        let mut codeword = 0usize;
        let mut index = histogram[0];
        for length in 1..=table_bits {
            let current_table_end = 1usize << length;
            for _ in 0..histogram[usize::from(length)] {
                primary_table[codeword] = HuffmanEntry {
                    value: sorted_symbols[index],
                    length,
                };
                index += 1;
                codeword = next_codeword(codeword, current_table_end);
            }

            // replicate so that longer peeks land on the same entry
            if length < table_bits {
                primary_table.copy_within(0..current_table_end, current_table_end);
            }
        }

        let mut secondary_table = Vec::new();
        if max_length > usize::from(table_bits) {
            let mut subtable_start = 0;
            let mut subtable_prefix = usize::MAX;
            for length in (table_bits + 1)..=(max_length as u8) {
                let subtable_size = 1usize << (length - table_bits);
                for _ in 0..histogram[usize::from(length)] {
                    if codeword & table_mask != subtable_prefix {
                        subtable_prefix = codeword & table_mask;
                        subtable_start = secondary_table.len();
                        primary_table[subtable_prefix] = HuffmanEntry {
                            value: subtable_start as u16,
                            length,
                        };
                        secondary_table.resize(subtable_start + subtable_size, HuffmanEntry::default());
                    }

                    secondary_table[subtable_start + (codeword >> table_bits)] = HuffmanEntry {
                        value: sorted_symbols[index],
                        length,
                    };
                    index += 1;
                    codeword = next_codeword(codeword, 1 << length);
                }

                // the subtable continues with longer codes, widen it by one bit
                if usize::from(length) < max_length && codeword & table_mask == subtable_prefix {
                    let old_len = secondary_table.len();
                    secondary_table.extend_from_within(subtable_start..old_len);
                    primary_table[subtable_prefix] = HuffmanEntry {
                        value: subtable_start as u16,
                        length: length + 1,
                    };
                }

                if secondary_table.len() > MAX_SECONDARY_TABLE_SIZE {
                    return Err(DecodeError::HuffmanError);
                }
            }
        }

        Ok(Self(HuffmanTreeInner::Tree {
            table_mask: table_mask as u16,
            primary_table,
            secondary_table,
        }))
    }

    /// A degenerate tree that yields `symbol` without consuming any bits.
    pub(crate) fn build_single_node(symbol: u16) -> Self {
        Self(HuffmanTreeInner::Single(symbol))
    }

    /// A tree with the one-bit codes `0 -> zero` and `1 -> one`.
    pub(crate) fn build_two_node(zero: u16, one: u16) -> Self {
        Self(HuffmanTreeInner::Tree {
            table_mask: 0x1,
            primary_table: vec![
                HuffmanEntry {
                    value: zero,
                    length: 1,
                },
                HuffmanEntry {
                    value: one,
                    length: 1,
                },
            ],
            secondary_table: Vec::new(),
        })
    }

    pub(crate) fn is_single_node(&self) -> bool {
        matches!(self.0, HuffmanTreeInner::Single(_))
    }

    /// Reads one symbol. The caller keeps the reader filled.
    #[inline]
    pub(crate) fn read_symbol(&self, bit_reader: &mut BitReader) -> Result<u16, DecodeError> {
        match &self.0 {
            HuffmanTreeInner::Single(symbol) => Ok(*symbol),
            HuffmanTreeInner::Tree {
                table_mask,
                primary_table,
                secondary_table,
            } => {
                let v = (bit_reader.peek_full() & 0xFFFF) as usize;
                let entry = primary_table[v & usize::from(*table_mask)];
                if entry.length <= PRIMARY_TABLE_BITS {
                    bit_reader.consume(entry.length)?;
                    return Ok(entry.value);
                }

                let mask = (1usize << (entry.length - PRIMARY_TABLE_BITS)) - 1;
                let secondary_index = usize::from(entry.value) + ((v >> PRIMARY_TABLE_BITS) & mask);
                let entry = secondary_table
                    .get(secondary_index)
                    .ok_or(DecodeError::HuffmanError)?;
                bit_reader.consume(entry.length)?;
                Ok(entry.value)
            }
        }
    }

    /// Looks up the next symbol without consuming it.
    ///
    /// Returns the code length and symbol when the code resolves in the
    /// primary table, `None` when it needs the secondary table.
    #[inline]
    pub(crate) fn peek_symbol(&self, bit_reader: &BitReader) -> Option<(u8, u16)> {
        match &self.0 {
            HuffmanTreeInner::Single(symbol) => Some((0, *symbol)),
            HuffmanTreeInner::Tree {
                table_mask,
                primary_table,
                ..
            } => {
                let v = (bit_reader.peek_full() & 0xFFFF) as usize;
                let entry = primary_table[v & usize::from(*table_mask)];
                (entry.length <= PRIMARY_TABLE_BITS).then_some((entry.length, entry.value))
            }
        }
    }
}

/// Advances a bit-reversed codeword to the next code of the same table size.
fn next_codeword(codeword: usize, table_size: usize) -> usize {
    if codeword == table_size - 1 {
        return codeword;
    }

    let adv = (usize::BITS - 1) - (codeword ^ (table_size - 1)).leading_zeros();
    let bit = 1 << adv;
    (codeword & (bit - 1)) | bit
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    /// LSB-first writer mirroring what an encoder emits.
    #[derive(Default)]
    struct BitWriter {
        bytes: Vec<u8>,
        bits: u64,
        used: u8,
    }

    impl BitWriter {
        fn write_bits(&mut self, value: u64, n_bits: u8) {
            self.bits |= value << self.used;
            self.used += n_bits;
            while self.used >= 8 {
                self.bytes.push(self.bits as u8);
                self.bits >>= 8;
                self.used -= 8;
            }
        }

        /// Writes a canonical code with its first (most significant) bit first.
        fn write_code(&mut self, code: u32, length: u16) {
            for i in (0..length).rev() {
                self.write_bits(u64::from((code >> i) & 1), 1);
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.used > 0 {
                self.bytes.push(self.bits as u8);
            }
            self.bytes
        }
    }

    /// Deflate-style canonical code assignment.
    fn canonical_codes(lengths: &[u16]) -> Vec<u32> {
        let mut bl_count = [0u32; 16];
        for &l in lengths {
            bl_count[usize::from(l)] += 1;
        }
        bl_count[0] = 0;
        let mut next_code = [0u32; 16];
        let mut code = 0;
        for bits in 1..16 {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }
        lengths
            .iter()
            .map(|&l| {
                if l == 0 {
                    return 0;
                }
                let c = next_code[usize::from(l)];
                next_code[usize::from(l)] += 1;
                c
            })
            .collect()
    }

    fn assert_round_trip(lengths: &[u16]) {
        let tree = HuffmanTree::build_implicit(lengths).unwrap();
        let codes = canonical_codes(lengths);

        let mut writer = BitWriter::default();
        let symbols: Vec<u16> = (0..lengths.len() as u16)
            .filter(|&s| lengths[usize::from(s)] != 0)
            .collect();
        for &s in symbols.iter().chain(symbols.iter().rev()) {
            writer.write_code(codes[usize::from(s)], lengths[usize::from(s)]);
        }
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        for &s in symbols.iter().chain(symbols.iter().rev()) {
            reader.fill();
            assert_eq!(tree.read_symbol(&mut reader).unwrap(), s);
        }
    }

    #[test]
    fn test_short_codes_round_trip() {
        assert_round_trip(&[1, 2, 3, 3]);
        assert_round_trip(&[0, 3, 3, 0, 3, 3, 2, 0, 3, 3]);
        assert_round_trip(&[8; 256]);
    }

    #[test]
    fn test_long_codes_use_secondary_table() {
        // lengths 1..=15 plus a second 15 bit code
        let mut lengths: Vec<u16> = (1..=15).collect();
        lengths.push(15);
        assert_round_trip(&lengths);

        let mut lengths = vec![0u16; 300];
        for (i, l) in lengths.iter_mut().enumerate().take(12) {
            *l = i as u16 + 1;
        }
        // 2^-12 of code space left: 8 codes of 15 bits
        for l in &mut lengths[280..288] {
            *l = 15;
        }
        assert_round_trip(&lengths);
    }

    /// A complete code: leaves of a binary tree grown by splitting random
    /// leaves, scattered over an alphabet with unused symbols.
    fn random_code_lengths(rng: &mut StdRng) -> Vec<u16> {
        let leaves = rng.gen_range(2..=200);
        let mut depths = vec![0u16];
        while depths.len() < leaves {
            let i = rng.gen_range(0..depths.len());
            if depths[i] < 15 {
                let depth = depths.swap_remove(i) + 1;
                depths.push(depth);
                depths.push(depth);
            }
        }
        let unused = rng.gen_range(0..100);
        let mut lengths = depths;
        lengths.extend(core::iter::repeat(0).take(unused));
        lengths.shuffle(rng);
        lengths
    }

    #[test]
    fn test_random_complete_codes_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let lengths = random_code_lengths(&mut rng);
            assert_round_trip(&lengths);
        }
    }

    #[test]
    fn test_incomplete_or_oversubscribed_codes_are_rejected() {
        assert!(HuffmanTree::build_implicit(&[2, 2, 2]).is_err());
        assert!(HuffmanTree::build_implicit(&[1, 2, 2, 2]).is_err());
        assert!(HuffmanTree::build_implicit(&[0, 0, 0]).is_err());
        assert!(HuffmanTree::build_implicit(&[16, 1]).is_err());
    }

    #[test]
    fn test_single_symbol_consumes_nothing() {
        let tree = HuffmanTree::build_implicit(&[0, 0, 7, 0]).unwrap();
        assert!(tree.is_single_node());
        let mut reader = BitReader::new(&[]);
        assert_eq!(tree.read_symbol(&mut reader).unwrap(), 2);
        assert_eq!(tree.peek_symbol(&reader), Some((0, 2)));
    }

    #[test]
    fn test_two_node_tree() {
        let tree = HuffmanTree::build_two_node(17, 200);
        assert!(!tree.is_single_node());
        let mut reader = BitReader::new(&[0b0000_0110]);
        reader.fill();
        assert_eq!(tree.read_symbol(&mut reader).unwrap(), 17);
        assert_eq!(tree.peek_symbol(&reader), Some((1, 200)));
        assert_eq!(tree.read_symbol(&mut reader).unwrap(), 200);
        assert_eq!(tree.read_symbol(&mut reader).unwrap(), 200);
        assert_eq!(tree.read_symbol(&mut reader).unwrap(), 17);
    }

    #[test]
    fn test_peek_defers_long_codes() {
        let mut lengths: Vec<u16> = (1..=15).collect();
        lengths.push(15);
        let tree = HuffmanTree::build_implicit(&lengths).unwrap();
        // eleven leading ones select a code longer than the primary table
        let mut reader = BitReader::new(&[0xFF, 0x07]);
        reader.fill();
        assert_eq!(tree.peek_symbol(&reader), None);

        let mut reader = BitReader::new(&[0x00]);
        reader.fill();
        assert_eq!(tree.peek_symbol(&reader), Some((1, 0)));
    }

    #[test]
    fn test_truncated_code_is_an_error() {
        let tree = HuffmanTree::build_implicit(&[1, 2, 3, 3]).unwrap();
        let mut reader = BitReader::new(&[]);
        assert!(tree.read_symbol(&mut reader).is_err());
    }
}
