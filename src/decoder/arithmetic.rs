//! Boolean entropy decoder used by the VP8 frame header and partitions.
//!
//! The coded bytes are consumed as big-endian 32-bit chunks followed by a
//! tail of up to three single bytes. One synthetic zero byte is tolerated
//! past the end; any read after that leaves the decoder in a sticky
//! end-of-stream state that [`ArithmeticDecoder::check`] reports.

use alloc::vec::Vec;

use super::api::DecodeError;
use crate::common::types::Prob;

/// One node of a probability tree, stored in a flat, index-addressed array.
///
/// Branches below `0x80` are the index of a child node. Branches with the
/// high bit set are terminal and carry the decoded symbol in the low bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TreeNode {
    pub(crate) left: u8,
    pub(crate) right: u8,
    pub(crate) prob: Prob,
    pub(crate) index: u8,
}

impl TreeNode {
    pub(crate) const UNINIT: TreeNode = TreeNode {
        left: 0,
        right: 0,
        prob: 0,
        index: 0,
    };

    const fn prepare_branch(t: i8) -> u8 {
        if t > 0 {
            (t as u8) / 2
        } else {
            let value = -t;
            0x80 | (value as u8)
        }
    }

    pub(crate) const fn value_from_branch(t: u8) -> i8 {
        (t & !0x80) as i8
    }
}

/// Converts an RFC 6386 style tree (pairs of branch values, negative for
/// leaves) plus its node probabilities into node form.
pub(crate) const fn tree_nodes_from<const N: usize, const M: usize>(
    tree: [i8; N],
    probs: [Prob; M],
) -> [TreeNode; M] {
    if N != 2 * M {
        panic!("invalid tree with probs");
    }
    let mut nodes = [TreeNode::UNINIT; M];
    let mut i = 0;
    while i < M {
        nodes[i].left = TreeNode::prepare_branch(tree[2 * i]);
        nodes[i].right = TreeNode::prepare_branch(tree[2 * i + 1]);
        nodes[i].prob = probs[i];
        nodes[i].index = i as u8;
        i += 1;
    }
    nodes
}

#[derive(Clone, Copy, Default)]
struct State {
    chunk_index: usize,
    value: u64,
    range: u32,
    bit_count: i32,
}

/// Boolean arithmetic decoder over one VP8 partition.
#[derive(Clone)]
pub(crate) struct ArithmeticDecoder {
    chunks: Vec<u32>,
    state: State,
    final_bytes: [u8; 3],
    final_bytes_remaining: i8,
}

impl Default for ArithmeticDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithmeticDecoder {
    const FINAL_BYTES_REMAINING_EOF: i8 = -0xE;

    /// Creates a decoder with no data. Every read on it is an error.
    pub(crate) fn new() -> Self {
        Self {
            chunks: Vec::new(),
            state: State {
                chunk_index: 0,
                value: 0,
                range: 255,
                bit_count: -8,
            },
            final_bytes: [0; 3],
            final_bytes_remaining: Self::FINAL_BYTES_REMAINING_EOF,
        }
    }

    /// Resets the decoder to read from `data`.
    pub(crate) fn init(&mut self, data: &[u8]) {
        let mut chunks = data.chunks_exact(4);
        self.chunks.clear();
        self.chunks.extend(
            chunks
                .by_ref()
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]])),
        );

        let tail = chunks.remainder();
        self.final_bytes = [0; 3];
        self.final_bytes[..tail.len()].copy_from_slice(tail);
        self.final_bytes_remaining = tail.len() as i8;

        self.state = State {
            chunk_index: 0,
            value: 0,
            range: 255,
            bit_count: -8,
        };
    }

    /// Returns `value` unless the decoder has read past the end of its data.
    #[inline]
    pub(crate) fn check<T>(&self, value: T) -> Result<T, DecodeError> {
        if self.is_past_eof() {
            Err(DecodeError::BitStreamError)
        } else {
            Ok(value)
        }
    }

    #[inline]
    pub(crate) fn is_past_eof(&self) -> bool {
        self.final_bytes_remaining == Self::FINAL_BYTES_REMAINING_EOF
    }

    fn load_from_final_bytes(&mut self) {
        match self.final_bytes_remaining {
            1.. => {
                self.final_bytes_remaining -= 1;
                let byte = self.final_bytes[0];
                self.final_bytes.rotate_left(1);
                self.state.value <<= 8;
                self.state.value |= u64::from(byte);
                self.state.bit_count += 8;
            }
            0 => {
                // a single zero byte of slack past the end
                self.final_bytes_remaining -= 1;
                self.state.value <<= 8;
                self.state.bit_count += 8;
            }
            _ => {
                self.state.bit_count = 0;
                self.final_bytes_remaining = Self::FINAL_BYTES_REMAINING_EOF;
            }
        }
    }

    #[inline]
    fn refill(&mut self) {
        if let Some(&chunk) = self.chunks.get(self.state.chunk_index) {
            self.state.chunk_index += 1;
            self.state.value <<= 32;
            self.state.value |= u64::from(chunk);
            self.state.bit_count += 32;
        } else {
            self.load_from_final_bytes();
        }
    }

    /// Decodes one bit whose probability of being zero is `probability / 256`.
    #[inline]
    pub(crate) fn read_bool(&mut self, probability: Prob) -> bool {
        if self.state.bit_count < 0 {
            self.refill();
        }

        let split = 1 + (((self.state.range - 1) * u32::from(probability)) >> 8);
        let bigsplit = u64::from(split) << self.state.bit_count;

        let bit = if self.state.value >= bigsplit {
            self.state.range -= split;
            self.state.value -= bigsplit;
            true
        } else {
            self.state.range = split;
            false
        };

        // keep range in [128, 255]
        let shift = self.state.range.leading_zeros().saturating_sub(24);
        self.state.range <<= shift;
        self.state.bit_count -= shift as i32;

        bit
    }

    #[inline]
    pub(crate) fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// Reads an `n`-bit unsigned value, most significant bit first.
    pub(crate) fn read_literal(&mut self, n: u8) -> u8 {
        let mut v = 0u8;
        for _ in 0..n {
            v = (v << 1) | u8::from(self.read_flag());
        }
        v
    }

    /// Reads a presence flag, then an `n`-bit magnitude and a sign flag.
    pub(crate) fn read_optional_signed_value(&mut self, n: u8) -> i32 {
        if !self.read_flag() {
            return 0;
        }
        let magnitude = i32::from(self.read_literal(n));
        if self.read_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Walks `tree` from the root and returns the terminal symbol.
    #[inline]
    pub(crate) fn read_with_tree(&mut self, tree: &[TreeNode]) -> i8 {
        self.read_with_tree_from(tree, 0)
    }

    /// Walks `tree` starting at node `start`, used when earlier decisions
    /// of the walk are already known.
    pub(crate) fn read_with_tree_from(&mut self, tree: &[TreeNode], start: usize) -> i8 {
        let mut index = start;
        loop {
            let node = tree[index];
            let branch = if self.read_bool(node.prob) {
                node.right
            } else {
                node.left
            };
            let next = usize::from(branch);
            if next < tree.len() {
                index = next;
            } else {
                return TreeNode::value_from_branch(branch);
            }
        }
    }
}

/// Boolean encoder producing streams [`ArithmeticDecoder`] reads back,
/// used to build coefficient and header streams in tests.
#[cfg(test)]
pub(crate) struct ArithmeticEncoder {
    writer: Vec<u8>,
    bottom: u32,
    // kept in [128, 255] between writes
    range: u32,
    bit_num: i32,
}

#[cfg(test)]
impl ArithmeticEncoder {
    pub(crate) fn new() -> Self {
        Self {
            writer: Vec::new(),
            bottom: 0,
            range: 255,
            bit_num: 24,
        }
    }

    fn add_one_to_output(&mut self) {
        for byte in self.writer.iter_mut().rev() {
            if *byte < 255 {
                *byte += 1;
                return;
            }
            *byte = 0;
        }
    }

    pub(crate) fn write_bool(&mut self, bit: bool, probability: Prob) {
        let split = 1 + (((self.range - 1) * u32::from(probability)) >> 8);
        if bit {
            self.bottom += split;
            self.range -= split;
        } else {
            self.range = split;
        }

        while self.range < 128 {
            self.range <<= 1;
            if self.bottom & (1 << 31) != 0 {
                self.add_one_to_output();
            }
            self.bottom <<= 1;

            self.bit_num -= 1;
            if self.bit_num == 0 {
                self.writer.push((self.bottom >> 24) as u8);
                self.bottom &= (1 << 24) - 1;
                self.bit_num = 8;
            }
        }
    }

    pub(crate) fn write_flag(&mut self, bit: bool) {
        self.write_bool(bit, 128);
    }

    pub(crate) fn write_literal(&mut self, n: u8, value: u32) {
        for bit in (0..n).rev() {
            self.write_flag((value >> bit) & 1 != 0);
        }
    }

    /// Writes the branch decisions that lead from node `start` to `value`.
    pub(crate) fn write_with_tree_from(&mut self, tree: &[TreeNode], start: usize, value: i8) {
        fn path(tree: &[TreeNode], index: usize, value: i8, bits: &mut Vec<(Prob, bool)>) -> bool {
            let node = tree[index];
            for (branch, bit) in [(node.left, false), (node.right, true)] {
                bits.push((node.prob, bit));
                let next = usize::from(branch);
                let found = if next < tree.len() {
                    path(tree, next, value, bits)
                } else {
                    TreeNode::value_from_branch(branch) == value
                };
                if found {
                    return true;
                }
                bits.pop();
            }
            false
        }

        let mut bits = Vec::new();
        assert!(path(tree, start, value, &mut bits), "{value} is not in the tree");
        for (prob, bit) in bits {
            self.write_bool(bit, prob);
        }
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.bottom & (1 << (32 - self.bit_num)) != 0 {
            self.add_one_to_output();
        }
        let mut v = self.bottom << (self.bit_num & 7);
        for _ in 0..(self.bit_num >> 3) {
            v <<= 8;
        }
        for _ in 0..4 {
            self.writer.push((v >> 24) as u8);
            v <<= 8;
        }
        self.writer
    }
}
