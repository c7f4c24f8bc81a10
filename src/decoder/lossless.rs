//! Decoding of lossless WebP images
//!
//! [Lossless spec](https://developers.google.com/speed/webp/docs/webp_lossless_bitstream_specification)

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodeError;
use super::bit_reader::BitReader;
use super::huffman::HuffmanTree;
use super::lossless_transform::{subsample_size, TransformType};

const CODE_LENGTH_CODES: usize = 19;
const CODE_LENGTH_CODE_ORDER: [usize; CODE_LENGTH_CODES] = [
    17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

#[rustfmt::skip]
const DISTANCE_MAP: [(i8, u8); 120] = [
    (0, 1),  (1, 0),  (1, 1),  (-1, 1), (0, 2),  (2, 0),  (1, 2),  (-1, 2),
    (2, 1),  (-2, 1), (2, 2),  (-2, 2), (0, 3),  (3, 0),  (1, 3),  (-1, 3),
    (3, 1),  (-3, 1), (2, 3),  (-2, 3), (3, 2),  (-3, 2), (0, 4),  (4, 0),
    (1, 4),  (-1, 4), (4, 1),  (-4, 1), (3, 3),  (-3, 3), (2, 4),  (-2, 4),
    (4, 2),  (-4, 2), (0, 5),  (3, 4),  (-3, 4), (4, 3),  (-4, 3), (5, 0),
    (1, 5),  (-1, 5), (5, 1),  (-5, 1), (2, 5),  (-2, 5), (5, 2),  (-5, 2),
    (4, 4),  (-4, 4), (3, 5),  (-3, 5), (5, 3),  (-5, 3), (0, 6),  (6, 0),
    (1, 6),  (-1, 6), (6, 1),  (-6, 1), (2, 6),  (-2, 6), (6, 2),  (-6, 2),
    (4, 5),  (-4, 5), (5, 4),  (-5, 4), (3, 6),  (-3, 6), (6, 3),  (-6, 3),
    (0, 7),  (7, 0),  (1, 7),  (-1, 7), (5, 5),  (-5, 5), (7, 1),  (-7, 1),
    (4, 6),  (-4, 6), (6, 4),  (-6, 4), (2, 7),  (-2, 7), (7, 2),  (-7, 2),
    (3, 7),  (-3, 7), (7, 3),  (-7, 3), (5, 6),  (-5, 6), (6, 5),  (-6, 5),
    (8, 0),  (4, 7),  (-4, 7), (7, 4),  (-7, 4), (8, 1),  (8, 2),  (6, 6),
    (-6, 6), (8, 3),  (5, 7),  (-5, 7), (7, 5),  (-7, 5), (8, 4),  (6, 7),
    (-6, 7), (7, 6),  (-7, 6), (8, 5),  (7, 7),  (-7, 7), (8, 6),  (8, 7),
];

const GREEN: usize = 0;
const RED: usize = 1;
const BLUE: usize = 2;
const ALPHA: usize = 3;
const DIST: usize = 4;

const HUFFMAN_CODES_PER_META_CODE: usize = 5;

type HuffmanCodeGroup = [HuffmanTree; HUFFMAN_CODES_PER_META_CODE];

const ALPHABET_SIZE: [u16; HUFFMAN_CODES_PER_META_CODE] = [256 + 24, 256, 256, 256, 40];

const NUM_TRANSFORM_TYPES: usize = 4;

/// Hash multiplier of the color cache.
const COLOR_CACHE_MULT: u32 = 0x1e35a7bd;

/// Fields of the 5-byte VP8L header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LosslessHeader {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) alpha_used: bool,
}

/// Parses the signature, dimensions, alpha hint and version of a VP8L chunk.
pub(crate) fn read_header(data: &[u8]) -> Result<LosslessHeader, DecodeError> {
    let mut bit_reader = BitReader::new(data);
    read_header_bits(&mut bit_reader)
}

fn read_header_bits(bit_reader: &mut BitReader) -> Result<LosslessHeader, DecodeError> {
    let signature = bit_reader.read_bits::<u8>(8)?;
    if signature != 0x2f {
        return Err(DecodeError::LosslessSignatureInvalid(signature));
    }

    let width = bit_reader.read_bits::<u16>(14)? + 1;
    let height = bit_reader.read_bits::<u16>(14)? + 1;
    let alpha_used = bit_reader.read_flag()?;

    let version = bit_reader.read_bits::<u8>(3)?;
    if version != 0 {
        return Err(DecodeError::VersionNumberInvalid(version));
    }

    Ok(LosslessHeader {
        width,
        height,
        alpha_used,
    })
}

/// Decodes a VP8L bitstream into `out` as RGBA.
///
/// With `implicit_dimensions` the stream has no header and its size is
/// `width`×`height`; this is how alpha planes are stored. Otherwise the
/// header must agree with the given dimensions.
pub fn decode(
    data: &[u8],
    width: u32,
    height: u32,
    implicit_dimensions: bool,
    out: &mut [u8],
) -> Result<(), DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InconsistentImageSizes);
    }
    let needed = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or(DecodeError::ImageTooLarge)?;
    if out.len() < needed {
        return Err(DecodeError::BufferTooSmall {
            needed,
            got: out.len(),
        });
    }

    let mut decoder = LosslessDecoder::new(data);
    decoder.decode_frame(width as usize, height as usize, implicit_dimensions, &mut out[..needed])
}

/// Decoder for lossless (VP8L) bitstreams.
pub(crate) struct LosslessDecoder<'a> {
    bit_reader: BitReader<'a>,
    transforms: [Option<TransformType>; NUM_TRANSFORM_TYPES],
    transform_order: Vec<usize>,
}

impl<'a> LosslessDecoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            bit_reader: BitReader::new(data),
            transforms: [None, None, None, None],
            transform_order: Vec::new(),
        }
    }

    /// Decodes a frame into `buf`, which holds exactly `width * height * 4` bytes.
    pub(crate) fn decode_frame(
        &mut self,
        width: usize,
        height: usize,
        implicit_dimensions: bool,
        buf: &mut [u8],
    ) -> Result<(), DecodeError> {
        if !implicit_dimensions {
            let header = read_header_bits(&mut self.bit_reader)?;
            if usize::from(header.width) != width || usize::from(header.height) != height {
                return Err(DecodeError::InconsistentImageSizes);
            }
        }

        let mut transformed_width = width;
        while self.bit_reader.read_flag()? {
            let transform = self.read_transform(transformed_width, height)?;
            let kind = transform.kind();
            if self.transforms[kind].is_some() {
                // each transform may only appear once
                return Err(DecodeError::TransformError);
            }

            if let TransformType::ColorIndexingTransform { table_size, .. } = transform {
                let bits = match table_size {
                    0..=2 => 3,
                    3..=4 => 2,
                    5..=16 => 1,
                    _ => 0,
                };
                transformed_width = subsample_size(transformed_width, bits);
            }

            self.transform_order.push(kind);
            self.transforms[kind] = Some(transform);
        }
        ldebug!(
            "VP8L {}x{}: transforms {:?}, coded width {}",
            width,
            height,
            self.transform_order,
            transformed_width
        );

        let transformed_size = transformed_width * height * 4;
        self.decode_image_stream(transformed_width, height, true, &mut buf[..transformed_size])?;

        let mut image_width = transformed_width;
        for &kind in self.transform_order.iter().rev() {
            let Some(transform) = &self.transforms[kind] else {
                continue;
            };
            if let TransformType::ColorIndexingTransform { .. } = transform {
                image_width = width;
            }
            transform.apply_inverse(buf, image_width, height)?;
        }

        Ok(())
    }

    fn read_transform(&mut self, xsize: usize, ysize: usize) -> Result<TransformType, DecodeError> {
        let transform_type = self.bit_reader.read_bits::<u8>(2)?;
        Ok(match transform_type {
            0 | 1 => {
                let size_bits = self.bit_reader.read_bits::<u8>(3)? + 2;
                let block_xsize = subsample_size(xsize, size_bits);
                let block_ysize = subsample_size(ysize, size_bits);
                let mut data = vec![0; block_xsize * block_ysize * 4];
                self.decode_image_stream(block_xsize, block_ysize, false, &mut data)?;

                if transform_type == 0 {
                    TransformType::PredictorTransform {
                        size_bits,
                        predictor_data: data,
                    }
                } else {
                    TransformType::ColorTransform {
                        size_bits,
                        transform_data: data,
                    }
                }
            }
            2 => TransformType::SubtractGreen,
            _ => {
                let table_size = self.bit_reader.read_bits::<u16>(8)? + 1;
                let mut table_data = vec![0; usize::from(table_size) * 4];
                self.decode_image_stream(usize::from(table_size), 1, false, &mut table_data)?;

                // palette entries are delta coded
                for i in 4..table_data.len() {
                    table_data[i] = table_data[i].wrapping_add(table_data[i - 4]);
                }

                TransformType::ColorIndexingTransform {
                    table_size,
                    table_data,
                }
            }
        })
    }

    /// Reads an entropy coded image: the ARGB image itself or one of the
    /// sub-images carrying transform or meta-code data.
    fn decode_image_stream(
        &mut self,
        xsize: usize,
        ysize: usize,
        is_argb_img: bool,
        data: &mut [u8],
    ) -> Result<(), DecodeError> {
        let color_cache_bits = self.read_color_cache()?;
        let huffman_info = self.read_huffman_codes(is_argb_img, xsize, ysize, color_cache_bits)?;
        let color_cache = color_cache_bits.map(ColorCache::new);
        self.decode_image_data(xsize, ysize, &huffman_info, color_cache, data)
    }

    fn read_color_cache(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.bit_reader.read_flag()? {
            let code_bits = self.bit_reader.read_bits::<u8>(4)?;
            if !(1..=11).contains(&code_bits) {
                return Err(DecodeError::InvalidColorCacheBits(code_bits));
            }
            ldebug!("VP8L color cache: {} bits", code_bits);
            Ok(Some(code_bits))
        } else {
            Ok(None)
        }
    }

    fn read_huffman_codes(
        &mut self,
        read_meta: bool,
        xsize: usize,
        ysize: usize,
        color_cache_bits: Option<u8>,
    ) -> Result<HuffmanInfo, DecodeError> {
        let mut num_huff_groups = 1usize;

        let mut huffman_bits = 0;
        let mut huffman_xsize = 1;
        let mut entropy_image = Vec::new();

        if read_meta && self.bit_reader.read_flag()? {
            huffman_bits = self.bit_reader.read_bits::<u8>(3)? + 2;
            huffman_xsize = subsample_size(xsize, huffman_bits);
            let huffman_ysize = subsample_size(ysize, huffman_bits);

            let mut data = vec![0; huffman_xsize * huffman_ysize * 4];
            self.decode_image_stream(huffman_xsize, huffman_ysize, false, &mut data)?;

            entropy_image = data
                .chunks_exact(4)
                .map(|pixel| {
                    let meta_huff_code = usize::from(pixel[0]) << 8 | usize::from(pixel[1]);
                    num_huff_groups = num_huff_groups.max(meta_huff_code + 1);
                    meta_huff_code as u16
                })
                .collect();
        }

        let mut huffman_code_groups = Vec::with_capacity(num_huff_groups);
        for _ in 0..num_huff_groups {
            let mut group = HuffmanCodeGroup::default();
            for (j, tree) in group.iter_mut().enumerate() {
                let mut alphabet_size = ALPHABET_SIZE[j];
                if j == GREEN {
                    if let Some(bits) = color_cache_bits {
                        alphabet_size += 1 << bits;
                    }
                }
                *tree = self.read_huffman_code(alphabet_size)?;
            }
            huffman_code_groups.push(group);
        }

        Ok(HuffmanInfo {
            xsize: huffman_xsize,
            image: entropy_image,
            bits: huffman_bits,
            mask: if huffman_bits == 0 {
                usize::MAX
            } else {
                (1 << huffman_bits) - 1
            },
            huffman_code_groups,
        })
    }

    fn read_huffman_code(&mut self, alphabet_size: u16) -> Result<HuffmanTree, DecodeError> {
        let simple = self.bit_reader.read_flag()?;

        if simple {
            let num_symbols = self.bit_reader.read_bits::<u8>(1)? + 1;

            let is_first_8bits = self.bit_reader.read_bits::<u8>(1)?;
            let zero_symbol = self.bit_reader.read_bits::<u16>(1 + 7 * is_first_8bits)?;
            if zero_symbol >= alphabet_size {
                return Err(DecodeError::BitStreamError);
            }

            if num_symbols == 1 {
                return Ok(HuffmanTree::build_single_node(zero_symbol));
            }

            let one_symbol = self.bit_reader.read_bits::<u16>(8)?;
            if one_symbol >= alphabet_size {
                return Err(DecodeError::BitStreamError);
            }
            return Ok(HuffmanTree::build_two_node(zero_symbol, one_symbol));
        }

        let mut code_length_code_lengths = [0u16; CODE_LENGTH_CODES];
        let num_code_lengths = 4 + self.bit_reader.read_bits::<usize>(4)?;
        for &index in CODE_LENGTH_CODE_ORDER.iter().take(num_code_lengths) {
            code_length_code_lengths[index] = self.bit_reader.read_bits(3)?;
        }

        let code_lengths =
            self.read_huffman_code_lengths(&code_length_code_lengths, usize::from(alphabet_size))?;
        HuffmanTree::build_implicit(&code_lengths)
    }

    fn read_huffman_code_lengths(
        &mut self,
        code_length_code_lengths: &[u16],
        num_symbols: usize,
    ) -> Result<Vec<u16>, DecodeError> {
        let table = HuffmanTree::build_implicit(code_length_code_lengths)?;

        let mut max_symbol = if self.bit_reader.read_flag()? {
            let length_nbits = 2 + 2 * self.bit_reader.read_bits::<u8>(3)?;
            let max_minus_two = self.bit_reader.read_bits::<usize>(length_nbits)?;
            if max_minus_two > num_symbols - 2 {
                return Err(DecodeError::BitStreamError);
            }
            2 + max_minus_two
        } else {
            num_symbols
        };

        let mut code_lengths = vec![0u16; num_symbols];
        let mut prev_code_len = 8;

        let mut symbol = 0;
        while symbol < num_symbols {
            if max_symbol == 0 {
                break;
            }
            max_symbol -= 1;

            self.bit_reader.fill();
            let code_len = table.read_symbol(&mut self.bit_reader)?;

            if code_len < 16 {
                code_lengths[symbol] = code_len;
                symbol += 1;
                if code_len != 0 {
                    prev_code_len = code_len;
                }
            } else {
                let use_prev = code_len == 16;
                let (extra_bits, repeat_offset) = match code_len {
                    16 => (2, 3),
                    17 => (3, 3),
                    18 => (7, 11),
                    _ => return Err(DecodeError::BitStreamError),
                };

                let repeat = self.bit_reader.read_bits::<usize>(extra_bits)? + repeat_offset;
                if symbol + repeat > num_symbols {
                    return Err(DecodeError::BitStreamError);
                }

                let length = if use_prev { prev_code_len } else { 0 };
                code_lengths[symbol..symbol + repeat].fill(length);
                symbol += repeat;
            }
        }

        Ok(code_lengths)
    }

    fn decode_image_data(
        &mut self,
        width: usize,
        height: usize,
        huffman_info: &HuffmanInfo,
        mut color_cache: Option<ColorCache>,
        data: &mut [u8],
    ) -> Result<(), DecodeError> {
        let num_values = width * height;
        if data.len() < num_values * 4 {
            return Err(DecodeError::ImageTooLarge);
        }

        let mut tree = &huffman_info.huffman_code_groups[huffman_info.get_huff_index(0, 0)];
        let mut index = 0;
        let mut next_block_start = 0;

        while index < num_values {
            self.bit_reader.fill();

            if index >= next_block_start {
                let x = index % width;
                let y = index / width;
                next_block_start = (x | huffman_info.mask).min(width - 1) + y * width + 1;
                tree = &huffman_info.huffman_code_groups[huffman_info.get_huff_index(x, y)];

                // Every literal channel has a single symbol: the whole block
                // is one color.
                if tree[..4].iter().all(HuffmanTree::is_single_node) {
                    let code = tree[GREEN].read_symbol(&mut self.bit_reader)?;
                    if code < 256 {
                        let n = if huffman_info.bits == 0 {
                            num_values - index
                        } else {
                            next_block_start - index
                        };

                        let red = tree[RED].read_symbol(&mut self.bit_reader)?;
                        let blue = tree[BLUE].read_symbol(&mut self.bit_reader)?;
                        let alpha = tree[ALPHA].read_symbol(&mut self.bit_reader)?;
                        let value = [red as u8, code as u8, blue as u8, alpha as u8];

                        for pixel in data[index * 4..(index + n) * 4].chunks_exact_mut(4) {
                            pixel.copy_from_slice(&value);
                        }
                        if let Some(color_cache) = color_cache.as_mut() {
                            color_cache.insert(value);
                        }

                        index += n;
                        continue;
                    }
                }
            }

            let code = tree[GREEN].read_symbol(&mut self.bit_reader)?;

            if code < 256 {
                let red = tree[RED].read_symbol(&mut self.bit_reader)?;
                let blue = tree[BLUE].read_symbol(&mut self.bit_reader)?;
                if self.bit_reader.nbits() < 15 {
                    self.bit_reader.fill();
                }
                let alpha = tree[ALPHA].read_symbol(&mut self.bit_reader)?;
                let value = [red as u8, code as u8, blue as u8, alpha as u8];

                data[index * 4..][..4].copy_from_slice(&value);
                if let Some(color_cache) = color_cache.as_mut() {
                    color_cache.insert(value);
                }
                index += 1;
            } else if code < 256 + 24 {
                let length_symbol = code - 256;
                let length = self.get_copy_distance(length_symbol)?;

                let dist_symbol = tree[DIST].read_symbol(&mut self.bit_reader)?;
                let dist_code = self.get_copy_distance(dist_symbol)?;
                let dist = plane_code_to_distance(width, dist_code);

                if index < dist || num_values - index < length {
                    return Err(DecodeError::BitStreamError);
                }

                // the source may overlap the destination, copy in order
                let start = index * 4;
                let back = dist * 4;
                for i in start..start + length * 4 {
                    data[i] = data[i - back];
                }

                if let Some(color_cache) = color_cache.as_mut() {
                    for pixel in data[start..start + length * 4].chunks_exact(4) {
                        color_cache.insert([pixel[0], pixel[1], pixel[2], pixel[3]]);
                    }
                }
                index += length;
            } else {
                let color_cache = color_cache.as_mut().ok_or(DecodeError::BitStreamError)?;
                let color = color_cache.lookup(usize::from(code - 280))?;
                data[index * 4..][..4].copy_from_slice(&color);
                index += 1;

                // cache hits tend to come in runs
                if index < next_block_start {
                    if let Some((bits, code)) = tree[GREEN].peek_symbol(&self.bit_reader) {
                        if code >= 280 {
                            self.bit_reader.consume(bits)?;
                            let color = color_cache.lookup(usize::from(code - 280))?;
                            data[index * 4..][..4].copy_from_slice(&color);
                            index += 1;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Length or distance value for a prefix code plus its extra bits.
    fn get_copy_distance(&mut self, prefix_code: u16) -> Result<usize, DecodeError> {
        if prefix_code < 4 {
            return Ok(usize::from(prefix_code) + 1);
        }
        if prefix_code >= 40 {
            return Err(DecodeError::BitStreamError);
        }
        let extra_bits = ((prefix_code - 2) >> 1) as u8;
        let offset = (2 + (usize::from(prefix_code) & 1)) << extra_bits;

        if self.bit_reader.nbits() < extra_bits {
            self.bit_reader.fill();
        }
        let bits = self.bit_reader.peek(extra_bits) as usize;
        self.bit_reader.consume(extra_bits)?;

        Ok(offset + bits + 1)
    }
}

/// Maps a distance code to a pixel distance; the first 120 codes address a
/// neighbourhood around the current pixel.
fn plane_code_to_distance(xsize: usize, plane_code: usize) -> usize {
    if plane_code > 120 {
        plane_code - 120
    } else {
        let (xoffset, yoffset) = DISTANCE_MAP[plane_code - 1];
        let dist = isize::from(xoffset) + isize::from(yoffset) * xsize as isize;
        if dist < 1 {
            1
        } else {
            dist as usize
        }
    }
}

#[derive(Debug, Clone)]
struct HuffmanInfo {
    xsize: usize,
    image: Vec<u16>,
    bits: u8,
    mask: usize,
    huffman_code_groups: Vec<HuffmanCodeGroup>,
}

impl HuffmanInfo {
    #[inline]
    fn get_huff_index(&self, x: usize, y: usize) -> usize {
        if self.bits == 0 {
            return 0;
        }
        let position = (y >> self.bits) * self.xsize + (x >> self.bits);
        usize::from(self.image[position])
    }
}

#[derive(Debug, Clone)]
struct ColorCache {
    color_cache_bits: u8,
    color_cache: Vec<[u8; 4]>,
}

impl ColorCache {
    fn new(bits: u8) -> Self {
        Self {
            color_cache_bits: bits,
            color_cache: vec![[0u8; 4]; 1 << bits],
        }
    }

    #[inline(always)]
    fn insert(&mut self, color: [u8; 4]) {
        let [r, g, b, a] = color;
        let argb = u32::from_be_bytes([a, r, g, b]);
        let index = COLOR_CACHE_MULT.wrapping_mul(argb) >> (32 - self.color_cache_bits);
        self.color_cache[index as usize] = color;
    }

    #[inline(always)]
    fn lookup(&self, index: usize) -> Result<[u8; 4], DecodeError> {
        self.color_cache
            .get(index)
            .copied()
            .ok_or(DecodeError::BitStreamError)
    }
}
