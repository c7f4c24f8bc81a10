//! Hand-assembled VP8L streams decoded through the public API.
//!
//! Streams are written with a small LSB-first bit writer so every test
//! pins down exactly which bitstream features it exercises.

use webp_still::{lossless, DecodeError};

#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    nbits: usize,
}

impl BitWriter {
    fn write(&mut self, value: u32, bits: usize) {
        for i in 0..bits {
            if self.nbits % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            *self.bytes.last_mut().unwrap() |= bit << (self.nbits % 8);
            self.nbits += 1;
        }
    }

    fn header(&mut self, width: u32, height: u32, alpha_used: bool) {
        self.write(0x2f, 8);
        self.write(width - 1, 14);
        self.write(height - 1, 14);
        self.write(u32::from(alpha_used), 1);
        self.write(0, 3);
    }

    /// A simple code with a single 8-bit symbol.
    fn single(&mut self, symbol: u8) {
        self.write(1, 1);
        self.write(0, 1);
        self.write(1, 1);
        self.write(u32::from(symbol), 8);
    }

    /// A simple code with two 8-bit symbols: bit 0 selects `zero`.
    fn pair(&mut self, zero: u8, one: u8) {
        self.write(1, 1);
        self.write(1, 1);
        self.write(1, 1);
        self.write(u32::from(zero), 8);
        self.write(u32::from(one), 8);
    }

    /// A normal code over `alphabet_size` symbols where exactly `a` and
    /// `b` (a < b) get one-bit codes; `a` is coded as 0.
    fn two_symbol_normal(&mut self, alphabet_size: usize, a: usize, b: usize) {
        self.write(0, 1);
        // four code length codes, in order 17, 18, 0, 1
        self.write(0, 4);
        for length in [0, 0, 1, 1] {
            self.write(length, 3);
        }
        // no max_symbol
        self.write(0, 1);
        for symbol in 0..alphabet_size {
            self.write(u32::from(symbol == a || symbol == b), 1);
        }
    }

    /// A prefix code, most significant bit first.
    fn code(&mut self, code: u32, length: usize) {
        for i in (0..length).rev() {
            self.write((code >> i) & 1, 1);
        }
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

fn decode(stream: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DecodeError> {
    let mut out = vec![0u8; (width * height * 4) as usize];
    lossless::decode(stream, width, height, false, &mut out)?;
    Ok(out)
}

fn solid_stream(width: u32, height: u32, [a, r, g, b]: [u8; 4]) -> Vec<u8> {
    let mut w = BitWriter::default();
    w.header(width, height, true);
    // no transform, no color cache, no meta codes
    w.write(0, 3);
    w.single(g);
    w.single(r);
    w.single(b);
    w.single(a);
    w.single(0);
    w.finish()
}

#[test]
fn solid_color_fills_every_pixel() {
    let stream = solid_stream(5, 3, [0x80, 0x11, 0x22, 0x33]);
    let out = decode(&stream, 5, 3).unwrap();
    assert!(out.chunks_exact(4).all(|p| p == [0x11, 0x22, 0x33, 0x80]));
}

#[test]
fn header_dimensions_must_match() {
    let stream = solid_stream(5, 3, [0; 4]);
    assert!(matches!(
        decode(&stream, 3, 5),
        Err(DecodeError::InconsistentImageSizes)
    ));
}

#[test]
fn short_output_buffer() {
    let stream = solid_stream(2, 2, [0; 4]);
    let mut out = [0u8; 15];
    assert!(matches!(
        lossless::decode(&stream, 2, 2, false, &mut out),
        Err(DecodeError::BufferTooSmall { needed: 16, got: 15 })
    ));
}

#[test]
fn rejects_bad_signature_and_version() {
    let mut stream = solid_stream(1, 1, [0; 4]);
    stream[0] = 0x2e;
    assert!(matches!(
        decode(&stream, 1, 1),
        Err(DecodeError::LosslessSignatureInvalid(0x2e))
    ));

    let mut w = BitWriter::default();
    w.write(0x2f, 8);
    w.write(0, 28);
    w.write(0, 1);
    w.write(1, 3);
    w.write(0, 32);
    assert!(matches!(
        decode(&w.finish(), 1, 1),
        Err(DecodeError::VersionNumberInvalid(1))
    ));
}

#[test]
fn literals_and_backward_reference() {
    let mut w = BitWriter::default();
    w.header(4, 1, false);
    w.write(0, 3);
    // green: literal 0x10 or length prefix 1
    w.two_symbol_normal(280, 0x10, 256 + 1);
    w.pair(0x20, 0x80);
    w.single(0x30);
    w.single(0xff);
    // distance prefix 13: five extra bits
    w.single(13);

    // two literals that differ in red
    w.write(0, 1);
    w.write(0, 1);
    w.write(0, 1);
    w.write(1, 1);
    // copy two pixels from two back: prefix 13 with extra 25 is
    // distance code 122, a plain distance of 2
    w.write(1, 1);
    w.write(25, 5);

    let out = decode(&w.finish(), 4, 1).unwrap();
    let first = [0x20, 0x10, 0x30, 0xff];
    let second = [0x80, 0x10, 0x30, 0xff];
    assert_eq!(&out[0..4], &first);
    assert_eq!(&out[4..8], &second);
    assert_eq!(&out[8..12], &first);
    assert_eq!(&out[12..16], &second);
}

#[test]
fn backward_reference_before_start_is_rejected() {
    let mut w = BitWriter::default();
    w.header(2, 1, false);
    w.write(0, 3);
    w.two_symbol_normal(280, 0x10, 256);
    w.single(0);
    w.single(0);
    w.single(0);
    // distance prefix 1: distance code 2, the pixel to the left
    w.single(1);
    // first symbol is already a copy
    w.write(1, 1);
    w.write(0, 8);

    assert!(matches!(
        decode(&w.finish(), 2, 1),
        Err(DecodeError::BitStreamError)
    ));
}

fn cache_key(pixel: [u8; 4], bits: u32) -> usize {
    let [r, g, b, a] = pixel;
    let argb = u32::from_be_bytes([a, r, g, b]);
    (0x1e35a7bd_u32.wrapping_mul(argb) >> (32 - bits)) as usize
}

#[test]
fn color_cache_hit() {
    let first = [0x20, 0x10, 0x30, 0xff];
    let second = [0x80, 0x10, 0x30, 0xff];
    let key = cache_key(first, 1);

    let mut w = BitWriter::default();
    w.header(3, 1, false);
    w.write(0, 1);
    // one bit of color cache
    w.write(1, 1);
    w.write(1, 4);
    w.write(0, 1);
    w.two_symbol_normal(280 + 2, 0x10, 280 + key);
    w.pair(0x20, 0x80);
    w.single(0x30);
    w.single(0xff);
    w.single(0);

    w.write(0, 1);
    w.write(0, 1);
    w.write(0, 1);
    w.write(1, 1);
    w.write(1, 1);
    w.write(0, 8);

    let out = decode(&w.finish(), 3, 1).unwrap();
    let expected = if cache_key(second, 1) == key {
        second
    } else {
        first
    };
    assert_eq!(&out[8..12], &expected);
}

#[test]
fn color_cache_bits_out_of_range() {
    let mut w = BitWriter::default();
    w.header(1, 1, false);
    w.write(0, 1);
    w.write(1, 1);
    w.write(12, 4);
    w.write(0, 16);
    assert!(matches!(
        decode(&w.finish(), 1, 1),
        Err(DecodeError::InvalidColorCacheBits(12))
    ));
}

#[test]
fn subtract_green_transform() {
    let mut w = BitWriter::default();
    w.header(2, 2, false);
    w.write(1, 1);
    w.write(2, 2);
    w.write(0, 1);
    w.write(0, 2);
    w.single(0x10);
    w.single(0xf8);
    w.single(0x30);
    w.single(0xff);
    w.single(0);

    let out = decode(&w.finish(), 2, 2).unwrap();
    // red and blue wrap around 256
    assert!(out.chunks_exact(4).all(|p| p == [0x08, 0x10, 0x40, 0xff]));
}

#[test]
fn repeated_transform_is_rejected() {
    let mut w = BitWriter::default();
    w.header(1, 1, false);
    w.write(1, 1);
    w.write(2, 2);
    w.write(1, 1);
    w.write(2, 2);
    w.write(0, 16);
    assert!(matches!(
        decode(&w.finish(), 1, 1),
        Err(DecodeError::TransformError)
    ));
}

#[test]
fn color_indexing_transform() {
    let c0 = [0x10, 0x20, 0x30, 0xff];
    let c1 = [0x90, 0x20, 0x30, 0xff];

    let mut w = BitWriter::default();
    w.header(4, 1, true);
    w.write(1, 1);
    w.write(3, 2);
    // two palette entries
    w.write(1, 8);
    // palette image: no cache, entries delta coded
    w.write(0, 1);
    w.pair(0x20, 0x00);
    w.pair(0x10, 0x80);
    w.pair(0x30, 0x00);
    w.pair(0xff, 0x00);
    w.single(0);
    w.write(0b0000, 4);
    w.write(0b1111, 4);
    // end of transforms, then the packed 1x1 image
    w.write(0, 3);
    // indices 0, 1, 1, 0 at one bit per pixel
    w.single(0b0110);
    w.single(0);
    w.single(0);
    w.single(0xff);
    w.single(0);

    let out = decode(&w.finish(), 4, 1).unwrap();
    assert_eq!(&out[0..4], &c0);
    assert_eq!(&out[4..8], &c1);
    assert_eq!(&out[8..12], &c1);
    assert_eq!(&out[12..16], &c0);
}

#[test]
fn truncated_stream_is_an_error() {
    let stream = solid_stream(4, 4, [1, 2, 3, 4]);
    for len in 0..stream.len() - 1 {
        assert!(decode(&stream[..len], 4, 4).is_err(), "prefix of {len} bytes");
    }
}

#[test]
fn implicit_dimensions_skip_the_header() {
    let mut w = BitWriter::default();
    w.write(0, 3);
    w.single(0x42);
    w.single(0);
    w.single(0);
    w.single(0);
    w.single(0);

    let mut out = vec![0u8; 3 * 2 * 4];
    lossless::decode(&w.finish(), 3, 2, true, &mut out).unwrap();
    assert!(out.chunks_exact(4).all(|p| p[1] == 0x42));
}

#[test]
fn meta_codes_select_groups_per_block() {
    let mut w = BitWriter::default();
    w.header(8, 4, false);
    w.write(0, 1);
    w.write(0, 1);
    // meta codes over 4x4 blocks
    w.write(1, 1);
    w.write(0, 3);
    // 2x1 entropy image: group 0 on the left, group 1 on the right
    w.write(0, 1);
    w.pair(0, 1);
    w.single(0);
    w.single(0);
    w.single(0);
    w.single(0);
    w.write(0, 1);
    w.write(1, 1);
    // group 0 is a single color and costs no bits
    w.single(0x11);
    w.single(0x22);
    w.single(0x33);
    w.single(0xff);
    w.single(0);
    w.pair(0x50, 0x60);
    w.single(0x01);
    w.single(0x02);
    w.single(0x80);
    w.single(0);
    for y in 0..4 {
        for x in 0..4 {
            w.write((x + y) & 1, 1);
        }
    }

    let out = decode(&w.finish(), 8, 4).unwrap();
    for (i, pixel) in out.chunks_exact(4).enumerate() {
        let (x, y) = (i % 8, i / 8);
        let expected = if x < 4 {
            [0x22, 0x11, 0x33, 0xff]
        } else if (x + y) % 2 == 0 {
            [0x01, 0x50, 0x02, 0x80]
        } else {
            [0x01, 0x60, 0x02, 0x80]
        };
        assert_eq!(pixel, expected, "pixel ({x}, {y})");
    }
}

#[test]
fn code_length_repeat_codes() {
    let mut w = BitWriter::default();
    w.header(4, 1, false);
    w.write(0, 3);
    // green: normal code, code length codes for 17, 18, 0, 1, 2, 3, 4, 5, 16
    w.write(0, 1);
    w.write(5, 4);
    for length in [2, 2, 0, 0, 2, 0, 0, 0, 2] {
        w.write(length, 3);
    }
    w.write(0, 1);
    // canonical codes: 2 -> 00, 16 -> 01, 17 -> 10, 18 -> 11
    // sixteen zeros
    w.code(0b11, 2);
    w.write(5, 7);
    // a length of 2 repeated three more times
    w.code(0b00, 2);
    w.code(0b01, 2);
    w.write(0, 2);
    // ten zeros, then 138 and 112 zeros up to 280 symbols
    w.code(0b10, 2);
    w.write(7, 3);
    w.code(0b11, 2);
    w.write(127, 7);
    w.code(0b11, 2);
    w.write(101, 7);
    w.single(0x40);
    w.single(0x50);
    w.single(0xff);
    w.single(0);
    // greens 0x10, 0x13, 0x11, 0x12
    for code in [0b00, 0b11, 0b01, 0b10] {
        w.code(code, 2);
    }

    let out = decode(&w.finish(), 4, 1).unwrap();
    assert_eq!(
        out,
        [
            0x40, 0x10, 0x50, 0xff, 0x40, 0x13, 0x50, 0xff, //
            0x40, 0x11, 0x50, 0xff, 0x40, 0x12, 0x50, 0xff,
        ]
    );
}

#[test]
fn repeat_past_alphabet_is_rejected() {
    let mut w = BitWriter::default();
    w.header(1, 1, false);
    w.write(0, 3);
    w.write(0, 1);
    // code length codes for 17 and 18 only
    w.write(0, 4);
    for length in [1, 1, 0, 0] {
        w.write(length, 3);
    }
    w.write(0, 1);
    // 138 zeros twice and then 11 more overruns 280 symbols
    w.code(1, 1);
    w.write(127, 7);
    w.code(1, 1);
    w.write(127, 7);
    w.code(1, 1);
    w.write(0, 7);
    w.write(0, 32);

    assert!(matches!(
        decode(&w.finish(), 1, 1),
        Err(DecodeError::BitStreamError)
    ));
}

#[test]
fn predictor_and_cross_color_transforms() {
    let mut w = BitWriter::default();
    w.header(4, 2, true);
    // predictor transform, 4x4 blocks, mode 5 in green
    w.write(1, 1);
    w.write(0, 2);
    w.write(0, 3);
    w.write(0, 1);
    w.single(5);
    w.single(0);
    w.single(0);
    w.single(0);
    w.single(0);
    // color transform, 4x4 blocks: green_to_red 0xf3 in blue,
    // green_to_blue 0x21 in green, red_to_blue 0x0e in red
    w.write(1, 1);
    w.write(1, 2);
    w.write(0, 3);
    w.write(0, 1);
    w.single(0x21);
    w.single(0x0e);
    w.single(0xf3);
    w.single(0);
    w.single(0);
    w.write(0, 3);
    w.pair(0x10, 0x30);
    w.pair(0x05, 0xf0);
    w.pair(0x40, 0x02);
    w.single(0x00);
    w.single(0);
    let residuals = [
        [0, 0, 1],
        [1, 0, 0],
        [1, 1, 0],
        [0, 1, 1],
        [1, 0, 0],
        [0, 1, 0],
        [0, 0, 0],
        [1, 0, 1],
    ];
    for [g, r, b] in residuals {
        w.write(g, 1);
        w.write(r, 1);
        w.write(b, 1);
    }

    let out = decode(&w.finish(), 4, 2).unwrap();
    assert_eq!(
        out,
        [
            0xfe, 0x10, 0x4f, 0xff, 0xef, 0x40, 0x7b, 0xff, //
            0xcb, 0x70, 0x9e, 0xff, 0xb4, 0x80, 0xe3, 0xff, //
            0xef, 0x40, 0x7b, 0xff, 0xcf, 0x5c, 0x8a, 0xff, //
            0xc4, 0x7f, 0xbb, 0xff, 0xb7, 0x9f, 0x29, 0xff,
        ]
    );
}
