//! Files written by libwebp's encoder, decoded and compared byte for byte
//! against libwebp's own RGBA output stored as PNG.
//!
//! Lossy references use fancy upsampling unless the name says `nofancy`.
//! Lossless references are the encoder input.

use webp_still::{decode_rgba, DecodeConfig, UpsamplingMethod, WebPDecoder};

macro_rules! fixture {
    ($name:literal) => {
        (
            $name,
            &include_bytes!(concat!("fixtures/", $name, ".webp"))[..],
        )
    };
}

macro_rules! reference {
    ($name:literal) => {
        read_png_rgba(include_bytes!(concat!("fixtures/", $name, ".png")))
    };
}

fn read_png_rgba(data: &[u8]) -> (Vec<u8>, u32, u32) {
    let mut decoder = png::Decoder::new(data);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    assert_eq!(info.color_type, png::ColorType::Rgba);
    buf.truncate(info.buffer_size());
    (buf, info.width, info.height)
}

/// Compares two RGBA images and names the first differing pixel.
fn assert_same_pixels(name: &str, got: &[u8], expected: &[u8], width: u32) {
    assert_eq!(got.len(), expected.len(), "{name}: buffer size");
    if let Some(i) = got
        .chunks_exact(4)
        .zip(expected.chunks_exact(4))
        .position(|(a, b)| a != b)
    {
        let (x, y) = (i as u32 % width, i as u32 / width);
        panic!(
            "{name}: pixel ({x}, {y}) is {:?}, expected {:?}",
            &got[i * 4..][..4],
            &expected[i * 4..][..4]
        );
    }
}

fn check(name: &str, webp: &[u8], (expected, width, height): (Vec<u8>, u32, u32)) {
    let (pixels, w, h) = decode_rgba(webp).unwrap();
    assert_eq!((w, h), (width, height), "{name}: dimensions");
    assert_same_pixels(name, &pixels, &expected, width);
}

#[test]
fn lossy_segments_and_partitions() {
    // normal loop filter, four segments, eight partitions, B_PRED and
    // 16x16 macroblocks
    let (name, webp) = fixture!("lossy_segments_partitions");
    let decoder = WebPDecoder::new(webp).unwrap();
    assert!(decoder.is_lossy() && !decoder.has_alpha());
    check(name, webp, reference!("lossy_segments_partitions"));
}

#[test]
fn lossy_simple_upsampling() {
    let (_, webp) = fixture!("lossy_segments_partitions");
    let (expected, width, height) = reference!("lossy_segments_partitions_nofancy");

    let config = DecodeConfig::default().upsampling(UpsamplingMethod::Simple);
    let mut decoder = WebPDecoder::new_with_config(webp, config).unwrap();
    assert_eq!(decoder.dimensions(), (width, height));
    let mut pixels = vec![0; decoder.output_buffer_size().unwrap()];
    decoder.read_image(&mut pixels).unwrap();
    assert_same_pixels("nofancy", &pixels, &expected, width);

    // the two upsamplers do differ on this image
    let (fancy, _, _) = decode_rgba(webp).unwrap();
    assert_ne!(fancy, pixels);
}

#[test]
fn lossy_simple_filter_odd_size() {
    let (name, webp) = fixture!("lossy_simple_filter");
    check(name, webp, reference!("lossy_simple_filter"));
}

#[test]
fn lossy_with_compressed_alpha() {
    // VP8X + ALPH (lossless, gradient filtered) + VP8
    let (name, webp) = fixture!("lossy_alpha");
    let decoder = WebPDecoder::new(webp).unwrap();
    assert!(decoder.is_lossy() && decoder.has_alpha());
    let info = decoder.extended_info().unwrap();
    assert!(info.alpha);
    assert_eq!((info.canvas_width, info.canvas_height), (32, 24));
    check(name, webp, reference!("lossy_alpha"));
}

#[test]
fn lossless_all_transforms_cache_and_meta_codes() {
    // subtract green, predictor and cross color transforms, a 10 bit
    // color cache and three Huffman groups
    let (name, webp) = fixture!("lossless_transforms");
    let decoder = WebPDecoder::new(webp).unwrap();
    assert!(!decoder.is_lossy() && !decoder.is_extended());
    check(name, webp, reference!("lossless_transforms"));
}

#[test]
fn lossless_packed_palettes() {
    let (name, webp) = fixture!("lossless_palette_2bit");
    check(name, webp, reference!("lossless_palette_2bit"));

    // includes transparent and translucent entries
    let (name, webp) = fixture!("lossless_palette_4bit");
    check(name, webp, reference!("lossless_palette_4bit"));
}

#[test]
fn lossless_palette_with_predictor() {
    let (name, webp) = fixture!("lossless_palette_predictor");
    check(name, webp, reference!("lossless_palette_predictor"));
}
