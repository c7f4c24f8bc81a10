//! Inverse transforms of the VP8L lossless format.
//!
//! Pixels are stored as RGBA bytes. Every transform is undone in place, in
//! reverse of the order the bitstream declared them.

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodeError;

/// Enum for the different transform types
#[derive(Debug, Clone)]
pub(crate) enum TransformType {
    PredictorTransform {
        size_bits: u8,
        predictor_data: Vec<u8>,
    },
    ColorTransform {
        size_bits: u8,
        transform_data: Vec<u8>,
    },
    SubtractGreen,
    ColorIndexingTransform {
        table_size: u16,
        table_data: Vec<u8>,
    },
}

impl TransformType {
    /// Index of the transform kind in the bitstream's 2-bit type field.
    pub(crate) fn kind(&self) -> usize {
        match self {
            Self::PredictorTransform { .. } => 0,
            Self::ColorTransform { .. } => 1,
            Self::SubtractGreen => 2,
            Self::ColorIndexingTransform { .. } => 3,
        }
    }

    /// Undoes the transform on `image_data`, which holds `width * height` pixels
    /// after the call. For color indexing the packed input occupies a prefix.
    pub(crate) fn apply_inverse(
        &self,
        image_data: &mut [u8],
        width: usize,
        height: usize,
    ) -> Result<(), DecodeError> {
        match self {
            Self::PredictorTransform {
                size_bits,
                predictor_data,
            } => apply_predictor_transform(image_data, width, height, *size_bits, predictor_data),
            Self::ColorTransform {
                size_bits,
                transform_data,
            } => apply_color_transform(image_data, width, height, *size_bits, transform_data),
            Self::SubtractGreen => {
                apply_subtract_green_transform(image_data, width, height);
                Ok(())
            }
            Self::ColorIndexingTransform {
                table_size,
                table_data,
            } => apply_color_indexing_transform(image_data, width, height, *table_size, table_data),
        }
    }
}

/// Number of blocks of `1 << bits` needed to cover `size`.
pub(crate) fn subsample_size(size: usize, bits: u8) -> usize {
    (size + (1usize << bits) - 1) >> bits
}

fn image_len(width: usize, height: usize) -> Result<usize, DecodeError> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(4))
        .ok_or(DecodeError::ImageTooLarge)
}

#[inline(always)]
fn average2(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b)) >> 1) as u8
}

#[inline(always)]
fn clamp_add_subtract_full(a: u8, b: u8, c: u8) -> u8 {
    (i16::from(a) + i16::from(b) - i16::from(c)).clamp(0, 255) as u8
}

#[inline(always)]
fn clamp_add_subtract_half(a: u8, b: u8) -> u8 {
    let a = i16::from(a);
    (a + (a - i16::from(b)) / 2).clamp(0, 255) as u8
}

/// Adds a per-channel prediction from the left, top, top-left and top-right
/// neighbours to every byte in `start..end`.
#[inline(always)]
fn add_predicted(
    data: &mut [u8],
    start: usize,
    end: usize,
    stride: usize,
    predict: impl Fn(u8, u8, u8, u8) -> u8,
) {
    for i in start..end {
        let left = data[i - 4];
        let top = data[i - stride];
        let top_left = data[i - stride - 4];
        let top_right = data[i - stride + 4];
        data[i] = data[i].wrapping_add(predict(left, top, top_left, top_right));
    }
}

/// Predictor 11: picks left or top, whichever is closer to the gradient.
fn add_select_predicted(data: &mut [u8], start: usize, end: usize, stride: usize) {
    for i in (start..end).step_by(4) {
        let mut predict_left = 0i32;
        let mut predict_top = 0i32;
        for c in 0..4 {
            let left = i32::from(data[i + c - 4]);
            let top = i32::from(data[i + c - stride]);
            let top_left = i32::from(data[i + c - stride - 4]);
            let p = left + top - top_left;
            predict_left += (p - left).abs();
            predict_top += (p - top).abs();
        }

        let source = if predict_left < predict_top {
            i - 4
        } else {
            i - stride
        };
        for c in 0..4 {
            data[i + c] = data[i + c].wrapping_add(data[source + c]);
        }
    }
}

pub(crate) fn apply_predictor_transform(
    image_data: &mut [u8],
    width: usize,
    height: usize,
    size_bits: u8,
    predictor_data: &[u8],
) -> Result<(), DecodeError> {
    let image_len = image_len(width, height)?;
    if image_data.len() < image_len || image_len == 0 {
        return Err(DecodeError::TransformError);
    }
    let block_xsize = subsample_size(width, size_bits);
    let block_ysize = subsample_size(height, size_bits);
    if predictor_data.len() < block_xsize * block_ysize * 4 {
        return Err(DecodeError::TransformError);
    }
    let stride = width * 4;

    // top-left pixel predicts opaque black
    image_data[3] = image_data[3].wrapping_add(0xff);

    // top row predicts from the left
    for i in 4..stride {
        image_data[i] = image_data[i].wrapping_add(image_data[i - 4]);
    }

    // left column predicts from the top
    for y in 1..height {
        for c in 0..4 {
            let i = y * stride + c;
            image_data[i] = image_data[i].wrapping_add(image_data[i - stride]);
        }
    }

    for y in 1..height {
        for block_x in 0..block_xsize {
            let block_index = (y >> size_bits) * block_xsize + block_x;
            let predictor = predictor_data[block_index * 4 + 1];

            let start_x = (block_x << size_bits).max(1);
            let end_x = ((block_x + 1) << size_bits).min(width);
            if start_x >= end_x {
                continue;
            }
            let start = (y * width + start_x) * 4;
            let end = (y * width + end_x) * 4;

            match predictor {
                0 => {
                    for i in (start + 3..end).step_by(4) {
                        image_data[i] = image_data[i].wrapping_add(0xff);
                    }
                }
                1 => add_predicted(image_data, start, end, stride, |l, _, _, _| l),
                2 => add_predicted(image_data, start, end, stride, |_, t, _, _| t),
                3 => add_predicted(image_data, start, end, stride, |_, _, _, tr| tr),
                4 => add_predicted(image_data, start, end, stride, |_, _, tl, _| tl),
                5 => add_predicted(image_data, start, end, stride, |l, t, _, tr| {
                    average2(average2(l, tr), t)
                }),
                6 => add_predicted(image_data, start, end, stride, |l, _, tl, _| average2(l, tl)),
                7 => add_predicted(image_data, start, end, stride, |l, t, _, _| average2(l, t)),
                8 => add_predicted(image_data, start, end, stride, |_, t, tl, _| average2(tl, t)),
                9 => add_predicted(image_data, start, end, stride, |_, t, _, tr| average2(t, tr)),
                10 => add_predicted(image_data, start, end, stride, |l, t, tl, tr| {
                    average2(average2(l, tl), average2(t, tr))
                }),
                11 => add_select_predicted(image_data, start, end, stride),
                12 => add_predicted(image_data, start, end, stride, |l, t, tl, _| {
                    clamp_add_subtract_full(l, t, tl)
                }),
                13 => add_predicted(image_data, start, end, stride, |l, t, tl, _| {
                    clamp_add_subtract_half(average2(l, t), tl)
                }),
                // 14 and 15 leave the residuals as they are
                _ => {}
            }
        }
    }

    Ok(())
}

#[inline(always)]
fn color_transform_delta(t: i8, c: i8) -> u8 {
    ((i32::from(t) * i32::from(c)) >> 5) as u8
}

pub(crate) fn apply_color_transform(
    image_data: &mut [u8],
    width: usize,
    height: usize,
    size_bits: u8,
    transform_data: &[u8],
) -> Result<(), DecodeError> {
    let image_len = image_len(width, height)?;
    let block_xsize = subsample_size(width, size_bits);
    let block_ysize = subsample_size(height, size_bits);
    if image_data.len() < image_len || transform_data.len() < block_xsize * block_ysize * 4 {
        return Err(DecodeError::TransformError);
    }

    for (y, row) in image_data[..image_len].chunks_exact_mut(width * 4).enumerate() {
        let transform_row = &transform_data[(y >> size_bits) * block_xsize * 4..];
        for (block, multipliers) in row
            .chunks_mut(4 << size_bits)
            .zip(transform_row.chunks_exact(4))
        {
            let red_to_blue = multipliers[0] as i8;
            let green_to_blue = multipliers[1] as i8;
            let green_to_red = multipliers[2] as i8;

            for pixel in block.chunks_exact_mut(4) {
                let green = pixel[1] as i8;
                let red = pixel[0].wrapping_add(color_transform_delta(green_to_red, green));
                let blue = pixel[2]
                    .wrapping_add(color_transform_delta(green_to_blue, green))
                    .wrapping_add(color_transform_delta(red_to_blue, red as i8));
                pixel[0] = red;
                pixel[2] = blue;
            }
        }
    }

    Ok(())
}

pub(crate) fn apply_subtract_green_transform(image_data: &mut [u8], width: usize, height: usize) {
    let len = width.saturating_mul(height).saturating_mul(4).min(image_data.len());
    for pixel in image_data[..len].chunks_exact_mut(4) {
        pixel[0] = pixel[0].wrapping_add(pixel[1]);
        pixel[2] = pixel[2].wrapping_add(pixel[1]);
    }
}

/// Expands palette indices held in the green channel.
///
/// Small palettes pack several indices per pixel, so the packed image is
/// narrower than the output. Rows are expanded bottom to top: an output row
/// never starts before its packed row, so no packed row is overwritten
/// before it has been read.
pub(crate) fn apply_color_indexing_transform(
    image_data: &mut [u8],
    width: usize,
    height: usize,
    table_size: u16,
    table_data: &[u8],
) -> Result<(), DecodeError> {
    let image_len = image_len(width, height)?;
    let table_size = usize::from(table_size);
    if image_data.len() < image_len || table_data.len() < table_size * 4 {
        return Err(DecodeError::TransformError);
    }

    let lookup = |index: usize| -> [u8; 4] {
        if index < table_size {
            let entry = &table_data[index * 4..index * 4 + 4];
            [entry[0], entry[1], entry[2], entry[3]]
        } else {
            [0; 4]
        }
    };

    if table_size > 16 {
        for pixel in image_data[..image_len].chunks_exact_mut(4) {
            pixel.copy_from_slice(&lookup(usize::from(pixel[1])));
        }
        return Ok(());
    }

    let bits: u8 = match table_size {
        0..=2 => 3,
        3..=4 => 2,
        _ => 1,
    };
    let pixels_per_packed = 1usize << bits;
    let bits_per_entry = 8 / pixels_per_packed;
    let mask = (1usize << bits_per_entry) - 1;
    let packed_width = subsample_size(width, bits);

    let mut packed_row = vec![0u8; packed_width];
    for y in (0..height).rev() {
        let packed_start = y * packed_width * 4;
        for (bx, packed) in packed_row.iter_mut().enumerate() {
            *packed = image_data[packed_start + bx * 4 + 1];
        }

        let row = &mut image_data[y * width * 4..(y + 1) * width * 4];
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let packed = usize::from(packed_row[x >> bits]);
            let shift = (x & (pixels_per_packed - 1)) * bits_per_entry;
            pixel.copy_from_slice(&lookup((packed >> shift) & mask));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsample_size() {
        assert_eq!(subsample_size(1, 2), 1);
        assert_eq!(subsample_size(4, 2), 1);
        assert_eq!(subsample_size(5, 2), 2);
        assert_eq!(subsample_size(17, 3), 3);
    }

    #[test]
    fn test_subtract_green() {
        let mut data = [10, 20, 30, 40, 250, 10, 0, 1];
        apply_subtract_green_transform(&mut data, 2, 1);
        assert_eq!(data, [30, 20, 50, 40, 4, 10, 10, 1]);
    }

    #[test]
    fn test_color_transform_multipliers() {
        // green_to_red = 32 adds green, green_to_blue = -32 subtracts it,
        // red_to_blue = 0
        let transform_data = [0u8, (-32i8) as u8, 32, 255];
        let mut data = [1, 64, 100, 7];
        apply_color_transform(&mut data, 1, 1, 2, &transform_data).unwrap();
        assert_eq!(data, [65, 64, 36, 7]);

        // red_to_blue uses the already reconstructed red
        let transform_data = [64u8, 0, 32, 0];
        let mut data = [0, 16, 0, 0];
        apply_color_transform(&mut data, 1, 1, 2, &transform_data).unwrap();
        // red = 16; blue = (64 * 16) >> 5 = 32
        assert_eq!(data, [16, 16, 32, 0]);
    }

    #[test]
    fn test_predictor_edges() {
        // 2x2 image, predictor mode 0 everywhere
        let mut data = [
            1, 2, 3, 4, 1, 1, 1, 1, //
            10, 10, 10, 10, 5, 5, 5, 5,
        ];
        let predictor_data = [0, 0, 0, 0];
        apply_predictor_transform(&mut data, 2, 2, 2, &predictor_data).unwrap();
        assert_eq!(
            data,
            [
                1, 2, 3, 3, 2, 3, 4, 4, // alpha of the first pixel wraps by 255
                11, 12, 13, 13, 5, 5, 5, 4,
            ]
        );
    }

    #[test]
    fn test_predictor_modes_on_interior_pixel() {
        // 3x2 image; reconstruct pixel (1, 1) with each predictor
        let top_row = [
            10u8, 20, 30, 40, //
            50, 60, 70, 80, //
            90, 100, 110, 120,
        ];
        let expected_left = [16u8, 22, 32, 42];

        let cases: [(u8, [u8; 4]); 6] = [
            (1, expected_left),
            (2, [50, 60, 70, 80]),
            (3, [90, 100, 110, 120]),
            (4, [10, 20, 30, 40]),
            (7, [33, 41, 51, 61]),
            (12, [56, 62, 72, 82]),
        ];

        for (mode, expected) in cases {
            let mut data = [0u8; 24];
            // the top row predicts from the left, so store residuals that
            // reconstruct to `top_row`
            data[..4].copy_from_slice(&[10, 20, 30, 41]);
            data[4..8].copy_from_slice(&[40, 40, 40, 40]);
            data[8..12].copy_from_slice(&[40, 40, 40, 40]);
            // left column adds the pixel above
            data[12..16].copy_from_slice(&[6, 2, 2, 2]);

            let predictor_data = [0, mode, 0, 0];
            apply_predictor_transform(&mut data, 3, 2, 2, &predictor_data).unwrap();
            assert_eq!(data[..12], top_row, "mode {mode}");
            assert_eq!(data[12..16], expected_left, "mode {mode}");
            assert_eq!(data[16..20], expected, "mode {mode}");
        }
    }

    #[test]
    fn test_color_indexing_unpacks_two_bit_indices() {
        // 4 colour palette, 5 pixels wide: 2 packed pixels per row, 2 rows
        let table = [
            0, 0, 0, 255, //
            255, 0, 0, 255, //
            0, 255, 0, 255, //
            0, 0, 255, 255,
        ];
        let mut data = vec![0u8; 5 * 2 * 4];
        // row 0: indices 0 1 2 3 | 1
        data[1] = 0b11_10_01_00;
        data[5] = 0b01;
        // row 1: indices 3 3 3 3 | 2
        data[2 * 4 + 1] = 0b11_11_11_11;
        data[3 * 4 + 1] = 0b10;

        apply_color_indexing_transform(&mut data, 5, 2, 4, &table).unwrap();

        let colors: Vec<&[u8]> = data.chunks_exact(4).collect();
        assert_eq!(colors[0], &table[0..4]);
        assert_eq!(colors[1], &table[4..8]);
        assert_eq!(colors[2], &table[8..12]);
        assert_eq!(colors[3], &table[12..16]);
        assert_eq!(colors[4], &table[4..8]);
        for c in &colors[5..9] {
            assert_eq!(*c, &table[12..16]);
        }
        assert_eq!(colors[9], &table[8..12]);
    }

    #[test]
    fn test_color_indexing_out_of_range_is_transparent_black() {
        let table = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        // 3 entries use 2 bit indices; index 3 is out of range
        let mut data = [0, 0b11_00, 0, 0, 0, 0, 0, 0];
        apply_color_indexing_transform(&mut data, 2, 1, 3, &table).unwrap();
        assert_eq!(data, [1, 2, 3, 4, 0, 0, 0, 0]);
    }
}
