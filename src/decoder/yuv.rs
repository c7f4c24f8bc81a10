//! YUV 4:2:0 to RGBA conversion.
//!
//! The chroma planes have half the luma resolution in both directions.
//! Simple upsampling hands each chroma sample to the 2x2 luma block it
//! covers. Fancy upsampling, the libwebp default, interpolates each pixel
//! from its nearest chroma sample and the neighbours in the direction of
//! the pixel, weighted 9:3:3:1. Samples past the plane edge repeat the edge.

/// Borrowed planes of a decoded frame.
///
/// Luma rows are `stride` bytes apart and chroma rows `stride / 2`; the
/// visible area is `width`×`height`.
pub(crate) struct YuvPlanes<'a> {
    pub(crate) y: &'a [u8],
    pub(crate) u: &'a [u8],
    pub(crate) v: &'a [u8],
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) stride: usize,
}

impl YuvPlanes<'_> {
    fn chroma_width(&self) -> usize {
        self.width.div_ceil(2)
    }

    fn chroma_height(&self) -> usize {
        self.height.div_ceil(2)
    }

    fn luma_row(&self, row: usize) -> &[u8] {
        &self.y[row * self.stride..][..self.width]
    }

    fn chroma_rows(&self, row: usize) -> (&[u8], &[u8]) {
        let start = row * (self.stride / 2);
        let len = self.chroma_width();
        (&self.u[start..][..len], &self.v[start..][..len])
    }
}

const YUV_FIX2: i32 = 6;

/// High half of a 16x16 bit product, as libwebp's `MultHi`.
#[inline(always)]
fn mult_hi(v: u8, coeff: u32) -> i32 {
    ((u32::from(v) * coeff) >> 8) as i32
}

#[inline(always)]
fn clip8(v: i32) -> u8 {
    (v >> YUV_FIX2).clamp(0, 255) as u8
}

/// BT.601 limited range to RGB with libwebp's 14 bit fixed point constants.
#[inline(always)]
pub(crate) fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let luma = mult_hi(y, 19077);
    [
        clip8(luma + mult_hi(v, 26149) - 14234),
        clip8(luma - mult_hi(u, 6419) - mult_hi(v, 13320) + 8708),
        clip8(luma + mult_hi(u, 33050) - 17685),
        255,
    ]
}

/// Chroma indices nearest to and next nearest to luma position `p` along
/// one axis holding `len` chroma samples.
///
/// Odd positions sit in the first half of their chroma sample and lean
/// towards the following one; even positions lean towards the previous.
#[inline]
fn chroma_taps(p: usize, len: usize) -> (usize, usize) {
    if p == 0 {
        return (0, 0);
    }
    let j = (p - 1) / 2;
    if p % 2 == 1 {
        (j, (j + 1).min(len - 1))
    } else {
        (j + 1, j)
    }
}

#[inline]
fn interpolate(near: u8, far_x: u8, far_y: u8, far_xy: u8) -> u8 {
    let sum = 9 * u16::from(near) + 3 * u16::from(far_x) + 3 * u16::from(far_y) + u16::from(far_xy);
    ((sum + 8) / 16) as u8
}

/// Converts with fancy upsampling into `out`, `width * height * 4` bytes.
pub(crate) fn fill_rgba_fancy(out: &mut [u8], planes: &YuvPlanes) {
    let chroma_width = planes.chroma_width();
    let chroma_height = planes.chroma_height();

    for (row, rgba) in out
        .chunks_exact_mut(planes.width * 4)
        .take(planes.height)
        .enumerate()
    {
        let (near_row, far_row) = chroma_taps(row, chroma_height);
        let (u_near, v_near) = planes.chroma_rows(near_row);
        let (u_far, v_far) = planes.chroma_rows(far_row);

        for (col, (pixel, &y)) in rgba
            .chunks_exact_mut(4)
            .zip(planes.luma_row(row))
            .enumerate()
        {
            let (near, far) = chroma_taps(col, chroma_width);
            let u = interpolate(u_near[near], u_near[far], u_far[near], u_far[far]);
            let v = interpolate(v_near[near], v_near[far], v_far[near], v_far[far]);
            pixel.copy_from_slice(&yuv_to_rgba(y, u, v));
        }
    }
}

/// Converts with nearest neighbour chroma into `out`, `width * height * 4` bytes.
pub(crate) fn fill_rgba_simple(out: &mut [u8], planes: &YuvPlanes) {
    for (row, rgba) in out
        .chunks_exact_mut(planes.width * 4)
        .take(planes.height)
        .enumerate()
    {
        let (u_row, v_row) = planes.chroma_rows(row / 2);
        let luma = planes.luma_row(row);

        // pairs of pixels share one chroma sample
        for (((pixels, ys), &u), &v) in rgba
            .chunks_mut(8)
            .zip(luma.chunks(2))
            .zip(u_row)
            .zip(v_row)
        {
            for (pixel, &y) in pixels.chunks_exact_mut(4).zip(ys) {
                pixel.copy_from_slice(&yuv_to_rgba(y, u, v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const Y_BUFFER: [u8; 16] = [
        77, 162, 202, 185,
        28, 13, 199, 182,
        135, 147, 164, 135,
        66, 27, 171, 130,
    ];

    const U_BUFFER: [u8; 4] = [34, 101, 123, 163];

    const V_BUFFER: [u8; 4] = [97, 167, 149, 23];

    fn grid() -> YuvPlanes<'static> {
        YuvPlanes {
            y: &Y_BUFFER,
            u: &U_BUFFER,
            v: &V_BUFFER,
            width: 4,
            height: 4,
            stride: 4,
        }
    }

    #[test]
    fn test_fancy_grid() {
        let mut rgba = [0u8; 16 * 4];
        fill_rgba_fancy(&mut rgba, &grid());

        #[rustfmt::skip]
        let upsampled_u = [
            34, 51, 84, 101,
            56, 71, 101, 117,
            101, 112, 136, 148,
            123, 133, 153, 163,
        ];

        #[rustfmt::skip]
        let upsampled_v = [
            97, 115, 150, 167,
            110, 115, 126, 131,
            136, 117, 78, 59,
            149, 118, 55, 23,
        ];

        for (i, pixel) in rgba.chunks_exact(4).enumerate() {
            let expected = yuv_to_rgba(Y_BUFFER[i], upsampled_u[i], upsampled_v[i]);
            assert_eq!(pixel, expected, "pixel {i}");
        }
    }

    #[test]
    fn test_simple_grid() {
        let mut rgba = [0u8; 16 * 4];
        fill_rgba_simple(&mut rgba, &grid());

        for (i, pixel) in rgba.chunks_exact(4).enumerate() {
            let chroma = (i / 8) * 2 + (i % 4) / 2;
            let expected = yuv_to_rgba(Y_BUFFER[i], U_BUFFER[chroma], V_BUFFER[chroma]);
            assert_eq!(pixel, expected, "pixel {i}");
        }
    }

    #[test]
    fn test_chroma_taps_at_edges() {
        // even length: the last pixel uses the last sample twice
        let taps: [_; 4] = core::array::from_fn(|p| chroma_taps(p, 2));
        assert_eq!(taps, [(0, 0), (0, 1), (1, 0), (1, 1)]);
        // odd length: the last pixel leans back
        let taps: [_; 5] = core::array::from_fn(|p| chroma_taps(p, 3));
        assert_eq!(taps, [(0, 0), (0, 1), (1, 0), (1, 2), (2, 1)]);
    }

    #[test]
    fn test_simple_upsampling_odd_width() {
        // 3x2 image in a 16 wide macroblock buffer
        let mut y = [0u8; 32];
        y[..3].copy_from_slice(&[10, 20, 30]);
        y[16..19].copy_from_slice(&[40, 50, 60]);
        let mut u = [0u8; 8];
        u[..2].copy_from_slice(&[90, 200]);
        let mut v = [0u8; 8];
        v[..2].copy_from_slice(&[100, 50]);
        let planes = YuvPlanes {
            y: &y,
            u: &u,
            v: &v,
            width: 3,
            height: 2,
            stride: 16,
        };

        let mut rgba = [0u8; 3 * 2 * 4];
        fill_rgba_simple(&mut rgba, &planes);

        assert_eq!(rgba[0..4], yuv_to_rgba(10, 90, 100));
        assert_eq!(rgba[4..8], yuv_to_rgba(20, 90, 100));
        assert_eq!(rgba[8..12], yuv_to_rgba(30, 200, 50));
        assert_eq!(rgba[12..16], yuv_to_rgba(40, 90, 100));
        assert_eq!(rgba[20..24], yuv_to_rgba(60, 200, 50));
    }

    #[test]
    fn test_single_pixel_fancy() {
        let planes = YuvPlanes {
            y: &[99],
            u: &[17],
            v: &[230],
            width: 1,
            height: 1,
            stride: 2,
        };
        let mut rgba = [0u8; 4];
        fill_rgba_fancy(&mut rgba, &planes);
        assert_eq!(rgba, yuv_to_rgba(99, 17, 230));
    }

    #[test]
    fn test_yuv_conversions() {
        assert_eq!(yuv_to_rgba(203, 40, 42), [80, 255, 40, 255]);
        assert_eq!(yuv_to_rgba(16, 128, 128), [0, 0, 0, 255]);
        assert_eq!(yuv_to_rgba(235, 128, 128), [255, 255, 255, 255]);
    }
}
