//! VP8 intra prediction
//!
//! Macroblocks are reconstructed inside a small workspace that carries a one
//! pixel border: the row above (plus four top-right pixels for luma) and the
//! column to the left. Predictors write into the workspace and residuals are
//! added on top of the prediction before the block is copied to the frame.

use super::transform;

/// Luma workspace stride
/// Layout: 1 border pixel + 16 luma pixels + 4 top-right + padding to 32
pub(crate) const LUMA_STRIDE: usize = 32;
/// Luma workspace size: 17 rows (1 border + 16) × 32 byte stride
pub(crate) const LUMA_BLOCK_SIZE: usize = LUMA_STRIDE * (1 + 16);

/// Chroma workspace stride
pub(crate) const CHROMA_STRIDE: usize = 32;
/// Chroma workspace size: 9 rows (1 border + 8) × 32 byte stride
pub(crate) const CHROMA_BLOCK_SIZE: usize = CHROMA_STRIDE * (8 + 1);

/// Value of the row above the first macroblock row.
pub(crate) const BORDER_ABOVE: u8 = 127;
/// Value of the column left of the first macroblock column.
pub(crate) const BORDER_LEFT: u8 = 129;

/// Refreshes the border of a luma workspace for macroblock (`mbx`, `mby`).
///
/// `top` is the bottom pixel row of the previous macroblock row for the whole
/// frame width, `left` holds the corner pixel followed by the 16 pixels of the
/// right column of the previous macroblock. Interior pixels are left alone,
/// they are overwritten by prediction.
pub(crate) fn update_border_luma(
    ws: &mut [u8; LUMA_BLOCK_SIZE],
    mbx: usize,
    mby: usize,
    mbw: usize,
    top: &[u8],
    left: &[u8],
) {
    let stride = LUMA_STRIDE;

    // A
    if mby == 0 {
        ws[1..stride].fill(BORDER_ABOVE);
    } else {
        ws[1..][..16].copy_from_slice(&top[mbx * 16..][..16]);

        if mbx == mbw - 1 {
            // no macroblock to the top-right, repeat the last pixel above
            let last = top[mbx * 16 + 15];
            ws[17..][..4].fill(last);
        } else {
            ws[17..][..4].copy_from_slice(&top[mbx * 16 + 16..][..4]);
        }
    }

    // Subblocks on the right edge of rows 1-3 use the same top-right pixels
    for i in 17usize..21 {
        ws[4 * stride + i] = ws[i];
        ws[8 * stride + i] = ws[i];
        ws[12 * stride + i] = ws[i];
    }

    // L
    if mbx == 0 {
        for i in 0usize..16 {
            ws[(i + 1) * stride] = BORDER_LEFT;
        }
    } else {
        for (i, &l) in (0usize..16).zip(&left[1..]) {
            ws[(i + 1) * stride] = l;
        }
    }

    // P
    ws[0] = if mby == 0 {
        BORDER_ABOVE
    } else if mbx == 0 {
        BORDER_LEFT
    } else {
        left[0]
    };
}

/// Chroma version of [`update_border_luma`]; 8x8 blocks have no top-right.
pub(crate) fn update_border_chroma(
    cb: &mut [u8; CHROMA_BLOCK_SIZE],
    mbx: usize,
    mby: usize,
    top: &[u8],
    left: &[u8],
) {
    let stride = CHROMA_STRIDE;

    if mby == 0 {
        cb[1..][..8].fill(BORDER_ABOVE);
    } else {
        cb[1..][..8].copy_from_slice(&top[mbx * 8..][..8]);
    }

    if mbx == 0 {
        for y in 0usize..8 {
            cb[(y + 1) * stride] = BORDER_LEFT;
        }
    } else {
        for (y, &l) in (0usize..8).zip(&left[1..]) {
            cb[(y + 1) * stride] = l;
        }
    }

    cb[0] = if mby == 0 {
        BORDER_ABOVE
    } else if mbx == 0 {
        BORDER_LEFT
    } else {
        left[0]
    };
}

/// Adds a 4x4 residual to the prediction at (`x0`, `y0`), clamping to [0, 255].
#[inline(always)]
pub(crate) fn add_residue(
    pblock: &mut [u8],
    rblock: &[i32; 16],
    y0: usize,
    x0: usize,
    stride: usize,
) {
    let mut pos = y0 * stride + x0;
    for row in rblock.chunks_exact(4) {
        for (p, &a) in pblock[pos..][..4].iter_mut().zip(row) {
            *p = (a + i32::from(*p)).clamp(0, 255) as u8;
        }
        pos += stride;
    }
}

/// Inverse transforms the coefficients in `rblock`, adds them to the
/// prediction and zeroes `rblock` for the next macroblock.
#[inline]
pub(crate) fn idct_add_residue_and_clear(
    pblock: &mut [u8],
    rblock: &mut [i32; 16],
    y0: usize,
    x0: usize,
    stride: usize,
) {
    if rblock[1..].iter().all(|&c| c == 0) {
        transform::idct4x4_dc(rblock);
    } else {
        transform::idct4x4(rblock);
    }
    add_residue(pblock, rblock, y0, x0, stride);
    rblock.fill(0);
}

fn avg3(left: u8, this: u8, right: u8) -> u8 {
    let avg = (u16::from(left) + 2 * u16::from(this) + u16::from(right) + 2) >> 2;
    avg as u8
}

fn avg2(this: u8, right: u8) -> u8 {
    let avg = (u16::from(this) + u16::from(right) + 1) >> 1;
    avg as u8
}

pub(crate) fn predict_vpred(a: &mut [u8], size: usize, x0: usize, y0: usize, stride: usize) {
    // copies the row above into every row of the block
    let (above, curr) = a.split_at_mut(stride * y0);
    let above_slice = &above[(y0 - 1) * stride + x0..][..size];

    for curr_chunk in curr.chunks_exact_mut(stride).take(size) {
        curr_chunk[x0..][..size].copy_from_slice(above_slice);
    }
}

pub(crate) fn predict_hpred(a: &mut [u8], size: usize, x0: usize, y0: usize, stride: usize) {
    // copies the left pixel across each row
    for chunk in a.chunks_exact_mut(stride).skip(y0).take(size) {
        let left = chunk[x0 - 1];
        chunk[x0..][..size].fill(left);
    }
}

/// DC prediction for a whole block sitting at (1, 1) of its workspace.
///
/// `above` / `left` say whether that edge is real image data; missing edges
/// are left out of the average, and with neither the block becomes 128.
pub(crate) fn predict_dcpred(a: &mut [u8], size: usize, stride: usize, above: bool, left: bool) {
    let mut sum = 0u32;
    let mut shf = if size == 8 { 2u32 } else { 3u32 };

    if left {
        for y in 0usize..size {
            sum += u32::from(a[(y + 1) * stride]);
        }
        shf += 1;
    }

    if above {
        for x in 0usize..size {
            sum += u32::from(a[1 + x]);
        }
        shf += 1;
    }

    let dcval = if !left && !above {
        128u8
    } else {
        ((sum + (1 << (shf - 1))) >> shf) as u8
    };

    for y in 0usize..size {
        a[1 + stride * (y + 1)..][..size].fill(dcval);
    }
}

pub(crate) fn predict_tmpred(a: &mut [u8], size: usize, x0: usize, y0: usize, stride: usize) {
    // X_ij = clamp(L_i + A_j - P), RFC 6386 section 12.2
    let (above, x_block) = a.split_at_mut(y0 * stride + (x0 - 1));
    let p = i32::from(above[(y0 - 1) * stride + x0 - 1]);
    let above_slice = &above[(y0 - 1) * stride + x0..];

    for y in 0usize..size {
        let left_minus_p = i32::from(x_block[y * stride]) - p;

        // skip over the left border byte
        x_block[y * stride + 1..][..size]
            .iter_mut()
            .zip(above_slice)
            .for_each(|(cur, &abv)| *cur = (left_minus_p + i32::from(abv)).clamp(0, 255) as u8);
    }
}

pub(crate) fn predict_bdcpred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let mut v = 4;

    a[(y0 - 1) * stride + x0..][..4]
        .iter()
        .for_each(|&a| v += u32::from(a));

    for i in 0usize..4 {
        v += u32::from(a[(y0 + i) * stride + x0 - 1]);
    }

    v >>= 3;
    for chunk in a.chunks_exact_mut(stride).skip(y0).take(4) {
        chunk[x0..][..4].fill(v as u8);
    }
}

fn topleft_pixel(a: &[u8], x0: usize, y0: usize, stride: usize) -> u8 {
    a[(y0 - 1) * stride + x0 - 1]
}

/// The eight pixels above a subblock, including four from the top-right.
fn top_pixels(a: &[u8], x0: usize, y0: usize, stride: usize) -> [u8; 8] {
    let pos = (y0 - 1) * stride + x0;
    let mut out = [0u8; 8];
    out.copy_from_slice(&a[pos..pos + 8]);
    out
}

fn left_pixels(a: &[u8], x0: usize, y0: usize, stride: usize) -> [u8; 4] {
    [
        a[y0 * stride + x0 - 1],
        a[(y0 + 1) * stride + x0 - 1],
        a[(y0 + 2) * stride + x0 - 1],
        a[(y0 + 3) * stride + x0 - 1],
    ]
}

/// Left column bottom-up, then the corner, then the four pixels above.
fn edge_pixels(a: &[u8], x0: usize, y0: usize, stride: usize) -> [u8; 9] {
    let pos = (y0 - 1) * stride + x0 - 1;
    [
        a[pos + 4 * stride],
        a[pos + 3 * stride],
        a[pos + 2 * stride],
        a[pos + stride],
        a[pos],
        a[pos + 1],
        a[pos + 2],
        a[pos + 3],
        a[pos + 4],
    ]
}

pub(crate) fn predict_bvepred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let p = topleft_pixel(a, x0, y0, stride);
    let [a0, a1, a2, a3, a4, ..] = top_pixels(a, x0, y0, stride);
    let avg = [
        avg3(p, a0, a1),
        avg3(a0, a1, a2),
        avg3(a1, a2, a3),
        avg3(a2, a3, a4),
    ];

    let mut pos = y0 * stride + x0;
    for _ in 0..4 {
        a[pos..pos + 4].copy_from_slice(&avg);
        pos += stride;
    }
}

pub(crate) fn predict_bhepred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let p = topleft_pixel(a, x0, y0, stride);
    let [l0, l1, l2, l3] = left_pixels(a, x0, y0, stride);

    let avgs = [
        avg3(p, l0, l1),
        avg3(l0, l1, l2),
        avg3(l1, l2, l3),
        avg3(l2, l3, l3),
    ];

    let mut pos = y0 * stride + x0;
    for avg in avgs {
        a[pos..pos + 4].fill(avg);
        pos += stride;
    }
}

pub(crate) fn predict_bldpred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let [a0, a1, a2, a3, a4, a5, a6, a7] = top_pixels(a, x0, y0, stride);

    let avgs = [
        avg3(a0, a1, a2),
        avg3(a1, a2, a3),
        avg3(a2, a3, a4),
        avg3(a3, a4, a5),
        avg3(a4, a5, a6),
        avg3(a5, a6, a7),
        avg3(a6, a7, a7),
    ];

    let mut pos = y0 * stride + x0;
    for i in 0..4 {
        a[pos..pos + 4].copy_from_slice(&avgs[i..i + 4]);
        pos += stride;
    }
}

pub(crate) fn predict_brdpred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let [e0, e1, e2, e3, e4, e5, e6, e7, e8] = edge_pixels(a, x0, y0, stride);

    let avgs = [
        avg3(e0, e1, e2),
        avg3(e1, e2, e3),
        avg3(e2, e3, e4),
        avg3(e3, e4, e5),
        avg3(e4, e5, e6),
        avg3(e5, e6, e7),
        avg3(e6, e7, e8),
    ];

    let mut pos = y0 * stride + x0;
    for i in 0..4 {
        a[pos..pos + 4].copy_from_slice(&avgs[3 - i..7 - i]);
        pos += stride;
    }
}

pub(crate) fn predict_bvrpred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let [_, e1, e2, e3, e4, e5, e6, e7, e8] = edge_pixels(a, x0, y0, stride);

    a[(y0 + 3) * stride + x0] = avg3(e1, e2, e3);
    a[(y0 + 2) * stride + x0] = avg3(e2, e3, e4);
    a[(y0 + 3) * stride + x0 + 1] = avg3(e3, e4, e5);
    a[(y0 + 1) * stride + x0] = avg3(e3, e4, e5);
    a[(y0 + 2) * stride + x0 + 1] = avg2(e4, e5);
    a[y0 * stride + x0] = avg2(e4, e5);
    a[(y0 + 3) * stride + x0 + 2] = avg3(e4, e5, e6);
    a[(y0 + 1) * stride + x0 + 1] = avg3(e4, e5, e6);
    a[(y0 + 2) * stride + x0 + 2] = avg2(e5, e6);
    a[y0 * stride + x0 + 1] = avg2(e5, e6);
    a[(y0 + 3) * stride + x0 + 3] = avg3(e5, e6, e7);
    a[(y0 + 1) * stride + x0 + 2] = avg3(e5, e6, e7);
    a[(y0 + 2) * stride + x0 + 3] = avg2(e6, e7);
    a[y0 * stride + x0 + 2] = avg2(e6, e7);
    a[(y0 + 1) * stride + x0 + 3] = avg3(e6, e7, e8);
    a[y0 * stride + x0 + 3] = avg2(e7, e8);
}

pub(crate) fn predict_bvlpred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let [a0, a1, a2, a3, a4, a5, a6, a7] = top_pixels(a, x0, y0, stride);

    a[y0 * stride + x0] = avg2(a0, a1);
    a[(y0 + 1) * stride + x0] = avg3(a0, a1, a2);
    a[(y0 + 2) * stride + x0] = avg2(a1, a2);
    a[y0 * stride + x0 + 1] = avg2(a1, a2);
    a[(y0 + 1) * stride + x0 + 1] = avg3(a1, a2, a3);
    a[(y0 + 3) * stride + x0] = avg3(a1, a2, a3);
    a[(y0 + 2) * stride + x0 + 1] = avg2(a2, a3);
    a[y0 * stride + x0 + 2] = avg2(a2, a3);
    a[(y0 + 3) * stride + x0 + 1] = avg3(a2, a3, a4);
    a[(y0 + 1) * stride + x0 + 2] = avg3(a2, a3, a4);
    a[(y0 + 2) * stride + x0 + 2] = avg2(a3, a4);
    a[y0 * stride + x0 + 3] = avg2(a3, a4);
    a[(y0 + 3) * stride + x0 + 2] = avg3(a3, a4, a5);
    a[(y0 + 1) * stride + x0 + 3] = avg3(a3, a4, a5);
    a[(y0 + 2) * stride + x0 + 3] = avg3(a4, a5, a6);
    a[(y0 + 3) * stride + x0 + 3] = avg3(a5, a6, a7);
}

pub(crate) fn predict_bhdpred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let [e0, e1, e2, e3, e4, e5, e6, e7, _] = edge_pixels(a, x0, y0, stride);

    a[(y0 + 3) * stride + x0] = avg2(e0, e1);
    a[(y0 + 3) * stride + x0 + 1] = avg3(e0, e1, e2);
    a[(y0 + 2) * stride + x0] = avg2(e1, e2);
    a[(y0 + 3) * stride + x0 + 2] = avg2(e1, e2);
    a[(y0 + 2) * stride + x0 + 1] = avg3(e1, e2, e3);
    a[(y0 + 3) * stride + x0 + 3] = avg3(e1, e2, e3);
    a[(y0 + 2) * stride + x0 + 2] = avg2(e2, e3);
    a[(y0 + 1) * stride + x0] = avg2(e2, e3);
    a[(y0 + 2) * stride + x0 + 3] = avg3(e2, e3, e4);
    a[(y0 + 1) * stride + x0 + 1] = avg3(e2, e3, e4);
    a[(y0 + 1) * stride + x0 + 2] = avg2(e3, e4);
    a[y0 * stride + x0] = avg2(e3, e4);
    a[(y0 + 1) * stride + x0 + 3] = avg3(e3, e4, e5);
    a[y0 * stride + x0 + 1] = avg3(e3, e4, e5);
    a[y0 * stride + x0 + 2] = avg3(e4, e5, e6);
    a[y0 * stride + x0 + 3] = avg3(e5, e6, e7);
}

pub(crate) fn predict_bhupred(a: &mut [u8], x0: usize, y0: usize, stride: usize) {
    let [l0, l1, l2, l3] = left_pixels(a, x0, y0, stride);

    a[y0 * stride + x0] = avg2(l0, l1);
    a[y0 * stride + x0 + 1] = avg3(l0, l1, l2);
    a[y0 * stride + x0 + 2] = avg2(l1, l2);
    a[(y0 + 1) * stride + x0] = avg2(l1, l2);
    a[y0 * stride + x0 + 3] = avg3(l1, l2, l3);
    a[(y0 + 1) * stride + x0 + 1] = avg3(l1, l2, l3);
    a[(y0 + 1) * stride + x0 + 2] = avg2(l2, l3);
    a[(y0 + 2) * stride + x0] = avg2(l2, l3);
    a[(y0 + 1) * stride + x0 + 3] = avg3(l2, l3, l3);
    a[(y0 + 2) * stride + x0 + 1] = avg3(l2, l3, l3);
    a[(y0 + 2) * stride + x0 + 2] = l3;
    a[(y0 + 2) * stride + x0 + 3] = l3;
    a[(y0 + 3) * stride + x0] = l3;
    a[(y0 + 3) * stride + x0 + 1] = l3;
    a[(y0 + 3) * stride + x0 + 2] = l3;
    a[(y0 + 3) * stride + x0 + 3] = l3;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn test_avg2() {
        for i in 0u8..=255 {
            for j in 0u8..=255 {
                let ceil_avg = (f32::from(i) + f32::from(j)) / 2.0;
                let ceil_avg = ceil_avg.ceil() as u8;
                assert_eq!(ceil_avg, avg2(i, j), "avg2({i}, {j})");
            }
        }
    }

    #[test]
    fn test_avg3() {
        for i in 0u8..=255 {
            for j in 0u8..=255 {
                for k in (0u8..=255).step_by(7) {
                    let floor_avg = (f32::from(i) + 2.0 * f32::from(j) + f32::from(k) + 2.0) / 4.0;
                    let floor_avg = floor_avg.floor() as u8;
                    assert_eq!(floor_avg, avg3(i, j, k), "avg3({i}, {j}, {k})");
                }
            }
        }
    }

    #[test]
    fn test_edge_pixels() {
        #[rustfmt::skip]
        let im = vec![5, 6, 7, 8, 9,
                      4, 0, 0, 0, 0,
                      3, 0, 0, 0, 0,
                      2, 0, 0, 0, 0,
                      1, 0, 0, 0, 0];
        assert_eq!(edge_pixels(&im, 1, 1, 5), [1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_top_pixels() {
        let mut im = vec![0u8; 64];
        im[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(top_pixels(&im, 0, 1, 8), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_add_residue() {
        let mut pblock = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let rblock = [
            -1, -2, -3, -4, 250, 249, 248, 250, -10, -18, -192, -17, -3, 15, 18, 9,
        ];
        let expected: [u8; 16] = [0, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0, 10, 29, 33, 25];

        add_residue(&mut pblock, &rblock, 0, 0, 4);

        assert_eq!(expected, pblock);
    }

    #[test]
    fn test_idct_add_residue_clears_coefficients() {
        let mut pblock = [100u8; 16];
        let mut rblock = [0i32; 16];
        rblock[0] = 80;
        idct_add_residue_and_clear(&mut pblock, &mut rblock, 0, 0, 4);
        assert_eq!(pblock, [110; 16]);
        assert_eq!(rblock, [0; 16]);
    }

    #[test]
    fn test_predict_bhepred() {
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![5, 0, 0, 0, 0,
              4, 4, 4, 4, 4,
              3, 3, 3, 3, 3,
              2, 2, 2, 2, 2,
              1, 1, 1, 1, 1];

        #[rustfmt::skip]
        let mut im = vec![5, 0, 0, 0, 0,
                      4, 0, 0, 0, 0,
                      3, 0, 0, 0, 0,
                      2, 0, 0, 0, 0,
                      1, 0, 0, 0, 0];
        predict_bhepred(&mut im, 1, 1, 5);
        assert_eq!(expected, im);
    }

    #[test]
    fn test_predict_brdpred() {
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![5, 6, 7, 8, 9,
              4, 5, 6, 7, 8,
              3, 4, 5, 6, 7,
              2, 3, 4, 5, 6,
              1, 2, 3, 4, 5];

        #[rustfmt::skip]
        let mut im = vec![5, 6, 7, 8, 9,
                      4, 0, 0, 0, 0,
                      3, 0, 0, 0, 0,
                      2, 0, 0, 0, 0,
                      1, 0, 0, 0, 0];
        predict_brdpred(&mut im, 1, 1, 5);
        assert_eq!(expected, im);
    }

    #[test]
    fn test_predict_bldpred() {
        let mut im = vec![0u8; 72];
        im[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        predict_bldpred(&mut im, 0, 1, 8);

        assert_eq!(im[8..12], [2, 3, 4, 5]);
        assert_eq!(im[16..20], [3, 4, 5, 6]);
        assert_eq!(im[24..28], [4, 5, 6, 7]);
        // the last top pixel is repeated for the bottom-right corner
        assert_eq!(im[32..36], [5, 6, 7, 8]);
    }

    #[test]
    fn test_predict_bvepred() {
        let mut im = vec![0u8; 81];
        im[..9].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);

        predict_bvepred(&mut im, 1, 1, 9);

        for row in 1..5 {
            assert_eq!(im[row * 9 + 1..row * 9 + 5], [2, 3, 4, 5], "row {row}");
        }
    }

    #[test]
    fn test_predict_bhupred() {
        #[rustfmt::skip]
        let mut im = vec![0, 0, 0, 0, 0,
                          4, 0, 0, 0, 0,
                          3, 0, 0, 0, 0,
                          2, 0, 0, 0, 0,
                          1, 0, 0, 0, 0];
        predict_bhupred(&mut im, 1, 1, 5);
        assert_eq!(im[6..10], [4, 3, 3, 2]);
        assert_eq!(im[11..15], [3, 2, 2, 1]);
        assert_eq!(im[16..20], [2, 1, 1, 1]);
        assert_eq!(im[21..25], [1, 1, 1, 1]);
    }

    #[test]
    fn test_predict_tmpred_clamps() {
        // corner 10, above 250, left 200: 200 + 250 - 10 saturates
        let stride = 5;
        let mut im = vec![0u8; 25];
        im[0] = 10;
        im[1..5].fill(250);
        for y in 1..5 {
            im[y * stride] = 200;
        }
        im[4 * stride] = 0;
        predict_tmpred(&mut im, 4, 1, 1, stride);
        assert_eq!(im[6..10], [255; 4]);
        // last row: 0 + 250 - 10
        assert_eq!(im[21..25], [240; 4]);
    }

    #[test]
    fn test_predict_dcpred_without_edges() {
        let mut ws = [7u8; CHROMA_BLOCK_SIZE];
        predict_dcpred(&mut ws, 8, CHROMA_STRIDE, false, false);
        for y in 1..9 {
            assert_eq!(ws[y * CHROMA_STRIDE + 1..][..8], [128; 8]);
        }

        let mut ws = [0u8; CHROMA_BLOCK_SIZE];
        ws[1..9].fill(100);
        predict_dcpred(&mut ws, 8, CHROMA_STRIDE, true, false);
        assert_eq!(ws[CHROMA_STRIDE + 1..][..8], [100; 8]);
    }

    #[test]
    fn test_update_border_luma_first_macroblock() {
        let mut ws = [0u8; LUMA_BLOCK_SIZE];
        update_border_luma(&mut ws, 0, 0, 1, &[], &[]);
        assert_eq!(ws[0], BORDER_ABOVE);
        assert!(ws[1..LUMA_STRIDE].iter().all(|&p| p == BORDER_ABOVE));
        for y in 1..17 {
            assert_eq!(ws[y * LUMA_STRIDE], BORDER_LEFT);
        }
        assert_eq!(ws[4 * LUMA_STRIDE + 17..][..4], [BORDER_ABOVE; 4]);
    }
}
