//! Edge filters of the VP8 in-loop deblocking filter (RFC 6386 section 15).
//!
//! Every filter looks at up to four pixels on either side of an edge. The
//! `*_vertical` functions filter a horizontal edge: the pixels of one column
//! are `stride` apart and `point` is the first pixel below the edge. The
//! `*_horizontal` functions filter a vertical edge inside one row and take
//! the eight pixels straddling it, edge between index 3 and 4.

/// Clamps to the signed 8-bit range.
#[inline]
fn c(val: i32) -> i32 {
    val.clamp(-128, 127)
}

/// Unsigned pixel to its signed representation.
#[inline]
fn u2s(val: u8) -> i32 {
    i32::from(val) - 128
}

/// Signed value back to an unsigned pixel.
#[inline]
fn s2u(val: i32) -> u8 {
    (c(val) + 128) as u8
}

#[inline]
fn diff(val1: u8, val2: u8) -> u8 {
    val1.abs_diff(val2)
}

/// Pixel `k` positions across the edge from `point`, negative is before it.
#[inline(always)]
fn px(pixels: &[u8], point: usize, stride: usize, k: isize) -> u8 {
    pixels[point.wrapping_add_signed(k * stride as isize)]
}

#[inline(always)]
fn set(pixels: &mut [u8], point: usize, stride: usize, k: isize, val: u8) {
    pixels[point.wrapping_add_signed(k * stride as isize)] = val;
}

/// Adjusts the two pixels next to the edge and returns the filter value.
fn common_adjust(use_outer_taps: bool, pixels: &mut [u8], point: usize, stride: usize) -> i32 {
    let p1 = u2s(px(pixels, point, stride, -2));
    let p0 = u2s(px(pixels, point, stride, -1));
    let q0 = u2s(px(pixels, point, stride, 0));
    let q1 = u2s(px(pixels, point, stride, 1));

    let outer = if use_outer_taps { c(p1 - q1) } else { 0 };

    let a = c(outer + 3 * (q0 - p0));

    let b = c(a + 3) >> 3;
    let a = c(a + 4) >> 3;

    set(pixels, point, stride, 0, s2u(q0 - a));
    set(pixels, point, stride, -1, s2u(p0 + b));

    a
}

fn simple_threshold(filter_limit: i32, pixels: &[u8], point: usize, stride: usize) -> bool {
    let p1 = px(pixels, point, stride, -2);
    let p0 = px(pixels, point, stride, -1);
    let q0 = px(pixels, point, stride, 0);
    let q1 = px(pixels, point, stride, 1);

    i32::from(diff(p0, q0)) * 2 + i32::from(diff(p1, q1)) / 2 <= filter_limit
}

fn should_filter(
    interior_limit: u8,
    edge_limit: u8,
    pixels: &[u8],
    point: usize,
    stride: usize,
) -> bool {
    let p = |k: isize| px(pixels, point, stride, k);

    simple_threshold(i32::from(edge_limit), pixels, point, stride)
        && diff(p(-4), p(-3)) <= interior_limit
        && diff(p(-3), p(-2)) <= interior_limit
        && diff(p(-2), p(-1)) <= interior_limit
        && diff(p(3), p(2)) <= interior_limit
        && diff(p(2), p(1)) <= interior_limit
        && diff(p(1), p(0)) <= interior_limit
}

fn high_edge_variance(threshold: u8, pixels: &[u8], point: usize, stride: usize) -> bool {
    diff(px(pixels, point, stride, -2), px(pixels, point, stride, -1)) > threshold
        || diff(px(pixels, point, stride, 1), px(pixels, point, stride, 0)) > threshold
}

fn simple_segment(edge_limit: u8, pixels: &mut [u8], point: usize, stride: usize) {
    if simple_threshold(i32::from(edge_limit), pixels, point, stride) {
        common_adjust(true, pixels, point, stride);
    }
}

fn subblock_filter(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    if should_filter(interior_limit, edge_limit, pixels, point, stride) {
        let hv = high_edge_variance(hev_threshold, pixels, point, stride);

        let a = (common_adjust(hv, pixels, point, stride) + 1) >> 1;

        if !hv {
            let q1 = u2s(px(pixels, point, stride, 1));
            let p1 = u2s(px(pixels, point, stride, -2));
            set(pixels, point, stride, 1, s2u(q1 - a));
            set(pixels, point, stride, -2, s2u(p1 + a));
        }
    }
}

fn macroblock_filter(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    if !should_filter(interior_limit, edge_limit, pixels, point, stride) {
        return;
    }

    if high_edge_variance(hev_threshold, pixels, point, stride) {
        common_adjust(true, pixels, point, stride);
        return;
    }

    let p2 = u2s(px(pixels, point, stride, -3));
    let p1 = u2s(px(pixels, point, stride, -2));
    let p0 = u2s(px(pixels, point, stride, -1));
    let q0 = u2s(px(pixels, point, stride, 0));
    let q1 = u2s(px(pixels, point, stride, 1));
    let q2 = u2s(px(pixels, point, stride, 2));

    let w = c(c(p1 - q1) + 3 * (q0 - p0));

    let a = c((27 * w + 63) >> 7);
    set(pixels, point, stride, 0, s2u(q0 - a));
    set(pixels, point, stride, -1, s2u(p0 + a));

    let a = c((18 * w + 63) >> 7);
    set(pixels, point, stride, 1, s2u(q1 - a));
    set(pixels, point, stride, -2, s2u(p1 + a));

    let a = c((9 * w + 63) >> 7);
    set(pixels, point, stride, 2, s2u(q2 - a));
    set(pixels, point, stride, -3, s2u(p2 + a));
}

pub(crate) fn simple_segment_vertical(edge_limit: u8, pixels: &mut [u8], point: usize, stride: usize) {
    simple_segment(edge_limit, pixels, point, stride);
}

pub(crate) fn simple_segment_horizontal(edge_limit: u8, pixels: &mut [u8]) {
    simple_segment(edge_limit, &mut pixels[..8], 4, 1);
}

pub(crate) fn subblock_filter_vertical(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    subblock_filter(hev_threshold, interior_limit, edge_limit, pixels, point, stride);
}

pub(crate) fn subblock_filter_horizontal(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
) {
    subblock_filter(hev_threshold, interior_limit, edge_limit, &mut pixels[..8], 4, 1);
}

pub(crate) fn macroblock_filter_vertical(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    macroblock_filter(hev_threshold, interior_limit, edge_limit, pixels, point, stride);
}

pub(crate) fn macroblock_filter_horizontal(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
) {
    macroblock_filter(hev_threshold, interior_limit, edge_limit, &mut pixels[..8], 4, 1);
}
