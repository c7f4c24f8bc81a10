//! An implementation of the VP8 Video Codec
//!
//! This module contains a partial implementation of the
//! VP8 video format as defined in RFC-6386.
//!
//! It decodes Keyframes only.
//! VP8 is the underpinning of the WebP image format
//!
//! # Related Links
//! * [rfc-6386](http://tools.ietf.org/html/rfc6386) - The VP8 Data Format and Decoding Guide
//! * [VP8.pdf](http://static.googleusercontent.com/media/research.google.com/en//pubs/archive/37073.pdf) - An overview of of the VP8 format

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::array;

use super::api::{DecodeError, UpsamplingMethod};
use super::arithmetic::{tree_nodes_from, ArithmeticDecoder, TreeNode};
use super::loop_filter;
use super::yuv;
use crate::common::prediction::*;
use crate::common::transform;
use crate::common::types::*;
use crate::slice_reader::SliceReader;

const MAX_PARTITIONS: usize = 8;

const SEGMENT_TREE_NODE_DEFAULTS: [TreeNode; 3] = tree_nodes_from(SEGMENT_ID_TREE, [255; 3]);

const KEYFRAME_YMODE_NODES: [TreeNode; 4] =
    tree_nodes_from(KEYFRAME_YMODE_TREE, KEYFRAME_YMODE_PROBS);

const KEYFRAME_BPRED_MODE_NODES: [[[TreeNode; 9]; 10]; 10] = {
    let mut output = [[[TreeNode::UNINIT; 9]; 10]; 10];
    let mut i = 0;
    while i < output.len() {
        let mut j = 0;
        while j < output[i].len() {
            output[i][j] =
                tree_nodes_from(KEYFRAME_BPRED_MODE_TREE, KEYFRAME_BPRED_MODE_PROBS[i][j]);
            j += 1;
        }
        i += 1;
    }
    output
};

const KEYFRAME_UV_MODE_NODES: [TreeNode; 3] =
    tree_nodes_from(KEYFRAME_UV_MODE_TREE, KEYFRAME_UV_MODE_PROBS);

type TokenProbTreeNodes = [[[[TreeNode; NUM_DCT_TOKENS - 1]; 3]; 8]; 4];

const COEFF_PROB_NODES: TokenProbTreeNodes = {
    let mut output = [[[[TreeNode::UNINIT; 11]; 3]; 8]; 4];
    let mut i = 0;
    while i < output.len() {
        let mut j = 0;
        while j < output[i].len() {
            let mut k = 0;
            while k < output[i][j].len() {
                output[i][j][k] = tree_nodes_from(DCT_TOKEN_TREE, COEFF_PROBS[i][j][k]);
                k += 1;
            }
            j += 1;
        }
        i += 1;
    }
    output
};

/// Per-segment quantizers and filter adjustments, Section 9.3
#[derive(Default, Clone, Copy)]
struct Segment {
    ydc: i16,
    yac: i16,

    y2dc: i16,
    y2ac: i16,

    uvdc: i16,
    uvac: i16,

    delta_values: bool,

    quantizer_level: i8,
    loopfilter_level: i8,
}

#[derive(Default, Clone, Copy)]
struct MacroBlock {
    bpred: [IntraMode; 16],
    luma_mode: LumaMode,
    chroma_mode: ChromaMode,
    segmentid: u8,
    coeffs_skipped: bool,
    non_zero_dct: bool,
}

/// Context a decoded macroblock hands to its neighbours: the bottom edge
/// for the macroblock below, the right edge for the one to its right.
#[derive(Default, Clone, Copy)]
struct PreviousMacroBlock {
    bpred: [IntraMode; 4],
    // complexity is laid out like: y2,y,y,y,y,u,u,v,v
    complexity: [u8; 9],
}

/// A Representation of the last decoded video frame
#[derive(Default, Debug, Clone)]
pub struct Frame {
    /// The width of the luma plane
    pub width: u16,

    /// The height of the luma plane
    pub height: u16,

    /// The luma plane of the frame, `buffer_width` bytes per row
    pub ybuf: Vec<u8>,

    /// The blue plane of the frame
    pub ubuf: Vec<u8>,

    /// The red plane of the frame
    pub vbuf: Vec<u8>,

    // Section 9.4 and 15
    pub(crate) filter_type: bool, //if true uses simple filter // if false uses normal filter
    pub(crate) filter_level: u8,
    pub(crate) sharpness_level: u8,
}

impl Frame {
    /// Row stride of the luma plane: the width rounded up to whole macroblocks.
    const fn buffer_width(&self) -> u16 {
        let difference = self.width % 16;
        if difference > 0 {
            self.width + (16 - difference % 16)
        } else {
            self.width
        }
    }

    /// Fills an rgba buffer from the YUV buffers. Alpha is set to 255.
    pub(crate) fn fill_rgba(&self, buf: &mut [u8], upsampling_method: UpsamplingMethod) {
        let planes = yuv::YuvPlanes {
            y: &self.ybuf,
            u: &self.ubuf,
            v: &self.vbuf,
            width: usize::from(self.width),
            height: usize::from(self.height),
            stride: usize::from(self.buffer_width()),
        };
        match upsampling_method {
            UpsamplingMethod::Bilinear => yuv::fill_rgba_fancy(buf, &planes),
            UpsamplingMethod::Simple => yuv::fill_rgba_simple(buf, &planes),
        }
    }

    /// Size in bytes of this frame converted to RGBA.
    #[must_use]
    pub fn get_buf_size(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) * 4
    }
}

/// Reads the tokens of one 4x4 block and stores the dequantized
/// coefficients at their zigzag positions in `output`.
///
/// Returns whether any token other than an immediate end-of-block was read.
fn read_coefficients(
    reader: &mut ArithmeticDecoder,
    output: &mut [i32],
    probs: &[[[TreeNode; NUM_DCT_TOKENS - 1]; 3]; 8],
    first: usize,
    complexity: usize,
    dcq: i16,
    acq: i16,
) -> Result<bool, DecodeError> {
    debug_assert!(complexity <= 2);

    let mut complexity = complexity;
    let mut has_coefficients = false;
    let mut skip = false;

    for i in first..16usize {
        let band = usize::from(COEFF_BANDS[i]);
        let tree = &probs[band][complexity];

        // after a zero the end-of-block branch is implied and skipped
        let token = reader.read_with_tree_from(tree, usize::from(skip));

        let mut abs_value = i32::from(match token {
            DCT_EOB => break,

            DCT_0 => {
                skip = true;
                has_coefficients = true;
                complexity = 0;
                continue;
            }

            literal @ DCT_1..=DCT_4 => i16::from(literal),

            category @ DCT_CAT1..=DCT_CAT6 => {
                let probs = PROB_DCT_CAT[(category - DCT_CAT1) as usize];

                let mut extra = 0i16;

                for t in probs.iter().copied() {
                    if t == 0 {
                        break;
                    }
                    let b = reader.read_bool(t);
                    extra = extra + extra + i16::from(b);
                }

                i16::from(DCT_CAT_BASE[(category - DCT_CAT1) as usize]) + extra
            }

            c => {
                lwarn!("unknown DCT token {}", c);
                return Err(DecodeError::BitStreamError);
            }
        });

        skip = false;

        complexity = if abs_value == 0 {
            0
        } else if abs_value == 1 {
            1
        } else {
            2
        };

        if reader.read_flag() {
            abs_value = -abs_value;
        }

        let zigzag = usize::from(ZIGZAG[i]);
        let q = if zigzag > 0 { acq } else { dcq };
        output[zigzag] = abs_value * i32::from(q);

        has_coefficients = true;
    }

    reader.check(has_coefficients)
}

/// VP8 Decoder
///
/// Only decodes keyframes
pub struct Vp8Decoder<'a> {
    r: SliceReader<'a>,
    b: ArithmeticDecoder,

    mbwidth: u16,
    mbheight: u16,
    macroblocks: Vec<MacroBlock>,

    frame: Frame,

    segments_enabled: bool,
    segments_update_map: bool,
    segment: [Segment; MAX_SEGMENTS],

    loop_filter_adjustments_enabled: bool,
    ref_delta: [i32; 4],
    mode_delta: [i32; 4],

    partitions: [ArithmeticDecoder; MAX_PARTITIONS],
    num_partitions: u8,

    segment_tree_nodes: [TreeNode; 3],
    token_probs: Box<TokenProbTreeNodes>,

    // Section 9.11
    prob_skip_false: Option<Prob>,

    // The borders from the previous macroblock, used for predictions
    // See Section 12
    // Note that the left border contains the top left pixel
    top_border_y: Vec<u8>,
    left_border_y: Vec<u8>,

    top_border_u: Vec<u8>,
    left_border_u: Vec<u8>,

    top_border_v: Vec<u8>,
    left_border_v: Vec<u8>,

    // Coefficients of the current macroblock: 16 luma, 4 U and 4 V blocks.
    // Kept zeroed between macroblocks, the prediction step clears what it uses.
    coeff_blocks: [[i32; 16]; 24],
}

impl<'a> Vp8Decoder<'a> {
    /// Create a new decoder.
    /// The data must be a raw vp8 bitstream
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            r: SliceReader::new(data),
            b: ArithmeticDecoder::new(),

            mbwidth: 0,
            mbheight: 0,
            macroblocks: Vec::new(),

            frame: Frame::default(),
            segments_enabled: false,
            segments_update_map: false,
            segment: array::from_fn(|_| Segment::default()),

            loop_filter_adjustments_enabled: false,
            ref_delta: [0; 4],
            mode_delta: [0; 4],

            partitions: array::from_fn(|_| ArithmeticDecoder::new()),
            num_partitions: 1,

            segment_tree_nodes: SEGMENT_TREE_NODE_DEFAULTS,
            token_probs: Box::new(COEFF_PROB_NODES),

            prob_skip_false: None,

            top_border_y: Vec::new(),
            left_border_y: Vec::new(),

            top_border_u: Vec::new(),
            left_border_u: Vec::new(),

            top_border_v: Vec::new(),
            left_border_v: Vec::new(),

            coeff_blocks: [[0i32; 16]; 24],
        }
    }

    fn update_token_probabilities(&mut self) -> Result<(), DecodeError> {
        for (i, is) in COEFF_UPDATE_PROBS.iter().enumerate() {
            for (j, js) in is.iter().enumerate() {
                for (k, ks) in js.iter().enumerate() {
                    for (t, prob) in ks.iter().enumerate().take(NUM_DCT_TOKENS - 1) {
                        if self.b.read_bool(*prob) {
                            let v = self.b.read_literal(8);
                            self.token_probs[i][j][k][t].prob = v;
                        }
                    }
                }
            }
        }
        self.b.check(())
    }

    fn init_partitions(&mut self, n: usize) -> Result<(), DecodeError> {
        use byteorder_lite::{ByteOrder, LittleEndian};

        if n > 1 {
            let sizes = self.r.take_slice(3 * n - 3)?;

            for (partition, s) in self.partitions.iter_mut().zip(sizes.chunks_exact(3)) {
                let size = LittleEndian::read_u24(s) as usize;
                let data = self.r.take_slice(size)?;
                partition.init(data);
            }
        }

        // the last partition takes the rest of the data
        let last = self.r.remaining_slice();
        self.partitions[n - 1].init(last);

        Ok(())
    }

    fn read_quantization_indices(&mut self) -> Result<(), DecodeError> {
        fn dc_quant(index: i32) -> i16 {
            DC_QUANT[index.clamp(0, 127) as usize]
        }

        fn ac_quant(index: i32) -> i16 {
            AC_QUANT[index.clamp(0, 127) as usize]
        }

        let yac_abs = self.b.read_literal(7);
        let ydc_delta = self.b.read_optional_signed_value(4);
        let y2dc_delta = self.b.read_optional_signed_value(4);
        let y2ac_delta = self.b.read_optional_signed_value(4);
        let uvdc_delta = self.b.read_optional_signed_value(4);
        let uvac_delta = self.b.read_optional_signed_value(4);

        let n = if self.segments_enabled {
            MAX_SEGMENTS
        } else {
            1
        };
        for i in 0usize..n {
            let base = i32::from(if self.segments_enabled {
                if self.segment[i].delta_values {
                    i16::from(self.segment[i].quantizer_level) + i16::from(yac_abs)
                } else {
                    i16::from(self.segment[i].quantizer_level)
                }
            } else {
                i16::from(yac_abs)
            });

            self.segment[i].ydc = dc_quant(base + ydc_delta);
            self.segment[i].yac = ac_quant(base);

            self.segment[i].y2dc = dc_quant(base + y2dc_delta) * 2;
            // The intermediate result (max`284*155`) can be larger than the `i16` range.
            self.segment[i].y2ac = (i32::from(ac_quant(base + y2ac_delta)) * 155 / 100) as i16;

            self.segment[i].uvdc = dc_quant(base + uvdc_delta);
            self.segment[i].uvac = ac_quant(base + uvac_delta);

            if self.segment[i].y2ac < 8 {
                self.segment[i].y2ac = 8;
            }

            if self.segment[i].uvdc > 132 {
                self.segment[i].uvdc = 132;
            }
        }

        self.b.check(())
    }

    fn read_loop_filter_adjustments(&mut self) -> Result<(), DecodeError> {
        if self.b.read_flag() {
            for i in 0usize..4 {
                self.ref_delta[i] = self.b.read_optional_signed_value(6);
            }

            for i in 0usize..4 {
                self.mode_delta[i] = self.b.read_optional_signed_value(6);
            }
        }

        self.b.check(())
    }

    fn read_segment_updates(&mut self) -> Result<(), DecodeError> {
        // Section 9.3
        self.segments_update_map = self.b.read_flag();
        let update_segment_feature_data = self.b.read_flag();

        if update_segment_feature_data {
            let segment_feature_mode = self.b.read_flag();

            for i in 0usize..MAX_SEGMENTS {
                self.segment[i].delta_values = !segment_feature_mode;
            }

            for i in 0usize..MAX_SEGMENTS {
                self.segment[i].quantizer_level = self.b.read_optional_signed_value(7) as i8;
            }

            for i in 0usize..MAX_SEGMENTS {
                self.segment[i].loopfilter_level = self.b.read_optional_signed_value(6) as i8;
            }
        }

        if self.segments_update_map {
            for i in 0usize..3 {
                let update = self.b.read_flag();

                let prob = if update { self.b.read_literal(8) } else { 255 };
                self.segment_tree_nodes[i].prob = prob;
            }
        }

        self.b.check(())
    }

    fn read_frame_header(&mut self) -> Result<(), DecodeError> {
        let tag = self.r.read_u24_le()?;

        let keyframe = tag & 1 == 0;
        if !keyframe {
            return Err(DecodeError::UnsupportedFeature(
                "Non-keyframe frames".into(),
            ));
        }

        let profile = (tag >> 1) & 7;
        if profile > 3 {
            lwarn!("VP8 profile {} is out of range, decoding as profile 3", profile);
        }

        let first_partition_size = tag >> 5;

        let mut tag = [0u8; 3];
        self.r.read_exact(&mut tag)?;

        if tag != [0x9d, 0x01, 0x2a] {
            return Err(DecodeError::Vp8MagicInvalid(tag));
        }

        let w = self.r.read_u16_le()?;
        let h = self.r.read_u16_le()?;

        self.frame.width = w & 0x3FFF;
        self.frame.height = h & 0x3FFF;

        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(DecodeError::InconsistentImageSizes);
        }

        self.mbwidth = self.frame.width.div_ceil(16);
        self.mbheight = self.frame.height.div_ceil(16);

        let mbw = usize::from(self.mbwidth);
        let mbh = usize::from(self.mbheight);

        self.macroblocks = Vec::with_capacity(mbw * mbh);

        self.frame.ybuf = vec![0u8; mbw * 16 * mbh * 16];
        self.frame.ubuf = vec![0u8; mbw * 8 * mbh * 8];
        self.frame.vbuf = vec![0u8; mbw * 8 * mbh * 8];

        // 16 pixels per macroblock plus the top-right of the last one
        self.top_border_y = vec![BORDER_ABOVE; mbw * 16 + 4];
        self.left_border_y = vec![BORDER_LEFT; 1 + 16];

        // 8 pixels per macroblock
        self.top_border_u = vec![BORDER_ABOVE; 8 * mbw];
        self.left_border_u = vec![BORDER_LEFT; 1 + 8];

        self.top_border_v = vec![BORDER_ABOVE; 8 * mbw];
        self.left_border_v = vec![BORDER_LEFT; 1 + 8];

        let first_partition = self.r.take_slice(first_partition_size as usize)?;

        // initialise binary decoder
        self.b.init(first_partition);

        let color_space = self.b.read_literal(1);
        // clamping type: the reconstruction always clamps
        let _ = self.b.read_literal(1);

        if color_space != 0 {
            return Err(DecodeError::ColorSpaceInvalid(color_space));
        }

        self.segments_enabled = self.b.read_flag();
        if self.segments_enabled {
            self.read_segment_updates()?;
        }

        self.frame.filter_type = self.b.read_flag();
        self.frame.filter_level = self.b.read_literal(6);
        self.frame.sharpness_level = self.b.read_literal(3);

        self.loop_filter_adjustments_enabled = self.b.read_flag();
        if self.loop_filter_adjustments_enabled {
            self.read_loop_filter_adjustments()?;
        }

        let num_partitions = 1 << self.b.read_literal(2) as usize;
        self.b.check(())?;

        self.num_partitions = num_partitions as u8;
        self.init_partitions(num_partitions)?;

        self.read_quantization_indices()?;

        // Refresh entropy probs, meaningless for a single keyframe
        let _ = self.b.read_literal(1);

        self.update_token_probabilities()?;

        let mb_no_skip_coeff = self.b.read_literal(1);
        self.prob_skip_false = if mb_no_skip_coeff == 1 {
            Some(self.b.read_literal(8))
        } else {
            None
        };
        self.b.check(())?;

        ldebug!(
            "VP8 frame {}x{}: {} partition(s), {} filter level {} sharpness {}",
            self.frame.width,
            self.frame.height,
            num_partitions,
            if self.frame.filter_type { "simple" } else { "normal" },
            self.frame.filter_level,
            self.frame.sharpness_level
        );
        Ok(())
    }

    fn read_macroblock_header(
        &mut self,
        top: &mut PreviousMacroBlock,
        left: &mut PreviousMacroBlock,
    ) -> Result<MacroBlock, DecodeError> {
        let mut mb = MacroBlock::default();

        if self.segments_enabled && self.segments_update_map {
            mb.segmentid = self.b.read_with_tree(&self.segment_tree_nodes) as u8;
        };

        mb.coeffs_skipped = if let Some(prob) = self.prob_skip_false {
            self.b.read_bool(prob)
        } else {
            false
        };

        // intra prediction
        let luma = self.b.read_with_tree(&KEYFRAME_YMODE_NODES);
        mb.luma_mode =
            LumaMode::from_i8(luma).ok_or(DecodeError::LumaPredictionModeInvalid(luma))?;

        match mb.luma_mode.into_intra() {
            // `LumaMode::B` - This is predicted individually
            None => {
                for y in 0usize..4 {
                    for x in 0usize..4 {
                        let above = top.bpred[x];
                        let before = left.bpred[y];
                        let intra = self.b.read_with_tree(
                            &KEYFRAME_BPRED_MODE_NODES[above as usize][before as usize],
                        );
                        let bmode = IntraMode::from_i8(intra)
                            .ok_or(DecodeError::IntraPredictionModeInvalid(intra))?;
                        mb.bpred[x + y * 4] = bmode;

                        top.bpred[x] = bmode;
                        left.bpred[y] = bmode;
                    }
                }
            }
            Some(mode) => {
                for i in 0usize..4 {
                    mb.bpred[12 + i] = mode;
                    left.bpred[i] = mode;
                }
            }
        }

        let chroma = self.b.read_with_tree(&KEYFRAME_UV_MODE_NODES);
        mb.chroma_mode =
            ChromaMode::from_i8(chroma).ok_or(DecodeError::ChromaPredictionModeInvalid(chroma))?;

        // top should store the bottom of the current bpred, which is the final 4 values
        top.bpred.copy_from_slice(&mb.bpred[12..]);

        self.b.check(mb)
    }

    fn intra_predict_luma(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let stride = LUMA_STRIDE;
        let mw = usize::from(self.mbwidth);
        let mut ws = [0u8; LUMA_BLOCK_SIZE];
        update_border_luma(
            &mut ws,
            mbx,
            mby,
            mw,
            &self.top_border_y,
            &self.left_border_y,
        );

        match mb.luma_mode {
            LumaMode::V => predict_vpred(&mut ws, 16, 1, 1, stride),
            LumaMode::H => predict_hpred(&mut ws, 16, 1, 1, stride),
            LumaMode::TM => predict_tmpred(&mut ws, 16, 1, 1, stride),
            LumaMode::DC => predict_dcpred(&mut ws, 16, stride, mby != 0, mbx != 0),
            LumaMode::B => {
                // each subblock predicts from the reconstructed pixels of the previous ones
                for sby in 0usize..4 {
                    for sbx in 0usize..4 {
                        let i = sbx + sby * 4;
                        let y0 = sby * 4 + 1;
                        let x0 = sbx * 4 + 1;

                        match mb.bpred[i] {
                            IntraMode::TM => predict_tmpred(&mut ws, 4, x0, y0, stride),
                            IntraMode::VE => predict_bvepred(&mut ws, x0, y0, stride),
                            IntraMode::HE => predict_bhepred(&mut ws, x0, y0, stride),
                            IntraMode::DC => predict_bdcpred(&mut ws, x0, y0, stride),
                            IntraMode::LD => predict_bldpred(&mut ws, x0, y0, stride),
                            IntraMode::RD => predict_brdpred(&mut ws, x0, y0, stride),
                            IntraMode::VR => predict_bvrpred(&mut ws, x0, y0, stride),
                            IntraMode::VL => predict_bvlpred(&mut ws, x0, y0, stride),
                            IntraMode::HD => predict_bhdpred(&mut ws, x0, y0, stride),
                            IntraMode::HU => predict_bhupred(&mut ws, x0, y0, stride),
                        }

                        add_block_residue(&mut ws, &mut self.coeff_blocks[i], y0, x0, stride);
                    }
                }
            }
        }

        if mb.luma_mode != LumaMode::B {
            for y in 0usize..4 {
                for x in 0usize..4 {
                    let i = x + y * 4;
                    let y0 = 1 + y * 4;
                    let x0 = 1 + x * 4;

                    add_block_residue(&mut ws, &mut self.coeff_blocks[i], y0, x0, stride);
                }
            }
        }

        self.left_border_y[0] = ws[16];

        for (i, left) in self.left_border_y[1..][..16].iter_mut().enumerate() {
            *left = ws[(i + 1) * stride + 16];
        }

        self.top_border_y[mbx * 16..][..16].copy_from_slice(&ws[16 * stride + 1..][..16]);

        let luma_w = mw * 16;
        for y in 0usize..16 {
            let dst_start = (mby * 16 + y) * luma_w + mbx * 16;
            let src_start = (1 + y) * stride + 1;
            self.frame.ybuf[dst_start..][..16].copy_from_slice(&ws[src_start..][..16]);
        }
    }

    fn intra_predict_chroma(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let stride = CHROMA_STRIDE;

        let mut uws = [0u8; CHROMA_BLOCK_SIZE];
        let mut vws = [0u8; CHROMA_BLOCK_SIZE];
        update_border_chroma(&mut uws, mbx, mby, &self.top_border_u, &self.left_border_u);
        update_border_chroma(&mut vws, mbx, mby, &self.top_border_v, &self.left_border_v);

        match mb.chroma_mode {
            ChromaMode::DC => {
                predict_dcpred(&mut uws, 8, stride, mby != 0, mbx != 0);
                predict_dcpred(&mut vws, 8, stride, mby != 0, mbx != 0);
            }
            ChromaMode::V => {
                predict_vpred(&mut uws, 8, 1, 1, stride);
                predict_vpred(&mut vws, 8, 1, 1, stride);
            }
            ChromaMode::H => {
                predict_hpred(&mut uws, 8, 1, 1, stride);
                predict_hpred(&mut vws, 8, 1, 1, stride);
            }
            ChromaMode::TM => {
                predict_tmpred(&mut uws, 8, 1, 1, stride);
                predict_tmpred(&mut vws, 8, 1, 1, stride);
            }
        }

        for y in 0usize..2 {
            for x in 0usize..2 {
                let i = x + y * 2;
                let y0 = 1 + y * 4;
                let x0 = 1 + x * 4;

                // U blocks at indices 16-19, V blocks at 20-23
                add_block_residue(&mut uws, &mut self.coeff_blocks[16 + i], y0, x0, stride);
                add_block_residue(&mut vws, &mut self.coeff_blocks[20 + i], y0, x0, stride);
            }
        }

        set_chroma_border(&mut self.left_border_u, &mut self.top_border_u, &uws, mbx);
        set_chroma_border(&mut self.left_border_v, &mut self.top_border_v, &vws, mbx);

        let chroma_w = usize::from(self.mbwidth) * 8;
        for y in 0usize..8 {
            let dst_start = (mby * 8 + y) * chroma_w + mbx * 8;
            let ws_index = (1 + y) * stride + 1;
            self.frame.ubuf[dst_start..][..8].copy_from_slice(&uws[ws_index..][..8]);
            self.frame.vbuf[dst_start..][..8].copy_from_slice(&vws[ws_index..][..8]);
        }
    }

    /// Reads the coefficients of every block of the macroblock into
    /// `coeff_blocks`. The inverse DCT is deferred to prediction.
    fn read_residual_data(
        &mut self,
        mb: &mut MacroBlock,
        top: &mut PreviousMacroBlock,
        left: &mut PreviousMacroBlock,
        p: usize,
    ) -> Result<(), DecodeError> {
        let segment = self.segment[usize::from(mb.segmentid)];

        let reader = &mut self.partitions[p];
        let probs = &*self.token_probs;
        let coeff_blocks = &mut self.coeff_blocks;

        let mut plane = if mb.luma_mode == LumaMode::B {
            Plane::YCoeff0
        } else {
            Plane::Y2
        };

        if plane == Plane::Y2 {
            let complexity = top.complexity[0] + left.complexity[0];
            let mut block = [0i32; 16];
            let n = read_coefficients(
                reader,
                &mut block,
                &probs[Plane::Y2 as usize],
                0,
                usize::from(complexity),
                segment.y2dc,
                segment.y2ac,
            )?;

            left.complexity[0] = u8::from(n);
            top.complexity[0] = u8::from(n);

            transform::iwht4x4(&mut block);

            for (k, &val) in block.iter().enumerate() {
                coeff_blocks[k][0] = val;
            }

            plane = Plane::YCoeff1;
        }

        let first_y = if plane == Plane::YCoeff1 { 1 } else { 0 };

        for y in 0usize..4 {
            let mut left_ctx = left.complexity[y + 1];
            for x in 0usize..4 {
                let i = x + y * 4;
                let complexity = top.complexity[x + 1] + left_ctx;

                let block = &mut coeff_blocks[i];
                let n = read_coefficients(
                    reader,
                    block,
                    &probs[plane as usize],
                    first_y,
                    usize::from(complexity),
                    segment.ydc,
                    segment.yac,
                )?;

                if block[0] != 0 || n {
                    mb.non_zero_dct = true;
                }

                left_ctx = u8::from(n);
                top.complexity[x + 1] = u8::from(n);
            }

            left.complexity[y + 1] = left_ctx;
        }

        let chroma_probs = &probs[Plane::Chroma as usize];

        for &j in &[5usize, 7usize] {
            for y in 0usize..2 {
                let mut left_ctx = left.complexity[y + j];

                for x in 0usize..2 {
                    let i = x + y * 2 + if j == 5 { 16 } else { 20 };
                    let complexity = top.complexity[x + j] + left_ctx;

                    let block = &mut coeff_blocks[i];
                    let n = read_coefficients(
                        reader,
                        block,
                        chroma_probs,
                        0,
                        usize::from(complexity),
                        segment.uvdc,
                        segment.uvac,
                    )?;

                    if block[0] != 0 || n {
                        mb.non_zero_dct = true;
                    }

                    left_ctx = u8::from(n);
                    top.complexity[x + j] = u8::from(n);
                }

                left.complexity[y + j] = left_ctx;
            }
        }

        Ok(())
    }

    /// Deblocks the edges of one reconstructed macroblock, Section 15.
    fn loop_filter(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let luma_w = usize::from(self.mbwidth) * 16;
        let chroma_w = usize::from(self.mbwidth) * 8;

        let (filter_level, interior_limit, hev_threshold) = self.calculate_filter_parameters(mb);

        if filter_level == 0 {
            return;
        }

        let mbedge_limit = (filter_level + 2) * 2 + interior_limit;
        let sub_bedge_limit = (filter_level * 2) + interior_limit;

        // subblock edges are filtered only when there is texture inside the macroblock
        let do_subblock_filtering =
            mb.luma_mode == LumaMode::B || (!mb.coeffs_skipped && mb.non_zero_dct);

        let ybuf = &mut self.frame.ybuf;
        let ubuf = &mut self.frame.ubuf;
        let vbuf = &mut self.frame.vbuf;

        // Filter across left of macroblock
        if mbx > 0 {
            if self.frame.filter_type {
                for y in 0usize..16 {
                    let y0 = mby * 16 + y;
                    let x0 = mbx * 16;
                    loop_filter::simple_segment_horizontal(
                        mbedge_limit,
                        &mut ybuf[y0 * luma_w + x0 - 4..][..8],
                    );
                }
            } else {
                for y in 0usize..16 {
                    let y0 = mby * 16 + y;
                    let x0 = mbx * 16;
                    loop_filter::macroblock_filter_horizontal(
                        hev_threshold,
                        interior_limit,
                        mbedge_limit,
                        &mut ybuf[y0 * luma_w + x0 - 4..][..8],
                    );
                }

                for y in 0usize..8 {
                    let y0 = mby * 8 + y;
                    let x0 = mbx * 8;
                    for buf in [&mut *ubuf, &mut *vbuf] {
                        loop_filter::macroblock_filter_horizontal(
                            hev_threshold,
                            interior_limit,
                            mbedge_limit,
                            &mut buf[y0 * chroma_w + x0 - 4..][..8],
                        );
                    }
                }
            }
        }

        // Filter across vertical subblocks in macroblock
        if do_subblock_filtering {
            if self.frame.filter_type {
                for x in (4usize..16 - 1).step_by(4) {
                    for y in 0usize..16 {
                        let y0 = mby * 16 + y;
                        let x0 = mbx * 16 + x;
                        loop_filter::simple_segment_horizontal(
                            sub_bedge_limit,
                            &mut ybuf[y0 * luma_w + x0 - 4..][..8],
                        );
                    }
                }
            } else {
                for x in (4usize..16 - 3).step_by(4) {
                    for y in 0usize..16 {
                        let y0 = mby * 16 + y;
                        let x0 = mbx * 16 + x;
                        loop_filter::subblock_filter_horizontal(
                            hev_threshold,
                            interior_limit,
                            sub_bedge_limit,
                            &mut ybuf[y0 * luma_w + x0 - 4..][..8],
                        );
                    }
                }

                for y in 0usize..8 {
                    let y0 = mby * 8 + y;
                    let x0 = mbx * 8 + 4;
                    for buf in [&mut *ubuf, &mut *vbuf] {
                        loop_filter::subblock_filter_horizontal(
                            hev_threshold,
                            interior_limit,
                            sub_bedge_limit,
                            &mut buf[y0 * chroma_w + x0 - 4..][..8],
                        );
                    }
                }
            }
        }

        // Filter across top of macroblock
        if mby > 0 {
            if self.frame.filter_type {
                for x in 0usize..16 {
                    let y0 = mby * 16;
                    let x0 = mbx * 16 + x;
                    loop_filter::simple_segment_vertical(
                        mbedge_limit,
                        ybuf,
                        y0 * luma_w + x0,
                        luma_w,
                    );
                }
            } else {
                for x in 0usize..16 {
                    let y0 = mby * 16;
                    let x0 = mbx * 16 + x;
                    loop_filter::macroblock_filter_vertical(
                        hev_threshold,
                        interior_limit,
                        mbedge_limit,
                        ybuf,
                        y0 * luma_w + x0,
                        luma_w,
                    );
                }

                for x in 0usize..8 {
                    let y0 = mby * 8;
                    let x0 = mbx * 8 + x;
                    for buf in [&mut *ubuf, &mut *vbuf] {
                        loop_filter::macroblock_filter_vertical(
                            hev_threshold,
                            interior_limit,
                            mbedge_limit,
                            buf,
                            y0 * chroma_w + x0,
                            chroma_w,
                        );
                    }
                }
            }
        }

        // Filter across horizontal subblock edges within the macroblock
        if do_subblock_filtering {
            if self.frame.filter_type {
                for y in (4usize..16 - 1).step_by(4) {
                    for x in 0usize..16 {
                        let y0 = mby * 16 + y;
                        let x0 = mbx * 16 + x;
                        loop_filter::simple_segment_vertical(
                            sub_bedge_limit,
                            ybuf,
                            y0 * luma_w + x0,
                            luma_w,
                        );
                    }
                }
            } else {
                for y in (4usize..16 - 3).step_by(4) {
                    for x in 0usize..16 {
                        let y0 = mby * 16 + y;
                        let x0 = mbx * 16 + x;
                        loop_filter::subblock_filter_vertical(
                            hev_threshold,
                            interior_limit,
                            sub_bedge_limit,
                            ybuf,
                            y0 * luma_w + x0,
                            luma_w,
                        );
                    }
                }

                for x in 0usize..8 {
                    let y0 = mby * 8 + 4;
                    let x0 = mbx * 8 + x;
                    for buf in [&mut *ubuf, &mut *vbuf] {
                        loop_filter::subblock_filter_vertical(
                            hev_threshold,
                            interior_limit,
                            sub_bedge_limit,
                            buf,
                            y0 * chroma_w + x0,
                            chroma_w,
                        );
                    }
                }
            }
        }
    }

    /// Returns `(filter_level, interior_limit, hev_threshold)` for a macroblock.
    fn calculate_filter_parameters(&self, macroblock: &MacroBlock) -> (u8, u8, u8) {
        let segment = &self.segment[usize::from(macroblock.segmentid)];
        let mut filter_level = i32::from(self.frame.filter_level);

        // if frame level filter level is 0, we must skip loop filter
        if filter_level == 0 {
            return (0, 0, 0);
        }

        if self.segments_enabled {
            if segment.delta_values {
                filter_level += i32::from(segment.loopfilter_level);
            } else {
                filter_level = i32::from(segment.loopfilter_level);
            }
        }

        filter_level = filter_level.clamp(0, 63);

        if self.loop_filter_adjustments_enabled {
            filter_level += self.ref_delta[0];
            if macroblock.luma_mode == LumaMode::B {
                filter_level += self.mode_delta[0];
            }
        }

        let filter_level = filter_level.clamp(0, 63) as u8;

        //interior limit
        let mut interior_limit = filter_level;

        if self.frame.sharpness_level > 0 {
            interior_limit >>= if self.frame.sharpness_level > 4 { 2 } else { 1 };

            if interior_limit > 9 - self.frame.sharpness_level {
                interior_limit = 9 - self.frame.sharpness_level;
            }
        }

        if interior_limit == 0 {
            interior_limit = 1;
        }

        // high edge variance threshold
        let hev_threshold = if filter_level >= 40 {
            2
        } else if filter_level >= 15 {
            1
        } else {
            0
        };

        (filter_level, interior_limit, hev_threshold)
    }

    /// Decodes the current frame
    pub fn decode_frame(data: &'a [u8]) -> Result<Frame, DecodeError> {
        let decoder = Self::new(data);
        decoder.decode_frame_()
    }

    fn decode_frame_(mut self) -> Result<Frame, DecodeError> {
        self.read_frame_header()?;

        // context rows: one entry per macroblock column above, one to the left
        let mut top = vec![PreviousMacroBlock::default(); usize::from(self.mbwidth)];

        for mby in 0..usize::from(self.mbheight) {
            let p = mby % usize::from(self.num_partitions);
            let mut left = PreviousMacroBlock::default();

            for (mbx, above) in top.iter_mut().enumerate() {
                let mut mb = self.read_macroblock_header(above, &mut left)?;

                if !mb.coeffs_skipped {
                    self.read_residual_data(&mut mb, above, &mut left, p)?;
                } else {
                    // coeff_blocks is already zeroed by the previous prediction step
                    let first = if mb.luma_mode == LumaMode::B { 1 } else { 0 };
                    above.complexity[first..].fill(0);
                    left.complexity[first..].fill(0);
                }

                self.intra_predict_luma(mbx, mby, &mb);
                self.intra_predict_chroma(mbx, mby, &mb);

                self.macroblocks.push(mb);
            }

            self.left_border_y.fill(BORDER_LEFT);
            self.left_border_u.fill(BORDER_LEFT);
            self.left_border_v.fill(BORDER_LEFT);
        }

        // the loop filter runs over the fully reconstructed frame
        let mbwidth = usize::from(self.mbwidth);
        let macroblocks = core::mem::take(&mut self.macroblocks);
        for (i, mb) in macroblocks.iter().enumerate() {
            self.loop_filter(i % mbwidth, i / mbwidth, mb);
        }

        Ok(self.frame)
    }
}

/// Adds the inverse transformed `block` to the prediction, leaving the
/// block zeroed. All-zero blocks leave the prediction untouched.
fn add_block_residue(ws: &mut [u8], block: &mut [i32; 16], y0: usize, x0: usize, stride: usize) {
    if block.iter().any(|&c| c != 0) {
        idct_add_residue_and_clear(ws, block, y0, x0, stride);
    }
}

// set border
fn set_chroma_border(
    left_border: &mut [u8],
    top_border: &mut [u8],
    chroma_block: &[u8],
    mbx: usize,
) {
    let stride = CHROMA_STRIDE;
    // top left is top right of previous chroma block
    left_border[0] = chroma_block[8];

    // left border
    for (i, left) in left_border[1..][..8].iter_mut().enumerate() {
        *left = chroma_block[(i + 1) * stride + 8];
    }

    for (top, &w) in top_border[mbx * 8..][..8]
        .iter_mut()
        .zip(&chroma_block[8 * stride + 1..][..8])
    {
        *top = w;
    }
}

/// Decodes a raw VP8 keyframe into `out` as tightly packed RGBA.
///
/// `width` and `height` are the dimensions the container declared; they must
/// match the frame header. Alpha is set to 255.
pub fn decode(data: &[u8], width: u32, height: u32, out: &mut [u8]) -> Result<(), DecodeError> {
    let frame = Vp8Decoder::decode_frame(data)?;
    if u32::from(frame.width) != width || u32::from(frame.height) != height {
        return Err(DecodeError::InconsistentImageSizes);
    }

    let needed = frame.get_buf_size();
    if out.len() < needed {
        return Err(DecodeError::BufferTooSmall {
            needed,
            got: out.len(),
        });
    }

    frame.fill_rgba(&mut out[..needed], UpsamplingMethod::Bilinear);
    Ok(())
}
