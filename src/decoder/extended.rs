//! Extended file format pieces: the `VP8X` header and `ALPH` alpha planes.

use alloc::vec;
use alloc::vec::Vec;

use super::api::DecodeError;
use super::lossless;

/// Flags and canvas size from a `VP8X` chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebPExtendedInfo {
    /// The image has an alpha channel.
    pub alpha: bool,
    /// The file is animated. Such files are rejected by this decoder.
    pub animation: bool,
    /// An `ICCP` chunk is announced.
    pub icc_profile: bool,
    /// An `EXIF` chunk is announced.
    pub exif_metadata: bool,
    /// An `XMP ` chunk is announced.
    pub xmp_metadata: bool,
    /// Canvas width in pixels.
    pub canvas_width: u32,
    /// Canvas height in pixels.
    pub canvas_height: u32,
}

/// Parses the 10-byte `VP8X` payload.
pub(crate) fn read_extended_header(data: &[u8]) -> Result<WebPExtendedInfo, DecodeError> {
    let [flags, _, _, _, w0, w1, w2, h0, h1, h2, ..] = *data else {
        return Err(DecodeError::InvalidChunkSize);
    };

    let canvas_width = u32::from_le_bytes([w0, w1, w2, 0]) + 1;
    let canvas_height = u32::from_le_bytes([h0, h1, h2, 0]) + 1;

    Ok(WebPExtendedInfo {
        icc_profile: flags & 0b0010_0000 != 0,
        alpha: flags & 0b0001_0000 != 0,
        exif_metadata: flags & 0b0000_1000 != 0,
        xmp_metadata: flags & 0b0000_0100 != 0,
        animation: flags & 0b0000_0010 != 0,
        canvas_width,
        canvas_height,
    })
}

/// Spatial filter applied to the alpha plane before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilteringMethod {
    None,
    Horizontal,
    Vertical,
    Gradient,
}

/// A parsed `ALPH` chunk: the decoded, still filtered alpha values.
#[derive(Debug, Clone)]
pub(crate) struct AlphaChunk {
    /// Level reduction was applied by the encoder; decoding is unaffected.
    pub(crate) preprocessing: bool,
    pub(crate) filtering_method: FilteringMethod,
    pub(crate) data: Vec<u8>,
}

/// Reads the info byte and decodes the raw or lossless alpha payload.
pub(crate) fn read_alpha_chunk(
    chunk: &[u8],
    width: u32,
    height: u32,
) -> Result<AlphaChunk, DecodeError> {
    let (&info, payload) = chunk.split_first().ok_or(DecodeError::AlphaChunkSizeMismatch)?;

    let preprocessing = (info >> 4) & 0b11;
    let filtering = (info >> 2) & 0b11;
    let compression = info & 0b11;

    let preprocessing = match preprocessing {
        0 => false,
        1 => true,
        _ => return Err(DecodeError::InvalidAlphaPreprocessing),
    };

    let filtering_method = match filtering {
        0 => FilteringMethod::None,
        1 => FilteringMethod::Horizontal,
        2 => FilteringMethod::Vertical,
        _ => FilteringMethod::Gradient,
    };

    let num_pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(DecodeError::ImageTooLarge)?;

    let data = match compression {
        0 => {
            let raw = payload
                .get(..num_pixels)
                .ok_or(DecodeError::AlphaChunkSizeMismatch)?;
            raw.to_vec()
        }
        1 => {
            let rgba_len = num_pixels
                .checked_mul(4)
                .ok_or(DecodeError::ImageTooLarge)?;
            let mut rgba = vec![0u8; rgba_len];
            lossless::decode(payload, width, height, true, &mut rgba)?;
            // alpha lives in the green channel
            rgba.chunks_exact(4).map(|pixel| pixel[1]).collect()
        }
        _ => return Err(DecodeError::InvalidCompressionMethod),
    };

    ldebug!(
        "ALPH: compression {}, filter {:?}, preprocessing {}",
        compression,
        filtering_method,
        preprocessing
    );

    Ok(AlphaChunk {
        preprocessing,
        filtering_method,
        data,
    })
}

/// Predicted alpha of pixel (`x`, `y`) from the already reconstructed
/// alpha channel of `rgba`.
pub(crate) fn get_alpha_predictor(
    x: usize,
    y: usize,
    width: usize,
    filtering_method: FilteringMethod,
    rgba: &[u8],
) -> u8 {
    let alpha_at = |x: usize, y: usize| rgba[(y * width + x) * 4 + 3];

    match filtering_method {
        FilteringMethod::None => 0,
        _ if x == 0 && y == 0 => 0,
        FilteringMethod::Horizontal => {
            if x == 0 {
                alpha_at(x, y - 1)
            } else {
                alpha_at(x - 1, y)
            }
        }
        FilteringMethod::Vertical => {
            if y == 0 {
                alpha_at(x - 1, y)
            } else {
                alpha_at(x, y - 1)
            }
        }
        FilteringMethod::Gradient => {
            let (left, top, top_left) = if x == 0 {
                let above = alpha_at(x, y - 1);
                (above, above, above)
            } else if y == 0 {
                let left = alpha_at(x - 1, y);
                (left, left, left)
            } else {
                (alpha_at(x - 1, y), alpha_at(x, y - 1), alpha_at(x - 1, y - 1))
            };

            (i16::from(left) + i16::from(top) - i16::from(top_left)).clamp(0, 255) as u8
        }
    }
}

/// Decodes an `ALPH` chunk and writes the alpha channel of `rgba`.
///
/// `rgba` holds `width * height` pixels whose color channels are already
/// decoded; only every fourth byte is written.
pub fn decode_alpha(
    chunk: &[u8],
    width: u32,
    height: u32,
    rgba: &mut [u8],
) -> Result<(), DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InconsistentImageSizes);
    }
    let alpha_chunk = read_alpha_chunk(chunk, width, height)?;

    ltrace!(
        "alpha plane {}x{}, level reduced {}",
        width,
        height,
        alpha_chunk.preprocessing
    );

    let width = width as usize;
    let height = height as usize;
    let needed = alpha_chunk.data.len() * 4;
    if rgba.len() < needed {
        return Err(DecodeError::BufferTooSmall {
            needed,
            got: rgba.len(),
        });
    }

    for y in 0..height {
        for x in 0..width {
            let predictor =
                get_alpha_predictor(x, y, width, alpha_chunk.filtering_method, rgba);
            let index = y * width + x;
            rgba[index * 4 + 3] = predictor.wrapping_add(alpha_chunk.data[index]);
        }
    }

    Ok(())
}
