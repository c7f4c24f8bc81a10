use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use hashbrown::HashMap;
use thiserror::Error;

use super::extended::{self, WebPExtendedInfo};
use super::limits::Limits;
use super::lossless;
use super::vp8::Vp8Decoder;
use crate::slice_reader::SliceReader;

/// Errors that can occur when attempting to decode a WebP image
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// An IO error occurred while reading the file
    #[cfg(feature = "std")]
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    /// RIFF's "RIFF" signature not found or invalid
    #[error("Invalid RIFF signature: {0:x?}")]
    RiffSignatureInvalid([u8; 4]),

    /// WebP's "WEBP" signature not found or invalid
    #[error("Invalid WebP signature: {0:x?}")]
    WebpSignatureInvalid([u8; 4]),

    /// An expected chunk was missing
    #[error("An expected chunk was missing")]
    ChunkMissing,

    /// The file holds chunks that cannot be combined, such as both `VP8 ` and `VP8L`
    #[error("Inconsistent chunks")]
    InconsistentChunks,

    /// Chunk Header was incorrect or invalid in its usage
    #[error("Invalid Chunk header: {0:x?}")]
    ChunkHeaderInvalid([u8; 4]),

    /// The ALPH chunk preprocessing info flag was invalid
    #[error("Alpha chunk preprocessing flag invalid")]
    InvalidAlphaPreprocessing,

    /// Invalid compression method
    #[error("Invalid compression method")]
    InvalidCompressionMethod,

    /// Alpha chunk doesn't match the frame's size
    #[error("Alpha chunk size mismatch")]
    AlphaChunkSizeMismatch,

    /// Image is too large, either for the platform's pointer size or generally
    #[error("Image too large")]
    ImageTooLarge,

    /// The output buffer cannot hold the decoded image
    #[error("Output buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Bytes the decoded image occupies.
        needed: usize,
        /// Bytes the caller provided.
        got: usize,
    },

    /// Signature of 0x2f not found
    #[error("Invalid lossless signature: {0:x?}")]
    LosslessSignatureInvalid(u8),

    /// Version Number was not zero
    #[error("Invalid lossless version number: {0}")]
    VersionNumberInvalid(u8),

    /// Invalid color cache bits
    #[error("Invalid color cache bits: {0}")]
    InvalidColorCacheBits(u8),

    /// An invalid Huffman code was encountered
    #[error("Invalid Huffman code")]
    HuffmanError,

    /// The bitstream was somehow corrupt or ended early
    #[error("Corrupt bitstream")]
    BitStreamError,

    /// The transforms specified were invalid
    #[error("Invalid transform")]
    TransformError,

    /// VP8's `[0x9D, 0x01, 0x2A]` magic not found or invalid
    #[error("Invalid VP8 magic: {0:x?}")]
    Vp8MagicInvalid([u8; 3]),

    /// At time of writing, only the YUV colour-space encoded as `0` is specified
    #[error("Invalid VP8 color space: {0}")]
    ColorSpaceInvalid(u8),

    /// LUMA prediction mode was not recognised
    #[error("Invalid VP8 luma prediction mode: {0}")]
    LumaPredictionModeInvalid(i8),

    /// Intra-prediction mode was not recognised
    #[error("Invalid VP8 intra prediction mode: {0}")]
    IntraPredictionModeInvalid(i8),

    /// Chroma prediction mode was not recognised
    #[error("Invalid VP8 chroma prediction mode: {0}")]
    ChromaPredictionModeInvalid(i8),

    /// Inconsistent image sizes
    #[error("Inconsistent image sizes")]
    InconsistentImageSizes,

    /// The file may be valid, but this crate doesn't support decoding it.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Invalid function call or parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Memory limit exceeded
    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,

    /// Invalid chunk size
    #[error("Invalid chunk size")]
    InvalidChunkSize,
}

/// The RIFF chunks a still WebP file is built from
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq)]
pub(crate) enum WebPRiffChunk {
    RIFF,
    WEBP,
    VP8,
    VP8L,
    VP8X,
    ALPH,
    ICCP,
    EXIF,
    XMP,
    Unknown([u8; 4]),
}

impl WebPRiffChunk {
    pub(crate) const fn from_fourcc(chunk_fourcc: [u8; 4]) -> Self {
        match &chunk_fourcc {
            b"RIFF" => Self::RIFF,
            b"WEBP" => Self::WEBP,
            b"VP8 " => Self::VP8,
            b"VP8L" => Self::VP8L,
            b"VP8X" => Self::VP8X,
            b"ALPH" => Self::ALPH,
            b"ICCP" => Self::ICCP,
            b"EXIF" => Self::EXIF,
            b"XMP " => Self::XMP,
            _ => Self::Unknown(chunk_fourcc),
        }
    }

    pub(crate) const fn to_fourcc(self) -> [u8; 4] {
        match self {
            Self::RIFF => *b"RIFF",
            Self::WEBP => *b"WEBP",
            Self::VP8 => *b"VP8 ",
            Self::VP8L => *b"VP8L",
            Self::VP8X => *b"VP8X",
            Self::ALPH => *b"ALPH",
            Self::ICCP => *b"ICCP",
            Self::EXIF => *b"EXIF",
            Self::XMP => *b"XMP ",
            Self::Unknown(fourcc) => fourcc,
        }
    }
}

#[derive(Debug)]
enum ImageKind {
    Lossy,
    Lossless,
    Extended(WebPExtendedInfo),
}

/// Methods for upsampling the chroma values in lossy decoding
///
/// The chroma red and blue planes are encoded in VP8 as half the size of the luma plane
/// Therefore we need to upsample these values up to fit each pixel in the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpsamplingMethod {
    /// Fancy upsampling
    ///
    /// Does bilinear interpolation using the 4 values nearest to the pixel, weighting based on the distance
    /// from the pixel.
    #[default]
    Bilinear,
    /// Simple upsampling, just uses the closest u/v value to the pixel when upsampling
    ///
    /// Matches the -nofancy option in dwebp.
    /// Should be faster but may lead to slightly jagged edges.
    Simple,
}

/// WebP decoder configuration. Reusable across decodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeConfig {
    /// Upsampling method for lossy chroma reconstruction. Default: `Bilinear`.
    pub upsampling: UpsamplingMethod,
    /// Resource caps checked before decoding. Default: [`Limits::default`].
    pub limits: Limits,
}

impl DecodeConfig {
    /// Set the upsampling method.
    #[must_use]
    pub fn upsampling(mut self, method: UpsamplingMethod) -> Self {
        self.upsampling = method;
        self
    }

    /// Set the resource caps.
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Disable fancy upsampling.
    #[must_use]
    pub fn no_fancy_upsampling(mut self) -> Self {
        self.upsampling = UpsamplingMethod::Simple;
        self
    }
}

/// WebP still image decoder.
///
/// Parsing the container happens in [`WebPDecoder::new`]; pixels are only
/// decoded by [`WebPDecoder::read_image`].
pub struct WebPDecoder<'a> {
    r: SliceReader<'a>,

    width: u32,
    height: u32,

    kind: ImageKind,

    is_lossy: bool,
    has_alpha: bool,

    chunks: HashMap<WebPRiffChunk, Range<u64>>,

    config: DecodeConfig,
}

impl<'a> WebPDecoder<'a> {
    /// Create a new `WebPDecoder` from the data slice.
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        Self::new_with_config(data, DecodeConfig::default())
    }

    /// Create a new `WebPDecoder` from the data slice with the given configuration.
    pub fn new_with_config(data: &'a [u8], config: DecodeConfig) -> Result<Self, DecodeError> {
        config.limits.check_file_size(data.len() as u64)?;

        let mut decoder = Self {
            r: SliceReader::new(data),
            width: 0,
            height: 0,
            kind: ImageKind::Lossy,
            is_lossy: false,
            has_alpha: false,
            chunks: HashMap::new(),
            config,
        };
        decoder.read_data()?;
        decoder
            .config
            .limits
            .check_image(decoder.width, decoder.height)?;
        Ok(decoder)
    }

    fn read_data(&mut self) -> Result<(), DecodeError> {
        let mut signature = [0; 4];
        self.r.read_exact(&mut signature)?;
        if &signature != b"RIFF" {
            return Err(DecodeError::RiffSignatureInvalid(signature));
        }
        let riff_size = u64::from(self.r.read_u32_le()?);

        self.r.read_exact(&mut signature)?;
        if &signature != b"WEBP" {
            return Err(DecodeError::WebpSignatureInvalid(signature));
        }

        let first = self.read_chunks(riff_size)?;

        let has_vp8 = self.chunks.contains_key(&WebPRiffChunk::VP8);
        let has_vp8l = self.chunks.contains_key(&WebPRiffChunk::VP8L);
        match first {
            WebPRiffChunk::VP8 | WebPRiffChunk::VP8L | WebPRiffChunk::VP8X => {}
            chunk => return Err(DecodeError::ChunkHeaderInvalid(chunk.to_fourcc())),
        }
        if has_vp8 && has_vp8l {
            return Err(DecodeError::InconsistentChunks);
        }

        self.is_lossy = has_vp8;
        let (width, height, lossless_alpha) = if has_vp8 {
            let (width, height) = read_vp8_dimensions(self.chunk_data(WebPRiffChunk::VP8)?)?;
            (width, height, false)
        } else if has_vp8l {
            let header = lossless::read_header(self.chunk_data(WebPRiffChunk::VP8L)?)?;
            (
                u32::from(header.width),
                u32::from(header.height),
                header.alpha_used,
            )
        } else {
            return Err(DecodeError::ChunkMissing);
        };

        match first {
            WebPRiffChunk::VP8X => {
                let info = extended::read_extended_header(self.chunk_data(WebPRiffChunk::VP8X)?)?;
                if info.animation {
                    return Err(DecodeError::UnsupportedFeature("animation".into()));
                }
                if (info.canvas_width, info.canvas_height) != (width, height) {
                    return Err(DecodeError::InconsistentImageSizes);
                }
                if info.alpha && has_vp8 && !self.chunks.contains_key(&WebPRiffChunk::ALPH) {
                    return Err(DecodeError::ChunkMissing);
                }
                if info.icc_profile != self.chunks.contains_key(&WebPRiffChunk::ICCP)
                    || info.exif_metadata != self.chunks.contains_key(&WebPRiffChunk::EXIF)
                    || info.xmp_metadata != self.chunks.contains_key(&WebPRiffChunk::XMP)
                {
                    lwarn!("VP8X metadata flags disagree with the chunks present");
                }

                self.has_alpha = info.alpha;
                self.kind = ImageKind::Extended(info);
            }
            WebPRiffChunk::VP8 => self.kind = ImageKind::Lossy,
            _ => {
                self.has_alpha = lossless_alpha;
                self.kind = ImageKind::Lossless;
            }
        }

        self.width = width;
        self.height = height;

        ldebug!(
            "WebP {:?}: {}x{}, {}, alpha {}",
            self.kind,
            width,
            height,
            if self.is_lossy { "lossy" } else { "lossless" },
            self.has_alpha
        );

        Ok(())
    }

    /// Walks the chunks after the file header, recording the first
    /// occurrence of each. Returns the first chunk of the file.
    fn read_chunks(&mut self, riff_size: u64) -> Result<WebPRiffChunk, DecodeError> {
        let data_len = self.r.len() as u64;
        let riff_end = riff_size.saturating_add(8);
        if riff_end != data_len {
            lwarn!(
                "RIFF size {} disagrees with the input length {}",
                riff_end,
                data_len
            );
        }
        let end = riff_end.min(data_len);

        let mut first = None;
        let mut position = self.r.stream_position();
        while position + 8 <= end {
            self.r.seek_from_start(position)?;
            let (chunk, chunk_size, chunk_size_rounded) = read_chunk_header(&mut self.r)?;

            let range = position + 8..position + 8 + chunk_size;
            if range.end > data_len {
                return Err(DecodeError::InvalidChunkSize);
            }
            ltrace!("chunk {:?} at {}: {} bytes", chunk, position, chunk_size);

            first.get_or_insert(chunk);
            self.chunks.entry(chunk).or_insert(range);
            position += 8 + chunk_size_rounded;
        }

        first.ok_or(DecodeError::ChunkMissing)
    }

    fn chunk_data(&self, chunk: WebPRiffChunk) -> Result<&'a [u8], DecodeError> {
        let range = self.chunks.get(&chunk).ok_or(DecodeError::ChunkMissing)?;
        self.r
            .get_ref()
            .get(range.start as usize..range.end as usize)
            .ok_or(DecodeError::InvalidChunkSize)
    }

    fn read_chunk(
        &mut self,
        chunk: WebPRiffChunk,
        max_size: Option<u64>,
    ) -> Result<Option<Vec<u8>>, DecodeError> {
        match self.chunks.get(&chunk) {
            Some(range) => {
                if max_size.is_some_and(|max| range.end - range.start > max) {
                    return Err(DecodeError::MemoryLimitExceeded);
                }

                self.r.seek_from_start(range.start)?;
                let mut data = vec![0; (range.end - range.start) as usize];
                self.r.read_exact(&mut data)?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Returns the (width, height) of the image in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns whether the file declares an alpha channel. The output is
    /// RGBA either way.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Returns true if the image data is lossy (`VP8 `).
    pub fn is_lossy(&self) -> bool {
        self.is_lossy
    }

    /// Returns true if the file uses the extended (`VP8X`) layout.
    pub fn is_extended(&self) -> bool {
        matches!(self.kind, ImageKind::Extended(_))
    }

    /// Returns the `VP8X` header of an extended file.
    ///
    /// The flags are as declared; a flag without its chunk, or the
    /// reverse, is only logged.
    pub fn extended_info(&self) -> Option<&WebPExtendedInfo> {
        match &self.kind {
            ImageKind::Extended(info) => Some(info),
            _ => None,
        }
    }

    /// Returns true if a chunk with the given fourcc is present.
    pub fn has_chunk(&self, fourcc: [u8; 4]) -> bool {
        self.chunks
            .contains_key(&WebPRiffChunk::from_fourcc(fourcc))
    }

    /// Returns the raw bytes of the ICC profile, or None if there is no ICC profile.
    pub fn icc_profile(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        self.read_chunk(WebPRiffChunk::ICCP, self.config.limits.max_memory)
    }

    /// Returns the raw bytes of the EXIF metadata, or None if there is no EXIF metadata.
    pub fn exif_metadata(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        self.read_chunk(WebPRiffChunk::EXIF, self.config.limits.max_memory)
    }

    /// Returns the raw bytes of the XMP metadata, or None if there is no XMP metadata.
    pub fn xmp_metadata(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        self.read_chunk(WebPRiffChunk::XMP, self.config.limits.max_memory)
    }

    /// Returns the number of bytes required to store the image: four per pixel.
    pub fn output_buffer_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    /// Sets the upsampling method used when converting lossy images to RGBA.
    pub fn set_lossy_upsampling(&mut self, upsampling_method: UpsamplingMethod) {
        self.config.upsampling = upsampling_method;
    }

    /// Decodes the image into `buf` as tightly packed RGBA.
    ///
    /// Fails with `BufferTooSmall` if `buf` is shorter than
    /// `output_buffer_size()`; any bytes past that size are left untouched.
    pub fn read_image(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        let needed = self
            .output_buffer_size()
            .ok_or(DecodeError::ImageTooLarge)?;
        if buf.len() < needed {
            return Err(DecodeError::BufferTooSmall {
                needed,
                got: buf.len(),
            });
        }
        let buf = &mut buf[..needed];

        if !self.is_lossy {
            let data = self.chunk_data(WebPRiffChunk::VP8L)?;
            return lossless::decode(data, self.width, self.height, false, buf);
        }

        let data = self.chunk_data(WebPRiffChunk::VP8)?;
        let frame = Vp8Decoder::decode_frame(data)?;
        if u32::from(frame.width) != self.width || u32::from(frame.height) != self.height {
            return Err(DecodeError::InconsistentImageSizes);
        }
        frame.fill_rgba(buf, self.config.upsampling);

        if self.has_alpha {
            let alpha = self.chunk_data(WebPRiffChunk::ALPH)?;
            extended::decode_alpha(alpha, self.width, self.height, buf)?;
        }

        Ok(())
    }
}

/// Reads the dimensions from a VP8 keyframe header.
fn read_vp8_dimensions(data: &[u8]) -> Result<(u32, u32), DecodeError> {
    let mut r = SliceReader::new(data);
    let tag = r.read_u24_le()?;

    let keyframe = tag & 1 == 0;
    if !keyframe {
        return Err(DecodeError::UnsupportedFeature(
            "Non-keyframe frames".into(),
        ));
    }

    let mut magic = [0u8; 3];
    r.read_exact(&mut magic)?;
    if magic != [0x9d, 0x01, 0x2a] {
        return Err(DecodeError::Vp8MagicInvalid(magic));
    }

    let w = r.read_u16_le()?;
    let h = r.read_u16_le()?;

    let width = u32::from(w & 0x3FFF);
    let height = u32::from(h & 0x3FFF);
    if width == 0 || height == 0 {
        return Err(DecodeError::InconsistentImageSizes);
    }
    Ok((width, height))
}

pub(crate) fn read_fourcc(r: &mut SliceReader) -> Result<WebPRiffChunk, DecodeError> {
    let mut chunk_fourcc = [0; 4];
    r.read_exact(&mut chunk_fourcc)?;
    Ok(WebPRiffChunk::from_fourcc(chunk_fourcc))
}

pub(crate) fn read_chunk_header(
    r: &mut SliceReader,
) -> Result<(WebPRiffChunk, u64, u64), DecodeError> {
    let chunk = read_fourcc(r)?;
    let chunk_size = r.read_u32_le()?;
    let chunk_size_rounded = u64::from(chunk_size) + u64::from(chunk_size & 1);
    Ok((chunk, chunk_size.into(), chunk_size_rounded))
}

/// Decode WebP data to RGBA pixels.
///
/// Returns the decoded pixels and dimensions.
///
/// # Example
///
/// ```rust,no_run
/// let webp_data: &[u8] = &[]; // your WebP data
/// let (pixels, width, height) = webp_still::decode_rgba(webp_data)?;
/// # Ok::<(), webp_still::DecodeError>(())
/// ```
pub fn decode_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32), DecodeError> {
    let mut decoder = WebPDecoder::new(data)?;
    let (width, height) = decoder.dimensions();
    let output_size = decoder
        .output_buffer_size()
        .ok_or(DecodeError::ImageTooLarge)?;

    let mut output = vec![0u8; output_size];
    decoder.read_image(&mut output)?;
    Ok((output, width, height))
}

/// Decode WebP data directly into a pre-allocated RGBA buffer.
///
/// # Arguments
/// * `data` - WebP encoded data
/// * `output` - Pre-allocated output buffer (must be at least `stride_pixels * height * 4` bytes)
/// * `stride_pixels` - Row stride in pixels (must be >= width)
///
/// # Returns
/// Width and height of the decoded image.
pub fn decode_rgba_into(
    data: &[u8],
    output: &mut [u8],
    stride_pixels: u32,
) -> Result<(u32, u32), DecodeError> {
    let mut decoder = WebPDecoder::new(data)?;
    let (width, height) = decoder.dimensions();

    if stride_pixels < width {
        return Err(DecodeError::InvalidParameter(format!(
            "stride_pixels {} < width {}",
            stride_pixels, width
        )));
    }

    let stride_bytes = stride_pixels as usize * 4;
    let required = stride_bytes
        .checked_mul(height as usize)
        .ok_or(DecodeError::ImageTooLarge)?;
    if output.len() < required {
        return Err(DecodeError::BufferTooSmall {
            needed: required,
            got: output.len(),
        });
    }

    if stride_pixels == width {
        decoder.read_image(&mut output[..required])?;
        return Ok((width, height));
    }

    let output_size = decoder
        .output_buffer_size()
        .ok_or(DecodeError::ImageTooLarge)?;
    let mut temp = vec![0u8; output_size];
    decoder.read_image(&mut temp)?;

    let row_bytes = width as usize * 4;
    for (src, dst) in temp
        .chunks_exact(row_bytes)
        .zip(output.chunks_mut(stride_bytes))
    {
        dst[..row_bytes].copy_from_slice(src);
    }

    Ok((width, height))
}

/// Image information obtained from WebP data header.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Whether the image has an alpha channel.
    pub has_alpha: bool,
    /// Whether the image uses lossy compression.
    pub is_lossy: bool,
    /// Whether the file carries an ICC profile.
    pub has_icc_profile: bool,
    /// Whether the file carries EXIF metadata.
    pub has_exif: bool,
    /// Whether the file carries XMP metadata.
    pub has_xmp: bool,
    /// Bitstream format (lossy or lossless).
    pub format: BitstreamFormat,
}

impl ImageInfo {
    /// Parse image information from WebP data without decoding pixels.
    pub fn from_webp(data: &[u8]) -> Result<Self, DecodeError> {
        let decoder = WebPDecoder::new(data)?;
        let (width, height) = decoder.dimensions();
        let is_lossy = decoder.is_lossy();
        let format = if is_lossy {
            BitstreamFormat::Lossy
        } else {
            BitstreamFormat::Lossless
        };
        Ok(Self {
            width,
            height,
            has_alpha: decoder.has_alpha(),
            is_lossy,
            has_icc_profile: decoder.has_chunk(*b"ICCP"),
            has_exif: decoder.has_chunk(*b"EXIF"),
            has_xmp: decoder.has_chunk(*b"XMP "),
            format,
        })
    }
}

/// Bitstream compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum BitstreamFormat {
    /// Lossy compression (VP8).
    #[default]
    Lossy,
    /// Lossless compression (VP8L).
    Lossless,
}

impl core::fmt::Display for BitstreamFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BitstreamFormat::Lossy => f.write_str("lossy"),
            BitstreamFormat::Lossless => f.write_str("lossless"),
        }
    }
}
