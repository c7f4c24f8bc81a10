//! WebP still image decoder

mod api;
pub(crate) mod arithmetic;
mod bit_reader;
pub mod extended;
mod huffman;
mod limits;
mod loop_filter;
pub mod lossless;
mod lossless_transform;
pub(crate) mod yuv;

// Public VP8 decoder module
pub mod vp8;

// Re-export public API
pub use api::{
    decode_rgba, decode_rgba_into, BitstreamFormat, DecodeConfig, DecodeError, ImageInfo,
    UpsamplingMethod, WebPDecoder,
};
pub use extended::WebPExtendedInfo;
pub use limits::Limits;
