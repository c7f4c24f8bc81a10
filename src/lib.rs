//! Decoding of still WebP images
//!
//! This crate decodes the three payloads a still WebP file can carry: VP8
//! lossy frames, VP8L lossless images and `ALPH` alpha planes, wrapped in
//! the RIFF container. Output is always tightly packed RGBA.
//!
//! # Features
//!
//! - `std` (default): `std::error::Error` integration and an `IoError` variant.
//! - `logging` (default): container and bitstream diagnostics through the [`log`] facade.
//!
//! # no_std Support
//!
//! Decoding is fully supported in `no_std` environments (requires `alloc`):
//! ```toml
//! [dependencies]
//! webp-still = { version = "...", default-features = false }
//! ```
//!
//! All decoding functions take `&[u8]` slices directly - no Read/Seek traits required.
//!
//! # Decoding
//!
//! Use the convenience functions:
//!
//! ```rust,no_run
//! let webp_data: &[u8] = &[]; // your WebP data
//! let (pixels, width, height) = webp_still::decode_rgba(webp_data)?;
//! # Ok::<(), webp_still::DecodeError>(())
//! ```
//!
//! Or the [`WebPDecoder`] for more control:
//!
//! ```rust,no_run
//! use webp_still::{DecodeConfig, Limits, UpsamplingMethod, WebPDecoder};
//!
//! let webp_data: &[u8] = &[]; // your WebP data
//! let config = DecodeConfig::default()
//!     .upsampling(UpsamplingMethod::Simple)
//!     .limits(Limits::default().max_dimensions(4096, 4096));
//! let mut decoder = WebPDecoder::new_with_config(webp_data, config)?;
//! let (width, height) = decoder.dimensions();
//! let mut output = vec![0u8; decoder.output_buffer_size().unwrap()];
//! decoder.read_image(&mut output)?;
//! # Ok::<(), webp_still::DecodeError>(())
//! ```
//!
//! The raw bitstream decoders are exposed as [`vp8::decode`],
//! [`lossless::decode`] and [`extended::decode_alpha`] for callers that do
//! their own container parsing.
//!
//! [`log`]: https://docs.rs/log

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

#[macro_use]
mod log;

mod common;
mod decoder;

// Slice reader utility (used by the container and the VP8 header)
mod slice_reader;

// Re-export decoder public API
pub use decoder::{
    decode_rgba, decode_rgba_into, BitstreamFormat, DecodeConfig, DecodeError, ImageInfo, Limits,
    UpsamplingMethod, WebPDecoder, WebPExtendedInfo,
};

// Re-export the raw bitstream decoders
pub use decoder::{extended, lossless, vp8};
