//! Resource caps checked before a still image is decoded.
//!
//! Every check runs against the sizes a file *declares*, so an oversized or
//! hostile input is rejected before the output buffer is allocated.

use alloc::format;

use super::api::DecodeError;

/// Resource caps for a single decode.
///
/// All caps are optional; `None` means unlimited.
///
/// # Example
///
/// ```rust
/// use webp_still::Limits;
///
/// // Tighten the defaults for thumbnails
/// let limits = Limits::default()
///     .max_dimensions(4096, 4096)
///     .max_memory(64 * 1024 * 1024);
///
/// // Or lift every cap for trusted inputs
/// let unlimited = Limits::none();
/// # let _ = (limits, unlimited);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,

    /// Maximum image height in pixels.
    pub max_height: Option<u32>,

    /// Maximum total pixels (width * height).
    /// Bounds the output even for extreme aspect ratios.
    pub max_total_pixels: Option<u64>,

    /// Maximum input size in bytes.
    pub max_file_size: Option<u64>,

    /// Maximum bytes the decoder may allocate for one buffer: the RGBA
    /// output or a metadata payload.
    pub max_memory: Option<u64>,
}

impl Default for Limits {
    /// Defaults suitable for untrusted input.
    ///
    /// - Max dimensions: 16384 x 16384 (the VP8 and VP8L headers top out at 16383)
    /// - Max total pixels: 100 megapixels
    /// - Max file size: 100 MiB
    /// - Max memory: 1 GiB
    fn default() -> Self {
        Self {
            max_width: Some(16384),
            max_height: Some(16384),
            max_total_pixels: Some(100_000_000),
            max_file_size: Some(100 * 1024 * 1024),
            max_memory: Some(1024 * 1024 * 1024),
        }
    }
}

impl Limits {
    /// Limits with no restrictions.
    ///
    /// **Warning**: Only use this for trusted inputs!
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_total_pixels: None,
            max_file_size: None,
            max_memory: None,
        }
    }

    /// Set maximum dimensions.
    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Set maximum total pixels.
    #[must_use]
    pub fn max_total_pixels(mut self, pixels: u64) -> Self {
        self.max_total_pixels = Some(pixels);
        self
    }

    /// Set maximum input size in bytes.
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Set maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Check declared dimensions against the caps.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), DecodeError> {
        if let Some(max_w) = self.max_width {
            if width > max_w {
                return Err(DecodeError::InvalidParameter(format!(
                    "width {} exceeds limit {}",
                    width, max_w
                )));
            }
        }

        if let Some(max_h) = self.max_height {
            if height > max_h {
                return Err(DecodeError::InvalidParameter(format!(
                    "height {} exceeds limit {}",
                    height, max_h
                )));
            }
        }

        let total_pixels = u64::from(width) * u64::from(height);
        if let Some(max_pixels) = self.max_total_pixels {
            if total_pixels > max_pixels {
                return Err(DecodeError::InvalidParameter(format!(
                    "total pixels {} exceeds limit {}",
                    total_pixels, max_pixels
                )));
            }
        }

        Ok(())
    }

    /// Check the input size.
    pub fn check_file_size(&self, size: u64) -> Result<(), DecodeError> {
        if let Some(max) = self.max_file_size {
            if size > max {
                return Err(DecodeError::InvalidParameter(format!(
                    "file size {} bytes exceeds limit {} bytes",
                    size, max
                )));
            }
        }
        Ok(())
    }

    /// Check a single allocation.
    pub fn check_memory(&self, bytes: u64) -> Result<(), DecodeError> {
        match self.max_memory {
            Some(max) if bytes > max => Err(DecodeError::MemoryLimitExceeded),
            _ => Ok(()),
        }
    }

    /// Check an RGBA output of `width` x `height` against both the
    /// dimension and the memory caps.
    pub fn check_image(&self, width: u32, height: u32) -> Result<(), DecodeError> {
        self.check_dimensions(width, height)?;
        self.check_memory(u64::from(width) * u64::from(height) * 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_cover_format_maximum() {
        let limits = Limits::default();
        assert!(limits.check_dimensions(16383, 1).is_ok());
        assert!(limits.check_dimensions(16385, 1).is_err());
    }

    #[test]
    fn check_dimensions_per_axis() {
        let limits = Limits::default().max_dimensions(1000, 500);
        assert!(limits.check_dimensions(1000, 500).is_ok());
        assert!(matches!(
            limits.check_dimensions(1001, 1),
            Err(DecodeError::InvalidParameter(_))
        ));
        assert!(limits.check_dimensions(1, 501).is_err());
    }

    #[test]
    fn check_total_pixels() {
        let limits = Limits::none().max_total_pixels(1_000_000);
        assert!(limits.check_dimensions(1000, 1000).is_ok());
        assert!(limits.check_dimensions(1001, 1000).is_err());
    }

    #[test]
    fn check_image_uses_rgba_size() {
        let limits = Limits::none().max_memory(4 * 100);
        assert!(limits.check_image(10, 10).is_ok());
        assert!(matches!(
            limits.check_image(10, 11),
            Err(DecodeError::MemoryLimitExceeded)
        ));
    }

    #[test]
    fn check_file_size() {
        let limits = Limits::none().max_file_size(1024);
        assert!(limits.check_file_size(1024).is_ok());
        assert!(limits.check_file_size(1025).is_err());
    }

    #[test]
    fn no_limits() {
        let limits = Limits::none();
        assert!(limits.check_image(u32::MAX, u32::MAX).is_ok());
        assert!(limits.check_file_size(u64::MAX).is_ok());
    }
}
