//! Resource limits.

use crate::CodecError;

/// Dimension limits for decode, config and encode requests.
///
/// All limits are optional. They are checked against header dimensions, so a
/// decode that exceeds them still parses the container once.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,
    /// Maximum image height in pixels.
    pub max_height: Option<u32>,
    /// Maximum total pixels (width x height).
    pub max_pixels: Option<u64>,
}

impl Limits {
    /// Create a new Limits with no restrictions.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    /// Check if dimensions are within limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), CodecError> {
        if let Some(max_width) = self.max_width {
            if width > max_width {
                return Err(CodecError::LimitExceeded(format!(
                    "width {width} exceeds {max_width}"
                )));
            }
        }

        if let Some(max_height) = self.max_height {
            if height > max_height {
                return Err(CodecError::LimitExceeded(format!(
                    "height {height} exceeds {max_height}"
                )));
            }
        }

        if let Some(max_pixels) = self.max_pixels {
            let pixels = u64::from(width) * u64::from(height);
            if pixels > max_pixels {
                return Err(CodecError::LimitExceeded(format!(
                    "pixel count {pixels} exceeds {max_pixels}"
                )));
            }
        }

        Ok(())
    }
}
