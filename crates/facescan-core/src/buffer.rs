//! Pixel buffers and luminance conversion.

use image::{DynamicImage, GrayImage, RgbImage};
use std::borrow::Cow;
use thiserror::Error;

// ITU-R BT.601 luma weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer dimensions are zero")]
    ZeroDimensions,
    #[error("buffer length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid buffer format: {channels} channels (need 1 or 3)")]
    InvalidBufferFormat { channels: u8 },
}

/// Row-major interleaved 8-bit image. Three-channel buffers are RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, BufferError> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(BufferError::ZeroDimensions);
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// A buffer where every pixel equals `pixel`; its length sets the channel count.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Result<Self, BufferError> {
        let channels = u8::try_from(pixel.len()).map_err(|_| BufferError::InvalidBufferFormat {
            channels: u8::MAX,
        })?;
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * pixel.len())
            .collect();
        Self::new(data, width, height, channels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Samples of the pixel at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let idx = (y as usize * self.width as usize + x as usize) * c;
        &self.data[idx..idx + c]
    }

    /// Fails with `InvalidBufferFormat` unless the buffer has 1 or 3 channels.
    pub fn ensure_supported(&self) -> Result<(), BufferError> {
        match self.channels {
            1 | 3 => Ok(()),
            channels => Err(BufferError::InvalidBufferFormat { channels }),
        }
    }

    /// Single-channel view of this buffer; borrows when already luminance.
    pub fn to_luminance(&self) -> Result<Cow<'_, PixelBuffer>, BufferError> {
        self.ensure_supported()?;
        if self.channels == 1 {
            return Ok(Cow::Borrowed(self));
        }
        let gray = self
            .data
            .chunks_exact(3)
            .map(|px| luminance([px[0], px[1], px[2]]))
            .collect();
        Ok(Cow::Owned(PixelBuffer {
            data: gray,
            width: self.width,
            height: self.height,
            channels: 1,
        }))
    }

    /// Convert a decoded image. Grayscale stays single-channel; everything
    /// else (including alpha formats) becomes RGB.
    pub fn from_image(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => {
                let (width, height) = gray.dimensions();
                Self {
                    data: gray.into_raw(),
                    width,
                    height,
                    channels: 1,
                }
            }
            other => {
                let rgb = other.to_rgb8();
                let (width, height) = rgb.dimensions();
                Self {
                    data: rgb.into_raw(),
                    width,
                    height,
                    channels: 3,
                }
            }
        }
    }

    pub fn to_dynamic_image(&self) -> Result<DynamicImage, BufferError> {
        let mismatch = || BufferError::LengthMismatch {
            expected: self.width as usize * self.height as usize * self.channels as usize,
            actual: self.data.len(),
        };
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(mismatch),
            3 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch),
            channels => Err(BufferError::InvalidBufferFormat { channels }),
        }
    }
}

/// BT.601 luminance of an RGB sample, rounded.
pub fn luminance(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb;
    let y = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
    ((y + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_length() {
        let err = PixelBuffer::new(vec![0; 5], 2, 2, 1).unwrap_err();
        assert_eq!(err, BufferError::LengthMismatch { expected: 4, actual: 5 });
        assert_eq!(PixelBuffer::new(vec![], 0, 2, 1).unwrap_err(), BufferError::ZeroDimensions);
    }

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance([0, 0, 0]), 0);
        assert_eq!(luminance([255, 255, 255]), 255);
        // 0.299 * 255 = 76.2
        assert_eq!(luminance([255, 0, 0]), 76);
        // 0.587 * 255 = 149.7
        assert_eq!(luminance([0, 255, 0]), 150);
        // 0.114 * 255 = 29.1
        assert_eq!(luminance([0, 0, 255]), 29);
    }

    #[test]
    fn test_to_luminance_borrows_gray() {
        let gray = PixelBuffer::filled(4, 4, &[77]).unwrap();
        assert!(matches!(gray.to_luminance().unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_to_luminance_converts_rgb() {
        let rgb = PixelBuffer::filled(3, 2, &[255, 255, 255]).unwrap();
        let gray = rgb.to_luminance().unwrap();
        assert_eq!(gray.channels(), 1);
        assert_eq!((gray.width(), gray.height()), (3, 2));
        assert!(gray.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_rejects_four_channels() {
        let rgba = PixelBuffer::filled(2, 2, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            rgba.to_luminance().unwrap_err(),
            BufferError::InvalidBufferFormat { channels: 4 }
        );
    }

    #[test]
    fn test_image_roundtrip_keeps_pixels() {
        let rgb = PixelBuffer::filled(5, 3, &[10, 20, 30]).unwrap();
        let back = PixelBuffer::from_image(rgb.to_dynamic_image().unwrap());
        assert_eq!(back, rgb);
    }

    #[test]
    fn test_pixel_access() {
        let buf = PixelBuffer::new((0..12).collect(), 2, 2, 3).unwrap();
        assert_eq!(buf.pixel(1, 1), &[9, 10, 11]);
    }
}
