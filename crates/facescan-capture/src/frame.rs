//! Raw camera format conversion into [`PixelBuffer`]s.

use facescan_core::{BufferError, PixelBuffer};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Packed YUYV (4:2:2) to RGB with the BT.601 studio-swing integer transform.
///
/// YUYV packs two pixels per 4 bytes: `[Y0, U, Y1, V]`.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<PixelBuffer, FrameError> {
    let expected = width as usize * height as usize * 2;
    check_len("YUYV", yuyv, expected)?;

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (u, v) = (quad[1], quad[3]);
        for y in [quad[0], quad[2]] {
            rgb.extend_from_slice(&ycbcr_to_rgb(y, u, v));
        }
    }
    Ok(PixelBuffer::new(rgb, width, height, 3)?)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clip(298 * c + 409 * e),
        clip(298 * c - 100 * d - 208 * e),
        clip(298 * c + 516 * d),
    ]
}

/// 8-bit GREY frames are copied as-is.
pub fn grey_to_grayscale(grey: &[u8], width: u32, height: u32) -> Result<PixelBuffer, FrameError> {
    let expected = width as usize * height as usize;
    check_len("GREY", grey, expected)?;
    Ok(PixelBuffer::new(grey[..expected].to_vec(), width, height, 1)?)
}

/// 16-bit little-endian grayscale, downscaled to 8 bits by keeping the high byte.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<PixelBuffer, FrameError> {
    let pixels = width as usize * height as usize;
    check_len("Y16", y16, pixels * 2)?;
    let gray = y16[..pixels * 2]
        .chunks_exact(2)
        .map(|px| (u16::from_le_bytes([px[0], px[1]]) >> 8) as u8)
        .collect();
    Ok(PixelBuffer::new(gray, width, height, 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2, .. })
        ));
    }

    #[test]
    fn test_yuyv_to_rgb_neutral_chroma() {
        // Studio-swing white and black with neutral chroma
        let rgb = yuyv_to_rgb(&[235, 128, 16, 128], 2, 1).unwrap();
        assert_eq!(rgb.channels(), 3);
        assert_eq!(rgb.pixel(0, 0), &[255, 255, 255]);
        assert_eq!(rgb.pixel(1, 0), &[0, 0, 0]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_dominant() {
        // High V (Cr) pushes red up and green down
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        let px = rgb.pixel(0, 0);
        assert!(px[0] > 200 && px[1] < 40, "{px:?}");
    }

    #[test]
    fn test_grey_copy() {
        let gray = grey_to_grayscale(&[1, 2, 3, 4, 99], 2, 2).unwrap();
        assert_eq!(gray.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_y16_high_byte() {
        // 0x1234 -> 0x12, 0xFF00 -> 0xFF
        let gray = y16_to_grayscale(&[0x34, 0x12, 0x00, 0xFF], 2, 1).unwrap();
        assert_eq!(gray.data(), &[0x12, 0xFF]);
        assert!(y16_to_grayscale(&[0x34], 1, 1).is_err());
    }
}
