//! Frame buffers and pixel conversions shared by the capture pipeline.

use anyhow::{anyhow, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

/// Final output of a capture call: `Rgb8` or, when grayscale is enabled, `Luma8`.
pub type FrameBuffer = DynamicImage;

/// Raw pixels as returned by the frame grabber.
///
/// Pixels are tightly packed 8-bit BGRA, the fixed output format of the
/// Windows Graphics Capture frame pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Bytes per pixel in `data`.
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(anyhow!(
                "Raw frame size mismatch: {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Converts BGRA to an RGB image, dropping alpha.
    pub fn to_rgb(&self) -> RgbImage {
        let mut img: RgbImage = ImageBuffer::new(self.width, self.height);
        for (px, chunk) in img
            .pixels_mut()
            .zip(self.data.chunks_exact(Self::BYTES_PER_PIXEL))
        {
            *px = Rgb([chunk[2], chunk[1], chunk[0]]);
        }
        img
    }
}

/// BT.601 luma weights (0.299, 0.587, 0.114) in 14-bit fixed point.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// ITU-R BT.601 luma of an RGB pixel, rounded to the nearest integer.
///
/// The weights sum to exactly `1 << 14`, so a gray pixel `(v, v, v)` maps to `v`.
pub fn luminance(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let weighted = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
    ((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8
}

/// Converts an RGB image to single-channel BT.601 luminance.
pub fn to_luma_bt601(img: &RgbImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        output.put_pixel(x, y, Luma([luminance(pixel)]));
    }

    output
}

/// Converts a frame to grayscale. `Luma8` frames are returned as-is.
pub fn to_grayscale(frame: FrameBuffer) -> FrameBuffer {
    match frame {
        DynamicImage::ImageLuma8(_) => frame,
        other => DynamicImage::ImageLuma8(to_luma_bt601(&other.to_rgb8())),
    }
}

/// Resizes to exactly `width`x`height` with area averaging.
///
/// Shrinking averages every source pixel into the target pixel covering it.
/// Enlarging has no area to average, so it interpolates bilinearly.
pub fn resize_area(frame: &FrameBuffer, width: u32, height: u32) -> FrameBuffer {
    if frame.width() == width && frame.height() == height {
        return frame.clone();
    }

    if width <= frame.width() && height <= frame.height() {
        frame.thumbnail_exact(width, height)
    } else {
        frame.resize_exact(width, height, image::imageops::FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn test_raw_frame_bgra_to_rgb() {
        let raw = RawFrame::new(2, 1, vec![10, 20, 30, 255, 1, 2, 3, 0]).unwrap();
        let rgb = raw.to_rgb();

        assert_eq!(rgb.dimensions(), (2, 1));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([30, 20, 10]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([3, 2, 1]));
    }

    #[test]
    fn test_raw_frame_rejects_wrong_length() {
        assert!(RawFrame::new(2, 2, vec![0; 15]).is_err());
        assert!(RawFrame::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance(&Rgb([0, 0, 0])), 0);
        assert_eq!(luminance(&Rgb([255, 255, 255])), 255);
        assert_eq!(luminance(&Rgb([100, 0, 0])), 30);
        assert_eq!(luminance(&Rgb([0, 100, 0])), 59);
        assert_eq!(luminance(&Rgb([0, 0, 100])), 11);
        for v in [1u8, 29, 30, 31, 128, 254] {
            assert_eq!(luminance(&Rgb([v, v, v])), v, "gray {}", v);
        }
    }

    #[test]
    fn test_to_grayscale() {
        let img: RgbImage = ImageBuffer::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 200])
            }
        });

        let gray = to_grayscale(DynamicImage::ImageRgb8(img));
        let gray = gray.as_luma8().expect("Expected Luma8 output");

        assert_eq!(gray.dimensions(), (4, 2));
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(3, 1)[0], 23); // 0.114 * 200 = 22.8
    }

    #[test]
    fn test_resize_area_downscale_averages() {
        // 4x2 image: left half black, right half white
        let img: RgbImage = ImageBuffer::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });

        let resized = resize_area(&DynamicImage::ImageRgb8(img), 2, 1).to_rgb8();

        assert_eq!(resized.dimensions(), (2, 1));
        assert_eq!(resized.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(resized.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_resize_area_exact_dimensions() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::new(640, 360));

        assert_eq!(resize_area(&img, 320, 180).dimensions(), (320, 180));
        assert_eq!(resize_area(&img, 1280, 720).dimensions(), (1280, 720));
        assert_eq!(resize_area(&img, 800, 100).dimensions(), (800, 100));
        assert_eq!(resize_area(&img, 640, 360).dimensions(), (640, 360));
    }
}
