//! Letterbox (black border) removal.
//!
//! Only horizontal bars along the top and bottom edges are detected; the
//! full width of the image is always kept.

use image::{DynamicImage, GenericImageView, RgbImage};

use super::frame::luminance;

/// Outcome of a border trim.
#[derive(Clone, Debug)]
pub struct BorderTrim {
    /// The cropped image, or the input unchanged when no border was found.
    pub image: DynamicImage,
    /// Rows removed from the top.
    pub top_rows: u32,
    /// Rows removed from the bottom.
    pub bottom_rows: u32,
}

impl BorderTrim {
    /// True when any rows were removed.
    pub fn trimmed(&self) -> bool {
        self.top_rows > 0 || self.bottom_rows > 0
    }
}

/// Fraction of pixels in each row whose luminance is strictly below `threshold`.
///
/// Fractions are `f32`, the type of the row percentage they are compared to.
pub fn row_dark_fractions(img: &RgbImage, threshold: u8) -> Vec<f32> {
    let (width, height) = img.dimensions();
    if width == 0 {
        return vec![0.0; height as usize];
    }

    img.rows()
        .map(|row| {
            let dark = row.filter(|px| luminance(px) < threshold).count();
            dark as f32 / width as f32
        })
        .collect()
}

/// Finds the first and last rows that are not predominantly dark.
///
/// Returns `(top, bottom)` row indices. `top` stays 0 and `bottom` stays
/// `height - 1` when every row is dark.
pub fn find_content_rows(dark_fractions: &[f32], row_percentage: f32) -> (usize, usize) {
    let is_content = |fraction: &f32| *fraction < row_percentage;

    let top = dark_fractions.iter().position(is_content).unwrap_or(0);
    let bottom = dark_fractions
        .iter()
        .rposition(is_content)
        .unwrap_or(dark_fractions.len().saturating_sub(1));

    (top, bottom)
}

/// Crops uniform dark rows from the top and bottom of an image.
///
/// A row counts as border when at least `row_percentage` of its pixels have a
/// luminance below `threshold`. If no content rows bound a non-empty span
/// (including a fully dark image), the image is returned unchanged.
pub fn trim_black_borders(image: &DynamicImage, threshold: u8, row_percentage: f32) -> BorderTrim {
    let (width, height) = image.dimensions();
    let unchanged = || BorderTrim {
        image: image.clone(),
        top_rows: 0,
        bottom_rows: 0,
    };

    if width == 0 || height == 0 {
        return unchanged();
    }

    let fractions = row_dark_fractions(&image.to_rgb8(), threshold);
    let (top, bottom) = find_content_rows(&fractions, row_percentage);

    if top >= bottom {
        return unchanged();
    }

    let top = top as u32;
    let bottom = bottom as u32;
    BorderTrim {
        image: image.crop_imm(0, top, width, bottom - top + 1),
        top_rows: top,
        bottom_rows: height - bottom - 1,
    }
}
