//! Capture region calculation from window geometry and configured offsets.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::screenshot::CaptureError;

/// A rectangle in screen logical coordinates.
///
/// A rectangle used for capture must satisfy `left < right` and `top < bottom`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when the rectangle has a positive area.
    pub fn is_valid(&self) -> bool {
        self.left < self.right && self.top < self.bottom
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Signed insets applied to a window's outer rectangle.
///
/// Positive values shrink the capture region, negative values expand it
/// (the result is still clamped to the screen bound).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetSpec {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Computes the capture region for a window.
///
/// Left/top are clamped against the screen bound after the offset is added.
/// Right/bottom subtract the offset from the unclamped window edge and are
/// then clamped against the screen bound.
pub fn compute_region(
    window_rect: Rect,
    offsets: &OffsetSpec,
    screen_bound: Rect,
) -> Result<Rect, CaptureError> {
    let region = Rect {
        left: screen_bound
            .left
            .max(window_rect.left.saturating_add(offsets.left)),
        top: screen_bound.top.max(window_rect.top.saturating_add(offsets.top)),
        right: screen_bound
            .right
            .min(window_rect.right.saturating_sub(offsets.right)),
        bottom: screen_bound
            .bottom
            .min(window_rect.bottom.saturating_sub(offsets.bottom)),
    };

    if !region.is_valid() {
        return Err(CaptureError::InvalidRegion { region });
    }

    Ok(region)
}

/// Maps a screen-space `region` into a `width`x`height` texture whose
/// top-left pixel sits at `origin`'s top-left corner.
///
/// The result is in texture pixels and clamped to the texture. Returns `None`
/// when no pixel of the region falls inside it.
pub fn texture_crop(region: &Rect, origin: &Rect, width: u32, height: u32) -> Option<Rect> {
    let tex_width = i32::try_from(width).unwrap_or(i32::MAX);
    let tex_height = i32::try_from(height).unwrap_or(i32::MAX);

    let crop = Rect {
        left: region.left.saturating_sub(origin.left).max(0),
        top: region.top.saturating_sub(origin.top).max(0),
        right: region.right.saturating_sub(origin.left).min(tex_width),
        bottom: region.bottom.saturating_sub(origin.top).min(tex_height),
    };

    crop.is_valid().then_some(crop)
}
