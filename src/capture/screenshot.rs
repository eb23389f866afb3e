//! Frame capture pipeline: locate → activate → region → grab → trim → resize → grayscale.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::DynamicImage;
use std::path::{Path, PathBuf};

use super::border::trim_black_borders;
use super::frame::{resize_area, to_grayscale, FrameBuffer, RawFrame};
use super::region::{compute_region, Rect};
use super::window::{activate_window, locate_window, WindowBackend, SETTLE_DELAY};
use crate::config::CaptureConfig;

/// Errors a single capture call can produce. None of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Window not found: '{title}'")]
    WindowNotFound { title: String },

    #[error("Invalid region coordinates after applying offsets: {region}")]
    InvalidRegion { region: Rect },

    #[error("Frame grab failed: {0}")]
    GrabFailed(String),

    #[error("Window activation failed: {0}")]
    ActivationFailed(String),

    #[error("Window query failed: {0}")]
    WindowQuery(String),
}

/// Grabs raw pixels for a screen region.
pub trait FrameGrabber {
    /// Returns the BGRA pixels of `region`, or `None` if no frame was available.
    fn grab(&self, region: Rect) -> Result<Option<RawFrame>>;
}

/// Captures processed frames of the configured game window.
///
/// Every call re-resolves the window by title. Calls are blocking and not
/// synchronized; share the capturer behind a `Mutex` when more than one
/// thread captures.
pub struct FrameCapturer<W, G> {
    config: CaptureConfig,
    windows: W,
    grabber: G,
}

impl<W: WindowBackend, G: FrameGrabber> FrameCapturer<W, G> {
    pub fn new(config: CaptureConfig, windows: W, grabber: G) -> Self {
        Self {
            config,
            windows,
            grabber,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn windows(&self) -> &W {
        &self.windows
    }

    /// Captures one frame of the game window.
    pub fn capture(&self) -> Result<FrameBuffer, CaptureError> {
        let hwnd = locate_window(&self.windows, &self.config.window_title)?;
        crate::log(&format!("Window handle: {}", hwnd));

        if let Err(e) = activate_window(&self.windows, hwnd) {
            crate::log(&format!("{}", e));
        }
        std::thread::sleep(SETTLE_DELAY);

        let window_rect = self
            .windows
            .window_rect(hwnd)
            .map_err(|e| CaptureError::WindowQuery(format!("window rect: {}", e)))?;
        let screen_bound = self
            .windows
            .screen_bound(hwnd)
            .map_err(|e| CaptureError::WindowQuery(format!("screen bound: {}", e)))?;

        let offsets = &self.config.offsets;
        crate::log(&format!(
            "Offsets: left={}, top={}, right={}, bottom={}",
            offsets.left, offsets.top, offsets.right, offsets.bottom
        ));
        let region = compute_region(window_rect, offsets, screen_bound)?;
        crate::log(&format!("Capture region: {}", region));

        let raw = match self.grabber.grab(region) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => {
                return Err(CaptureError::GrabFailed(
                    "no frame data returned".to_string(),
                ));
            }
            Err(e) => return Err(CaptureError::GrabFailed(e.to_string())),
        };

        Ok(self.process(DynamicImage::ImageRgb8(raw.to_rgb())))
    }

    /// Applies border trimming, resizing, and grayscale conversion.
    pub fn process(&self, frame: FrameBuffer) -> FrameBuffer {
        let trim = trim_black_borders(
            &frame,
            self.config.black_threshold,
            self.config.black_percentage,
        );
        if trim.trimmed() {
            crate::log(&format!(
                "Removed black borders: top {} rows, bottom {} rows",
                trim.top_rows, trim.bottom_rows
            ));
        } else {
            crate::log("No black border detected (or image is entirely dark)");
        }

        let mut frame = trim.image;

        if let Some(size) = self.config.output_size {
            frame = resize_area(&frame, size.width, size.height);
        }

        if self.config.grayscale {
            frame = to_grayscale(frame);
        }

        frame
    }
}

/// Builds a frame file name: `<prefix>_<YYYYMMDD-HHMMSS>.<ext>`.
pub fn frame_file_name(prefix: &str, ext: &str, timestamp: DateTime<Local>) -> String {
    format!("{}_{}.{}", prefix, timestamp.format("%Y%m%d-%H%M%S"), ext)
}

/// Saves a frame into `dir` with a timestamped name.
///
/// The image format follows `ext`. Returns the path written.
pub fn save_frame(frame: &FrameBuffer, dir: &Path, prefix: &str, ext: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(frame_file_name(prefix, ext, Local::now()));
    frame
        .save(&path)
        .with_context(|| format!("Failed to save frame to {}", path.display()))?;

    crate::log(&format!("Saved to {}", path.display()));
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::region::OffsetSpec;
    use crate::capture::window::tests::FakeWindows;
    use crate::config::OutputSize;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use image::GenericImageView;
    use std::cell::RefCell;
    use tempfile::tempdir;

    enum GrabMode {
        Frame,
        Empty,
        Fail,
    }

    /// Serves a synthetic letterboxed frame and records requested regions.
    struct FakeGrabber {
        mode: GrabMode,
        regions: RefCell<Vec<Rect>>,
    }

    impl FakeGrabber {
        fn with_mode(mode: GrabMode) -> Self {
            Self {
                mode,
                regions: RefCell::new(Vec::new()),
            }
        }

        fn ok() -> Self {
            Self::with_mode(GrabMode::Frame)
        }

        fn empty() -> Self {
            Self::with_mode(GrabMode::Empty)
        }

        fn failing() -> Self {
            Self::with_mode(GrabMode::Fail)
        }
    }

    impl FrameGrabber for FakeGrabber {
        fn grab(&self, region: Rect) -> Result<Option<RawFrame>> {
            self.regions.borrow_mut().push(region);
            match self.mode {
                GrabMode::Frame => Ok(Some(letterboxed_bgra(
                    region.width() as u32,
                    region.height() as u32,
                ))),
                GrabMode::Empty => Ok(None),
                GrabMode::Fail => Err(anyhow!("device lost")),
            }
        }
    }

    /// Blue content (BGRA order) with 10 black rows at the top and bottom.
    fn letterboxed_bgra(width: u32, height: u32) -> RawFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for _ in 0..width {
                if y < 10 || y >= height - 10 {
                    data.extend_from_slice(&[0, 0, 0, 255]);
                } else {
                    data.extend_from_slice(&[200, 50, 10, 255]);
                }
            }
        }
        RawFrame::new(width, height, data).unwrap()
    }

    fn config(title: &str) -> CaptureConfig {
        CaptureConfig {
            window_title: title.to_string(),
            offsets: OffsetSpec {
                left: 10,
                top: 20,
                right: 10,
                bottom: 20,
            },
            ..CaptureConfig::default()
        }
    }

    fn game_window() -> FakeWindows {
        FakeWindows::new(vec![
            ("Explorer", Rect::new(0, 0, 1920, 1040)),
            ("Game", Rect::new(100, 100, 900, 700)),
        ])
    }

    #[test]
    fn test_capture_full_pipeline() {
        let capturer = FrameCapturer::new(config(" Game "), game_window(), FakeGrabber::ok());

        let frame = capturer.capture().unwrap();

        assert_eq!(
            capturer.grabber.regions.borrow().as_slice(),
            &[Rect::new(110, 120, 890, 680)]
        );
        // 560 rows grabbed, 10 trimmed at each edge
        assert_eq!(frame.dimensions(), (780, 540));
        // BGRA (200, 50, 10) becomes RGB (10, 50, 200)
        assert_eq!(frame.to_rgb8().get_pixel(0, 0).0, [10, 50, 200]);
        assert_eq!(
            capturer.windows().activated.borrow().as_slice(),
            &[crate::capture::window::WindowHandle(2)]
        );
    }

    #[test]
    fn test_capture_resizes_and_converts_to_grayscale() {
        let mut cfg = config("Game");
        cfg.output_size = Some(OutputSize {
            width: 390,
            height: 270,
        });
        cfg.grayscale = true;
        let capturer = FrameCapturer::new(cfg, game_window(), FakeGrabber::ok());

        let frame = capturer.capture().unwrap();

        assert_eq!(frame.dimensions(), (390, 270));
        assert!(frame.as_luma8().is_some());
    }

    #[test]
    fn test_capture_window_not_found() {
        let capturer = FrameCapturer::new(config("Missing"), game_window(), FakeGrabber::ok());

        let result = capturer.capture();

        assert!(matches!(result, Err(CaptureError::WindowNotFound { .. })));
        assert!(capturer.grabber.regions.borrow().is_empty());
    }

    #[test]
    fn test_capture_invalid_region_skips_grab() {
        let windows = FakeWindows::new(vec![("Game", Rect::new(0, 0, 50, 50))]);
        let mut cfg = config("Game");
        cfg.offsets = OffsetSpec {
            left: 30,
            top: 0,
            right: 30,
            bottom: 0,
        };
        let capturer = FrameCapturer::new(cfg, windows, FakeGrabber::ok());

        let result = capturer.capture();

        assert!(matches!(result, Err(CaptureError::InvalidRegion { .. })));
        assert!(capturer.grabber.regions.borrow().is_empty());
    }

    #[test]
    fn test_capture_grab_failures() {
        let capturer = FrameCapturer::new(config("Game"), game_window(), FakeGrabber::empty());
        assert!(matches!(capturer.capture(), Err(CaptureError::GrabFailed(_))));

        let capturer = FrameCapturer::new(config("Game"), game_window(), FakeGrabber::failing());
        match capturer.capture() {
            Err(CaptureError::GrabFailed(msg)) => assert!(msg.contains("device lost")),
            other => panic!("Expected GrabFailed, got {:?}", other.map(|f| f.dimensions())),
        }
    }

    #[test]
    fn test_capture_continues_when_activation_fails() {
        let mut windows = game_window();
        windows.fail_activation = true;
        let capturer = FrameCapturer::new(config("Game"), windows, FakeGrabber::ok());

        assert!(capturer.capture().is_ok());
    }

    #[test]
    fn test_frame_file_name_format() {
        let ts = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(
            frame_file_name("game_screenshot", "png", ts),
            "game_screenshot_20240307-090501.png"
        );
    }

    #[test]
    fn test_save_frame_writes_image() {
        let dir = tempdir().unwrap();
        let frame = DynamicImage::ImageRgb8(image::RgbImage::new(8, 4));

        let path = save_frame(&frame, &dir.path().join("shots"), "frame", "png").unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("frame_"));
        assert!(name.ends_with(".png"));
        assert_eq!(image::open(&path).unwrap().dimensions(), (8, 4));
    }
}
