//! Window discovery and activation for the target game window.

use anyhow::Result;
use std::fmt;
use std::time::Duration;

use super::region::Rect;
use super::screenshot::CaptureError;

/// Wait after activation before trusting window geometry.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Opaque OS window identifier.
///
/// Stored as the raw handle value so it can cross thread boundaries; it is
/// only meaningful while the window exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub usize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A top-level window as reported by the window enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub rect: Rect,
}

/// OS windowing operations used by the capture pipeline.
///
/// All rectangles must be in one consistent coordinate space (physical
/// pixels with per-monitor DPI awareness on Windows).
pub trait WindowBackend {
    /// Lists visible top-level windows in enumeration order.
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    /// Current outer rectangle of a window.
    fn window_rect(&self, handle: WindowHandle) -> Result<Rect>;

    /// Bounds of the screen the window is on.
    fn screen_bound(&self, handle: WindowHandle) -> Result<Rect>;

    /// Makes the window visible.
    fn show(&self, handle: WindowHandle) -> Result<()>;

    /// Brings the window to the foreground.
    fn foreground(&self, handle: WindowHandle) -> Result<()>;
}

/// Finds the first window whose trimmed title equals the trimmed `title`.
///
/// Matching is exact and case-sensitive; internal whitespace must match too.
/// When several windows share the title, the first one enumerated wins, so
/// the choice can change if the window manager reorders windows.
pub fn locate_window<B: WindowBackend + ?Sized>(
    backend: &B,
    title: &str,
) -> Result<WindowHandle, CaptureError> {
    let wanted = title.trim();
    let windows = backend
        .list_windows()
        .map_err(|e| CaptureError::WindowQuery(format!("Failed to enumerate windows: {}", e)))?;

    windows
        .iter()
        .find(|w| w.title.trim() == wanted)
        .map(|w| w.handle)
        .ok_or_else(|| CaptureError::WindowNotFound {
            title: wanted.to_string(),
        })
}

/// Asks the OS to show and foreground a window.
///
/// Both steps are attempted even if the first one fails. The caller should
/// wait [`SETTLE_DELAY`] afterwards.
pub fn activate_window<B: WindowBackend + ?Sized>(
    backend: &B,
    handle: WindowHandle,
) -> Result<(), CaptureError> {
    let shown = backend.show(handle);
    let focused = backend.foreground(handle);

    match (shown, focused) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), _) => Err(CaptureError::ActivationFailed(format!("show: {}", e))),
        (_, Err(e)) => Err(CaptureError::ActivationFailed(format!("foreground: {}", e))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    /// In-memory window list for exercising the locator and capturer.
    pub(crate) struct FakeWindows {
        pub windows: Vec<WindowInfo>,
        pub screen: Rect,
        pub fail_activation: bool,
        pub activated: RefCell<Vec<WindowHandle>>,
    }

    impl FakeWindows {
        pub fn new(windows: Vec<(&str, Rect)>) -> Self {
            Self {
                windows: windows
                    .into_iter()
                    .enumerate()
                    .map(|(i, (title, rect))| WindowInfo {
                        handle: WindowHandle(i + 1),
                        title: title.to_string(),
                        rect,
                    })
                    .collect(),
                screen: Rect::new(0, 0, 1920, 1080),
                fail_activation: false,
                activated: RefCell::new(Vec::new()),
            }
        }
    }

    impl WindowBackend for FakeWindows {
        fn list_windows(&self) -> Result<Vec<WindowInfo>> {
            Ok(self.windows.clone())
        }

        fn window_rect(&self, handle: WindowHandle) -> Result<Rect> {
            self.windows
                .iter()
                .find(|w| w.handle == handle)
                .map(|w| w.rect)
                .ok_or_else(|| anyhow!("No such window"))
        }

        fn screen_bound(&self, _handle: WindowHandle) -> Result<Rect> {
            Ok(self.screen)
        }

        fn show(&self, handle: WindowHandle) -> Result<()> {
            if self.fail_activation {
                return Err(anyhow!("ShowWindow refused"));
            }
            self.activated.borrow_mut().push(handle);
            Ok(())
        }

        fn foreground(&self, _handle: WindowHandle) -> Result<()> {
            if self.fail_activation {
                return Err(anyhow!("SetForegroundWindow refused"));
            }
            Ok(())
        }
    }

    const RECT: Rect = Rect::new(0, 0, 800, 600);

    #[test]
    fn test_locate_exact_title() {
        let backend = FakeWindows::new(vec![("Notepad", RECT), ("Black Myth", RECT)]);
        assert_eq!(
            locate_window(&backend, "Black Myth").unwrap(),
            WindowHandle(2)
        );
    }

    #[test]
    fn test_locate_trims_surrounding_whitespace() {
        let backend = FakeWindows::new(vec![("  Black Myth ", RECT)]);
        assert_eq!(
            locate_window(&backend, "\tBlack Myth  ").unwrap(),
            WindowHandle(1)
        );
    }

    #[test]
    fn test_locate_rejects_internal_whitespace_difference() {
        let backend = FakeWindows::new(vec![("Black  Myth", RECT)]);
        let result = locate_window(&backend, " Black Myth ");
        assert!(matches!(
            result,
            Err(CaptureError::WindowNotFound { ref title }) if title == "Black Myth"
        ));
    }

    #[test]
    fn test_locate_rejects_substring_and_case() {
        let backend = FakeWindows::new(vec![
            ("Black Myth - Launcher", RECT),
            ("black myth", RECT),
        ]);
        assert!(locate_window(&backend, "Black Myth").is_err());
    }

    #[test]
    fn test_locate_picks_first_enumerated() {
        let backend = FakeWindows::new(vec![("Game", RECT), ("Game", RECT)]);
        assert_eq!(locate_window(&backend, "Game").unwrap(), WindowHandle(1));
    }

    #[test]
    fn test_activate_reports_failure() {
        let mut backend = FakeWindows::new(vec![("Game", RECT)]);
        assert!(activate_window(&backend, WindowHandle(1)).is_ok());
        assert_eq!(backend.activated.borrow().as_slice(), &[WindowHandle(1)]);

        backend.fail_activation = true;
        assert!(matches!(
            activate_window(&backend, WindowHandle(1)),
            Err(CaptureError::ActivationFailed(_))
        ));
    }
}
