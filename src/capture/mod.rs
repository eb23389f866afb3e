//! Screen capture of the configured game window.
//!
//! This module provides:
//! - Window discovery by exact title (`locate_window`)
//! - Capture region calculation (`compute_region`)
//! - Letterbox removal (`trim_black_borders`)
//! - The capture pipeline (`FrameCapturer`)
//! - Win32 window and Graphics Capture backends (`platform`, Windows only)

pub mod border;
pub mod frame;
#[cfg(windows)]
pub mod platform;
pub mod region;
pub mod screenshot;
pub mod window;

pub use border::{trim_black_borders, BorderTrim};
pub use frame::{FrameBuffer, RawFrame};
pub use region::{compute_region, OffsetSpec, Rect};
pub use screenshot::{save_frame, CaptureError, FrameCapturer, FrameGrabber};
pub use window::{activate_window, locate_window, WindowBackend, WindowHandle, WindowInfo};
