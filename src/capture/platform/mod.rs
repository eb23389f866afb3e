//! Win32 backends for the capture pipeline.

pub mod graphics_capture;
pub mod window;

pub use graphics_capture::GraphicsCaptureGrabber;
pub use window::{enable_dpi_awareness, Win32Windows};
