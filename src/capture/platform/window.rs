//! Win32 window enumeration, geometry, and activation.

use anyhow::{anyhow, Result};
use std::ffi::{c_void, OsString};
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromWindow, MONITORINFO, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowRect, GetWindowTextLengthW, GetWindowTextW, IsWindow, IsWindowVisible,
    SetForegroundWindow, ShowWindow, SW_SHOW,
};

use crate::capture::region::Rect;
use crate::capture::window::{WindowBackend, WindowHandle, WindowInfo};

/// Opts the process into per-monitor DPI awareness so window rectangles and
/// captured pixels share one coordinate space. Call once at startup.
pub fn enable_dpi_awareness() {
    unsafe {
        if let Err(e) = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) {
            crate::log(&format!("Failed to set DPI awareness: {}", e));
        }
    }
}

fn to_hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as usize)
}

fn to_rect(rect: RECT) -> Rect {
    Rect::new(rect.left, rect.top, rect.right, rect.bottom)
}

/// Reads a window's title, or an empty string when it has none.
fn window_title(hwnd: HWND) -> String {
    unsafe {
        let title_len = GetWindowTextLengthW(hwnd);
        if title_len <= 0 {
            return String::new();
        }
        let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut title_buf);
        OsString::from_wide(&title_buf[..copied.max(0) as usize])
            .to_string_lossy()
            .to_string()
    }
}

/// Window backend over the Win32 windowing API.
#[derive(Clone, Copy, Debug, Default)]
pub struct Win32Windows;

impl WindowBackend for Win32Windows {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
            unsafe {
                let windows = &mut *(lparam.0 as *mut Vec<WindowInfo>);

                if !IsWindowVisible(hwnd).as_bool() {
                    return TRUE;
                }

                // Skip windows without title (usually not main windows)
                let title = window_title(hwnd);
                if title.is_empty() {
                    return TRUE;
                }

                let mut rect = RECT::default();
                if GetWindowRect(hwnd, &mut rect).is_err() {
                    return TRUE;
                }

                windows.push(WindowInfo {
                    handle: from_hwnd(hwnd),
                    title,
                    rect: to_rect(rect),
                });
                TRUE
            }
        }

        let mut windows: Vec<WindowInfo> = Vec::new();
        unsafe {
            EnumWindows(
                Some(enum_callback),
                LPARAM(&mut windows as *mut _ as isize),
            )?;
        }
        Ok(windows)
    }

    fn window_rect(&self, handle: WindowHandle) -> Result<Rect> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(to_hwnd(handle), &mut rect)? };
        Ok(to_rect(rect))
    }

    fn screen_bound(&self, handle: WindowHandle) -> Result<Rect> {
        unsafe {
            let monitor = MonitorFromWindow(to_hwnd(handle), MONITOR_DEFAULTTONEAREST);
            if monitor.is_invalid() {
                return Err(anyhow!("No monitor for window {}", handle));
            }

            let mut info = MONITORINFO {
                cbSize: std::mem::size_of::<MONITORINFO>() as u32,
                ..Default::default()
            };
            if !GetMonitorInfoW(monitor, &mut info).as_bool() {
                return Err(anyhow!("GetMonitorInfoW failed"));
            }
            Ok(to_rect(info.rcMonitor))
        }
    }

    fn show(&self, handle: WindowHandle) -> Result<()> {
        let hwnd = to_hwnd(handle);
        unsafe {
            if !IsWindow(hwnd).as_bool() {
                return Err(anyhow!("Window {} no longer exists", handle));
            }
            // Return value is the previous visibility, not a success flag
            let _ = ShowWindow(hwnd, SW_SHOW);
        }
        Ok(())
    }

    fn foreground(&self, handle: WindowHandle) -> Result<()> {
        unsafe {
            if !SetForegroundWindow(to_hwnd(handle)).as_bool() {
                return Err(anyhow!("SetForegroundWindow was refused"));
            }
        }
        Ok(())
    }
}
