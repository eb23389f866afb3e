//! Region grabs using the Windows Graphics Capture API.
//!
//! The monitor containing the region is captured and the region is copied
//! out of the mapped staging texture as BGRA rows.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromPoint, HMONITOR, MONITORINFO, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

use crate::capture::frame::RawFrame;
use crate::capture::region::{texture_crop, Rect};
use crate::capture::screenshot::FrameGrabber;

/// How long to wait for the first frame before giving up.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame grabber backed by a per-call Graphics Capture session.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphicsCaptureGrabber;

impl FrameGrabber for GraphicsCaptureGrabber {
    fn grab(&self, region: Rect) -> Result<Option<RawFrame>> {
        let (monitor, monitor_rect) = monitor_for_region(&region)?;

        let (device, context) = create_d3d11_device()?;
        let item = create_capture_item(monitor)?;
        let size = item.Size()?;

        let d3d_device = create_direct3d_device(&device)?;
        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            &d3d_device,
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            1,
            size,
        )?;
        let session = frame_pool.CreateCaptureSession(&item)?;

        let frame_arrived = Arc::new(AtomicBool::new(false));
        let frame_arrived_clone = frame_arrived.clone();
        frame_pool.FrameArrived(&TypedEventHandler::new(
            move |_pool: &Option<Direct3D11CaptureFramePool>, _| {
                frame_arrived_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
        ))?;

        session.StartCapture()?;

        let start = Instant::now();
        while !frame_arrived.load(Ordering::SeqCst) {
            if start.elapsed() > FRAME_TIMEOUT {
                session.Close()?;
                frame_pool.Close()?;
                crate::log("Timeout waiting for frame");
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let frame = frame_pool.TryGetNextFrame()?;
        let surface = frame.Surface()?;
        let access: windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess =
            surface.cast()?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

        let raw = read_region(&device, &context, &texture, &region, &monitor_rect);

        session.Close()?;
        frame_pool.Close()?;

        raw.map(Some)
    }
}

/// Finds the monitor under the region's top-left corner and its screen rect.
fn monitor_for_region(region: &Rect) -> Result<(HMONITOR, Rect)> {
    let pt = POINT {
        x: region.left,
        y: region.top,
    };
    unsafe {
        let monitor = MonitorFromPoint(pt, MONITOR_DEFAULTTONEAREST);
        if monitor.is_invalid() {
            return Err(anyhow!("No monitor contains region {}", region));
        }

        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        if !GetMonitorInfoW(monitor, &mut info).as_bool() {
            return Err(anyhow!("GetMonitorInfoW failed"));
        }
        let rc = info.rcMonitor;
        Ok((monitor, Rect::new(rc.left, rc.top, rc.right, rc.bottom)))
    }
}

/// Copies `region` (screen coordinates) out of a captured monitor texture.
fn read_region(
    device: &ID3D11Device,
    context: &ID3D11DeviceContext,
    texture: &ID3D11Texture2D,
    region: &Rect,
    monitor_rect: &Rect,
) -> Result<RawFrame> {
    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };

    let crop = texture_crop(region, monitor_rect, desc.Width, desc.Height).ok_or_else(|| {
        anyhow!(
            "Region {} lies outside the captured {}x{} monitor at {}",
            region,
            desc.Width,
            desc.Height,
            monitor_rect
        )
    })?;
    let (crop_x, crop_y) = (crop.left as u32, crop.top as u32);
    let (crop_width, crop_height) = (crop.width() as u32, crop.height() as u32);

    let staging_desc = D3D11_TEXTURE2D_DESC {
        Width: desc.Width,
        Height: desc.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: desc.Format,
        SampleDesc: desc.SampleDesc,
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let staging_texture = unsafe {
        let mut staging: Option<ID3D11Texture2D> = None;
        device.CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
        staging.ok_or_else(|| anyhow!("Failed to create staging texture"))?
    };

    unsafe {
        context.CopyResource(
            &staging_texture.cast::<ID3D11Resource>()?,
            &texture.cast::<ID3D11Resource>()?,
        );
    }

    let mapped = unsafe {
        let mut mapped = Default::default();
        context.Map(
            &staging_texture.cast::<ID3D11Resource>()?,
            0,
            D3D11_MAP_READ,
            0,
            Some(&mut mapped),
        )?;
        mapped
    };

    let src_data = unsafe {
        std::slice::from_raw_parts(
            mapped.pData as *const u8,
            (mapped.RowPitch * desc.Height) as usize,
        )
    };
    let row_pitch = mapped.RowPitch as usize;
    let row_bytes = crop_width as usize * RawFrame::BYTES_PER_PIXEL;

    let mut data = Vec::with_capacity(row_bytes * crop_height as usize);
    for y in 0..crop_height {
        let offset = (crop_y + y) as usize * row_pitch + crop_x as usize * RawFrame::BYTES_PER_PIXEL;
        data.extend_from_slice(&src_data[offset..offset + row_bytes]);
    }

    unsafe {
        context.Unmap(&staging_texture.cast::<ID3D11Resource>()?, 0);
    }

    RawFrame::new(crop_width, crop_height, data)
}

/// Creates a Direct3D 11 device and immediate context.
fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }

    Ok((
        device.ok_or_else(|| anyhow!("Failed to create D3D11 device"))?,
        context.ok_or_else(|| anyhow!("Failed to create D3D11 context"))?,
    ))
}

/// Wraps a D3D11 device for the WinRT capture API.
fn create_direct3d_device(
    device: &ID3D11Device,
) -> Result<windows::Graphics::DirectX::Direct3D11::IDirect3DDevice> {
    let dxgi_device: windows::Win32::Graphics::Dxgi::IDXGIDevice = device.cast()?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
    inspectable
        .cast()
        .context("Failed to cast to IDirect3DDevice")
}

fn create_capture_item(monitor: HMONITOR) -> Result<GraphicsCaptureItem> {
    let class_name = windows::core::h!("Windows.Graphics.Capture.GraphicsCaptureItem");
    let interop: IGraphicsCaptureItemInterop = unsafe {
        windows::Win32::System::WinRT::RoGetActivationFactory(class_name)
            .context("Failed to get IGraphicsCaptureItemInterop")?
    };

    unsafe {
        interop
            .CreateForMonitor(monitor)
            .context("Failed to create capture item for monitor")
    }
}
