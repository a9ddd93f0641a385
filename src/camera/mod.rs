//! Seams to the UVC camera stack.
//!
//! The session never talks to a device directly: it goes through a
//! [`CameraBackend`] that opens [`CameraHandle`]s from monitor control blocks,
//! and a [`UsbMonitor`] that reports devices and runs the selection flow.

use std::{fmt, sync::Arc};

use crate::{error::CameraError, event::DeviceEvent};

#[cfg(target_os = "android")]
pub mod bridge;
#[cfg(target_os = "android")]
pub mod uvc;

#[cfg(not(target_os = "android"))]
pub mod desktop;
#[cfg(target_os = "windows")]
mod pcam;

pub const DEFAULT_PREVIEW_WIDTH: u32 = 640;
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 480;
pub const DEFAULT_PREVIEW_MODE: FrameFormat = FrameFormat::Yuyv;

/// Wire format requested from the device, numbered like the UVC library's
/// `FRAME_FORMAT_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    Yuyv = 0,
    Mjpeg = 1,
}

impl FrameFormat {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFormat::Yuyv => f.write_str("YUYV"),
            FrameFormat::Mjpeg => f.write_str("MJPEG"),
        }
    }
}

/// Something frames can be drawn into.
pub trait PreviewSurface: Clone + Send + 'static {
    /// Gives the underlying surface back to the platform.
    fn release(self);
}

/// An opened camera.
pub trait CameraHandle: Send + 'static {
    type Surface: PreviewSurface;

    /// Human readable list of supported sizes, for diagnostics only.
    fn supported_size(&self) -> Result<String, CameraError>;
    /// Fails with [`CameraError::InvalidArgument`] when the device rejects
    /// the size/format combination.
    fn set_preview_size(
        &mut self,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Result<(), CameraError>;
    fn set_preview_display(&mut self, surface: &Self::Surface) -> Result<(), CameraError>;
    fn start_preview(&mut self) -> Result<(), CameraError>;
    fn stop_preview(&mut self) -> Result<(), CameraError>;
    /// Closes the device but leaves it to the monitor to reclaim.
    fn close(&mut self) -> Result<(), CameraError>;
    /// Closes the device and frees everything the handle owns.
    fn destroy(&mut self) -> Result<(), CameraError>;
}

pub trait CameraBackend: Send + Sync + 'static {
    /// Permission token produced by the USB monitor on connect.
    type Control: Send + 'static;
    type Surface: PreviewSurface;
    type Handle: CameraHandle<Surface = Self::Surface>;

    fn open(&self, control: Self::Control) -> Result<Self::Handle, CameraError>;
}

/// Receives the monitor's device callbacks.
pub type DeviceSink<C> = Arc<dyn Fn(DeviceEvent<C>) + Send + Sync>;

pub trait UsbMonitor {
    fn register(&mut self) -> Result<(), CameraError>;
    fn unregister(&mut self) -> Result<(), CameraError>;
    /// Starts the device selection flow. The outcome comes back
    /// asynchronously as a connect (or cancel) event.
    fn request_device(&mut self) -> Result<(), CameraError>;
    fn destroy(self);
}
