//! Development backend for hosts without USB-OTG.
//!
//! The "monitor" offers the configured local capture device when asked to
//! pick one, and the handle streams RGBA frames into a [`FrameSink`] that the
//! UI drains. Windows reads a real camera through `kamera`; other hosts get a
//! moving colour-bar pattern.

use std::{
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use anyhow::Result;
use log::{debug, error, info};
use slint::{Rgba8Pixel, SharedPixelBuffer};

use super::{CameraBackend, CameraHandle, DeviceSink, FrameFormat, PreviewSurface, UsbMonitor};
use crate::{
    error::CameraError,
    event::{DeviceEvent, DeviceInfo},
};

pub type Frame = SharedPixelBuffer<Rgba8Pixel>;
pub type CaptureFlag = Arc<Mutex<bool>>;

/// The desktop stand-in for a platform surface.
#[derive(Clone)]
pub struct FrameSink {
    sender: Sender<Frame>,
}

impl FrameSink {
    pub fn channel() -> (Self, Receiver<Frame>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    /// Returns `false` once nobody is reading any more.
    pub fn present(&self, frame: Frame) -> bool {
        self.sender.send(frame).is_ok()
    }
}

impl PreviewSurface for FrameSink {
    fn release(self) {
        debug!("frame sink released");
    }
}

#[derive(Debug, Clone)]
pub struct DesktopControl {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct DesktopBackend;

impl CameraBackend for DesktopBackend {
    type Control = DesktopControl;
    type Surface = FrameSink;
    type Handle = DesktopCamera;

    fn open(&self, control: DesktopControl) -> Result<DesktopCamera, CameraError> {
        info!("open {} (#{})", control.name, control.index);
        Ok(DesktopCamera {
            control,
            size: None,
            sink: None,
            capture: None,
            closed: false,
        })
    }
}

struct Capture {
    running: CaptureFlag,
    task: Option<JoinHandle<Result<()>>>,
}

impl Capture {
    fn spawn(index: usize, width: u32, height: u32, sink: FrameSink) -> Result<Self, CameraError> {
        let running = Arc::new(Mutex::new(true));
        let flag = running.clone();
        let task = std::thread::Builder::new()
            .name(format!("capture-{index}"))
            .spawn(move || frame_loop(index, width, height, flag, sink))
            .map_err(|err| CameraError::Unavailable(err.to_string()))?;
        Ok(Self {
            running,
            task: Some(task),
        })
    }

    fn stop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            *running = false;
        }
        if let Some(task) = self.task.take() {
            match task.join() {
                Ok(Ok(())) => debug!("capture stopped"),
                Ok(Err(err)) => error!("capture failed: {err}"),
                Err(_) => error!("capture thread panicked"),
            }
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "windows")]
fn frame_loop(
    index: usize,
    _width: u32,
    _height: u32,
    running: CaptureFlag,
    sink: FrameSink,
) -> Result<()> {
    super::pcam::capture_loop(index, running, sink)
}

#[cfg(not(target_os = "windows"))]
fn frame_loop(
    _index: usize,
    width: u32,
    height: u32,
    running: CaptureFlag,
    sink: FrameSink,
) -> Result<()> {
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    const BARS: [[u8; 3]; 8] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
        [16, 16, 16],
    ];
    let bar_width = (width / BARS.len() as u32).max(1);
    let mut offset = 0u32;
    loop {
        if let Ok(running) = running.lock() {
            if !*running {
                break;
            }
        }
        let image = RgbaImage::from_fn(width, height, |x, _| {
            let [r, g, b] = BARS[((x + offset) / bar_width) as usize % BARS.len()];
            Rgba([r, g, b, 255])
        });
        if !sink.present(SharedPixelBuffer::clone_from_slice(image.as_raw(), width, height)) {
            break;
        }
        offset = (offset + 4) % width.max(1);
        std::thread::sleep(Duration::from_millis(33));
    }
    Ok(())
}

pub struct DesktopCamera {
    control: DesktopControl,
    size: Option<(u32, u32)>,
    sink: Option<FrameSink>,
    capture: Option<Capture>,
    closed: bool,
}

impl DesktopCamera {
    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::Unavailable(format!("{} is closed", self.control.name)));
        }
        Ok(())
    }
}

impl CameraHandle for DesktopCamera {
    type Surface = FrameSink;

    fn supported_size(&self) -> Result<String, CameraError> {
        self.ensure_open()?;
        Ok(format!("{}: {} any size", self.control.name, FrameFormat::Yuyv))
    }

    fn set_preview_size(
        &mut self,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Result<(), CameraError> {
        self.ensure_open()?;
        if format == FrameFormat::Mjpeg {
            return Err(CameraError::InvalidArgument(format!(
                "{} delivers uncompressed frames only",
                self.control.name
            )));
        }
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidArgument(format!("{width}x{height}")));
        }
        self.size = Some((width, height));
        Ok(())
    }

    fn set_preview_display(&mut self, surface: &FrameSink) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.sink = Some(surface.clone());
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        let (Some((width, height)), Some(sink)) = (self.size, self.sink.clone()) else {
            return Err(CameraError::Unavailable("preview size or display not set".into()));
        };
        self.stop_preview()?;
        self.capture = Some(Capture::spawn(self.control.index, width, height, sink)?);
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.stop_preview()?;
        self.sink = None;
        self.closed = true;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), CameraError> {
        self.close()
    }
}

/// Offers a single local device through the monitor interface.
pub struct DesktopMonitor {
    camera_index: usize,
    sink: DeviceSink<DesktopControl>,
    registered: bool,
    attached: bool,
}

impl DesktopMonitor {
    pub fn new(camera_index: usize, sink: DeviceSink<DesktopControl>) -> Self {
        Self {
            camera_index,
            sink,
            registered: false,
            attached: false,
        }
    }

    fn device_name(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("camera #{}", self.camera_index)
        } else {
            format!("test pattern #{}", self.camera_index)
        }
    }
}

impl UsbMonitor for DesktopMonitor {
    fn register(&mut self) -> Result<(), CameraError> {
        self.registered = true;
        Ok(())
    }

    fn unregister(&mut self) -> Result<(), CameraError> {
        self.registered = false;
        Ok(())
    }

    fn request_device(&mut self) -> Result<(), CameraError> {
        if !self.registered {
            return Err(CameraError::Unavailable("usb monitor is not registered".into()));
        }
        let name = self.device_name();
        let device = DeviceInfo::new(name.clone());
        if !self.attached {
            self.attached = true;
            (self.sink)(DeviceEvent::Attach(device.clone()));
        }
        (self.sink)(DeviceEvent::Connect {
            device,
            control: DesktopControl {
                index: self.camera_index,
                name,
            },
            create_new: true,
        });
        Ok(())
    }

    fn destroy(self) {
        debug!("desktop monitor destroyed");
    }
}
