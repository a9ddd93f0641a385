//! Recording fakes shared by the unit tests.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex,
};

use crate::{
    camera::{CameraBackend, CameraHandle, DeviceSink, FrameFormat, PreviewSurface, UsbMonitor},
    error::CameraError,
    worker::{Executor, Job},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(u32),
    SupportedSize(u32),
    SetPreviewSize(u32, FrameFormat, bool),
    SetPreviewDisplay(u32, u32),
    StartPreview(u32),
    StopPreview(u32),
    Close(u32),
    Destroy(u32),
    ReleaseSurface(u32),
    Register,
    Unregister,
    RequestDevice,
    DestroyMonitor,
}

#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Call>>>);

impl Log {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

#[derive(Debug, Clone)]
pub struct FakeSurface {
    id: u32,
    log: Log,
}

impl FakeSurface {
    pub fn new(id: u32, log: &Log) -> Self {
        Self { id, log: log.clone() }
    }
}

impl PreviewSurface for FakeSurface {
    fn release(self) {
        self.log.push(Call::ReleaseSurface(self.id));
    }
}

pub struct FakeCamera {
    id: u32,
    log: Log,
    rejected: Vec<FrameFormat>,
}

impl CameraHandle for FakeCamera {
    type Surface = FakeSurface;

    fn supported_size(&self) -> Result<String, CameraError> {
        self.log.push(Call::SupportedSize(self.id));
        Ok("640x480".into())
    }

    fn set_preview_size(
        &mut self,
        _width: u32,
        _height: u32,
        format: FrameFormat,
    ) -> Result<(), CameraError> {
        let ok = !self.rejected.contains(&format);
        self.log.push(Call::SetPreviewSize(self.id, format, ok));
        if ok {
            Ok(())
        } else {
            Err(CameraError::InvalidArgument(format!("{format} not supported")))
        }
    }

    fn set_preview_display(&mut self, surface: &FakeSurface) -> Result<(), CameraError> {
        self.log.push(Call::SetPreviewDisplay(self.id, surface.id));
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::StartPreview(self.id));
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::StopPreview(self.id));
        Ok(())
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::Close(self.id));
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::Destroy(self.id));
        Ok(())
    }
}

/// Hands out numbered [`FakeCamera`]s, starting at 1.
#[derive(Default)]
pub struct FakeBackend {
    pub log: Log,
    rejected: Vec<FrameFormat>,
    next_id: AtomicU32,
    fail_open: AtomicBool,
}

impl FakeBackend {
    pub fn rejecting(formats: &[FrameFormat]) -> Self {
        Self {
            rejected: formats.to_vec(),
            ..Default::default()
        }
    }

    pub fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }
}

impl CameraBackend for FakeBackend {
    type Control = ();
    type Surface = FakeSurface;
    type Handle = FakeCamera;

    fn open(&self, _control: ()) -> Result<FakeCamera, CameraError> {
        if self.fail_open.swap(false, Ordering::SeqCst) {
            return Err(CameraError::Unavailable("fake open failure".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.push(Call::Open(id));
        Ok(FakeCamera {
            id,
            log: self.log.clone(),
            rejected: self.rejected.clone(),
        })
    }
}

/// Queues jobs until the test decides to run them.
#[derive(Default)]
pub struct Deferred {
    jobs: Mutex<Vec<Job>>,
}

impl Deferred {
    pub fn run_all(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
        for job in jobs {
            job();
        }
    }
}

impl Executor for Deferred {
    fn execute(&self, job: Job) {
        self.jobs.lock().unwrap().push(job);
    }
}

/// Monitor that records its calls and exposes the sink it was given.
pub struct FakeMonitor {
    pub log: Log,
    pub sink: DeviceSink<()>,
}

impl UsbMonitor for FakeMonitor {
    fn register(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::Register);
        Ok(())
    }

    fn unregister(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::Unregister);
        Ok(())
    }

    fn request_device(&mut self) -> Result<(), CameraError> {
        self.log.push(Call::RequestDevice);
        Ok(())
    }

    fn destroy(self) {
        self.log.push(Call::DestroyMonitor);
    }
}
