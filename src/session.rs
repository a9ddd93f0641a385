//! Preview session state shared between USB callbacks, surface callbacks and
//! the UI.
//!
//! The camera handle, the current surface and the `active`/`preview` flags
//! live behind a single mutex. Connect work (open the device, negotiate the
//! preview format) runs on an [`Executor`] and only takes the lock to install
//! its result. Each connect is stamped with an epoch; a newer connect or a
//! teardown bumps it, so a late open destroys its own handle instead of
//! installing it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::{
    camera::{CameraBackend, CameraHandle, FrameFormat, PreviewSurface},
    config::CameraConfig,
    error::CameraError,
    event::{DeviceEvent, DeviceInfo, Notice, SurfaceEvent},
    worker::Executor,
};

pub type Notifier = Arc<dyn Fn(Notice) + Send + Sync>;

/// Point-in-time view of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub is_active: bool,
    pub is_preview: bool,
    pub has_camera: bool,
    pub has_surface: bool,
}

struct Inner<B: CameraBackend> {
    camera: Option<B::Handle>,
    surface: Option<B::Surface>,
    is_active: bool,
    is_preview: bool,
    epoch: u64,
    torn_down: bool,
}

impl<B: CameraBackend> Inner<B> {
    fn clear_flags(&mut self) {
        self.is_preview = false;
        self.is_active = false;
    }
}

pub struct SessionCoordinator<B: CameraBackend> {
    backend: B,
    config: CameraConfig,
    executor: Arc<dyn Executor>,
    notifier: Notifier,
    state: Mutex<Inner<B>>,
}

impl<B: CameraBackend> SessionCoordinator<B> {
    pub fn new(
        backend: B,
        config: CameraConfig,
        executor: Arc<dyn Executor>,
        notifier: Notifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config,
            executor,
            notifier,
            state: Mutex::new(Inner {
                camera: None,
                surface: None,
                is_active: false,
                is_preview: false,
                epoch: 0,
                torn_down: false,
            }),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn snapshot(&self) -> SessionState {
        let state = self.lock();
        SessionState {
            is_active: state.is_active,
            is_preview: state.is_preview,
            has_camera: state.camera.is_some(),
            has_surface: state.surface.is_some(),
        }
    }

    pub fn on_device_event(self: &Arc<Self>, event: DeviceEvent<B::Control>) {
        match event {
            DeviceEvent::Attach(device) => {
                debug!("onAttach: {device}");
                (self.notifier)(Notice::Attached(device));
            }
            DeviceEvent::Connect {
                device,
                control,
                create_new,
            } => self.on_connect(device, control, create_new),
            DeviceEvent::Disconnect(device) => self.on_disconnect(&device),
            DeviceEvent::Detach(device) => {
                debug!("onDetach: {device}");
                (self.notifier)(Notice::Detached(device));
            }
            DeviceEvent::Cancel(device) => debug!("onCancel: {device}"),
        }
    }

    pub fn on_surface_event(&self, event: SurfaceEvent<B::Surface>) {
        match event {
            SurfaceEvent::Created => debug!("surfaceCreated"),
            SurfaceEvent::Changed {
                surface,
                format,
                width,
                height,
            } => self.on_surface_changed(surface, format, width, height),
            SurfaceEvent::Destroyed => self.on_surface_destroyed(),
        }
    }

    /// Replaces whatever camera is open with one opened from `control`.
    ///
    /// The old handle is destroyed synchronously; opening and format
    /// negotiation of the new one are handed to the executor.
    pub fn on_connect(self: &Arc<Self>, device: DeviceInfo, control: B::Control, create_new: bool) {
        debug!("onConnect: {device} create_new={create_new}");
        let epoch = {
            let mut state = self.lock();
            if state.torn_down {
                warn!("connect from {device} after teardown, ignored");
                return;
            }
            if let Some(mut camera) = state.camera.take() {
                log_failure("destroy", camera.destroy());
            }
            state.clear_flags();
            state.epoch += 1;
            state.epoch
        };
        let session = Arc::clone(self);
        self.executor
            .execute(Box::new(move || session.open_camera(epoch, device, control)));
    }

    fn open_camera(&self, epoch: u64, device: DeviceInfo, control: B::Control) {
        let mut camera = match self.backend.open(control) {
            Ok(camera) => camera,
            Err(err) => {
                error!("failed to open {device}: {err}");
                return;
            }
        };
        match camera.supported_size() {
            Ok(sizes) => info!("supportedSize: {sizes}"),
            Err(err) => debug!("supported sizes unavailable: {err}"),
        }
        let format = match self.negotiate(&mut camera) {
            Ok(format) => format,
            Err(err) => {
                error!("no usable preview format on {device}: {err}");
                log_failure("destroy", camera.destroy());
                return;
            }
        };

        let mut state = self.lock();
        if state.epoch != epoch || state.torn_down {
            info!("connect to {device} superseded, closing it");
            log_failure("destroy", camera.destroy());
            return;
        }
        info!(
            "{device} open at {}x{} {format}",
            self.config.preview_width, self.config.preview_height
        );
        state.is_active = true;
        if let Some(surface) = state.surface.as_ref() {
            log_failure("setPreviewDisplay", camera.set_preview_display(surface));
            log_failure("startPreview", camera.start_preview());
            state.is_preview = true;
        }
        state.camera = Some(camera);
    }

    /// Requests the preferred format, falling back once to the uncompressed
    /// one when the device rejects it.
    fn negotiate(&self, camera: &mut B::Handle) -> Result<FrameFormat, CameraError> {
        let CameraConfig {
            preview_width: width,
            preview_height: height,
            preferred_format,
            fallback_format,
            ..
        } = self.config;
        match camera.set_preview_size(width, height, preferred_format) {
            Ok(()) => Ok(preferred_format),
            Err(err) if err.is_invalid_argument() => {
                warn!("{preferred_format} rejected ({err}), falling back to {fallback_format}");
                camera.set_preview_size(width, height, fallback_format)?;
                Ok(fallback_format)
            }
            Err(err) => Err(err),
        }
    }

    /// Closes the camera and lets go of the surface. The closed handle is
    /// dropped without being destroyed; the monitor reclaims the device.
    /// A connect still opening in the background is superseded.
    pub fn on_disconnect(&self, device: &DeviceInfo) {
        debug!("onDisconnect: {device}");
        let mut state = self.lock();
        state.epoch += 1;
        let Some(mut camera) = state.camera.take() else {
            return;
        };
        log_failure("close", camera.close());
        if let Some(surface) = state.surface.take() {
            surface.release();
        }
        state.clear_flags();
    }

    pub fn on_surface_changed(&self, surface: B::Surface, format: i32, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        debug!("surfaceChanged: format={format} {width}x{height}");
        let mut guard = self.lock();
        let state = &mut *guard;
        state.surface = Some(surface);
        if state.is_active && !state.is_preview {
            if let (Some(camera), Some(surface)) = (state.camera.as_mut(), state.surface.as_ref()) {
                log_failure("setPreviewDisplay", camera.set_preview_display(surface));
                log_failure("startPreview", camera.start_preview());
                state.is_preview = true;
            }
        }
    }

    pub fn on_surface_destroyed(&self) {
        debug!("surfaceDestroyed");
        let surface = {
            let mut state = self.lock();
            if let Some(camera) = state.camera.as_mut() {
                log_failure("stopPreview", camera.stop_preview());
            }
            state.is_preview = false;
            state.surface.take()
        };
        drop(surface);
    }

    /// Destroys the open camera, if any. Returns whether there was one.
    pub fn destroy_camera(&self) -> bool {
        let mut state = self.lock();
        let Some(mut camera) = state.camera.take() else {
            return false;
        };
        log_failure("destroy", camera.destroy());
        state.clear_flags();
        true
    }

    /// Final cleanup when the hosting screen goes away. Pending connects are
    /// cancelled and later device events are ignored.
    pub fn teardown(&self) {
        let mut state = self.lock();
        state.torn_down = true;
        state.epoch += 1;
        state.clear_flags();
        if let Some(mut camera) = state.camera.take() {
            log_failure("destroy", camera.destroy());
        }
        state.surface = None;
    }

    fn lock(&self) -> MutexGuard<'_, Inner<B>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_failure(call: &str, result: Result<(), CameraError>) {
    if let Err(err) = result {
        error!("{call} failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, Deferred, FakeBackend, FakeSurface, Log};
    use crate::worker::Inline;

    fn session(backend: FakeBackend) -> Arc<SessionCoordinator<FakeBackend>> {
        SessionCoordinator::new(
            backend,
            CameraConfig::default(),
            Arc::new(Inline),
            Arc::new(|_| {}),
        )
    }

    fn connect(session: &Arc<SessionCoordinator<FakeBackend>>) {
        session.on_device_event(DeviceEvent::Connect {
            device: DeviceInfo::new("uvc"),
            control: (),
            create_new: true,
        });
    }

    fn surface_ready(
        session: &SessionCoordinator<FakeBackend>,
        log: &Log,
        width: u32,
        height: u32,
    ) {
        session.on_surface_event(SurfaceEvent::Changed {
            surface: FakeSurface::new(7, log),
            format: 4,
            width,
            height,
        });
    }

    fn assert_invariant(state: SessionState) {
        assert!(!state.is_preview || state.is_active, "preview without active: {state:?}");
    }

    #[test]
    fn connect_then_surface_starts_preview() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);

        connect(&session);
        let state = session.snapshot();
        assert!(state.is_active && !state.is_preview && state.has_camera);

        surface_ready(&session, &log, 640, 480);
        let state = session.snapshot();
        assert!(state.is_active && state.is_preview);
        assert_eq!(log.count(|c| matches!(c, Call::StartPreview(_))), 1);
        assert_eq!(
            log.count(|c| matches!(c, Call::SetPreviewSize(_, FrameFormat::Mjpeg, true))),
            1
        );
    }

    #[test]
    fn connect_with_surface_already_present_previews_immediately() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);

        surface_ready(&session, &log, 640, 480);
        assert_eq!(session.snapshot(), SessionState { has_surface: true, ..Default::default() });

        connect(&session);
        let state = session.snapshot();
        assert!(state.is_active && state.is_preview);
        assert_eq!(log.count(|c| matches!(c, Call::SetPreviewDisplay(_, 7))), 1);

        // a second resize while previewing must not restart the stream
        surface_ready(&session, &log, 800, 600);
        assert_eq!(log.count(|c| matches!(c, Call::StartPreview(_))), 1);
    }

    #[test]
    fn rejected_mjpeg_falls_back_to_yuyv() {
        let backend = FakeBackend::rejecting(&[FrameFormat::Mjpeg]);
        let log = backend.log.clone();
        let session = session(backend);

        connect(&session);
        surface_ready(&session, &log, 640, 480);

        let state = session.snapshot();
        assert!(state.is_active && state.is_preview);
        assert_eq!(
            log.count(|c| matches!(c, Call::SetPreviewSize(_, FrameFormat::Yuyv, true))),
            1
        );
        assert_eq!(log.count(|c| matches!(c, Call::StartPreview(_))), 1);
    }

    #[test]
    fn both_formats_rejected_aborts_connect() {
        let backend = FakeBackend::rejecting(&[FrameFormat::Mjpeg, FrameFormat::Yuyv]);
        let log = backend.log.clone();
        let session = session(backend);

        connect(&session);

        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(1))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::SetPreviewSize(..))), 2);

        surface_ready(&session, &log, 640, 480);
        assert_eq!(log.count(|c| matches!(c, Call::StartPreview(_))), 0);
        assert!(!session.snapshot().is_active);
    }

    #[test]
    fn failed_open_leaves_session_idle() {
        let backend = FakeBackend::default();
        backend.fail_next_open();
        let session = session(backend);

        connect(&session);
        assert_eq!(session.snapshot(), SessionState::default());
    }

    #[test]
    fn reconnect_destroys_old_handle_before_opening() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);

        connect(&session);
        connect(&session);

        let calls = log.calls();
        let destroy = calls.iter().position(|c| *c == Call::Destroy(1)).unwrap();
        let second_open = calls.iter().position(|c| *c == Call::Open(2)).unwrap();
        assert!(destroy < second_open);
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(1))), 1);
        assert!(session.snapshot().has_camera);
    }

    #[test]
    fn zero_sized_surface_is_ignored() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);
        connect(&session);
        let before = session.snapshot();
        let calls_before = log.calls().len();

        surface_ready(&session, &log, 0, 480);
        surface_ready(&session, &log, 640, 0);

        assert_eq!(session.snapshot(), before);
        assert_eq!(log.calls().len(), calls_before);
    }

    #[test]
    fn surface_destroyed_stops_preview_but_keeps_camera() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);
        connect(&session);
        surface_ready(&session, &log, 640, 480);

        session.on_surface_event(SurfaceEvent::Destroyed);

        let state = session.snapshot();
        assert!(state.is_active && !state.is_preview && state.has_camera && !state.has_surface);
        assert_eq!(log.count(|c| matches!(c, Call::StopPreview(1))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(_))), 0);

        // resumes once a surface is back
        surface_ready(&session, &log, 640, 480);
        assert!(session.snapshot().is_preview);
        assert_eq!(log.count(|c| matches!(c, Call::StartPreview(1))), 2);
    }

    #[test]
    fn disconnect_closes_and_releases_surface() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);
        connect(&session);
        surface_ready(&session, &log, 640, 480);

        session.on_device_event(DeviceEvent::Disconnect(DeviceInfo::new("uvc")));

        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(log.count(|c| matches!(c, Call::Close(1))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(_))), 0);
        assert_eq!(log.count(|c| matches!(c, Call::ReleaseSurface(7))), 1);
    }

    #[test]
    fn disconnect_without_camera_is_noop() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);
        surface_ready(&session, &log, 640, 480);

        session.on_disconnect(&DeviceInfo::new("uvc"));

        assert!(session.snapshot().has_surface);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn destroy_camera_clears_flags_from_any_state() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let session = session(backend);
        assert!(!session.destroy_camera());

        connect(&session);
        surface_ready(&session, &log, 640, 480);
        assert!(session.destroy_camera());
        assert_eq!(session.snapshot(), SessionState { has_surface: true, ..Default::default() });

        connect(&session);
        session.on_surface_destroyed();
        assert!(session.destroy_camera());
        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(_))), 2);
    }

    #[test]
    fn attach_and_detach_only_notify() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let notices = Arc::new(Mutex::new(Vec::<Notice>::new()));
        let sink = notices.clone();
        let session = SessionCoordinator::new(
            backend,
            CameraConfig::default(),
            Arc::new(Inline),
            Arc::new(move |notice: Notice| sink.lock().unwrap().push(notice)),
        );

        session.on_device_event(DeviceEvent::Attach(DeviceInfo::new("cam")));
        session.on_device_event(DeviceEvent::Detach(DeviceInfo::new("cam")));
        session.on_device_event(DeviceEvent::Cancel(DeviceInfo::new("cam")));

        assert_eq!(session.snapshot(), SessionState::default());
        assert!(log.calls().is_empty());
        let notices = notices.lock().unwrap();
        assert_eq!(
            *notices,
            vec![
                Notice::Attached(DeviceInfo::new("cam")),
                Notice::Detached(DeviceInfo::new("cam"))
            ]
        );
        assert_eq!(notices[0].to_string(), "USB_DEVICE_ATTACHED");
    }

    #[test]
    fn teardown_cancels_pending_connect() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let deferred = Arc::new(Deferred::default());
        let session = SessionCoordinator::new(
            backend,
            CameraConfig::default(),
            deferred.clone(),
            Arc::new(|_| {}),
        );

        connect(&session);
        session.teardown();
        deferred.run_all();

        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(1))), 1);

        // late events after teardown do nothing
        connect(&session);
        deferred.run_all();
        assert!(!session.snapshot().has_camera);
    }

    #[test]
    fn disconnect_while_opening_discards_camera() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let deferred = Arc::new(Deferred::default());
        let session = SessionCoordinator::new(
            backend,
            CameraConfig::default(),
            deferred.clone(),
            Arc::new(|_| {}),
        );

        connect(&session);
        session.on_device_event(DeviceEvent::Disconnect(DeviceInfo::new("uvc")));
        deferred.run_all();

        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(1))), 1);

        // the device can still be connected again afterwards
        connect(&session);
        deferred.run_all();
        assert!(session.snapshot().is_active);
    }

    #[test]
    fn superseded_connect_is_discarded() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let deferred = Arc::new(Deferred::default());
        let session = SessionCoordinator::new(
            backend,
            CameraConfig::default(),
            deferred.clone(),
            Arc::new(|_| {}),
        );

        connect(&session);
        connect(&session);
        deferred.run_all();

        assert!(session.snapshot().has_camera);
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(1))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::Destroy(2))), 0);
    }

    #[test]
    fn preview_implies_active_over_event_sequences() {
        let backend = FakeBackend::rejecting(&[FrameFormat::Mjpeg]);
        let log = backend.log.clone();
        let session = session(backend);

        type Shared = Arc<SessionCoordinator<FakeBackend>>;
        fn step(f: impl Fn(&Shared) + 'static) -> Box<dyn Fn(&Shared)> {
            Box::new(f)
        }
        let steps = vec![
            step(|s| connect(s)),
            step(|s| s.on_device_event(DeviceEvent::Disconnect(DeviceInfo::default()))),
            step(|s| s.on_device_event(DeviceEvent::Attach(DeviceInfo::default()))),
            step(|s| s.on_device_event(DeviceEvent::Detach(DeviceInfo::default()))),
            step(|s| s.on_surface_destroyed()),
            step(|s| {
                s.destroy_camera();
            }),
        ];

        // every ordered triple of steps, with a surface appearing after each
        for a in 0..steps.len() {
            for b in 0..steps.len() {
                for c in 0..steps.len() {
                    for step in [a, b, c] {
                        steps[step](&session);
                        assert_invariant(session.snapshot());
                        surface_ready(&session, &log, 320, 240);
                        assert_invariant(session.snapshot());
                    }
                    session.destroy_camera();
                }
            }
        }
    }
}
