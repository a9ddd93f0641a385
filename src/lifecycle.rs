use std::sync::Arc;

use log::{debug, error};

use crate::{
    camera::{CameraBackend, DeviceSink, UsbMonitor},
    error::CameraError,
    session::SessionCoordinator,
};

/// The camera screen: owns the USB monitor for as long as the screen lives
/// and forwards its callbacks into the session.
pub struct MainScreen<B: CameraBackend, M: UsbMonitor> {
    session: Arc<SessionCoordinator<B>>,
    monitor: Option<M>,
}

impl<B: CameraBackend, M: UsbMonitor> MainScreen<B, M> {
    /// Builds the monitor, handing it a sink that feeds the session.
    pub fn on_create(
        session: Arc<SessionCoordinator<B>>,
        make_monitor: impl FnOnce(DeviceSink<B::Control>) -> Result<M, CameraError>,
    ) -> Result<Self, CameraError> {
        let target = Arc::clone(&session);
        let sink: DeviceSink<B::Control> = Arc::new(move |event| target.on_device_event(event));
        let monitor = make_monitor(sink)?;
        Ok(Self {
            session,
            monitor: Some(monitor),
        })
    }

    pub fn session(&self) -> &Arc<SessionCoordinator<B>> {
        &self.session
    }

    pub fn on_start(&mut self) {
        debug!("onStart");
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(err) = monitor.register() {
                error!("usb monitor register failed: {err}");
            }
        }
    }

    pub fn on_stop(&mut self) {
        debug!("onStop");
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(err) = monitor.unregister() {
                error!("usb monitor unregister failed: {err}");
            }
        }
    }

    /// The camera button: closes an open camera, otherwise asks the user to
    /// pick a device.
    pub fn on_toggle(&mut self) {
        if self.session.destroy_camera() {
            return;
        }
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(err) = monitor.request_device() {
                error!("device selection failed: {err}");
            }
        }
    }

    pub fn on_destroy(&mut self) {
        let Some(monitor) = self.monitor.take() else {
            return;
        };
        debug!("onDestroy");
        self.session.teardown();
        monitor.destroy();
    }
}

impl<B: CameraBackend, M: UsbMonitor> Drop for MainScreen<B, M> {
    fn drop(&mut self) {
        self.on_destroy();
    }
}
