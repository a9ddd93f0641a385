use std::{cell::RefCell, rc::Rc, sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, error, info};
use slint::{ComponentHandle, Timer, TimerMode};

use crate::{
    camera::{CameraBackend, UsbMonitor},
    config::CameraConfig,
    event::Notice,
    lifecycle::MainScreen,
    session::{Notifier, SessionCoordinator},
    splash::{Navigator, Screen, SplashRouter},
    worker::Worker,
};

const TOAST_DURATION: Duration = Duration::from_millis(2000);

slint::slint! {
    import { Button } from "std-widgets.slint";
    export component MainWindow inherits Window {
        in property <bool> show-splash: true;
        in-out property <image> camera-texture <=> preview.source;
        in property <bool> camera-open;
        in property <string> status;
        in property <string> toast;
        in property <bool> toast-visible;
        callback toggle-camera();
        callback back-pressed();

        title: "UVC Camera";
        preferred-width: 640px;
        preferred-height: 540px;
        background: #101010;
        forward-focus: keys;

        keys := FocusScope {
            width: 100%;
            height: 100%;
            key-pressed(event) => {
                if (event.text == Key.Escape) {
                    root.back-pressed();
                    return accept;
                }
                return reject;
            }

            Rectangle {
                width: 100%;
                height: 100%;
                visible: !root.show-splash;
                preview := Image {
                    width: 100%;
                    height: 100%;
                    image-fit: contain;
                }
                Text {
                    x: 8px;
                    y: 8px;
                    text: root.status;
                    color: white;
                }
                Rectangle {
                    width: 160px;
                    height: 40px;
                    x: (parent.width - self.width) / 2;
                    y: parent.height - self.height - 12px;
                    Button {
                        width: parent.width;
                        height: parent.height;
                        text: root.camera-open ? "Close camera" : "Open camera";
                        clicked => {
                            root.toggle-camera();
                        }
                    }
                }
                Rectangle {
                    visible: root.toast-visible;
                    width: toast-text.preferred-width + 24px;
                    height: 32px;
                    x: (parent.width - self.width) / 2;
                    y: parent.height - self.height - 64px;
                    border-radius: 6px;
                    background: #000000c0;
                    toast-text := Text {
                        text: root.toast;
                        color: white;
                    }
                }
            }

            Rectangle {
                width: 100%;
                height: 100%;
                visible: root.show-splash;
                background: #202020;
                VerticalLayout {
                    alignment: center;
                    spacing: 8px;
                    Text {
                        text: "UVC Camera";
                        font-size: 28px;
                        color: white;
                        horizontal-alignment: center;
                    }
                    Text {
                        text: "USB-OTG video preview";
                        color: #c0c0c0;
                        horizontal-alignment: center;
                    }
                }
            }
        }
    }
}

/// How the main page's preview area takes part in the surface lifecycle.
trait PreviewArea<B: CameraBackend> {
    fn shown(&mut self, app: &MainWindow, session: &SessionCoordinator<B>);
    fn hidden(&mut self, session: &SessionCoordinator<B>);
    /// Called on every UI tick.
    fn refresh(&mut self, app: &MainWindow);
}

pub fn run(#[cfg(target_os = "android")] android_app: slint::android::AndroidApp) -> Result<()> {
    let config = CameraConfig::from_env();
    info!("starting with {config:?}");
    let worker = Arc::new(Worker::spawn("uvc-worker")?);
    let app = MainWindow::new()?;
    let notifier = toast_notifier(app.as_weak());

    #[cfg(target_os = "android")]
    let result = android::run(app, android_app, config, worker.clone(), notifier);
    #[cfg(not(target_os = "android"))]
    let result = desktop::run(app, config, worker.clone(), notifier);

    drop(worker);
    result
}

fn toast_notifier(app: slint::Weak<MainWindow>) -> Notifier {
    Arc::new(move |notice: Notice| {
        let text = notice.to_string();
        let shown = app.upgrade_in_event_loop(move |app| {
            app.set_toast(text.into());
            app.set_toast_visible(true);
            let app = app.as_weak();
            Timer::single_shot(TOAST_DURATION, move || {
                if let Some(app) = app.upgrade() {
                    app.set_toast_visible(false);
                }
            });
        });
        if let Err(err) = shown {
            debug!("toast dropped: {err}");
        }
    })
}

fn drive<B, M, P>(
    app: MainWindow,
    screen: MainScreen<B, M>,
    config: &CameraConfig,
    preview: P,
) -> Result<()>
where
    B: CameraBackend,
    M: UsbMonitor + 'static,
    P: PreviewArea<B> + 'static,
{
    let screen = Rc::new(RefCell::new(screen));
    let preview = Rc::new(RefCell::new(preview));
    let navigator = Rc::new(RefCell::new(Navigator::new(Screen::Splash)));
    app.set_show_splash(true);

    let router = {
        let app = app.as_weak();
        let screen = screen.clone();
        let preview = preview.clone();
        let navigator = navigator.clone();
        SplashRouter::start(config.splash_delay, move || {
            let Some(app) = app.upgrade() else {
                return;
            };
            navigator.borrow_mut().replace_clearing_history(Screen::Main);
            app.set_show_splash(false);
            let mut screen = screen.borrow_mut();
            screen.on_start();
            preview.borrow_mut().shown(&app, screen.session());
        })
    };

    let toggle_screen = screen.clone();
    app.on_toggle_camera(move || toggle_screen.borrow_mut().on_toggle());

    let back_navigator = navigator.clone();
    app.on_back_pressed(move || {
        if back_navigator.borrow_mut().back().is_none() {
            if let Err(err) = slint::quit_event_loop() {
                error!("quit failed: {err}");
            }
        }
    });

    let ticker = Timer::default();
    {
        let app = app.as_weak();
        let screen = screen.clone();
        let preview = preview.clone();
        ticker.start(TimerMode::Repeated, Duration::from_millis(10), move || {
            let Some(app) = app.upgrade() else {
                return;
            };
            preview.borrow_mut().refresh(&app);
            let state = screen.borrow().session().snapshot();
            app.set_camera_open(state.has_camera);
            let status = format!("active: {}  preview: {}", state.is_active, state.is_preview);
            app.set_status(status.into());
        });
    }

    app.run()?;

    ticker.stop();
    if router.is_pending() {
        debug!("closed during splash");
    }
    drop(router);

    let mut screen = screen.borrow_mut();
    if navigator.borrow().current() == Screen::Main {
        preview.borrow_mut().hidden(screen.session());
        screen.on_stop();
    }
    screen.on_destroy();
    Ok(())
}

#[cfg(not(target_os = "android"))]
mod desktop {
    use std::sync::{mpsc::Receiver, Arc};

    use anyhow::Result;
    use slint::{ComponentHandle, Image};

    use super::{drive, MainWindow, PreviewArea};
    use crate::{
        camera::desktop::{DesktopBackend, DesktopMonitor, Frame, FrameSink},
        config::CameraConfig,
        event::SurfaceEvent,
        lifecycle::MainScreen,
        session::{Notifier, SessionCoordinator},
        worker::Worker,
    };

    /// RGBA format code reported with desktop surfaces.
    const RGBA_8888: i32 = 1;

    struct SinkPreview {
        sink: FrameSink,
        frames: Receiver<Frame>,
    }

    impl PreviewArea<DesktopBackend> for SinkPreview {
        fn shown(&mut self, app: &MainWindow, session: &SessionCoordinator<DesktopBackend>) {
            let size = app.window().size();
            session.on_surface_event(SurfaceEvent::Created);
            session.on_surface_event(SurfaceEvent::Changed {
                surface: self.sink.clone(),
                format: RGBA_8888,
                width: size.width,
                height: size.height,
            });
        }

        fn hidden(&mut self, session: &SessionCoordinator<DesktopBackend>) {
            session.on_surface_event(SurfaceEvent::Destroyed);
        }

        fn refresh(&mut self, app: &MainWindow) {
            if let Some(frame) = self.frames.try_iter().last() {
                app.set_camera_texture(Image::from_rgba8(frame));
            }
        }
    }

    pub fn run(
        app: MainWindow,
        config: CameraConfig,
        worker: Arc<Worker>,
        notifier: Notifier,
    ) -> Result<()> {
        let session = SessionCoordinator::new(DesktopBackend, config.clone(), worker, notifier);
        let index = config.camera_index;
        let screen = MainScreen::on_create(session, |sink| Ok(DesktopMonitor::new(index, sink)))?;
        let (sink, frames) = FrameSink::channel();
        drive(app, screen, &config, SinkPreview { sink, frames })
    }
}

#[cfg(target_os = "android")]
mod android {
    use std::sync::Arc;

    use anyhow::Result;
    use jni::{
        objects::JObject,
        sys::{jobject, JNIInvokeInterface_},
        JavaVM,
    };

    use super::{drive, MainWindow, PreviewArea};
    use crate::{
        camera::{
            bridge::{self, BridgeMonitor},
            uvc::UvcBackend,
        },
        config::CameraConfig,
        lifecycle::MainScreen,
        session::{Notifier, SessionCoordinator},
        worker::Worker,
    };

    /// The preview `SurfaceView` belongs to the Java bridge, which reports
    /// its lifecycle straight to the session.
    struct BridgePreview;

    impl PreviewArea<UvcBackend> for BridgePreview {
        fn shown(&mut self, _app: &MainWindow, _session: &SessionCoordinator<UvcBackend>) {}

        fn hidden(&mut self, _session: &SessionCoordinator<UvcBackend>) {}

        fn refresh(&mut self, _app: &MainWindow) {}
    }

    pub fn run(
        app: MainWindow,
        android_app: slint::android::AndroidApp,
        config: CameraConfig,
        worker: Arc<Worker>,
        notifier: Notifier,
    ) -> Result<()> {
        let vm_ptr = android_app.vm_as_ptr() as *mut *const JNIInvokeInterface_;
        let vm = Arc::new(unsafe { JavaVM::from_raw(vm_ptr)? });
        let activity = {
            let env = vm.attach_current_thread()?;
            let activity = unsafe { JObject::from_raw(android_app.activity_as_ptr() as jobject) };
            env.new_global_ref(activity)?
        };

        let backend = UvcBackend::new(vm.clone(), activity.as_obj())?;
        let session = SessionCoordinator::new(backend, config.clone(), worker, notifier);
        bridge::install(session.clone());
        let screen = MainScreen::on_create(session, |sink| {
            BridgeMonitor::new(vm.clone(), activity.clone(), sink)
        })?;

        let result = drive(app, screen, &config, BridgePreview);
        bridge::uninstall();
        result
    }
}
