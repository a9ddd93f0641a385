//! Glue to the Java side of the UVC library.
//!
//! `USBMonitor`, the device dialog and the preview `SurfaceView` only exist
//! in Java, so a small host class (`com.example.cameraapp.UvcBridge`) owns
//! them. Rust drives it through static methods and it calls back into the
//! `native*` functions exported at the bottom of this file. The class lives
//! in `android/src/main/java/com/example/cameraapp/UvcBridge.java`.

use std::sync::{Arc, Mutex, PoisonError};

use jni::{
    objects::{GlobalRef, JClass, JObject, JString, JValue},
    sys::{jboolean, jint, JNI_TRUE},
    JNIEnv, JavaVM,
};
use log::{error, warn};

use super::{
    uvc::{check, load_class, JavaSurface, UvcBackend},
    DeviceSink, UsbMonitor,
};
use crate::{
    error::CameraError,
    event::{DeviceEvent, DeviceInfo, SurfaceEvent},
    session::SessionCoordinator,
};

pub const BRIDGE_CLASS: &str = "com.example.cameraapp.UvcBridge";

type Session = Arc<SessionCoordinator<UvcBackend>>;

static SESSION: Mutex<Option<Session>> = Mutex::new(None);
static DEVICE_SINK: Mutex<Option<DeviceSink<GlobalRef>>> = Mutex::new(None);

/// Routes bridge surface callbacks into `session` until [`uninstall`].
pub fn install(session: Session) {
    *SESSION.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
}

pub fn uninstall() {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner).take();
    DEVICE_SINK.lock().unwrap_or_else(PoisonError::into_inner).take();
}

fn session() -> Option<Session> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn dispatch(event: DeviceEvent<GlobalRef>) {
    let sink = DEVICE_SINK.lock().unwrap_or_else(PoisonError::into_inner).clone();
    match sink {
        Some(sink) => sink(event),
        None => warn!("device event without a monitor: {event:?}"),
    }
}

/// `USBMonitor` behind the bridge class.
pub struct BridgeMonitor {
    vm: Arc<JavaVM>,
    activity: GlobalRef,
    bridge_class: GlobalRef,
}

impl BridgeMonitor {
    pub fn new(
        vm: Arc<JavaVM>,
        activity: GlobalRef,
        sink: DeviceSink<GlobalRef>,
    ) -> Result<Self, CameraError> {
        let bridge_class = {
            let mut env = vm.attach_current_thread()?;
            let bridge_class = load_class(&mut env, activity.as_obj(), BRIDGE_CLASS)?;
            let class: &JClass = bridge_class.as_obj().into();
            let result = env.call_static_method(
                class,
                "create",
                "(Landroid/app/Activity;)V",
                &[JValue::Object(activity.as_obj())],
            );
            check(&mut env, result)?;
            bridge_class
        };
        *DEVICE_SINK.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(Self {
            vm,
            activity,
            bridge_class,
        })
    }

    fn call_static(&self, method: &str, sig: &str, args: &[JValue]) -> Result<(), CameraError> {
        let mut env = self.vm.attach_current_thread()?;
        let class: &JClass = self.bridge_class.as_obj().into();
        let result = env.call_static_method(class, method, sig, args);
        check(&mut env, result).map(|_| ())
    }
}

impl UsbMonitor for BridgeMonitor {
    fn register(&mut self) -> Result<(), CameraError> {
        self.call_static("register", "()V", &[])
    }

    fn unregister(&mut self) -> Result<(), CameraError> {
        self.call_static("unregister", "()V", &[])
    }

    fn request_device(&mut self) -> Result<(), CameraError> {
        self.call_static(
            "showDeviceDialog",
            "(Landroid/app/Activity;)V",
            &[JValue::Object(self.activity.as_obj())],
        )
    }

    fn destroy(self) {
        if let Err(err) = self.call_static("destroy", "()V", &[]) {
            error!("USBMonitor.destroy failed: {err}");
        }
        DEVICE_SINK.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

fn device_info(env: &mut JNIEnv, name: &JString) -> DeviceInfo {
    if name.is_null() {
        return DeviceInfo::default();
    }
    match env.get_string(name) {
        Ok(name) => DeviceInfo::new(String::from(name)),
        Err(err) => {
            warn!("unreadable device name: {err}");
            DeviceInfo::default()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnAttach<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
) {
    dispatch(DeviceEvent::Attach(device_info(&mut env, &name)));
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnConnect<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
    control: JObject<'local>,
    create_new: jboolean,
) {
    let device = device_info(&mut env, &name);
    match env.new_global_ref(control) {
        Ok(control) => dispatch(DeviceEvent::Connect {
            device,
            control,
            create_new: create_new == JNI_TRUE,
        }),
        Err(err) => error!("onConnect: cannot keep control block: {err}"),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnDisconnect<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
) {
    dispatch(DeviceEvent::Disconnect(device_info(&mut env, &name)));
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnDetach<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
) {
    dispatch(DeviceEvent::Detach(device_info(&mut env, &name)));
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnCancel<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
) {
    dispatch(DeviceEvent::Cancel(device_info(&mut env, &name)));
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnSurfaceCreated<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) {
    if let Some(session) = session() {
        session.on_surface_event(SurfaceEvent::Created);
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnSurfaceChanged<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    surface: JObject<'local>,
    format: jint,
    width: jint,
    height: jint,
) {
    let Some(session) = session() else {
        return;
    };
    let width = u32::try_from(width).unwrap_or(0);
    let height = u32::try_from(height).unwrap_or(0);
    if surface.is_null() || width == 0 || height == 0 {
        return;
    }
    match env.new_global_ref(surface) {
        Ok(surface) => session.on_surface_event(SurfaceEvent::Changed {
            surface: JavaSurface::new(session.backend().vm().clone(), surface),
            format,
            width,
            height,
        }),
        Err(err) => error!("surfaceChanged: cannot keep surface: {err}"),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_cameraapp_UvcBridge_nativeOnSurfaceDestroyed<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) {
    if let Some(session) = session() {
        session.on_surface_event(SurfaceEvent::Destroyed);
    }
}
