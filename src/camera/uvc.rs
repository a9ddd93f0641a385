//! `com.serenegiant.usb.UVCCamera` driven over JNI.

use std::sync::Arc;

use jni::{
    errors::Error as JniError,
    objects::{GlobalRef, JClass, JObject, JString, JValue},
    JNIEnv, JavaVM,
};
use log::{debug, info};

use super::{CameraBackend, CameraHandle, FrameFormat, PreviewSurface};
use crate::error::CameraError;

pub const UVC_CAMERA_CLASS: &str = "com.serenegiant.usb.UVCCamera";
const CONTROL_BLOCK_SIG: &str = "(Lcom/serenegiant/usb/USBMonitor$UsbControlBlock;)V";

/// Resolves an application class through the activity's class loader.
///
/// `FindClass` on a native thread only sees system classes, so library and
/// app classes have to come through here.
pub fn load_class(
    env: &mut JNIEnv,
    activity: &JObject,
    name: &str,
) -> Result<GlobalRef, CameraError> {
    let loader = env
        .call_method(activity, "getClassLoader", "()Ljava/lang/ClassLoader;", &[])?
        .l()?;
    let name = env.new_string(name)?;
    let class = env
        .call_method(
            &loader,
            "loadClass",
            "(Ljava/lang/String;)Ljava/lang/Class;",
            &[JValue::Object(&name)],
        )?
        .l()?;
    Ok(env.new_global_ref(class)?)
}

/// Turns a pending Java exception into a [`CameraError`], clearing it.
/// `IllegalArgumentException` becomes [`CameraError::InvalidArgument`].
pub fn check<T>(env: &mut JNIEnv, result: Result<T, JniError>) -> Result<T, CameraError> {
    match result {
        Ok(value) => Ok(value),
        Err(JniError::JavaException) => {
            let throwable = env.exception_occurred()?;
            env.exception_clear()?;
            let message = describe(env, &throwable).unwrap_or_default();
            if env.is_instance_of(&throwable, "java/lang/IllegalArgumentException")? {
                Err(CameraError::InvalidArgument(message))
            } else {
                let class = env
                    .call_method(&throwable, "getClass", "()Ljava/lang/Class;", &[])
                    .and_then(|class| class.l())
                    .and_then(|class| describe_class(env, &class))
                    .unwrap_or_default();
                Err(CameraError::JavaException { class, message })
            }
        }
        Err(err) => Err(err.into()),
    }
}

fn describe(env: &mut JNIEnv, object: &JObject) -> Result<String, JniError> {
    let text: JString = env
        .call_method(object, "toString", "()Ljava/lang/String;", &[])?
        .l()?
        .into();
    Ok(env.get_string(&text)?.into())
}

fn describe_class(env: &mut JNIEnv, class: &JObject) -> Result<String, JniError> {
    let name: JString = env
        .call_method(class, "getName", "()Ljava/lang/String;", &[])?
        .l()?
        .into();
    Ok(env.get_string(&name)?.into())
}

/// An `android.view.Surface`.
#[derive(Clone)]
pub struct JavaSurface {
    vm: Arc<JavaVM>,
    surface: GlobalRef,
}

impl JavaSurface {
    pub fn new(vm: Arc<JavaVM>, surface: GlobalRef) -> Self {
        Self { vm, surface }
    }
}

impl PreviewSurface for JavaSurface {
    fn release(self) {
        let result = self.vm.attach_current_thread().map_err(CameraError::from).and_then(|mut env| {
            let result = env.call_method(self.surface.as_obj(), "release", "()V", &[]);
            check(&mut env, result).map(|_| ())
        });
        if let Err(err) = result {
            log::error!("Surface.release failed: {err}");
        }
    }
}

pub struct UvcBackend {
    vm: Arc<JavaVM>,
    camera_class: GlobalRef,
}

impl UvcBackend {
    pub fn new(vm: Arc<JavaVM>, activity: &JObject) -> Result<Self, CameraError> {
        let camera_class = {
            let mut env = vm.attach_current_thread()?;
            load_class(&mut env, activity, UVC_CAMERA_CLASS)?
        };
        Ok(Self { vm, camera_class })
    }

    pub fn vm(&self) -> &Arc<JavaVM> {
        &self.vm
    }
}

impl CameraBackend for UvcBackend {
    type Control = GlobalRef;
    type Surface = JavaSurface;
    type Handle = UvcCamera;

    fn open(&self, control: GlobalRef) -> Result<UvcCamera, CameraError> {
        let mut env = self.vm.attach_current_thread()?;
        let class: &JClass = self.camera_class.as_obj().into();
        let created = env.new_object(class, "()V", &[]);
        let camera = check(&mut env, created)?;
        let camera = env.new_global_ref(camera)?;
        let opened = env.call_method(
            camera.as_obj(),
            "open",
            CONTROL_BLOCK_SIG,
            &[JValue::Object(control.as_obj())],
        );
        check(&mut env, opened)?;
        debug!("UVCCamera opened");
        Ok(UvcCamera {
            vm: self.vm.clone(),
            camera,
        })
    }
}

pub struct UvcCamera {
    vm: Arc<JavaVM>,
    camera: GlobalRef,
}

impl UvcCamera {
    fn call_void(&self, method: &str, sig: &str, args: &[JValue]) -> Result<(), CameraError> {
        let mut env = self.vm.attach_current_thread()?;
        let result = env.call_method(self.camera.as_obj(), method, sig, args);
        check(&mut env, result).map(|_| ())
    }
}

impl CameraHandle for UvcCamera {
    type Surface = JavaSurface;

    fn supported_size(&self) -> Result<String, CameraError> {
        let mut env = self.vm.attach_current_thread()?;
        let result = env
            .call_method(self.camera.as_obj(), "getSupportedSize", "()Ljava/lang/String;", &[])
            .and_then(|value| value.l());
        let sizes = check(&mut env, result)?;
        if sizes.is_null() {
            return Ok(String::new());
        }
        let sizes = JString::from(sizes);
        let sizes: String = env.get_string(&sizes)?.into();
        Ok(sizes)
    }

    fn set_preview_size(
        &mut self,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Result<(), CameraError> {
        info!("setPreviewSize {width}x{height} {format}");
        self.call_void(
            "setPreviewSize",
            "(III)V",
            &[
                JValue::Int(width as i32),
                JValue::Int(height as i32),
                JValue::Int(format.code()),
            ],
        )
    }

    fn set_preview_display(&mut self, surface: &JavaSurface) -> Result<(), CameraError> {
        self.call_void(
            "setPreviewDisplay",
            "(Landroid/view/Surface;)V",
            &[JValue::Object(surface.surface.as_obj())],
        )
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        self.call_void("startPreview", "()V", &[])
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.call_void("stopPreview", "()V", &[])
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.call_void("close", "()V", &[])
    }

    fn destroy(&mut self) -> Result<(), CameraError> {
        self.call_void("destroy", "()V", &[])
    }
}
