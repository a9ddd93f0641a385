use thiserror::Error;

/// Failures reported by the camera seams.
///
/// Only `InvalidArgument` is acted upon by the session: it is what the UVC
/// library raises when a preview size/format combination is rejected.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[cfg(target_os = "android")]
    #[error("jni call failed: {0}")]
    Jni(#[from] jni::errors::Error),

    #[cfg(target_os = "android")]
    #[error("java exception {class}: {message}")]
    JavaException { class: String, message: String },
}

impl CameraError {
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, CameraError::InvalidArgument(_))
    }
}
