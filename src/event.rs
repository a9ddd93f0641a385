use std::fmt;

/// What the platform tells us about the USB device behind an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str("<unnamed device>")
        } else {
            f.write_str(&self.name)
        }
    }
}

/// USB monitor callbacks, one variant per listener method.
///
/// `C` is the control block the monitor hands out once the user granted
/// access to a device; it is passed through untouched to the camera backend.
#[derive(Debug)]
pub enum DeviceEvent<C> {
    Attach(DeviceInfo),
    Connect {
        device: DeviceInfo,
        control: C,
        create_new: bool,
    },
    Disconnect(DeviceInfo),
    Detach(DeviceInfo),
    Cancel(DeviceInfo),
}

/// Surface provider callbacks.
#[derive(Debug)]
pub enum SurfaceEvent<S> {
    Created,
    Changed {
        surface: S,
        format: i32,
        width: u32,
        height: u32,
    },
    Destroyed,
}

/// Transient, user visible notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Attached(DeviceInfo),
    Detached(DeviceInfo),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Attached(_) => f.write_str("USB_DEVICE_ATTACHED"),
            Notice::Detached(_) => f.write_str("USB_DEVICE_DETACHED"),
        }
    }
}
