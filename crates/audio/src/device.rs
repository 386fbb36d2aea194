use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::format::AudioFormat;

#[derive(Debug, Clone, serde::Serialize)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
    /// Native format the device would be captured in, if it reports one we decode.
    pub default_format: Option<AudioFormat>,
}

pub fn list_input_devices() -> crate::Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let default_format = device
            .default_input_config()
            .ok()
            .and_then(|config| AudioFormat::from_cpal(&config));
        devices.push(InputDevice {
            is_default: default_name.as_ref() == Some(&name),
            name,
            default_format,
        });
    }

    Ok(devices)
}

/// Find the named input device, or the host default when `name` is `None`.
pub(crate) fn resolve_input_device(host: &Host, name: Option<&str>) -> crate::Result<Device> {
    match name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| crate::CaptureError::DeviceNotFound(name.to_string())),
        None => host
            .default_input_device()
            .ok_or_else(|| crate::CaptureError::DeviceNotFound("default".to_string())),
    }
}
