//! Windows audio endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list capture (microphone) and render
//! (speaker/headphone) endpoints with their friendly names.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use screen_recorder_core::models::error::RecorderError;
use screen_recorder_core::models::media_models::StreamFormat;

/// An active audio endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, RecorderError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| RecorderError::Unknown(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// List active capture (microphone) endpoints.
    pub fn list_capture_devices(&self) -> Result<Vec<Endpoint>, RecorderError> {
        self.list_devices(eCapture)
    }

    /// List active render (output) endpoints.
    pub fn list_render_devices(&self) -> Result<Vec<Endpoint>, RecorderError> {
        self.list_devices(eRender)
    }

    /// The default console endpoint for `flow`, if there is one.
    pub fn default_endpoint(&self, flow: EDataFlow) -> Option<(IMMDevice, Endpoint)> {
        unsafe {
            let device = self.enumerator.GetDefaultAudioEndpoint(flow, eConsole).ok()?;
            let id = device.GetId().ok()?.to_string().ok()?;
            let name = friendly_name(&device).unwrap_or_else(|| id.clone());
            Some((
                device,
                Endpoint {
                    id,
                    name,
                    is_default: true,
                },
            ))
        }
    }

    /// First active capture endpoint whose friendly name is exactly `name`.
    pub fn find_capture_device(&self, name: &str) -> Result<Option<Endpoint>, RecorderError> {
        Ok(self.list_capture_devices()?.into_iter().find(|d| d.name == name))
    }

    /// Resolve an endpoint id returned by this enumerator.
    pub fn device(&self, id: &str) -> Result<IMMDevice, RecorderError> {
        let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            self.enumerator
                .GetDevice(PCWSTR(wide_id.as_ptr()))
                .map_err(|_| RecorderError::DeviceNotAvailable)
        }
    }

    fn list_devices(&self, data_flow: EDataFlow) -> Result<Vec<Endpoint>, RecorderError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| RecorderError::Unknown(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| RecorderError::Unknown(format!("GetCount failed: {}", e)))?;

            let default_id = self
                .enumerator
                .GetDefaultAudioEndpoint(data_flow, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut devices = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };
                let name = friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());
                devices.push(Endpoint { id, name, is_default });
            }

            Ok(devices)
        }
    }
}

/// Read `PKEY_Device_FriendlyName` from a device's property store.
pub fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;

        let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
        store.GetValue(&PKEY_Device_FriendlyName, &mut prop_variant).ok()?;

        let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
            if pwsz.is_null() {
                None
            } else {
                let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                Some(String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len)))
            }
        } else {
            None
        };

        PropVariantClear(&mut prop_variant).ok();
        name
    }
}

/// The shared-mode mix format of a device, without starting a stream.
pub fn mix_format(device: &IMMDevice) -> Result<StreamFormat, RecorderError> {
    unsafe {
        let client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| RecorderError::ConfigurationFailed(format!("Activate failed: {}", e)))?;
        let format_ptr = client
            .GetMixFormat()
            .map_err(|e| RecorderError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
        let format = StreamFormat::new((*format_ptr).nSamplesPerSec, (*format_ptr).nChannels);
        CoTaskMemFree(Some(format_ptr as *const _));
        Ok(format)
    }
}

/// Initialise COM (MTA) on the current thread for the guard's lifetime.
pub struct ComApartment;

impl ComApartment {
    pub fn enter() -> Result<Self, RecorderError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| RecorderError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
