//! WASAPI loopback capture provider for system audio.
//!
//! Captures the mix going to a render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions are needed, and
//! DRM-protected audio is silenced by the OS.

use windows::Win32::Media::Audio::*;

use screen_recorder_core::models::error::RecorderError;
use screen_recorder_core::models::media_models::{DeviceDescriptor, DeviceInfo, SourceKind};
use screen_recorder_core::traits::capture_provider::{AudioBufferCallback, AudioCaptureProvider, AudioStream};

use crate::capture_thread::{initialize_client, open_stream};
use crate::device_enumerator::{mix_format, ComApartment, DeviceEnumerator};

/// System audio through loopback on the default render endpoint.
///
/// Captures at the endpoint's native rate and channel count; the capture
/// worker folds the buffers to stereo.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiLoopbackCapture;

impl WasapiLoopbackCapture {
    pub fn new() -> Self {
        Self
    }

    fn find_endpoint() -> Result<DeviceDescriptor, RecorderError> {
        let _com = ComApartment::enter()?;
        let enumerator = DeviceEnumerator::new()?;

        // Every active render endpoint can be looped back; prefer the default.
        let (device, endpoint) = match enumerator.default_endpoint(eRender) {
            Some(found) => found,
            None => {
                let Some(endpoint) = enumerator.list_render_devices()?.into_iter().next() else {
                    return Ok(DeviceDescriptor::NoneFound);
                };
                (enumerator.device(&endpoint.id)?, endpoint)
            }
        };

        let format = mix_format(&device)
            .map_err(|e| log::warn!("Could not read mix format of '{}': {}", endpoint.name, e))
            .ok();
        Ok(DeviceDescriptor::LoopbackCapable(DeviceInfo {
            id: endpoint.id,
            name: endpoint.name,
            format,
        }))
    }
}

impl AudioCaptureProvider for WasapiLoopbackCapture {
    fn kind(&self) -> SourceKind {
        SourceKind::SystemAudio
    }

    fn probe(&self) -> DeviceDescriptor {
        Self::find_endpoint().unwrap_or_else(|e| {
            log::error!("Render endpoint enumeration failed: {}", e);
            DeviceDescriptor::NoneFound
        })
    }

    fn open(&self, device: &DeviceDescriptor, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError> {
        let id = device.info().ok_or(RecorderError::DeviceNotAvailable)?.id.clone();
        open_stream(
            "wasapi-loopback-capture",
            move || {
                let enumerator = DeviceEnumerator::new()?;
                let device = enumerator.device(&id)?;
                initialize_client(&device, AUDCLNT_STREAMFLAGS_LOOPBACK, None)
            },
            callback,
        )
    }
}
