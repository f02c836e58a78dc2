//! WASAPI microphone capture provider.
//!
//! Opens a capture endpoint in shared mode, asking the audio engine to
//! convert to 48 kHz stereo float. Devices that refuse the conversion are
//! captured at their mix format instead.

use windows::Win32::Media::Audio::*;

use screen_recorder_core::models::error::RecorderError;
use screen_recorder_core::models::media_models::{DeviceDescriptor, DeviceInfo, SourceKind, StreamFormat};
use screen_recorder_core::traits::capture_provider::{AudioBufferCallback, AudioCaptureProvider, AudioStream};

use crate::capture_thread::{initialize_client, open_stream, InitializedClient};
use crate::device_enumerator::{mix_format, ComApartment, DeviceEnumerator};

const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// Format the mic is captured at when the device accepts conversion.
pub const REQUESTED_FORMAT: StreamFormat = StreamFormat::new(48_000, 2);

/// Microphone capture from the default or a named input device.
#[derive(Debug, Default, Clone)]
pub struct WasapiMicCapture {
    device_name: Option<String>,
}

impl WasapiMicCapture {
    /// `device_name` is matched exactly against endpoint friendly names;
    /// `None` selects the default capture endpoint.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn find_endpoint(&self) -> Result<DeviceDescriptor, RecorderError> {
        let _com = ComApartment::enter()?;
        let enumerator = DeviceEnumerator::new()?;

        let selected = match &self.device_name {
            Some(name) => {
                let found = enumerator.find_capture_device(name)?;
                if found.is_none() {
                    log::warn!("Microphone '{}' not found; using the default input device", name);
                }
                found
            }
            None => None,
        };
        let (device, endpoint) = match selected {
            Some(endpoint) => (enumerator.device(&endpoint.id)?, endpoint),
            None => match enumerator.default_endpoint(eCapture) {
                Some(found) => found,
                None => return Ok(DeviceDescriptor::NoneFound),
            },
        };

        // Activation is refused when microphone access is off in
        // Settings > Privacy > Microphone.
        let format = match mix_format(&device) {
            Ok(format) => format,
            Err(e) => {
                log::warn!(
                    "Microphone '{}' cannot be opened ({}); check the Windows microphone privacy settings",
                    endpoint.name,
                    e
                );
                return Ok(DeviceDescriptor::NoneFound);
            }
        };
        Ok(DeviceDescriptor::InputOnly(DeviceInfo {
            id: endpoint.id,
            name: endpoint.name,
            format: Some(format),
        }))
    }
}

impl AudioCaptureProvider for WasapiMicCapture {
    fn kind(&self) -> SourceKind {
        SourceKind::MicAudio
    }

    fn probe(&self) -> DeviceDescriptor {
        self.find_endpoint().unwrap_or_else(|e| {
            log::error!("Capture endpoint enumeration failed: {}", e);
            DeviceDescriptor::NoneFound
        })
    }

    fn open(&self, device: &DeviceDescriptor, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError> {
        let id = device.info().ok_or(RecorderError::DeviceNotAvailable)?.id.clone();
        open_stream("wasapi-mic-capture", move || initialize_mic(&id), callback)
    }
}

fn initialize_mic(id: &str) -> Result<InitializedClient, RecorderError> {
    let enumerator = DeviceEnumerator::new()?;
    let device = enumerator.device(id)?;

    let wanted = float_format(REQUESTED_FORMAT);
    let convert = AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY;
    match initialize_client(&device, convert, Some(&wanted)) {
        Ok(client) => Ok(client),
        Err(e) => {
            log::info!("Microphone rejected {} ({}); using its mix format", REQUESTED_FORMAT, e);
            initialize_client(&device, 0, None)
        }
    }
}

fn float_format(format: StreamFormat) -> WAVEFORMATEX {
    let block_align = format.channels * 4;
    WAVEFORMATEX {
        wFormatTag: WAVE_FORMAT_IEEE_FLOAT,
        nChannels: format.channels,
        nSamplesPerSec: format.sample_rate,
        nAvgBytesPerSec: format.sample_rate * u32::from(block_align),
        nBlockAlign: block_align,
        wBitsPerSample: 32,
        cbSize: 0,
    }
}
