use std::sync::Arc;

use crate::models::error::RecorderError;
use crate::models::media_models::{DeviceDescriptor, SourceKind, StreamFormat};

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples in `[-1.0, 1.0]`.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// An open device stream delivering buffers to the callback it was opened with.
pub trait AudioStream: Send {
    /// Format negotiated with the device.
    fn format(&self) -> StreamFormat;

    /// Stop delivery and release the device. No callback fires after this returns.
    fn close(self: Box<Self>) -> Result<(), RecorderError>;
}

/// Interface for platform-specific audio sources.
///
/// Implemented by:
/// - `WasapiLoopbackCapture` (system audio)
/// - `WasapiMicCapture` (microphone)
pub trait AudioCaptureProvider: Send + Sync {
    /// Which segment list this provider feeds.
    fn kind(&self) -> SourceKind;

    /// Look for a usable device. Called once when the worker starts.
    fn probe(&self) -> DeviceDescriptor;

    /// Open a stream on a probed device.
    ///
    /// The callback fires on a dedicated audio thread; keep processing minimal.
    fn open(&self, device: &DeviceDescriptor, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError>;
}
