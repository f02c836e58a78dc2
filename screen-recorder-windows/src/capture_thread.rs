//! The WASAPI capture thread shared by the loopback and microphone providers.
//!
//! COM objects never leave the thread that created them: `open_stream`
//! spawns the thread, the thread initialises the endpoint through the
//! provider's `init` closure, reports the negotiated format (or the
//! initialisation error) back, and only then starts pulling packets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::*;

use screen_recorder_core::models::error::RecorderError;
use screen_recorder_core::models::media_models::StreamFormat;
use screen_recorder_core::traits::capture_provider::{AudioBufferCallback, AudioStream};

use crate::device_enumerator::ComApartment;

const POLL: Duration = Duration::from_millis(10);
const INIT_TIMEOUT: Duration = Duration::from_secs(5);
/// 100 ms, in 100 ns units.
const BUFFER_DURATION: i64 = 1_000_000;

/// A started shared-mode client that delivers 32-bit float frames.
pub struct InitializedClient {
    pub audio_client: IAudioClient,
    pub capture_client: IAudioCaptureClient,
    pub format: StreamFormat,
}

/// Activate and initialise a shared-mode capture client on `device`.
///
/// Uses `requested` when given, the device mix format otherwise. Must run on
/// the capture thread.
pub fn initialize_client(
    device: &IMMDevice,
    flags: u32,
    requested: Option<&WAVEFORMATEX>,
) -> Result<InitializedClient, RecorderError> {
    unsafe {
        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| RecorderError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| RecorderError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
        let wave = requested.unwrap_or(&*mix_format_ptr);
        let format = StreamFormat::new(wave.nSamplesPerSec, wave.nChannels);

        let initialized = audio_client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            flags | AUDCLNT_STREAMFLAGS_NOPERSIST,
            BUFFER_DURATION,
            0,
            wave,
            None,
        );
        CoTaskMemFree(Some(mix_format_ptr as *const _));
        initialized.map_err(|e| RecorderError::ConfigurationFailed(format!("IAudioClient::Initialize failed: {}", e)))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| RecorderError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

        Ok(InitializedClient {
            audio_client,
            capture_client,
            format,
        })
    }
}

/// Handle to a running capture thread.
pub struct WasapiStream {
    format: StreamFormat,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AudioStream for WasapiStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn close(mut self: Box<Self>) -> Result<(), RecorderError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| RecorderError::Unknown("capture thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for WasapiStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Spawn a capture thread named `name` and wait until the endpoint is live.
pub fn open_stream<F>(name: &str, init: F, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError>
where
    F: FnOnce() -> Result<InitializedClient, RecorderError> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();

    let thread_running = Arc::clone(&running);
    let thread_name = name.to_string();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _com = match ComApartment::enter() {
                Ok(guard) => guard,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            let client = match init() {
                Ok(client) => client,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            let _ = tx.send(Ok(client.format));
            boost_thread_priority();
            if let Err(e) = capture_loop(&client, &thread_running, &callback) {
                log::error!("{} stopped: {}", thread_name, e);
            }
            unsafe {
                let _ = client.audio_client.Stop();
            }
        })
        .map_err(|e| RecorderError::SpawnFailed(format!("{} thread: {}", name, e)))?;

    let format = match rx.recv_timeout(INIT_TIMEOUT) {
        Ok(Ok(format)) => format,
        Ok(Err(e)) => {
            let _ = handle.join();
            return Err(e);
        }
        Err(_) => {
            running.store(false, Ordering::SeqCst);
            return Err(RecorderError::Timeout(format!("{} did not initialise", name)));
        }
    };

    Ok(Box::new(WasapiStream {
        format,
        running,
        handle: Some(handle),
    }))
}

/// Register the calling thread with MMCSS as "Pro Audio".
fn boost_thread_priority() {
    let mut task_index: u32 = 0;
    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    unsafe {
        if let Err(e) = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) {
            log::debug!("MMCSS registration failed: {}", e);
        }
    }
}

fn capture_loop(
    client: &InitializedClient,
    running: &AtomicBool,
    callback: &AudioBufferCallback,
) -> Result<(), RecorderError> {
    let sample_rate = f64::from(client.format.sample_rate);
    let channels = client.format.channels;
    let capture = &client.capture_client;

    unsafe {
        client
            .audio_client
            .Start()
            .map_err(|e| RecorderError::Unknown(format!("IAudioClient::Start failed: {}", e)))?;

        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL);

            let mut packet_length = capture
                .GetNextPacketSize()
                .map_err(|e| RecorderError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                capture
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| RecorderError::Unknown(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let total_samples = num_frames as usize * channels as usize;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        let silence = vec![0.0f32; total_samples];
                        callback(&silence, sample_rate, channels);
                    } else {
                        let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                        callback(samples, sample_rate, channels);
                    }
                }

                capture
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| RecorderError::Unknown(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = capture
                    .GetNextPacketSize()
                    .map_err(|e| RecorderError::Unknown(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }
    }

    Ok(())
}
