//! # screen-recorder-windows
//!
//! Windows WASAPI audio backend for screen-recorder.
//!
//! Provides:
//! - `WasapiLoopbackCapture`: system audio via loopback on the default render endpoint
//! - `WasapiMicCapture`: microphone capture from the default or a named input
//! - `DeviceEnumerator`: endpoint listing via the MMDevice API
//!
//! Video needs nothing from this crate: the core drives ffmpeg's `gdigrab`.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use screen_recorder_core::{RecordingConfiguration, RecordingSession};
//! use screen_recorder_windows::{WasapiLoopbackCapture, WasapiMicCapture};
//!
//! let config = RecordingConfiguration::default();
//! let mut session = RecordingSession::with_ffmpeg(
//!     config,
//!     Some(Arc::new(WasapiLoopbackCapture::new())),
//!     Some(Arc::new(WasapiMicCapture::new(None))),
//! )?;
//! session.start();
//! ```

#[cfg(target_os = "windows")]
pub mod capture_thread;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;

#[cfg(target_os = "windows")]
pub use device_enumerator::{DeviceEnumerator, Endpoint};
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackCapture;
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicCapture;
