//! # screen-recorder-core
//!
//! Platform-agnostic core of a segmented screen recorder.
//!
//! Video is captured by an external ffmpeg process, one process and one
//! segment file per recording interval (start, and every resume). System
//! audio and microphone audio are captured by worker threads that flush a
//! WAV segment per interval. On stop the audio segments are mixed into one
//! track and muxed with the concatenated video into a single MP4.
//! Platform backends implement `AudioCaptureProvider` and plug into
//! `RecordingSession`.
//!
//! ## Architecture
//!
//! ```text
//! screen-recorder-core (this crate)
//! ├── traits/       ← AudioCaptureProvider, VideoEncoderLauncher, MediaMuxer, RecorderDelegate
//! ├── models/       ← RecorderError, SessionState, RecordingConfiguration, Segment, reports
//! ├── storage/      ← SegmentStore (per-session temp area), metadata + checksums
//! ├── processing/   ← PcmTrack, AudioMixer, WAV I/O
//! ├── ffmpeg/       ← encoder detection, grab/concat/mux commands, process control
//! └── session/      ← RecordingSession, capture workers, finalize pipeline
//! ```

pub mod ffmpeg;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use ffmpeg::command::GrabBackend;
pub use ffmpeg::encoder::VideoEncoder;
pub use ffmpeg::muxer::FfmpegMuxer;
pub use ffmpeg::process::FfmpegLauncher;
pub use models::config::RecordingConfiguration;
pub use models::error::RecorderError;
pub use models::media_models::{
    CaptureArea, CaptureRegion, DeviceDescriptor, DeviceInfo, SourceKind, SourceStatus, StreamFormat, VideoQuality,
};
pub use models::recording_result::{FinalizeOutcome, FinalizeReport, RecordingMetadata, RecordingResult, SegmentCounts};
pub use models::segment::Segment;
pub use models::state::SessionState;
pub use processing::audio_mixer::{AudioMixer, MixedAudio, MixerSettings};
pub use processing::pcm_track::PcmTrack;
pub use session::controller::RecordingSession;
pub use storage::segment_store::SegmentStore;
pub use traits::capture_provider::{AudioBufferCallback, AudioCaptureProvider, AudioStream};
pub use traits::encoder_launcher::{EncoderProcess, VideoEncoderLauncher, VideoIntervalRequest};
pub use traits::media_muxer::{MediaMuxer, MuxJob};
pub use traits::recorder_delegate::RecorderDelegate;
