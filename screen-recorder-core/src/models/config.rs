use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::RecorderError;
use super::media_models::{CaptureArea, VideoQuality};
use crate::ffmpeg::encoder::VideoEncoder;

/// Configuration for a recording session.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfiguration {
    /// Frame rate / bitrate preset for the video encoder.
    pub quality: VideoQuality,

    /// Full screen or a region from the region selector.
    pub capture_area: CaptureArea,

    /// Capture loopback system audio (default: true).
    pub enable_system_audio: bool,

    /// Capture the microphone (default: false).
    pub enable_mic_audio: bool,

    /// Microphone friendly name, or None for the system default.
    pub mic_device: Option<String>,

    /// Linear gain applied to the system track (1.0 = unchanged).
    pub system_gain: f32,

    /// Linear gain applied to the mic track (1.0 = unchanged).
    pub mic_gain: f32,

    /// Silence prepended to every system-audio segment to line it up with
    /// video and mic. Depends on the loopback backend's latency.
    pub system_audio_delay_ms: u32,

    /// Audio segments at or below this size are treated as failed captures.
    pub min_audio_segment_bytes: u64,

    /// Headroom left by peak normalisation of the final track, in dB.
    pub normalize_headroom_db: f64,

    /// Where finished recordings are written.
    pub output_directory: PathBuf,

    /// Write a `.metadata.json` sidecar next to each finished recording.
    pub write_metadata: bool,

    /// Parent of the per-session temporary area (system temp dir if None).
    pub temp_root: Option<PathBuf>,

    /// ffmpeg executable.
    pub ffmpeg_path: PathBuf,

    /// Fixed video encoder, or None to probe ffmpeg for the best one.
    pub video_encoder: Option<VideoEncoder>,

    /// How often workers check the capture signal.
    pub poll_interval_ms: u64,

    /// Bounded wait for the encoder to exit after the quit request.
    pub encoder_shutdown_timeout_ms: u64,

    /// Bounded wait for each worker thread when stopping.
    pub worker_join_timeout_ms: u64,
}

impl RecordingConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if let CaptureArea::Region(region) = &self.capture_area {
            region.validate()?;
        }
        if !(self.system_gain.is_finite() && self.system_gain >= 0.0) {
            return Err(format!("invalid system gain: {}", self.system_gain));
        }
        if !(self.mic_gain.is_finite() && self.mic_gain >= 0.0) {
            return Err(format!("invalid mic gain: {}", self.mic_gain));
        }
        if !(self.normalize_headroom_db.is_finite() && self.normalize_headroom_db >= 0.0) {
            return Err(format!("invalid normalisation headroom: {}", self.normalize_headroom_db));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err("ffmpeg path is empty".into());
        }
        Ok(())
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RecorderError> {
        let json = fs::read_to_string(path)
            .map_err(|e| RecorderError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| RecorderError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        Ok(config)
    }

    /// Converts a 0-100 volume slider value into a linear gain.
    pub fn gain_from_percent(percent: u8) -> f32 {
        f32::from(percent.min(100)) / 100.0
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn encoder_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.encoder_shutdown_timeout_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

/// `<Videos>/Screen Recordings`, falling back to the home directory.
pub fn default_output_directory() -> PathBuf {
    dirs_next::video_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Screen Recordings")
}

impl Default for RecordingConfiguration {
    fn default() -> Self {
        Self {
            quality: VideoQuality::Medium,
            capture_area: CaptureArea::FullScreen,
            enable_system_audio: true,
            enable_mic_audio: false,
            mic_device: None,
            system_gain: 1.0,
            mic_gain: 1.0,
            system_audio_delay_ms: 240,
            min_audio_segment_bytes: 1000,
            normalize_headroom_db: 0.1,
            output_directory: default_output_directory(),
            write_metadata: false,
            temp_root: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_encoder: None,
            poll_interval_ms: 50,
            encoder_shutdown_timeout_ms: 3000,
            worker_join_timeout_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media_models::CaptureRegion;

    #[test]
    fn defaults_are_valid() {
        let config = RecordingConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.system_audio_delay_ms, 240);
        assert_eq!(config.min_audio_segment_bytes, 1000);
        assert!(config.output_directory.ends_with("Screen Recordings"));
    }

    #[test]
    fn rejects_negative_gain() {
        let config = RecordingConfiguration {
            mic_gain: -0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_region() {
        let config = RecordingConfiguration {
            capture_area: CaptureArea::Region(CaptureRegion {
                x: 0,
                y: 0,
                width: 0,
                height: 100,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(
            &path,
            r#"{
                "quality": "very-high",
                "enable_mic_audio": true,
                "system_gain": 0.5,
                "capture_area": { "region": { "x": 10, "y": 20, "width": 800, "height": 600 } }
            }"#,
        )
        .unwrap();

        let config = RecordingConfiguration::load(&path).unwrap();
        assert_eq!(config.quality, VideoQuality::VeryHigh);
        assert!(config.enable_mic_audio);
        assert!(config.enable_system_audio);
        assert_eq!(config.system_gain, 0.5);
        assert_eq!(config.poll_interval_ms, 50);
        assert!(matches!(config.capture_area, CaptureArea::Region(r) if r.width == 800));
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RecordingConfiguration::load(&path),
            Err(RecorderError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn gain_from_percent_clamps() {
        assert_eq!(RecordingConfiguration::gain_from_percent(50), 0.5);
        assert_eq!(RecordingConfiguration::gain_from_percent(100), 1.0);
        assert_eq!(RecordingConfiguration::gain_from_percent(250), 1.0);
    }
}
