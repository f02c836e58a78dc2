//! Command-line arguments and how they override the configuration file.

use std::path::PathBuf;

use clap::Parser;

use screen_recorder_core::models::config::RecordingConfiguration;
use screen_recorder_core::models::media_models::{CaptureArea, CaptureRegion, VideoQuality};

#[derive(Debug, Parser)]
#[command(name = "screen-recorder")]
#[command(about = "Record the screen with system audio and microphone into one MP4")]
#[command(version)]
pub struct Args {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Quality preset: low, medium, high, very-high
    #[arg(short, long)]
    pub quality: Option<VideoQuality>,

    /// Capture only this rectangle, as x,y,width,height
    #[arg(short, long, value_name = "X,Y,W,H")]
    pub region: Option<CaptureRegion>,

    /// Record system audio (loopback)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub system_audio: Option<bool>,

    /// Record the microphone
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub mic: Option<bool>,

    /// Microphone friendly name (see --list-mics); default input otherwise
    #[arg(long, value_name = "NAME")]
    pub mic_device: Option<String>,

    /// System audio volume, 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub system_volume: Option<u8>,

    /// Microphone volume, 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub mic_volume: Option<u8>,

    /// Where finished recordings are saved
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Stop automatically after this many recorded seconds
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<f64>,

    /// Write a .metadata.json sidecar next to the recording
    #[arg(long)]
    pub metadata: bool,

    /// List microphones and exit
    #[arg(long)]
    pub list_mics: bool,
}

impl Args {
    /// The configuration file (or defaults) with every given flag applied.
    pub fn to_config(&self) -> Result<RecordingConfiguration, String> {
        let mut config = match &self.config {
            Some(path) => RecordingConfiguration::load(path).map_err(|e| e.to_string())?,
            None => RecordingConfiguration::default(),
        };

        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(region) = self.region {
            config.capture_area = CaptureArea::Region(region);
        }
        if let Some(enabled) = self.system_audio {
            config.enable_system_audio = enabled;
        }
        if let Some(enabled) = self.mic {
            config.enable_mic_audio = enabled;
        }
        if let Some(name) = &self.mic_device {
            config.mic_device = Some(name.clone());
            config.enable_mic_audio = true;
        }
        if let Some(volume) = self.system_volume {
            config.system_gain = RecordingConfiguration::gain_from_percent(volume);
        }
        if let Some(volume) = self.mic_volume {
            config.mic_gain = RecordingConfiguration::gain_from_percent(volume);
        }
        if let Some(dir) = &self.output_dir {
            config.output_directory = dir.clone();
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg_path = ffmpeg.clone();
        }
        if self.metadata {
            config.write_metadata = true;
        }
        if let Some(secs) = self.duration {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(format!("invalid duration: {}", secs));
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("screen-recorder").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_gives_defaults() {
        let config = parse(&[]).to_config().unwrap();
        assert_eq!(config, RecordingConfiguration::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--quality",
            "very-high",
            "--region",
            "10,20,640,480",
            "--mic",
            "--system-audio",
            "false",
            "--mic-volume",
            "50",
            "--metadata",
        ])
        .to_config()
        .unwrap();

        assert_eq!(config.quality, VideoQuality::VeryHigh);
        assert_eq!(
            config.capture_area,
            CaptureArea::Region(CaptureRegion {
                x: 10,
                y: 20,
                width: 640,
                height: 480
            })
        );
        assert!(config.enable_mic_audio);
        assert!(!config.enable_system_audio);
        assert_eq!(config.mic_gain, 0.5);
        assert_eq!(config.system_gain, 1.0);
        assert!(config.write_metadata);
    }

    #[test]
    fn naming_a_mic_enables_it() {
        let config = parse(&["--mic-device", "USB Headset"]).to_config().unwrap();
        assert!(config.enable_mic_audio);
        assert_eq!(config.mic_device.as_deref(), Some("USB Headset"));
    }

    #[test]
    fn out_of_range_volume_is_rejected() {
        let argv = ["screen-recorder", "--system-volume", "150"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn bad_region_is_rejected() {
        let argv = ["screen-recorder", "--region", "0,0,1"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn config_file_is_the_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{ "quality": "low", "enable_mic_audio": true }"#).unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--quality", "high"])
            .to_config()
            .unwrap();
        assert_eq!(config.quality, VideoQuality::High);
        assert!(config.enable_mic_audio);
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        assert!(parse(&["--duration", "0"]).to_config().is_err());
    }
}
