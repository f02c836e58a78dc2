use std::path::Path;

use serde::{Deserialize, Serialize};

use super::process;

/// H.264 encoder used for the screen segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoder {
    Nvenc,
    Qsv,
    Amf,
    X264,
}

impl VideoEncoder {
    /// Preference order when probing: hardware first, software last.
    pub const PRIORITY: [VideoEncoder; 4] = [Self::Nvenc, Self::Qsv, Self::Amf, Self::X264];

    pub fn as_ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Qsv => "h264_qsv",
            Self::Amf => "h264_amf",
            Self::X264 => "libx264",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::X264)
    }

    /// Pick the best encoder mentioned in `ffmpeg -encoders` output.
    pub fn best_from_listing(listing: &str) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|encoder| {
                listing
                    .split_whitespace()
                    .any(|word| word == encoder.as_ffmpeg_codec())
            })
            .unwrap_or(Self::X264)
    }
}

/// Ask ffmpeg which encoders it was built with and pick the best one.
///
/// Falls back to libx264 if ffmpeg cannot be run.
pub fn detect(ffmpeg: &Path) -> VideoEncoder {
    let output = match process::command(ffmpeg).args(["-hide_banner", "-encoders"]).output() {
        Ok(output) => output,
        Err(e) => {
            log::warn!("Could not query encoders from {}: {}", ffmpeg.display(), e);
            return VideoEncoder::X264;
        }
    };
    let encoder = VideoEncoder::best_from_listing(&String::from_utf8_lossy(&output.stdout));
    log::info!("Using video encoder {}", encoder.as_ffmpeg_codec());
    encoder
}
