//! Argument lists for the ffmpeg invocations.

use std::path::Path;

use super::encoder::VideoEncoder;
use crate::models::media_models::{CaptureArea, VideoQuality};

/// Desktop grabbing input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabBackend {
    /// Windows GDI desktop grab.
    GdiGrab,
    /// X11 display, e.g. `:0.0`.
    X11Grab { display: String },
    /// macOS screen device index, e.g. `1`.
    AvFoundation { screen: String },
}

impl GrabBackend {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            Self::GdiGrab
        } else if cfg!(target_os = "macos") {
            Self::AvFoundation { screen: "1".into() }
        } else {
            Self::X11Grab {
                display: std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".into()),
            }
        }
    }

    fn format_name(&self) -> &'static str {
        match self {
            Self::GdiGrab => "gdigrab",
            Self::X11Grab { .. } => "x11grab",
            Self::AvFoundation { .. } => "avfoundation",
        }
    }
}

/// Builder for one screen-capture encoder invocation.
#[derive(Debug, Clone)]
pub struct ScreenGrabCommand {
    backend: GrabBackend,
    framerate: u32,
    bitrate_kbps: u32,
    video_codec: String,
    area: CaptureArea,
    output_path: String,
}

impl ScreenGrabCommand {
    pub fn new(output_path: &Path, backend: GrabBackend) -> Self {
        let quality = VideoQuality::default();
        Self {
            backend,
            framerate: quality.fps(),
            bitrate_kbps: quality.bitrate_kbps(),
            video_codec: VideoEncoder::X264.as_ffmpeg_codec().to_string(),
            area: CaptureArea::FullScreen,
            output_path: output_path.to_string_lossy().into_owned(),
        }
    }

    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.framerate = quality.fps();
        self.bitrate_kbps = quality.bitrate_kbps();
        self
    }

    pub fn with_encoder(mut self, encoder: VideoEncoder) -> Self {
        self.video_codec = encoder.as_ffmpeg_codec().to_string();
        self
    }

    pub fn with_area(mut self, area: CaptureArea) -> Self {
        self.area = area;
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            self.backend.format_name().to_string(),
            "-framerate".to_string(),
            self.framerate.to_string(),
        ];
        let mut filter = None;

        match (&self.backend, self.area) {
            (GrabBackend::GdiGrab, CaptureArea::FullScreen) => {
                args.extend(["-i".to_string(), "desktop".to_string()]);
            }
            (GrabBackend::GdiGrab, CaptureArea::Region(region)) => {
                let (width, height) = region.even_size();
                args.extend([
                    "-offset_x".to_string(),
                    region.x.to_string(),
                    "-offset_y".to_string(),
                    region.y.to_string(),
                    "-video_size".to_string(),
                    format!("{}x{}", width, height),
                    "-i".to_string(),
                    "desktop".to_string(),
                ]);
            }
            (GrabBackend::X11Grab { display }, CaptureArea::FullScreen) => {
                args.extend(["-i".to_string(), display.clone()]);
            }
            (GrabBackend::X11Grab { display }, CaptureArea::Region(region)) => {
                let (width, height) = region.even_size();
                args.extend([
                    "-video_size".to_string(),
                    format!("{}x{}", width, height),
                    "-i".to_string(),
                    format!("{}+{},{}", display, region.x, region.y),
                ]);
            }
            (GrabBackend::AvFoundation { screen }, area) => {
                args.extend([
                    "-capture_cursor".to_string(),
                    "1".to_string(),
                    "-i".to_string(),
                    format!("{}:none", screen),
                ]);
                if let CaptureArea::Region(region) = area {
                    let (width, height) = region.even_size();
                    filter = Some(format!("crop={}:{}:{}:{}", width, height, region.x, region.y));
                }
            }
        }

        args.push("-an".to_string());
        if let Some(filter) = filter {
            args.extend(["-vf".to_string(), filter]);
        }
        args.extend([
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-b:v".to_string(),
            format!("{}k", self.bitrate_kbps),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            self.output_path.clone(),
        ]);

        args
    }
}

/// Stream-copy concatenation of the files listed in a concat manifest.
pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        manifest.to_string_lossy().into_owned(),
        "-c".to_string(),
        "copy".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Mux the first video stream of `video` with the first audio stream of
/// `audio`, re-encoding audio to AAC 192k and trimming to the shorter input.
pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().into_owned(),
        "-i".to_string(),
        audio.to_string_lossy().into_owned(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-async".to_string(),
        "1".to_string(),
        "-shortest".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}
