use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source a segment was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Video,
    SystemAudio,
    MicAudio,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [Self::Video, Self::SystemAudio, Self::MicAudio];

    /// File-name stem for segments of this kind.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Video => "video_segment",
            Self::SystemAudio => "system_audio",
            Self::MicAudio => "mic_audio",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::SystemAudio | Self::MicAudio => "wav",
        }
    }

    pub fn is_audio(&self) -> bool {
        !matches!(self, Self::Video)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::SystemAudio => "system-audio",
            Self::MicAudio => "mic-audio",
        };
        f.write_str(name)
    }
}

/// Video quality preset, mapped to a fixed frame rate and bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoQuality {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl VideoQuality {
    pub fn fps(&self) -> u32 {
        match self {
            Self::Low => 30,
            Self::Medium | Self::High | Self::VeryHigh => 60,
        }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            Self::Low => 1500,
            Self::Medium => 4500,
            Self::High => 8000,
            Self::VeryHigh => 12000,
        }
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "very-high" | "veryhigh" => Ok(Self::VeryHigh),
            other => Err(format!("unknown quality preset: {}", other)),
        }
    }
}

/// Screen rectangle handed over by the region selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn validate(&self) -> Result<(), String> {
        if self.width < 2 || self.height < 2 {
            return Err(format!("region too small: {}x{}", self.width, self.height));
        }
        Ok(())
    }

    /// Width and height rounded down to even values, as yuv420p requires.
    pub fn even_size(&self) -> (u32, u32) {
        (self.width & !1, self.height & !1)
    }
}

impl FromStr for CaptureRegion {
    type Err = String;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, w, h] = parts.as_slice() else {
            return Err(format!("expected x,y,width,height, got '{}'", s));
        };
        let region = Self {
            x: x.parse().map_err(|_| format!("invalid x: {}", x))?,
            y: y.parse().map_err(|_| format!("invalid y: {}", y))?,
            width: w.parse().map_err(|_| format!("invalid width: {}", w))?,
            height: h.parse().map_err(|_| format!("invalid height: {}", h))?,
        };
        region.validate()?;
        Ok(region)
    }
}

/// What the video worker grabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureArea {
    #[default]
    FullScreen,
    Region(CaptureRegion),
}

/// PCM stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz / {} ch", self.sample_rate, self.channels)
    }
}

/// An audio endpoint found by a provider probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub format: Option<StreamFormat>,
}

/// Result of probing for a capture device, decided once per worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceDescriptor {
    /// A render endpoint that can be captured in loopback.
    LoopbackCapable(DeviceInfo),
    /// A plain capture endpoint (microphone).
    InputOnly(DeviceInfo),
    NoneFound,
}

impl DeviceDescriptor {
    pub fn info(&self) -> Option<&DeviceInfo> {
        match self {
            Self::LoopbackCapable(info) | Self::InputOnly(info) => Some(info),
            Self::NoneFound => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::NoneFound)
    }
}

/// How a source fared over a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceStatus {
    /// Not enabled in the configuration.
    Disabled,
    /// No usable device; contributed nothing.
    Unavailable,
    /// Ran, but every interval failed or was empty.
    NoData,
    /// At least one segment committed.
    Captured,
    /// Did not shut down in time and was abandoned.
    Abandoned,
}
