use std::path::PathBuf;

use crate::ffmpeg::encoder::VideoEncoder;
use crate::models::error::RecorderError;
use crate::models::media_models::{CaptureArea, VideoQuality};

/// Everything needed to start encoding one video interval.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoIntervalRequest {
    pub output: PathBuf,
    pub quality: VideoQuality,
    pub area: CaptureArea,
    pub encoder: VideoEncoder,
}

/// A running external encoder.
pub trait EncoderProcess: Send {
    /// Ask the encoder to finish the file and exit.
    fn request_quit(&mut self) -> Result<(), RecorderError>;

    /// Whether the process has exited, without blocking.
    fn try_wait(&mut self) -> Result<bool, RecorderError>;

    /// Terminate immediately and reap the process.
    fn kill(&mut self) -> Result<(), RecorderError>;
}

/// Starts one encoder process per video interval.
pub trait VideoEncoderLauncher: Send + Sync {
    fn launch(&self, request: &VideoIntervalRequest) -> Result<Box<dyn EncoderProcess>, RecorderError>;
}
