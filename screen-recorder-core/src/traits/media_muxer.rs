use std::path::{Path, PathBuf};

use crate::models::error::RecorderError;
use crate::models::segment::Segment;
use crate::processing::audio_mixer::MixedAudio;

/// Inputs of the final concat + mux step.
#[derive(Debug, Clone, Copy)]
pub struct MuxJob<'a> {
    /// Video segments; muxers must honour index order.
    pub video_segments: &'a [Segment],
    pub audio: Option<&'a MixedAudio>,
    /// Temporary area for intermediate files.
    pub scratch_dir: &'a Path,
    /// Final file path. Nothing may appear here unless the mux succeeded.
    pub destination: &'a Path,
}

/// Turns the segment lists into the final recording file.
pub trait MediaMuxer: Send + Sync {
    fn finalize(&self, job: &MuxJob<'_>) -> Result<PathBuf, RecorderError>;
}
