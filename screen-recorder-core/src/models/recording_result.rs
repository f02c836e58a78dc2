use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::media_models::{SourceKind, SourceStatus};

/// A finished recording file in the destination directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Per-source segment count for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCounts {
    pub video: usize,
    pub system_audio: usize,
    pub mic_audio: usize,
}

impl SegmentCounts {
    pub fn get(&self, kind: SourceKind) -> usize {
        match kind {
            SourceKind::Video => self.video,
            SourceKind::SystemAudio => self.system_audio,
            SourceKind::MicAudio => self.mic_audio,
        }
    }

    pub fn set(&mut self, kind: SourceKind, count: usize) {
        match kind {
            SourceKind::Video => self.video = count,
            SourceKind::SystemAudio => self.system_audio = count,
            SourceKind::MicAudio => self.mic_audio = count,
        }
    }
}

/// Metadata describing a recording.
///
/// Serializable for the optional JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub created_at: String,
    /// Sources whose audio made it into the final mix.
    pub audio_sources: Vec<SourceKind>,
    pub segments: SegmentCounts,
}

impl RecordingMetadata {
    pub fn new(
        duration_secs: f64,
        file_path: &str,
        checksum: &str,
        audio_sources: Vec<SourceKind>,
        segments: SegmentCounts,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            duration_secs,
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            audio_sources,
            segments,
        }
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_sources.is_empty()
    }
}

/// What `stop()` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// Video muxed with the mixed audio track.
    Complete(RecordingResult),
    /// Video only: no audio source produced usable data, or the mix failed.
    VideoOnly(RecordingResult),
    /// Nothing was written to the destination.
    NoOutput { reason: String },
}

impl FinalizeOutcome {
    pub fn result(&self) -> Option<&RecordingResult> {
        match self {
            Self::Complete(result) | Self::VideoOnly(result) => Some(result),
            Self::NoOutput { .. } => None,
        }
    }
}

/// Summary of one finalized session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    pub duration_secs: f64,
    pub segments: SegmentCounts,
    pub system_audio: SourceStatus,
    pub mic_audio: SourceStatus,
    pub video: SourceStatus,
    pub outcome: FinalizeOutcome,
}

impl FinalizeReport {
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.outcome.result().map(|r| &r.file_path)
    }
}
