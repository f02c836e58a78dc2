//! Stop-time pipeline: snapshot segments → mix → mux → publish → purge.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::ffmpeg::muxer;
use crate::models::config::RecordingConfiguration;
use crate::models::media_models::{SourceKind, SourceStatus};
use crate::models::recording_result::{FinalizeOutcome, FinalizeReport, RecordingMetadata, RecordingResult};
use crate::models::segment::Segment;
use crate::processing::audio_mixer::{AudioMixer, MixedAudio, MixerSettings};
use crate::storage::metadata;
use crate::storage::segment_store::SegmentStore;
use crate::traits::media_muxer::{MediaMuxer, MuxJob};

pub const COMBINED_AUDIO: &str = "combined_audio.wav";

/// How each audio source fared, as reported by its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStatuses {
    pub system_audio: SourceStatus,
    pub mic_audio: SourceStatus,
}

impl SourceStatuses {
    pub fn set(&mut self, kind: SourceKind, status: SourceStatus) {
        match kind {
            SourceKind::SystemAudio => self.system_audio = status,
            SourceKind::MicAudio => self.mic_audio = status,
            SourceKind::Video => {}
        }
    }
}

/// Build the final recording from the store's segments.
///
/// Never fails: every problem degrades the outcome and is logged. The
/// store is purged before returning, whatever happened.
pub fn finalize_session(
    store: &mut SegmentStore,
    config: &RecordingConfiguration,
    muxer: &dyn MediaMuxer,
    duration_secs: f64,
    statuses: SourceStatuses,
) -> FinalizeReport {
    let segments = store.counts();
    let video = store.segments(SourceKind::Video);

    let outcome = if video.is_empty() {
        log::error!("No video segments were recorded; no output file produced");
        FinalizeOutcome::NoOutput {
            reason: "no video segments were recorded".into(),
        }
    } else {
        let mixer = AudioMixer::new(MixerSettings::from_config(config));
        let audio = mixer.combine(
            &store.segments(SourceKind::SystemAudio),
            &store.segments(SourceKind::MicAudio),
            config.system_gain,
            config.mic_gain,
            &store.scratch_path(COMBINED_AUDIO),
        );
        let destination = muxer::unique_destination(&config.output_directory, &Local::now());
        mux_with_fallback(store, config, muxer, &video, audio.as_ref(), destination, duration_secs)
    };

    store.purge();

    let video_status = if segments.video > 0 {
        SourceStatus::Captured
    } else {
        SourceStatus::NoData
    };
    FinalizeReport {
        duration_secs,
        segments,
        system_audio: statuses.system_audio,
        mic_audio: statuses.mic_audio,
        video: video_status,
        outcome,
    }
}

/// Mux with audio; if that fails, try once more with video only.
fn mux_with_fallback(
    store: &SegmentStore,
    config: &RecordingConfiguration,
    muxer: &dyn MediaMuxer,
    video: &[Segment],
    audio: Option<&MixedAudio>,
    destination: PathBuf,
    duration_secs: f64,
) -> FinalizeOutcome {
    let mut job = MuxJob {
        video_segments: video,
        audio,
        scratch_dir: store.path(),
        destination: &destination,
    };

    let result = match muxer.finalize(&job) {
        Err(e) if job.audio.is_some() => {
            log::error!("Mux with audio failed, retrying video only: {}", e);
            job.audio = None;
            muxer.finalize(&job)
        }
        other => other,
    };

    let path = match result {
        Ok(path) => path,
        Err(e) => {
            log::error!("Failed to produce recording: {}", e);
            return FinalizeOutcome::NoOutput { reason: e.to_string() };
        }
    };

    let audio_sources = job.audio.map(|a| a.sources.clone()).unwrap_or_default();
    let recording = describe(&path, duration_secs, audio_sources, store, config);
    log::info!("Recording saved to {}", path.display());

    if job.audio.is_some() {
        FinalizeOutcome::Complete(recording)
    } else {
        FinalizeOutcome::VideoOnly(recording)
    }
}

fn describe(
    path: &Path,
    duration_secs: f64,
    audio_sources: Vec<SourceKind>,
    store: &SegmentStore,
    config: &RecordingConfiguration,
) -> RecordingResult {
    let checksum = metadata::sha256_file(path).unwrap_or_else(|e| {
        log::warn!("Could not checksum {}: {}", path.display(), e);
        String::new()
    });
    let meta = RecordingMetadata::new(
        duration_secs,
        &path.to_string_lossy(),
        &checksum,
        audio_sources,
        store.counts(),
    );
    if config.write_metadata {
        if let Err(e) = metadata::write_metadata(&meta, path) {
            log::warn!("{}", e);
        }
    }
    RecordingResult {
        file_path: path.to_path_buf(),
        duration_secs,
        metadata: meta,
        checksum,
    }
}
