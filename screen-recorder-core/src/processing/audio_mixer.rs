//! Combines system-audio and mic segments into one normalised track.
//!
//! ```text
//! system segments ─ delay + gain ─┐
//!                                  ├─ sum, rescale ≤ 32767 ─ normalise ─ WAV
//! mic segments ──────── gain ─────┘
//! ```

use std::path::{Path, PathBuf};

use crate::models::config::RecordingConfiguration;
use crate::models::error::RecorderError;
use crate::models::media_models::{SourceKind, StreamFormat};
use crate::models::segment::{self, Segment};
use crate::processing::pcm_track::PcmTrack;

/// Largest magnitude a mixed sample may have before rescaling.
pub const MIX_CEILING: f64 = i16::MAX as f64;

/// Tunables for one combine pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerSettings {
    /// Silence prepended to each system-audio segment.
    pub system_delay_ms: u32,
    /// Headroom left by the final peak normalisation.
    pub headroom_db: f64,
    /// Segments at or below this size are skipped.
    pub min_segment_bytes: u64,
}

impl MixerSettings {
    pub fn from_config(config: &RecordingConfiguration) -> Self {
        Self {
            system_delay_ms: config.system_audio_delay_ms,
            headroom_db: config.normalize_headroom_db,
            min_segment_bytes: config.min_audio_segment_bytes,
        }
    }
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            system_delay_ms: 240,
            headroom_db: 0.1,
            min_segment_bytes: 1000,
        }
    }
}

/// The combined audio file handed to the muxer.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedAudio {
    pub path: PathBuf,
    pub format: StreamFormat,
    pub frames: usize,
    /// Sources that contributed at least one segment.
    pub sources: Vec<SourceKind>,
}

#[derive(Debug, Clone)]
pub struct AudioMixer {
    settings: MixerSettings,
}

impl AudioMixer {
    pub fn new(settings: MixerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MixerSettings {
        &self.settings
    }

    /// Combine both sources into `output`.
    ///
    /// Returns `None` when there is no usable audio or anything goes wrong;
    /// the failure is logged and the caller carries on with video only.
    pub fn combine(
        &self,
        system: &[Segment],
        mic: &[Segment],
        system_gain: f32,
        mic_gain: f32,
        output: &Path,
    ) -> Option<MixedAudio> {
        match self.try_combine(system, mic, system_gain, mic_gain, output) {
            Ok(Some(mixed)) => {
                log::info!(
                    "Mixed audio from {:?}: {} frames at {}",
                    mixed.sources,
                    mixed.frames,
                    mixed.format
                );
                Some(mixed)
            }
            Ok(None) => {
                log::info!("No usable audio segments; recording will be video only");
                None
            }
            Err(e) => {
                log::error!("Audio combine failed, continuing without audio: {}", e);
                None
            }
        }
    }

    pub fn try_combine(
        &self,
        system: &[Segment],
        mic: &[Segment],
        system_gain: f32,
        mic_gain: f32,
        output: &Path,
    ) -> Result<Option<MixedAudio>, RecorderError> {
        let system_track = self.build_track(system, system_gain, self.settings.system_delay_ms)?;
        let mic_track = self.build_track(mic, mic_gain, 0)?;

        let mut sources = Vec::new();
        if system_track.is_some() {
            sources.push(SourceKind::SystemAudio);
        }
        if mic_track.is_some() {
            sources.push(SourceKind::MicAudio);
        }

        let mut mixed = match (system_track, mic_track) {
            (Some(system), Some(mic)) => sum_tracks(&system, &mic),
            (Some(track), None) | (None, Some(track)) => track,
            (None, None) => return Ok(None),
        };

        mixed.normalize(self.settings.headroom_db);
        mixed
            .write_wav(output)
            .map_err(|e| RecorderError::MixFailed(format!("writing {}: {}", output.display(), e)))?;

        Ok(Some(MixedAudio {
            path: output.to_path_buf(),
            format: mixed.format,
            frames: mixed.frames(),
            sources,
        }))
    }

    /// Concatenate one source's segments in index order, each prefixed by
    /// `delay_ms` of silence and scaled by `gain`.
    ///
    /// Missing, undersized, or unreadable segments are skipped.
    pub fn build_track(&self, segments: &[Segment], gain: f32, delay_ms: u32) -> Result<Option<PcmTrack>, RecorderError> {
        let gain_db = gain_to_db(gain);
        let mut track: Option<PcmTrack> = None;

        for seg in segment::in_index_order(segments) {
            if !seg.is_usable(self.settings.min_segment_bytes) {
                log::debug!("Skipping {} segment {}: missing or too small", seg.kind, seg.index);
                continue;
            }
            let mut piece = match PcmTrack::read_wav(&seg.path) {
                Ok(piece) if !piece.is_empty() => piece,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Skipping unreadable {} segment {}: {}", seg.kind, seg.index, e);
                    continue;
                }
            };
            if let Some(db) = gain_db {
                piece.apply_gain_db(db);
            }

            let track = track.get_or_insert_with(|| PcmTrack::new(piece.format));
            if delay_ms > 0 {
                track.append(&PcmTrack::silence(track.format, delay_ms));
            }
            track.append(&piece);
        }

        Ok(track)
    }
}

/// Decibel change for a linear gain, or `None` when the gain is unity.
///
/// Gains are floored at 0.01 (-40 dB) so muted sources stay finite.
pub fn gain_to_db(gain: f32) -> Option<f64> {
    if (gain - 1.0).abs() < f32::EPSILON {
        return None;
    }
    Some(20.0 * f64::from(gain.max(0.01)).log10())
}

/// Sample-wise sum of two tracks in `a`'s format.
///
/// `b` is converted to `a`'s format if needed, the shorter track is padded
/// with silence, and when the sum overshoots 32767 the whole track is
/// scaled down so the peak lands on it.
pub fn sum_tracks(a: &PcmTrack, b: &PcmTrack) -> PcmTrack {
    let converted;
    let b = if b.format == a.format {
        b
    } else {
        converted = b.convert_to(a.format);
        &converted
    };

    let len = a.samples.len().max(b.samples.len());
    let mut sum = vec![0.0f64; len];
    for (i, slot) in sum.iter_mut().enumerate() {
        let x = a.samples.get(i).copied().map_or(0.0, f64::from);
        let y = b.samples.get(i).copied().map_or(0.0, f64::from);
        *slot = x + y;
    }

    let peak = sum.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if peak > MIX_CEILING {
        let factor = MIX_CEILING / peak;
        for v in &mut sum {
            *v *= factor;
        }
    }

    PcmTrack::from_samples(a.format, sum.into_iter().map(|v| v.round() as i16).collect())
}
