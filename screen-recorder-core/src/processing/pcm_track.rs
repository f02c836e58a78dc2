//! In-memory 16-bit PCM track used while combining audio segments.

use std::path::Path;

use crate::models::error::RecorderError;
use crate::models::media_models::StreamFormat;
use crate::processing::wav_format;

/// Magnitude of the most negative 16-bit sample, the reference for normalisation.
pub const FULL_SCALE: f64 = 32768.0;

/// Interleaved 16-bit PCM in a fixed format.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmTrack {
    pub format: StreamFormat,
    pub samples: Vec<i16>,
}

impl PcmTrack {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            samples: Vec::new(),
        }
    }

    pub fn from_samples(format: StreamFormat, samples: Vec<i16>) -> Self {
        Self { format, samples }
    }

    /// `duration_ms` of digital silence.
    pub fn silence(format: StreamFormat, duration_ms: u32) -> Self {
        let frames = (u64::from(format.sample_rate) * u64::from(duration_ms) / 1000) as usize;
        Self {
            format,
            samples: vec![0; frames * format.channels as usize],
        }
    }

    pub fn read_wav(path: &Path) -> Result<Self, RecorderError> {
        let (format, samples) = wav_format::read_wav(path)?;
        Ok(Self { format, samples })
    }

    pub fn write_wav(&self, path: &Path) -> Result<(), RecorderError> {
        wav_format::write_wav(path, self.format, &self.samples)
    }

    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.format.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append `other`, converting it to this track's format first.
    pub fn append(&mut self, other: &PcmTrack) {
        if other.format == self.format {
            self.samples.extend_from_slice(&other.samples);
        } else {
            self.samples.extend(other.convert_to(self.format).samples);
        }
    }

    /// Largest absolute sample value (up to 32768).
    pub fn peak(&self) -> i32 {
        self.samples.iter().map(|&s| i32::from(s).abs()).max().unwrap_or(0)
    }

    /// Scale every sample by `db` decibels, saturating at the 16-bit limits.
    pub fn apply_gain_db(&mut self, db: f64) {
        self.scale(db_to_ratio(db));
    }

    /// Peak-normalise so the loudest sample sits `headroom_db` below full scale.
    ///
    /// Silent tracks are left untouched.
    pub fn normalize(&mut self, headroom_db: f64) {
        let peak = self.peak();
        if peak == 0 {
            return;
        }
        let target = (FULL_SCALE * db_to_ratio(-headroom_db)).min(f64::from(i16::MAX));
        self.scale(target / f64::from(peak));
    }

    /// Convert to another layout: channel remix, then linear-interpolation resampling.
    pub fn convert_to(&self, format: StreamFormat) -> PcmTrack {
        if format == self.format {
            return self.clone();
        }
        let remixed = wav_format::remix_channels(
            &self.samples,
            self.format.channels as usize,
            format.channels as usize,
        );
        let samples = resample_interleaved(
            &remixed,
            format.channels as usize,
            self.format.sample_rate,
            format.sample_rate,
        );
        PcmTrack { format, samples }
    }

    fn scale(&mut self, factor: f64) {
        if (factor - 1.0).abs() < f64::EPSILON {
            return;
        }
        for sample in &mut self.samples {
            *sample = (f64::from(*sample) * factor)
                .round()
                .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        }
    }
}

pub fn db_to_ratio(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Linear-interpolation resampling of interleaved 16-bit audio.
pub fn resample_interleaved(samples: &[i16], channels: usize, source_rate: u32, target_rate: u32) -> Vec<i16> {
    if source_rate == target_rate || samples.is_empty() || channels == 0 || source_rate == 0 {
        return samples.to_vec();
    }

    let frame_count = samples.len() / channels;
    let ratio = f64::from(target_rate) / f64::from(source_rate);
    let output_frames = (frame_count as f64 * ratio) as usize;
    if output_frames == 0 {
        return Vec::new();
    }

    let mut output = vec![0i16; output_frames * channels];
    for i in 0..output_frames {
        let source_index = i as f64 / ratio;
        let index = source_index as usize;
        let fraction = source_index - index as f64;

        for ch in 0..channels {
            output[i * channels + ch] = if index + 1 < frame_count {
                let a = f64::from(samples[index * channels + ch]);
                let b = f64::from(samples[(index + 1) * channels + ch]);
                (a * (1.0 - fraction) + b * fraction).round() as i16
            } else if index < frame_count {
                samples[index * channels + ch]
            } else {
                0
            };
        }
    }
    output
}
