//! WAV file I/O and sample-format helpers.
//!
//! All segment and mix files are 16-bit signed PCM, little-endian,
//! interleaved. Reading and writing go through `hound`.

use std::path::Path;

use crate::models::error::RecorderError;
use crate::models::media_models::StreamFormat;

/// Bit depth of every file this crate writes.
pub const BITS_PER_SAMPLE: u16 = 16;

pub fn wav_spec(format: StreamFormat) -> hound::WavSpec {
    hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write interleaved 16-bit samples to a new WAV file.
pub fn write_wav(path: &Path, format: StreamFormat, samples: &[i16]) -> Result<(), RecorderError> {
    let mut writer = hound::WavWriter::create(path, wav_spec(format))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a 16-bit PCM WAV file into interleaved samples.
pub fn read_wav(path: &Path) -> Result<(StreamFormat, Vec<i16>), RecorderError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
        return Err(RecorderError::EncodingFailed(format!(
            "{}: unsupported sample format {:?}/{} bit",
            path.display(),
            spec.sample_format,
            spec.bits_per_sample
        )));
    }
    let samples = reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok((StreamFormat::new(spec.sample_rate, spec.channels), samples))
}

/// Quantise float samples `[-1.0, 1.0]` to 16-bit, clamping out-of-range values.
pub fn quantize_f32(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Remix interleaved audio from `from` channels to `to` channels.
///
/// Mono is duplicated into every output channel; more channels than
/// requested are folded down by averaging; stereo to surround fills the
/// first two channels and leaves the rest silent.
pub fn remix_channels<T: Copy + Default + Into<f64> + FromF64>(samples: &[T], from: usize, to: usize) -> Vec<T> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / from;
    let mut out = Vec::with_capacity(frame_count * to);
    for frame in samples.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            let sum: f64 = frame.iter().map(|&s| s.into()).sum();
            out.push(T::from_f64(sum / from as f64));
        } else if from > to {
            // Fold extra channels onto the outputs round-robin.
            let mut acc = vec![0.0f64; to];
            let mut hits = vec![0usize; to];
            for (ch, &s) in frame.iter().enumerate() {
                acc[ch % to] += s.into();
                hits[ch % to] += 1;
            }
            out.extend(acc.iter().zip(&hits).map(|(&a, &n)| T::from_f64(a / n as f64)));
        } else {
            out.extend_from_slice(frame);
            out.extend(std::iter::repeat(T::default()).take(to - from));
        }
    }
    out
}

/// Lossy conversion back from the `f64` accumulator used by [`remix_channels`].
pub trait FromF64 {
    fn from_f64(value: f64) -> Self;
}

impl FromF64 for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl FromF64 for i16 {
    fn from_f64(value: f64) -> Self {
        value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}
