//! In-memory stand-ins for devices, ffmpeg and the muxer.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use screen_recorder_core::processing::audio_mixer::sum_tracks;
use screen_recorder_core::processing::wav_format;
use screen_recorder_core::{
    AudioBufferCallback, AudioCaptureProvider, AudioMixer, AudioStream, DeviceDescriptor, DeviceInfo, EncoderProcess,
    MediaMuxer, MixerSettings, MuxJob, PcmTrack, RecorderError, RecordingConfiguration, RecordingSession, Segment,
    SourceKind, StreamFormat, VideoEncoder, VideoEncoderLauncher, VideoIntervalRequest,
};

pub const RATE: u32 = 48_000;

/// Audio device that delivers `frames` frames of a constant level on every open.
pub struct FakeAudioDevice {
    pub kind: SourceKind,
    pub present: bool,
    pub frames: usize,
    pub level: f32,
    pub opens: AtomicUsize,
}

impl FakeAudioDevice {
    pub fn new(kind: SourceKind, frames: usize, level: f32) -> Arc<Self> {
        Arc::new(Self {
            kind,
            present: true,
            frames,
            level,
            opens: AtomicUsize::new(0),
        })
    }

    pub fn missing(kind: SourceKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            present: false,
            frames: 0,
            level: 0.0,
            opens: AtomicUsize::new(0),
        })
    }
}

struct FakeStream;

impl AudioStream for FakeStream {
    fn format(&self) -> StreamFormat {
        StreamFormat::new(RATE, 2)
    }

    fn close(self: Box<Self>) -> Result<(), RecorderError> {
        Ok(())
    }
}

impl AudioCaptureProvider for FakeAudioDevice {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn probe(&self) -> DeviceDescriptor {
        if !self.present {
            return DeviceDescriptor::NoneFound;
        }
        let info = DeviceInfo {
            id: format!("fake-{}", self.kind),
            name: format!("Fake {}", self.kind),
            format: Some(StreamFormat::new(RATE, 2)),
        };
        match self.kind {
            SourceKind::SystemAudio => DeviceDescriptor::LoopbackCapable(info),
            _ => DeviceDescriptor::InputOnly(info),
        }
    }

    fn open(&self, _device: &DeviceDescriptor, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let samples = vec![self.level; self.frames * 2];
        callback(&samples, f64::from(RATE), 2);
        Ok(Box::new(FakeStream))
    }
}

struct FakeEncoder {
    output: PathBuf,
    exited: bool,
}

impl EncoderProcess for FakeEncoder {
    fn request_quit(&mut self) -> Result<(), RecorderError> {
        fs::write(&self.output, b"\0\0\0\x18ftypmp42")?;
        self.exited = true;
        Ok(())
    }

    fn try_wait(&mut self) -> Result<bool, RecorderError> {
        Ok(self.exited)
    }

    fn kill(&mut self) -> Result<(), RecorderError> {
        self.exited = true;
        Ok(())
    }
}

/// Encoder launcher that writes a small file on quit, or refuses to spawn.
pub struct FakeLauncher {
    pub fail: bool,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            launches: AtomicUsize::new(0),
        })
    }
}

impl VideoEncoderLauncher for FakeLauncher {
    fn launch(&self, request: &VideoIntervalRequest) -> Result<Box<dyn EncoderProcess>, RecorderError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RecorderError::SpawnFailed("ffmpeg: not found".into()));
        }
        Ok(Box::new(FakeEncoder {
            output: request.output.clone(),
            exited: false,
        }))
    }
}

/// What the muxer was handed.
#[derive(Debug)]
pub struct MuxCall {
    pub video_indices: Vec<usize>,
    pub audio: Option<PcmTrack>,
    pub audio_sources: Vec<SourceKind>,
}

/// Muxer that records its inputs and writes a placeholder output.
#[derive(Default)]
pub struct RecordingMuxer {
    pub calls: Mutex<Vec<MuxCall>>,
}

impl MediaMuxer for RecordingMuxer {
    fn finalize(&self, job: &MuxJob<'_>) -> Result<PathBuf, RecorderError> {
        let audio = match job.audio {
            Some(mixed) => Some(PcmTrack::read_wav(&mixed.path)?),
            None => None,
        };
        self.calls.lock().push(MuxCall {
            video_indices: job.video_segments.iter().map(|s| s.index).collect(),
            audio,
            audio_sources: job.audio.map(|a| a.sources.clone()).unwrap_or_default(),
        });
        fs::write(job.destination, b"muxed")?;
        Ok(job.destination.to_path_buf())
    }
}

pub struct Rig {
    pub dir: tempfile::TempDir,
    pub launcher: Arc<FakeLauncher>,
    pub muxer: Arc<RecordingMuxer>,
}

impl Rig {
    pub fn new(fail_video: bool) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            launcher: FakeLauncher::new(fail_video),
            muxer: Arc::new(RecordingMuxer::default()),
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn config(&self, system: bool, mic: bool) -> RecordingConfiguration {
        RecordingConfiguration {
            enable_system_audio: system,
            enable_mic_audio: mic,
            output_directory: self.output_dir(),
            temp_root: Some(self.temp_root()),
            video_encoder: Some(VideoEncoder::X264),
            poll_interval_ms: 5,
            encoder_shutdown_timeout_ms: 200,
            worker_join_timeout_ms: 2000,
            ..Default::default()
        }
    }

    pub fn session(
        &self,
        config: RecordingConfiguration,
        system: Option<Arc<FakeAudioDevice>>,
        mic: Option<Arc<FakeAudioDevice>>,
    ) -> RecordingSession {
        fs::create_dir_all(self.output_dir()).unwrap();
        let system = system.map(|d| d as Arc<dyn AudioCaptureProvider>);
        let mic = mic.map(|d| d as Arc<dyn AudioCaptureProvider>);
        RecordingSession::new(config, system, mic, self.launcher.clone(), self.muxer.clone()).unwrap()
    }

    /// Entries left in the temp root (segment stores that were not purged).
    pub fn temp_leftovers(&self) -> usize {
        match fs::read_dir(self.temp_root()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

/// Give the worker threads time to observe the latest signal.
pub fn settle() {
    thread::sleep(Duration::from_millis(150));
}

pub fn frames_of(ms: u32) -> usize {
    (RATE as usize * ms as usize) / 1000
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Mix built straight from what each device delivered: one buffer per
/// interval, written as segments, concatenated, summed and normalised with
/// default settings.
pub fn expected_mix(system: &FakeAudioDevice, mic: &FakeAudioDevice, intervals: usize) -> PcmTrack {
    let dir = tempfile::tempdir().unwrap();
    let mixer = AudioMixer::new(MixerSettings::default());
    let settings = *mixer.settings();

    let track = |device: &FakeAudioDevice, delay_ms: u32| {
        let pcm = wav_format::quantize_f32(&vec![device.level; device.frames * 2]);
        let segments: Vec<Segment> = (0..intervals)
            .map(|index| {
                let path = dir.path().join(format!("{}_{:04}.wav", device.kind.file_stem(), index));
                wav_format::write_wav(&path, StreamFormat::new(RATE, 2), &pcm).unwrap();
                Segment {
                    kind: device.kind,
                    index,
                    byte_size: fs::metadata(&path).unwrap().len(),
                    path,
                }
            })
            .collect();
        mixer.build_track(&segments, 1.0, delay_ms).unwrap().unwrap()
    };

    let mut mixed = sum_tracks(&track(system, settings.system_delay_ms), &track(mic, 0));
    mixed.normalize(settings.headroom_db);
    mixed
}
