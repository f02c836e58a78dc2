//! The recording state machine.
//!
//! ```text
//! start ──► [signal: Recording g1] ──► audio workers open interval g1
//!       └─► clock runs, video worker launches encoder (segment 0)
//! pause ──► [signal: Paused] ──► clock stops ──► audio workers flush ──► encoder quits
//! resume ─► [signal: Recording g2] ──► audio opens g2 ──► clock runs ──► encoder
//! stop ───► [signal: Stopped] ──► join workers ──► finalize ──► idle
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::audio_worker::{spawn_audio_worker, WorkerHandle};
use super::clock::SessionClock;
use super::finalize::{finalize_session, SourceStatuses};
use super::signal::CaptureSignal;
use super::video_worker::{VideoSettings, VideoWorker};
use crate::ffmpeg::command::GrabBackend;
use crate::ffmpeg::encoder::{self, VideoEncoder};
use crate::ffmpeg::muxer::FfmpegMuxer;
use crate::ffmpeg::process::FfmpegLauncher;
use crate::models::config::RecordingConfiguration;
use crate::models::error::RecorderError;
use crate::models::media_models::{SourceKind, SourceStatus};
use crate::models::recording_result::FinalizeReport;
use crate::models::state::SessionState;
use crate::storage::segment_store::SegmentStore;
use crate::traits::capture_provider::AudioCaptureProvider;
use crate::traits::encoder_launcher::VideoEncoderLauncher;
use crate::traits::media_muxer::MediaMuxer;
use crate::traits::recorder_delegate::RecorderDelegate;

/// How long `start()` and `resume()` wait for the audio streams to open
/// before launching the encoder anyway.
const AUDIO_READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything that lives only between `start()` and `stop()`.
struct ActiveCapture {
    store: SegmentStore,
    signal: CaptureSignal,
    video: VideoWorker,
    audio: Vec<WorkerHandle>,
    statuses: SourceStatuses,
}

/// Drives one recording at a time through idle → recording ⇄ paused → idle.
///
/// Every transition method is a no-op outside the state it expects, so a
/// toggle-style front end can call them freely. Nothing that goes wrong
/// while capturing or finalising is returned as an error: sources degrade,
/// the problem is logged and reported to the delegate, and `stop()` always
/// brings the session back to idle.
pub struct RecordingSession {
    config: RecordingConfiguration,
    system: Option<Arc<dyn AudioCaptureProvider>>,
    mic: Option<Arc<dyn AudioCaptureProvider>>,
    launcher: Arc<dyn VideoEncoderLauncher>,
    muxer: Arc<dyn MediaMuxer>,
    delegate: Option<Arc<dyn RecorderDelegate>>,
    state: SessionState,
    clock: SessionClock,
    detected_encoder: Option<VideoEncoder>,
    active: Option<ActiveCapture>,
}

impl RecordingSession {
    pub fn new(
        config: RecordingConfiguration,
        system: Option<Arc<dyn AudioCaptureProvider>>,
        mic: Option<Arc<dyn AudioCaptureProvider>>,
        launcher: Arc<dyn VideoEncoderLauncher>,
        muxer: Arc<dyn MediaMuxer>,
    ) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        Ok(Self {
            config,
            system,
            mic,
            launcher,
            muxer,
            delegate: None,
            state: SessionState::Idle,
            clock: SessionClock::default(),
            detected_encoder: None,
            active: None,
        })
    }

    /// Session backed by the ffmpeg binary named in `config`.
    ///
    /// The binary path is fixed here; a later `configure()` does not move it.
    pub fn with_ffmpeg(
        config: RecordingConfiguration,
        system: Option<Arc<dyn AudioCaptureProvider>>,
        mic: Option<Arc<dyn AudioCaptureProvider>>,
    ) -> Result<Self, RecorderError> {
        let launcher = Arc::new(FfmpegLauncher::new(config.ffmpeg_path.clone(), GrabBackend::platform_default()));
        let muxer = Arc::new(FfmpegMuxer::new(config.ffmpeg_path.clone()));
        Self::new(config, system, mic, launcher, muxer)
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn RecorderDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &RecordingConfiguration {
        &self.config
    }

    /// Replace the configuration. Only allowed while idle.
    pub fn configure(&mut self, config: RecordingConfiguration) -> Result<(), RecorderError> {
        if !self.state.is_idle() {
            return Err(RecorderError::ConfigurationFailed(
                "can only configure an idle session".into(),
            ));
        }
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        if config.ffmpeg_path != self.config.ffmpeg_path {
            self.detected_encoder = None;
        }
        self.config = config;
        Ok(())
    }

    /// Current state, with the running duration filled in.
    pub fn state(&self) -> SessionState {
        let duration_secs = self.elapsed_secs();
        match self.state {
            SessionState::Recording { .. } => SessionState::Recording { duration_secs },
            SessionState::Paused { .. } => SessionState::Paused { duration_secs },
            ref other => other.clone(),
        }
    }

    /// Recorded time so far, excluding pauses.
    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    /// Begin a new recording. Returns `false` if not idle or the temp area
    /// could not be created.
    pub fn start(&mut self) -> bool {
        if !self.state.is_idle() {
            log::debug!("start ignored in state {:?}", self.state);
            return false;
        }

        let store = match SegmentStore::create(self.config.temp_root.as_deref(), self.config.min_audio_segment_bytes) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Cannot start recording: {}", e);
                self.notify_error(&e);
                return false;
            }
        };
        log::info!("Recording started, segments in {}", store.path().display());

        let settings = VideoSettings {
            quality: self.config.quality,
            area: self.config.capture_area,
            encoder: self.resolve_encoder(),
            shutdown_timeout: self.config.encoder_shutdown_timeout(),
            poll: self.config.poll_interval(),
        };
        let signal = CaptureSignal::new();
        let generation = signal.begin_interval();

        let mut statuses = SourceStatuses {
            system_audio: SourceStatus::Disabled,
            mic_audio: SourceStatus::Disabled,
        };
        let mut audio = Vec::new();
        let sources = [
            (SourceKind::SystemAudio, self.config.enable_system_audio, self.system.clone()),
            (SourceKind::MicAudio, self.config.enable_mic_audio, self.mic.clone()),
        ];
        for (kind, enabled, provider) in sources {
            if !enabled {
                continue;
            }
            let Some(provider) = provider else {
                log::warn!("No {} backend on this platform", kind);
                statuses.set(kind, SourceStatus::Unavailable);
                continue;
            };
            let spawned = spawn_audio_worker(
                provider,
                store.writer(kind),
                signal.reader(),
                self.config.poll_interval(),
                self.delegate.clone(),
            );
            match spawned {
                Ok(handle) => {
                    statuses.set(kind, SourceStatus::NoData);
                    audio.push(handle);
                }
                Err(e) => {
                    log::error!("{}", e);
                    statuses.set(kind, SourceStatus::Unavailable);
                    self.notify_error(&e);
                }
            }
        }

        wait_for_audio(&audio, generation);
        self.clock.start();
        let mut video = VideoWorker::new(Arc::clone(&self.launcher), store.writer(SourceKind::Video), settings);
        if let Err(e) = video.open_interval() {
            self.notify_error(&e);
        }

        self.active = Some(ActiveCapture {
            store,
            signal,
            video,
            audio,
            statuses,
        });
        self.set_state(SessionState::Recording { duration_secs: 0.0 });
        true
    }

    /// Close the current interval on every stream.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_recording() {
            log::debug!("pause ignored in state {:?}", self.state);
            return false;
        }
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        active.signal.pause();
        self.clock.pause();
        active.video.close_interval();
        log::info!("Recording paused at {:.1}s", self.elapsed_secs());
        self.set_state(SessionState::Paused {
            duration_secs: self.elapsed_secs(),
        });
        true
    }

    /// Open a fresh interval (new segment indices) on every stream.
    pub fn resume(&mut self) -> bool {
        if !self.state.is_paused() {
            log::debug!("resume ignored in state {:?}", self.state);
            return false;
        }
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let generation = active.signal.begin_interval();
        wait_for_audio(&active.audio, generation);
        self.clock.resume();
        if let Err(e) = active.video.open_interval() {
            self.notify_error(&e);
        }
        log::info!("Recording resumed");
        self.set_state(SessionState::Recording {
            duration_secs: self.elapsed_secs(),
        });
        true
    }

    /// Stop capturing and build the output file.
    ///
    /// Returns `None` when there was nothing to stop. The session is idle
    /// again afterwards whatever the outcome, and its temp area is gone.
    pub fn stop(&mut self) -> Option<FinalizeReport> {
        if !self.state.is_active() {
            log::debug!("stop ignored in state {:?}", self.state);
            return None;
        }
        let Some(mut active) = self.active.take() else {
            self.set_state(SessionState::Idle);
            return None;
        };
        let duration_secs = self.clock.stop().as_secs_f64();
        self.set_state(SessionState::Finalizing);

        active.signal.stop();
        active.video.close_interval();

        let timeout = self.config.worker_join_timeout();
        let mut statuses = active.statuses;
        for handle in active.audio.drain(..) {
            let kind = handle.kind();
            let status = match handle.join_timeout(timeout) {
                Some(report) => {
                    log::info!(
                        "{}: {:?}, {} of {} intervals saved",
                        kind,
                        report.status,
                        report.segments_committed,
                        report.intervals_opened
                    );
                    report.status
                }
                None => SourceStatus::Abandoned,
            };
            statuses.set(kind, status);
        }
        let video = active.video.report();
        log::info!(
            "video: {} of {} intervals saved, {} encoder launch failures",
            video.segments_committed,
            video.intervals_opened,
            video.open_failures
        );

        let report = finalize_session(
            &mut active.store,
            &self.config,
            self.muxer.as_ref(),
            duration_secs,
            statuses,
        );
        drop(active);

        self.set_state(SessionState::Idle);
        if let Some(delegate) = &self.delegate {
            delegate.on_recording_finished(&report);
        }
        Some(report)
    }

    /// Start when idle, stop when recording or paused.
    pub fn toggle(&mut self) -> bool {
        if self.state.is_idle() {
            self.start()
        } else {
            self.stop().is_some()
        }
    }

    /// Pause when recording, resume when paused.
    pub fn toggle_pause(&mut self) -> bool {
        match self.state {
            SessionState::Recording { .. } => self.pause(),
            SessionState::Paused { .. } => self.resume(),
            _ => {
                log::debug!("toggle_pause ignored in state {:?}", self.state);
                false
            }
        }
    }

    fn resolve_encoder(&mut self) -> VideoEncoder {
        if let Some(encoder) = self.config.video_encoder {
            return encoder;
        }
        *self
            .detected_encoder
            .get_or_insert_with(|| encoder::detect(&self.config.ffmpeg_path))
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(&self.state);
        }
    }

    fn notify_error(&self, error: &RecorderError) {
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
        }
    }
}

/// Audio streams open before the encoder launches on every interval.
fn wait_for_audio(workers: &[WorkerHandle], generation: u64) {
    let deadline = Instant::now() + AUDIO_READY_TIMEOUT;
    for worker in workers {
        if !worker.wait_ready(generation, deadline) {
            log::warn!(
                "{} capture not open after {:?}; starting video anyway",
                worker.kind(),
                AUDIO_READY_TIMEOUT
            );
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        log::warn!("Recording session dropped while active; discarding capture");
        let ActiveCapture {
            mut store,
            signal,
            video,
            audio,
            ..
        } = active;
        signal.stop();
        drop(video);
        let timeout = self.config.worker_join_timeout();
        for handle in audio {
            handle.join_timeout(timeout);
        }
        store.purge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media_models::{DeviceDescriptor, DeviceInfo, StreamFormat};
    use crate::models::recording_result::FinalizeOutcome;
    use crate::traits::capture_provider::{AudioBufferCallback, AudioStream};
    use crate::traits::encoder_launcher::{EncoderProcess, VideoIntervalRequest};
    use crate::traits::media_muxer::MuxJob;
    use parking_lot::Mutex;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct WritingProcess {
        output: PathBuf,
        done: bool,
    }

    impl EncoderProcess for WritingProcess {
        fn request_quit(&mut self) -> Result<(), RecorderError> {
            fs::write(&self.output, b"frames")?;
            self.done = true;
            Ok(())
        }

        fn try_wait(&mut self) -> Result<bool, RecorderError> {
            Ok(self.done)
        }

        fn kill(&mut self) -> Result<(), RecorderError> {
            self.done = true;
            Ok(())
        }
    }

    struct Launcher;

    impl VideoEncoderLauncher for Launcher {
        fn launch(&self, request: &VideoIntervalRequest) -> Result<Box<dyn EncoderProcess>, RecorderError> {
            Ok(Box::new(WritingProcess {
                output: request.output.clone(),
                done: false,
            }))
        }
    }

    /// Encoder that keeps running for `exit_after` once asked to quit.
    struct SlowExitProcess {
        output: PathBuf,
        exit_after: Duration,
        quit_at: Option<Instant>,
    }

    impl EncoderProcess for SlowExitProcess {
        fn request_quit(&mut self) -> Result<(), RecorderError> {
            fs::write(&self.output, b"frames")?;
            self.quit_at = Some(Instant::now());
            Ok(())
        }

        fn try_wait(&mut self) -> Result<bool, RecorderError> {
            Ok(self.quit_at.is_some_and(|t| t.elapsed() >= self.exit_after))
        }

        fn kill(&mut self) -> Result<(), RecorderError> {
            Ok(())
        }
    }

    struct SlowExitLauncher(Duration);

    impl VideoEncoderLauncher for SlowExitLauncher {
        fn launch(&self, request: &VideoIntervalRequest) -> Result<Box<dyn EncoderProcess>, RecorderError> {
            Ok(Box::new(SlowExitProcess {
                output: request.output.clone(),
                exit_after: self.0,
                quit_at: None,
            }))
        }
    }

    struct SilentStream;

    impl AudioStream for SilentStream {
        fn format(&self) -> StreamFormat {
            StreamFormat::new(48000, 2)
        }

        fn close(self: Box<Self>) -> Result<(), RecorderError> {
            Ok(())
        }
    }

    /// Mic that takes a while to probe, like a real endpoint lookup.
    #[derive(Default)]
    struct SlowProbeMic {
        opens: AtomicUsize,
    }

    impl AudioCaptureProvider for SlowProbeMic {
        fn kind(&self) -> SourceKind {
            SourceKind::MicAudio
        }

        fn probe(&self) -> DeviceDescriptor {
            thread::sleep(Duration::from_millis(100));
            DeviceDescriptor::InputOnly(DeviceInfo {
                id: "mic".into(),
                name: "Mic".into(),
                format: Some(StreamFormat::new(48000, 2)),
            })
        }

        fn open(&self, _device: &DeviceDescriptor, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            callback(&[0.25; 4800], 48000.0, 2);
            Ok(Box::new(SilentStream))
        }
    }

    /// Records how many times the mic had opened whenever an encoder launches.
    struct OrderingLauncher {
        mic: Arc<SlowProbeMic>,
        mic_opens_at_launch: Mutex<Vec<usize>>,
    }

    impl VideoEncoderLauncher for OrderingLauncher {
        fn launch(&self, request: &VideoIntervalRequest) -> Result<Box<dyn EncoderProcess>, RecorderError> {
            self.mic_opens_at_launch.lock().push(self.mic.opens.load(Ordering::SeqCst));
            Launcher.launch(request)
        }
    }

    #[derive(Default)]
    struct CountingMuxer {
        calls: Mutex<Vec<usize>>,
    }

    impl MediaMuxer for CountingMuxer {
        fn finalize(&self, job: &MuxJob<'_>) -> Result<PathBuf, RecorderError> {
            self.calls.lock().push(job.video_segments.len());
            fs::write(job.destination, b"mp4")?;
            Ok(job.destination.to_path_buf())
        }
    }

    #[derive(Default)]
    struct StateLog {
        states: Mutex<Vec<SessionState>>,
        finished: Mutex<usize>,
    }

    impl RecorderDelegate for StateLog {
        fn on_state_changed(&self, state: &SessionState) {
            self.states.lock().push(state.clone());
        }

        fn on_error(&self, _error: &RecorderError) {}

        fn on_recording_finished(&self, _report: &FinalizeReport) {
            *self.finished.lock() += 1;
        }
    }

    fn config(dir: &tempfile::TempDir) -> RecordingConfiguration {
        let config = RecordingConfiguration {
            enable_system_audio: false,
            enable_mic_audio: false,
            output_directory: dir.path().join("out"),
            temp_root: Some(dir.path().to_path_buf()),
            video_encoder: Some(VideoEncoder::X264),
            poll_interval_ms: 5,
            encoder_shutdown_timeout_ms: 200,
            ..Default::default()
        };
        fs::create_dir_all(&config.output_directory).unwrap();
        config
    }

    fn session(dir: &tempfile::TempDir) -> (RecordingSession, Arc<CountingMuxer>) {
        let muxer = Arc::new(CountingMuxer::default());
        let session = RecordingSession::new(config(dir), None, None, Arc::new(Launcher), muxer.clone()).unwrap();
        (session, muxer)
    }

    #[test]
    fn encoder_shutdown_is_not_recorded_time() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordingConfiguration {
            encoder_shutdown_timeout_ms: 2000,
            ..config(&dir)
        };
        let launcher = Arc::new(SlowExitLauncher(Duration::from_millis(400)));
        let muxer = Arc::new(CountingMuxer::default());
        let mut session = RecordingSession::new(config, None, None, launcher, muxer).unwrap();

        session.start();
        thread::sleep(Duration::from_millis(50));
        session.pause();
        let at_pause = session.elapsed_secs();
        assert!(at_pause >= 0.05 && at_pause < 0.3, "elapsed at pause {}", at_pause);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(session.elapsed_secs(), at_pause);

        session.resume();
        thread::sleep(Duration::from_millis(50));
        let report = session.stop().unwrap();
        assert!(
            report.duration_secs >= 0.1 && report.duration_secs < 0.5,
            "reported duration {}",
            report.duration_secs
        );
        assert_eq!(report.segments.video, 2);
    }

    #[test]
    fn audio_is_open_before_the_encoder_launches() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecordingConfiguration {
            enable_mic_audio: true,
            ..config(&dir)
        };
        let mic = Arc::new(SlowProbeMic::default());
        let launcher = Arc::new(OrderingLauncher {
            mic: mic.clone(),
            mic_opens_at_launch: Mutex::new(Vec::new()),
        });
        let muxer = Arc::new(CountingMuxer::default());
        let mic_provider: Arc<dyn AudioCaptureProvider> = mic.clone();
        let mut session = RecordingSession::new(config, None, Some(mic_provider), launcher.clone(), muxer).unwrap();

        session.start();
        session.pause();
        thread::sleep(Duration::from_millis(50));
        session.resume();
        thread::sleep(Duration::from_millis(50));
        session.stop();

        assert_eq!(launcher.mic_opens_at_launch.lock().as_slice(), &[1, 2]);
    }

    #[test]
    fn illegal_transitions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(&dir);

        assert!(!session.pause());
        assert!(!session.resume());
        assert!(session.stop().is_none());
        assert!(session.state().is_idle());

        assert!(session.start());
        assert!(!session.start());
        assert!(!session.resume());
        assert!(session.pause());
        assert!(!session.pause());
        assert!(session.stop().is_some());
    }

    #[test]
    fn second_stop_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, muxer) = session(&dir);

        session.start();
        let report = session.stop().unwrap();
        assert!(matches!(report.outcome, FinalizeOutcome::VideoOnly(_)));
        assert!(session.stop().is_none());
        assert_eq!(muxer.calls.lock().len(), 1);
    }

    #[test]
    fn each_resume_adds_a_video_segment() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, muxer) = session(&dir);

        session.start();
        session.toggle_pause();
        session.toggle_pause();
        session.toggle_pause();
        session.toggle_pause();
        let report = session.stop().unwrap();
        assert_eq!(report.segments.video, 3);
        assert_eq!(muxer.calls.lock().as_slice(), &[3]);
    }

    #[test]
    fn delegate_sees_every_transition() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(&dir);
        let log = Arc::new(StateLog::default());
        session.set_delegate(log.clone());

        session.toggle();
        session.toggle_pause();
        session.toggle_pause();
        session.toggle();

        let states = log.states.lock();
        assert_eq!(states.len(), 5);
        assert!(states[0].is_recording());
        assert!(states[1].is_paused());
        assert!(states[2].is_recording());
        assert_eq!(states[3], SessionState::Finalizing);
        assert!(states[4].is_idle());
        assert_eq!(*log.finished.lock(), 1);
    }

    #[test]
    fn configure_only_while_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(&dir);
        let config = session.config().clone();

        session.start();
        assert!(session.configure(config.clone()).is_err());
        session.stop();
        assert!(session.configure(config).is_ok());
    }

    #[test]
    fn dropping_active_session_discards_temp_area() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, muxer) = session(&dir);
        session.start();
        drop(session);

        assert!(muxer.calls.lock().is_empty());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "out")
            .collect();
        assert!(leftovers.is_empty());
    }
}
