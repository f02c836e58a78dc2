//! Audio capture worker: one thread per enabled audio source.
//!
//! ```text
//! probe once ─┬─ none found → log, exit (Unavailable)
//!             └─ per interval: open → buffer callbacks → close → WAV → commit
//! ```
//!
//! Intervals follow the [`SignalReader`]: a new one opens when the phase is
//! `Recording` with a generation not yet seen, and the open one closes as
//! soon as the phase or generation changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::signal::{CapturePhase, SignalReader};
use crate::models::error::RecorderError;
use crate::models::media_models::{DeviceDescriptor, SourceKind, SourceStatus, StreamFormat};
use crate::processing::wav_format;
use crate::storage::segment_store::{PendingSegment, SegmentWriter};
use crate::traits::capture_provider::{AudioBufferCallback, AudioCaptureProvider, AudioStream};
use crate::traits::recorder_delegate::RecorderDelegate;

/// Every audio segment is written as stereo.
pub const SEGMENT_CHANNELS: u16 = 2;

/// What one worker did over a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub intervals_opened: usize,
    pub segments_committed: usize,
    pub segments_discarded: usize,
    pub open_failures: usize,
}

impl WorkerReport {
    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            status: SourceStatus::NoData,
            intervals_opened: 0,
            segments_committed: 0,
            segments_discarded: 0,
            open_failures: 0,
        }
    }

    fn finish(mut self) -> Self {
        if self.status != SourceStatus::Unavailable {
            self.status = if self.segments_committed > 0 {
                SourceStatus::Captured
            } else {
                SourceStatus::NoData
            };
        }
        self
    }
}

/// A running worker thread.
pub struct WorkerHandle {
    kind: SourceKind,
    attempted: Arc<AtomicU64>,
    handle: thread::JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Whether the worker has tried to open interval `generation`, or will
    /// never open one because no device was found.
    pub fn is_ready(&self, generation: u64) -> bool {
        self.attempted.load(Ordering::Acquire) >= generation || self.handle.is_finished()
    }

    /// Wait until [`is_ready`](Self::is_ready) or `deadline`, whichever is first.
    pub fn wait_ready(&self, generation: u64, deadline: Instant) -> bool {
        while !self.is_ready(generation) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// On timeout the thread is left detached and `None` is returned.
    pub fn join_timeout(self, timeout: Duration) -> Option<WorkerReport> {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("{} worker did not stop within {:?}; abandoning it", self.kind, timeout);
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
        match self.handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                log::error!("{} worker panicked", self.kind);
                None
            }
        }
    }
}

/// Samples accumulated by the device callback for the open interval.
#[derive(Default)]
struct IntervalBuffer {
    sample_rate: Option<u32>,
    samples: Vec<f32>,
}

struct OpenInterval {
    generation: u64,
    pending: PendingSegment,
    stream: Box<dyn AudioStream>,
    buffer: Arc<Mutex<IntervalBuffer>>,
}

struct AudioWorker {
    provider: Arc<dyn AudioCaptureProvider>,
    writer: SegmentWriter,
    reader: SignalReader,
    poll: Duration,
    delegate: Option<Arc<dyn RecorderDelegate>>,
    /// Latest interval generation an open was attempted for.
    attempted: Arc<AtomicU64>,
    report: WorkerReport,
}

/// Start a capture thread for `provider`, appending to `writer`'s list.
pub fn spawn_audio_worker(
    provider: Arc<dyn AudioCaptureProvider>,
    writer: SegmentWriter,
    reader: SignalReader,
    poll: Duration,
    delegate: Option<Arc<dyn RecorderDelegate>>,
) -> Result<WorkerHandle, RecorderError> {
    let kind = writer.kind();
    let attempted = Arc::new(AtomicU64::new(0));
    let worker = AudioWorker {
        provider,
        writer,
        reader,
        poll,
        delegate,
        attempted: Arc::clone(&attempted),
        report: WorkerReport::new(kind),
    };
    let handle = thread::Builder::new()
        .name(format!("{}-capture", kind))
        .spawn(move || worker.run())
        .map_err(|e| RecorderError::SpawnFailed(format!("{} worker thread: {}", kind, e)))?;
    Ok(WorkerHandle { kind, attempted, handle })
}

impl AudioWorker {
    fn run(mut self) -> WorkerReport {
        let kind = self.writer.kind();
        let device = self.provider.probe();
        let Some(info) = device.info() else {
            log::warn!("No {} device found; this source will not be recorded", kind);
            self.notify(&RecorderError::DeviceNotAvailable);
            self.report.status = SourceStatus::Unavailable;
            self.attempted.store(u64::MAX, Ordering::Release);
            return self.report;
        };
        log::info!("{} capturing from '{}' ({})", kind, info.name, info.id);

        let mut current: Option<OpenInterval> = None;
        let mut last_attempt: Option<u64> = None;

        loop {
            let signal = self.reader.snapshot();

            if let Some(open) = current.take() {
                if signal.phase == CapturePhase::Recording && signal.generation == open.generation {
                    current = Some(open);
                } else {
                    self.close_interval(open);
                    continue;
                }
            }

            match signal.phase {
                CapturePhase::Stopped => break,
                CapturePhase::Recording if current.is_none() && last_attempt != Some(signal.generation) => {
                    last_attempt = Some(signal.generation);
                    current = self.open_interval(&device, signal.generation);
                    self.attempted.store(signal.generation, Ordering::Release);
                }
                _ => {}
            }

            thread::sleep(self.poll);
        }

        log::debug!("{} worker exiting: {:?}", kind, self.report);
        self.report.finish()
    }

    fn open_interval(&mut self, device: &DeviceDescriptor, generation: u64) -> Option<OpenInterval> {
        self.report.intervals_opened += 1;
        let pending = self.writer.begin();
        let buffer = Arc::new(Mutex::new(IntervalBuffer::default()));

        let sink = Arc::clone(&buffer);
        let callback: AudioBufferCallback = Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            let stereo = wav_format::remix_channels(samples, channels as usize, SEGMENT_CHANNELS as usize);
            let mut buf = sink.lock();
            buf.sample_rate.get_or_insert(sample_rate.round() as u32);
            buf.samples.extend_from_slice(&stereo);
        });

        match self.provider.open(device, callback) {
            Ok(stream) => {
                log::debug!(
                    "{} interval {} opened at {} -> {}",
                    pending.kind,
                    pending.index,
                    stream.format(),
                    pending.path.display()
                );
                Some(OpenInterval {
                    generation,
                    pending,
                    stream,
                    buffer,
                })
            }
            Err(e) => {
                log::error!("Failed to open {} stream: {}", pending.kind, e);
                self.report.open_failures += 1;
                self.notify(&e);
                None
            }
        }
    }

    fn close_interval(&mut self, open: OpenInterval) {
        let OpenInterval {
            pending,
            stream,
            buffer,
            ..
        } = open;
        let device_rate = stream.format().sample_rate;
        if let Err(e) = stream.close() {
            log::warn!("Error closing {} stream: {}", pending.kind, e);
        }

        let captured = std::mem::take(&mut *buffer.lock());
        if captured.samples.is_empty() {
            log::debug!("{} interval {} captured nothing; discarded", pending.kind, pending.index);
            self.writer.discard(&pending);
            self.report.segments_discarded += 1;
            return;
        }

        let format = StreamFormat::new(captured.sample_rate.unwrap_or(device_rate), SEGMENT_CHANNELS);
        let pcm = wav_format::quantize_f32(&captured.samples);
        if let Err(e) = wav_format::write_wav(&pending.path, format, &pcm) {
            log::error!("Failed to write {} segment {}: {}", pending.kind, pending.index, e);
            self.writer.discard(&pending);
            self.report.segments_discarded += 1;
            return;
        }

        let index = pending.index;
        match self.writer.commit(pending) {
            Ok(segment) => {
                log::info!(
                    "{} segment {} saved ({} bytes, {:.2}s)",
                    segment.kind,
                    index,
                    segment.byte_size,
                    pcm.len() as f64 / f64::from(SEGMENT_CHANNELS) / f64::from(format.sample_rate.max(1))
                );
                self.report.segments_committed += 1;
            }
            Err(e) => {
                log::warn!("{}", e);
                self.report.segments_discarded += 1;
            }
        }
    }

    fn notify(&self, error: &RecorderError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media_models::DeviceInfo;
    use crate::session::signal::CaptureSignal;
    use crate::storage::segment_store::SegmentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider whose stream delivers one buffer on open.
    struct OneShotProvider {
        kind: SourceKind,
        available: bool,
        samples_per_open: usize,
        fail_opens: usize,
        opens: AtomicUsize,
    }

    struct NullStream;

    impl AudioStream for NullStream {
        fn format(&self) -> StreamFormat {
            StreamFormat::new(48000, 2)
        }

        fn close(self: Box<Self>) -> Result<(), RecorderError> {
            Ok(())
        }
    }

    impl AudioCaptureProvider for OneShotProvider {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn probe(&self) -> DeviceDescriptor {
            if !self.available {
                return DeviceDescriptor::NoneFound;
            }
            DeviceDescriptor::InputOnly(DeviceInfo {
                id: "test".into(),
                name: "Test Device".into(),
                format: Some(StreamFormat::new(48000, 1)),
            })
        }

        fn open(&self, _device: &DeviceDescriptor, callback: AudioBufferCallback) -> Result<Box<dyn AudioStream>, RecorderError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_opens {
                return Err(RecorderError::DeviceNotAvailable);
            }
            callback(&vec![0.25f32; self.samples_per_open], 48000.0, 1);
            Ok(Box::new(NullStream))
        }
    }

    fn provider(available: bool, samples_per_open: usize, fail_opens: usize) -> Arc<OneShotProvider> {
        Arc::new(OneShotProvider {
            kind: SourceKind::MicAudio,
            available,
            samples_per_open,
            fail_opens,
            opens: AtomicUsize::new(0),
        })
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn run_session(provider: Arc<OneShotProvider>, intervals: usize) -> (SegmentStore, WorkerReport) {
        let store = SegmentStore::create(None, 1000).unwrap();
        let signal = CaptureSignal::new();
        let handle = spawn_audio_worker(
            provider.clone(),
            store.writer(SourceKind::MicAudio),
            signal.reader(),
            Duration::from_millis(5),
            None,
        )
        .unwrap();

        for i in 0..intervals {
            signal.begin_interval();
            wait_until(|| provider.opens.load(Ordering::SeqCst) > i);
            signal.pause();
        }
        signal.stop();
        let report = handle.join_timeout(Duration::from_secs(5)).unwrap();
        (store, report)
    }

    #[test]
    fn one_segment_per_interval() {
        let (store, report) = run_session(provider(true, 4800, 0), 3);
        assert_eq!(report.intervals_opened, 3);
        assert_eq!(report.segments_committed, 3);
        assert_eq!(report.status, SourceStatus::Captured);

        let segments = store.segments(SourceKind::MicAudio);
        let indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        // Mono input is written as 16-bit stereo.
        let (format, samples) = wav_format::read_wav(&segments[0].path).unwrap();
        assert_eq!(format, StreamFormat::new(48000, 2));
        assert_eq!(samples.len(), 9600);
        assert_eq!(samples[0], (0.25f32 * i16::MAX as f32) as i16);
    }

    #[test]
    fn missing_device_contributes_nothing() {
        let (store, report) = run_session(provider(false, 4800, 0), 0);
        assert_eq!(report.status, SourceStatus::Unavailable);
        assert_eq!(report.intervals_opened, 0);
        assert!(store.segments(SourceKind::MicAudio).is_empty());
    }

    #[test]
    fn failed_open_only_loses_that_interval() {
        let (store, report) = run_session(provider(true, 4800, 1), 2);
        assert_eq!(report.open_failures, 1);
        assert_eq!(report.segments_committed, 1);
        assert_eq!(store.segments(SourceKind::MicAudio)[0].index, 0);
    }

    #[test]
    fn tiny_intervals_are_discarded() {
        // 100 mono samples → 200 stereo samples → 444-byte WAV, under the threshold.
        let (store, report) = run_session(provider(true, 100, 0), 2);
        assert_eq!(report.segments_committed, 0);
        assert_eq!(report.segments_discarded, 2);
        assert_eq!(report.status, SourceStatus::NoData);
        assert!(store.segments(SourceKind::MicAudio).is_empty());
    }

    #[test]
    fn ready_once_each_interval_is_opened() {
        let store = SegmentStore::create(None, 1000).unwrap();
        let signal = CaptureSignal::new();
        let provider = provider(true, 4800, 0);
        let handle = spawn_audio_worker(
            provider.clone(),
            store.writer(SourceKind::MicAudio),
            signal.reader(),
            Duration::from_millis(5),
            None,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_ready(1));

        let first = signal.begin_interval();
        assert!(handle.wait_ready(first, Instant::now() + Duration::from_secs(5)));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);

        signal.pause();
        let second = signal.begin_interval();
        assert!(handle.wait_ready(second, Instant::now() + Duration::from_secs(5)));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 2);

        signal.stop();
        handle.join_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn missing_device_is_ready_immediately() {
        let store = SegmentStore::create(None, 1000).unwrap();
        let signal = CaptureSignal::new();
        let handle = spawn_audio_worker(
            provider(false, 0, 0),
            store.writer(SourceKind::MicAudio),
            signal.reader(),
            Duration::from_millis(5),
            None,
        )
        .unwrap();
        assert!(handle.wait_ready(1, Instant::now() + Duration::from_secs(5)));
        signal.stop();
    }

    #[test]
    fn worker_exits_when_stopped_while_idle() {
        let store = SegmentStore::create(None, 1000).unwrap();
        let signal = CaptureSignal::new();
        let handle = spawn_audio_worker(
            provider(true, 10, 0),
            store.writer(SourceKind::MicAudio),
            signal.reader(),
            Duration::from_millis(5),
            None,
        )
        .unwrap();
        signal.stop();
        let report = handle.join_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.intervals_opened, 0);
    }
}
