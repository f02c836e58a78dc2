//! Video capture: one external encoder process per open interval.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::ffmpeg::encoder::VideoEncoder;
use crate::models::error::RecorderError;
use crate::models::media_models::{CaptureArea, SourceKind, SourceStatus, VideoQuality};
use crate::models::segment::Segment;
use crate::session::audio_worker::WorkerReport;
use crate::storage::segment_store::{PendingSegment, SegmentWriter};
use crate::traits::encoder_launcher::{EncoderProcess, VideoEncoderLauncher, VideoIntervalRequest};

/// How an encoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Exited after the quit request.
    Graceful,
    /// Did not exit in time and was killed.
    Killed,
    /// Could not be confirmed dead.
    Failed,
}

/// Ask `process` to quit, wait up to `timeout`, then kill it.
pub fn shutdown_process(process: &mut dyn EncoderProcess, timeout: Duration, poll: Duration) -> ShutdownOutcome {
    if let Err(e) = process.request_quit() {
        log::warn!("{}", e);
    }

    let deadline = Instant::now() + timeout;
    loop {
        match process.try_wait() {
            Ok(true) => return ShutdownOutcome::Graceful,
            Ok(false) => {}
            Err(e) => {
                log::warn!("{}", e);
                break;
            }
        }
        if Instant::now() >= deadline {
            log::warn!("Encoder did not exit within {:?}; killing it", timeout);
            break;
        }
        thread::sleep(poll);
    }

    match process.kill() {
        Ok(()) => ShutdownOutcome::Killed,
        Err(e) => {
            log::error!("{}", e);
            ShutdownOutcome::Failed
        }
    }
}

/// Settings shared by every video interval of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub quality: VideoQuality,
    pub area: CaptureArea,
    pub encoder: VideoEncoder,
    pub shutdown_timeout: Duration,
    pub poll: Duration,
}

/// Drives the encoder across start/pause/resume/stop.
///
/// Owned by the session controller; intervals open and close synchronously
/// with the controller's transitions.
pub struct VideoWorker {
    launcher: Arc<dyn VideoEncoderLauncher>,
    writer: SegmentWriter,
    settings: VideoSettings,
    current: Option<(PendingSegment, Box<dyn EncoderProcess>)>,
    report: WorkerReport,
}

impl VideoWorker {
    pub fn new(launcher: Arc<dyn VideoEncoderLauncher>, writer: SegmentWriter, settings: VideoSettings) -> Self {
        Self {
            launcher,
            writer,
            settings,
            current: None,
            report: WorkerReport {
                kind: SourceKind::Video,
                status: SourceStatus::NoData,
                intervals_opened: 0,
                segments_committed: 0,
                segments_discarded: 0,
                open_failures: 0,
            },
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Start an encoder for a new segment. A no-op if one is running.
    pub fn open_interval(&mut self) -> Result<(), RecorderError> {
        if self.current.is_some() {
            return Ok(());
        }
        self.report.intervals_opened += 1;
        let pending = self.writer.begin();
        let request = VideoIntervalRequest {
            output: pending.path.clone(),
            quality: self.settings.quality,
            area: self.settings.area,
            encoder: self.settings.encoder,
        };

        match self.launcher.launch(&request) {
            Ok(process) => {
                self.current = Some((pending, process));
                Ok(())
            }
            Err(e) => {
                log::error!("Video interval {} not recorded: {}", pending.index, e);
                self.writer.discard(&pending);
                self.report.open_failures += 1;
                Err(e)
            }
        }
    }

    /// Stop the running encoder and commit its segment.
    pub fn close_interval(&mut self) -> Option<Segment> {
        let (pending, mut process) = self.current.take()?;
        let outcome = shutdown_process(process.as_mut(), self.settings.shutdown_timeout, self.settings.poll);
        log::debug!("Video interval {} encoder shutdown: {:?}", pending.index, outcome);

        match self.writer.commit(pending) {
            Ok(segment) => {
                log::info!("Video segment {} saved ({} bytes)", segment.index, segment.byte_size);
                self.report.segments_committed += 1;
                Some(segment)
            }
            Err(e) => {
                log::warn!("{}", e);
                self.report.segments_discarded += 1;
                None
            }
        }
    }

    pub fn report(&self) -> WorkerReport {
        let mut report = self.report.clone();
        report.status = if report.segments_committed > 0 {
            SourceStatus::Captured
        } else {
            SourceStatus::NoData
        };
        report
    }
}

impl Drop for VideoWorker {
    fn drop(&mut self) {
        if let Some((pending, mut process)) = self.current.take() {
            shutdown_process(process.as_mut(), self.settings.shutdown_timeout, self.settings.poll);
            self.writer.discard(&pending);
        }
    }
}
