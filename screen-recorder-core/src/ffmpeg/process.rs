//! Spawning and controlling ffmpeg processes.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::command::{GrabBackend, ScreenGrabCommand};
use crate::models::error::RecorderError;
use crate::traits::encoder_launcher::{EncoderProcess, VideoEncoderLauncher, VideoIntervalRequest};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A `Command` for `ffmpeg` that never opens a console window.
pub fn command(ffmpeg: &Path) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(ffmpeg);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Run ffmpeg to completion, failing with the tail of its stderr.
pub fn run_ffmpeg(ffmpeg: &Path, args: &[String]) -> Result<(), RecorderError> {
    log::debug!("ffmpeg {}", args.join(" "));
    let output = command(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| RecorderError::SpawnFailed(format!("{}: {}", ffmpeg.display(), e)))?;

    if output.status.success() {
        return Ok(());
    }
    Err(RecorderError::MuxFailed(format!(
        "ffmpeg exited with {}: {}",
        output.status,
        stderr_tail(&String::from_utf8_lossy(&output.stderr), 5)
    )))
}

/// Last `lines` non-empty lines of an ffmpeg log, joined with " | ".
pub fn stderr_tail(stderr: &str, lines: usize) -> String {
    let tail: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    tail[tail.len().saturating_sub(lines)..].join(" | ")
}

/// Launches one screen-grab encoder per video interval.
pub struct FfmpegLauncher {
    ffmpeg: PathBuf,
    backend: GrabBackend,
}

impl FfmpegLauncher {
    pub fn new(ffmpeg: impl Into<PathBuf>, backend: GrabBackend) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            backend,
        }
    }
}

impl VideoEncoderLauncher for FfmpegLauncher {
    fn launch(&self, request: &VideoIntervalRequest) -> Result<Box<dyn EncoderProcess>, RecorderError> {
        let args = ScreenGrabCommand::new(&request.output, self.backend.clone())
            .with_quality(request.quality)
            .with_encoder(request.encoder)
            .with_area(request.area)
            .build();

        // Encoder diagnostics go next to the segment, inside the temp area.
        let log_path = request.output.with_extension("log");
        let stderr = File::create(&log_path)
            .map(Stdio::from)
            .unwrap_or_else(|_| Stdio::null());

        log::debug!("ffmpeg {}", args.join(" "));
        let child = command(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| RecorderError::SpawnFailed(format!("{}: {}", self.ffmpeg.display(), e)))?;

        log::info!("Video encoder started (pid {}) -> {}", child.id(), request.output.display());
        Ok(Box::new(FfmpegProcess { child }))
    }
}

/// A running ffmpeg encoder that stops cleanly when sent `q` on stdin.
pub struct FfmpegProcess {
    child: Child,
}

impl EncoderProcess for FfmpegProcess {
    fn request_quit(&mut self) -> Result<(), RecorderError> {
        let Some(mut stdin) = self.child.stdin.take() else {
            return Ok(());
        };
        match stdin.write_all(b"q").and_then(|()| stdin.flush()) {
            Ok(()) => Ok(()),
            // Already gone: nothing left to ask.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(RecorderError::Unknown(format!("failed to send quit to ffmpeg: {}", e))),
        }
    }

    fn try_wait(&mut self) -> Result<bool, RecorderError> {
        self.child
            .try_wait()
            .map(|status| status.is_some())
            .map_err(|e| RecorderError::Unknown(format!("failed to poll ffmpeg: {}", e)))
    }

    fn kill(&mut self) -> Result<(), RecorderError> {
        match self.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(RecorderError::Unknown(format!("failed to kill ffmpeg: {}", e))),
        }
        self.child
            .wait()
            .map(|_| ())
            .map_err(|e| RecorderError::Unknown(format!("failed to reap ffmpeg: {}", e)))
    }
}
