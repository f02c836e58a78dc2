//! `screen-recorder`: command-line front end for a recording session.
//!
//! Reads commands from stdin while recording: `p` toggles pause, `s` or `q`
//! (or end of input) stops and saves.

mod cli;

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use screen_recorder_core::{
    AudioCaptureProvider, FinalizeOutcome, FinalizeReport, RecorderDelegate, RecorderError, RecordingConfiguration,
    RecordingSession, SessionState,
};

const TICK: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    TogglePause,
    Stop,
}

/// Logs session events; the report itself is printed by `main`.
struct ConsoleDelegate;

impl RecorderDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        log::debug!("Session state: {:?}", state);
    }

    fn on_error(&self, error: &RecorderError) {
        log::warn!("{}", error);
    }

    fn on_recording_finished(&self, report: &FinalizeReport) {
        log::debug!("Finalize report: {:?}", report);
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();
    if args.list_mics {
        return list_mics();
    }
    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(2);
        }
    };

    match record(config, args.duration) {
        Some(report) if report.outcome.result().is_some() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn record(config: RecordingConfiguration, duration: Option<f64>) -> Option<FinalizeReport> {
    let (system, mic) = audio_providers(&config);
    let mut session = match RecordingSession::with_ffmpeg(config, system, mic) {
        Ok(session) => session,
        Err(e) => {
            log::error!("{}", e);
            return None;
        }
    };
    session.set_delegate(Arc::new(ConsoleDelegate));

    if !session.start() {
        return None;
    }
    match duration {
        Some(secs) => println!("Recording for {:.0}s. Commands: p = pause/resume, s = stop", secs),
        None => println!("Recording. Commands: p = pause/resume, s = stop"),
    }

    let commands = spawn_stdin_reader(duration.is_none());
    loop {
        match commands.recv_timeout(TICK) {
            Ok(Command::TogglePause) => {
                session.toggle_pause();
                match session.state() {
                    SessionState::Paused { duration_secs } => println!("Paused at {:.1}s", duration_secs),
                    SessionState::Recording { .. } => println!("Resumed"),
                    _ => {}
                }
            }
            Ok(Command::Stop) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if duration.is_none() {
                    break;
                }
            }
        }
        if duration.is_some_and(|secs| session.elapsed_secs() >= secs) {
            break;
        }
    }

    println!("Saving...");
    let report = session.stop()?;
    print_report(&report);
    Some(report)
}

/// Forward stdin commands. End of input counts as `s` when `stop_on_eof`.
fn spawn_stdin_reader(stop_on_eof: bool) -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new().name("stdin-commands".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let command = match line.trim() {
                "p" | "pause" | "resume" => Command::TogglePause,
                "s" | "q" | "stop" | "quit" => Command::Stop,
                "" => continue,
                other => {
                    eprintln!("Unknown command '{}'", other);
                    continue;
                }
            };
            if tx.send(command).is_err() {
                return;
            }
        }
        if stop_on_eof {
            let _ = tx.send(Command::Stop);
        }
    });
    if let Err(e) = spawned {
        log::warn!("Could not read commands from stdin: {}", e);
    }
    rx
}

fn print_report(report: &FinalizeReport) {
    println!(
        "Recorded {:.1}s in {} video / {} system audio / {} mic segments",
        report.duration_secs, report.segments.video, report.segments.system_audio, report.segments.mic_audio
    );
    match &report.outcome {
        FinalizeOutcome::Complete(result) => {
            println!("Saved {}", result.file_path.display());
            println!("sha256 {}", result.checksum);
        }
        FinalizeOutcome::VideoOnly(result) => {
            println!("Saved {} (no audio)", result.file_path.display());
            println!("sha256 {}", result.checksum);
        }
        FinalizeOutcome::NoOutput { reason } => eprintln!("No recording produced: {}", reason),
    }
}

type Providers = (
    Option<Arc<dyn AudioCaptureProvider>>,
    Option<Arc<dyn AudioCaptureProvider>>,
);

#[cfg(target_os = "windows")]
fn audio_providers(config: &RecordingConfiguration) -> Providers {
    use screen_recorder_windows::{WasapiLoopbackCapture, WasapiMicCapture};

    (
        Some(Arc::new(WasapiLoopbackCapture::new())),
        Some(Arc::new(WasapiMicCapture::new(config.mic_device.clone()))),
    )
}

#[cfg(not(target_os = "windows"))]
fn audio_providers(config: &RecordingConfiguration) -> Providers {
    if config.enable_system_audio || config.enable_mic_audio {
        log::warn!("No audio backend on this platform; recording video only");
    }
    (None, None)
}

#[cfg(target_os = "windows")]
fn list_mics() -> ExitCode {
    use screen_recorder_windows::device_enumerator::ComApartment;
    use screen_recorder_windows::DeviceEnumerator;

    let _com = match ComApartment::enter() {
        Ok(com) => com,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match DeviceEnumerator::new().and_then(|e| e.list_capture_devices()) {
        Ok(devices) if devices.is_empty() => {
            println!("No microphones found");
            ExitCode::SUCCESS
        }
        Ok(devices) => {
            for device in devices {
                let marker = if device.is_default { "*" } else { " " };
                println!("{} {}", marker, device.name);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Could not list microphones: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn list_mics() -> ExitCode {
    log::error!("Microphone listing is only available on Windows");
    ExitCode::FAILURE
}
