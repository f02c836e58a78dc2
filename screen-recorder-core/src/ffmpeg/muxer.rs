//! Final concat + mux into the destination directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::command;
use super::process::run_ffmpeg;
use crate::models::error::RecorderError;
use crate::models::segment::{self, Segment};
use crate::traits::media_muxer::{MediaMuxer, MuxJob};

pub const CONCAT_MANIFEST: &str = "concat_list.txt";
pub const COMBINED_VIDEO: &str = "combined_video.mp4";
pub const MUXED_OUTPUT: &str = "muxed_output.mp4";

/// `recording_YYYYMMDD_HHMMSS.mp4`
pub fn recording_file_name(timestamp: &DateTime<Local>) -> String {
    format!("recording_{}.mp4", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Destination path for a recording finalized at `timestamp`, with a
/// `_N` suffix if a file of that name already exists.
pub fn unique_destination(dir: &Path, timestamp: &DateTime<Local>) -> PathBuf {
    let name = recording_file_name(timestamp);
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.trim_end_matches(".mp4");
    (1..)
        .map(|n| dir.join(format!("{}_{}.mp4", stem, n)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Concat-demuxer manifest for the segments that still exist, in index order.
pub fn concat_manifest(segments: &[Segment]) -> String {
    segment::in_index_order(segments)
        .into_iter()
        .filter(|s| s.exists())
        .map(|s| format!("file '{}'\n", escape_concat_path(&s.path)))
        .collect()
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").replace('\'', r"'\''")
}

/// Move `staged` to `destination` without ever exposing a partial file there.
///
/// Falls back to copy-then-rename when the two paths are on different
/// filesystems.
pub fn publish(staged: &Path, destination: &Path) -> Result<(), RecorderError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RecorderError::StorageError(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    if fs::rename(staged, destination).is_ok() {
        return Ok(());
    }

    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".into());
    let partial = destination.with_file_name(format!(".{}.part", file_name));
    let result = fs::copy(staged, &partial).and_then(|_| fs::rename(&partial, destination));
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(RecorderError::StorageError(format!(
            "failed to move recording to {}: {}",
            destination.display(),
            e
        )));
    }
    Ok(())
}

/// `MediaMuxer` backed by the ffmpeg executable.
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }
}

impl MediaMuxer for FfmpegMuxer {
    fn finalize(&self, job: &MuxJob<'_>) -> Result<PathBuf, RecorderError> {
        let manifest = concat_manifest(job.video_segments);
        if manifest.is_empty() {
            return Err(RecorderError::MuxFailed("no video segments on disk".into()));
        }

        let manifest_path = job.scratch_dir.join(CONCAT_MANIFEST);
        fs::write(&manifest_path, manifest)?;

        let combined = job.scratch_dir.join(COMBINED_VIDEO);
        run_ffmpeg(&self.ffmpeg, &command::concat_args(&manifest_path, &combined))?;

        let staged = match job.audio {
            Some(audio) => {
                let muxed = job.scratch_dir.join(MUXED_OUTPUT);
                run_ffmpeg(&self.ffmpeg, &command::mux_args(&combined, &audio.path, &muxed))?;
                muxed
            }
            None => combined,
        };

        publish(&staged, job.destination)?;
        Ok(job.destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media_models::SourceKind;
    use chrono::TimeZone;

    fn video_segment(dir: &Path, index: usize, write: bool) -> Segment {
        let path = dir.join(format!("video_segment_{:04}.mp4", index));
        if write {
            fs::write(&path, b"frames").unwrap();
        }
        Segment {
            kind: SourceKind::Video,
            index,
            path,
            byte_size: 6,
        }
    }

    #[test]
    fn file_name_has_second_precision() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(recording_file_name(&ts), "recording_20240309_070502.mp4");
    }

    #[test]
    fn destination_gets_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();

        let first = unique_destination(dir.path(), &ts);
        assert!(first.ends_with("recording_20240309_070502.mp4"));
        fs::write(&first, b"x").unwrap();

        let second = unique_destination(dir.path(), &ts);
        assert!(second.ends_with("recording_20240309_070502_1.mp4"));
    }

    #[test]
    fn manifest_is_index_ordered_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![
            video_segment(dir.path(), 2, true),
            video_segment(dir.path(), 0, true),
            video_segment(dir.path(), 1, false),
        ];

        let manifest = concat_manifest(&segments);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("video_segment_0000.mp4'"));
        assert!(lines[1].ends_with("video_segment_0002.mp4'"));
        assert!(lines.iter().all(|l| l.starts_with("file '")));
    }

    #[test]
    fn manifest_escapes_quotes_and_backslashes() {
        assert_eq!(
            escape_concat_path(Path::new(r"C:\Temp\it's\seg.mp4")),
            r"C:/Temp/it'\''s/seg.mp4"
        );
    }

    #[test]
    fn publish_moves_file_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("muxed_output.mp4");
        fs::write(&staged, b"movie").unwrap();
        let destination = dir.path().join("Screen Recordings").join("recording_1.mp4");

        publish(&staged, &destination).unwrap();
        assert_eq!(fs::read(&destination).unwrap(), b"movie");
        assert!(!staged.exists());
    }

    #[test]
    fn finalize_without_segments_fails_before_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out").join("recording.mp4");
        let muxer = FfmpegMuxer::new("/nonexistent/ffmpeg");
        let missing = vec![video_segment(dir.path(), 0, false)];
        let job = MuxJob {
            video_segments: &missing,
            audio: None,
            scratch_dir: dir.path(),
            destination: &destination,
        };

        assert!(matches!(muxer.finalize(&job), Err(RecorderError::MuxFailed(_))));
        assert!(!destination.exists());
    }

    #[test]
    fn finalize_with_broken_ffmpeg_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out").join("recording.mp4");
        let muxer = FfmpegMuxer::new(dir.path().join("no-ffmpeg"));
        let segments = vec![video_segment(dir.path(), 0, true)];
        let job = MuxJob {
            video_segments: &segments,
            audio: None,
            scratch_dir: dir.path(),
            destination: &destination,
        };

        assert!(muxer.finalize(&job).is_err());
        assert!(!destination.exists());
        assert!(dir.path().join(CONCAT_MANIFEST).exists());
    }
}
