//! Per-session segment bookkeeping.
//!
//! Each source kind gets one append-only list. A worker holds the only
//! [`SegmentWriter`] for its kind; the controller reads the lists only
//! after the workers have been joined.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::models::error::RecorderError;
use crate::models::media_models::SourceKind;
use crate::models::recording_result::SegmentCounts;
use crate::models::segment::Segment;

type SegmentList = Arc<Mutex<Vec<Segment>>>;

/// Scoped temporary area holding one session's segments and scratch files.
pub struct SegmentStore {
    dir: Option<TempDir>,
    root: PathBuf,
    video: SegmentList,
    system_audio: SegmentList,
    mic_audio: SegmentList,
    min_audio_bytes: u64,
}

impl SegmentStore {
    /// Create a fresh `screen_recorder_*` directory under `temp_root`
    /// (or the system temp directory).
    pub fn create(temp_root: Option<&Path>, min_audio_bytes: u64) -> Result<Self, RecorderError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("screen_recorder_");
        let dir = match temp_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let root = dir.path().to_path_buf();
        log::debug!("Segment store at {}", root.display());

        Ok(Self {
            dir: Some(dir),
            root,
            video: Arc::default(),
            system_audio: Arc::default(),
            mic_audio: Arc::default(),
            min_audio_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Append handle for one source kind.
    pub fn writer(&self, kind: SourceKind) -> SegmentWriter {
        SegmentWriter {
            kind,
            dir: self.root.clone(),
            list: Arc::clone(self.list(kind)),
            min_bytes: self.min_bytes(kind),
        }
    }

    /// Snapshot of the committed segments of `kind`, in index order.
    pub fn segments(&self, kind: SourceKind) -> Vec<Segment> {
        let mut segments = self.list(kind).lock().clone();
        segments.sort_by_key(|s| s.index);
        segments
    }

    pub fn counts(&self) -> SegmentCounts {
        let mut counts = SegmentCounts::default();
        for kind in SourceKind::ALL {
            counts.set(kind, self.list(kind).lock().len());
        }
        counts
    }

    /// Path for an intermediate artifact inside the temporary area.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Size a segment of `kind` must exceed to be kept.
    pub fn min_bytes(&self, kind: SourceKind) -> u64 {
        if kind.is_audio() {
            self.min_audio_bytes
        } else {
            0
        }
    }

    /// Forget all segments and delete the temporary area.
    pub fn purge(&mut self) {
        for kind in SourceKind::ALL {
            self.list(kind).lock().clear();
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => log::debug!("Removed temporary area {}", path.display()),
                Err(e) => log::warn!("Failed to remove temporary area {}: {}", path.display(), e),
            }
        }
    }

    pub fn is_purged(&self) -> bool {
        self.dir.is_none()
    }

    fn list(&self, kind: SourceKind) -> &SegmentList {
        match kind {
            SourceKind::Video => &self.video,
            SourceKind::SystemAudio => &self.system_audio,
            SourceKind::MicAudio => &self.mic_audio,
        }
    }
}

/// A reserved, not yet committed segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSegment {
    pub kind: SourceKind,
    pub index: usize,
    pub path: PathBuf,
}

/// Append-only handle to one source kind's segment list.
#[derive(Clone)]
pub struct SegmentWriter {
    kind: SourceKind,
    dir: PathBuf,
    list: SegmentList,
    min_bytes: u64,
}

impl SegmentWriter {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Reserve the next index and file path.
    ///
    /// The index is the number of committed segments, so a discarded
    /// interval leaves no gap.
    pub fn begin(&self) -> PendingSegment {
        let index = self.list.lock().len();
        let path = self
            .dir
            .join(format!("{}_{:04}.{}", self.kind.file_stem(), index, self.kind.extension()));
        PendingSegment {
            kind: self.kind,
            index,
            path,
        }
    }

    /// Append the finished file to the list if it exists and is large enough.
    ///
    /// A rejected file is deleted so it can never be picked up later.
    pub fn commit(&self, pending: PendingSegment) -> Result<Segment, RecorderError> {
        let size = match fs::metadata(&pending.path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return Err(RecorderError::SegmentRejected(format!(
                    "{} segment {} was never written",
                    self.kind, pending.index
                )))
            }
        };

        if size <= self.min_bytes {
            self.discard(&pending);
            return Err(RecorderError::SegmentRejected(format!(
                "{} segment {} is {} bytes (minimum {})",
                self.kind, pending.index, size, self.min_bytes
            )));
        }

        let mut list = self.list.lock();
        if pending.index != list.len() {
            return Err(RecorderError::SegmentRejected(format!(
                "{} segment index {} out of sequence (expected {})",
                self.kind,
                pending.index,
                list.len()
            )));
        }

        let segment = Segment {
            kind: self.kind,
            index: pending.index,
            path: pending.path,
            byte_size: size,
        };
        list.push(segment.clone());
        Ok(segment)
    }

    /// Drop a reserved segment, deleting any partial file.
    pub fn discard(&self, pending: &PendingSegment) {
        if pending.path.exists() {
            if let Err(e) = fs::remove_file(&pending.path) {
                log::warn!("Failed to remove discarded segment {}: {}", pending.path.display(), e);
            }
        }
    }
}
