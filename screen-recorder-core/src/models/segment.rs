use std::path::PathBuf;

use super::media_models::SourceKind;

/// One finished capture interval persisted as a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SourceKind,
    /// 0-based, gapless per source kind within a session.
    pub index: usize,
    pub path: PathBuf,
    /// Size measured when the interval was committed.
    pub byte_size: u64,
}

impl Segment {
    /// Whether the file is still on disk.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Whether the file exists and is larger than `min_bytes` right now.
    pub fn is_usable(&self, min_bytes: u64) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > min_bytes)
            .unwrap_or(false)
    }
}

/// Returns the segments sorted by sequence index.
pub fn in_index_order(segments: &[Segment]) -> Vec<&Segment> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize, path: &str) -> Segment {
        Segment {
            kind: SourceKind::MicAudio,
            index,
            path: PathBuf::from(path),
            byte_size: 0,
        }
    }

    #[test]
    fn ordering_follows_index_not_slice_position() {
        let segments = vec![segment(2, "c"), segment(0, "a"), segment(1, "b")];
        let ordered: Vec<usize> = in_index_order(&segments).iter().map(|s| s.index).collect();
        assert_eq!(ordered, vec![0, 1, 2]);
    }

    #[test]
    fn usable_checks_current_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mic_audio_0000.wav");
        std::fs::write(&path, vec![0u8; 1500]).unwrap();

        let seg = Segment {
            kind: SourceKind::MicAudio,
            index: 0,
            path: path.clone(),
            byte_size: 1500,
        };
        assert!(seg.exists());
        assert!(seg.is_usable(1000));
        assert!(!seg.is_usable(2000));

        std::fs::remove_file(&path).unwrap();
        assert!(!seg.exists());
        assert!(!seg.is_usable(0));
    }
}
