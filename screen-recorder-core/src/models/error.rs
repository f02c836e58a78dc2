use thiserror::Error;

/// Errors that can occur while capturing, mixing, or muxing a recording.
///
/// None of these reach the caller of `RecordingSession::stop`; the session
/// turns them into degraded outcomes and log entries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("failed to spawn {0}")]
    SpawnFailed(String),

    #[error("segment rejected: {0}")]
    SegmentRejected(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("mix failed: {0}")]
    MixFailed(String),

    #[error("mux failed: {0}")]
    MuxFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<hound::Error> for RecorderError {
    fn from(err: hound::Error) -> Self {
        Self::EncodingFailed(err.to_string())
    }
}
