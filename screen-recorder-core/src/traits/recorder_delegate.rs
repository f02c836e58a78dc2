use crate::models::error::RecorderError;
use crate::models::recording_result::FinalizeReport;
use crate::models::state::SessionState;

/// Event delegate for recording session notifications.
///
/// `on_error` may be called from worker threads; the others fire on the
/// thread driving the session. Implementations should marshal to the UI
/// thread if needed.
pub trait RecorderDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called when a source degrades (device missing, spawn failure, ...).
    fn on_error(&self, error: &RecorderError);

    /// Called after `stop()` has finalized the session.
    fn on_recording_finished(&self, report: &FinalizeReport);
}
