/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → recording ⇄ paused
///            ↓          ↓
///           finalizing → idle
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Recording { duration_secs: f64 },
    Paused { duration_secs: f64 },
    Finalizing,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Recording or paused: a session that `stop()` would finalize.
    pub fn is_active(&self) -> bool {
        self.is_recording() || self.is_paused()
    }

    /// Returns the accumulated duration if in a state that tracks it.
    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Recording { duration_secs } | Self::Paused { duration_secs } => Some(*duration_secs),
            _ => None,
        }
    }
}
