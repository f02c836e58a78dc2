use std::time::{Duration, Instant};

/// Active recording time, excluding pauses.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    accumulated: Duration,
    interval_start: Option<Instant>,
}

impl SessionClock {
    /// Reset and start the first interval.
    pub fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.interval_start = Some(Instant::now());
    }

    /// Close the running interval, adding it to the total.
    pub fn pause(&mut self) {
        if let Some(start) = self.interval_start.take() {
            self.accumulated += start.elapsed();
        }
    }

    pub fn resume(&mut self) {
        if self.interval_start.is_none() {
            self.interval_start = Some(Instant::now());
        }
    }

    /// Close any running interval and return the total.
    pub fn stop(&mut self) -> Duration {
        self.pause();
        self.accumulated
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.interval_start.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.interval_start.is_some()
    }
}
