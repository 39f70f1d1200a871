//! Percent-step progress reporting through `tracing`.

/// Logs `info!` each time another `step` percent of the work is done.
#[derive(Debug, Clone)]
pub struct Progress {
    label: String,
    total: u64,
    step: u64,
    next: u64,
    enabled: bool,
}

impl Progress {
    /// Reporter for `total` units, logging every `step_percent` percent.
    pub fn new(label: impl Into<String>, total: u64, step_percent: u32) -> Self {
        let step = u64::from(step_percent.clamp(1, 100));
        Self { label: label.into(), total, step, next: step, enabled: true }
    }

    /// Reporter that never logs.
    pub fn disabled() -> Self {
        Self { label: String::new(), total: 0, step: 100, next: 100, enabled: false }
    }

    /// Change the total, restarting the percent steps.
    pub fn reset(&mut self, total: u64) {
        self.total = total;
        self.next = self.step;
    }

    /// Whether this reporter logs at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record that `done` units are complete. Returns the percent reported, if any.
    pub fn update(&mut self, done: u64) -> Option<u64> {
        if !self.enabled || self.total == 0 {
            return None;
        }
        let pct = done.min(self.total) * 100 / self.total;
        if pct < self.next {
            return None;
        }
        while self.next <= pct {
            self.next += self.step;
        }
        tracing::info!(label = %self.label, done, total = self.total, "{pct}% processed");
        Some(pct)
    }
}
