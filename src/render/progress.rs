use std::time::{Duration, Instant};

/// Minimum time between two progress surface updates.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(40);

/// Severity of a final message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageLevel {
    /// Informational note.
    Info,
    /// Something went wrong.
    Warning,
}

/// Optional UI (or log) surface showing the progress of a regeneration pass.
///
/// Every method is called on the coordinating thread.
pub trait ProgressSurface {
    /// Set the progress range.
    fn set_range(&mut self, min: usize, max: usize);
    /// Set the number of processed frames.
    fn set_value(&mut self, value: usize);
    /// Replace the descriptive label.
    fn set_label(&mut self, text: &str);
    /// Return `true` once the user asked to stop. Polled by the pass loop.
    fn was_cancelled(&self) -> bool {
        false
    }
    /// Show a final message after the pass ended.
    fn show_message(&mut self, level: MessageLevel, title: &str, text: &str);
}

/// Progress surface that reports through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    max: usize,
}

impl ProgressSurface for LogProgress {
    fn set_range(&mut self, _min: usize, max: usize) {
        self.max = max;
    }

    fn set_value(&mut self, value: usize) {
        tracing::info!(done = value, total = self.max, "regeneration progress");
    }

    fn set_label(&mut self, text: &str) {
        tracing::debug!(label = text, "progress label");
    }

    fn show_message(&mut self, level: MessageLevel, title: &str, text: &str) {
        match level {
            MessageLevel::Info => tracing::info!(title, "{text}"),
            MessageLevel::Warning => tracing::warn!(title, "{text}"),
        }
    }
}

/// Coalesces bursts of progress updates.
///
/// The first request after a quiet period goes through at once; further requests inside the
/// interval are folded into one update emitted when the interval ends.
#[derive(Clone, Debug)]
pub struct ProgressCompressor {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: bool,
}

impl ProgressCompressor {
    /// Compressor with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: false,
        }
    }

    /// Register a change. Returns `true` when the update should be emitted now.
    pub fn request(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.pending = true;
                false
            }
            _ => {
                self.last_emit = Some(now);
                self.pending = false;
                true
            }
        }
    }

    /// Return `true` when a folded update is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.pending {
            return false;
        }
        let due = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_emit = Some(now);
            self.pending = false;
        }
        due
    }

    /// When the folded update becomes due, if one is waiting.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_emit.map(|last| last + self.interval)
    }

    /// Forget any waiting update and start over.
    pub fn reset(&mut self) {
        self.last_emit = None;
        self.pending = false;
    }
}

impl Default for ProgressCompressor {
    fn default() -> Self {
        Self::new(PROGRESS_UPDATE_INTERVAL)
    }
}

/// Snapshot used to build the progress label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Frames scheduled at the start of the pass.
    pub total: usize,
    /// Frames no longer dirty nor in progress.
    pub processed: usize,
    /// Time since the pass started.
    pub elapsed: Duration,
    /// Worker count when the memory budget lowered it.
    pub memory_limited_workers: Option<usize>,
}

impl ProgressSnapshot {
    /// Projected duration of the whole pass; zero until a frame was processed.
    pub fn estimated(&self) -> Duration {
        if self.processed == 0 {
            return Duration::ZERO;
        }
        let ms = self.elapsed.as_millis() * self.total as u128 / self.processed as u128;
        Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
    }
}

/// Multi-line label shown while a pass runs.
pub fn format_progress_label(title: &str, snapshot: &ProgressSnapshot) -> String {
    let estimated = snapshot.estimated();
    let with_hours = estimated.as_secs() >= 3600 || snapshot.elapsed.as_secs() >= 3600;
    let mut label = format!(
        "{title}\n\nFrame {} of {}\nElapsed: {}\nEstimated: {}",
        snapshot.processed,
        snapshot.total,
        format_clock(snapshot.elapsed, with_hours),
        format_clock(estimated, with_hours),
    );
    if let Some(workers) = snapshot.memory_limited_workers {
        label.push_str(&format!(
            "\n\nThe memory limit has been reached.\n\
             The number of frames processed simultaneously is limited to {workers}."
        ));
    }
    label
}

/// `mm:ss`, or `HH:mm:ss` when `with_hours` is set.
pub fn format_clock(d: Duration, with_hours: bool) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if with_hours {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/progress.rs"]
mod tests;
