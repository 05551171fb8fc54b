use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// Inclusive range of frame times, possibly open-ended.
///
/// A span is *valid* when `end >= start`, or when it is infinite and `start >= 0`. Invalid spans
/// are ordinary values: every operation below is total and validity is just a query.
///
/// The default span is the canonical invalid (empty) span.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    start: i32,
    /// `None` means the span never ends.
    end: Option<i32>,
}

impl Default for TimeSpan {
    fn default() -> Self {
        Self {
            start: 0,
            end: Some(-1),
        }
    }
}

impl TimeSpan {
    /// Span covering `start..=end`. Invalid when `end < start`.
    pub fn from_time_to_time(start: i32, end: i32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Span of `duration` frames beginning at `start`. Invalid when `duration <= 0` or when the
    /// last frame would lie past `i32::MAX`.
    pub fn from_time_with_duration(start: i32, duration: i32) -> Self {
        let end = i64::from(start) + i64::from(duration) - 1;
        match i32::try_from(end) {
            Ok(end) if duration > 0 => Self::from_time_to_time(start, end),
            _ => Self::default(),
        }
    }

    /// Open-ended span beginning at `start`.
    pub fn infinite(start: i32) -> Self {
        Self { start, end: None }
    }

    /// First frame of the span.
    pub fn start(self) -> i32 {
        self.start
    }

    /// Last frame of the span, or `None` when the span is infinite.
    pub fn end(self) -> Option<i32> {
        self.end
    }

    /// Return `true` when the span has no end.
    pub fn is_infinite(self) -> bool {
        self.end.is_none()
    }

    /// Return `true` when the span covers at least one frame.
    pub fn is_valid(self) -> bool {
        match self.end {
            Some(end) => end >= self.start,
            None => self.start >= 0,
        }
    }

    /// Number of frames covered by a finite valid span; `0` otherwise.
    pub fn duration(self) -> i32 {
        match self.end {
            Some(end) if end >= self.start => end.saturating_sub(self.start).saturating_add(1),
            _ => 0,
        }
    }

    /// Return `true` when `time` lies inside the span.
    pub fn contains(self, time: i32) -> bool {
        if !self.is_valid() {
            return false;
        }
        match self.end {
            Some(end) => self.start <= time && time <= end,
            None => self.start <= time,
        }
    }

    /// Return `true` when the two spans share at least one frame.
    pub fn overlaps(self, other: Self) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return false;
        }
        match (self.end, other.end) {
            (None, None) => true,
            (None, Some(other_end)) => other_end >= self.start,
            (Some(end), None) => end >= other.start,
            (Some(end), Some(other_end)) => self.start <= other_end && other.start <= end,
        }
    }

    /// Smallest span covering both operands. An invalid operand contributes nothing.
    pub fn union(self, rhs: Self) -> Self {
        match (self.is_valid(), rhs.is_valid()) {
            (false, _) => rhs,
            (true, false) => self,
            (true, true) => {
                let start = self.start.min(rhs.start);
                let end = match (self.end, rhs.end) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                };
                Self { start, end }
            }
        }
    }

    /// Frames shared by both operands. Disjoint or invalid operands give an invalid span.
    pub fn intersect(self, rhs: Self) -> Self {
        if !self.is_valid() || !rhs.is_valid() {
            return Self::default();
        }
        let start = self.start.max(rhs.start);
        let end = match (self.end, rhs.end) {
            (None, None) => None,
            (None, Some(e)) | (Some(e), None) => Some(e),
            (Some(a), Some(b)) => Some(a.min(b)),
        };
        Self { start, end }
    }

    /// Grow the span so that it contains `time`.
    ///
    /// An invalid span becomes the single frame `[time, time]`.
    pub fn include(&mut self, time: i32) {
        if !self.is_valid() {
            *self = Self::from_time_to_time(time, time);
            return;
        }
        self.start = self.start.min(time);
        if let Some(end) = self.end.as_mut() {
            *end = (*end).max(time);
        }
    }

    /// Iterate the frames of a finite valid span. Infinite and invalid spans yield nothing.
    pub fn frames(self) -> impl Iterator<Item = i32> {
        let (first, last) = match self.end {
            Some(end) if end >= self.start => (self.start, end),
            _ => (1, 0),
        };
        first..=last
    }
}

impl BitOr for TimeSpan {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for TimeSpan {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl BitAnd for TimeSpan {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersect(rhs)
    }
}

impl BitAndAssign for TimeSpan {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = self.intersect(rhs);
    }
}

impl fmt::Debug for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, inf)", self.start),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/span.rs"]
mod tests;
