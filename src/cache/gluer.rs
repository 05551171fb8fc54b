use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use crate::foundation::span::TimeSpan;

/// Sparse table of cached frame runs: `start time -> number of frames`.
///
/// A length of [`INFINITE_LENGTH`] means the run never ends. Runs never overlap; adjacent runs are
/// legal because each one carries its own payload.
pub type CachedRangeMap = BTreeMap<i32, i32>;

/// Length marker for a run that extends to infinity.
pub const INFINITE_LENGTH: i32 = -1;

/// Receives payload bookkeeping events while the range map is rewritten.
pub trait FrameSwapper {
    /// The run starting at `start` is gone; release its payload.
    fn forget_frame(&mut self, start: i32);
    /// The run starting at `from` now starts at `to`; keep the payload under the new key.
    fn move_frame(&mut self, from: i32, to: i32);
}

/// What [`FramesGluer::glue_frames`] does with the span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlueMode {
    /// The span now shows the content of the run containing `span.start()`: extend that run
    /// (or open a new one at `span.start()`) and cut away whatever it now covers.
    Cache,
    /// The span is no longer valid: cut it out of every run it touches.
    Drop,
}

/// Last frame of a run, `None` for an infinite run.
pub(crate) fn run_end(start: i32, length: i32) -> Option<i32> {
    if length == INFINITE_LENGTH {
        None
    } else {
        let end = i64::from(start) + i64::from(length) - 1;
        Some(i32::try_from(end).unwrap_or(i32::MAX))
    }
}

/// Return `true` when the run `start -> length` covers `time`.
pub(crate) fn run_covers(start: i32, length: i32, time: i32) -> bool {
    match run_end(start, length) {
        None => start <= time,
        Some(end) => start <= time && time <= end,
    }
}

/// Length of the run `start..=end`, `INFINITE_LENGTH` when `end` is `None`. `None` when the
/// length does not fit the map.
fn run_length(start: i32, end: Option<i32>) -> Option<i32> {
    match end {
        None => Some(INFINITE_LENGTH),
        Some(end) => i32::try_from(i64::from(end) - i64::from(start) + 1).ok(),
    }
}

/// Rewrites a [`CachedRangeMap`] and reports payload moves/drops to a [`FrameSwapper`].
pub struct FramesGluer<'a, S: FrameSwapper + ?Sized> {
    frames: &'a mut CachedRangeMap,
    swapper: &'a mut S,
}

impl<'a, S: FrameSwapper + ?Sized> FramesGluer<'a, S> {
    /// Borrow a range map and the payload store that mirrors it.
    pub fn new(frames: &'a mut CachedRangeMap, swapper: &'a mut S) -> Self {
        Self { frames, swapper }
    }

    /// Apply `span` to the map. Returns `true` when the map changed.
    ///
    /// Invalid spans are ignored.
    pub fn glue_frames(&mut self, span: TimeSpan, mode: GlueMode) -> bool {
        if !span.is_valid() {
            return false;
        }
        match mode {
            GlueMode::Cache => self.extend(span),
            GlueMode::Drop => self.cut(span),
        }
    }

    fn extend(&mut self, span: TimeSpan) -> bool {
        let start = span.start();
        let owner = self
            .frames
            .range(..=start)
            .next_back()
            .map(|(&k, &len)| (k, len))
            .filter(|&(k, len)| run_covers(k, len, start));

        let (owner_start, new_end) = match owner {
            Some((_, len)) if len == INFINITE_LENGTH => return false,
            Some((k, len)) => {
                let end = match (run_end(k, len), span.end()) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                };
                (k, end)
            }
            None => (start, span.end()),
        };

        let Some(mut new_len) = run_length(owner_start, new_end) else {
            tracing::warn!(span = %span, owner_start, "glued run length does not fit, span ignored");
            return false;
        };

        let mut changed = owner.is_none();
        let followers = self
            .frames
            .range((Excluded(owner_start), Unbounded))
            .map(|(&k, &len)| (k, len))
            .collect::<Vec<_>>();

        for (key, len) in followers {
            if new_end.is_some_and(|end| key > end) {
                break;
            }
            self.frames.remove(&key);
            changed = true;
            if len == INFINITE_LENGTH {
                // Touching the infinite tail makes the glued run infinite.
                self.swapper.forget_frame(key);
                new_len = INFINITE_LENGTH;
                break;
            }
            if self.push_back_run(key, len, new_end) {
                break;
            }
        }

        if self.frames.insert(owner_start, new_len) != Some(new_len) {
            changed = true;
        }
        changed
    }

    fn cut(&mut self, span: TimeSpan) -> bool {
        let start = span.start();
        let mut changed = false;

        if let Some((&key, &len)) = self.frames.range(..start).next_back() {
            let reaches = run_end(key, len).is_none_or(|end| end >= start);
            if reaches {
                // The tail beyond the span cannot share the payload, so it goes too.
                let kept = i64::from(start) - i64::from(key);
                self.frames
                    .insert(key, i32::try_from(kept).unwrap_or(i32::MAX));
                changed = true;
            }
        }

        let inside = match span.end() {
            Some(end) => self.frames.range(start..=end),
            None => self.frames.range(start..),
        }
        .map(|(&k, &len)| (k, len))
        .collect::<Vec<_>>();

        for (key, len) in inside {
            self.frames.remove(&key);
            changed = true;
            self.push_back_run(key, len, span.end());
        }
        changed
    }

    /// Re-key the removed run `key -> len` so that it starts right after `cut_end`, or forget it
    /// when nothing of it survives. Returns `true` when the run survived.
    fn push_back_run(&mut self, key: i32, len: i32, cut_end: Option<i32>) -> bool {
        let Some(cut_end) = cut_end else {
            self.swapper.forget_frame(key);
            return false;
        };
        let Some(new_start) = cut_end.checked_add(1) else {
            self.swapper.forget_frame(key);
            return false;
        };
        let surviving = match run_end(key, len) {
            None => Some(INFINITE_LENGTH),
            Some(end) if end > cut_end => Some(end - cut_end),
            Some(_) => None,
        };
        match surviving {
            Some(new_len) => {
                self.frames.insert(new_start, new_len);
                self.swapper.move_frame(key, new_start);
                true
            }
            None => {
                self.swapper.forget_frame(key);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/gluer.rs"]
mod tests;
