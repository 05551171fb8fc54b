use std::collections::HashMap;

use crate::cache::gluer::{
    CachedRangeMap, FrameSwapper, FramesGluer, GlueMode, INFINITE_LENGTH, run_covers, run_end,
};
use crate::foundation::core::{FramePixels, PixelRect};
use crate::foundation::error::AnimFrameResult;
use crate::foundation::span::TimeSpan;
use crate::graph::image::AnimationImage;

/// Whether a frame time has valid cached content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// A cached run covers the time.
    Cached,
    /// Nothing is cached for the time.
    Uncached,
}

/// Frame content fetched from an image, ready to be committed on the cache's owning thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedFrameData {
    /// Time the content was regenerated for.
    pub time: i32,
    /// Span over which the image shows identical content. Always contains `time`.
    pub identical_span: TimeSpan,
    /// Region the content was fetched for, clipped to the image bounds.
    pub region: PixelRect,
    /// The fetched pixels.
    pub pixels: FramePixels,
}

#[derive(Clone, Debug)]
struct CachedFrame<P> {
    region: PixelRect,
    payload: P,
}

/// Keeps the payload table in step with the range map while the gluer rewrites it.
struct PayloadSwapper<'a, P> {
    frames: &'a mut HashMap<i32, CachedFrame<P>>,
}

impl<P> FrameSwapper for PayloadSwapper<'_, P> {
    fn forget_frame(&mut self, start: i32) {
        self.frames.remove(&start);
    }

    fn move_frame(&mut self, from: i32, to: i32) {
        if let Some(frame) = self.frames.remove(&from) {
            self.frames.insert(to, frame);
        }
    }
}

/// Time-range frame cache: which frame times are valid, and the payload shown over each run.
///
/// Each entry of the range map owns exactly one payload, keyed by the run's start time. The cache
/// is single-writer; [`FrameCache::fetch_frame_data`] is the only part meant to run on image
/// worker threads.
pub struct FrameCache<P = FramePixels> {
    ranges: CachedRangeMap,
    frames: HashMap<i32, CachedFrame<P>>,
}

impl<P> Default for FrameCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> FrameCache<P> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            ranges: CachedRangeMap::new(),
            frames: HashMap::new(),
        }
    }

    /// Start time of the cached run covering `time`.
    pub fn frame_id_at(&self, time: i32) -> Option<i32> {
        self.ranges
            .range(..=time)
            .next_back()
            .filter(|&(&start, &len)| run_covers(start, len, time))
            .map(|(&start, _)| start)
    }

    /// Cache status of a single frame time.
    pub fn frame_status(&self, time: i32) -> CacheStatus {
        match self.frame_id_at(time) {
            Some(_) => CacheStatus::Cached,
            None => CacheStatus::Uncached,
        }
    }

    /// Payload shown at `time`.
    pub fn frame(&self, time: i32) -> Option<&P> {
        let id = self.frame_id_at(time)?;
        self.frames.get(&id).map(|f| &f.payload)
    }

    /// Region the payload shown at `time` was fetched for.
    pub fn frame_region(&self, time: i32) -> Option<PixelRect> {
        let id = self.frame_id_at(time)?;
        self.frames.get(&id).map(|f| f.region)
    }

    /// Span of the cached run covering `time`.
    pub fn cached_span(&self, time: i32) -> Option<TimeSpan> {
        let start = self.frame_id_at(time)?;
        let len = self.ranges.get(&start).copied()?;
        Some(match run_end(start, len) {
            Some(end) => TimeSpan::from_time_to_time(start, end),
            None => TimeSpan::infinite(start),
        })
    }

    /// Return `true` when switching the displayed time from `old_time` to `new_time` needs a
    /// different payload. A negative `old_time` means nothing is displayed yet.
    pub fn should_upload_new_frame(&self, new_time: i32, old_time: i32) -> bool {
        if old_time < 0 {
            return true;
        }
        let Some(old_start) = self.frame_id_at(old_time) else {
            return true;
        };
        let len = self.ranges.get(&old_start).copied().unwrap_or(0);
        !run_covers(old_start, len, new_time)
    }

    /// Return `true` when every frame of the finite `span` is cached with a region covering
    /// `roi`. Infinite and invalid spans never qualify.
    pub fn frames_have_valid_roi(&self, span: TimeSpan, roi: PixelRect) -> bool {
        if span.is_infinite() || !span.is_valid() {
            return false;
        }
        span.frames()
            .all(|t| self.frame_region(t).is_some_and(|r| r.contains_rect(roi)))
    }

    /// Forget cached content over `span`.
    ///
    /// `region` names the changed image area. Coverage is tracked per time only, so every frame in
    /// the span is invalidated whatever the region.
    #[tracing::instrument(level = "debug", skip(self, span), fields(span = %span))]
    pub fn invalidate_frames(&mut self, span: TimeSpan, region: PixelRect) -> bool {
        let changed = self.glue(span, GlueMode::Drop);
        if changed {
            tracing::debug!(runs = self.ranges.len(), ?region, "frame cache invalidated");
        }
        changed
    }

    /// Extend the run covering `span.start()` over the whole span, reusing its payload.
    ///
    /// Does nothing when `span.start()` is not cached.
    pub fn glue_identical_frames(&mut self, span: TimeSpan) -> bool {
        if !span.is_valid() || self.frame_id_at(span.start()).is_none() {
            return false;
        }
        self.glue(span, GlueMode::Cache)
    }

    /// Store `payload` as the content shown over `span`, replacing whatever covered it before.
    pub fn add_frame(&mut self, span: TimeSpan, region: PixelRect, payload: P) {
        if !span.is_valid() {
            tracing::warn!(span = %span, "ignoring frame for invalid span");
            return;
        }
        self.glue(span, GlueMode::Drop);
        // After the drop nothing covers `span.start()`, so caching only fails on an oversized span.
        if !self.glue(span, GlueMode::Cache) {
            tracing::warn!(span = %span, "frame span too long to cache");
            return;
        }
        self.frames
            .insert(span.start(), CachedFrame { region, payload });
    }

    /// Commit data produced by [`FrameCache::fetch_frame_data`].
    pub fn add_converted_frame_data(&mut self, data: ConvertedFrameData)
    where
        P: From<FramePixels>,
    {
        let ConvertedFrameData {
            time,
            identical_span,
            region,
            pixels,
        } = data;
        tracing::debug!(time, span = %identical_span, "committing frame data");
        self.add_frame(identical_span, region, P::from(pixels));
    }

    /// Cached runs as `start -> length` (`-1` for an infinite run).
    pub fn ranges(&self) -> &CachedRangeMap {
        &self.ranges
    }

    /// Number of cached runs.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Return `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Drop every cached run.
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.frames.clear();
    }

    fn glue(&mut self, span: TimeSpan, mode: GlueMode) -> bool {
        let mut swapper = PayloadSwapper {
            frames: &mut self.frames,
        };
        FramesGluer::new(&mut self.ranges, &mut swapper).glue_frames(span, mode)
    }
}

impl FrameCache {
    /// Fetch the content of `image` at `time` over `region`.
    ///
    /// Runs on the image's worker thread right after the frame was regenerated, while the image
    /// still shows `time`.
    pub fn fetch_frame_data(
        time: i32,
        image: &dyn AnimationImage,
        region: PixelRect,
    ) -> AnimFrameResult<ConvertedFrameData> {
        let region = image.bounds().intersect(region);
        let pixels = image.projection(region)?;
        let mut identical_span = image.identical_frames(time);
        if !identical_span.contains(time) {
            identical_span = TimeSpan::from_time_to_time(time, time);
        }
        Ok(ConvertedFrameData {
            time,
            identical_span,
            region,
            pixels,
        })
    }
}

impl<P> std::fmt::Debug for FrameCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let runs = self
            .ranges
            .iter()
            .map(|(&start, &len)| match len {
                INFINITE_LENGTH => TimeSpan::infinite(start),
                len => TimeSpan::from_time_with_duration(start, len),
            })
            .collect::<Vec<_>>();
        f.debug_struct("FrameCache").field("runs", &runs).finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame_cache.rs"]
mod tests;
