use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::cache::frame_cache::{CacheStatus, ConvertedFrameData, FrameCache};
use crate::foundation::core::PixelRect;
use crate::foundation::error::{AnimFrameError, AnimFrameResult};
use crate::foundation::span::TimeSpan;
use crate::graph::image::{AnimationImage, ImageHandle};
use crate::render::orchestrator::{RenderResult, RenderStrategy};
use crate::render::renderer::{CancelReason, RendererHooks};

/// Fills a [`FrameCache`] with every uncached frame of a playback range.
///
/// Frame content is fetched on the image threads and committed to the cache on the coordinating
/// thread when the completion arrives.
#[derive(Debug)]
pub struct CacheRegeneration<'a> {
    cache: &'a mut FrameCache,
    playback_range: TimeSpan,
    region_of_interest: Option<PixelRect>,
    fetched_tx: Sender<ConvertedFrameData>,
    fetched_rx: Receiver<ConvertedFrameData>,
}

impl<'a> CacheRegeneration<'a> {
    /// Regenerate the uncached frames of the finite `playback_range` into `cache`.
    pub fn new(cache: &'a mut FrameCache, playback_range: TimeSpan) -> AnimFrameResult<Self> {
        if !playback_range.is_valid() || playback_range.is_infinite() {
            return Err(AnimFrameError::validation(format!(
                "cache playback range must be finite and valid, got {playback_range}"
            )));
        }
        let (fetched_tx, fetched_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            cache,
            playback_range,
            region_of_interest: None,
            fetched_tx,
            fetched_rx,
        })
    }

    /// Also treat frames cached for a region that does not cover `roi` as dirty.
    ///
    /// Pass the same region to [`crate::OrchestratorOpts::region_of_interest`].
    pub fn with_region_of_interest(mut self, roi: PixelRect) -> Self {
        self.region_of_interest = Some(roi);
        self
    }

    /// The cache being filled.
    pub fn cache(&self) -> &FrameCache {
        self.cache
    }

    fn needs_regeneration(&self, window: TimeSpan) -> bool {
        match self.region_of_interest {
            Some(roi) => !self.cache.frames_have_valid_roi(window, roi),
            None => window
                .frames()
                .any(|t| self.cache.frame_status(t) == CacheStatus::Uncached),
        }
    }

    fn commit_fetched(&mut self) {
        for data in self.fetched_rx.try_iter() {
            self.cache.add_converted_frame_data(data);
        }
    }
}

impl RenderStrategy for CacheRegeneration<'_> {
    fn calc_dirty_frames(&mut self, image: &dyn AnimationImage) -> Vec<i32> {
        let mut dirty = Vec::new();
        let Some(last) = self.playback_range.end() else {
            return dirty;
        };
        let mut frame = self.playback_range.start();
        while frame <= last {
            let mut still = image.identical_frames(frame);
            if !still.contains(frame) {
                tracing::warn!(frame, span = %still, "identical span misses its frame");
                still = TimeSpan::from_time_to_time(frame, frame);
            }
            // Frames of the run outside the playback range are not checked.
            let window = still & self.playback_range;
            if self.needs_regeneration(window) {
                dirty.push(still.start());
            }
            match still.end() {
                Some(end) if end < i32::MAX => frame = end + 1,
                _ => break,
            }
        }
        tracing::debug!(range = %self.playback_range, dirty = dirty.len(), "cache dirty frames");
        dirty
    }

    fn create_renderer(&mut self, _image: &ImageHandle) -> Arc<dyn RendererHooks> {
        Arc::new(FetchFrameHooks {
            fetched: self.fetched_tx.clone(),
        })
    }

    fn frame_completed(&mut self, _frame: i32) {
        self.commit_fetched();
    }

    fn frame_cancelled(&mut self, frame: i32, reason: CancelReason) {
        tracing::debug!(frame, ?reason, "cache frame not regenerated");
    }

    fn pass_finished(&mut self, _result: RenderResult) {
        // Hooks that finished while the pass was cancelled still fetched valid content.
        self.commit_fetched();
    }
}

struct FetchFrameHooks {
    fetched: Sender<ConvertedFrameData>,
}

impl RendererHooks for FetchFrameHooks {
    fn frame_completed(
        &self,
        image: &dyn AnimationImage,
        frame: i32,
        region: PixelRect,
    ) -> AnimFrameResult<()> {
        let data = FrameCache::fetch_frame_data(frame, image, region)?;
        self.fetched
            .send(data)
            .map_err(|_| AnimFrameError::render("frame cache regeneration is gone"))
    }
}
