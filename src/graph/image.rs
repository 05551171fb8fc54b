use std::sync::Arc;

use crate::foundation::core::{FramePixels, PixelRect};
use crate::foundation::error::AnimFrameResult;
use crate::foundation::span::TimeSpan;
use crate::graph::memory::MemoryStatistics;
use crate::render::renderer::FrameNotifier;

/// Shared handle to an image graph instance.
pub type ImageHandle = Arc<dyn AnimationImage>;

/// Options of a single regeneration request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegenerationFlags {
    /// The image may abort the request when asked to.
    pub cancellable: bool,
}

impl RegenerationFlags {
    /// Requests that always run to completion.
    pub const NONE: Self = Self { cancellable: false };
    /// Requests the image may abort.
    pub const CANCELLABLE: Self = Self { cancellable: true };
}

/// One "regenerate this frame" request handed to an image.
#[derive(Clone)]
pub struct FrameRequest {
    /// Frame time to regenerate.
    pub frame: i32,
    /// Region of interest; content outside it may stay stale.
    pub region: PixelRect,
    /// Whether [`AnimationImage::cancel_frame_regeneration`] may abort this request.
    pub cancellable: bool,
    /// Where the image reports the outcome, from any thread.
    pub notifier: FrameNotifier,
}

impl std::fmt::Debug for FrameRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRequest")
            .field("frame", &self.frame)
            .field("region", &self.region)
            .field("cancellable", &self.cancellable)
            .finish_non_exhaustive()
    }
}

/// Animated image graph that can be cloned, locked and asked to regenerate frames.
///
/// Regeneration is asynchronous: [`AnimationImage::request_frame_regeneration`] returns at once
/// and the image later calls exactly one of [`FrameNotifier::frame_ready`] or
/// [`FrameNotifier::frame_cancelled`] from one of its own threads. While `frame_ready` runs, the
/// image must show the requested frame so that [`AnimationImage::projection`] reads it.
pub trait AnimationImage: Send + Sync {
    /// Independent copy of the graph. `with_content` also copies the current projection.
    fn clone_image(&self, with_content: bool) -> AnimFrameResult<ImageHandle>;

    /// Start regenerating `request.frame`.
    fn request_frame_regeneration(&self, request: FrameRequest);

    /// Abort cancellable requests that have not finished yet.
    fn cancel_frame_regeneration(&self) {}

    /// Take the barrier lock when the image is idle; `false` when it is busy.
    fn try_barrier_lock(&self, read_only: bool) -> bool;

    /// Wait until the image is idle, then take the barrier lock.
    fn barrier_lock(&self, read_only: bool);

    /// Release the barrier lock.
    fn unlock(&self);

    /// Number of threads the image may use for its own work.
    fn set_working_threads_limit(&self, limit: usize);

    /// Current working-thread limit.
    fn working_threads_limit(&self) -> usize;

    /// Full image area.
    fn bounds(&self) -> PixelRect;

    /// Memory footprint of the graph and of one extra clone.
    fn memory_statistics(&self) -> MemoryStatistics;

    /// Pixels of the currently shown frame over `region`.
    fn projection(&self, region: PixelRect) -> AnimFrameResult<FramePixels>;

    /// Span over which the content shown at `time` does not change.
    fn identical_frames(&self, time: i32) -> TimeSpan {
        TimeSpan::from_time_to_time(time, time)
    }
}
