use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::foundation::core::PixelRect;
use crate::foundation::error::AnimFrameResult;
use crate::graph::image::{AnimationImage, FrameRequest, ImageHandle, RegenerationFlags};

/// Request id meaning "no request outstanding".
const NO_REQUEST: u64 = 0;

/// Why a frame request ended without a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The user (or the caller) stopped the pass.
    UserCancelled,
    /// The image could not produce the frame, or the completion hook failed.
    RenderingFailed,
    /// The frame took longer than the configured timeout.
    RenderingTimedOut,
}

/// Normalized end of one frame request, delivered on the coordinating thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was regenerated and the worker-side hook succeeded.
    Completed {
        /// Frame time.
        frame: i32,
    },
    /// The request ended without a result.
    Cancelled {
        /// Frame time.
        frame: i32,
        /// Why it ended.
        reason: CancelReason,
    },
}

impl FrameOutcome {
    /// Frame time the outcome belongs to.
    pub fn frame(self) -> i32 {
        match self {
            Self::Completed { frame } | Self::Cancelled { frame, .. } => frame,
        }
    }
}

/// Work done on the image's own thread when a frame is ready.
///
/// The image still shows the frame while the hook runs, so this is where frame content is read
/// out. An error turns the outcome into [`CancelReason::RenderingFailed`].
pub trait RendererHooks: Send + Sync {
    /// Handle the regenerated `frame` of `image` over `region`.
    fn frame_completed(
        &self,
        image: &dyn AnimationImage,
        frame: i32,
        region: PixelRect,
    ) -> AnimFrameResult<()>;
}

/// Hooks that do nothing on the worker thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl RendererHooks for NoopHooks {
    fn frame_completed(&self, _: &dyn AnimationImage, _: i32, _: PixelRect) -> AnimFrameResult<()> {
        Ok(())
    }
}

/// Raw notification from a worker thread, tagged with the request it answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RendererEvent {
    pub(crate) renderer: usize,
    pub(crate) request_id: u64,
    pub(crate) outcome: FrameOutcome,
}

/// Everything the coordinating thread waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoopEvent {
    Frame(RendererEvent),
    CancelRequested,
}

/// Thread-agnostic handle an image uses to report the outcome of one request.
///
/// Cloning is cheap. Notifications for a request the renderer no longer waits for are dropped.
#[derive(Clone)]
pub struct FrameNotifier {
    renderer: usize,
    request_id: u64,
    frame: i32,
    region: PixelRect,
    active_request: Arc<AtomicU64>,
    hooks: Arc<dyn RendererHooks>,
    image: Weak<dyn AnimationImage>,
    events: Sender<LoopEvent>,
}

impl FrameNotifier {
    /// Frame time this notifier answers for.
    pub fn frame(&self) -> i32 {
        self.frame
    }

    /// Region of interest of the request.
    pub fn region(&self) -> PixelRect {
        self.region
    }

    /// Report that `frame` is regenerated. Runs the worker-side hook on the calling thread.
    pub fn frame_ready(&self, frame: i32) {
        if !self.is_current(frame) {
            tracing::trace!(renderer = self.renderer, frame, "dropping stale frame-ready");
            return;
        }
        let Some(image) = self.image.upgrade() else {
            tracing::debug!(renderer = self.renderer, frame, "image released before frame-ready");
            return;
        };
        let outcome = match self.hooks.frame_completed(image.as_ref(), frame, self.region) {
            Ok(()) => FrameOutcome::Completed { frame },
            Err(err) => {
                tracing::warn!(renderer = self.renderer, frame, error = %err, "frame hook failed");
                FrameOutcome::Cancelled {
                    frame,
                    reason: CancelReason::RenderingFailed,
                }
            }
        };
        self.send(outcome);
    }

    /// Report that the image gave up on `frame`.
    pub fn frame_cancelled(&self, frame: i32) {
        if !self.is_current(frame) {
            return;
        }
        self.send(FrameOutcome::Cancelled {
            frame,
            reason: CancelReason::RenderingFailed,
        });
    }

    fn is_current(&self, frame: i32) -> bool {
        frame == self.frame && self.active_request.load(Ordering::Acquire) == self.request_id
    }

    fn send(&self, outcome: FrameOutcome) {
        let event = RendererEvent {
            renderer: self.renderer,
            request_id: self.request_id,
            outcome,
        };
        // The receiver outlives every pass; a closed channel only happens during teardown.
        let _ = self.events.send(LoopEvent::Frame(event));
    }
}

impl std::fmt::Debug for FrameNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameNotifier")
            .field("renderer", &self.renderer)
            .field("request_id", &self.request_id)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

struct ActiveRequest {
    image: Weak<dyn AnimationImage>,
    frame: i32,
    cancellable: bool,
    request_id: u64,
    deadline: Instant,
}

/// Drives one image instance through at most one frame request at a time.
///
/// Lives on the coordinating thread. Outcomes reported by the image arrive through the pass
/// event channel and are turned into [`FrameOutcome`]s by [`AsyncAnimationRenderer::handle_event`].
pub struct AsyncAnimationRenderer {
    index: usize,
    hooks: Arc<dyn RendererHooks>,
    events: Sender<LoopEvent>,
    active_request: Arc<AtomicU64>,
    next_request_id: u64,
    request: Option<ActiveRequest>,
    frame_timeout: Duration,
    flags: RegenerationFlags,
}

impl AsyncAnimationRenderer {
    pub(crate) fn new(
        index: usize,
        hooks: Arc<dyn RendererHooks>,
        events: Sender<LoopEvent>,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            index,
            hooks,
            events,
            active_request: Arc::new(AtomicU64::new(NO_REQUEST)),
            next_request_id: NO_REQUEST,
            request: None,
            frame_timeout,
            flags: RegenerationFlags::CANCELLABLE,
        }
    }

    /// Position of this renderer in its pass.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return `true` while a request is outstanding.
    pub fn is_active(&self) -> bool {
        self.request.is_some()
    }

    /// Frame of the outstanding request.
    pub fn requested_frame(&self) -> Option<i32> {
        self.request.as_ref().map(|r| r.frame)
    }

    /// Flags used for the next request.
    pub fn set_flags(&mut self, flags: RegenerationFlags) {
        self.flags = flags;
    }

    /// Per-frame timeout armed by every request.
    pub fn frame_timeout(&self) -> Duration {
        self.frame_timeout
    }

    /// Ask `image` to regenerate `frame` over `region` and arm the timeout.
    ///
    /// Ignored (with a warning) while another request is outstanding.
    pub fn start_frame_regeneration(&mut self, image: &ImageHandle, frame: i32, region: PixelRect) {
        if self.is_active() {
            tracing::warn!(renderer = self.index, frame, "renderer is busy, request ignored");
            return;
        }
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let cancellable = self.flags.cancellable;

        self.request = Some(ActiveRequest {
            image: Arc::downgrade(image),
            frame,
            cancellable,
            request_id,
            deadline: Instant::now() + self.frame_timeout,
        });
        self.active_request.store(request_id, Ordering::Release);

        let notifier = FrameNotifier {
            renderer: self.index,
            request_id,
            frame,
            region,
            active_request: Arc::clone(&self.active_request),
            hooks: Arc::clone(&self.hooks),
            image: Arc::downgrade(image),
            events: self.events.clone(),
        };
        tracing::debug!(renderer = self.index, frame, request_id, "frame regeneration requested");
        image.request_frame_regeneration(FrameRequest {
            frame,
            region,
            cancellable,
            notifier,
        });
    }

    /// Turn a raw worker notification into an outcome. Events for any other request are ignored.
    pub(crate) fn handle_event(&mut self, event: RendererEvent) -> Option<FrameOutcome> {
        let current = self.request.as_ref()?;
        if event.renderer != self.index
            || event.request_id != current.request_id
            || event.outcome.frame() != current.frame
        {
            return None;
        }
        self.clear_request(false);
        Some(event.outcome)
    }

    /// Cancel the outstanding request with [`CancelReason::RenderingTimedOut`] once its deadline
    /// has passed.
    pub fn check_timeout(&mut self, now: Instant) -> Option<FrameOutcome> {
        let request = self.request.as_ref()?;
        if now < request.deadline {
            return None;
        }
        tracing::warn!(
            renderer = self.index,
            frame = request.frame,
            timeout_ms = self.frame_timeout.as_millis() as u64,
            "frame regeneration timed out"
        );
        self.cancel_current_frame_rendering(CancelReason::RenderingTimedOut)
    }

    /// Deadline of the outstanding request.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.request.as_ref().map(|r| r.deadline)
    }

    /// Stop waiting for the outstanding request and report it cancelled with `reason`.
    ///
    /// A cancellable request is also aborted on the image side.
    pub fn cancel_current_frame_rendering(&mut self, reason: CancelReason) -> Option<FrameOutcome> {
        let frame = self.request.as_ref()?.frame;
        self.clear_request(true);
        tracing::debug!(renderer = self.index, frame, ?reason, "frame regeneration cancelled");
        Some(FrameOutcome::Cancelled { frame, reason })
    }

    fn clear_request(&mut self, abort_image: bool) {
        self.active_request.store(NO_REQUEST, Ordering::Release);
        let Some(request) = self.request.take() else {
            return;
        };
        if abort_image
            && request.cancellable
            && let Some(image) = request.image.upgrade()
        {
            image.cancel_frame_regeneration();
        }
    }
}

impl std::fmt::Debug for AsyncAnimationRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncAnimationRenderer")
            .field("index", &self.index)
            .field("requested_frame", &self.requested_frame())
            .field("frame_timeout", &self.frame_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
