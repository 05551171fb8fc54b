use super::*;

use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;

use crossbeam_channel::{Receiver, unbounded};

use crate::foundation::core::FramePixels;
use crate::foundation::error::AnimFrameError;
use crate::graph::memory::MemoryStatistics;

#[derive(Default)]
struct RecordingImage {
    requests: Mutex<Vec<FrameRequest>>,
    cancels: AtomicUsize,
}

impl RecordingImage {
    fn last_notifier(&self) -> FrameNotifier {
        self.requests.lock().unwrap().last().unwrap().notifier.clone()
    }
}

impl AnimationImage for RecordingImage {
    fn clone_image(&self, _with_content: bool) -> AnimFrameResult<ImageHandle> {
        Ok(Arc::new(RecordingImage::default()))
    }

    fn request_frame_regeneration(&self, request: FrameRequest) {
        self.requests.lock().unwrap().push(request);
    }

    fn cancel_frame_regeneration(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn try_barrier_lock(&self, _read_only: bool) -> bool {
        true
    }

    fn barrier_lock(&self, _read_only: bool) {}

    fn unlock(&self) {}

    fn set_working_threads_limit(&self, _limit: usize) {}

    fn working_threads_limit(&self) -> usize {
        1
    }

    fn bounds(&self) -> PixelRect {
        PixelRect::from_size(4, 4)
    }

    fn memory_statistics(&self) -> MemoryStatistics {
        MemoryStatistics::default()
    }

    fn projection(&self, region: PixelRect) -> AnimFrameResult<FramePixels> {
        Ok(FramePixels::transparent(region))
    }
}

struct FailingHooks;

impl RendererHooks for FailingHooks {
    fn frame_completed(&self, _: &dyn AnimationImage, frame: i32, _: PixelRect) -> AnimFrameResult<()> {
        Err(AnimFrameError::render(format!("cannot store frame {frame}")))
    }
}

fn setup(
    hooks: Arc<dyn RendererHooks>,
    timeout: Duration,
) -> (AsyncAnimationRenderer, Arc<RecordingImage>, ImageHandle, Receiver<LoopEvent>) {
    let (tx, rx) = unbounded();
    let renderer = AsyncAnimationRenderer::new(3, hooks, tx, timeout);
    let image = Arc::new(RecordingImage::default());
    let handle: ImageHandle = image.clone();
    (renderer, image, handle, rx)
}

fn frame_event(rx: &Receiver<LoopEvent>) -> RendererEvent {
    match rx.try_recv().unwrap() {
        LoopEvent::Frame(ev) => ev,
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn completed_request_returns_to_idle() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    assert!(!renderer.is_active());

    renderer.start_frame_regeneration(&handle, 7, PixelRect::from_size(2, 2));
    assert!(renderer.is_active());
    assert_eq!(renderer.requested_frame(), Some(7));
    {
        let requests = image.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].frame, 7);
        assert!(requests[0].cancellable);
        assert_eq!(requests[0].notifier.region(), PixelRect::from_size(2, 2));
    }

    image.last_notifier().frame_ready(7);
    let event = frame_event(&rx);
    assert_eq!(event.renderer, 3);
    assert_eq!(
        renderer.handle_event(event),
        Some(FrameOutcome::Completed { frame: 7 })
    );
    assert!(!renderer.is_active());
    assert_eq!(renderer.next_deadline(), None);
}

#[test]
fn late_notifications_are_dropped() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    renderer.start_frame_regeneration(&handle, 1, PixelRect::from_size(1, 1));
    let notifier = image.last_notifier();
    notifier.frame_ready(1);
    let event = frame_event(&rx);
    assert!(renderer.handle_event(event).is_some());

    notifier.frame_ready(1);
    notifier.frame_cancelled(1);
    assert!(rx.try_recv().is_err(), "stale notifier must stay silent");
    assert_eq!(renderer.handle_event(event), None, "duplicate event is a no-op");
}

#[test]
fn notifier_ignores_other_frames() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    renderer.start_frame_regeneration(&handle, 4, PixelRect::from_size(1, 1));
    image.last_notifier().frame_ready(5);
    assert!(rx.try_recv().is_err());
    assert!(renderer.is_active());
}

#[test]
fn image_cancellation_is_rendering_failed() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    renderer.start_frame_regeneration(&handle, 2, PixelRect::from_size(1, 1));
    image.last_notifier().frame_cancelled(2);
    let outcome = renderer.handle_event(frame_event(&rx));
    assert_eq!(
        outcome,
        Some(FrameOutcome::Cancelled {
            frame: 2,
            reason: CancelReason::RenderingFailed
        })
    );
    assert_eq!(image.cancels.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_hook_turns_completion_into_failure() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(FailingHooks), Duration::from_secs(30));
    renderer.start_frame_regeneration(&handle, 9, PixelRect::from_size(1, 1));
    image.last_notifier().frame_ready(9);
    let outcome = renderer.handle_event(frame_event(&rx));
    assert_eq!(
        outcome,
        Some(FrameOutcome::Cancelled {
            frame: 9,
            reason: CancelReason::RenderingFailed
        })
    );
}

#[test]
fn deadline_expiry_times_out_and_aborts_image() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(NoopHooks), Duration::from_millis(10));
    renderer.start_frame_regeneration(&handle, 0, PixelRect::from_size(1, 1));
    let deadline = renderer.next_deadline().unwrap();

    assert_eq!(renderer.check_timeout(deadline - Duration::from_millis(5)), None);
    assert_eq!(
        renderer.check_timeout(deadline),
        Some(FrameOutcome::Cancelled {
            frame: 0,
            reason: CancelReason::RenderingTimedOut
        })
    );
    assert!(!renderer.is_active());
    assert_eq!(image.cancels.load(Ordering::SeqCst), 1);

    image.last_notifier().frame_ready(0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn explicit_cancel_respects_flags() {
    let (mut renderer, image, handle, _rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    renderer.set_flags(RegenerationFlags::NONE);
    renderer.start_frame_regeneration(&handle, 5, PixelRect::from_size(1, 1));
    assert!(!image.requests.lock().unwrap()[0].cancellable);

    let outcome = renderer.cancel_current_frame_rendering(CancelReason::UserCancelled);
    assert_eq!(
        outcome,
        Some(FrameOutcome::Cancelled {
            frame: 5,
            reason: CancelReason::UserCancelled
        })
    );
    assert_eq!(image.cancels.load(Ordering::SeqCst), 0);
    assert_eq!(
        renderer.cancel_current_frame_rendering(CancelReason::UserCancelled),
        None
    );
}

#[test]
fn busy_renderer_ignores_second_request() {
    let (mut renderer, image, handle, _rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    renderer.start_frame_regeneration(&handle, 1, PixelRect::from_size(1, 1));
    renderer.start_frame_regeneration(&handle, 2, PixelRect::from_size(1, 1));
    assert_eq!(image.requests.lock().unwrap().len(), 1);
    assert_eq!(renderer.requested_frame(), Some(1));
}

#[test]
fn events_for_an_older_request_are_ignored() {
    let (mut renderer, image, handle, rx) = setup(Arc::new(NoopHooks), Duration::from_secs(30));
    renderer.start_frame_regeneration(&handle, 1, PixelRect::from_size(1, 1));
    let first = image.last_notifier();
    first.frame_ready(1);
    let stale = frame_event(&rx);
    renderer.cancel_current_frame_rendering(CancelReason::UserCancelled);

    renderer.start_frame_regeneration(&handle, 1, PixelRect::from_size(1, 1));
    assert_eq!(renderer.handle_event(stale), None);
    assert!(renderer.is_active());
}
