use super::*;

use crossbeam_channel::unbounded;

use crate::render::renderer::{
    AsyncAnimationRenderer, CancelReason, FrameOutcome, LoopEvent, NoopHooks,
};

const WAIT: Duration = Duration::from_secs(10);

fn image(opts: ProceduralImageOpts) -> (Arc<ProceduralImage>, ImageHandle) {
    let img = Arc::new(ProceduralImage::new(opts).unwrap());
    let handle: ImageHandle = img.clone();
    (img, handle)
}

fn next_outcome(rx: &Receiver<LoopEvent>) -> FrameOutcome {
    match rx.recv_timeout(WAIT).unwrap() {
        LoopEvent::Frame(ev) => ev.outcome,
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn invalid_opts_are_rejected() {
    let err = ProceduralImage::new(ProceduralImageOpts {
        width: 0,
        ..ProceduralImageOpts::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("size"));
    assert!(
        ProceduralImage::new(ProceduralImageOpts {
            hold: 0,
            ..ProceduralImageOpts::default()
        })
        .is_err()
    );
}

#[test]
fn identical_frames_follow_the_hold() {
    let (_img, handle) = image(ProceduralImageOpts {
        hold: 3,
        ..ProceduralImageOpts::default()
    });
    assert_eq!(handle.identical_frames(0), TimeSpan::from_time_to_time(0, 2));
    assert_eq!(handle.identical_frames(4), TimeSpan::from_time_to_time(3, 5));
    assert_eq!(handle.identical_frames(5), TimeSpan::from_time_to_time(3, 5));
}

#[test]
fn regenerated_frame_becomes_the_projection() {
    let (img, handle) = image(ProceduralImageOpts {
        width: 6,
        height: 3,
        ..ProceduralImageOpts::default()
    });
    let (tx, rx) = unbounded();
    let mut renderer = AsyncAnimationRenderer::new(0, Arc::new(NoopHooks), tx, WAIT);
    renderer.start_frame_regeneration(&handle, 4, handle.bounds());

    assert_eq!(next_outcome(&rx), FrameOutcome::Completed { frame: 4 });
    assert_eq!(img.shown_frame(), 4);
    let projection = handle.projection(handle.bounds()).unwrap();
    assert_eq!(projection.data, render_frame_pixels(handle.bounds(), 4));

    let corner = handle.projection(PixelRect::new(5, 2, 4, 4)).unwrap();
    assert_eq!(corner.bounds, PixelRect::new(5, 2, 1, 1));
    assert_eq!(corner.data.len(), 4);
}

#[test]
fn held_frames_share_pixels() {
    let bounds = PixelRect::from_size(4, 4);
    let a = render_frame_pixels(bounds, content_key(6, 3));
    let b = render_frame_pixels(bounds, content_key(8, 3));
    let c = render_frame_pixels(bounds, content_key(9, 3));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.chunks_exact(4).all(|px| px[3] == 255));
}

#[test]
fn cancellation_aborts_a_slow_frame() {
    let (_img, handle) = image(ProceduralImageOpts {
        frame_cost_ms: 5_000,
        ..ProceduralImageOpts::default()
    });
    let (tx, rx) = unbounded();
    let mut renderer = AsyncAnimationRenderer::new(0, Arc::new(NoopHooks), tx, WAIT);
    renderer.start_frame_regeneration(&handle, 1, handle.bounds());
    assert!(!handle.try_barrier_lock(true), "busy while a frame is pending");

    let started = Instant::now();
    handle.cancel_frame_regeneration();
    assert_eq!(
        next_outcome(&rx),
        FrameOutcome::Cancelled {
            frame: 1,
            reason: CancelReason::RenderingFailed
        }
    );
    assert!(started.elapsed() < Duration::from_secs(4));

    handle.barrier_lock(true);
    handle.unlock();
}

#[test]
fn cancellation_does_not_leak_into_later_requests() {
    let (_img, handle) = image(ProceduralImageOpts::default());
    handle.cancel_frame_regeneration();
    let (tx, rx) = unbounded();
    let mut renderer = AsyncAnimationRenderer::new(0, Arc::new(NoopHooks), tx, WAIT);
    renderer.start_frame_regeneration(&handle, 2, handle.bounds());
    assert_eq!(next_outcome(&rx), FrameOutcome::Completed { frame: 2 });
}

#[test]
fn barrier_lock_is_exclusive() {
    let (_img, handle) = image(ProceduralImageOpts::default());
    assert!(handle.try_barrier_lock(true));
    assert!(!handle.try_barrier_lock(true));
    handle.unlock();
    assert!(handle.try_barrier_lock(false));
    handle.unlock();
}

#[test]
fn clones_copy_content_and_count_in_memory() {
    let (img, handle) = image(ProceduralImageOpts {
        width: 4,
        height: 4,
        layers: 2,
        ..ProceduralImageOpts::default()
    });
    let single = handle.memory_statistics();
    assert_eq!(single.image_size, 4 * 4 * 4 * 2);
    assert_eq!(single.real_memory_size, single.image_size);

    handle.set_working_threads_limit(3);
    let clone = handle.clone_image(true).unwrap();
    assert_eq!(clone.working_threads_limit(), 3);
    assert_eq!(
        clone.projection(clone.bounds()).unwrap(),
        handle.projection(handle.bounds()).unwrap()
    );
    assert_eq!(handle.memory_statistics().real_memory_size, 2 * single.image_size);

    drop(clone);
    assert_eq!(handle.memory_statistics().real_memory_size, single.image_size);
    assert_eq!(img.shown_frame(), 0);
}
