use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;

use crate::foundation::core::{FramePixels, PixelRect};
use crate::foundation::error::{AnimFrameError, AnimFrameResult};
use crate::foundation::span::TimeSpan;
use crate::graph::image::{AnimationImage, FrameRequest, ImageHandle};
use crate::graph::memory::MemoryStatistics;

/// Granularity of the simulated per-frame work, so cancellation is noticed quickly.
const COST_SLICE: Duration = Duration::from_millis(2);

/// Options of a [`ProceduralImage`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProceduralImageOpts {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Number of consecutive frames showing the same content; `1` means every frame differs.
    pub hold: i32,
    /// Extra time spent on every frame on top of the pixel work.
    pub frame_cost_ms: u64,
    /// Layers counted in the memory statistics.
    pub layers: u32,
    /// Hard memory limit reported in the memory statistics.
    pub memory_hard_limit: u64,
}

impl Default for ProceduralImageOpts {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            hold: 1,
            frame_cost_ms: 0,
            layers: 4,
            memory_hard_limit: 1 << 30,
        }
    }
}

impl ProceduralImageOpts {
    fn validate(&self) -> AnimFrameResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AnimFrameError::validation(
                "procedural image size must be non-zero",
            ));
        }
        if self.hold < 1 {
            return Err(AnimFrameError::validation("procedural image hold must be >= 1"));
        }
        Ok(())
    }

    fn projection_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }
}

struct Job {
    seq: u64,
    request: FrameRequest,
}

struct State {
    pending: usize,
    locked: bool,
    shown_frame: i32,
    projection: FramePixels,
}

struct Shared {
    opts: ProceduralImageOpts,
    bounds: PixelRect,
    state: Mutex<State>,
    changed: Condvar,
    pool: Mutex<Arc<rayon::ThreadPool>>,
    threads: AtomicUsize,
    next_seq: AtomicU64,
    cancelled_up_to: AtomicU64,
    /// Instances alive across the original and all its clones.
    instances: Arc<AtomicUsize>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pool(&self) -> Arc<rayon::ThreadPool> {
        let guard = self.pool.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&guard)
    }

    fn is_cancelled(&self, seq: u64) -> bool {
        seq <= self.cancelled_up_to.load(Ordering::Acquire)
    }

    fn finish_job(&self) {
        let mut state = self.state();
        state.pending = state.pending.saturating_sub(1);
        self.changed.notify_all();
    }
}

/// Threaded animated image that draws a deterministic pattern per frame.
///
/// Each instance owns one worker thread that runs requests in order, and a rayon pool sized by the
/// working-thread limit for the pixel work. Frames are grouped in holds of `hold` identical
/// frames.
pub struct ProceduralImage {
    shared: Arc<Shared>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ProceduralImage {
    /// Create an image showing frame 0, with a single working thread.
    pub fn new(opts: ProceduralImageOpts) -> AnimFrameResult<Self> {
        opts.validate()?;
        let bounds = PixelRect::from_size(opts.width, opts.height);
        let projection = FramePixels {
            bounds,
            data: render_frame_pixels(bounds, content_key(0, opts.hold)),
        };
        Self::spawn(opts, projection, 0, 1, Arc::new(AtomicUsize::new(0)))
    }

    /// Frame currently shown.
    pub fn shown_frame(&self) -> i32 {
        self.shared.state().shown_frame
    }

    fn spawn(
        opts: ProceduralImageOpts,
        projection: FramePixels,
        shown_frame: i32,
        threads: usize,
        instances: Arc<AtomicUsize>,
    ) -> AnimFrameResult<Self> {
        let pool = build_pool(threads)?;
        let shared = Arc::new(Shared {
            bounds: projection.bounds,
            opts,
            state: Mutex::new(State {
                pending: 0,
                locked: false,
                shown_frame,
                projection,
            }),
            changed: Condvar::new(),
            pool: Mutex::new(Arc::new(pool)),
            threads: AtomicUsize::new(threads),
            next_seq: AtomicU64::new(0),
            cancelled_up_to: AtomicU64::new(0),
            instances,
        });

        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let worker_shared = Arc::clone(&shared);
        let instance = shared.instances.fetch_add(1, Ordering::AcqRel);
        let worker = std::thread::Builder::new()
            .name(format!("animframe-image-{instance}"))
            .spawn(move || worker_loop(&worker_shared, &rx))
            .map_err(|e| {
                shared.instances.fetch_sub(1, Ordering::AcqRel);
                AnimFrameError::render(format!("spawn image worker: {e}"))
            })?;

        Ok(Self {
            shared,
            jobs: Some(tx),
            worker: Some(worker),
        })
    }
}

impl AnimationImage for ProceduralImage {
    fn clone_image(&self, with_content: bool) -> AnimFrameResult<ImageHandle> {
        let (projection, shown_frame) = {
            let state = self.shared.state();
            if with_content {
                (state.projection.clone(), state.shown_frame)
            } else {
                (FramePixels::transparent(self.shared.bounds), state.shown_frame)
            }
        };
        let clone = Self::spawn(
            self.shared.opts.clone(),
            projection,
            shown_frame,
            self.working_threads_limit(),
            Arc::clone(&self.shared.instances),
        )?;
        Ok(Arc::new(clone))
    }

    fn request_frame_regeneration(&self, request: FrameRequest) {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.state().pending += 1;
        let Some(jobs) = self.jobs.as_ref() else {
            self.shared.finish_job();
            request.notifier.frame_cancelled(request.frame);
            return;
        };
        if let Err(err) = jobs.send(Job { seq, request }) {
            self.shared.finish_job();
            let request = err.into_inner().request;
            request.notifier.frame_cancelled(request.frame);
        }
    }

    fn cancel_frame_regeneration(&self) {
        let last = self.shared.next_seq.load(Ordering::Acquire);
        self.shared.cancelled_up_to.fetch_max(last, Ordering::AcqRel);
    }

    fn try_barrier_lock(&self, _read_only: bool) -> bool {
        let mut state = self.shared.state();
        if state.pending > 0 || state.locked {
            return false;
        }
        state.locked = true;
        true
    }

    fn barrier_lock(&self, _read_only: bool) {
        let mut state = self.shared.state();
        while state.pending > 0 || state.locked {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(|p| p.into_inner());
        }
        state.locked = true;
    }

    fn unlock(&self) {
        self.shared.state().locked = false;
        self.shared.changed.notify_all();
    }

    fn set_working_threads_limit(&self, limit: usize) {
        let limit = limit.max(1);
        if self.shared.threads.swap(limit, Ordering::AcqRel) == limit {
            return;
        }
        match build_pool(limit) {
            Ok(pool) => {
                *self.shared.pool.lock().unwrap_or_else(|p| p.into_inner()) = Arc::new(pool);
            }
            Err(err) => tracing::warn!(limit, error = %err, "keeping previous image thread pool"),
        }
    }

    fn working_threads_limit(&self) -> usize {
        self.shared.threads.load(Ordering::Acquire)
    }

    fn bounds(&self) -> PixelRect {
        self.shared.bounds
    }

    fn memory_statistics(&self) -> MemoryStatistics {
        let opts = &self.shared.opts;
        let projection = opts.projection_bytes();
        let image_size = projection * u64::from(opts.layers.max(1));
        let instances = self.shared.instances.load(Ordering::Acquire).max(1) as u64;
        MemoryStatistics {
            real_memory_size: image_size.saturating_mul(instances),
            tiles_hard_limit: opts.memory_hard_limit,
            image_size,
            projection_size: image_size,
        }
    }

    fn projection(&self, region: PixelRect) -> AnimFrameResult<FramePixels> {
        Ok(self.shared.state().projection.crop(region))
    }

    fn identical_frames(&self, time: i32) -> TimeSpan {
        let hold = self.shared.opts.hold;
        let key = content_key(time, hold);
        TimeSpan::from_time_with_duration(key, hold)
    }
}

impl Drop for ProceduralImage {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take()
            && worker.thread().id() != std::thread::current().id()
        {
            let _ = worker.join();
        }
        self.shared.instances.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ProceduralImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralImage")
            .field("opts", &self.shared.opts)
            .field("threads", &self.working_threads_limit())
            .finish_non_exhaustive()
    }
}

fn worker_loop(shared: &Shared, jobs: &Receiver<Job>) {
    for Job { seq, request } in jobs.iter() {
        {
            let mut state = shared.state();
            while state.locked {
                state = shared.changed.wait(state).unwrap_or_else(|p| p.into_inner());
            }
        }

        let frame = request.frame;
        if shared.is_cancelled(seq) || !spend_frame_cost(shared, seq) {
            tracing::trace!(frame, "procedural frame cancelled");
            request.notifier.frame_cancelled(frame);
            shared.finish_job();
            continue;
        }

        let key = content_key(frame, shared.opts.hold);
        let pool = shared.pool();
        let data = pool.install(|| render_frame_pixels(shared.bounds, key));
        {
            let mut state = shared.state();
            state.shown_frame = frame;
            state.projection = FramePixels {
                bounds: shared.bounds,
                data,
            };
        }
        request.notifier.frame_ready(frame);
        shared.finish_job();
    }
}

/// Sleep through the configured frame cost. Returns `false` when cancelled meanwhile.
fn spend_frame_cost(shared: &Shared, seq: u64) -> bool {
    let cost = Duration::from_millis(shared.opts.frame_cost_ms);
    let end = Instant::now() + cost;
    loop {
        if shared.is_cancelled(seq) {
            return false;
        }
        let now = Instant::now();
        if now >= end {
            return true;
        }
        std::thread::sleep(COST_SLICE.min(end - now));
    }
}

/// First frame of the hold containing `time`.
fn content_key(time: i32, hold: i32) -> i32 {
    time - time.rem_euclid(hold.max(1))
}

/// Deterministic RGBA pattern for the content key `key`.
pub(crate) fn render_frame_pixels(bounds: PixelRect, key: i32) -> Vec<u8> {
    let width = bounds.width as usize;
    let mut data = vec![0u8; bounds.area() as usize * 4];
    let k = key as u32;
    data.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let (x, y) = (x as u32, y as u32);
                px[0] = (x.wrapping_mul(7).wrapping_add(k.wrapping_mul(13))) as u8;
                px[1] = (y.wrapping_mul(5).wrapping_add(k.wrapping_mul(29))) as u8;
                px[2] = k.wrapping_mul(47) as u8;
                px[3] = 255;
            }
        });
    data
}

fn build_pool(threads: usize) -> AnimFrameResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("animframe-pixels-{i}"))
        .build()
        .map_err(|e| AnimFrameError::render(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/graph/procedural.rs"]
mod tests;
