use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::foundation::config::{ConfigProvider, RenderConfig};
use crate::foundation::core::PixelRect;
use crate::graph::image::{AnimationImage, ImageHandle};
use crate::graph::memory::{ImageMemoryStatistics, MemoryStatisticsSource};
use crate::render::progress::{
    MessageLevel, ProgressCompressor, ProgressSnapshot, ProgressSurface, format_progress_label,
};
use crate::render::renderer::{
    AsyncAnimationRenderer, CancelReason, FrameOutcome, LoopEvent, RendererHooks,
};

/// Upper bound on one blocking wait of the pass loop, so cancellation flags get polled.
const LOOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Final state of a regeneration pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderResult {
    /// Every dirty frame was regenerated.
    Complete,
    /// The pass was stopped, or the image was busy before it started.
    Cancelled,
    /// A frame could not be regenerated.
    Failed,
    /// A frame exceeded the per-frame timeout.
    TimedOut,
}

impl RenderResult {
    fn from_cancel_reason(reason: CancelReason) -> Self {
        match reason {
            CancelReason::UserCancelled => Self::Cancelled,
            CancelReason::RenderingFailed => Self::Failed,
            CancelReason::RenderingTimedOut => Self::TimedOut,
        }
    }
}

/// Where a pass currently stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PassPhase {
    /// No pass running.
    #[default]
    Idle,
    /// Waiting for the source image to become idle.
    Locking,
    /// Computing dirty frames and creating workers.
    Scheduling,
    /// Frames are being regenerated.
    Running,
    /// Waiting for every image instance to settle.
    Draining,
}

/// Numbers describing the last pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Frames scheduled.
    pub dirty_frames: usize,
    /// Image instances used, the original included.
    pub workers: usize,
    /// Working-thread limit given to each instance.
    pub threads_per_worker: usize,
    /// Whether the memory budget lowered the worker count.
    pub memory_limited: bool,
    /// Frames regenerated.
    pub completed: usize,
    /// Frame requests that ended cancelled.
    pub cancelled: usize,
    /// Wall time of the pass.
    pub elapsed: Duration,
}

/// Use-case specific parts of a regeneration pass.
///
/// Every method runs on the coordinating thread.
pub trait RenderStrategy {
    /// Frames that need regeneration, in scheduling order.
    fn calc_dirty_frames(&mut self, image: &dyn AnimationImage) -> Vec<i32>;

    /// Worker-side hooks for a renderer bound to `image`.
    fn create_renderer(&mut self, image: &ImageHandle) -> Arc<dyn RendererHooks>;

    /// Prepare `renderer` right before it is asked to regenerate `frame`.
    fn initialize_renderer_for_frame(
        &mut self,
        _renderer: &mut AsyncAnimationRenderer,
        _image: &ImageHandle,
        _frame: i32,
    ) {
    }

    /// `frame` was regenerated and its worker hook succeeded.
    fn frame_completed(&mut self, _frame: i32) {}

    /// The request for `frame` ended without a result.
    fn frame_cancelled(&mut self, _frame: i32, _reason: CancelReason) {}

    /// Every image instance settled; no worker hook runs after this.
    fn pass_finished(&mut self, _result: RenderResult) {}
}

/// Interactive context that can wait for an image to finish pending work.
pub trait ViewContext {
    /// Wait until `image` is idle. Returns `false` when the wait was abandoned.
    fn block_until_operations_finished(&self, image: &dyn AnimationImage) -> bool;

    /// Wait until `image` is idle, whatever it takes.
    fn block_until_operations_finished_forced(&self, image: &dyn AnimationImage);
}

/// Requests cancellation of the running pass from any thread.
#[derive(Clone, Debug)]
pub struct CancelHandle(Sender<LoopEvent>);

impl CancelHandle {
    /// Ask the running pass to stop. Has no effect when no pass is running.
    pub fn cancel(&self) {
        let _ = self.0.send(LoopEvent::CancelRequested);
    }
}

/// Options of a [`RenderOrchestrator`].
#[derive(Clone, Debug)]
pub struct OrchestratorOpts {
    /// Title shown on the progress surface.
    pub title: String,
    /// Region to regenerate. `None` uses the full image bounds.
    pub region_of_interest: Option<PixelRect>,
    /// Never touch the progress surface.
    pub batch_mode: bool,
}

impl Default for OrchestratorOpts {
    fn default() -> Self {
        Self {
            title: "Regenerating frames".to_string(),
            region_of_interest: None,
            batch_mode: false,
        }
    }
}

struct Worker {
    renderer: AsyncAnimationRenderer,
    image: ImageHandle,
}

struct PassState {
    still_dirty: VecDeque<i32>,
    in_progress: Vec<i32>,
    dirty_count: usize,
    result: RenderResult,
    started: Instant,
    memory_limited_workers: Option<usize>,
    progress: ProgressCompressor,
}

impl PassState {
    fn new(started: Instant) -> Self {
        Self {
            still_dirty: VecDeque::new(),
            in_progress: Vec::new(),
            dirty_count: 0,
            result: RenderResult::Complete,
            started,
            memory_limited_workers: None,
            progress: ProgressCompressor::default(),
        }
    }

    fn processed(&self) -> usize {
        self.dirty_count
            .saturating_sub(self.still_dirty.len() + self.in_progress.len())
    }

    fn is_finished(&self) -> bool {
        self.still_dirty.is_empty() && self.in_progress.is_empty()
    }
}

/// Regenerates the dirty frames of an image across several image clones.
///
/// One instance is reused for any number of passes; configuration and memory statistics are read
/// again at the start of each pass.
pub struct RenderOrchestrator<S> {
    image: ImageHandle,
    strategy: S,
    opts: OrchestratorOpts,
    config: Box<dyn ConfigProvider>,
    memory: Box<dyn MemoryStatisticsSource>,
    surface: Option<Box<dyn ProgressSurface>>,
    events_tx: Sender<LoopEvent>,
    events_rx: Receiver<LoopEvent>,
    phase: PassPhase,
    pass: PassState,
    stats: PassStats,
}

impl<S: RenderStrategy> RenderOrchestrator<S> {
    /// Orchestrator for `image` with default configuration and image-reported memory statistics.
    pub fn new(image: ImageHandle, strategy: S, opts: OrchestratorOpts) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            image,
            strategy,
            opts,
            config: Box::new(RenderConfig::default()),
            memory: Box::new(ImageMemoryStatistics),
            surface: None,
            events_tx,
            events_rx,
            phase: PassPhase::Idle,
            pass: PassState::new(Instant::now()),
            stats: PassStats::default(),
        }
    }

    /// Read configuration from `config` at the start of each pass.
    pub fn with_config(mut self, config: impl ConfigProvider + 'static) -> Self {
        self.config = Box::new(config);
        self
    }

    /// Read memory statistics from `memory`.
    pub fn with_memory_statistics(mut self, memory: impl MemoryStatisticsSource + 'static) -> Self {
        self.memory = Box::new(memory);
        self
    }

    /// Report progress to `surface` (unless in batch mode).
    pub fn with_progress_surface(mut self, surface: impl ProgressSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    /// Handle for cancelling a running pass from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.events_tx.clone())
    }

    /// The use-case strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Mutable access to the use-case strategy between passes.
    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// Give back the strategy.
    pub fn into_strategy(self) -> S {
        self.strategy
    }

    /// Current phase.
    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    /// Frames not handed to a renderer yet.
    pub fn still_dirty_frames(&self) -> Vec<i32> {
        self.pass.still_dirty.iter().copied().collect()
    }

    /// Frames currently being regenerated.
    pub fn frames_in_progress(&self) -> &[i32] {
        &self.pass.in_progress
    }

    /// Statistics of the last pass.
    pub fn last_pass_stats(&self) -> PassStats {
        self.stats
    }

    /// Regenerate every dirty frame and block until the pass is over.
    ///
    /// `view`, when given, is used to wait for the image instead of failing on a busy image, and
    /// to force-quiesce image instances at the end.
    #[tracing::instrument(skip(self, view), fields(title = %self.opts.title))]
    pub fn regenerate_range(&mut self, view: Option<&dyn ViewContext>) -> RenderResult {
        self.pass = PassState::new(Instant::now());
        self.stats = PassStats::default();
        while self.events_rx.try_recv().is_ok() {}

        let cfg = self.pass_config();

        self.phase = PassPhase::Locking;
        if !self.wait_for_idle_image(view) {
            tracing::info!("image is busy, regeneration cancelled before start");
            self.phase = PassPhase::Idle;
            self.pass.result = RenderResult::Cancelled;
            return self.pass.result;
        }

        self.phase = PassPhase::Scheduling;
        let dirty = self.strategy.calc_dirty_frames(self.image.as_ref());
        if dirty.is_empty() {
            tracing::debug!("no dirty frames");
            self.phase = PassPhase::Idle;
            return RenderResult::Complete;
        }
        self.pass.dirty_count = dirty.len();
        self.pass.still_dirty = dirty.into();

        let mut workers = self.spawn_workers(&cfg);
        self.init_progress();

        self.phase = PassPhase::Running;
        self.try_initiate_frame_regeneration(&mut workers);
        self.run_event_loop(&mut workers);

        self.phase = PassPhase::Draining;
        self.drain(workers, view, &cfg);
        self.strategy.pass_finished(self.pass.result);

        self.stats.elapsed = self.pass.started.elapsed();
        self.phase = PassPhase::Idle;
        self.show_final_message(&cfg);
        tracing::info!(
            result = ?self.pass.result,
            completed = self.stats.completed,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "regeneration pass finished"
        );
        self.pass.result
    }

    fn pass_config(&self) -> RenderConfig {
        let cfg = self.config.render_config();
        match cfg.validate() {
            Ok(()) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "invalid render config, using defaults");
                RenderConfig::default()
            }
        }
    }

    fn wait_for_idle_image(&self, view: Option<&dyn ViewContext>) -> bool {
        match view {
            Some(view) => view.block_until_operations_finished(self.image.as_ref()),
            None => {
                let locked = self.image.try_barrier_lock(true);
                if locked {
                    self.image.unlock();
                }
                locked
            }
        }
    }

    fn spawn_workers(&mut self, cfg: &RenderConfig) -> Vec<Worker> {
        let dirty = self.pass.dirty_count;
        let proposed = dirty.min(cfg.max_clones).max(1);
        let stats = self.memory.memory_statistics(self.image.as_ref());
        let allowed = stats.allowed_clones(cfg.max_clones);
        let wanted = proposed.min(allowed).max(1);

        let mut clones = Vec::with_capacity(wanted.saturating_sub(1));
        for _ in 0..wanted.saturating_sub(1) {
            match self.image.clone_image(true) {
                Ok(clone) => clones.push(clone),
                Err(err) => {
                    tracing::warn!(error = %err, "image clone failed, continuing with fewer workers");
                    break;
                }
            }
        }
        // The thread budget is split between the instances that actually exist.
        let threads = cfg.max_threads.div_ceil(clones.len() + 1).max(1);

        let mut workers = Vec::with_capacity(clones.len() + 1);
        for (index, clone) in clones.into_iter().enumerate() {
            clone.set_working_threads_limit(threads);
            workers.push(self.make_worker(index, clone, cfg));
        }
        self.image.set_working_threads_limit(threads);
        let original = Arc::clone(&self.image);
        workers.push(self.make_worker(workers.len(), original, cfg));

        let memory_limited = allowed < proposed;
        if memory_limited {
            self.pass.memory_limited_workers = Some(workers.len());
        }
        self.stats = PassStats {
            dirty_frames: dirty,
            workers: workers.len(),
            threads_per_worker: threads,
            memory_limited,
            ..PassStats::default()
        };
        tracing::info!(
            dirty_frames = dirty,
            workers = workers.len(),
            threads_per_worker = threads,
            memory_limited,
            "regeneration pass scheduled"
        );
        workers
    }

    fn make_worker(&mut self, index: usize, image: ImageHandle, cfg: &RenderConfig) -> Worker {
        let hooks = self.strategy.create_renderer(&image);
        let renderer =
            AsyncAnimationRenderer::new(index, hooks, self.events_tx.clone(), cfg.frame_timeout());
        Worker { renderer, image }
    }

    fn try_initiate_frame_regeneration(&mut self, workers: &mut [Worker]) {
        let region = self
            .opts
            .region_of_interest
            .unwrap_or_else(|| self.image.bounds());
        for worker in workers.iter_mut() {
            if worker.renderer.is_active() {
                continue;
            }
            let Some(frame) = self.pass.still_dirty.pop_front() else {
                break;
            };
            self.strategy
                .initialize_renderer_for_frame(&mut worker.renderer, &worker.image, frame);
            self.pass.in_progress.push(frame);
            worker
                .renderer
                .start_frame_regeneration(&worker.image, frame, region);
        }
    }

    fn run_event_loop(&mut self, workers: &mut [Worker]) {
        while !self.pass.is_finished() {
            let now = Instant::now();
            let mut wake = now + LOOP_POLL_INTERVAL;
            for w in workers.iter() {
                if let Some(deadline) = w.renderer.next_deadline() {
                    wake = wake.min(deadline);
                }
            }
            if let Some(deadline) = self.pass.progress.next_deadline() {
                wake = wake.min(deadline);
            }

            match self.events_rx.recv_deadline(wake) {
                Ok(LoopEvent::Frame(event)) => {
                    let outcome = workers
                        .get_mut(event.renderer)
                        .and_then(|w| w.renderer.handle_event(event));
                    if let Some(outcome) = outcome {
                        self.on_frame_outcome(outcome, workers);
                    }
                }
                Ok(LoopEvent::CancelRequested) => {
                    tracing::info!("cancellation requested");
                    self.cancel_processing(CancelReason::UserCancelled, workers);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Both ends live in `self`; this only guards against an endless loop.
                    self.cancel_processing(CancelReason::RenderingFailed, workers);
                }
            }

            let now = Instant::now();
            let timed_out = workers
                .iter_mut()
                .find_map(|w| w.renderer.check_timeout(now));
            if let Some(outcome) = timed_out {
                self.on_frame_outcome(outcome, workers);
            }

            if self.surface_cancelled() && !self.pass.is_finished() {
                self.cancel_processing(CancelReason::UserCancelled, workers);
            }
            if self.pass.progress.poll(Instant::now()) {
                self.push_progress();
            }
        }
    }

    fn on_frame_outcome(&mut self, outcome: FrameOutcome, workers: &mut [Worker]) {
        let frame = outcome.frame();
        if let Some(pos) = self.pass.in_progress.iter().position(|&f| f == frame) {
            self.pass.in_progress.remove(pos);
        }
        match outcome {
            FrameOutcome::Completed { frame } => {
                self.stats.completed += 1;
                self.strategy.frame_completed(frame);
                self.try_initiate_frame_regeneration(workers);
            }
            FrameOutcome::Cancelled { frame, reason } => {
                self.stats.cancelled += 1;
                self.strategy.frame_cancelled(frame, reason);
                self.cancel_processing(reason, workers);
            }
        }
        self.request_progress();
    }

    fn cancel_processing(&mut self, reason: CancelReason, workers: &mut [Worker]) {
        tracing::debug!(
            ?reason,
            dirty = self.pass.still_dirty.len(),
            in_progress = self.pass.in_progress.len(),
            "cancelling regeneration pass"
        );
        for w in workers.iter_mut() {
            if let Some(FrameOutcome::Cancelled { frame, reason }) =
                w.renderer.cancel_current_frame_rendering(reason)
            {
                self.stats.cancelled += 1;
                self.strategy.frame_cancelled(frame, reason);
            }
        }
        self.pass.still_dirty.clear();
        self.pass.in_progress.clear();
        if self.pass.result == RenderResult::Complete {
            self.pass.result = RenderResult::from_cancel_reason(reason);
        }
        self.request_progress();
    }

    fn drain(&mut self, workers: Vec<Worker>, view: Option<&dyn ViewContext>, cfg: &RenderConfig) {
        for w in workers {
            if Arc::ptr_eq(&w.image, &self.image) {
                continue;
            }
            quiesce(w.image.as_ref(), view);
        }
        quiesce(self.image.as_ref(), view);
        self.image.set_working_threads_limit(cfg.max_threads);
    }

    fn surface_cancelled(&self) -> bool {
        !self.opts.batch_mode && self.surface.as_ref().is_some_and(|s| s.was_cancelled())
    }

    fn init_progress(&mut self) {
        if self.opts.batch_mode {
            return;
        }
        let total = self.pass.dirty_count;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_range(0, total);
            surface.set_value(0);
        }
        self.pass.progress.reset();
        self.request_progress();
    }

    fn request_progress(&mut self) {
        if self.pass.progress.request(Instant::now()) {
            self.push_progress();
        }
    }

    fn push_progress(&mut self) {
        if self.opts.batch_mode {
            return;
        }
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let snapshot = ProgressSnapshot {
            total: self.pass.dirty_count,
            processed: self.pass.processed(),
            elapsed: self.pass.started.elapsed(),
            memory_limited_workers: self.pass.memory_limited_workers,
        };
        surface.set_value(snapshot.processed);
        surface.set_label(&format_progress_label(&self.opts.title, &snapshot));
    }

    fn show_final_message(&mut self, cfg: &RenderConfig) {
        if self.opts.batch_mode {
            return;
        }
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let title = &self.opts.title;
        match self.pass.result {
            RenderResult::Failed => surface.show_message(
                MessageLevel::Warning,
                title,
                &format!(
                    "Failed to render animation frames.\n\n\
                     A frame could not be regenerated. If this keeps happening, try lowering \
                     max_clones (currently {}) or raising frame_timeout_ms (currently {}).",
                    cfg.max_clones, cfg.frame_timeout_ms
                ),
            ),
            RenderResult::TimedOut => surface.show_message(
                MessageLevel::Warning,
                title,
                &format!(
                    "Rendering animation frames timed out.\n\n\
                     A frame took longer than frame_timeout_ms ({} ms). Raise frame_timeout_ms \
                     or lower max_clones (currently {}) to give every clone more threads.",
                    cfg.frame_timeout_ms, cfg.max_clones
                ),
            ),
            RenderResult::Complete | RenderResult::Cancelled => {}
        }
    }
}

/// Block until `image` finished whatever it still runs.
fn quiesce(image: &dyn AnimationImage, view: Option<&dyn ViewContext>) {
    match view {
        Some(view) => view.block_until_operations_finished_forced(image),
        None => {
            image.barrier_lock(true);
            image.unlock();
        }
    }
}

impl<S> std::fmt::Debug for RenderOrchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOrchestrator")
            .field("opts", &self.opts)
            .field("phase", &self.phase)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
