//! animframe regenerates the frames of an animated image concurrently and keeps track of which
//! frame times hold valid content.
//!
//! The crate is built around three pieces:
//!
//! - [`TimeSpan`], an interval of frame times with open-ended spans
//! - [`FrameCache`], a time-range cache kept consistent by the [`FramesGluer`]
//! - [`RenderOrchestrator`], which clones an [`AnimationImage`] and drives one
//!   [`AsyncAnimationRenderer`] per clone until every dirty frame is regenerated
//!
//! Use cases plug into the orchestrator through [`RenderStrategy`]: [`CacheRegeneration`] fills a
//! frame cache, [`FrameSequenceExport`] writes a PNG sequence.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod cache;
pub(crate) mod graph;
pub(crate) mod render;

pub use crate::foundation::config::{ConfigProvider, RenderConfig, SharedRenderConfig};
pub use crate::foundation::core::{FramePixels, PixelRect};
pub use crate::foundation::error::{AnimFrameError, AnimFrameResult};
pub use crate::foundation::span::TimeSpan;

pub use crate::cache::frame_cache::{CacheStatus, ConvertedFrameData, FrameCache};
pub use crate::cache::gluer::{CachedRangeMap, FrameSwapper, FramesGluer, GlueMode, INFINITE_LENGTH};

pub use crate::graph::image::{AnimationImage, FrameRequest, ImageHandle, RegenerationFlags};
pub use crate::graph::memory::{
    FixedMemoryStatistics, ImageMemoryStatistics, MemoryStatistics, MemoryStatisticsSource,
};
pub use crate::graph::procedural::{ProceduralImage, ProceduralImageOpts};

pub use crate::render::cache_regen::CacheRegeneration;
pub use crate::render::frames_save::{FrameExportOpts, FrameSequenceExport};
pub use crate::render::orchestrator::{
    CancelHandle, OrchestratorOpts, PassPhase, PassStats, RenderOrchestrator, RenderResult,
    RenderStrategy, ViewContext,
};
pub use crate::render::progress::{
    LogProgress, MessageLevel, PROGRESS_UPDATE_INTERVAL, ProgressCompressor, ProgressSnapshot,
    ProgressSurface, format_clock, format_progress_label,
};
pub use crate::render::renderer::{
    AsyncAnimationRenderer, CancelReason, FrameNotifier, FrameOutcome, NoopHooks, RendererHooks,
};
