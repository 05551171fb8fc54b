use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::foundation::core::PixelRect;
use crate::foundation::error::{AnimFrameError, AnimFrameResult};
use crate::foundation::span::TimeSpan;
use crate::graph::image::{AnimationImage, ImageHandle};
use crate::render::orchestrator::RenderStrategy;
use crate::render::renderer::{CancelReason, RendererHooks};

/// Options of a PNG frame sequence export.
#[derive(Clone, Debug)]
pub struct FrameExportOpts {
    /// Directory the frames are written to; created when missing.
    pub directory: PathBuf,
    /// File name prefix, followed by the zero-padded sequence number and `.png`.
    pub base_name: String,
    /// Finite frame range to export.
    pub range: TimeSpan,
    /// Sequence number written for `range.start()`.
    pub sequence_start: i32,
    /// Skip frames whose file already exists.
    pub only_missing: bool,
}

impl FrameExportOpts {
    /// Output file of `frame`.
    pub fn frame_path(&self, frame: i32) -> PathBuf {
        let number = i64::from(frame) - i64::from(self.range.start()) + i64::from(self.sequence_start);
        self.directory
            .join(format!("{}{number:04}.png", self.base_name))
    }
}

/// Saves every regenerated frame as a numbered PNG file.
///
/// Files are encoded and written on the image threads. A write failure fails the pass.
#[derive(Debug)]
pub struct FrameSequenceExport {
    opts: Arc<FrameExportOpts>,
    saved: Vec<i32>,
}

impl FrameSequenceExport {
    /// Validate `opts` and create the output directory.
    pub fn new(opts: FrameExportOpts) -> AnimFrameResult<Self> {
        if !opts.range.is_valid() || opts.range.is_infinite() {
            return Err(AnimFrameError::validation(format!(
                "export range must be finite and valid, got {}",
                opts.range
            )));
        }
        if opts.sequence_start < 0 {
            return Err(AnimFrameError::validation("sequence_start must be >= 0"));
        }
        std::fs::create_dir_all(&opts.directory)?;
        Ok(Self {
            opts: Arc::new(opts),
            saved: Vec::new(),
        })
    }

    /// Export options.
    pub fn opts(&self) -> &FrameExportOpts {
        &self.opts
    }

    /// Frames written so far, in completion order.
    pub fn saved_frames(&self) -> &[i32] {
        &self.saved
    }
}

impl RenderStrategy for FrameSequenceExport {
    fn calc_dirty_frames(&mut self, _image: &dyn AnimationImage) -> Vec<i32> {
        self.opts
            .range
            .frames()
            .filter(|&f| !(self.opts.only_missing && self.opts.frame_path(f).exists()))
            .collect()
    }

    fn create_renderer(&mut self, _image: &ImageHandle) -> Arc<dyn RendererHooks> {
        Arc::new(SaveFrameHooks {
            opts: Arc::clone(&self.opts),
        })
    }

    fn frame_completed(&mut self, frame: i32) {
        self.saved.push(frame);
    }

    fn frame_cancelled(&mut self, frame: i32, reason: CancelReason) {
        if reason != CancelReason::UserCancelled {
            tracing::warn!(frame, ?reason, path = %self.opts.frame_path(frame).display(), "frame not exported");
        }
    }
}

struct SaveFrameHooks {
    opts: Arc<FrameExportOpts>,
}

impl RendererHooks for SaveFrameHooks {
    fn frame_completed(
        &self,
        image: &dyn AnimationImage,
        frame: i32,
        region: PixelRect,
    ) -> AnimFrameResult<()> {
        let pixels = image.projection(image.bounds().intersect(region))?;
        let path = self.opts.frame_path(frame);
        save_png(&path, pixels.bounds.width, pixels.bounds.height, &pixels.data)?;
        tracing::debug!(frame, path = %path.display(), "frame exported");
        Ok(())
    }
}

fn save_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> AnimFrameResult<()> {
    if width == 0 || height == 0 {
        return Err(AnimFrameError::render(format!(
            "cannot save empty frame to '{}'",
            path.display()
        )));
    }
    ::image::save_buffer_with_format(
        path,
        rgba,
        width,
        height,
        ::image::ColorType::Rgba8,
        ::image::ImageFormat::Png,
    )
    .map_err(|e| AnimFrameError::render(format!("save '{}': {e}", path.display())))
}
