use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::foundation::error::{AnimFrameError, AnimFrameResult};

const DEFAULT_FRAME_TIMEOUT_MS: u64 = 30_000;

/// Settings consulted once at the start of every regeneration pass.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Total worker-thread budget, split evenly between the image clones of a pass.
    pub max_threads: usize,
    /// Upper bound on the number of image instances regenerating frames at once.
    pub max_clones: usize,
    /// Per-frame timeout in milliseconds. A frame exceeding it cancels the whole pass.
    pub frame_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_threads: cores,
            max_clones: cores.div_ceil(2),
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
        }
    }
}

impl RenderConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(s: &str) -> AnimFrameResult<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| AnimFrameError::serde(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> AnimFrameResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnimFrameError::config(format!("read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> AnimFrameResult<()> {
        if self.max_threads == 0 {
            return Err(AnimFrameError::config("max_threads must be >= 1"));
        }
        if self.max_clones == 0 {
            return Err(AnimFrameError::config("max_clones must be >= 1"));
        }
        if self.frame_timeout_ms == 0 {
            return Err(AnimFrameError::config("frame_timeout_ms must be >= 1"));
        }
        Ok(())
    }

    /// Per-frame timeout as a [`Duration`].
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms.max(1))
    }
}

/// Source of the [`RenderConfig`] snapshot taken at the start of each pass.
pub trait ConfigProvider {
    /// Current configuration.
    fn render_config(&self) -> RenderConfig;
}

impl ConfigProvider for RenderConfig {
    fn render_config(&self) -> RenderConfig {
        self.clone()
    }
}

/// Configuration shared with a settings surface; edits apply from the next pass on.
#[derive(Clone, Debug, Default)]
pub struct SharedRenderConfig(Arc<RwLock<RenderConfig>>);

impl SharedRenderConfig {
    /// Wrap an initial configuration.
    pub fn new(cfg: RenderConfig) -> Self {
        Self(Arc::new(RwLock::new(cfg)))
    }

    /// Replace the configuration.
    pub fn set(&self, cfg: RenderConfig) {
        match self.0.write() {
            Ok(mut guard) => *guard = cfg,
            Err(poisoned) => *poisoned.into_inner() = cfg,
        }
    }
}

impl ConfigProvider for SharedRenderConfig {
    fn render_config(&self) -> RenderConfig {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
