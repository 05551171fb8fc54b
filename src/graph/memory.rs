use crate::graph::image::AnimationImage;

/// Share of the hard memory limit that clones may fill.
const CLONE_MEMORY_BUDGET: f64 = 0.8;

/// Memory footprint reported by an image, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryStatistics {
    /// Memory currently in use.
    pub real_memory_size: u64,
    /// Hard limit memory use must stay below.
    pub tiles_hard_limit: u64,
    /// Size of the image graph data.
    pub image_size: u64,
    /// Extra memory one clone needs.
    pub projection_size: u64,
}

impl MemoryStatistics {
    /// Number of image instances (the original included) the memory budget allows.
    ///
    /// Always at least 1. When a clone costs nothing the budget does not limit anything and
    /// `max_clones` is returned.
    pub fn allowed_clones(&self, max_clones: usize) -> usize {
        if self.tiles_hard_limit < self.image_size {
            return 1;
        }
        let budget = CLONE_MEMORY_BUDGET * self.tiles_hard_limit as f64 - self.real_memory_size as f64;
        if budget <= 0.0 {
            return 1;
        }
        if self.projection_size == 0 {
            return max_clones.max(1);
        }
        let extra = (budget / self.projection_size as f64).floor();
        if extra >= usize::MAX as f64 {
            return usize::MAX;
        }
        1 + extra as usize
    }
}

/// Where a regeneration pass reads memory statistics from.
pub trait MemoryStatisticsSource {
    /// Statistics for `image`.
    fn memory_statistics(&self, image: &dyn AnimationImage) -> MemoryStatistics;
}

/// Ask the image itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageMemoryStatistics;

impl MemoryStatisticsSource for ImageMemoryStatistics {
    fn memory_statistics(&self, image: &dyn AnimationImage) -> MemoryStatistics {
        image.memory_statistics()
    }
}

/// Report the same statistics for every image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedMemoryStatistics(pub MemoryStatistics);

impl MemoryStatisticsSource for FixedMemoryStatistics {
    fn memory_statistics(&self, _image: &dyn AnimationImage) -> MemoryStatistics {
        self.0
    }
}
