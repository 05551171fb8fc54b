pub(crate) mod cache_regen;
pub(crate) mod frames_save;
pub(crate) mod orchestrator;
pub(crate) mod progress;
pub(crate) mod renderer;
