pub(crate) mod frame_cache;
pub(crate) mod gluer;
