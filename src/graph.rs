pub(crate) mod image;
pub(crate) mod memory;
pub(crate) mod procedural;
