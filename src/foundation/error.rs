/// Result alias used by every fallible `animframe` operation.
pub type AnimFrameResult<T> = Result<T, AnimFrameError>;

/// Error type for configuration, frame export and pixel transfer.
///
/// Scheduling outcomes are not errors: a regeneration pass reports them through
/// [`RenderResult`](crate::RenderResult).
#[derive(thiserror::Error, Debug)]
pub enum AnimFrameError {
    /// Caller supplied an argument that violates an invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Render configuration could not be loaded or is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// A frame could not be produced or stored.
    #[error("render error: {0}")]
    Render(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, with its source chain preserved.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnimFrameError {
    /// Build an [`AnimFrameError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an [`AnimFrameError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an [`AnimFrameError::Render`].
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build an [`AnimFrameError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
