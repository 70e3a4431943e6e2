//! Engine-level error type.

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for vkframe applications.
///
/// GPU errors stay `vkframe_rhi::RhiError`; this type covers what happens
/// around the renderer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation failure.
    #[error("Window error: {0}")]
    Window(String),

    /// File system failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias using the engine's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::Invalid("max_frames_in_flight must be >= 1".into()).into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("max_frames_in_flight"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
