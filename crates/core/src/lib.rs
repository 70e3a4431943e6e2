//! Ambient utilities shared by every vkframe crate.
//!
//! - Engine-level error type and result alias
//! - `tracing` subscriber setup
//! - Frame timing
//! - TOML engine configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    ConfigError, DebugSeverity, EngineConfig, PresentModePreference, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use timer::FrameTimer;
