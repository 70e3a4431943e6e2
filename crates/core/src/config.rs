//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.
//!
//! ```toml
//! app_name = "vkframe demo"
//!
//! [window]
//! width = 1280
//! height = 720
//!
//! [renderer]
//! max_frames_in_flight = 2
//! present_mode = "mailbox"
//! clear_color = [0.02, 0.02, 0.05, 1.0]
//! validation = true
//! debug_severity = "warning"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the file, or `<inline>`.
        path: String,
        /// Parser message with line and column.
        message: String,
    },

    /// The document parsed but a value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Minimum severity of validation-layer messages that get reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugSeverity {
    /// Everything, including loader chatter.
    Verbose,
    /// Informational messages and above.
    Info,
    /// Warnings and errors.
    #[default]
    Warning,
    /// Errors only.
    Error,
}

/// Preferred presentation mode. FIFO is used when the preference is unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Triple-buffered, no tearing.
    #[default]
    Mailbox,
    /// Vsync. Always available.
    Fifo,
    /// No vsync, may tear.
    Immediate,
}

/// `[window]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial inner width in physical pixels.
    pub width: u32,
    /// Initial inner height in physical pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vkframe".to_string(),
        }
    }
}

/// `[renderer]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots; bounds how far the CPU may run ahead of the GPU.
    pub max_frames_in_flight: usize,
    /// Preferred presentation mode.
    pub present_mode: PresentModePreference,
    /// RGBA clear color of the color attachment.
    pub clear_color: [f32; 4],
    /// Clear value of the depth attachment.
    pub clear_depth: f32,
    /// Request the Khronos validation layer.
    pub validation: bool,
    /// Minimum severity of reported validation messages.
    pub debug_severity: DebugSeverity,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            present_mode: PresentModePreference::default(),
            clear_color: [0.02, 0.02, 0.05, 1.0],
            clear_depth: 1.0,
            validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::default(),
        }
    }
}

impl RendererConfig {
    /// Returns the debug severity to hand to context creation, `None` when validation is off.
    pub fn debug(&self) -> Option<DebugSeverity> {
        self.validation.then_some(self.debug_severity)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application name reported to the driver and logged at startup.
    pub app_name: String,
    /// `[window]` section.
    pub window: WindowConfig,
    /// `[renderer]` section.
    pub renderer: RendererConfig,
    /// Fallback `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "vkframe".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::parse(source, "<inline>")
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::parse(&contents, &display)
    }

    /// Loads a file, falling back to defaults when it is missing or broken.
    ///
    /// A missing file is not an error. Logging is usually configured from
    /// the result, so nothing is logged here.
    ///
    /// # Returns
    ///
    /// The configuration, plus the error that forced the fallback so the
    /// caller can report it once logging is up.
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<ConfigError>) {
        let path = path.as_ref();
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Rejects values the renderer cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero frames in flight or a zero window size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "renderer.max_frames_in_flight must be at least 1".into(),
            ));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        Ok(())
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn parse(source: &str, path: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert_eq!(config.renderer.present_mode, PresentModePreference::Mailbox);
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            app_name = "quad"

            [window]
            width = 800
            height = 600

            [renderer]
            max_frames_in_flight = 3
            present_mode = "fifo"
            debug_severity = "error"
            "#,
        )
        .unwrap();

        assert_eq!(config.app_name, "quad");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert_eq!(config.window.title, "vkframe");
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert_eq!(config.renderer.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.renderer.debug_severity, DebugSeverity::Error);
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let err = EngineConfig::from_toml_str("[renderer]\nmax_frames_in_flight = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = EngineConfig::from_toml_str("[window]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_severity_is_parse_error() {
        let err =
            EngineConfig::from_toml_str("[renderer]\ndebug_severity = \"loud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_debug_only_when_validation_enabled() {
        let mut renderer = RendererConfig {
            validation: false,
            ..RendererConfig::default()
        };
        assert_eq!(renderer.debug(), None);
        renderer.validation = true;
        renderer.debug_severity = DebugSeverity::Info;
        assert_eq!(renderer.debug(), Some(DebugSeverity::Info));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(DebugSeverity::Verbose < DebugSeverity::Info);
        assert!(DebugSeverity::Warning < DebugSeverity::Error);
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let (config, error) = EngineConfig::load_or_default("/nonexistent/vkframe.toml");
        assert_eq!(config, EngineConfig::default());
        assert!(error.is_none());
    }

    #[test]
    fn test_broken_file_falls_back_with_error() {
        let path = std::env::temp_dir().join(format!("vkframe-broken-{}.toml", std::process::id()));
        std::fs::write(&path, "[renderer]\nmax_frames_in_flight = 0\n").unwrap();

        let (config, error) = EngineConfig::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, EngineConfig::default());
        assert!(matches!(error, Some(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_valid_file_loads() {
        let path = std::env::temp_dir().join(format!("vkframe-valid-{}.toml", std::process::id()));
        std::fs::write(&path, "app_name = \"from file\"\n").unwrap();

        let (config, error) = EngineConfig::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(error.is_none());
        assert_eq!(config.app_name, "from file");
    }
}
