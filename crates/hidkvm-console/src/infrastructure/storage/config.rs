//! TOML-based configuration for the console.
//!
//! Reads [`AppConfig`] from the platform-appropriate location:
//! - Windows:  `%APPDATA%\HidKvm\config.toml`
//! - Linux:    `~/.config/hidkvm/config.toml`
//! - macOS:    `~/Library/Application Support/HidKvm/config.toml`
//!
//! Example:
//!
//! ```toml
//! [console]
//! log_level = "info"
//! capture_mode = "global"
//! pointer_mode = "absolute"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [video]
//! width = 1920
//! height = 1080
//! fps = 30
//! ```
//!
//! Every section and field is optional.  A missing file, an empty file and
//! a file from an older version all load with defaults filled in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::session_config::{PointerMode, SessionConfig};
use crate::infrastructure::input_capture::CaptureMode;
use crate::infrastructure::transport::{SerialEndpoint, DEFAULT_BAUD_RATE};
use crate::infrastructure::video::VideoFormat;
use hidkvm_core::Size;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
}

/// General console behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub capture_mode: CaptureMode,
    #[serde(default)]
    pub pointer_mode: PointerMode,
    /// Discard all packets instead of opening the serial port.
    #[serde(default)]
    pub test_mode: bool,
}

/// Serial link to the CH9329.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Port path (`COM3`, `/dev/ttyUSB0`).  Absent means no device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Requested capture format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoConfig {
    #[serde(default = "default_video_width")]
    pub width: u32,
    #[serde(default = "default_video_height")]
    pub height: u32,
    #[serde(default = "default_video_fps")]
    pub fps: u32,
}

/// Size of the headless capture surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfaceConfig {
    #[serde(default = "default_surface_width")]
    pub width: u32,
    #[serde(default = "default_surface_height")]
    pub height: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_video_width() -> u32 {
    1920
}
fn default_video_height() -> u32 {
    1080
}
fn default_video_fps() -> u32 {
    30
}
fn default_surface_width() -> u32 {
    1280
}
fn default_surface_height() -> u32 {
    720
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            capture_mode: CaptureMode::default(),
            pointer_mode: PointerMode::default(),
            test_mode: false,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_video_width(),
            height: default_video_height(),
            fps: default_video_fps(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_surface_width(),
            height: default_surface_height(),
        }
    }
}

impl AppConfig {
    /// Builds the immutable snapshot a session starts from.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            video: VideoFormat::new(self.video.width, self.video.height, self.video.fps),
            capture_mode: self.console.capture_mode,
            serial: self
                .serial
                .port
                .as_ref()
                .map(|path| SerialEndpoint::new(path.clone(), self.serial.baud_rate)),
            test_mode: self.console.test_mode,
            pointer_mode: self.console.pointer_mode,
        }
    }

    /// Size of the headless capture surface.
    pub fn surface_size(&self) -> Size {
        Size::new(self.surface.width, self.surface.height)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config base directory including the `HidKvm`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HidKvm"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hidkvm"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("HidKvm")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
