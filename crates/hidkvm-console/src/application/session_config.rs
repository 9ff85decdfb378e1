//! Immutable per-session settings.
//!
//! A [`SessionConfig`] is built once (from the TOML file and CLI flags) and
//! never changed while a session runs.  Changing the video format produces a
//! new snapshot through [`SessionConfig::with_video`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::infrastructure::input_capture::CaptureMode;
use crate::infrastructure::transport::SerialEndpoint;
use crate::infrastructure::video::VideoFormat;

/// How pointer motion is reported to the remote machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerMode {
    /// Absolute reports: the remote cursor jumps to the mapped position.
    #[default]
    Absolute,
    /// Relative reports: deltas between consecutive mapped positions.
    Relative,
}

impl fmt::Display for PointerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => f.write_str("absolute"),
            Self::Relative => f.write_str("relative"),
        }
    }
}

/// Snapshot of everything a session needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionConfig {
    /// Requested capture format.
    pub video: VideoFormat,
    /// Preferred input producer; global falls back to window.
    pub capture_mode: CaptureMode,
    /// Serial port of the CH9329.  `None` selects the null sink.
    pub serial: Option<SerialEndpoint>,
    /// Never touch the serial port, even if one is configured.
    pub test_mode: bool,
    pub pointer_mode: PointerMode,
}

impl SessionConfig {
    /// A copy of this snapshot with a different video format.
    pub fn with_video(&self, video: VideoFormat) -> Self {
        Self {
            video,
            ..self.clone()
        }
    }

    /// Endpoint to open, or `None` when the null sink must be used.
    pub fn serial_target(&self) -> Option<&SerialEndpoint> {
        if self.test_mode {
            None
        } else {
            self.serial.as_ref()
        }
    }
}
