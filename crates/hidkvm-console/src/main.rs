//! HidKvm console entry point.
//!
//! Loads the configuration, applies command-line overrides and runs one
//! session headless until Ctrl-C or until the session ends itself (middle
//! mouse button).  A windowed front end would own the capture surface and
//! push widget events through the backend's window handle; here the surface
//! is a fixed-size stand-in and the video comes from the test pattern.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides  -> SessionConfig
//!  └─ SessionController::start()
//!       ├─ TransportDriver   (serial writer thread, or NullSink)
//!       ├─ VideoPump         (frame thread)
//!       ├─ InputSource       (hook thread or cursor poll thread)
//!       └─ dispatch thread   (normalise -> translate -> submit)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hidkvm_console::application::session::{SessionController, SessionState};
use hidkvm_console::application::session_config::PointerMode;
use hidkvm_console::infrastructure::backend::SystemBackend;
use hidkvm_console::infrastructure::input_capture::surface::FixedSurface;
use hidkvm_console::infrastructure::input_capture::CaptureMode;
use hidkvm_console::infrastructure::storage::config::{self, AppConfig, ConfigError};
use hidkvm_console::infrastructure::video::test_pattern::TestPatternSource;

/// How often the headless loop logs session status.
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Drive a CH9329 USB-HID dongle from local keyboard and mouse input.
#[derive(Debug, Default, Parser)]
#[command(name = "hidkvm-console", version, about)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial port of the CH9329 (e.g. COM3, /dev/ttyUSB0).
    #[arg(long)]
    port: Option<String>,

    /// Serial speed.
    #[arg(long)]
    baud: Option<u32>,

    /// Discard packets instead of opening the serial port.
    #[arg(long)]
    test_mode: bool,

    /// Capture input system-wide (falls back to window capture).
    #[arg(long)]
    global: bool,

    /// Send relative pointer motion instead of absolute positions.
    #[arg(long)]
    relative: bool,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,

    /// Requested capture width.
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height.
    #[arg(long)]
    height: Option<u32>,

    /// Requested capture frame rate.
    #[arg(long)]
    fps: Option<u32>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if self.test_mode {
            config.console.test_mode = true;
        }
        if self.global {
            config.console.capture_mode = CaptureMode::Global;
        }
        if self.relative {
            config.console.pointer_mode = PointerMode::Relative;
        }
        if self.debug {
            config.console.log_level = "debug".to_string();
        }
        if let Some(width) = self.width {
            config.video.width = width;
        }
        if let Some(height) = self.height {
            config.video.height = height;
        }
        if let Some(fps) = self.fps {
            config.video.fps = fps;
        }
    }

    fn load(&self) -> Result<AppConfig, ConfigError> {
        match &self.config {
            Some(path) => config::load_config_from(path),
            None => config::load_config(),
        }
    }
}

/// Stops the session on the blocking pool; `stop()` joins threads and waits
/// for the port to drain.
async fn stop_off_runtime(session: SessionController) -> Result<(), tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || session.stop()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = cli.load();
    let mut app_config = loaded.as_ref().cloned().unwrap_or_default();
    cli.apply(&mut app_config);

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.console.log_level)),
        )
        .init();

    if let Err(e) = &loaded {
        warn!("{e}; using default configuration");
    }

    info!("HidKvm console starting");

    let surface = Arc::new(FixedSurface::new(app_config.surface_size()));
    let backend = Arc::new(SystemBackend::new(surface, Arc::new(TestPatternSource::new())));
    let session = SessionController::new(backend);

    let id = session.start(app_config.to_session_config())?;
    info!(
        %id,
        mode = ?session.active_mode(),
        transport = ?session.transport_description(),
        "session running.  Press Ctrl-C to exit."
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let signalled = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            if let Err(e) = stop_off_runtime(signalled).await {
                warn!("stop task failed: {e}");
            }
        }
    });

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            _ = status.tick() => {
                if let (Some(video), Some(stats)) = (session.video_info(), session.transport_stats()) {
                    info!(
                        fps = video.measured_fps,
                        width = video.actual.width,
                        height = video.actual.height,
                        written = stats.written,
                        dropped = stats.dropped,
                        coalesced = stats.coalesced,
                        faults = stats.faults,
                        "status"
                    );
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        if session.state() == SessionState::Idle {
            break;
        }
    }

    // Covers a session that ended itself while the handler is still armed.
    stop_off_runtime(session).await?;
    info!("HidKvm console stopped");
    Ok(())
}
